//! Tracing setup.
//!
//! Natively this installs a compact fmt layer filtered by `RUST_LOG`; in the
//! browser, events go to the devtools console through `tracing-wasm`.
//!
//! ```ignore
//! use flowslate_core::telemetry::{self, TelemetryConfig};
//!
//! telemetry::init_tracing(TelemetryConfig::from_env("flowslate"));
//! tracing::info!("ready");
//! ```

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;

/// Telemetry configuration
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Service name, attached to the startup event.
    pub service_name: String,
    /// Console log level (default: INFO, DEBUG in debug builds)
    pub console_level: Level,
}

impl TelemetryConfig {
    pub fn from_env(service_name: impl Into<String>) -> Self {
        let console_level = if cfg!(debug_assertions) {
            Level::DEBUG
        } else {
            Level::INFO
        };
        Self {
            service_name: service_name.into(),
            console_level,
        }
    }
}

/// Install the global subscriber. Returns false if one was already set.
#[cfg(not(all(target_family = "wasm", target_os = "unknown")))]
pub fn init_tracing(config: TelemetryConfig) -> bool {
    use tracing_subscriber::util::SubscriberInitExt;
    use tracing_subscriber::{EnvFilter, Layer};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.console_level.as_str().to_lowercase()));

    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .with_filter(env_filter);

    let installed = tracing_subscriber::registry()
        .with(console_layer)
        .try_init()
        .is_ok();
    if installed {
        tracing::debug!(service = %config.service_name, "telemetry initialized");
    }
    installed
}

/// Install the global subscriber. Returns false if one was already set.
#[cfg(all(target_family = "wasm", target_os = "unknown"))]
pub fn init_tracing(config: TelemetryConfig) -> bool {
    let wasm_layer = tracing_wasm::WASMLayer::new(
        tracing_wasm::WASMLayerConfigBuilder::new()
            .set_max_level(config.console_level)
            .build(),
    );
    let registry = tracing_subscriber::Registry::default().with(wasm_layer);
    let installed = tracing::subscriber::set_global_default(registry).is_ok();
    if installed {
        tracing::debug!(service = %config.service_name, "telemetry initialized");
    }
    installed
}
