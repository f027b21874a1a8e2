//! Browser DOM layer for flowslate embeds.
//!
//! This crate wires the platform-agnostic protocol in `flowslate-core` to
//! the page. It assumes a `wasm32-unknown-unknown` target environment.
//!
//! # Architecture
//!
//! - `frames`: iframe content windows as message sources, and the
//!   `data-contentname` ancestor walk for frames nobody registered
//! - `listener`: window `message` listeners for step responses and design
//!   live queries
//! - `timers`: per-instance `setTimeout` debouncing
//! - `design`: design popup lifecycle
//!
//! # Re-exports
//!
//! This crate re-exports `flowslate-core` for convenience, so consumers
//! only need to depend on `flowslate-browser`.

// Re-export core crate
pub use flowslate_core;
pub use flowslate_core::*;

pub mod design;
pub mod frames;
pub mod listener;
pub mod timers;

pub use design::DesignPopup;
pub use frames::{FrameWindow, channel_with_dom_fallback, content_name_for, mount_frame, unmount_frame};
pub use listener::{DesignListener, StepListener, inbound, listen_for_live_query, listen_for_responses};
pub use timers::DebounceTimers;

/// Read an [`EmbedConfig`] handed over by the host page as a plain object.
/// Missing fields take the build defaults.
pub fn config_from_js(value: wasm_bindgen::JsValue) -> Result<EmbedConfig, serde_wasm_bindgen::Error> {
    serde_wasm_bindgen::from_value(value)
}

/// Install the panic hook and console tracing. Safe to call more than once.
pub fn init() {
    console_error_panic_hook::set_once();
    telemetry::init_tracing(telemetry::TelemetryConfig::from_env("flowslate-browser"));
}
