//! Embed host configuration.

use std::fmt;
use std::path::Path;
use std::time::Duration;

use miette::{IntoDiagnostic, Result, WrapErr, miette};
use serde::{Deserialize, Serialize};

use crate::channel::OriginFilter;

/// Embed host used in development builds.
pub const DEVELOPMENT_HOST: &str = "http://localhost:5000";
/// Embed host used in production builds.
pub const PRODUCTION_HOST: &str = "https://slate-eta.vercel.app";
/// How long after design mode closes the authoring preview re-reads the
/// saved query.
pub const DESIGN_REFRESH_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    /// Development in debug builds, production otherwise.
    pub fn from_build() -> Self {
        if cfg!(debug_assertions) {
            Self::Development
        } else {
            Self::Production
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Some(Self::Development),
            "production" | "prod" => Some(Self::Production),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbedConfig {
    /// Base URL of the embedded-document service. Also the only origin
    /// whose messages are trusted.
    pub embed_host: String,
    /// Delay before the authoring preview refreshes after design mode closes.
    #[serde(with = "millis")]
    pub design_refresh_delay: Duration,
}

impl EmbedConfig {
    pub fn development() -> Self {
        Self::for_environment(Environment::Development)
    }

    pub fn production() -> Self {
        Self::for_environment(Environment::Production)
    }

    pub fn for_environment(env: Environment) -> Self {
        let embed_host = match env {
            Environment::Development => DEVELOPMENT_HOST,
            Environment::Production => PRODUCTION_HOST,
        };
        Self {
            embed_host: embed_host.to_owned(),
            design_refresh_delay: DESIGN_REFRESH_DELAY,
        }
    }

    /// Build from environment variables.
    ///
    /// - `FLOWSLATE_ENV`: `development` or `production` (default: by build)
    /// - `FLOWSLATE_EMBED_HOST`: overrides the embed host
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`EmbedConfig::from_env`], reading variables through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let env = match lookup("FLOWSLATE_ENV") {
            Some(value) => Environment::parse(&value).unwrap_or_else(|| {
                tracing::warn!(value = %value, "unrecognized FLOWSLATE_ENV, using build default");
                Environment::from_build()
            }),
            None => Environment::from_build(),
        };
        let mut config = Self::for_environment(env);
        if let Some(host) = lookup("FLOWSLATE_EMBED_HOST").filter(|h| !h.is_empty()) {
            config.embed_host = host;
        }
        config
    }

    /// The embed host without a trailing slash.
    pub fn host(&self) -> &str {
        self.embed_host.trim_end_matches('/')
    }

    pub fn origin_filter(&self) -> OriginFilter {
        OriginFilter::new(&self.embed_host)
    }

    /// Parse a configuration document. Missing fields take the build
    /// environment's defaults.
    pub fn parse(text: &str, format: ConfigFormat) -> Result<Self> {
        let parsed = match format {
            ConfigFormat::Json => serde_json::from_str(text).into_diagnostic(),
            ConfigFormat::Toml => toml::from_str(text).into_diagnostic(),
        };
        parsed.wrap_err_with(|| format!("invalid {format} embed configuration"))
    }

    pub fn render(&self, format: ConfigFormat) -> Result<String> {
        match format {
            ConfigFormat::Json => serde_json::to_string_pretty(self).into_diagnostic(),
            ConfigFormat::Toml => toml::to_string_pretty(self).into_diagnostic(),
        }
    }

    /// Read a `.json` or `.toml` file, then apply `FLOWSLATE_*` overrides.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let format = ConfigFormat::from_path(path)
            .ok_or_else(|| miette!("unsupported config file {}", path.display()))?;
        let text = std::fs::read_to_string(path)
            .into_diagnostic()
            .wrap_err_with(|| format!("reading {}", path.display()))?;
        let mut config = Self::parse(&text, format)?;
        if let Some(host) = std::env::var("FLOWSLATE_EMBED_HOST")
            .ok()
            .filter(|h| !h.is_empty())
        {
            config.embed_host = host;
        }
        Ok(config)
    }
}

impl Default for EmbedConfig {
    fn default() -> Self {
        Self::for_environment(Environment::from_build())
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

/// On-disk encodings of [`EmbedConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Json,
    Toml,
}

impl ConfigFormat {
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()? {
            "json" => Some(Self::Json),
            "toml" => Some(Self::Toml),
            _ => None,
        }
    }
}

impl fmt::Display for ConfigFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Json => "json",
            Self::Toml => "toml",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_environment_hosts() {
        assert_eq!(EmbedConfig::development().host(), DEVELOPMENT_HOST);
        assert_eq!(EmbedConfig::production().host(), PRODUCTION_HOST);
        assert_eq!(
            EmbedConfig::production().origin_filter().origin(),
            "https://slate-eta.vercel.app"
        );
    }

    #[test]
    fn test_from_lookup_overrides() {
        let config = EmbedConfig::from_lookup(|key| match key {
            "FLOWSLATE_ENV" => Some("production".into()),
            "FLOWSLATE_EMBED_HOST" => Some("https://embeds.example.com/".into()),
            _ => None,
        });
        assert_eq!(config.host(), "https://embeds.example.com");
        assert_eq!(config.design_refresh_delay, DESIGN_REFRESH_DELAY);

        let dev = EmbedConfig::from_lookup(|key| (key == "FLOWSLATE_ENV").then(|| "dev".into()));
        assert_eq!(dev, EmbedConfig::development());
    }

    #[test]
    fn test_partial_documents_keep_defaults() {
        let config = EmbedConfig::parse(
            r#"embed_host = "https://embeds.example.com""#,
            ConfigFormat::Toml,
        )
        .unwrap();
        assert_eq!(config.host(), "https://embeds.example.com");
        assert_eq!(config.design_refresh_delay, DESIGN_REFRESH_DELAY);

        let config =
            EmbedConfig::parse(r#"{"design_refresh_delay": 250}"#, ConfigFormat::Json).unwrap();
        assert_eq!(config.design_refresh_delay, Duration::from_millis(250));
    }

    #[test]
    fn test_render_then_parse_each_format() {
        let mut config = EmbedConfig::production();
        config.design_refresh_delay = Duration::from_millis(1500);
        for format in [ConfigFormat::Json, ConfigFormat::Toml] {
            let text = config.render(format).unwrap();
            assert_eq!(EmbedConfig::parse(&text, format).unwrap(), config);
        }
    }

    #[test]
    fn test_from_file() {
        let path = std::env::temp_dir().join(format!("flowslate-{}.json", uuid::Uuid::new_v4()));
        std::fs::write(&path, r#"{"embed_host": "http://localhost:7000"}"#).unwrap();
        let loaded = EmbedConfig::from_file(&path);
        std::fs::remove_file(&path).unwrap();
        if std::env::var("FLOWSLATE_EMBED_HOST").is_err() {
            assert_eq!(loaded.unwrap().host(), "http://localhost:7000");
        }

        assert!(EmbedConfig::from_file(std::env::temp_dir().join("flowslate.yaml")).is_err());
        assert!(EmbedConfig::parse("embed_host = [", ConfigFormat::Toml).is_err());
    }
}
