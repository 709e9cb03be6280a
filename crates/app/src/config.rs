//! Application configuration loaded from environment variables.

use engine::EngineConfig;

/// How log lines are rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl LogFormat {
    fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "json" => Some(LogFormat::Json),
            "pretty" | "text" => Some(LogFormat::Pretty),
            _ => None,
        }
    }
}

/// Service configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `LOG_FORMAT`: `json` or `pretty` (default: `pretty`)
/// - the `ENGINE_*` variables read by [`EngineConfig::from_env`]
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub log_level: String,
    pub log_format: LogFormat,
    pub engine: EngineConfig,
}

impl AppConfig {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let mut config = Self::from_lookup(|key| std::env::var(key).ok());
        config.engine = EngineConfig::from_env();
        config
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            log_level: lookup("RUST_LOG")
                .filter(|level| !level.trim().is_empty())
                .unwrap_or(defaults.log_level),
            log_format: lookup("LOG_FORMAT")
                .and_then(|format| LogFormat::parse(&format))
                .unwrap_or(defaults.log_format),
            engine: defaults.engine,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            engine: EngineConfig::default(),
        }
    }
}
