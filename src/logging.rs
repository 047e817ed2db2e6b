use log::LevelFilter;
use serde::Deserialize;

/// Logging knobs shared by both edge services.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    pub log_enabled: bool,
    pub log_level: Option<String>,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            log_enabled: true,
            log_level: None,
        }
    }
}

impl LogSettings {
    /// Resolves the configured level, falling back to `LOG_LEVEL` and then `info`.
    pub fn level_filter(&self) -> LevelFilter {
        if !self.log_enabled {
            return LevelFilter::Off;
        }
        let level = self
            .log_level
            .clone()
            .or_else(|| std::env::var("LOG_LEVEL").ok())
            .unwrap_or_else(|| "info".to_string());
        parse_level(&level)
    }
}

pub fn parse_level(level: &str) -> LevelFilter {
    match level.trim().to_ascii_lowercase().as_str() {
        "trace" => LevelFilter::Trace,
        "debug" => LevelFilter::Debug,
        "warn" => LevelFilter::Warn,
        "error" | "fatal" => LevelFilter::Error,
        "silent" | "off" => LevelFilter::Off,
        _ => LevelFilter::Info,
    }
}
