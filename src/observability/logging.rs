//! Logging configuration.

use crate::config::LoggingSettings;
use std::path::PathBuf;

/// Output format for log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable multi-line output.
    #[default]
    Pretty,
    /// One JSON object per event.
    Json,
}

impl LogFormat {
    /// Parses a format name, defaulting to pretty.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "json" => Self::Json,
            _ => Self::Pretty,
        }
    }
}

/// Resolved logging configuration.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Line format.
    pub format: LogFormat,
    /// `EnvFilter` directive.
    pub filter: String,
    /// Append to this file instead of stderr.
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Pretty,
            filter: "daybook=info,warn".to_string(),
            file: None,
        }
    }
}

impl LoggingConfig {
    /// Builds the config from file settings, then `DAYBOOK_LOG_FORMAT`,
    /// `DAYBOOK_LOG_FILE` and `RUST_LOG`. `verbose` raises daybook to debug
    /// unless `RUST_LOG` is set.
    #[must_use]
    pub fn from_settings(settings: Option<&LoggingSettings>, verbose: bool) -> Self {
        let mut config = Self::default();

        if let Some(settings) = settings {
            if let Some(format) = &settings.format {
                config.format = LogFormat::parse(format);
            }
            if let Some(filter) = &settings.filter {
                config.filter.clone_from(filter);
            }
            if let Some(file) = &settings.file {
                config.file = Some(crate::config::expand_home(file));
            }
        }

        if verbose {
            config.filter = "daybook=debug,info".to_string();
        }
        if let Ok(format) = std::env::var("DAYBOOK_LOG_FORMAT") {
            config.format = LogFormat::parse(&format);
        }
        if let Ok(file) = std::env::var("DAYBOOK_LOG_FILE") {
            if !file.trim().is_empty() {
                config.file = Some(PathBuf::from(file));
            }
        }
        if let Ok(filter) = std::env::var("RUST_LOG") {
            if !filter.trim().is_empty() {
                config.filter = filter;
            }
        }

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_parse() {
        assert_eq!(LogFormat::parse("JSON"), LogFormat::Json);
        assert_eq!(LogFormat::parse("pretty"), LogFormat::Pretty);
        assert_eq!(LogFormat::parse("anything"), LogFormat::Pretty);
    }

    #[test]
    fn test_settings_are_applied() {
        let settings = LoggingSettings {
            format: Some("json".to_string()),
            filter: Some("daybook=trace".to_string()),
            file: Some("/var/log/daybook.log".to_string()),
        };
        let config = LoggingConfig::from_settings(Some(&settings), false);
        if std::env::var("DAYBOOK_LOG_FORMAT").is_err() {
            assert_eq!(config.format, LogFormat::Json);
        }
        if std::env::var("RUST_LOG").is_err() {
            assert_eq!(config.filter, "daybook=trace");
        }
    }
}
