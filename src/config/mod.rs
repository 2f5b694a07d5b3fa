//! Configuration management.
//!
//! Settings come from three layers, later layers winning:
//!
//! 1. Built-in defaults
//! 2. A TOML file (`--config`, `DAYBOOK_CONFIG_PATH`, or the platform config dir)
//! 3. Environment variables (a `.env` file in the working directory is loaded first)
//!
//! ```toml
//! [journal]
//! dir = "~/Documents/Obsidian/Daily"
//! summary_30 = false
//!
//! [messages]
//! endpoint = "https://chat.example.com/api/saved"
//! polling_interval_secs = 600
//! ```

mod features;

pub use features::JournalFeatures;

use crate::{Error, Result};
use secrecy::SecretString;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default 7-day summary prompt.
pub const SUMMARY_7_PROMPT: &str = "Summarize the main themes, trajectory, and insights from the past 7 days of journal entries in three sentences.";

/// Default 30-day summary prompt.
pub const SUMMARY_30_PROMPT: &str = "Summarize the main themes, trajectory, and insights from the past 30 days of journal entries in three sentences.";

/// Main configuration for daybook.
#[derive(Debug, Clone, Default)]
pub struct DaybookConfig {
    /// Daily journal settings.
    pub journal: JournalConfig,
    /// Local LLM settings.
    pub llm: LlmConfig,
    /// Saved-message sync settings.
    pub messages: MessagesConfig,
    /// Lifelog sync settings.
    pub lifelog: LifelogConfig,
    /// Classifier settings.
    pub classify: ClassifyConfig,
    /// Retry policy overrides for remote calls.
    pub retry: RetryConfig,
    /// Logging overrides.
    pub logging: LoggingSettings,
}

/// Daily journal settings.
#[derive(Debug, Clone)]
pub struct JournalConfig {
    /// Folder holding `YYYY-MM-DD.md` notes.
    pub dir: PathBuf,
    /// Template used for a new day's note.
    pub template: PathBuf,
    /// Optional steps.
    pub features: JournalFeatures,
    /// Prompt for the 7-day summary.
    pub summary_7_prompt: String,
    /// Prompt for the 30-day summary.
    pub summary_30_prompt: String,
}

impl Default for JournalConfig {
    fn default() -> Self {
        let obsidian = home_dir().join("Documents").join("Obsidian");
        Self {
            dir: obsidian.join("Daily"),
            template: obsidian.join("Templates").join("Daily Template.md"),
            features: JournalFeatures::default(),
            summary_7_prompt: SUMMARY_7_PROMPT.to_string(),
            summary_30_prompt: SUMMARY_30_PROMPT.to_string(),
        }
    }
}

/// Local LLM (Ollama) settings.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// Base URL of the Ollama server.
    pub endpoint: String,
    /// Model name.
    pub model: String,
    /// Request timeout in milliseconds.
    pub timeout_ms: Option<u64>,
    /// Connect timeout in milliseconds.
    pub connect_timeout_ms: Option<u64>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            endpoint: crate::llm::OllamaClient::DEFAULT_ENDPOINT.to_string(),
            model: crate::llm::OllamaClient::DEFAULT_MODEL.to_string(),
            timeout_ms: None,
            connect_timeout_ms: None,
        }
    }
}

/// Saved-message sync settings.
#[derive(Debug, Clone)]
pub struct MessagesConfig {
    /// Message-history API endpoint.
    pub endpoint: Option<String>,
    /// Bearer token for the endpoint.
    pub token: Option<SecretString>,
    /// Archive file (`result.json`).
    pub archive_path: PathBuf,
    /// Directory for the lock file.
    pub data_dir: PathBuf,
    /// Session name; names the lock file.
    pub session: String,
    /// Messages requested per batch.
    pub batch_size: usize,
    /// Pause between batches.
    pub batch_delay: Duration,
    /// Baseline polling interval in monitor mode.
    pub polling_interval: Duration,
    /// Consecutive known IDs that end a fetch.
    pub max_consecutive_duplicates: usize,
    /// Rate-limit waits allowed per fetch.
    pub max_rate_limit_waits: u32,
}

impl Default for MessagesConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            token: None,
            archive_path: PathBuf::from("result.json"),
            data_dir: data_dir(),
            session: "daybook".to_string(),
            batch_size: 100,
            batch_delay: Duration::from_secs(3),
            polling_interval: Duration::from_secs(300),
            max_consecutive_duplicates: 5,
            max_rate_limit_waits: 10,
        }
    }
}

/// Lifelog sync settings.
#[derive(Debug, Clone)]
pub struct LifelogConfig {
    /// Lifelog API endpoint.
    pub endpoint: String,
    /// API key sent as `X-API-Key`.
    pub api_key: Option<SecretString>,
    /// Primary output directory; also holds `.last_sync`.
    pub save_dir: PathBuf,
    /// Optional secondary copy destination.
    pub backup_dir: Option<PathBuf>,
    /// IANA timezone passed to the API.
    pub timezone: String,
}

impl Default for LifelogConfig {
    fn default() -> Self {
        Self {
            endpoint: crate::lifelog::DEFAULT_ENDPOINT.to_string(),
            api_key: None,
            save_dir: data_dir().join("limitless_data"),
            backup_dir: None,
            timezone: "America/New_York".to_string(),
        }
    }
}

/// Classifier settings.
#[derive(Debug, Clone)]
pub struct ClassifyConfig {
    /// Pattern definition file.
    pub patterns_path: PathBuf,
    /// Report directory; defaults to the archive's directory.
    pub output_dir: Option<PathBuf>,
    /// Messages to analyze; zero or less means all.
    pub max_messages: i64,
    /// Neighbours shown before each message.
    pub context_before: usize,
    /// Neighbours shown after each message.
    pub context_after: usize,
}

impl Default for ClassifyConfig {
    fn default() -> Self {
        Self {
            patterns_path: PathBuf::from("patterns.txt"),
            output_dir: None,
            max_messages: 10,
            context_before: 3,
            context_after: 2,
        }
    }
}

/// Retry section; every field is optional.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RetryConfig {
    /// Total attempts including the first.
    pub max_attempts: Option<u32>,
    /// First retry delay in milliseconds.
    pub base_delay_ms: Option<u64>,
    /// Delay ceiling in milliseconds.
    pub max_delay_ms: Option<u64>,
    /// Random spread fraction.
    pub jitter: Option<f64>,
}

/// Logging section; every field is optional.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoggingSettings {
    /// `pretty` or `json`.
    pub format: Option<String>,
    /// `EnvFilter` directive, e.g. `daybook=debug`.
    pub filter: Option<String>,
    /// Append logs to this file instead of stderr.
    pub file: Option<String>,
}

/// Configuration file structure (for TOML parsing).
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    /// Journal section.
    pub journal: Option<ConfigFileJournal>,
    /// LLM section.
    pub llm: Option<ConfigFileLlm>,
    /// Messages section.
    pub messages: Option<ConfigFileMessages>,
    /// Lifelog section.
    pub lifelog: Option<ConfigFileLifelog>,
    /// Classifier section.
    pub classify: Option<ConfigFileClassify>,
    /// Retry section.
    pub retry: Option<RetryConfig>,
    /// Logging section.
    pub logging: Option<LoggingSettings>,
}

/// Journal section in config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileJournal {
    /// Journal directory.
    pub dir: Option<String>,
    /// Template file.
    pub template: Option<String>,
    /// 7-day summary toggle.
    pub summary_7: Option<bool>,
    /// 30-day summary toggle.
    pub summary_30: Option<bool>,
    /// Lifelog sync toggle.
    pub lifelog_sync: Option<bool>,
    /// Git commit toggle.
    pub git: Option<bool>,
    /// 7-day prompt.
    pub summary_7_prompt: Option<String>,
    /// 30-day prompt.
    pub summary_30_prompt: Option<String>,
}

/// LLM section in config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileLlm {
    /// Ollama base URL.
    pub endpoint: Option<String>,
    /// Model name.
    pub model: Option<String>,
    /// Request timeout.
    pub timeout_ms: Option<u64>,
    /// Connect timeout.
    pub connect_timeout_ms: Option<u64>,
}

/// Messages section in config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileMessages {
    /// API endpoint.
    pub endpoint: Option<String>,
    /// Bearer token.
    pub token: Option<String>,
    /// Archive path.
    pub archive_path: Option<String>,
    /// Lock directory.
    pub data_dir: Option<String>,
    /// Session name.
    pub session: Option<String>,
    /// Batch size.
    pub batch_size: Option<usize>,
    /// Batch delay in seconds.
    pub batch_delay_secs: Option<f64>,
    /// Polling interval in seconds.
    pub polling_interval_secs: Option<u64>,
    /// Duplicate run threshold.
    pub max_consecutive_duplicates: Option<usize>,
    /// Rate-limit wait budget.
    pub max_rate_limit_waits: Option<u32>,
}

/// Lifelog section in config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileLifelog {
    /// API endpoint.
    pub endpoint: Option<String>,
    /// API key.
    pub api_key: Option<String>,
    /// Save directory.
    pub save_dir: Option<String>,
    /// Backup directory.
    pub backup_dir: Option<String>,
    /// Timezone.
    pub timezone: Option<String>,
}

/// Classifier section in config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileClassify {
    /// Pattern file.
    pub patterns_path: Option<String>,
    /// Report directory.
    pub output_dir: Option<String>,
    /// Message limit.
    pub max_messages: Option<i64>,
    /// Context before.
    pub context_before: Option<usize>,
    /// Context after.
    pub context_after: Option<usize>,
}

impl DaybookConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| Error::OperationFailed {
            operation: "read_config_file".to_string(),
            cause: format!("{}: {e}", path.display()),
        })?;

        Self::parse(&contents)
    }

    /// Parses TOML text over the defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not a valid config file.
    pub fn parse(contents: &str) -> Result<Self> {
        let file: ConfigFile = toml::from_str(contents).map_err(|e| Error::OperationFailed {
            operation: "parse_config_file".to_string(),
            cause: e.to_string(),
        })?;

        Ok(Self::from_config_file(file))
    }

    /// Loads configuration from the default location.
    ///
    /// Checks the following paths in order:
    /// 1. Platform-specific config dir (`~/Library/Application Support/daybook/` on macOS)
    /// 2. XDG config dir (`~/.config/daybook/` for Unix compatibility)
    ///
    /// Returns default configuration if no config file is found.
    #[must_use]
    pub fn load_default() -> Self {
        let Some(base_dirs) = directories::BaseDirs::new() else {
            return Self::default();
        };

        let candidates = [
            base_dirs.config_dir().join("daybook").join("config.toml"),
            base_dirs
                .home_dir()
                .join(".config")
                .join("daybook")
                .join("config.toml"),
        ];
        for candidate in &candidates {
            if !candidate.exists() {
                continue;
            }
            match Self::load_from_file(candidate) {
                Ok(config) => return config,
                Err(e) => {
                    tracing::warn!(path = %candidate.display(), error = %e, "Ignoring unreadable config file");
                },
            }
        }

        Self::default()
    }

    /// Resolves the configuration the binary runs with.
    ///
    /// An explicit path (flag or `DAYBOOK_CONFIG_PATH`) must load; otherwise the
    /// default locations are tried. Environment overrides are applied last.
    ///
    /// # Errors
    ///
    /// Returns an error if an explicitly named file cannot be loaded.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        let _ = dotenvy::dotenv();

        let env_path = std::env::var("DAYBOOK_CONFIG_PATH").ok().map(PathBuf::from);
        let config = match explicit.map(Path::to_path_buf).or(env_path) {
            Some(path) => Self::load_from_file(&path)?,
            None => Self::load_default(),
        };
        Ok(config.with_env_overrides())
    }

    /// Applies environment variable overrides for secrets and endpoints.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(token) = env_non_empty("DAYBOOK_MESSAGES_TOKEN") {
            self.messages.token = Some(SecretString::from(token));
        }
        if let Some(endpoint) = env_non_empty("DAYBOOK_MESSAGES_ENDPOINT") {
            self.messages.endpoint = Some(endpoint);
        }
        if let Some(key) = env_non_empty("LIMITLESS_API_KEY") {
            self.lifelog.api_key = Some(SecretString::from(key));
        }
        if let Some(dir) = env_non_empty("LIMITLESS_SAVE_DIR") {
            self.lifelog.save_dir = expand_home(&dir);
        }
        if let Some(dir) = env_non_empty("LIMITLESS_BACKUP_DIR") {
            self.lifelog.backup_dir = Some(expand_home(&dir));
        }
        if let Some(tz) = env_non_empty("LIMITLESS_TIMEZONE") {
            self.lifelog.timezone = tz;
        }
        if let Some(host) = env_non_empty("OLLAMA_HOST") {
            self.llm.endpoint = host;
        }
        if let Some(model) = env_non_empty("OLLAMA_MODEL") {
            self.llm.model = model;
        }
        if let Some(timeout) = env_non_empty("DAYBOOK_LLM_TIMEOUT_MS").and_then(|v| v.parse().ok())
        {
            self.llm.timeout_ms = Some(timeout);
        }
        self
    }

    /// Converts a `ConfigFile` to `DaybookConfig`.
    fn from_config_file(file: ConfigFile) -> Self {
        let mut config = Self::default();

        if let Some(journal) = file.journal {
            apply_journal(&mut config.journal, journal);
        }
        if let Some(llm) = file.llm {
            if let Some(endpoint) = llm.endpoint {
                config.llm.endpoint = endpoint;
            }
            if let Some(model) = llm.model {
                config.llm.model = model;
            }
            config.llm.timeout_ms = llm.timeout_ms.or(config.llm.timeout_ms);
            config.llm.connect_timeout_ms = llm.connect_timeout_ms.or(config.llm.connect_timeout_ms);
        }
        if let Some(messages) = file.messages {
            apply_messages(&mut config.messages, messages);
        }
        if let Some(lifelog) = file.lifelog {
            if let Some(endpoint) = lifelog.endpoint {
                config.lifelog.endpoint = endpoint;
            }
            if let Some(key) = lifelog.api_key {
                config.lifelog.api_key = Some(SecretString::from(key));
            }
            if let Some(dir) = lifelog.save_dir {
                config.lifelog.save_dir = expand_home(&dir);
            }
            if let Some(dir) = lifelog.backup_dir {
                config.lifelog.backup_dir = Some(expand_home(&dir));
            }
            if let Some(tz) = lifelog.timezone {
                config.lifelog.timezone = tz;
            }
        }
        if let Some(classify) = file.classify {
            if let Some(path) = classify.patterns_path {
                config.classify.patterns_path = expand_home(&path);
            }
            if let Some(dir) = classify.output_dir {
                config.classify.output_dir = Some(expand_home(&dir));
            }
            if let Some(max) = classify.max_messages {
                config.classify.max_messages = max;
            }
            if let Some(before) = classify.context_before {
                config.classify.context_before = before;
            }
            if let Some(after) = classify.context_after {
                config.classify.context_after = after;
            }
        }
        if let Some(retry) = file.retry {
            config.retry = retry;
        }
        if let Some(logging) = file.logging {
            config.logging = logging;
        }

        config
    }
}

fn apply_journal(journal: &mut JournalConfig, file: ConfigFileJournal) {
    if let Some(dir) = file.dir {
        journal.dir = expand_home(&dir);
    }
    if let Some(template) = file.template {
        journal.template = expand_home(&template);
    }
    if let Some(v) = file.summary_7 {
        journal.features.summary_7 = v;
    }
    if let Some(v) = file.summary_30 {
        journal.features.summary_30 = v;
    }
    if let Some(v) = file.lifelog_sync {
        journal.features.lifelog_sync = v;
    }
    if let Some(v) = file.git {
        journal.features.git = v;
    }
    if let Some(prompt) = file.summary_7_prompt {
        journal.summary_7_prompt = prompt;
    }
    if let Some(prompt) = file.summary_30_prompt {
        journal.summary_30_prompt = prompt;
    }
}

fn apply_messages(messages: &mut MessagesConfig, file: ConfigFileMessages) {
    if let Some(endpoint) = file.endpoint {
        messages.endpoint = Some(endpoint);
    }
    if let Some(token) = file.token {
        messages.token = Some(SecretString::from(token));
    }
    if let Some(path) = file.archive_path {
        messages.archive_path = expand_home(&path);
    }
    if let Some(dir) = file.data_dir {
        messages.data_dir = expand_home(&dir);
    }
    if let Some(session) = file.session {
        messages.session = session;
    }
    if let Some(size) = file.batch_size {
        messages.batch_size = size.max(1);
    }
    if let Some(delay) = file.batch_delay_secs {
        messages.batch_delay = Duration::try_from_secs_f64(delay).unwrap_or(messages.batch_delay);
    }
    if let Some(interval) = file.polling_interval_secs {
        messages.polling_interval = Duration::from_secs(interval);
    }
    if let Some(threshold) = file.max_consecutive_duplicates {
        messages.max_consecutive_duplicates = threshold.max(1);
    }
    if let Some(waits) = file.max_rate_limit_waits {
        messages.max_rate_limit_waits = waits;
    }
}

fn env_non_empty(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn home_dir() -> PathBuf {
    directories::BaseDirs::new().map_or_else(|| PathBuf::from("."), |d| d.home_dir().to_path_buf())
}

fn data_dir() -> PathBuf {
    directories::BaseDirs::new().map_or_else(
        || PathBuf::from(".daybook"),
        |d| d.data_dir().join("daybook"),
    )
}

/// Expands a leading `~/` to the home directory.
#[must_use]
pub fn expand_home(path: &str) -> PathBuf {
    match path.strip_prefix("~/") {
        Some(rest) => home_dir().join(rest),
        None if path == "~" => home_dir(),
        None => PathBuf::from(path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[test]
    fn test_defaults() {
        let config = DaybookConfig::default();
        assert!(config.journal.dir.ends_with("Documents/Obsidian/Daily"));
        assert_eq!(config.llm.model, "llama3.2");
        assert_eq!(config.messages.batch_size, 100);
        assert_eq!(config.messages.polling_interval, Duration::from_secs(300));
        assert_eq!(config.lifelog.timezone, "America/New_York");
        assert_eq!(config.classify.context_before, 3);
        assert_eq!(config.classify.context_after, 2);
    }

    #[test]
    fn test_parse_merges_over_defaults() {
        let config = DaybookConfig::parse(
            r#"
            [journal]
            dir = "/notes"
            summary_30 = false

            [messages]
            token = "abc"
            batch_delay_secs = 0.5

            [retry]
            max_attempts = 2
            "#,
        )
        .unwrap();

        assert_eq!(config.journal.dir, PathBuf::from("/notes"));
        assert!(!config.journal.features.summary_30);
        assert!(config.journal.features.summary_7);
        assert_eq!(
            config.messages.token.as_ref().map(|t| t.expose_secret().to_string()),
            Some("abc".to_string())
        );
        assert_eq!(config.messages.batch_delay, Duration::from_millis(500));
        assert_eq!(config.messages.batch_size, 100);
        assert_eq!(config.retry.max_attempts, Some(2));
    }

    #[test]
    fn test_parse_rejects_unknown_sections() {
        assert!(DaybookConfig::parse("[nonsense]\nx = 1\n").is_err());
    }

    #[test]
    fn test_load_from_missing_file_fails() {
        let result = DaybookConfig::load_from_file(Path::new("/nonexistent/daybook.toml"));
        assert!(matches!(result, Err(Error::OperationFailed { .. })));
    }

    #[test]
    fn test_expand_home() {
        assert_eq!(expand_home("/abs/path"), PathBuf::from("/abs/path"));
        assert!(expand_home("~/notes").ends_with("notes"));
        assert!(!expand_home("~/notes").starts_with("~"));
    }
}
