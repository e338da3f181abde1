use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{ConfigError, Result};

pub const DEFAULT_WELCOME_MESSAGE: &str = "Hi! How can I help you today?";
pub const DEFAULT_ERROR_MESSAGE: &str = "Sorry, there was an error processing your request.";
pub const DEFAULT_MALFORMED_MESSAGE: &str = "Sorry, I received an unexpected response format.";
pub const DEFAULT_STORAGE_KEY: &str = "chat_widget_history";
pub const DEFAULT_MAX_MESSAGES: usize = 50;
pub const DEFAULT_REPLAY_DELAY_MS: u64 = 100;

/// Where the conversation log is persisted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StorageKind {
    /// One JSON document per storage key inside a directory (default)
    #[default]
    File,
    /// Key/value table inside a SQLite database
    Sqlite,
    /// Process-local map; history is lost on exit
    Memory,
}

impl StorageKind {
    pub const VALUES: &[StorageKind] = &[StorageKind::File, StorageKind::Sqlite, StorageKind::Memory];

    pub fn as_str(&self) -> &'static str {
        match self {
            StorageKind::File => "file",
            StorageKind::Sqlite => "sqlite",
            StorageKind::Memory => "memory",
        }
    }
}

impl std::fmt::Display for StorageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for StorageKind {
    type Err = crate::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "file" => Ok(StorageKind::File),
            "sqlite" => Ok(StorageKind::Sqlite),
            "memory" => Ok(StorageKind::Memory),
            _ => Err(crate::Error::Config(format!("invalid storage backend: {}", s))),
        }
    }
}

/// Text the widget shows on its own behalf
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WidgetConfig {
    /// Header title
    #[serde(default = "default_title")]
    pub title: String,
    /// Seeded into an empty history
    #[serde(default = "default_welcome_message")]
    pub welcome_message: String,
    /// Stored as the system turn when the request fails
    #[serde(default = "default_error_message")]
    pub error_message: String,
    /// Stored as the system turn when the reply cannot be extracted
    #[serde(default = "default_malformed_message")]
    pub malformed_response_message: String,
}

fn default_title() -> String {
    "Chat".to_string()
}

fn default_welcome_message() -> String {
    DEFAULT_WELCOME_MESSAGE.to_string()
}

fn default_error_message() -> String {
    DEFAULT_ERROR_MESSAGE.to_string()
}

fn default_malformed_message() -> String {
    DEFAULT_MALFORMED_MESSAGE.to_string()
}

impl Default for WidgetConfig {
    fn default() -> Self {
        Self {
            title: default_title(),
            welcome_message: default_welcome_message(),
            error_message: default_error_message(),
            malformed_response_message: default_malformed_message(),
        }
    }
}

/// Persistence settings for the conversation log
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HistoryConfig {
    #[serde(default)]
    pub storage: StorageKind,
    /// Directory (file backend) or database file (sqlite backend).
    /// Defaults to `~/.chatbubble/history` or `~/.chatbubble/history.db`.
    #[serde(default)]
    pub path: Option<PathBuf>,
    #[serde(default = "default_storage_key")]
    pub storage_key: String,
    /// Sliding-window capacity of the log
    #[serde(default = "default_max_messages")]
    pub max_messages: usize,
}

fn default_storage_key() -> String {
    DEFAULT_STORAGE_KEY.to_string()
}

fn default_max_messages() -> usize {
    DEFAULT_MAX_MESSAGES
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            storage: StorageKind::default(),
            path: None,
            storage_key: default_storage_key(),
            max_messages: default_max_messages(),
        }
    }
}

impl HistoryConfig {
    /// The configured path, or the per-user default for the selected backend.
    ///
    /// Returns `None` for the memory backend.
    pub fn resolved_path(&self) -> Result<Option<PathBuf>> {
        if self.storage == StorageKind::Memory {
            return Ok(None);
        }

        if let Some(path) = &self.path {
            return Ok(Some(path.clone()));
        }

        let home = std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .map_err(|_| ConfigError::MissingStoragePath(self.storage.to_string()))?;

        let base = PathBuf::from(home).join(".chatbubble");
        Ok(Some(match self.storage {
            StorageKind::Sqlite => base.join("history.db"),
            _ => base.join("history"),
        }))
    }
}

/// Replay pacing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReplayConfig {
    /// Pause between two replayed messages
    #[serde(default = "default_replay_delay_ms")]
    pub delay_ms: u64,
}

fn default_replay_delay_ms() -> u64 {
    DEFAULT_REPLAY_DELAY_MS
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self { delay_ms: default_replay_delay_ms() }
    }
}

impl ReplayConfig {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

/// Conversational backend selection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "provider", rename_all = "lowercase")]
pub enum ProviderConfig {
    /// A Langflow flow run endpoint
    #[serde(rename = "langflow")]
    Langflow {
        /// Full run URL, e.g. `https://host/api/v1/run/<flow-id>?stream=false`
        url: String,
        /// Bearer token; takes precedence over `api_key_env`
        #[serde(default)]
        api_key: Option<String>,
        /// Environment variable holding the bearer token
        #[serde(default)]
        api_key_env: Option<String>,
        /// Per-component overrides forwarded verbatim as `tweaks`
        #[serde(default)]
        tweaks: serde_json::Map<String, serde_json::Value>,
        /// Extra request headers
        #[serde(default)]
        headers: HashMap<String, String>,
        #[serde(default = "default_timeout_secs")]
        timeout_secs: u64,
    },
    /// Scripted replies for offline use and tests
    #[serde(rename = "mock")]
    Mock {
        /// TOML file with `[[responses]]` entries
        #[serde(default)]
        responses_file: Option<PathBuf>,
    },
}

fn default_timeout_secs() -> u64 {
    60
}

impl Default for ProviderConfig {
    fn default() -> Self {
        ProviderConfig::Mock { responses_file: None }
    }
}

impl ProviderConfig {
    pub fn name(&self) -> &'static str {
        match self {
            ProviderConfig::Langflow { .. } => "langflow",
            ProviderConfig::Mock { .. } => "mock",
        }
    }

    /// Resolve the bearer token from the inline value or the environment
    pub fn api_key(&self) -> Option<String> {
        match self {
            ProviderConfig::Langflow { api_key: Some(key), .. } => Some(key.clone()),
            ProviderConfig::Langflow { api_key_env: Some(var), .. } => std::env::var(var).ok(),
            _ => None,
        }
    }
}

/// Logging configuration as read from the `[logging]` table
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    /// `pretty`, `json` or `compact`
    #[serde(default = "default_log_format")]
    pub format: String,
    #[serde(default)]
    pub file: FileLoggingConfig,
}

fn default_log_level() -> String {
    "warn".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: default_log_level(), format: default_log_format(), file: FileLoggingConfig::default() }
    }
}

/// Rolling JSON log file output
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileLoggingConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_file_log_level")]
    pub level: String,
    /// Overrides `CHATBUBBLE_LOG_DIR` and `~/.chatbubble/logs`
    #[serde(default)]
    pub directory: Option<PathBuf>,
}

fn default_file_log_level() -> String {
    "debug".to_string()
}

impl Default for FileLoggingConfig {
    fn default() -> Self {
        Self { enabled: false, level: default_file_log_level(), directory: None }
    }
}

/// Root configuration structure for chatbubble.toml
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub widget: WidgetConfig,
    #[serde(default)]
    pub history: HistoryConfig,
    #[serde(default)]
    pub replay: ReplayConfig,
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML string
    pub fn from_toml_str(toml_str: &str) -> Result<Self> {
        let config: Config = toml::from_str(toml_str).map_err(ConfigError::from)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a file
    pub fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()).into());
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.history.max_messages == 0 {
            return Err(ConfigError::ZeroCapacity.into());
        }

        let key = &self.history.storage_key;
        let key_ok = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.')
            && !key.starts_with('.');
        if !key_ok {
            return Err(ConfigError::InvalidStorageKey(key.clone()).into());
        }

        if let ProviderConfig::Langflow { url, .. } = &self.provider
            && url.trim().is_empty()
        {
            return Err(ConfigError::MissingEndpoint.into());
        }

        if !matches!(self.logging.format.to_lowercase().as_str(), "pretty" | "json" | "compact") {
            return Err(ConfigError::InvalidLogFormat(self.logging.format.clone()).into());
        }

        Ok(())
    }

    /// Get example configuration (as a string)
    pub fn example() -> &'static str {
        r#"# chatbubble configuration example
# Copy this file to chatbubble.toml and customize as needed

[widget]
title = "Chat"
welcome_message = "Hi! How can I help you today?"
error_message = "Sorry, there was an error processing your request."
malformed_response_message = "Sorry, I received an unexpected response format."

[history]
# Storage backend: "file", "sqlite", or "memory"
storage = "file"
# Directory (file) or database path (sqlite); defaults under ~/.chatbubble
# path = "/var/lib/chatbubble/history"
storage_key = "chat_widget_history"
# Oldest messages are evicted beyond this many
max_messages = 50

[replay]
# Pause between replayed messages when the widget opens
delay_ms = 100

[provider]
# Provider type: "langflow" or "mock"
provider = "langflow"
url = "https://api.langflow.astra.datastax.com/lf/<org>/api/v1/run/<flow>?stream=false"
# Bearer token read from this environment variable
api_key_env = "LANGFLOW_TOKEN"
timeout_secs = 60

# Forwarded verbatim as the request's "tweaks" object
[provider.tweaks]
"ChatInput-PLr2q" = {}
"ChatOutput-qVP2H" = {}

[logging]
level = "warn"
format = "pretty"

[logging.file]
enabled = false
level = "debug"
"#
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_storage_kind_values() {
        assert_eq!(StorageKind::File.as_str(), "file");
        assert_eq!(StorageKind::Sqlite.as_str(), "sqlite");
        assert_eq!(StorageKind::Memory.as_str(), "memory");
        assert_eq!(StorageKind::VALUES.len(), 3);
    }

    #[test]
    fn test_storage_kind_from_str() {
        assert_eq!(StorageKind::from_str("FILE").unwrap(), StorageKind::File);
        assert_eq!(StorageKind::from_str("sqlite").unwrap(), StorageKind::Sqlite);
        assert_eq!(StorageKind::from_str("Memory").unwrap(), StorageKind::Memory);
        assert!(StorageKind::from_str("redis").is_err());
    }

    #[test]
    fn test_defaults_match_widget() {
        let config = Config::default();
        assert_eq!(config.widget.welcome_message, "Hi! How can I help you today?");
        assert_eq!(config.history.max_messages, 50);
        assert_eq!(config.history.storage_key, "chat_widget_history");
        assert_eq!(config.replay.delay(), Duration::from_millis(100));
        assert!(matches!(config.provider, ProviderConfig::Mock { responses_file: None }));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_toml_is_default() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config.history.storage, StorageKind::File);
        assert_eq!(config.logging.level, "warn");
    }

    #[test]
    fn test_example_parses() {
        let config = Config::from_toml_str(Config::example()).unwrap();
        assert_eq!(config.provider.name(), "langflow");

        if let ProviderConfig::Langflow { tweaks, api_key_env, timeout_secs, .. } = &config.provider {
            assert!(tweaks.contains_key("ChatInput-PLr2q"));
            assert_eq!(api_key_env.as_deref(), Some("LANGFLOW_TOKEN"));
            assert_eq!(*timeout_secs, 60);
        } else {
            panic!("expected langflow provider");
        }
    }

    #[test]
    fn test_config_from_toml_str() {
        let toml = r#"
[history]
storage = "sqlite"
path = "/tmp/chat.db"
max_messages = 10

[replay]
delay_ms = 0

[provider]
provider = "langflow"
url = "http://localhost:7860/api/v1/run/abc"
api_key = "secret"

[provider.headers]
"X-Requested-With" = "XMLHttpRequest"
"#;

        let config = Config::from_toml_str(toml).unwrap();
        assert_eq!(config.history.storage, StorageKind::Sqlite);
        assert_eq!(config.history.max_messages, 10);
        assert_eq!(config.replay.delay_ms, 0);
        assert_eq!(config.provider.api_key().as_deref(), Some("secret"));
        assert_eq!(
            config.history.resolved_path().unwrap(),
            Some(PathBuf::from("/tmp/chat.db"))
        );

        if let ProviderConfig::Langflow { headers, .. } = &config.provider {
            assert_eq!(headers.get("X-Requested-With").map(String::as_str), Some("XMLHttpRequest"));
        }
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let err = Config::from_toml_str("[history]\nmax_messages = 0\n").unwrap_err();
        assert!(err.to_string().contains("max_messages"));
    }

    #[test]
    fn test_empty_endpoint_rejected() {
        let toml = r#"
[provider]
provider = "langflow"
url = "  "
"#;
        assert!(Config::from_toml_str(toml).is_err());
    }

    #[test]
    fn test_invalid_storage_key_rejected() {
        assert!(Config::from_toml_str("[history]\nstorage_key = \"../escape\"\n").is_err());
        assert!(Config::from_toml_str("[history]\nstorage_key = \"\"\n").is_err());
    }

    #[test]
    fn test_invalid_log_format_rejected() {
        assert!(Config::from_toml_str("[logging]\nformat = \"xml\"\n").is_err());
    }

    #[test]
    fn test_unknown_field_rejected() {
        assert!(Config::from_toml_str("[history]\ncapacity = 5\n").is_err());
    }

    #[test]
    fn test_memory_backend_has_no_path() {
        let history = HistoryConfig { storage: StorageKind::Memory, ..Default::default() };
        assert_eq!(history.resolved_path().unwrap(), None);
    }

    #[test]
    fn test_from_file_missing() {
        let err = Config::from_file(Path::new("/definitely/not/here.toml")).unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("chatbubble.toml");
        std::fs::write(&path, "[widget]\ntitle = \"Support\"\n").unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.widget.title, "Support");
    }

    #[test]
    fn test_api_key_from_env() {
        let provider = ProviderConfig::Langflow {
            url: "http://localhost".to_string(),
            api_key: None,
            api_key_env: Some("CHATBUBBLE_TEST_TOKEN_UNSET_VAR".to_string()),
            tweaks: serde_json::Map::new(),
            headers: HashMap::new(),
            timeout_secs: 5,
        };
        assert_eq!(provider.api_key(), None);
        assert_eq!(ProviderConfig::default().api_key(), None);
    }
}
