use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for chatbubble-core
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types shared across the chatbubble crates
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error for file operations
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration errors
    #[error("configuration error: {0}")]
    Config(String),

    /// Request never produced a usable HTTP response (transport failure,
    /// timeout, non-2xx status, cancellation)
    #[error("network error: {0}")]
    Network(String),

    /// Response arrived but no reply text could be extracted from it
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// Markdown conversion failed
    #[error("render error: {0}")]
    Render(String),

    /// Parse/serialization errors
    #[error("parse error: {0}")]
    Parse(String),

    /// Generic errors
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Whether this error should be reported to the user as a malformed reply
    /// rather than a failed request.
    pub fn is_malformed_response(&self) -> bool {
        matches!(self, Error::MalformedResponse(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Parse(err.to_string())
    }
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// max_messages must leave room for at least the welcome message
    #[error("history.max_messages must be at least 1")]
    ZeroCapacity,

    /// Provider is missing its endpoint
    #[error("provider url must not be empty")]
    MissingEndpoint,

    /// File-backed storage needs a location
    #[error("history.path is required for the {0} backend")]
    MissingStoragePath(String),

    /// Storage key would produce an unusable file name
    #[error("invalid storage key: {0}")]
    InvalidStorageKey(String),

    /// Unknown log format string
    #[error("invalid log format: {0}")]
    InvalidLogFormat(String),

    /// Config file could not be located
    #[error("config file not found: {0}")]
    NotFound(PathBuf),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    TomlParse(String),
}

impl From<toml::de::Error> for ConfigError {
    fn from(err: toml::de::Error) -> Self {
        ConfigError::TomlParse(err.to_string())
    }
}

impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Self {
        Error::Config(err.to_string())
    }
}
