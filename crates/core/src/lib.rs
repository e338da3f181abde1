pub mod config;
pub mod error;
pub mod logging;
pub mod message;

pub use config::{
    Config, FileLoggingConfig, HistoryConfig, LoggingConfig, ProviderConfig, ReplayConfig, StorageKind, WidgetConfig,
};
pub use error::{ConfigError, Error, Result};
pub use message::{Message, Sender, find_alternation_break};
