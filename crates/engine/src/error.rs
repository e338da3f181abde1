use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while assembling an engine.
///
/// A running conversation never fails; problems are turned into chat messages or log lines.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Core(#[from] chatbubble_core::Error),

    #[error("history storage unavailable: {0}")]
    Store(#[from] chatbubble_store::Error),
}
