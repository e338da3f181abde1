//! Durable conversation log for the chat widget.
//!
//! A [`HistoryStore`] keeps the most recent messages of a single conversation behind a
//! [`StorageBackend`]. Three backends ship with the crate: a JSON file per key, a SQLite
//! key/value table, and a process-local map.
//!
//! # Example
//!
//! ```ignore
//! use chatbubble_store::{HistoryStore, SqliteStorage};
//! use std::sync::Arc;
//!
//! let backend = SqliteStorage::open(&db_path).await?;
//! let store = HistoryStore::new(Arc::new(backend)).with_max_messages(50);
//!
//! store.initialize().await;
//! store.save("What are your opening hours?", true).await;
//!
//! for msg in store.load().await {
//!     println!("{}: {}", msg.sender(), msg.text);
//! }
//! ```

mod backend;
mod error;
mod history;
mod migration;
mod schema;
mod sqlite;

pub use backend::{FileStorage, MemoryStorage, StorageBackend};
pub use error::{Error, Result};
pub use history::{HistoryStore, SaveOutcome, open_backend};
pub use sqlite::SqliteStorage;
