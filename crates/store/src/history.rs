//! The bounded, alternating conversation log.
//!
//! The log is persisted as a single JSON array under one storage key and is
//! read-modify-written as a whole on every change. Storage problems never escape this module:
//! unreadable data loads as an empty history and failed writes are logged and dropped.

use crate::backend::{FileStorage, MemoryStorage, StorageBackend};
use crate::error::Result;
use crate::sqlite::SqliteStorage;

use chatbubble_core::config::{DEFAULT_MAX_MESSAGES, DEFAULT_STORAGE_KEY, DEFAULT_WELCOME_MESSAGE};
use chatbubble_core::logging::preview;
use chatbubble_core::{HistoryConfig, Message, StorageKind};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::instrument;

/// What happened to a [`HistoryStore::save`] call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    /// Appended and persisted
    Saved(Message),
    /// Appended in memory but the write failed; the next load will not see it
    Unpersisted(Message),
    /// Same sender as the current last message; nothing was written
    DuplicateSender,
}

impl SaveOutcome {
    /// The message as it now sits in the log, if it was accepted
    pub fn message(&self) -> Option<&Message> {
        match self {
            SaveOutcome::Saved(msg) | SaveOutcome::Unpersisted(msg) => Some(msg),
            SaveOutcome::DuplicateSender => None,
        }
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, SaveOutcome::DuplicateSender)
    }
}

/// Persisted record as found on disk; older or hand-edited data may lack `order`
#[derive(Debug, Deserialize)]
struct StoredMessage {
    message: String,
    #[serde(rename = "isUser")]
    is_user: bool,
    #[serde(default)]
    timestamp: DateTime<Utc>,
    #[serde(default)]
    order: Option<usize>,
}

/// Durable message log with capacity eviction and sender alternation
pub struct HistoryStore {
    backend: Arc<dyn StorageBackend>,
    key: String,
    max_messages: usize,
    welcome_message: String,
    /// Serializes read-modify-write cycles
    write_lock: Mutex<()>,
}

impl HistoryStore {
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self {
            backend,
            key: DEFAULT_STORAGE_KEY.to_string(),
            max_messages: DEFAULT_MAX_MESSAGES,
            welcome_message: DEFAULT_WELCOME_MESSAGE.to_string(),
            write_lock: Mutex::new(()),
        }
    }

    /// Store backed by a fresh in-memory map
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStorage::new()))
    }

    /// Open the backend selected in `[history]` and apply its key and capacity
    pub async fn from_config(config: &HistoryConfig, welcome_message: &str) -> Result<Self> {
        let backend = open_backend(config).await?;
        Ok(Self::new(backend)
            .with_key(&config.storage_key)
            .with_max_messages(config.max_messages)
            .with_welcome_message(welcome_message))
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    /// Capacity of the sliding window; clamped to at least one message
    pub fn with_max_messages(mut self, max_messages: usize) -> Self {
        self.max_messages = max_messages.max(1);
        self
    }

    pub fn with_welcome_message(mut self, text: impl Into<String>) -> Self {
        self.welcome_message = text.into();
        self
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn max_messages(&self) -> usize {
        self.max_messages
    }

    pub fn welcome_message(&self) -> &str {
        &self.welcome_message
    }

    /// Read the log, sorted by `order` and re-based to `0..n`.
    ///
    /// Entries without an `order` take their array index. Absent or unparsable data yields an
    /// empty log.
    #[instrument(skip(self), fields(key = %self.key))]
    pub async fn load(&self) -> Vec<Message> {
        let raw = match self.backend.get(&self.key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return Vec::new(),
            Err(e) => {
                tracing::error!("Error loading chat history: {}", e);
                return Vec::new();
            }
        };

        let stored: Vec<StoredMessage> = match serde_json::from_str(&raw) {
            Ok(stored) => stored,
            Err(e) => {
                tracing::error!("Stored chat history is corrupt, treating as empty: {}", e);
                return Vec::new();
            }
        };

        let mut messages: Vec<Message> = stored
            .into_iter()
            .enumerate()
            .map(|(index, msg)| Message {
                text: msg.message,
                is_user: msg.is_user,
                timestamp: msg.timestamp,
                order: msg.order.unwrap_or(index),
            })
            .collect();

        messages.sort_by_key(|msg| msg.order);
        renumber(&mut messages);

        tracing::trace!("Loaded {} messages", messages.len());
        messages
    }

    /// Append a message, evict beyond capacity, and persist.
    ///
    /// A message from the same sender as the current last message is refused.
    #[instrument(skip(self, text), fields(key = %self.key))]
    pub async fn save(&self, text: &str, is_user: bool) -> SaveOutcome {
        let _guard = self.write_lock.lock().await;
        self.save_locked(text, is_user).await
    }

    async fn save_locked(&self, text: &str, is_user: bool) -> SaveOutcome {
        let mut history = self.load().await;

        if let Some(last) = history.last()
            && last.is_user == is_user
        {
            tracing::warn!("Attempting to save message with same sender twice in a row");
            return SaveOutcome::DuplicateSender;
        }

        let mut saved = Message::new(text, is_user, history.len());
        history.push(saved.clone());

        if history.len() > self.max_messages {
            let excess = history.len() - self.max_messages;
            history.drain(..excess);
            renumber(&mut history);
            saved.order = history.len() - 1;
            tracing::debug!("Evicted {} oldest messages", excess);
        }

        match self.persist(&history).await {
            Ok(()) => {
                tracing::debug!(order = saved.order, "Saved message: {}", preview(&saved.text, 80));
                SaveOutcome::Saved(saved)
            }
            Err(e) => {
                tracing::error!("Error saving chat history: {}", e);
                SaveOutcome::Unpersisted(saved)
            }
        }
    }

    async fn persist(&self, history: &[Message]) -> Result<()> {
        let json = serde_json::to_string(history)?;
        self.backend.set(&self.key, &json).await
    }

    /// Delete the persisted log and re-seed the welcome message.
    ///
    /// Returns whether the delete succeeded; nothing is re-seeded when it did not.
    #[instrument(skip(self), fields(key = %self.key))]
    pub async fn clear(&self) -> bool {
        let _guard = self.write_lock.lock().await;

        match self.backend.remove(&self.key).await {
            Ok(existed) => {
                tracing::info!(existed, "Chat history cleared");
                self.initialize_locked().await;
                true
            }
            Err(e) => {
                tracing::error!("Error clearing chat history: {}", e);
                false
            }
        }
    }

    /// Seed the welcome message if the log is empty. Idempotent.
    #[instrument(skip(self), fields(key = %self.key))]
    pub async fn initialize(&self) {
        let _guard = self.write_lock.lock().await;
        self.initialize_locked().await;
    }

    async fn initialize_locked(&self) {
        if self.load().await.is_empty() {
            tracing::debug!("Seeding welcome message");
            let welcome = self.welcome_message.clone();
            if let SaveOutcome::Unpersisted(_) = self.save_locked(&welcome, false).await {
                tracing::warn!("Welcome message could not be persisted; history stays empty");
            }
        }
    }
}

fn renumber(messages: &mut [Message]) {
    for (index, msg) in messages.iter_mut().enumerate() {
        msg.order = index;
    }
}

/// Build the storage backend named by `[history]`
pub async fn open_backend(config: &HistoryConfig) -> Result<Arc<dyn StorageBackend>> {
    let path = config
        .resolved_path()
        .map_err(|e| crate::Error::database(e.to_string()))?;

    let backend: Arc<dyn StorageBackend> = match (config.storage, path) {
        (StorageKind::Memory, _) | (_, None) => Arc::new(MemoryStorage::new()),
        (StorageKind::File, Some(dir)) => Arc::new(FileStorage::new(dir)),
        (StorageKind::Sqlite, Some(db)) => Arc::new(SqliteStorage::open(&db).await?),
    };

    tracing::debug!(storage = %config.storage, "Opened history backend");
    Ok(backend)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use chatbubble_core::find_alternation_break;
    use tempfile::TempDir;

    /// Reads succeed, writes and deletes always fail
    struct ReadOnlyStorage {
        inner: MemoryStorage,
    }

    #[async_trait::async_trait]
    impl StorageBackend for ReadOnlyStorage {
        async fn get(&self, key: &str) -> Result<Option<String>> {
            self.inner.get(key).await
        }

        async fn set(&self, _key: &str, _value: &str) -> Result<()> {
            Err(Error::Io(std::io::Error::new(std::io::ErrorKind::PermissionDenied, "quota exceeded")))
        }

        async fn remove(&self, _key: &str) -> Result<bool> {
            Err(Error::Io(std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only")))
        }
    }

    fn store_with(storage: Arc<MemoryStorage>) -> HistoryStore {
        HistoryStore::new(storage)
    }

    #[tokio::test]
    async fn test_initialize_seeds_welcome() {
        let store = HistoryStore::in_memory();
        store.initialize().await;

        let history = store.load().await;
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].text, "Hi! How can I help you today?");
        assert!(!history[0].is_user);
        assert_eq!(history[0].order, 0);
    }

    #[tokio::test]
    async fn test_initialize_is_idempotent() {
        let store = HistoryStore::in_memory();
        store.initialize().await;
        store.save("hello", true).await;
        store.initialize().await;

        assert_eq!(store.load().await.len(), 2);
    }

    #[tokio::test]
    async fn test_save_assigns_order() {
        let store = HistoryStore::in_memory();
        store.initialize().await;

        let outcome = store.save("hello", true).await;
        let saved = outcome.message().unwrap();
        assert_eq!(saved.order, 1);
        assert!(saved.is_user);

        let outcome = store.save("Hi there!", false).await;
        assert_eq!(outcome.message().unwrap().order, 2);
        assert_eq!(store.load().await.len(), 3);
    }

    #[tokio::test]
    async fn test_save_rejects_same_sender() {
        let store = HistoryStore::in_memory();
        store.initialize().await;
        store.save("hello", true).await;

        let outcome = store.save("world", true).await;
        assert_eq!(outcome, SaveOutcome::DuplicateSender);
        assert!(outcome.is_rejected());

        let history = store.load().await;
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].text, "hello");
    }

    #[tokio::test]
    async fn test_alternation_holds_under_arbitrary_saves() {
        let store = HistoryStore::in_memory().with_max_messages(7);
        store.initialize().await;

        let pattern = [true, true, false, false, true, false, true, true, false, true, false, false];
        for (i, is_user) in pattern.iter().enumerate() {
            store.save(&format!("m{i}"), *is_user).await;
        }

        let history = store.load().await;
        assert_eq!(find_alternation_break(&history), None);
    }

    #[tokio::test]
    async fn test_capacity_keeps_most_recent() {
        let store = HistoryStore::in_memory().with_max_messages(5);
        store.initialize().await;

        for i in 0..10 {
            store.save(&format!("user {i}"), true).await;
            store.save(&format!("bot {i}"), false).await;
        }

        let history = store.load().await;
        assert_eq!(history.len(), 5);
        assert_eq!(history.iter().map(|m| m.order).collect::<Vec<_>>(), vec![0, 1, 2, 3, 4]);
        assert_eq!(history.last().unwrap().text, "bot 9");
        assert_eq!(history[0].text, "bot 7");
    }

    #[tokio::test]
    async fn test_eviction_renumbers_saved_message() {
        let store = HistoryStore::in_memory().with_max_messages(2);
        store.initialize().await;
        store.save("a", true).await;

        let outcome = store.save("b", false).await;
        assert_eq!(outcome.message().unwrap().order, 1);
    }

    #[tokio::test]
    async fn test_clear_reseeds() {
        let store = HistoryStore::in_memory();
        store.initialize().await;
        store.save("hello", true).await;
        store.save("reply", false).await;

        assert!(store.clear().await);

        let history = store.load().await;
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].text, store.welcome_message());
        assert_eq!(history[0].order, 0);
    }

    #[tokio::test]
    async fn test_load_is_idempotent() {
        let store = HistoryStore::in_memory();
        store.initialize().await;
        store.save("hello", true).await;

        let first = store.load().await;
        let second = store.load().await;
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_load_absent_is_empty() {
        let store = HistoryStore::in_memory();
        assert!(store.load().await.is_empty());
    }

    #[tokio::test]
    async fn test_load_corrupt_is_empty() {
        let storage = Arc::new(MemoryStorage::new());
        storage.set(DEFAULT_STORAGE_KEY, "{not json").await.unwrap();

        let store = store_with(storage.clone());
        assert!(store.load().await.is_empty());

        storage.set(DEFAULT_STORAGE_KEY, "null").await.unwrap();
        assert!(store.load().await.is_empty());
    }

    #[tokio::test]
    async fn test_load_repairs_missing_order_and_sorts() {
        let storage = Arc::new(MemoryStorage::new());
        let raw = r#"[
            {"message": "third", "isUser": false, "timestamp": "2024-01-01T00:00:02Z", "order": 7},
            {"message": "first", "isUser": false, "timestamp": "2024-01-01T00:00:00Z"},
            {"message": "second", "isUser": true, "timestamp": "2024-01-01T00:00:01Z", "order": 3}
        ]"#;
        storage.set(DEFAULT_STORAGE_KEY, raw).await.unwrap();

        let history = store_with(storage).load().await;
        let texts: Vec<_> = history.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, vec!["first", "second", "third"]);
        assert_eq!(history.iter().map(|m| m.order).collect::<Vec<_>>(), vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_load_accepts_missing_timestamp() {
        let storage = Arc::new(MemoryStorage::new());
        storage
            .set(DEFAULT_STORAGE_KEY, r#"[{"message": "hi", "isUser": false, "order": 0}]"#)
            .await
            .unwrap();

        let store = store_with(storage);
        let first = store.load().await;
        assert_eq!(first.len(), 1);
        assert_eq!(first, store.load().await);
    }

    #[tokio::test]
    async fn test_persisted_shape() {
        let storage = Arc::new(MemoryStorage::new());
        let store = store_with(storage.clone());
        store.initialize().await;

        let raw = storage.get(DEFAULT_STORAGE_KEY).await.unwrap().unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        let first = &value[0];
        assert_eq!(first["message"], "Hi! How can I help you today?");
        assert_eq!(first["isUser"], false);
        assert_eq!(first["order"], 0);
    }

    #[tokio::test]
    async fn test_write_failure_is_not_propagated() {
        let store = HistoryStore::new(Arc::new(ReadOnlyStorage { inner: MemoryStorage::new() }));

        let outcome = store.save("hello", false).await;
        assert!(matches!(outcome, SaveOutcome::Unpersisted(_)));
        assert!(store.load().await.is_empty());
    }

    #[tokio::test]
    async fn test_initialize_on_failed_write_stays_empty() {
        let store = HistoryStore::new(Arc::new(ReadOnlyStorage { inner: MemoryStorage::new() }));

        store.initialize().await;
        assert!(store.load().await.is_empty());

        store.initialize().await;
        assert!(store.load().await.is_empty());
    }

    #[tokio::test]
    async fn test_clear_failure_returns_false() {
        let inner = MemoryStorage::new();
        inner.set(DEFAULT_STORAGE_KEY, "[]").await.unwrap();
        let store = HistoryStore::new(Arc::new(ReadOnlyStorage { inner }));

        assert!(!store.clear().await);
    }

    #[tokio::test]
    async fn test_custom_key_and_welcome() {
        let storage = Arc::new(MemoryStorage::new());
        let store = store_with(storage.clone()).with_key("support").with_welcome_message("Welcome!");
        store.initialize().await;

        assert!(storage.get("support").await.unwrap().is_some());
        assert!(storage.get(DEFAULT_STORAGE_KEY).await.unwrap().is_none());
        assert_eq!(store.load().await[0].text, "Welcome!");
    }

    #[tokio::test]
    async fn test_zero_capacity_is_clamped() {
        let store = HistoryStore::in_memory().with_max_messages(0);
        assert_eq!(store.max_messages(), 1);

        store.initialize().await;
        store.save("hello", true).await;
        let history = store.load().await;
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].text, "hello");
    }

    #[tokio::test]
    async fn test_from_config_file_backend_persists() {
        let temp_dir = TempDir::new().unwrap();
        let config = HistoryConfig {
            storage: StorageKind::File,
            path: Some(temp_dir.path().to_path_buf()),
            ..Default::default()
        };

        {
            let store = HistoryStore::from_config(&config, "Hello from file").await.unwrap();
            store.initialize().await;
            store.save("question", true).await;
        }

        let store = HistoryStore::from_config(&config, "Hello from file").await.unwrap();
        let history = store.load().await;
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].text, "Hello from file");
        assert!(temp_dir.path().join("chat_widget_history.json").exists());
    }

    #[tokio::test]
    async fn test_from_config_sqlite_backend_persists() {
        let temp_dir = TempDir::new().unwrap();
        let config = HistoryConfig {
            storage: StorageKind::Sqlite,
            path: Some(temp_dir.path().join("history.db")),
            max_messages: 3,
            ..Default::default()
        };

        {
            let store = HistoryStore::from_config(&config, "hi").await.unwrap();
            store.initialize().await;
            store.save("one", true).await;
            store.save("two", false).await;
            store.save("three", true).await;
        }

        let store = HistoryStore::from_config(&config, "hi").await.unwrap();
        let history = store.load().await;
        let texts: Vec<_> = history.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, vec!["one", "two", "three"]);
    }

    #[tokio::test]
    async fn test_concurrent_saves_keep_alternation() {
        let store = Arc::new(HistoryStore::in_memory());
        store.initialize().await;

        let mut handles = Vec::new();
        for i in 0..8 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move { store.save(&format!("u{i}"), true).await }));
        }

        let mut accepted = 0;
        for handle in handles {
            if !handle.await.unwrap().is_rejected() {
                accepted += 1;
            }
        }

        assert_eq!(accepted, 1);
        assert_eq!(store.load().await.len(), 2);
    }
}
