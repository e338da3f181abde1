//! SQLite key/value backend
use crate::backend::StorageBackend;
use crate::error::{Error, Result};
use crate::migration::MigrationManager;

use rusqlite::{OptionalExtension, params};
use std::{path::Path, sync::Arc};
use tokio_rusqlite::Connection;
use tracing::instrument;

/// Histories stored as rows of a `kv_entries` table.
#[derive(Clone)]
pub struct SqliteStorage {
    conn: Arc<Connection>,
}

impl SqliteStorage {
    /// Open or create a database at the given path and run migrations
    #[instrument(skip_all, fields(db_path = %db_path.display()))]
    pub async fn open(db_path: &Path) -> Result<Self> {
        tracing::info!("Opening history database at {}", db_path.display());

        if let Some(parent) = db_path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }

        let conn = Connection::open(db_path)
            .await
            .map_err(|e| Error::database(format!("Failed to open database: {e}")))?;

        Self::from_connection(conn).await
    }

    /// Database that lives only as long as this handle
    pub async fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .await
            .map_err(|e| Error::database(format!("Failed to open in-memory database: {e}")))?;

        Self::from_connection(conn).await
    }

    async fn from_connection(conn: Connection) -> Result<Self> {
        conn.call(|conn| {
            tracing::debug!("Running migrations");
            MigrationManager::migrate(conn)?;
            tracing::trace!("Migrations complete");
            Ok::<(), rusqlite::Error>(())
        })
        .await
        .map_err(|e| Error::database(format!("Migration failed: {e}")))?;

        Ok(Self { conn: Arc::new(conn) })
    }
}

#[async_trait::async_trait]
impl StorageBackend for SqliteStorage {
    #[instrument(skip(self))]
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let key = key.to_owned();

        let value = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare_cached("SELECT value FROM kv_entries WHERE key = ?1")?;
                let value = stmt.query_row(params![&key], |row| row.get::<_, String>(0)).optional()?;
                Ok::<_, rusqlite::Error>(value)
            })
            .await?;

        Ok(value)
    }

    #[instrument(skip(self, value), fields(bytes = value.len()))]
    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let key = key.to_owned();
        let value = value.to_owned();

        self.conn
            .call(move |conn| {
                let mut stmt = conn.prepare_cached(
                    r#"
                    INSERT INTO kv_entries (key, value)
                    VALUES (?1, ?2)
                    ON CONFLICT (key) DO UPDATE SET
                        value = excluded.value,
                        updated_at = datetime('now')
                    "#,
                )?;
                stmt.execute(params![&key, &value])?;
                Ok::<_, rusqlite::Error>(())
            })
            .await?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn remove(&self, key: &str) -> Result<bool> {
        let key = key.to_owned();

        let deleted = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare_cached("DELETE FROM kv_entries WHERE key = ?1")?;
                let rows_affected = stmt.execute(params![&key])?;
                Ok::<_, rusqlite::Error>(rows_affected > 0)
            })
            .await?;

        Ok(deleted)
    }
}
