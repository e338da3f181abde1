//! Schema migration logic for the SQLite backend
//!
//! Tracks applied migrations and applies pending ones up to the current schema version.

use crate::schema::{KV_ENTRIES_SQL, SCHEMA_VERSION, SCHEMA_VERSION_SQL};
use rusqlite::{Connection, params};
use tracing::{debug, info, trace};

/// Manages schema migrations for the SQLite backend
pub struct MigrationManager;

impl MigrationManager {
    /// Get the current schema version from the database
    ///
    /// Returns 0 if the schema_version table doesn't exist or is empty.
    pub fn get_current_version(conn: &Connection) -> rusqlite::Result<i32> {
        let table_exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version')",
            [],
            |row| row.get(0),
        )?;

        if !table_exists {
            trace!("schema_version table does not exist, returning version 0");
            return Ok(0);
        }

        let version: Option<i32> = conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| row.get(0))?;

        Ok(version.unwrap_or(0))
    }

    /// Apply pending migrations up to SCHEMA_VERSION
    ///
    /// Idempotent.
    pub fn migrate(conn: &Connection) -> rusqlite::Result<()> {
        let current_version = Self::get_current_version(conn)?;
        debug!("Current schema version: {}, target: {}", current_version, SCHEMA_VERSION);

        if current_version >= SCHEMA_VERSION {
            trace!("Schema is up to date, no migration needed");
            return Ok(());
        }

        info!("Migrating schema from version {} to {}", current_version, SCHEMA_VERSION);

        if current_version == 0 {
            Self::apply_v1_migration(conn)?;
        }

        info!("Schema migration complete");
        Ok(())
    }

    fn apply_v1_migration(conn: &Connection) -> rusqlite::Result<()> {
        debug!("Applying v1 migration");

        conn.execute_batch(SCHEMA_VERSION_SQL)?;
        conn.execute_batch(KV_ENTRIES_SQL)?;
        conn.execute("INSERT OR IGNORE INTO schema_version (version) VALUES (?1)", params![1])?;

        trace!("v1 migration applied successfully");
        Ok(())
    }
}
