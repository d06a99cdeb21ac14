// lidar-control-status-kv/src/lib.rs
// ============================================================================
// Crate: lidar-control-status-kv
// Description: SQLite-backed, TTL-expiring StatusStore implementation.
// Purpose: Durable last-write-wins workflow status projection with a fixed
//          time-to-live, standing in for a KeyDB/Redis deployment.
// Dependencies: rusqlite, lidar-control-core
// ============================================================================

//! ## Overview
//! Every write resets the row's `expires_at` to `now + `
//! [`STATUS_TTL_SECONDS`]; reads treat an expired row as absent without
//! requiring a background sweep, though [`SqliteStatusStore::sweep_expired`]
//! is available for callers that want to reclaim space proactively.

use std::path::Path;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use lidar_control_core::ids::WorkflowId;
use lidar_control_core::interfaces::STATUS_TTL_SECONDS;
use lidar_control_core::interfaces::StatusStore;
use lidar_control_core::interfaces::StatusStoreError;
use lidar_control_core::status::StatusRecord;
use rusqlite::Connection;
use rusqlite::OpenFlags;
use rusqlite::OptionalExtension;
use rusqlite::params;

/// Configuration for the SQLite status store.
#[derive(Debug, Clone)]
pub struct SqliteStatusStoreConfig {
    /// Path to the SQLite database file.
    pub path: PathBuf,
    /// Busy timeout in milliseconds.
    pub busy_timeout_ms: u64,
}

impl Default for SqliteStatusStoreConfig {
    fn default() -> Self {
        Self { path: PathBuf::from("status.sqlite3"), busy_timeout_ms: 5_000 }
    }
}

/// SQLite-backed status store.
pub struct SqliteStatusStore {
    connection: Mutex<Connection>,
}

impl SqliteStatusStore {
    /// Opens (or creates) the status store database.
    ///
    /// # Errors
    ///
    /// Returns [`StatusStoreError`] when the database cannot be opened or
    /// initialized.
    pub fn new(config: &SqliteStatusStoreConfig) -> Result<Self, StatusStoreError> {
        ensure_parent_dir(&config.path)?;
        let connection = open_connection(config)?;
        initialize_schema(&connection)?;
        Ok(Self { connection: Mutex::new(connection) })
    }

    /// Deletes every row whose TTL has already elapsed.
    ///
    /// # Errors
    ///
    /// Returns [`StatusStoreError`] on storage failure.
    pub fn sweep_expired(&self) -> Result<usize, StatusStoreError> {
        let guard = self.connection.lock().map_err(|_| StatusStoreError::Storage("status store mutex poisoned".to_string()))?;
        let deleted = guard
            .execute("DELETE FROM status_kv WHERE expires_at <= ?1", params![now_secs()])
            .map_err(|err| StatusStoreError::Storage(err.to_string()))?;
        Ok(deleted)
    }
}

impl StatusStore for SqliteStatusStore {
    fn set_status(&self, workflow_id: &WorkflowId, record: &StatusRecord) -> Result<(), StatusStoreError> {
        let status_label = serde_json::to_value(record.status)
            .map_err(|err| StatusStoreError::Storage(err.to_string()))?;
        let status_label = status_label
            .as_str()
            .ok_or_else(|| StatusStoreError::Storage("status did not serialize to a string".to_string()))?
            .to_string();
        let payload_json = serde_json::to_string(&record.payload).map_err(|err| StatusStoreError::Storage(err.to_string()))?;
        let expires_at = now_secs() + STATUS_TTL_SECONDS;
        let guard = self.connection.lock().map_err(|_| StatusStoreError::Storage("status store mutex poisoned".to_string()))?;
        guard
            .execute(
                "INSERT INTO status_kv (workflow_id, status, payload_json, expires_at) VALUES \
                 (?1, ?2, ?3, ?4) ON CONFLICT(workflow_id) DO UPDATE SET status = \
                 excluded.status, payload_json = excluded.payload_json, expires_at = \
                 excluded.expires_at",
                params![workflow_id.as_str(), status_label, payload_json, expires_at],
            )
            .map_err(|err| StatusStoreError::Storage(err.to_string()))?;
        Ok(())
    }

    fn get_status(&self, workflow_id: &WorkflowId) -> Result<Option<StatusRecord>, StatusStoreError> {
        let guard = self.connection.lock().map_err(|_| StatusStoreError::Storage("status store mutex poisoned".to_string()))?;
        let row = guard
            .query_row(
                "SELECT status, payload_json, expires_at FROM status_kv WHERE workflow_id = ?1",
                params![workflow_id.as_str()],
                |row| {
                    let status: String = row.get(0)?;
                    let payload_json: String = row.get(1)?;
                    let expires_at: i64 = row.get(2)?;
                    Ok((status, payload_json, expires_at))
                },
            )
            .optional()
            .map_err(|err| StatusStoreError::Storage(err.to_string()))?;
        let Some((status, payload_json, expires_at)) = row else {
            return Ok(None);
        };
        if expires_at <= now_secs() {
            return Ok(None);
        }
        let status = serde_json::from_value(serde_json::Value::String(status))
            .map_err(|err| StatusStoreError::Storage(err.to_string()))?;
        let payload = serde_json::from_str(&payload_json).map_err(|err| StatusStoreError::Storage(err.to_string()))?;
        Ok(Some(StatusRecord { status, payload }))
    }
}

fn ensure_parent_dir(path: &Path) -> Result<(), StatusStoreError> {
    let Some(parent) = path.parent() else {
        return Ok(());
    };
    if parent.as_os_str().is_empty() {
        return Ok(());
    }
    std::fs::create_dir_all(parent).map_err(|err| StatusStoreError::Storage(err.to_string()))
}

fn open_connection(config: &SqliteStatusStoreConfig) -> Result<Connection, StatusStoreError> {
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
    let connection =
        Connection::open_with_flags(&config.path, flags).map_err(|err| StatusStoreError::Storage(err.to_string()))?;
    connection.execute_batch("PRAGMA journal_mode = wal; PRAGMA synchronous = normal;")
        .map_err(|err| StatusStoreError::Storage(err.to_string()))?;
    connection
        .busy_timeout(std::time::Duration::from_millis(config.busy_timeout_ms))
        .map_err(|err| StatusStoreError::Storage(err.to_string()))?;
    Ok(connection)
}

fn initialize_schema(connection: &Connection) -> Result<(), StatusStoreError> {
    connection
        .execute_batch(
            "CREATE TABLE IF NOT EXISTS status_kv (
                workflow_id TEXT PRIMARY KEY,
                status TEXT NOT NULL,
                payload_json TEXT NOT NULL,
                expires_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_status_kv_expires_at ON status_kv (expires_at);",
        )
        .map_err(|err| StatusStoreError::Storage(err.to_string()))
}

fn now_secs() -> i64 {
    let secs = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs();
    i64::try_from(secs).unwrap_or(i64::MAX)
}
