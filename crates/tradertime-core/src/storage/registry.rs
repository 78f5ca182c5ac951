//! Durable alarm records.
//!
//! One SQLite table keyed by alarm id. It only exists so pending alarms
//! can be re-armed after a restart; the live schedule is the wake host's.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::DateTime;
use rusqlite::{params, Connection};

use super::data_dir;
use crate::alarm::AlarmRecord;
use crate::error::DatabaseError;

/// Keyed durable store of alarm records. Each call is atomic on its own;
/// concurrent writers see last-write-wins.
pub trait AlarmStore: Send + Sync {
    /// Insert or replace the record with the same id.
    fn put(&self, record: &AlarmRecord) -> Result<(), DatabaseError>;

    /// Remove by id. Removing an unknown id succeeds.
    fn remove(&self, id: &str) -> Result<(), DatabaseError>;

    fn get(&self, id: &str) -> Result<Option<AlarmRecord>, DatabaseError>;

    /// Snapshot of every record, in no particular order.
    fn list_all(&self) -> Result<Vec<AlarmRecord>, DatabaseError>;
}

/// SQLite-backed [`AlarmStore`].
pub struct AlarmRegistry {
    conn: Mutex<Connection>,
}

impl AlarmRegistry {
    /// Open the registry at `~/.config/tradertime/alarms.db`.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open() -> Result<Self, DatabaseError> {
        let dir = data_dir().map_err(|e| DatabaseError::DataDir(e.to_string()))?;
        Self::open_at(&dir.join("alarms.db"))
    }

    /// Open a registry file at an explicit path.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open_at(path: &Path) -> Result<Self, DatabaseError> {
        let conn = Connection::open(path).map_err(|source| DatabaseError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        Self::with_connection(conn)
    }

    /// Open an in-memory registry.
    ///
    /// # Errors
    /// Returns an error if the schema cannot be created.
    pub fn open_memory() -> Result<Self, DatabaseError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, DatabaseError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS alarms (
                id             TEXT PRIMARY KEY,
                label          TEXT NOT NULL,
                trigger_at_ms  INTEGER NOT NULL,
                sound_id       TEXT NOT NULL
            );",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<AlarmRecord> {
    let trigger_ms: i64 = row.get(2)?;
    let trigger_at = DateTime::from_timestamp_millis(trigger_ms).ok_or_else(|| {
        rusqlite::Error::IntegralValueOutOfRange(2, trigger_ms)
    })?;
    Ok(AlarmRecord {
        id: row.get(0)?,
        label: row.get(1)?,
        trigger_at,
        sound_id: row.get(3)?,
    })
}

impl AlarmStore for AlarmRegistry {
    fn put(&self, record: &AlarmRecord) -> Result<(), DatabaseError> {
        self.conn().execute(
            "INSERT OR REPLACE INTO alarms (id, label, trigger_at_ms, sound_id)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                record.id,
                record.label,
                record.trigger_at_ms(),
                record.sound_id
            ],
        )?;
        Ok(())
    }

    fn remove(&self, id: &str) -> Result<(), DatabaseError> {
        self.conn()
            .execute("DELETE FROM alarms WHERE id = ?1", params![id])?;
        Ok(())
    }

    fn get(&self, id: &str) -> Result<Option<AlarmRecord>, DatabaseError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, label, trigger_at_ms, sound_id FROM alarms WHERE id = ?1",
        )?;
        match stmt.query_row(params![id], row_to_record) {
            Ok(record) => Ok(Some(record)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn list_all(&self) -> Result<Vec<AlarmRecord>, DatabaseError> {
        let conn = self.conn();
        let mut stmt = conn.prepare("SELECT id, label, trigger_at_ms, sound_id FROM alarms")?;
        let rows = stmt.query_map([], row_to_record)?;
        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }
}
