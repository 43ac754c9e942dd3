use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};

use super::BlobStore;
use crate::error::{RebanhoError, Result};

const LOCAL_DB: &str = "rebanho.db";
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// SQLite-backed blob store for the local fallback.
///
/// Each key is one row holding a whole serialized collection.
/// [`BlobStore::update`] runs inside an immediate transaction, so two
/// processes editing the same collection take turns instead of
/// overwriting each other.
pub struct SqliteBlobStore {
    conn: Mutex<Connection>,
    path: PathBuf,
}

impl SqliteBlobStore {
    /// Open or create the store inside `data_dir`.
    pub fn open(data_dir: &Path) -> Result<Self> {
        let path = data_dir.join(LOCAL_DB);
        let conn = Connection::open(&path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;

        let store = Self {
            conn: Mutex::new(conn),
            path,
        };
        store.init_schema()?;
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn init_schema(&self) -> Result<()> {
        self.lock()?.execute(
            "CREATE TABLE IF NOT EXISTS blobs (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
            [],
        )?;
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| RebanhoError::Storage("sqlite connection lock poisoned".to_string()))
    }
}

fn read_value(conn: &Connection, key: &str) -> Result<Option<String>> {
    let value: Option<String> = conn
        .query_row("SELECT value FROM blobs WHERE key = ?1", [key], |row| {
            row.get(0)
        })
        .optional()?;
    Ok(value)
}

fn write_value(conn: &Connection, key: &str, value: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO blobs (key, value, updated_at) VALUES (?1, ?2, ?3)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
        params![key, value, chrono::Utc::now().to_rfc3339()],
    )?;
    Ok(())
}

impl BlobStore for SqliteBlobStore {
    fn read(&self, key: &str) -> Result<Option<String>> {
        let conn = self.lock()?;
        read_value(&conn, key)
    }

    fn write(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.lock()?;
        write_value(&conn, key, value)
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.lock()?.execute("DELETE FROM blobs WHERE key = ?1", [key])?;
        Ok(())
    }

    fn update(
        &self,
        key: &str,
        f: &mut dyn FnMut(Option<String>) -> Result<String>,
    ) -> Result<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let next = f(read_value(&tx, key)?)?;
        write_value(&tx, key, &next)?;
        tx.commit()?;
        Ok(())
    }
}
