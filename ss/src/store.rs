//! Core KvStore implementation

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use eyre::{Context, Result, eyre};
use fs2::FileExt;
use rusqlite::{Connection, OptionalExtension, params};
use serde_json::Value;
use tracing::{debug, info};

/// A file-backed, last-write-wins map of string keys to JSON values
pub struct KvStore {
    conn: Connection,
    path: PathBuf,
    /// Held for the lifetime of the store; dropping it releases the lock
    lock: File,
}

impl KvStore {
    /// Open or create a store at the given path
    ///
    /// Fails if another process already holds the store open.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        debug!(path = %path.display(), "KvStore::open: called");

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).context("Failed to create store directory")?;
        }

        let lock_path = lock_path_for(&path);
        let lock = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)
            .context(format!("Failed to open lock file {}", lock_path.display()))?;
        lock.try_lock_exclusive()
            .map_err(|_| eyre!("State store {} is locked by another process", path.display()))?;

        let conn = Connection::open(&path).context(format!("Failed to open state store {}", path.display()))?;
        conn.pragma_update(None, "synchronous", "FULL")
            .context("Failed to set synchronous mode")?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS state (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            );",
        )
        .context("Failed to create state table")?;

        info!(path = %path.display(), "Opened state store");
        Ok(Self { conn, path, lock })
    }

    /// Path of the underlying database file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Get the value stored under `key`
    pub fn get(&self, key: &str) -> Result<Option<Value>> {
        debug!(%key, "KvStore::get: called");
        let raw: Option<String> = self
            .conn
            .query_row("SELECT value FROM state WHERE key = ?1", params![key], |row| row.get(0))
            .optional()
            .context(format!("Failed to read key {}", key))?;

        match raw {
            Some(text) => {
                debug!(%key, "KvStore::get: found");
                let value = serde_json::from_str(&text).context(format!("Corrupt value for key {}", key))?;
                Ok(Some(value))
            }
            None => {
                debug!(%key, "KvStore::get: absent");
                Ok(None)
            }
        }
    }

    /// Store `value` under `key`, replacing any previous value
    ///
    /// The write is committed (and synced, `synchronous = FULL`) before returning.
    pub fn set(&mut self, key: &str, value: &Value) -> Result<()> {
        debug!(%key, "KvStore::set: called");
        let text = serde_json::to_string(value)?;
        self.conn
            .execute(
                "INSERT INTO state (key, value, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
                params![key, text, crate::now_ms()],
            )
            .context(format!("Failed to write key {}", key))?;
        Ok(())
    }

    /// Remove `key`, returning whether it existed
    pub fn remove(&mut self, key: &str) -> Result<bool> {
        debug!(%key, "KvStore::remove: called");
        let removed = self
            .conn
            .execute("DELETE FROM state WHERE key = ?1", params![key])
            .context(format!("Failed to remove key {}", key))?;
        Ok(removed > 0)
    }

    /// List keys, optionally restricted to a prefix, in sorted order
    pub fn keys(&self, prefix: Option<&str>) -> Result<Vec<String>> {
        debug!(?prefix, "KvStore::keys: called");
        let mut stmt = self.conn.prepare("SELECT key FROM state ORDER BY key")?;
        let keys = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(match prefix {
            Some(p) => keys.into_iter().filter(|k| k.starts_with(p)).collect(),
            None => keys,
        })
    }

    /// Close the connection and release the lock
    pub fn close(self) -> Result<()> {
        debug!(path = %self.path.display(), "KvStore::close: called");
        let Self { conn, path, lock } = self;
        conn.close()
            .map_err(|(_, e)| eyre!("Failed to close state store {}: {}", path.display(), e))?;
        FileExt::unlock(&lock).context("Failed to release state store lock")?;
        info!(path = %path.display(), "Closed state store");
        Ok(())
    }
}

fn lock_path_for(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".lock");
    path.with_file_name(name)
}
