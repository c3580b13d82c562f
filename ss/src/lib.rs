//! StateStore - durable key/value state for a single process
//!
//! A small SQLite-backed map from string keys to JSON values. Every write is
//! committed and synced to disk before `set` returns, and an advisory lock
//! file keeps a second process from opening the same store.
//!
//! # Layout
//!
//! ```text
//! state.db        # SQLite database, table `state(key, value, updated_at)`
//! state.db.lock   # exclusive lock held while the store is open
//! ```
//!
//! # Example
//!
//! ```ignore
//! use statestore::KvStore;
//!
//! let mut store = KvStore::open("state.db")?;
//! store.set("channel.last_update", &serde_json::json!("2024-01-01T00:00:00Z"))?;
//! let cursor = store.get("channel.last_update")?;
//! ```

mod store;

pub use store::KvStore;

/// Current time as Unix milliseconds
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
