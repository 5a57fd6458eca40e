//! Durable key/value storage for mixlite
//!
//! The queue and the device id each live under a single string key. Backends
//! only move opaque strings; the queue owns the JSON inside its key.
//!
//! - [`SqliteStore`]: persistent, survives restarts
//! - [`MemoryStore`]: process-local, for tests and ephemeral hosts

mod memory;
pub mod schema;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use crate::error::Result;

/// A durable string-to-string store.
///
/// Each call is a single synchronous operation: a `set` replaces the whole
/// value, so readers in the same process never observe a partial write.
pub trait KeyValueStore: Send + Sync {
    /// Returns the value stored under `key`, if any.
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Replaces the value stored under `key`.
    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Deletes `key`. Deleting a missing key is not an error.
    fn remove(&self, key: &str) -> Result<()>;
}
