//! Persistent transaction queue.
//!
//! The whole queue lives as one JSON array under a single store key. Every
//! mutation is a read-modify-write of that key, serialized by an in-process
//! lock, and finished with exactly one `set` call.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use chrono::Utc;
use tracing::{debug, warn};

use crate::error::Result;
use crate::store::KeyValueStore;
use crate::types::{Payload, Transaction};

/// Store key holding the pending transactions.
pub const QUEUE_KEY: &str = "mixpanel-lite";

/// Default maximum number of pending transactions.
pub const DEFAULT_CAPACITY: usize = 100;

static PROCESS_START_MILLIS: OnceLock<i64> = OnceLock::new();
static NEXT_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Returns a process-unique transaction id.
///
/// The prefix is the wall-clock time of the first call in this process, so
/// ids from an earlier run (which started earlier) can never collide.
fn next_transaction_id() -> String {
    let start = *PROCESS_START_MILLIS.get_or_init(|| Utc::now().timestamp_millis());
    let seq = NEXT_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    format!("{}-{}", start, seq)
}

/// Bounded FIFO of pending transactions backed by a [`KeyValueStore`].
pub struct TransactionQueue {
    store: Arc<dyn KeyValueStore>,
    key: String,
    capacity: usize,
    write_lock: Mutex<()>,
}

impl TransactionQueue {
    /// Create a queue over `store` holding at most `capacity` transactions.
    ///
    /// A capacity of zero is treated as one.
    pub fn new(store: Arc<dyn KeyValueStore>, capacity: usize) -> Self {
        Self {
            store,
            key: QUEUE_KEY.to_string(),
            capacity: capacity.max(1),
            write_lock: Mutex::new(()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// All pending transactions in insertion order.
    ///
    /// Fails open: a missing key, an unavailable store or corrupt JSON all
    /// read as an empty queue.
    pub fn all(&self) -> Vec<Transaction> {
        self.load().unwrap_or_else(|e| {
            warn!(error = %e, key = %self.key, "Queue store unavailable, treating as empty");
            Vec::new()
        })
    }

    /// Reads the queue, surfacing store errors so a mutation never
    /// overwrites contents it could not read. Corrupt JSON reads as empty.
    fn load(&self) -> Result<Vec<Transaction>> {
        let Some(raw) = self.store.get(&self.key)? else {
            return Ok(Vec::new());
        };

        match serde_json::from_str::<Vec<Transaction>>(&raw) {
            Ok(items) => Ok(items),
            Err(e) => {
                warn!(error = %e, key = %self.key, "Queue contents corrupt, treating as empty");
                Ok(Vec::new())
            }
        }
    }

    pub fn len(&self) -> usize {
        self.all().len()
    }

    pub fn is_empty(&self) -> bool {
        self.all().is_empty()
    }

    /// Append a payload as a new transaction, evicting the oldest entries
    /// beyond capacity. Returns the stored transaction.
    pub fn add(&self, payload: Payload) -> Result<Transaction> {
        let _guard = self.lock();

        let transaction = Transaction::new(next_transaction_id(), payload);

        let mut items = self.load()?;
        items.push(transaction.clone());

        if items.len() > self.capacity {
            let overflow = items.len() - self.capacity;
            items.drain(..overflow);
            debug!(
                evicted = overflow,
                capacity = self.capacity,
                "Queue full, dropped oldest transactions"
            );
        }

        self.write(&items)?;

        debug!(
            id = %transaction.id,
            kind = %transaction.kind(),
            pending = items.len(),
            "Enqueued transaction"
        );
        Ok(transaction)
    }

    /// Remove every transaction whose id is in `ids`, keeping the rest in
    /// their original order. Returns how many entries were removed.
    ///
    /// Works against a fresh read, so entries added since the caller took
    /// its snapshot are preserved.
    pub fn remove(&self, ids: &HashSet<String>) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }

        let _guard = self.lock();

        let mut items = self.load()?;
        let before = items.len();
        items.retain(|item| !ids.contains(&item.id));
        let removed = before - items.len();

        if removed > 0 {
            self.write(&items)?;
        }
        Ok(removed)
    }

    /// Drop every pending transaction.
    /// Drop every pending transaction by deleting the queue key.
    pub fn clear(&self) -> Result<()> {
        let _guard = self.lock();
        self.store.remove(&self.key)
    }

    fn write(&self, items: &[Transaction]) -> Result<()> {
        let encoded = serde_json::to_string(items)?;
        self.store.set(&self.key, &encoded)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ()> {
        self.write_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
