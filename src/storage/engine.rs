//! Thread-Safe Storage Engine
//!
//! This module implements the key-value store at the heart of KVLite.
//! All string data lives in one `HashMap` guarded by a single readers-writer
//! lock.
//!
//! ## Concurrency Model
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     StorageEngine                           │
//! │                                                             │
//! │        GET ──┐                                              │
//! │        GET ──┼── shared ──┐    ┌──────────────────────┐     │
//! │        GET ──┘            ├───>│ RwLock<HashMap<..>>  │     │
//! │   SET / DEL ── exclusive ─┘    └──────────────────────┘     │
//! │                                          │                  │
//! │                       (after unlock)     ▼                  │
//! │                                  SnapshotFile::save         │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Any number of readers proceed together. Writers are serialized with
//! each other and with every reader, so a `get` never sees half of a `set`.
//! The write guard covers only the mutation; the write-through snapshot
//! runs afterwards with a shared guard. From async code the snapshot goes
//! through `spawn_blocking` so disk latency stays off the runtime workers.

use crate::config::Config;
use crate::error::SnapshotError;
use crate::storage::snapshot::{LoadOutcome, SnapshotFile};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{error, info, trace};

/// The main storage engine for KVLite.
///
/// This struct is designed to be wrapped in an `Arc` and shared across
/// all client handler tasks. All operations are thread-safe.
///
/// # Example
///
/// ```
/// use kvlite::storage::StorageEngine;
///
/// let engine = StorageEngine::new();
///
/// engine.set("name".to_string(), "Ariz".to_string());
/// assert_eq!(engine.get("name"), Some("Ariz".to_string()));
///
/// assert!(engine.delete("name"));
/// assert!(!engine.delete("name"));
/// ```
pub struct StorageEngine {
    /// The key-value data
    pub(crate) data: RwLock<HashMap<String, String>>,

    /// Snapshot target for write-through persistence (None = memory only)
    snapshot: Option<SnapshotFile>,

    /// Statistics: total GET operations
    get_count: AtomicU64,

    /// Statistics: total SET operations
    set_count: AtomicU64,

    /// Statistics: total DEL operations
    del_count: AtomicU64,

    /// Statistics: snapshot saves that failed
    snapshot_failures: AtomicU64,
}

impl std::fmt::Debug for StorageEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageEngine")
            .field("keys", &self.len())
            .field("snapshot", &self.snapshot.as_ref().map(|s| s.path()))
            .field("get_count", &self.get_count.load(Ordering::Relaxed))
            .field("set_count", &self.set_count.load(Ordering::Relaxed))
            .finish()
    }
}

impl Default for StorageEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageEngine {
    /// Creates an empty, memory-only storage engine.
    pub fn new() -> Self {
        Self {
            data: RwLock::new(HashMap::new()),
            snapshot: None,
            get_count: AtomicU64::new(0),
            set_count: AtomicU64::new(0),
            del_count: AtomicU64::new(0),
            snapshot_failures: AtomicU64::new(0),
        }
    }

    /// Creates an empty engine that writes through to `snapshot`.
    ///
    /// Nothing is loaded; see [`StorageEngine::open`] for the startup path.
    pub fn with_snapshot(snapshot: SnapshotFile) -> Self {
        Self {
            snapshot: Some(snapshot),
            ..Self::new()
        }
    }

    /// Opens the engine described by `config`.
    ///
    /// With persistence enabled, the snapshot file is loaded first. A missing
    /// file means there is no prior state and the engine starts empty; a file
    /// that exists but does not parse is an error.
    pub fn open(config: &Config) -> Result<Self, SnapshotError> {
        let Some(path) = config.snapshot_path() else {
            info!("Persistence disabled, running in memory only");
            return Ok(Self::new());
        };

        let snapshot = SnapshotFile::new(path);
        let engine = Self::new();

        match engine.load_snapshot(&snapshot)? {
            LoadOutcome::Loaded { keys } => {
                info!(path = %snapshot.path().display(), keys, "Snapshot loaded")
            }
            LoadOutcome::NotFound => {
                info!(path = %snapshot.path().display(), "No snapshot found, starting empty")
            }
        }

        Ok(Self {
            snapshot: Some(snapshot),
            ..engine
        })
    }

    /// Returns the attached snapshot file, if persistence is enabled.
    pub fn snapshot_file(&self) -> Option<&SnapshotFile> {
        self.snapshot.as_ref()
    }

    /// Sets a key-value pair, overwriting any previous value.
    ///
    /// Always succeeds in memory. When persistence is enabled a snapshot is
    /// written afterwards on the calling thread; a failure there is logged,
    /// not returned. Async callers use [`StorageEngine::set_async`].
    pub fn set(&self, key: String, value: String) {
        self.insert(key, value);
        self.persist();
    }

    /// Like [`StorageEngine::set`], but the snapshot is written on tokio's
    /// blocking pool. Returns once the snapshot attempt has finished.
    pub async fn set_async(self: &Arc<Self>, key: String, value: String) {
        self.insert(key, value);
        self.persist_off_runtime().await;
    }

    /// Gets the value for a key.
    pub fn get(&self, key: &str) -> Option<String> {
        self.get_count.fetch_add(1, Ordering::Relaxed);

        let data = self.data.read();
        data.get(key).cloned()
    }

    /// Deletes a key from the database.
    ///
    /// # Returns
    ///
    /// Returns `true` if the key was deleted, `false` if it didn't exist.
    /// Deleting a missing key changes nothing and skips the snapshot.
    pub fn delete(&self, key: &str) -> bool {
        let existed = self.remove(key);
        if existed {
            self.persist();
        }
        existed
    }

    /// Like [`StorageEngine::delete`], with the snapshot written on tokio's
    /// blocking pool.
    pub async fn delete_async(self: &Arc<Self>, key: &str) -> bool {
        let existed = self.remove(key);
        if existed {
            self.persist_off_runtime().await;
        }
        existed
    }

    fn insert(&self, key: String, value: String) {
        self.set_count.fetch_add(1, Ordering::Relaxed);
        self.data.write().insert(key, value);
    }

    fn remove(&self, key: &str) -> bool {
        self.del_count.fetch_add(1, Ordering::Relaxed);
        self.data.write().remove(key).is_some()
    }

    /// Returns the number of keys in the database.
    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    /// Returns true if the database is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns a point-in-time copy of the whole mapping.
    pub fn snapshot_map(&self) -> HashMap<String, String> {
        self.data.read().clone()
    }

    /// Returns database statistics.
    pub fn stats(&self) -> StorageStats {
        StorageStats {
            keys: self.len() as u64,
            get_ops: self.get_count.load(Ordering::Relaxed),
            set_ops: self.set_count.load(Ordering::Relaxed),
            del_ops: self.del_count.load(Ordering::Relaxed),
            snapshot_failures: self.snapshot_failures.load(Ordering::Relaxed),
        }
    }

    /// Best-effort write-through of the current state.
    fn persist(&self) {
        let Some(snapshot) = &self.snapshot else {
            return;
        };

        match self.save_snapshot(snapshot) {
            Ok(()) => trace!(path = %snapshot.path().display(), "Snapshot written"),
            Err(e) => {
                // The in-memory mutation stands; disk catches up on the next save.
                self.snapshot_failures.fetch_add(1, Ordering::Relaxed);
                error!(error = %e, "Failed to write snapshot");
            }
        }
    }

    /// Runs [`persist`](Self::persist) on the blocking pool so file I/O and
    /// the save lock never hold up an async worker.
    async fn persist_off_runtime(self: &Arc<Self>) {
        if self.snapshot.is_none() {
            return;
        }

        let engine = Arc::clone(self);
        if let Err(e) = tokio::task::spawn_blocking(move || engine.persist()).await {
            self.snapshot_failures.fetch_add(1, Ordering::Relaxed);
            error!(error = %e, "Snapshot task failed");
        }
    }
}

/// Database statistics.
#[derive(Debug, Clone, Default)]
pub struct StorageStats {
    /// Number of keys
    pub keys: u64,
    /// Total GET operations
    pub get_ops: u64,
    /// Total SET operations
    pub set_ops: u64,
    /// Total DEL operations
    pub del_ops: u64,
    /// Write-through snapshots that failed
    pub snapshot_failures: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_set_and_get() {
        let engine = StorageEngine::new();

        engine.set("key".to_string(), "value".to_string());
        assert_eq!(engine.get("key"), Some("value".to_string()));
    }

    #[test]
    fn test_get_nonexistent() {
        let engine = StorageEngine::new();
        assert_eq!(engine.get("nonexistent"), None);
    }

    #[test]
    fn test_set_overwrites() {
        let engine = StorageEngine::new();

        engine.set("key".to_string(), "first".to_string());
        engine.set("key".to_string(), "second".to_string());

        assert_eq!(engine.get("key"), Some("second".to_string()));
        assert_eq!(engine.len(), 1);
    }

    #[test]
    fn test_delete() {
        let engine = StorageEngine::new();

        engine.set("key".to_string(), "value".to_string());
        assert!(engine.delete("key"));
        assert_eq!(engine.get("key"), None);
        assert!(!engine.delete("key")); // Already deleted
    }

    #[test]
    fn test_delete_missing_leaves_mapping_unchanged() {
        let engine = StorageEngine::new();
        engine.set("a".to_string(), "1".to_string());

        let before = engine.snapshot_map();
        assert!(!engine.delete("missing"));
        assert_eq!(engine.snapshot_map(), before);
    }

    #[test]
    fn test_stats() {
        let engine = StorageEngine::new();

        engine.set("a".to_string(), "1".to_string());
        engine.get("a");
        engine.get("b");
        engine.delete("a");

        let stats = engine.stats();
        assert_eq!(stats.keys, 0);
        assert_eq!(stats.set_ops, 1);
        assert_eq!(stats.get_ops, 2);
        assert_eq!(stats.del_ops, 1);
        assert_eq!(stats.snapshot_failures, 0);
    }

    #[test]
    fn test_concurrent_access() {
        let engine = Arc::new(StorageEngine::new());
        let mut handles = vec![];

        for t in 0..10 {
            let engine = Arc::clone(&engine);
            handles.push(thread::spawn(move || {
                for i in 0..100 {
                    let key = format!("key_{}_{}", t, i);
                    engine.set(key.clone(), format!("value_{}", i));
                    assert_eq!(engine.get(&key), Some(format!("value_{}", i)));
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(engine.len(), 1000);
    }

    #[test]
    fn test_readers_never_observe_partial_values() {
        let engine = Arc::new(StorageEngine::new());
        let a = "a".repeat(4096);
        let b = "b".repeat(4096);
        engine.set("shared".to_string(), a.clone());

        let writer = {
            let engine = Arc::clone(&engine);
            let (a, b) = (a.clone(), b.clone());
            thread::spawn(move || {
                for i in 0..500 {
                    let value = if i % 2 == 0 { b.clone() } else { a.clone() };
                    engine.set("shared".to_string(), value);
                }
            })
        };

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let engine = Arc::clone(&engine);
                let (a, b) = (a.clone(), b.clone());
                thread::spawn(move || {
                    for _ in 0..500 {
                        let value = engine.get("shared").unwrap();
                        assert!(value == a || value == b);
                    }
                })
            })
            .collect();

        writer.join().unwrap();
        for reader in readers {
            reader.join().unwrap();
        }
    }
}
