//! Storage Engine Module
//!
//! This module provides the core storage functionality for KVLite:
//! a thread-safe string-to-string map and the crash-safe snapshot that
//! mirrors it on disk.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     StorageEngine                           │
//! │            RwLock<HashMap<String, String>>                  │
//! └──────────────────────────┬──────────────────────────────────┘
//!                            │ every successful SET / DEL
//!                            ▼
//!              ┌───────────────────────────┐
//!              │       SnapshotFile        │
//!              │  data.json.tmp ─rename─>  │
//!              │        data.json          │
//!              └───────────────────────────┘
//! ```
//!
//! ## Features
//!
//! - **RwLock**: Multiple concurrent readers, exclusive writers
//! - **Write-Through**: Each mutation is followed by a full snapshot
//! - **Atomic Replace**: The live snapshot is only ever swapped by rename
//!
//! ## Example
//!
//! ```
//! use kvlite::storage::{LoadOutcome, SnapshotFile, StorageEngine};
//!
//! let dir = std::env::temp_dir().join(format!("kvlite-doc-{}", std::process::id()));
//! std::fs::create_dir_all(&dir).unwrap();
//! let file = SnapshotFile::new(dir.join("data.json"));
//!
//! let engine = StorageEngine::new();
//! engine.set("name".to_string(), "Ariz".to_string());
//! engine.save_snapshot(&file).unwrap();
//!
//! let restored = StorageEngine::new();
//! assert_eq!(restored.load_snapshot(&file).unwrap(), LoadOutcome::Loaded { keys: 1 });
//! assert_eq!(restored.get("name"), Some("Ariz".to_string()));
//! # std::fs::remove_dir_all(&dir).unwrap();
//! ```

pub mod engine;
pub mod snapshot;

// Re-export commonly used types
pub use engine::{StorageEngine, StorageStats};
pub use snapshot::{LoadOutcome, SnapshotFile, TEMP_SUFFIX};
