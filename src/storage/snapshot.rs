//! Crash-Safe Snapshot Persistence
//!
//! The whole key-value mapping is written to disk as one JSON document.
//! A save never touches the live file in place:
//!
//! ```text
//!   read lock ──> encode JSON ──> write data.json.tmp ──> fsync ──> rename
//!                                                                    │
//!                                  data.json is replaced atomically ─┘
//! ```
//!
//! Until the rename completes, `data.json` still holds the previous complete
//! snapshot. An interrupted save can only leave a broken `.tmp` file behind,
//! and loading never looks at that file.

use crate::error::SnapshotError;
use crate::storage::StorageEngine;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

/// Suffix of the transient file a save writes before renaming it into place.
pub const TEMP_SUFFIX: &str = ".tmp";

/// Result of loading a snapshot at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// The snapshot was read and replaced the in-memory mapping
    Loaded { keys: usize },
    /// No snapshot exists yet; the mapping was left as it was
    NotFound,
}

/// A snapshot location on disk.
///
/// Saves through the same `SnapshotFile` are serialized, so two writers
/// never interleave on the shared temporary file.
#[derive(Debug)]
pub struct SnapshotFile {
    path: PathBuf,
    tmp_path: PathBuf,
    save_lock: Mutex<()>,
}

impl SnapshotFile {
    /// Creates a snapshot handle for `path`; the temp file is `<path>.tmp`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mut tmp = OsString::from(path.as_os_str());
        tmp.push(TEMP_SUFFIX);

        Self {
            path,
            tmp_path: PathBuf::from(tmp),
            save_lock: Mutex::new(()),
        }
    }

    /// The live snapshot path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The temporary sibling written during a save.
    pub fn tmp_path(&self) -> &Path {
        &self.tmp_path
    }

    /// Writes `bytes` to the temporary file and flushes them to disk.
    pub(crate) fn write_temp(&self, bytes: &[u8]) -> Result<(), SnapshotError> {
        let io_err = |e| SnapshotError::io(&self.tmp_path, e);

        let mut file = File::create(&self.tmp_path).map_err(io_err)?;
        file.write_all(bytes).map_err(io_err)?;
        file.sync_all().map_err(io_err)?;
        Ok(())
    }

    /// Atomically replaces the live snapshot with the temporary file.
    pub(crate) fn commit(&self) -> Result<(), SnapshotError> {
        fs::rename(&self.tmp_path, &self.path).map_err(|e| SnapshotError::io(&self.path, e))
    }
}

impl StorageEngine {
    /// Writes the full mapping to `snapshot`.
    ///
    /// The read lock is held only while the mapping is encoded. Keys are
    /// written in sorted order so consecutive snapshots diff cleanly.
    pub fn save_snapshot(&self, snapshot: &SnapshotFile) -> Result<(), SnapshotError> {
        let _save = snapshot.save_lock.lock();

        let encoded = {
            let data = self.data.read();
            let ordered: BTreeMap<&str, &str> = data
                .iter()
                .map(|(k, v)| (k.as_str(), v.as_str()))
                .collect();
            serde_json::to_vec_pretty(&ordered).map_err(SnapshotError::Encode)?
        };

        snapshot.write_temp(&encoded)?;
        snapshot.commit()
    }

    /// Replaces the whole mapping with the contents of `snapshot`.
    ///
    /// The swap happens under the write lock: readers see either the old
    /// mapping or the loaded one, never a mix. On any error the current
    /// mapping is left untouched.
    pub fn load_snapshot(&self, snapshot: &SnapshotFile) -> Result<LoadOutcome, SnapshotError> {
        let mut data = self.data.write();

        let bytes = match fs::read(snapshot.path()) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(LoadOutcome::NotFound),
            Err(e) => return Err(SnapshotError::io(snapshot.path(), e)),
        };

        let loaded: HashMap<String, String> =
            serde_json::from_slice(&bytes).map_err(|source| SnapshotError::Corrupt {
                path: snapshot.path().to_path_buf(),
                source,
            })?;

        let keys = loaded.len();
        *data = loaded;
        Ok(LoadOutcome::Loaded { keys })
    }
}
