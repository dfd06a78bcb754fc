//! Server Configuration
//!
//! Parsed from the command line with `clap`; every field has a default so
//! `kvlite` with no arguments listens on port 4000 and keeps its
//! snapshot in `./data.json`.

use crate::connection::DEFAULT_QUEUE_CAPACITY;
use crate::{DEFAULT_HOST, DEFAULT_PORT, DEFAULT_SNAPSHOT_PATH};
use clap::Parser;
use std::path::{Path, PathBuf};

/// Server configuration
#[derive(Parser, Debug, Clone, PartialEq, Eq)]
#[command(name = "kvlite")]
#[command(about = "In-memory key-value store with snapshots and pub/sub over TCP")]
#[command(version)]
pub struct Config {
    /// Host to bind to
    #[arg(long, default_value = DEFAULT_HOST)]
    pub host: String,

    /// Port to listen on
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Snapshot file, rewritten after every SET and successful DEL
    #[arg(short, long, default_value = DEFAULT_SNAPSHOT_PATH)]
    pub snapshot: PathBuf,

    /// Keep data in memory only; never read or write the snapshot
    #[arg(long)]
    pub in_memory: bool,

    /// Messages a subscriber may have queued before new ones are dropped
    #[arg(long, default_value_t = DEFAULT_QUEUE_CAPACITY)]
    pub queue_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            snapshot: PathBuf::from(DEFAULT_SNAPSHOT_PATH),
            in_memory: false,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

impl Config {
    /// Returns the bind address as a string
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// The snapshot path, or `None` when persistence is disabled.
    pub fn snapshot_path(&self) -> Option<&Path> {
        (!self.in_memory).then_some(self.snapshot.as_path())
    }

    /// A memory-only configuration, handy for tests and embedding.
    pub fn memory_only() -> Self {
        Self {
            in_memory: true,
            ..Self::default()
        }
    }
}
