//! # KVLite - An In-Memory Key-Value Store with Pub/Sub
//!
//! KVLite keeps string keys and values in memory, serves them over a
//! line-oriented TCP protocol, mirrors every change to a crash-safe JSON
//! snapshot, and lets the same connections subscribe to and publish on
//! named channels.
//!
//! ## Features
//!
//! - **Simple Protocol**: One text command per line; works with `nc`
//! - **Concurrent Reads**: One RwLock; readers never see a partial write
//! - **Crash-Safe Snapshots**: Write to a temp file, then atomic rename
//! - **Non-Blocking Pub/Sub**: Bounded per-subscriber queues, drop on overflow
//! - **Async I/O**: Built on Tokio, two lightweight tasks per connection
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                              KVLite                                     │
//! │                                                                         │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐                  │
//! │  │ TCP Server  │───>│ Connection  │───>│  Command    │                  │
//! │  │ (Listener)  │    │  Handler    │    │  Handler    │                  │
//! │  └─────────────┘    └──────┬──────┘    └──┬───────┬──┘                  │
//! │                            │              │       │                     │
//! │                            ▼              ▼       ▼                     │
//! │                     ┌────────────┐ ┌───────────┐ ┌────────────────┐     │
//! │                     │  Outbox ─> │ │ Storage   │ │ PubSubRegistry │     │
//! │                     │  Delivery  │ │ Engine    │ │   (own lock)   │     │
//! │                     └────────────┘ └─────┬─────┘ └────────────────┘     │
//! │                            ▲             │                │             │
//! │                            │             ▼                │             │
//! │                            │      data.json (snapshot)    │             │
//! │                            └──────── try_deliver ─────────┘             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```ignore
//! use kvlite::{Config, PubSubRegistry, Server, StorageEngine};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::default();
//!
//!     // Load data.json (if any) and write through to it from now on
//!     let storage = Arc::new(StorageEngine::open(&config)?);
//!     let registry = Arc::new(PubSubRegistry::new());
//!
//!     Server::bind(&config, storage, registry)
//!         .await?
//!         .run_until_ctrl_c()
//!         .await;
//!     Ok(())
//! }
//! ```
//!
//! ## Supported Commands
//!
//! - `SET key value` / `GET key` / `DEL key`
//! - `SUBSCRIBE channel` / `UNSUBSCRIBE channel`
//! - `PUBLISH channel message`
//! - `QUIT` / `EXIT`
//!
//! ## Module Overview
//!
//! - [`protocol`]: Line framing, command parsing and reply formatting
//! - [`storage`]: Thread-safe storage engine and snapshot persistence
//! - [`pubsub`]: Channel registry with non-blocking fan-out
//! - [`commands`]: Dispatch from commands to storage and pub/sub
//! - [`connection`]: Client sessions and their outbound delivery
//! - [`server`]: The TCP accept loop
//! - [`config`]: Command-line configuration

pub mod commands;
pub mod config;
pub mod connection;
pub mod error;
pub mod protocol;
pub mod pubsub;
pub mod server;
pub mod storage;

// Re-export commonly used types for convenience
pub use commands::CommandHandler;
pub use config::Config;
pub use connection::{handle_connection, ConnectionStats, Outbox, SessionId};
pub use error::SnapshotError;
pub use protocol::{Command, CommandError, LineFramer, ParseError, Reply};
pub use pubsub::{PubSubRegistry, PublishReport};
pub use server::Server;
pub use storage::{LoadOutcome, SnapshotFile, StorageEngine};

/// The default port KVLite listens on
pub const DEFAULT_PORT: u16 = 4000;

/// The default host KVLite binds to
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// The default snapshot file
pub const DEFAULT_SNAPSHOT_PATH: &str = "data.json";

/// Version of KVLite
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
