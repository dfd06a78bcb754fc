//! Connection Handler Module
//!
//! This module manages individual client connections to KVLite.
//! Each client connection is handled by its own async task, allowing
//! the server to handle thousands of concurrent clients efficiently.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     TCP Listener                            │
//! │                    (server.rs)                              │
//! └──────────────────────┬──────────────────────────────────────┘
//!                        │
//!                        │ accept()
//!                        ▼
//!           ┌────────────────────────┐
//!           │   For each client...   │
//!           └────────────┬───────────┘
//!                        │
//!                        │ spawn task
//!                        ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 ConnectionHandler                           │
//! │                                                             │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐     │
//! │  │ Read bytes  │───>│ Frame lines │───>│ Execute cmd │     │
//! │  └─────────────┘    └─────────────┘    └─────────────┘     │
//! │                                               │             │
//! │                                               ▼ reply       │
//! │                                      ┌─────────────┐        │
//! │          PUBLISH (other sessions) ──>│  Outbox     │        │
//! │                                      └──────┬──────┘        │
//! │                                             ▼               │
//! │                                      Delivery task ──> TCP  │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Features
//!
//! - **Async I/O**: Uses Tokio for non-blocking network operations
//! - **Buffer Management**: Efficient BytesMut buffer for incoming data
//! - **Pipelining**: Supports multiple commands in a single TCP packet
//! - **Isolated Delivery**: A bounded per-session queue drained by its own task
//! - **Statistics**: Tracks connection and command metrics
//!
//! ## Example
//!
//! ```ignore
//! use kvlite::commands::CommandHandler;
//! use kvlite::connection::{handle_connection, ConnectionStats, DEFAULT_QUEUE_CAPACITY};
//! use kvlite::pubsub::PubSubRegistry;
//! use kvlite::storage::StorageEngine;
//! use std::sync::Arc;
//!
//! let storage = Arc::new(StorageEngine::new());
//! let registry = Arc::new(PubSubRegistry::new());
//! let stats = Arc::new(ConnectionStats::new());
//! let handler = CommandHandler::new(storage, registry);
//!
//! // For each accepted connection...
//! let (stream, addr) = listener.accept().await?;
//! tokio::spawn(handle_connection(stream, addr, handler.clone(), DEFAULT_QUEUE_CAPACITY, stats));
//! ```

pub mod handler;
pub mod session;

// Re-export commonly used types
pub use handler::{handle_connection, ConnectionError, ConnectionHandler, ConnectionStats};
pub use session::{
    spawn_delivery, Delivery, Outbox, OutboxClosed, SessionId, DEFAULT_QUEUE_CAPACITY,
};
