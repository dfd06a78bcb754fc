//! Command Handler Module
//!
//! This module implements the command processing layer for KVLite.
//! It receives protocol lines, executes them against the storage engine
//! or the pub/sub registry, and returns the reply for the client.
//!
//! ## Architecture
//!
//! ```text
//! Client Request
//!       │
//!       ▼
//! ┌─────────────────┐
//! │  Line Framer    │  (protocol module)
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │ CommandHandler  │  (this module)
//! └───┬─────────┬───┘
//!     │         │
//!     ▼         ▼
//! Storage    PubSub
//! ```

pub mod handler;

// Re-export the main command handler
pub use handler::CommandHandler;
