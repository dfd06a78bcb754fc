//! Publish/Subscribe Module
//!
//! Topic-based fan-out layered on the same connections that carry
//! key-value commands.
//!
//! ## Architecture
//!
//! ```text
//!  PUBLISH news hello
//!         │
//!         ▼
//! ┌────────────────────────────────────────────────────┐
//! │                   PubSubRegistry                   │
//! │   RwLock<HashMap<channel, {SessionId: Outbox}>>    │
//! └───────┬──────────────────┬─────────────────────────┘
//!         │ try_deliver      │ try_deliver
//!         ▼                  ▼
//!   [session #1 queue]  [session #2 queue]   (full queue: dropped)
//!         │                  │
//!         ▼                  ▼
//!     delivery task      delivery task
//! ```

pub mod registry;

pub use registry::{PubSubRegistry, PubSubStats, PublishReport};
