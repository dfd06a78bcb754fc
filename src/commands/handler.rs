//! Command Handler Module
//!
//! This module executes parsed commands against the storage engine and
//! the pub/sub registry and produces the reply for the issuing client.
//!
//! ## Supported Commands
//!
//! ### Key-Value Commands
//! - `SET key value` - Set a key (value is the rest of the line)
//! - `GET key` - Get a key's value
//! - `DEL key` - Delete a key
//!
//! ### Pub/Sub Commands
//! - `SUBSCRIBE channel` - Receive messages published to a channel
//! - `UNSUBSCRIBE channel` - Stop receiving them
//! - `PUBLISH channel message` - Send a message to every subscriber
//!
//! ### Connection Commands
//! - `QUIT` / `EXIT` - Say goodbye and close the connection
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     CommandHandler                          │
//! │                                                             │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐     │
//! │  │   parse()   │───>│  dispatch() │───>│   Reply     │     │
//! │  └─────────────┘    └──────┬──────┘    └─────────────┘     │
//! │                            │                               │
//! │               ┌────────────┴────────────┐                  │
//! │               ▼                         ▼                  │
//! │        StorageEngine             PubSubRegistry            │
//! └─────────────────────────────────────────────────────────────┘
//! ```

use crate::connection::session::{Outbox, SessionId};
use crate::protocol::{Command, Reply};
use crate::pubsub::PubSubRegistry;
use crate::storage::StorageEngine;
use std::sync::Arc;
use tracing::{debug, trace};

/// Executes client commands. Cloned once per connection.
#[derive(Clone)]
pub struct CommandHandler {
    /// The storage engine
    storage: Arc<StorageEngine>,
    /// The pub/sub registry
    registry: Arc<PubSubRegistry>,
}

impl CommandHandler {
    /// Creates a new command handler over shared state.
    pub fn new(storage: Arc<StorageEngine>, registry: Arc<PubSubRegistry>) -> Self {
        Self { storage, registry }
    }

    /// The shared storage engine.
    pub fn storage(&self) -> &Arc<StorageEngine> {
        &self.storage
    }

    /// The shared pub/sub registry.
    pub fn registry(&self) -> &Arc<PubSubRegistry> {
        &self.registry
    }

    /// Parses and executes one protocol line on behalf of `session`.
    ///
    /// Returns `None` for a blank line, which gets no reply.
    pub async fn execute(&self, line: &str, session: &Outbox) -> Option<Reply> {
        match Command::parse(line) {
            Ok(Some(command)) => Some(self.dispatch(command, session).await),
            Ok(None) => None,
            Err(err) => Some(Reply::from(err)),
        }
    }

    /// Executes an already parsed command.
    ///
    /// `SET` and a successful `DEL` resolve only after their snapshot write
    /// has been attempted, so the reply always follows the write-through.
    pub async fn dispatch(&self, command: Command, session: &Outbox) -> Reply {
        trace!(session = %session.id(), command = command.name(), "Dispatch");

        match command {
            Command::Set { key, value } => {
                self.storage.set_async(key, value).await;
                Reply::Ok
            }
            Command::Get { key } => match self.storage.get(&key) {
                Some(value) => Reply::Value(value),
                None => Reply::Nil,
            },
            Command::Del { key } => Reply::Integer(self.storage.delete_async(&key).await as i64),
            Command::Subscribe { channel } => {
                self.registry.subscribe(&channel, session);
                Reply::Subscribed(channel)
            }
            Command::Unsubscribe { channel } => {
                self.registry.unsubscribe(&channel, session.id());
                Reply::Unsubscribed(channel)
            }
            Command::Publish { channel, message } => {
                let report = self.registry.publish(&channel, &message);
                debug!(
                    channel = %channel,
                    delivered = report.delivered,
                    dropped = report.dropped,
                    "Published"
                );
                Reply::Published(channel)
            }
            Command::Quit => Reply::Bye,
        }
    }

    /// Releases everything a session holds in shared state.
    ///
    /// Must run when a connection ends, however it ends.
    pub fn end_session(&self, session: SessionId) {
        self.registry.remove_session(session);
    }
}
