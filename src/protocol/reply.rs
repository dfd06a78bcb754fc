//! Reply Serialization
//!
//! Every reply is a single line starting with `> `:
//!
//! ```text
//! > OK
//! >  Ariz                  (GET hit: value after two spaces)
//! > (nil)
//! > 1
//! > Subscribed to news
//! > Err usage: SET key value
//! > Err unknown command
//! ```
//!
//! Published messages are not replies and carry no prefix.

use crate::protocol::command::CommandError;
use bytes::{BufMut, Bytes, BytesMut};
use std::fmt;

/// Prefix of every reply line.
pub const REPLY_PREFIX: &str = "> ";

/// A reply to one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// `SET` succeeded
    Ok,
    /// `GET` hit
    Value(String),
    /// `GET` miss
    Nil,
    /// `DEL` result: 1 if the key existed, 0 if not
    Integer(i64),
    /// `SUBSCRIBE` acknowledgement
    Subscribed(String),
    /// `UNSUBSCRIBE` acknowledgement
    Unsubscribed(String),
    /// `PUBLISH` acknowledgement
    Published(String),
    /// `QUIT` / `EXIT`; the connection closes after this reply
    Bye,
    /// Usage or unknown-command error
    Error(CommandError),
}

impl Reply {
    /// Returns true if the connection should close after sending this reply.
    pub fn closes_connection(&self) -> bool {
        matches!(self, Reply::Bye)
    }

    /// Returns true if this reply reports an error.
    pub fn is_error(&self) -> bool {
        matches!(self, Reply::Error(_))
    }

    /// Serializes the reply into its wire line, terminator included.
    pub fn serialize(&self) -> Bytes {
        let body = self.to_string();
        let mut buf = BytesMut::with_capacity(REPLY_PREFIX.len() + body.len() + 1);
        buf.put_slice(REPLY_PREFIX.as_bytes());
        buf.put_slice(body.as_bytes());
        buf.put_u8(b'\n');
        buf.freeze()
    }
}

impl From<CommandError> for Reply {
    fn from(err: CommandError) -> Self {
        Reply::Error(err)
    }
}

/// The reply text after the `> ` prefix.
impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::Ok => write!(f, "OK"),
            Reply::Value(value) => write!(f, " {}", value),
            Reply::Nil => write!(f, "(nil)"),
            Reply::Integer(n) => write!(f, "{}", n),
            Reply::Subscribed(channel) => write!(f, "Subscribed to {}", channel),
            Reply::Unsubscribed(channel) => write!(f, "Unsubscribed from {}", channel),
            Reply::Published(channel) => write!(f, "Published to {}", channel),
            Reply::Bye => write!(f, "BYE"),
            Reply::Error(err) => write!(f, "Err {}", err),
        }
    }
}
