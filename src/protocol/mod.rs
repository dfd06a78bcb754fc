//! Line Protocol Implementation
//!
//! KVLite speaks a plain text protocol: one command per newline-terminated
//! line, one reply line per command. It is easy to drive from `nc` or
//! `telnet`.
//!
//! ## Modules
//!
//! - `parser`: Splits the incoming byte stream into lines
//! - `command`: Turns a line into a [`Command`]
//! - `reply`: Defines the [`Reply`] enum and its wire format
//!
//! ## Example
//!
//! ```
//! use kvlite::protocol::{Command, LineFramer, Reply};
//! use bytes::BytesMut;
//!
//! let framer = LineFramer::new();
//! let mut buffer = BytesMut::from(&b"SET name Ariz\r\n"[..]);
//!
//! let line = framer.next_line(&mut buffer).unwrap().unwrap();
//! let command = Command::parse(&line).unwrap().unwrap();
//! assert_eq!(command.name(), "SET");
//!
//! assert_eq!(&Reply::Ok.serialize()[..], b"> OK\n");
//! ```

pub mod command;
pub mod parser;
pub mod reply;

// Re-export commonly used types for convenience
pub use command::{Command, CommandError};
pub use parser::{LineFramer, ParseError, ParseResult, MAX_LINE_LENGTH};
pub use reply::{Reply, REPLY_PREFIX};
