//! Command Parsing
//!
//! A line is split on single spaces into at most three fields: the
//! keyword, the first argument, and the rest of the line as one argument.
//! That last field keeps its inner spaces, so `SET greeting hello world`
//! stores `hello world`.
//!
//! Keywords are case-insensitive; keys, values and channel names are not.

use thiserror::Error;

/// A parsed client command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `SET key value`
    Set { key: String, value: String },
    /// `GET key`
    Get { key: String },
    /// `DEL key`
    Del { key: String },
    /// `SUBSCRIBE channel`
    Subscribe { channel: String },
    /// `UNSUBSCRIBE channel`
    Unsubscribe { channel: String },
    /// `PUBLISH channel message`
    Publish { channel: String, message: String },
    /// `QUIT` or `EXIT`
    Quit,
}

/// A line that could not be turned into a [`Command`].
///
/// These are reported to the issuing client; the connection stays open.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    /// Known keyword, wrong number of arguments
    #[error("usage: {0}")]
    Usage(&'static str),

    /// Keyword not recognized
    #[error("unknown command")]
    Unknown,
}

impl Command {
    /// Parses one protocol line.
    ///
    /// Returns `Ok(None)` for a blank line, which clients may send freely.
    pub fn parse(line: &str) -> Result<Option<Command>, CommandError> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }

        let mut parts = line.splitn(3, ' ');
        let keyword = parts.next().unwrap_or_default().to_ascii_uppercase();
        let first = parts.next();
        let rest = parts.next();

        let command = match keyword.as_str() {
            "SET" => match (first, rest) {
                (Some(key), Some(value)) => Command::Set {
                    key: key.to_string(),
                    value: value.to_string(),
                },
                _ => return Err(CommandError::Usage("SET key value")),
            },
            "GET" => Command::Get {
                key: first.ok_or(CommandError::Usage("GET key"))?.to_string(),
            },
            "DEL" => Command::Del {
                key: first.ok_or(CommandError::Usage("DEL key"))?.to_string(),
            },
            "SUBSCRIBE" => Command::Subscribe {
                channel: first
                    .ok_or(CommandError::Usage("SUBSCRIBE channel"))?
                    .to_string(),
            },
            "UNSUBSCRIBE" => Command::Unsubscribe {
                channel: first
                    .ok_or(CommandError::Usage("UNSUBSCRIBE channel"))?
                    .to_string(),
            },
            "PUBLISH" => match (first, rest) {
                (Some(channel), Some(message)) => Command::Publish {
                    channel: channel.to_string(),
                    message: message.to_string(),
                },
                _ => return Err(CommandError::Usage("PUBLISH channel message")),
            },
            "QUIT" | "EXIT" => Command::Quit,
            _ => return Err(CommandError::Unknown),
        };

        Ok(Some(command))
    }

    /// The canonical keyword, for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Command::Set { .. } => "SET",
            Command::Get { .. } => "GET",
            Command::Del { .. } => "DEL",
            Command::Subscribe { .. } => "SUBSCRIBE",
            Command::Unsubscribe { .. } => "UNSUBSCRIBE",
            Command::Publish { .. } => "PUBLISH",
            Command::Quit => "QUIT",
        }
    }
}
