//! Line Framing
//!
//! The wire protocol is one command per `\n`-terminated line. TCP is a
//! stream, so a single read may hold half a line or several lines; the
//! framer pulls complete lines out of the connection's `BytesMut` buffer
//! and leaves any partial tail in place for the next read.
//!
//! The parser returns either:
//! - `Ok(Some(line))` - A complete line was consumed from the buffer
//! - `Ok(None)` - Need more data, the line is incomplete
//! - `Err(ParseError)` - The pending line is too long to ever be accepted

use bytes::BytesMut;
use thiserror::Error;

/// Maximum length of a single command line (64 KB)
pub const MAX_LINE_LENGTH: usize = 64 * 1024;

/// Errors that can occur while framing lines.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// A line exceeded the maximum allowed size
    #[error("line too long: {size} bytes (max: {max})")]
    LineTooLong { size: usize, max: usize },
}

/// Result type for parsing operations.
pub type ParseResult<T> = Result<T, ParseError>;

/// Splits a byte buffer into protocol lines.
#[derive(Debug, Clone)]
pub struct LineFramer {
    max_line: usize,
}

impl Default for LineFramer {
    fn default() -> Self {
        Self::new()
    }
}

impl LineFramer {
    /// Creates a framer with the default line limit.
    pub fn new() -> Self {
        Self::with_max_line(MAX_LINE_LENGTH)
    }

    /// Creates a framer that rejects lines longer than `max_line` bytes.
    pub fn with_max_line(max_line: usize) -> Self {
        Self { max_line }
    }

    /// Takes the next complete line out of `buf`.
    ///
    /// The terminator (`\n` or `\r\n`) is stripped. Invalid UTF-8 is
    /// replaced rather than rejected.
    pub fn next_line(&self, buf: &mut BytesMut) -> ParseResult<Option<String>> {
        let Some(pos) = buf.iter().position(|&b| b == b'\n') else {
            if buf.len() > self.max_line {
                return Err(ParseError::LineTooLong {
                    size: buf.len(),
                    max: self.max_line,
                });
            }
            return Ok(None);
        };

        if pos > self.max_line {
            return Err(ParseError::LineTooLong {
                size: pos,
                max: self.max_line,
            });
        }

        let frame = buf.split_to(pos + 1);
        let mut line = &frame[..pos];
        if let Some(stripped) = line.strip_suffix(b"\r") {
            line = stripped;
        }

        Ok(Some(String::from_utf8_lossy(line).into_owned()))
    }

    /// Returns whatever is left in `buf` as a final, unterminated line.
    ///
    /// Used at end of stream so a last command without a newline still runs.
    pub fn finish(&self, buf: &mut BytesMut) -> Option<String> {
        if buf.is_empty() {
            return None;
        }
        let rest = buf.split();
        Some(String::from_utf8_lossy(&rest).into_owned())
    }
}
