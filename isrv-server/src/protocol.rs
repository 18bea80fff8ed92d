//! # Request Line Framing
//!
//! Extract one newline-terminated request line from a streaming TCP buffer.
//!
//! ## Design Principles
//!
//! 1. **Streaming Friendly**: The parser consumes from a mutable buffer and
//!    returns `None` when more data is needed.
//! 2. **No Rescans**: The parser remembers how far it already searched, so
//!    partial reads cost O(new bytes).
//! 3. **Bounded**: Lines longer than the limit are rejected before the buffer
//!    can grow without bound.
//! 4. **Lenient Text**: Invalid UTF-8 is replaced rather than rejected; the
//!    command registry turns garbage into an `Error` response anyway.

use bytes::{Buf, BytesMut};

use isrv_common::protocol::LINE_TERMINATOR;

/// Framing errors surfaced to the request task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineError {
    /// No terminator within the configured maximum line length.
    TooLong(usize),
}

/// Incremental line parser.
#[derive(Debug)]
pub struct LineParser {
    max_len: usize,
    scanned: usize,
}

impl LineParser {
    /// Creates a parser that accepts lines up to `max_len` bytes (terminator excluded).
    pub fn new(max_len: usize) -> Self {
        LineParser { max_len, scanned: 0 }
    }

    /// Attempts to take one complete line from the buffer.
    ///
    /// Returns `Ok(None)` if more data is required. The terminator (and an
    /// optional preceding `\r`) is consumed and not returned.
    pub fn parse(&mut self, buf: &mut BytesMut) -> Result<Option<String>, LineError> {
        let found = buf[self.scanned..]
            .iter()
            .position(|&b| b == LINE_TERMINATOR)
            .map(|pos| self.scanned + pos);

        match found {
            Some(end) => {
                if end > self.max_len {
                    return Err(LineError::TooLong(self.max_len));
                }
                let line = buf.split_to(end);
                buf.advance(1);
                self.scanned = 0;
                Ok(Some(decode(&line)))
            }
            None => {
                if buf.len() > self.max_len {
                    return Err(LineError::TooLong(self.max_len));
                }
                self.scanned = buf.len();
                Ok(None)
            }
        }
    }

    /// Takes whatever is left once the peer has closed its write half.
    ///
    /// Returns `None` if nothing was sent.
    pub fn finish(&mut self, buf: &mut BytesMut) -> Option<String> {
        self.scanned = 0;
        if buf.is_empty() {
            return None;
        }
        let rest = buf.split();
        Some(decode(&rest))
    }
}

fn decode(raw: &[u8]) -> String {
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    String::from_utf8_lossy(raw).into_owned()
}
