//! Line framing over a raw byte stream.
//!
//! Bytes arrive in arbitrary chunks. [`LineAccumulator`] keeps everything
//! after the last `\n` until a later chunk completes the line.

use crate::config::ProtocolConfig;
use crate::error::{Result, WatchError};

/// Inbound byte accumulator for one session.
#[derive(Debug)]
pub struct LineAccumulator {
    buf: Vec<u8>,
    limit: usize,
}

impl LineAccumulator {
    /// Create an accumulator that tolerates at most `limit` bytes of an
    /// unterminated line.
    pub fn new(limit: usize) -> Self {
        Self {
            buf: Vec::new(),
            limit,
        }
    }

    /// Append received bytes.
    ///
    /// Fails once the unterminated tail grows beyond the limit; the caller
    /// should drop the connection at that point.
    pub fn append(&mut self, bytes: &[u8]) -> Result<()> {
        self.buf.extend_from_slice(bytes);
        let tail_start = self
            .buf
            .iter()
            .rposition(|&b| b == b'\n')
            .map_or(0, |pos| pos + 1);
        if self.buf.len() - tail_start > self.limit {
            return Err(WatchError::LineTooLong { limit: self.limit });
        }
        Ok(())
    }

    /// Remove and return every complete line, without terminators.
    ///
    /// A `\r` directly before the `\n` is stripped. Invalid UTF-8 is replaced
    /// rather than rejected; such lines fail to parse later on.
    pub fn take_lines(&mut self) -> Vec<String> {
        let Some(last) = self.buf.iter().rposition(|&b| b == b'\n') else {
            return Vec::new();
        };
        let complete: Vec<u8> = self.buf.drain(..=last).collect();
        complete[..complete.len() - 1]
            .split(|&b| b == b'\n')
            .map(|line| {
                let line = line.strip_suffix(b"\r").unwrap_or(line);
                String::from_utf8_lossy(line).into_owned()
            })
            .collect()
    }

    /// Bytes of the current unterminated line.
    pub fn pending(&self) -> &[u8] {
        &self.buf
    }
}

/// Split one line into its `;`-separated statements, trimmed, skipping empty ones.
pub fn split_statements(line: &str) -> impl Iterator<Item = &str> {
    line.split(ProtocolConfig::STATEMENT_SEPARATOR)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}
