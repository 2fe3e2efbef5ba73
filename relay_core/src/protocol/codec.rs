//! Newline-delimited JSON decoder for the tool's stdout.
//!
//! Bytes may arrive in arbitrary chunks; a line is only classified once its
//! terminating `\n` is buffered. Lines that are empty, not UTF-8, not JSON, or
//! longer than the configured limit are logged and skipped; they never end the
//! stream.

use super::types::ProgressMessage;
use crate::constants::MAX_PROTOCOL_LINE_BYTES;
use bytes::{Buf, BytesMut};
use tokio_util::codec::Decoder;

/// Decoder yielding one [`ProgressMessage`] per well-formed line.
#[derive(Debug, Clone)]
pub struct ProtocolCodec {
    max_line_length: usize,
    // Offset up to which the buffer is known to hold no newline
    next_index: usize,
    // Inside an over-long line; drop bytes until the next newline
    discarding: bool,
    dropped_lines: u64,
}

impl ProtocolCodec {
    pub fn new() -> Self {
        Self::with_max_line_length(MAX_PROTOCOL_LINE_BYTES)
    }

    pub fn with_max_line_length(max_line_length: usize) -> Self {
        Self {
            max_line_length,
            next_index: 0,
            discarding: false,
            dropped_lines: 0,
        }
    }

    /// Number of lines skipped because they could not be decoded.
    pub fn dropped_lines(&self) -> u64 {
        self.dropped_lines
    }

    fn classify(&mut self, line: &[u8]) -> Option<ProgressMessage> {
        let line = match std::str::from_utf8(line) {
            Ok(line) => line.trim_end_matches('\r').trim(),
            Err(e) => {
                self.dropped_lines += 1;
                tracing::warn!("Dropping non UTF-8 protocol line: {}", e);
                return None;
            }
        };
        if line.is_empty() {
            return None;
        }
        match ProgressMessage::from_line(line) {
            Ok(message) => {
                tracing::debug!("Decoded protocol message: {:?}", message);
                Some(message)
            }
            Err(e) => {
                self.dropped_lines += 1;
                tracing::warn!("Dropping malformed protocol line ({}): {}", e, line);
                None
            }
        }
    }
}

impl Default for ProtocolCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for ProtocolCodec {
    type Item = ProgressMessage;
    type Error = std::io::Error;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            let newline = buf[self.next_index..]
                .iter()
                .position(|b| *b == b'\n')
                .map(|offset| self.next_index + offset);

            match (newline, self.discarding) {
                (Some(end), true) => {
                    buf.advance(end + 1);
                    self.next_index = 0;
                    self.discarding = false;
                }
                (None, true) => {
                    buf.advance(buf.len());
                    self.next_index = 0;
                    return Ok(None);
                }
                (Some(end), false) => {
                    let line = buf.split_to(end + 1);
                    self.next_index = 0;
                    if let Some(message) = self.classify(&line[..end]) {
                        return Ok(Some(message));
                    }
                }
                (None, false) => {
                    if buf.len() > self.max_line_length {
                        self.dropped_lines += 1;
                        tracing::warn!(
                            "Dropping protocol line longer than {} bytes",
                            self.max_line_length
                        );
                        buf.advance(buf.len());
                        self.next_index = 0;
                        self.discarding = true;
                    } else {
                        self.next_index = buf.len();
                    }
                    return Ok(None);
                }
            }
        }
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(message) = self.decode(buf)? {
            return Ok(Some(message));
        }
        // A final line without a trailing newline still counts
        if buf.is_empty() || self.discarding {
            buf.clear();
            return Ok(None);
        }
        let line = buf.split_to(buf.len());
        self.next_index = 0;
        Ok(self.classify(&line))
    }
}
