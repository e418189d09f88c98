//! Line codec for proxy stdout/stderr.
//!
//! Unlike [`tokio_util::codec::LinesCodec`], this decoder never fails on
//! content: invalid UTF-8 is replaced lossily, and a line that grows past
//! [`MAX_LINE_BYTES`] without a newline is emitted in chunks instead of being
//! discarded. A diagnostic stream must keep flowing whatever the child writes.
//!
//! Chunks end on a UTF-8 character boundary and keep their whitespace; only
//! the piece that completes a line is trimmed.
//!
//! # Usage
//!
//! ```rust,ignore
//! use tokio_util::codec::FramedRead;
//! use cliproxy_runner::process::codec::LogLineCodec;
//!
//! let lines = FramedRead::new(child_stdout, LogLineCodec::new());
//! ```

use bytes::BytesMut;
use tokio_util::codec::Decoder;

use crate::AppError;

/// Longest line emitted in one piece: 64 KiB.
pub const MAX_LINE_BYTES: usize = 64 * 1024;

/// Splits a byte stream on `\n`, trimming trailing whitespace (so `\r\n`
/// endings come out clean).
#[derive(Debug, Default)]
pub struct LogLineCodec {
    /// Offset up to which the buffer is known to hold no newline.
    scanned: usize,
}

impl LogLineCodec {
    /// Create a codec with an empty scan position.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Decoder for LogLineCodec {
    type Item = String;
    type Error = AppError;

    /// Decode the next complete line from `src`.
    ///
    /// Returns `Ok(None)` while the buffered bytes hold no newline and are
    /// shorter than [`MAX_LINE_BYTES`].
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let start = self.scanned.min(src.len());
        let newline = src[start..]
            .iter()
            .position(|byte| *byte == b'\n')
            .map(|offset| start + offset);

        if let Some(newline) = newline.filter(|newline| *newline <= MAX_LINE_BYTES) {
            let line = src.split_to(newline + 1);
            self.scanned = 0;
            return Ok(Some(to_text(&line[..newline])));
        }

        if src.len() >= MAX_LINE_BYTES {
            let end = chunk_end(src);
            let chunk = src.split_to(end);
            self.scanned = 0;
            return Ok(Some(String::from_utf8_lossy(&chunk).into_owned()));
        }

        self.scanned = src.len();
        Ok(None)
    }

    /// Flush whatever is left once the stream ends, newline or not.
    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(line) = self.decode(src)? {
            return Ok(Some(line));
        }
        if src.is_empty() {
            return Ok(None);
        }
        let rest = src.split();
        self.scanned = 0;
        Ok(Some(to_text(&rest)))
    }
}

fn to_text(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).trim_end().to_owned()
}

/// Cut point at or just below [`MAX_LINE_BYTES`] that does not split a
/// multi-byte sequence. `buf` holds at least `MAX_LINE_BYTES` bytes.
fn chunk_end(buf: &[u8]) -> usize {
    (MAX_LINE_BYTES - 3..MAX_LINE_BYTES)
        .rev()
        .find(|&index| buf[index] & 0xC0 != 0x80)
        .filter(|&index| index + sequence_len(buf[index]) > MAX_LINE_BYTES)
        .unwrap_or(MAX_LINE_BYTES)
}

fn sequence_len(lead: u8) -> usize {
    match lead.leading_ones() {
        2 => 2,
        3 => 3,
        4 => 4,
        _ => 1,
    }
}
