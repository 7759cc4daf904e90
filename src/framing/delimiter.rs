// ABOUTME: Character-delimiter framer, splits a byte stream on a single delimiter byte
// ABOUTME: Scans raw bytes rather than decoding UTF-8 incrementally, so split multi-byte sequences never matter

use bytes::BytesMut;

use super::Framer;
use crate::error::FramingError;

/// Splits an incoming byte stream on a single delimiter byte (`\n` by default).
///
/// Each message delivered by [`next`](Framer::next) is the text *including* the trailing
/// delimiter, decoded lossily as UTF-8. The delimiter search itself operates on raw bytes ,
/// decoding only happens on the already-framed slice, so a multi-byte UTF-8 sequence split
/// across two `feed` calls can never cause the delimiter scan to misfire.
#[derive(Debug)]
pub struct DelimiterFramer {
    delimiter: u8,
    max_unframed: usize,
    buf: BytesMut,
}

impl DelimiterFramer {
    /// `delimiter` must encode to a single UTF-8 byte (e.g. any ASCII character); `max_unframed`
    /// must be greater than zero.
    pub fn new(delimiter: char, max_unframed: usize) -> Result<Self, FramingError> {
        if max_unframed == 0 {
            return Err(FramingError::InvalidParameters(
                "max_unframed must be greater than 0".into(),
            ));
        }
        let mut encoded = [0u8; 4];
        let encoded = delimiter.encode_utf8(&mut encoded);
        if encoded.len() != 1 {
            return Err(FramingError::InvalidParameters(format!(
                "delimiter {delimiter:?} must encode to a single byte"
            )));
        }
        Ok(Self::from_parts(encoded.as_bytes()[0], max_unframed))
    }

    pub(crate) fn from_parts(delimiter: u8, max_unframed: usize) -> Self {
        Self {
            delimiter,
            max_unframed,
            buf: BytesMut::new(),
        }
    }

    pub(crate) fn delimiter_byte(&self) -> u8 {
        self.delimiter
    }
}

impl Framer for DelimiterFramer {
    type Message = String;

    fn feed(&mut self, chunk: &[u8]) -> Result<(), FramingError> {
        if chunk.is_empty() {
            return Ok(());
        }
        self.buf.extend_from_slice(chunk);
        if self.buf.len() > self.max_unframed && !self.buf.contains(&self.delimiter) {
            return Err(FramingError::Overflow);
        }
        Ok(())
    }

    fn next(&mut self) -> Option<String> {
        let pos = self.buf.iter().position(|&b| b == self.delimiter)?;
        let message = self.buf.split_to(pos + 1);
        Some(String::from_utf8_lossy(&message).into_owned())
    }
}
