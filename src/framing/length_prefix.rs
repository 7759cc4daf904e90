// ABOUTME: Fixed-width length-prefix framer, N-byte big-endian length header followed by exactly that many payload bytes
// ABOUTME: Decodes the length as a u64 regardless of header width, so 1/2/4/8-byte headers share one code path

use bytes::BytesMut;

use super::Framer;
use crate::error::FramingError;

/// Splits an incoming byte stream into `header_size`-byte big-endian length prefixes followed
/// by exactly that many payload bytes.
///
/// `header_size` of 1, 2, 4, or 8 is supported (any width up to 8 bytes works; the decoded
/// length is always held as a `u64` internally). A declared length of zero is treated as
/// invalid; there is no configuration knob to permit empty payloads.
#[derive(Debug)]
pub struct LengthPrefixFramer {
    header_size: usize,
    max_message_size: usize,
    buf: BytesMut,
    pending_len: Option<usize>,
    poisoned: bool,
}

impl LengthPrefixFramer {
    pub fn new(header_size: usize, max_message_size: usize) -> Result<Self, FramingError> {
        if header_size == 0 {
            return Err(FramingError::InvalidParameters(
                "header_size must be greater than 0".into(),
            ));
        }
        if header_size > 8 {
            return Err(FramingError::InvalidParameters(
                "header_size must be at most 8 bytes".into(),
            ));
        }
        if max_message_size == 0 {
            return Err(FramingError::InvalidParameters(
                "max_message_size must be greater than 0".into(),
            ));
        }
        Ok(Self {
            header_size,
            max_message_size,
            buf: BytesMut::new(),
            pending_len: None,
            poisoned: false,
        })
    }

    fn decode_len(&self) -> usize {
        let mut n: u64 = 0;
        for &byte in &self.buf[..self.header_size] {
            n = (n << 8) | u64::from(byte);
        }
        n as usize
    }

    /// Decodes the pending header if one isn't already cached and enough bytes are buffered.
    /// Called from both `feed` (so overflow is usually caught the moment the header arrives)
    /// and `next` (so a header that only became decodable after a prior message was drained,
    /// without an intervening `feed` call, is still picked up).
    fn try_decode_header(&mut self) {
        if self.poisoned || self.pending_len.is_some() {
            return;
        }
        if self.buf.len() < self.header_size {
            return;
        }
        let len = self.decode_len();
        if len == 0 || len > self.max_message_size {
            self.poisoned = true;
            return;
        }
        self.pending_len = Some(len);
    }
}

impl Framer for LengthPrefixFramer {
    type Message = Vec<u8>;

    fn feed(&mut self, chunk: &[u8]) -> Result<(), FramingError> {
        if self.poisoned {
            return Err(FramingError::Overflow);
        }
        if chunk.is_empty() {
            return Ok(());
        }
        self.buf.extend_from_slice(chunk);
        self.try_decode_header();
        if self.poisoned {
            return Err(FramingError::Overflow);
        }
        Ok(())
    }

    fn next(&mut self) -> Option<Vec<u8>> {
        if self.poisoned {
            return None;
        }
        self.try_decode_header();
        let len = self.pending_len?;
        if self.buf.len() < self.header_size + len {
            return None;
        }
        let mut frame = self.buf.split_to(self.header_size + len);
        let payload = frame.split_off(self.header_size);
        self.pending_len = None;
        Some(payload.to_vec())
    }

    fn is_poisoned(&self) -> bool {
        self.poisoned
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_two_messages_one_feed() {
        let mut framer = LengthPrefixFramer::new(4, 1024).unwrap();
        let mut stream = Vec::new();
        stream.extend_from_slice(&[0x00, 0x00, 0x00, 0x02, 0x0A, 0x14]);
        stream.extend_from_slice(&[0x00, 0x00, 0x00, 0x03, 0x1E, 0x28, 0x32]);
        framer.feed(&stream).unwrap();
        assert_eq!(framer.next(), Some(vec![10, 20]));
        assert_eq!(framer.next(), Some(vec![30, 40, 50]));
        assert_eq!(framer.next(), None);
    }

    #[test]
    fn round_trip_regardless_of_chunking() {
        let mut framer = LengthPrefixFramer::new(4, 1024).unwrap();
        let stream: Vec<u8> = vec![0x00, 0x00, 0x00, 0x03, b'a', b'b', b'c'];
        for byte in &stream {
            framer.feed(&[*byte]).unwrap();
        }
        assert_eq!(framer.next(), Some(vec![b'a', b'b', b'c']));
    }

    #[test]
    fn declared_length_equal_to_max_is_accepted() {
        let mut framer = LengthPrefixFramer::new(1, 3).unwrap();
        framer.feed(&[3, b'x', b'y', b'z']).unwrap();
        assert_eq!(framer.next(), Some(vec![b'x', b'y', b'z']));
    }

    #[test]
    fn declared_length_over_max_overflows() {
        let mut framer = LengthPrefixFramer::new(1, 3).unwrap();
        assert_eq!(framer.feed(&[4, b'w']), Err(FramingError::Overflow));
        assert!(framer.is_poisoned());
    }

    #[test]
    fn declared_length_zero_overflows() {
        let mut framer = LengthPrefixFramer::new(1, 3).unwrap();
        assert_eq!(framer.feed(&[0]), Err(FramingError::Overflow));
    }

    #[test]
    fn second_message_overflow_in_same_feed_is_caught_on_drain() {
        let mut framer = LengthPrefixFramer::new(1, 3).unwrap();
        // First message is valid (len=1, payload 'a'); second declares len=9, over max.
        framer.feed(&[1, b'a', 9]).unwrap();
        assert_eq!(framer.next(), Some(vec![b'a']));
        assert_eq!(framer.next(), None);
        assert!(framer.is_poisoned());
    }

    #[test]
    fn once_poisoned_feed_keeps_failing() {
        let mut framer = LengthPrefixFramer::new(1, 3).unwrap();
        assert_eq!(framer.feed(&[0]), Err(FramingError::Overflow));
        assert_eq!(framer.feed(&[1, b'a']), Err(FramingError::Overflow));
    }

    #[test]
    fn rejects_zero_header_size() {
        assert!(LengthPrefixFramer::new(0, 1024).is_err());
    }

    #[test]
    fn rejects_header_size_over_eight() {
        assert!(LengthPrefixFramer::new(9, 1024).is_err());
    }

    #[test]
    fn rejects_zero_max_message_size() {
        assert!(LengthPrefixFramer::new(4, 0).is_err());
    }

    #[test]
    fn supports_all_standard_header_widths() {
        for header_size in [1usize, 2, 4, 8] {
            let mut framer = LengthPrefixFramer::new(header_size, 64).unwrap();
            let mut header = vec![0u8; header_size];
            header[header_size - 1] = 2;
            let mut stream = header;
            stream.extend_from_slice(b"hi");
            framer.feed(&stream).unwrap();
            assert_eq!(framer.next(), Some(b"hi".to_vec()));
        }
    }
}
