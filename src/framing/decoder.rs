//! Streaming UTF-8 to UTF-16 decoder that feeds the tokenizer.
//!
//! Reads from the network never line up with character boundaries, so a
//! multi-byte sequence may arrive one byte per read. The decoder keeps the
//! incomplete sequence in a fixed four-byte accumulator and resumes on the
//! next call.

use std::io::IoSlice;

use tracing::warn;

use super::error::{FramingError, Result};
use super::events::StanzaHandler;
use super::policy::FramingPolicy;
use super::tokenizer::Tokenizer;

/// Capacity of the output buffer when none is configured, in code units.
pub const DEFAULT_BUFFER_CAPACITY: usize = 256;

#[derive(Debug)]
pub struct Utf8Decoder {
    pending: [u8; 4],
    /// Bytes of the current sequence received so far.
    seen: usize,
    /// Total length of the current sequence.
    expected: usize,
    output: Vec<u16>,
    failed: Option<FramingError>,
}

impl Default for Utf8Decoder {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_BUFFER_CAPACITY)
    }
}

impl Utf8Decoder {
    pub fn with_capacity(capacity: usize) -> Self {
        Utf8Decoder {
            pending: [0; 4],
            seen: 0,
            expected: 0,
            output: Vec::with_capacity(capacity),
            failed: None,
        }
    }

    /// Decode one chunk and hand everything decoded to `tokenizer` in one call.
    pub fn feed<P, H>(&mut self, bytes: &[u8], tokenizer: &mut Tokenizer<P>, handler: &mut H) -> Result<()>
    where
        P: FramingPolicy,
        H: StanzaHandler,
    {
        self.decode(bytes)?;
        self.forward(tokenizer, handler)
    }

    /// Decode a gathered write chunk by chunk, then forward once.
    pub fn feed_vectored<P, H>(
        &mut self,
        chunks: &[IoSlice<'_>],
        tokenizer: &mut Tokenizer<P>,
        handler: &mut H,
    ) -> Result<()>
    where
        P: FramingPolicy,
        H: StanzaHandler,
    {
        for chunk in chunks {
            self.decode(chunk)?;
        }
        self.forward(tokenizer, handler)
    }

    /// Declare end of input. Fails if a sequence was cut short.
    pub fn finish(&mut self) -> Result<()> {
        if let Some(err) = &self.failed {
            return Err(err.clone());
        }
        if self.seen > 0 {
            return Err(self.fail(FramingError::InvalidByteSequence(
                "input ended inside a multi-byte sequence",
            )));
        }
        Ok(())
    }

    /// Replace the output buffer with one of the given capacity and drop any
    /// partial sequence.
    pub fn reset_buffer(&mut self, capacity: usize) {
        self.output = Vec::with_capacity(capacity);
        self.seen = 0;
        self.expected = 0;
        self.failed = None;
    }

    pub fn capacity(&self) -> usize {
        self.output.capacity()
    }

    /// Whether part of a multi-byte sequence is waiting for more bytes.
    pub fn has_pending(&self) -> bool {
        self.seen > 0
    }

    fn decode(&mut self, bytes: &[u8]) -> Result<()> {
        if let Some(err) = &self.failed {
            return Err(err.clone());
        }
        for &byte in bytes {
            if let Err(err) = self.push_byte(byte) {
                self.output.clear();
                return Err(self.fail(err));
            }
        }
        Ok(())
    }

    fn push_byte(&mut self, byte: u8) -> Result<()> {
        if self.seen == 0 {
            self.expected = match byte {
                0x00..=0x7F => {
                    self.output.push(u16::from(byte));
                    return Ok(());
                }
                0x80..=0xBF => {
                    return Err(FramingError::InvalidByteSequence("unexpected continuation byte"))
                }
                0xC0..=0xDF => 2,
                0xE0..=0xEF => 3,
                0xF0..=0xF7 => 4,
                _ => return Err(FramingError::InvalidByteSequence("illegal leading byte")),
            };
            self.pending[0] = byte;
            self.seen = 1;
            return Ok(());
        }

        if byte & 0xC0 != 0x80 {
            return Err(FramingError::InvalidByteSequence("expected continuation byte"));
        }
        self.pending[self.seen] = byte;
        self.seen += 1;
        if self.seen == self.expected {
            self.seen = 0;
            let scalar = self.assemble();
            self.emit(scalar)?;
        }
        Ok(())
    }

    fn assemble(&self) -> u32 {
        let p = &self.pending;
        let tail = |i: usize| u32::from(p[i] & 0x3F);
        match self.expected {
            2 => (u32::from(p[0] & 0x1F) << 6) | tail(1),
            3 => (u32::from(p[0] & 0x0F) << 12) | (tail(1) << 6) | tail(2),
            _ => (u32::from(p[0] & 0x07) << 18) | (tail(1) << 12) | (tail(2) << 6) | tail(3),
        }
    }

    fn emit(&mut self, scalar: u32) -> Result<()> {
        let minimum = match self.expected {
            2 => 0x80,
            3 => 0x800,
            _ => 0x1_0000,
        };
        if scalar < minimum {
            return Err(FramingError::InvalidByteSequence("overlong encoding"));
        }
        if (0xD800..=0xDFFF).contains(&scalar) || scalar > 0x10_FFFF {
            return Err(FramingError::InvalidByteSequence("not a Unicode scalar value"));
        }
        if scalar >= 0x1_0000 {
            let offset = scalar - 0x1_0000;
            self.output.push((0xD800 + (offset >> 10)) as u16);
            self.output.push((0xDC00 + (offset & 0x3FF)) as u16);
        } else {
            self.output.push(scalar as u16);
        }
        Ok(())
    }

    fn forward<P, H>(&mut self, tokenizer: &mut Tokenizer<P>, handler: &mut H) -> Result<()>
    where
        P: FramingPolicy,
        H: StanzaHandler,
    {
        if self.output.is_empty() {
            return Ok(());
        }
        let result = tokenizer.feed(&self.output, handler);
        self.output.clear();
        result
    }

    fn fail(&mut self, err: FramingError) -> FramingError {
        warn!(kind = err.kind(), error = %err, "UTF-8 decoding failed, stream is unusable");
        self.failed = Some(err.clone());
        err
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::framing::events::EventCollector;
    use crate::framing::policy::GenericPolicy;

    fn decode_all(chunks: &[&[u8]]) -> Result<Vec<String>> {
        let mut decoder = Utf8Decoder::default();
        let mut tokenizer = Tokenizer::new(GenericPolicy::default());
        let mut collector = EventCollector::new();
        for chunk in chunks {
            decoder.feed(chunk, &mut tokenizer, &mut collector)?;
        }
        decoder.finish()?;
        Ok(collector.take_stanzas())
    }

    #[test]
    fn test_ascii_passthrough() {
        assert_eq!(decode_all(&[b"<a>b</a>"]).unwrap(), vec!["<a>b</a>"]);
    }

    #[test]
    fn test_supplementary_char_one_byte_per_call() {
        let mut decoder = Utf8Decoder::default();
        let mut tokenizer = Tokenizer::new(GenericPolicy::default());
        let mut collector = EventCollector::new();

        decoder.feed(b"<a>", &mut tokenizer, &mut collector).unwrap();
        for byte in [0xF0u8, 0x90, 0x85, 0x81] {
            decoder.feed(&[byte], &mut tokenizer, &mut collector).unwrap();
        }
        assert!(!decoder.has_pending());
        assert!(collector.stanzas().is_empty());

        decoder.feed(b"</a>", &mut tokenizer, &mut collector).unwrap();
        assert_eq!(collector.stanzas(), vec!["<a>\u{10141}</a>"]);
    }

    #[test]
    fn test_surrogate_pair_units() {
        let mut decoder = Utf8Decoder::default();
        decoder.decode(&[0xF0, 0x90, 0x85, 0x81]).unwrap();
        assert_eq!(decoder.output, vec![0xD800, 0xDD41]);
    }

    #[test]
    fn test_every_length_class() {
        let text = "a\u{e9}\u{20ac}\u{1F600}";
        let bytes = text.as_bytes();
        let mut decoder = Utf8Decoder::default();
        for byte in bytes {
            decoder.decode(std::slice::from_ref(byte)).unwrap();
        }
        let expected: Vec<u16> = text.encode_utf16().collect();
        assert_eq!(decoder.output, expected);
    }

    #[test]
    fn test_bom_is_kept() {
        let stanzas = decode_all(&[b"\xEF\xBB\xBF<a/>"]).unwrap();
        assert_eq!(stanzas, vec!["\u{FEFF}<a/>"]);
    }

    #[test]
    fn test_illegal_leading_byte() {
        for byte in [0xF8u8, 0xFC, 0xFF] {
            assert_eq!(
                decode_all(&[b"<a>", &[byte]]),
                Err(FramingError::InvalidByteSequence("illegal leading byte"))
            );
        }
    }

    #[test]
    fn test_stray_continuation_byte() {
        assert!(matches!(
            decode_all(&[&[0x80]]),
            Err(FramingError::InvalidByteSequence(_))
        ));
    }

    #[test]
    fn test_truncated_sequence_at_finish() {
        assert_eq!(
            decode_all(&[b"<a/>", &[0xE2, 0x82]]),
            Err(FramingError::InvalidByteSequence(
                "input ended inside a multi-byte sequence"
            ))
        );
    }

    #[test]
    fn test_overlong_and_surrogate_rejected() {
        assert!(decode_all(&[&[0xC0, 0xBC]]).is_err());
        assert!(decode_all(&[&[0xED, 0xA0, 0x80]]).is_err());
        assert!(decode_all(&[&[0xF4, 0x90, 0x80, 0x80]]).is_err());
    }

    #[test]
    fn test_vectored_write_splits_sequence() {
        let mut decoder = Utf8Decoder::default();
        let mut tokenizer = Tokenizer::new(GenericPolicy::default());
        let mut collector = EventCollector::new();
        let chunks = [
            IoSlice::new(b"<a>\xE2"),
            IoSlice::new(b"\x82"),
            IoSlice::new(b"\xAC</a>"),
        ];
        decoder.feed_vectored(&chunks, &mut tokenizer, &mut collector).unwrap();
        assert_eq!(collector.stanzas(), vec!["<a>\u{20ac}</a>"]);
    }

    #[test]
    fn test_buffer_grows_and_keeps_capacity() {
        let mut decoder = Utf8Decoder::with_capacity(4);
        let mut tokenizer = Tokenizer::new(GenericPolicy::default());
        let mut collector = EventCollector::new();
        let stanza = format!("<a>{}</a>", "x".repeat(100));
        decoder.feed(stanza.as_bytes(), &mut tokenizer, &mut collector).unwrap();
        assert!(decoder.capacity() >= stanza.len());
        assert!(decoder.output.is_empty());
        assert_eq!(collector.stanzas(), vec![stanza.as_str()]);

        decoder.reset_buffer(8);
        assert!(decoder.capacity() >= 8);
        assert!(decoder.capacity() < stanza.len());
    }

    #[test]
    fn test_error_is_sticky() {
        let mut decoder = Utf8Decoder::default();
        let mut tokenizer = Tokenizer::new(GenericPolicy::default());
        let mut collector = EventCollector::new();
        assert!(decoder.feed(&[0xFF], &mut tokenizer, &mut collector).is_err());
        assert!(decoder.feed(b"<a/>", &mut tokenizer, &mut collector).is_err());
        assert!(collector.stanzas().is_empty());
    }
}
