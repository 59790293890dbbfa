//! UTF-8 Boundary Handler
//!
//! CRITICAL: Multi-byte UTF-8 characters can split across chunk boundaries.
//! Envoy hands the filter raw body bytes, so an incomplete trailing sequence
//! is held back until the next chunk completes it. Only complete text is
//! handed to the rewriter.
//!
//! A UTF-8 character can be 1-4 bytes:
//! - 1 byte:  0xxxxxxx (ASCII)
//! - 2 bytes: 110xxxxx 10xxxxxx
//! - 3 bytes: 1110xxxx 10xxxxxx 10xxxxxx
//! - 4 bytes: 11110xxx 10xxxxxx 10xxxxxx 10xxxxxx

/// Decodes byte chunks into text, holding back split UTF-8 sequences.
pub struct Utf8Buffer {
    /// Leftover bytes from previous chunk (at most 3 for an incomplete sequence)
    leftover: [u8; 4],
    /// Number of leftover bytes
    leftover_len: usize,
}

impl Utf8Buffer {
    pub fn new() -> Self {
        Self {
            leftover: [0u8; 4],
            leftover_len: 0,
        }
    }

    /// Decode a chunk, prepending bytes held back from the previous one.
    ///
    /// Invalid sequences are replaced with U+FFFD; binary bodies are not
    /// expected here.
    pub fn decode_chunk(&mut self, chunk: &[u8]) -> String {
        let mut bytes = Vec::with_capacity(self.leftover_len + chunk.len());
        bytes.extend_from_slice(&self.leftover[..self.leftover_len]);
        bytes.extend_from_slice(chunk);
        self.leftover_len = 0;

        let valid_end = Self::find_valid_boundary(&bytes);
        let tail = &bytes[valid_end..];
        self.leftover[..tail.len()].copy_from_slice(tail);
        self.leftover_len = tail.len();

        String::from_utf8_lossy(&bytes[..valid_end]).into_owned()
    }

    /// Decode whatever is still held back. Called once at end of stream.
    pub fn finish(&mut self) -> String {
        let rest = String::from_utf8_lossy(&self.leftover[..self.leftover_len]).into_owned();
        self.leftover_len = 0;
        rest
    }

    /// Check if byte is a UTF-8 continuation byte (10xxxxxx)
    #[inline]
    pub fn is_continuation(byte: u8) -> bool {
        (byte & 0b11000000) == 0b10000000
    }

    /// Get expected length of UTF-8 sequence from first byte
    #[inline]
    pub fn sequence_length(first_byte: u8) -> usize {
        match first_byte {
            0x00..=0x7F => 1, // ASCII
            0xC0..=0xDF => 2, // 2-byte sequence
            0xE0..=0xEF => 3, // 3-byte sequence
            0xF0..=0xF7 => 4, // 4-byte sequence
            _ => 1,           // Invalid, treat as single byte
        }
    }

    /// Position where an incomplete trailing sequence starts, or `bytes.len()`
    fn find_valid_boundary(bytes: &[u8]) -> usize {
        // Scan backwards from end to find incomplete sequence
        let mut i = bytes.len();
        while i > 0 && i > bytes.len().saturating_sub(4) {
            i -= 1;
            if !Self::is_continuation(bytes[i]) {
                let expected_len = Self::sequence_length(bytes[i]);
                let available = bytes.len() - i;

                if available < expected_len {
                    return i;
                }
                break;
            }
        }

        bytes.len()
    }

    /// Number of bytes currently held back
    pub fn pending_len(&self) -> usize {
        self.leftover_len
    }

    /// Drop any held-back bytes
    pub fn reset(&mut self) {
        self.leftover_len = 0;
    }
}

impl Default for Utf8Buffer {
    fn default() -> Self {
        Self::new()
    }
}
