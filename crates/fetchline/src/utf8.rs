//! Streaming UTF-8 decoding.
//!
//! Multi-byte characters can split across chunk boundaries. The decoder
//! holds the bytes of an incomplete trailing sequence until the next chunk
//! arrives. Invalid sequences become U+FFFD, matching how a browser text
//! decoder treats a response body.

/// Incremental UTF-8 decoder carrying at most one partial character.
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode `chunk`, prefixed with any bytes held from the previous call.
    ///
    /// A trailing incomplete sequence is held back and not returned.
    pub fn decode(&mut self, chunk: &[u8]) -> String {
        let mut input = std::mem::take(&mut self.pending);
        input.extend_from_slice(chunk);

        let mut out = String::with_capacity(input.len());
        let mut rest = input.as_slice();
        loop {
            match std::str::from_utf8(rest) {
                Ok(valid) => {
                    out.push_str(valid);
                    break;
                }
                Err(e) => {
                    let (valid, after) = rest.split_at(e.valid_up_to());
                    out.push_str(std::str::from_utf8(valid).unwrap_or_default());
                    match e.error_len() {
                        Some(len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            rest = &after[len..];
                        }
                        None => {
                            // Incomplete sequence at the end: wait for more bytes.
                            self.pending.extend_from_slice(after);
                            break;
                        }
                    }
                }
            }
        }
        out
    }

    /// Flush at end of stream. Held bytes can no longer complete and
    /// decode to a single U+FFFD.
    pub fn finish(&mut self) -> String {
        if self.pending.is_empty() {
            String::new()
        } else {
            self.pending.clear();
            char::REPLACEMENT_CHARACTER.to_string()
        }
    }

    /// Number of bytes held from an incomplete sequence.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ascii_passes_through() {
        let mut dec = Utf8Decoder::new();
        assert_eq!(dec.decode(b"hello"), "hello");
        assert_eq!(dec.pending_len(), 0);
    }

    #[test]
    fn emoji_split_across_chunks() {
        let bytes = "a🦀b".as_bytes();
        // The crab is 4 bytes starting at index 1.
        let mut dec = Utf8Decoder::new();
        assert_eq!(dec.decode(&bytes[..3]), "a");
        assert_eq!(dec.pending_len(), 2);
        assert_eq!(dec.decode(&bytes[3..4]), "");
        assert_eq!(dec.decode(&bytes[4..]), "🦀b");
        assert_eq!(dec.pending_len(), 0);
    }

    #[test]
    fn byte_at_a_time() {
        let text = "héllo wörld ✓";
        let mut dec = Utf8Decoder::new();
        let mut out = String::new();
        for b in text.as_bytes() {
            out.push_str(&dec.decode(std::slice::from_ref(b)));
        }
        out.push_str(&dec.finish());
        assert_eq!(out, text);
    }

    #[test]
    fn invalid_bytes_become_replacement() {
        let mut dec = Utf8Decoder::new();
        assert_eq!(dec.decode(b"a\xFFb"), "a\u{FFFD}b");
    }

    #[test]
    fn truncated_sequence_at_end_of_stream() {
        let mut dec = Utf8Decoder::new();
        assert_eq!(dec.decode(&"é".as_bytes()[..1]), "");
        assert_eq!(dec.finish(), "\u{FFFD}");
        assert_eq!(dec.finish(), "");
    }
}
