//! Incremental token-to-text decoding with stable offsets
//!
//! Byte-level vocabularies emit tokens that only form valid text once
//! combined with their successors. `StreamDecoder` buffers such tokens and
//! returns a fragment only when the decoded text ends cleanly, so previously
//! returned text is never revised by later tokens.

use std::sync::Arc;

use crate::tokenizer::Tokenizer;
use crate::Result;

const REPLACEMENT: char = '\u{FFFD}';

/// Per-replica incremental decoder tracking a stable text offset.
///
/// Each replica owns exactly one decoder for the lifetime of a completion
/// call.
pub struct StreamDecoder {
    tokenizer: Arc<dyn Tokenizer>,
    pending: Vec<u32>,
    start: usize,
    offset: usize,
}

impl StreamDecoder {
    pub fn new(tokenizer: Arc<dyn Tokenizer>) -> Self {
        Self {
            tokenizer,
            pending: Vec::new(),
            start: 0,
            offset: 0,
        }
    }

    /// Byte offset at which the most recently returned fragment begins.
    ///
    /// Text before this offset is stable and will never be revised.
    pub fn start(&self) -> usize {
        self.start
    }

    /// Decode one token, returning the newly stable text fragment.
    ///
    /// Returns an empty string while the buffered tokens still decode to an
    /// incomplete trailing sequence; they are re-decoded together with later
    /// tokens until the text ends cleanly.
    pub fn decode(&mut self, token: u32) -> Result<String> {
        self.pending.push(token);
        let text = self.tokenizer.decode(&self.pending)?;
        self.start = self.offset;
        if text.ends_with(REPLACEMENT) {
            return Ok(String::new());
        }
        self.pending.clear();
        self.offset += text.len();
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Token IDs are raw bytes; decoding is lossy UTF-8, so a partial
    /// multi-byte sequence ends in U+FFFD.
    struct ByteTokenizer;

    impl Tokenizer for ByteTokenizer {
        fn encode(&self, text: &str) -> Result<Vec<u32>> {
            Ok(text.bytes().map(u32::from).collect())
        }

        fn decode(&self, tokens: &[u32]) -> Result<String> {
            let bytes: Vec<u8> = tokens.iter().map(|&t| t as u8).collect();
            Ok(String::from_utf8_lossy(&bytes).into_owned())
        }

        fn vocab_size(&self) -> usize {
            256
        }

        fn bos_token_id(&self) -> Option<u32> {
            None
        }

        fn eos_token_ids(&self) -> Vec<u32> {
            Vec::new()
        }

        fn pad_token_id(&self) -> Option<u32> {
            None
        }
    }

    #[test]
    fn test_ascii_fragments_advance_offset() {
        let mut decoder = StreamDecoder::new(Arc::new(ByteTokenizer));

        assert_eq!(decoder.decode(b'h' as u32).unwrap(), "h");
        assert_eq!(decoder.start(), 0);

        assert_eq!(decoder.decode(b'i' as u32).unwrap(), "i");
        assert_eq!(decoder.start(), 1);
    }

    #[test]
    fn test_buffers_partial_multibyte_sequence() {
        let mut decoder = StreamDecoder::new(Arc::new(ByteTokenizer));

        // "é" is 0xC3 0xA9; the first byte alone is not valid text.
        assert_eq!(decoder.decode(0xC3).unwrap(), "");
        assert_eq!(decoder.start(), 0);

        assert_eq!(decoder.decode(0xA9).unwrap(), "é");
        assert_eq!(decoder.start(), 0);

        // The two-byte fragment is now stable.
        assert_eq!(decoder.decode(b'!' as u32).unwrap(), "!");
        assert_eq!(decoder.start(), 2);
    }
}
