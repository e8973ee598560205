//! Tokenizer collaborator trait
//!
//! The engine consumes tokenization through this seam; vocabulary formats and
//! algorithms live in implementations outside the core.

use crate::Result;

/// Contract the engine requires from a tokenizer.
///
/// Implementations are shared, read-mostly collaborators: `encode`/`decode`
/// must not mutate observable state, so one tokenizer can serve concurrent
/// completion calls.
pub trait Tokenizer: Send + Sync {
    /// Encode text into an ordered sequence of token IDs
    fn encode(&self, text: &str) -> Result<Vec<u32>>;

    /// Decode a sequence of token IDs back into text
    fn decode(&self, tokens: &[u32]) -> Result<String>;

    /// Vocabulary size
    fn vocab_size(&self) -> usize;

    /// Beginning-of-sequence token ID, if configured
    fn bos_token_id(&self) -> Option<u32>;

    /// End-of-sequence token IDs; some vocabularies configure several
    fn eos_token_ids(&self) -> Vec<u32>;

    /// Padding token ID, if configured
    fn pad_token_id(&self) -> Option<u32>;
}
