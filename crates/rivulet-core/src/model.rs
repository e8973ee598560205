//! Model capability trait and forward-pass data types
//!
//! The engine drives any model family through this seam: decoder-only models
//! implement `forward`, encoder-decoder models additionally implement
//! `encode`. Cache and encoder state are opaque handles the engine threads
//! through between steps but never inspects.

use std::any::Any;
use std::sync::Arc;

use crate::generation::GenerationConfig;
use crate::{CoreError, Result};

/// Opaque decoder cache handle, moved from one step's output into the next
/// step's inputs.
pub type CacheState = Box<dyn Any + Send>;

/// Opaque encoder output handle, shared as fixed conditioning context by
/// every decode step of one call.
pub type EncoderState = Arc<dyn Any + Send + Sync>;

/// Capability interface for a neural sequence model.
///
/// `forward` and `encode` run inference only: implementations must not track
/// gradients or other training bookkeeping.
pub trait Model: Send + Sync {
    /// Vocabulary size; every score vector has this length
    fn vocab_size(&self) -> usize;

    /// Shared generation defaults; callers clone these and never mutate the
    /// shared value
    fn generation_config(&self) -> &GenerationConfig;

    /// Whether this model conditions a decoder on a separate encoder pass
    fn is_encoder_decoder(&self) -> bool {
        false
    }

    /// Assemble forward-pass inputs from the running token histories.
    ///
    /// With a live cache only each replica's last token needs to be fed;
    /// models with other input conventions override this.
    fn prepare_inputs(
        &self,
        histories: &[Vec<u32>],
        cache: Option<CacheState>,
        encoder_state: Option<EncoderState>,
        use_cache: bool,
    ) -> ModelInputs {
        let input_ids = if use_cache && cache.is_some() {
            histories
                .iter()
                .map(|history| history.last().copied().into_iter().collect())
                .collect()
        } else {
            histories.to_vec()
        };
        ModelInputs {
            input_ids,
            cache,
            encoder_state,
            use_cache,
        }
    }

    /// One forward pass producing next-position scores per replica
    fn forward(&self, inputs: &ModelInputs) -> Result<ModelOutput>;

    /// Encoder-only pass over the prompt for encoder-decoder models
    fn encode(&self, _histories: &[Vec<u32>]) -> Result<EncoderState> {
        Err(CoreError::generation(
            "NOT_ENCODER_DECODER",
            "Model has no encoder",
            "Encoder forward pass",
            "Only call encode() when is_encoder_decoder() returns true",
        ))
    }
}

/// Inputs for one forward pass, one row per replica
pub struct ModelInputs {
    /// Token IDs to feed this step (full histories, or last tokens under a
    /// live cache)
    pub input_ids: Vec<Vec<u32>>,
    /// Cache handle returned by the previous step, if any
    pub cache: Option<CacheState>,
    /// Encoder output for encoder-decoder models
    pub encoder_state: Option<EncoderState>,
    /// Whether the model should return an updated cache
    pub use_cache: bool,
}

/// Output of one forward pass.
///
/// Model families name their returned cache differently; exactly one of the
/// cache fields should be populated, and [`ModelOutput::take_cache`] probes
/// the known names in order.
#[derive(Default)]
pub struct ModelOutput {
    /// Next-position scores over the vocabulary, one row per replica
    pub logits: Vec<Vec<f32>>,
    pub past_key_values: Option<CacheState>,
    pub mems: Option<CacheState>,
    pub past_buckets_states: Option<CacheState>,
}

impl ModelOutput {
    pub fn new(logits: Vec<Vec<f32>>) -> Self {
        Self {
            logits,
            ..Default::default()
        }
    }

    /// Attach an updated cache under the most common field name
    pub fn with_cache(mut self, cache: CacheState) -> Self {
        self.past_key_values = Some(cache);
        self
    }

    /// Extract the updated cache handle, whichever field the model family
    /// populated
    pub fn take_cache(&mut self) -> Option<CacheState> {
        self.past_key_values
            .take()
            .or_else(|| self.mems.take())
            .or_else(|| self.past_buckets_states.take())
    }
}
