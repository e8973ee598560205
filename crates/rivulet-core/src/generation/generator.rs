//! Batched autoregressive decode loop
//!
//! `TokenGenerator` is an explicit pull-based iterator over decode steps:
//! each `next()` runs one forward pass for the whole batch, transforms and
//! samples the next token per replica, and yields a [`BatchStep`]. The
//! suspension point is exactly "after yielding one step, before computing
//! the next"; dropping the iterator releases the cache handle and batch
//! buffers. Restart only by constructing a new generator.

use std::sync::Arc;

use tracing::{debug, trace};

use crate::generation::logits::LogitsProcessorList;
use crate::generation::sampler::Sampler;
use crate::generation::{BatchStep, GenerationConfig, SequenceStatus};
use crate::infer::with_retry;
use crate::model::{CacheState, EncoderState, Model};
use crate::{CoreError, Result};

pub struct TokenGenerator {
    model: Arc<dyn Model>,
    config: GenerationConfig,
    processors: LogitsProcessorList,
    sampler: Sampler,
    logprobs: usize,
    pad_token_id: Option<u32>,
    /// Running token sequences, one per replica; rows only grow and stay the
    /// same length as each other
    histories: Vec<Vec<u32>>,
    input_length: usize,
    unfinished: Vec<bool>,
    cache: Option<CacheState>,
    encoder_state: Option<EncoderState>,
    done: bool,
}

impl TokenGenerator {
    /// Set up the decode loop for `n` replicas of `input_ids`.
    ///
    /// The config must already be the per-call copy with request overrides
    /// applied. An empty prompt is seeded with a single token (the first
    /// end-of-sequence ID when one is configured). For encoder-decoder
    /// models this runs the encoder pass immediately and reinitializes the
    /// running history to a single decoder-start token.
    pub fn new(
        model: Arc<dyn Model>,
        mut input_ids: Vec<u32>,
        n: usize,
        config: GenerationConfig,
        logprobs: usize,
        sampler: Sampler,
    ) -> Result<Self> {
        let pad_token_id = config.padding_id();

        // Generate from eos if no input is specified.
        if input_ids.is_empty() {
            input_ids.push(config.eos_token_ids.first().copied().unwrap_or(1));
        }

        let mut histories = vec![input_ids; n];
        let mut encoder_state = None;

        // Encoder-decoder models condition every step on a single encoder
        // pass over the prompt; the decoder starts from its own start token.
        if model.is_encoder_decoder() {
            let state = with_retry("encoder forward pass", || model.encode(&histories))?;
            encoder_state = Some(state);

            let start = config
                .decoder_start_token_id
                .or(config.bos_token_id)
                .ok_or_else(|| {
                    CoreError::generation(
                        "MISSING_DECODER_START",
                        "Encoder-decoder model configures neither a decoder-start nor a bos token",
                        "Decoder initialization",
                        "Set decoder_start_token_id or bos_token_id in the generation config",
                    )
                })?;
            histories = vec![vec![start]; n];
        }

        let input_length = histories[0].len();
        let processors = LogitsProcessorList::from_config(&config, input_length);

        Ok(Self {
            model,
            config,
            processors,
            sampler,
            logprobs,
            pad_token_id,
            histories,
            input_length,
            unfinished: vec![true; n],
            cache: None,
            encoder_state,
            done: false,
        })
    }

    /// Number of tokens generated beyond the initial input
    fn new_token_count(&self) -> usize {
        self.histories[0].len() - self.input_length
    }

    fn step(&mut self) -> Result<BatchStep> {
        let n = self.histories.len();

        let inputs = self.model.prepare_inputs(
            &self.histories,
            self.cache.take(),
            self.encoder_state.clone(),
            self.config.use_cache,
        );
        let mut outputs = with_retry("model forward pass", || self.model.forward(&inputs))?;

        if outputs.logits.len() != n {
            return Err(CoreError::generation(
                "BATCH_SHAPE_MISMATCH",
                format!(
                    "Model returned {} logit rows for a batch of {n}",
                    outputs.logits.len()
                ),
                "Batched decode step",
                "The model must return one next-token score vector per replica",
            ));
        }

        let deterministic = self.config.is_deterministic();
        let mut tokens = Vec::with_capacity(n);
        let mut token_logprobs = Vec::with_capacity(n);
        let mut top_tokens = Vec::with_capacity(n);
        let mut top_logprobs = Vec::with_capacity(n);

        for (scores, history) in outputs.logits.iter_mut().zip(&self.histories) {
            self.processors.process(history, scores);
            let choice = self.sampler.sample(scores, deterministic, self.logprobs)?;
            tokens.push(choice.token);
            token_logprobs.push(choice.logprob);
            top_tokens.push(choice.top_tokens);
            top_logprobs.push(choice.top_logprobs);
        }

        self.cache = outputs.take_cache();

        // Finished sequences emit padding so the batch stays rectangular.
        if let Some(pad) = self.pad_token_id {
            for (token, &live) in tokens.iter_mut().zip(&self.unfinished) {
                if !live {
                    *token = pad;
                }
            }
        }

        for (history, &token) in self.histories.iter_mut().zip(&tokens) {
            history.push(token);
        }

        // A chosen token matching any eos id finishes its replica.
        for (live, &token) in self.unfinished.iter_mut().zip(&tokens) {
            if *live && self.config.eos_token_ids.contains(&token) {
                *live = false;
            }
        }

        let cap_reached = self.new_token_count() >= self.config.max_new_tokens;
        let status = self
            .unfinished
            .iter()
            .map(|&live| match (live, cap_reached) {
                (false, _) => SequenceStatus::Stopped,
                (true, false) => SequenceStatus::Live,
                (true, true) => SequenceStatus::Exhausted,
            })
            .collect();

        trace!(step = self.new_token_count(), "decode step complete");

        Ok(BatchStep {
            tokens,
            token_logprobs,
            top_tokens,
            top_logprobs,
            status,
        })
    }
}

impl Iterator for TokenGenerator {
    type Item = Result<BatchStep>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.step() {
            Ok(step) => {
                if step.all_finished() {
                    self.done = true;
                    debug!(steps = self.new_token_count(), "generation complete");
                }
                Some(Ok(step))
            }
            Err(err) => {
                // A failed step fuses the iterator; no partial results.
                self.done = true;
                Some(Err(err))
            }
        }
    }
}
