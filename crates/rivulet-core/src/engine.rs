//! Stream orchestrator: the public completion entry point
//!
//! `StreamEngine` validates and tokenizes a request, fans the prompt out
//! into `n` replicas, and exposes the decode loop as a lazy iterator of
//! [`Choice`] values. Echo choices precede all generated choices; within a
//! decode step, choices are emitted in replica-index order.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use tracing::debug;

use crate::choice::{Choice, LogProbs};
use crate::decoder::StreamDecoder;
use crate::generation::generator::TokenGenerator;
use crate::generation::sampler::{round8, Sampler};
use crate::generation::{
    BatchStep, CompletionRequest, FinishReason, GenerationConfig, Prompt, SequenceStatus,
};
use crate::model::Model;
use crate::tokenizer::Tokenizer;
use crate::Result;

/// Streaming completion engine over a shared model and tokenizer.
///
/// Both collaborators are read-mostly: each call clones the model's
/// generation defaults before applying request overrides, so concurrent
/// completions against the same engine never interfere.
pub struct StreamEngine {
    model: Arc<dyn Model>,
    tokenizer: Arc<dyn Tokenizer>,
}

impl StreamEngine {
    pub fn new(model: Arc<dyn Model>, tokenizer: Arc<dyn Tokenizer>) -> Self {
        Self { model, tokenizer }
    }

    /// Create a completion stream for the given request.
    ///
    /// Request validation and prompt tokenization happen here, synchronously,
    /// before any model invocation; inference failures surface later as
    /// stream items.
    pub fn complete(&self, request: CompletionRequest) -> Result<CompletionStream> {
        self.complete_with_sampler(request, Sampler::new())
    }

    /// Like [`complete`](Self::complete) with a caller-provided sampler, for
    /// reproducible stochastic decoding.
    pub fn complete_with_sampler(
        &self,
        mut request: CompletionRequest,
        sampler: Sampler,
    ) -> Result<CompletionStream> {
        request.normalize();

        let input_ids = match &request.prompt {
            Prompt::Text(text) => self.tokenizer.encode(text)?,
            Prompt::Tokens(tokens) => tokens.clone(),
        };

        let mut config = self.model.generation_config().clone();
        config.apply_request(&request);

        debug!(
            prompt_len = input_ids.len(),
            n = request.n,
            max_tokens = request.max_tokens,
            logprobs = request.logprobs,
            echo = request.echo,
            "starting completion stream"
        );

        let decoders = (0..request.n)
            .map(|_| StreamDecoder::new(Arc::clone(&self.tokenizer)))
            .collect();

        Ok(CompletionStream {
            model: Arc::clone(&self.model),
            tokenizer: Arc::clone(&self.tokenizer),
            input_ids,
            config,
            n: request.n,
            logprobs: request.logprobs,
            echo: request.echo,
            decoders,
            finish_reasons: vec![None; request.n],
            sampler: Some(sampler),
            generator: None,
            pending: VecDeque::new(),
            echo_pos: 0,
            done: false,
        })
    }
}

/// Lazy, pull-driven stream of completion choices.
///
/// Abandoning the stream (dropping it) releases the decode loop's cache
/// handle and batch buffers; no cancellation signal is needed.
impl std::fmt::Debug for CompletionStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionStream").finish_non_exhaustive()
    }
}

pub struct CompletionStream {
    model: Arc<dyn Model>,
    tokenizer: Arc<dyn Tokenizer>,
    input_ids: Vec<u32>,
    config: GenerationConfig,
    n: usize,
    logprobs: usize,
    echo: bool,
    decoders: Vec<StreamDecoder>,
    finish_reasons: Vec<Option<FinishReason>>,
    sampler: Option<Sampler>,
    generator: Option<TokenGenerator>,
    pending: VecDeque<Choice>,
    /// Flattened cursor over (prompt token, replica) pairs, token-major
    echo_pos: usize,
    done: bool,
}

impl CompletionStream {
    /// Adapt the stream for async consumers.
    pub fn into_stream(self) -> impl futures::Stream<Item = Result<Choice>> {
        futures::stream::iter(self)
    }

    fn advance(&mut self) -> Result<Option<Choice>> {
        loop {
            // Prompt phase: every decoder is primed with the prompt tokens so
            // generated offsets account for the prompt text; choices are
            // emitted only when echo was requested.
            while self.echo_pos < self.input_ids.len() * self.n {
                let token = self.input_ids[self.echo_pos / self.n];
                let replica = self.echo_pos % self.n;
                self.echo_pos += 1;

                let text = self.decoders[replica].decode(token)?;
                let offset = self.decoders[replica].start();
                if self.echo {
                    let mut choice = Choice::new(text, replica, offset);
                    if self.logprobs > 0 {
                        choice = choice.with_logprobs(self.sample_diagnostics(
                            token,
                            0.0,
                            &[],
                            &[],
                        )?);
                    }
                    return Ok(Some(choice));
                }
            }

            if let Some(choice) = self.pending.pop_front() {
                return Ok(Some(choice));
            }

            if self.generator.is_none() {
                let sampler = self.sampler.take().unwrap_or_default();
                let generator = TokenGenerator::new(
                    Arc::clone(&self.model),
                    self.input_ids.clone(),
                    self.n,
                    self.config.clone(),
                    self.logprobs,
                    sampler,
                )?;
                self.generator = Some(generator);
            }

            match self.generator.as_mut().and_then(|g| g.next()) {
                None => {
                    debug!("completion stream finished");
                    return Ok(None);
                }
                Some(step) => self.collect_choices(step?)?,
            }
        }
    }

    /// Turn one batch step into choices for every still-relevant replica.
    fn collect_choices(&mut self, step: BatchStep) -> Result<()> {
        for replica in 0..self.n {
            // A replica finished on an earlier step stops emitting; its
            // finish reason is never recomputed.
            if self.finish_reasons[replica].is_some() {
                continue;
            }
            match step.status[replica] {
                SequenceStatus::Stopped => {
                    self.finish_reasons[replica] = Some(FinishReason::Stop);
                }
                SequenceStatus::Exhausted => {
                    self.finish_reasons[replica] = Some(FinishReason::Length);
                }
                SequenceStatus::Live => {}
            }

            let logprobs = if self.logprobs > 0 {
                Some(self.sample_diagnostics(
                    step.tokens[replica],
                    step.token_logprobs[replica],
                    &step.top_tokens[replica],
                    &step.top_logprobs[replica],
                )?)
            } else {
                None
            };

            let text = self.decoders[replica].decode(step.tokens[replica])?;
            let offset = self.decoders[replica].start();

            let mut choice = Choice::new(text, replica, offset);
            if let Some(reason) = self.finish_reasons[replica] {
                choice = choice.with_finish_reason(reason);
            }
            if let Some(logprobs) = logprobs {
                choice = choice.with_logprobs(logprobs);
            }
            self.pending.push_back(choice);
        }
        Ok(())
    }

    /// Build the text-keyed diagnostics bundle for one emitted token.
    ///
    /// Log-probabilities are rounded to 8 decimal digits and the chosen
    /// token's own pair is merged into the map last, so it is always present
    /// even when it falls outside the top-k window.
    fn sample_diagnostics(
        &self,
        token: u32,
        token_logprob: f64,
        top_tokens: &[u32],
        top_logprobs: &[f64],
    ) -> Result<LogProbs> {
        let token_text = self.tokenizer.decode(&[token])?;
        let token_logprob = round8(token_logprob);

        let mut top: BTreeMap<String, f64> = BTreeMap::new();
        for (&id, &logprob) in top_tokens.iter().zip(top_logprobs) {
            top.insert(self.tokenizer.decode(&[id])?, round8(logprob));
        }
        top.insert(token_text.clone(), token_logprob);

        Ok(LogProbs {
            token: token_text,
            token_logprob,
            top_logprobs: top,
        })
    }
}

impl Iterator for CompletionStream {
    type Item = Result<Choice>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.advance() {
            Ok(Some(choice)) => Some(Ok(choice)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }
}
