//! Generation configuration and data model

pub mod generator;
pub mod logits;
pub mod sampler;

use serde::{Deserialize, Serialize};

/// A completion prompt: either raw text or a pre-tokenized sequence.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Prompt {
    /// Text to be tokenized at call entry
    Text(String),
    /// Token IDs accepted directly, bypassing the tokenizer
    Tokens(Vec<u32>),
}

impl Default for Prompt {
    fn default() -> Self {
        Prompt::Tokens(Vec::new())
    }
}

impl From<&str> for Prompt {
    fn from(text: &str) -> Self {
        Prompt::Text(text.to_string())
    }
}

impl From<String> for Prompt {
    fn from(text: String) -> Self {
        Prompt::Text(text)
    }
}

impl From<Vec<u32>> for Prompt {
    fn from(tokens: Vec<u32>) -> Self {
        Prompt::Tokens(tokens)
    }
}

/// A request for a completion stream
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
    /// Prompt to complete
    #[serde(default)]
    pub prompt: Prompt,

    /// Minimum number of tokens to generate before end-of-sequence is allowed
    #[serde(default)]
    pub min_tokens: usize,

    /// Maximum number of tokens to generate
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,

    /// Temperature for sampling (<= 0 selects deterministic decoding)
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Top-p (nucleus) sampling threshold; the filter is active only for
    /// values strictly between 0 and 1
    #[serde(default = "default_top_p")]
    pub top_p: f32,

    /// Number of candidate sequences to sample in parallel
    #[serde(default = "default_n")]
    pub n: usize,

    /// Number of most-likely alternative tokens to report per step
    /// (0 disables log-probability diagnostics)
    #[serde(default)]
    pub logprobs: usize,

    /// Whether to re-emit prompt tokens as choices before generated tokens
    #[serde(default)]
    pub echo: bool,
}

fn default_max_tokens() -> usize {
    16
}

fn default_temperature() -> f32 {
    1.0
}

fn default_top_p() -> f32 {
    1.0
}

fn default_n() -> usize {
    1
}

impl Default for CompletionRequest {
    fn default() -> Self {
        Self {
            prompt: Prompt::default(),
            min_tokens: 0,
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            top_p: default_top_p(),
            n: default_n(),
            logprobs: 0,
            echo: false,
        }
    }
}

impl CompletionRequest {
    /// Create a request for the given prompt with default settings
    pub fn new(prompt: impl Into<Prompt>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Default::default()
        }
    }

    /// Clamp numeric fields to their valid floors.
    ///
    /// `min_tokens` and `logprobs` are unsigned so their zero floor is
    /// enforced by the type; `temperature <= 0` and `top_p <= 0` are caller
    /// sentinels for deterministic decoding and pass through unchanged.
    pub fn normalize(&mut self) {
        self.max_tokens = self.max_tokens.max(1);
        self.n = self.n.max(1);
    }
}

/// Generation settings shared by a model and copied per call.
///
/// A model exposes its defaults through [`crate::model::Model::generation_config`];
/// the engine clones them and overlays the request before each call, so
/// per-request overrides never leak into the shared defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Minimum number of new tokens before end-of-sequence becomes selectable
    pub min_new_tokens: usize,

    /// Maximum number of new tokens to generate
    pub max_new_tokens: usize,

    /// Temperature for sampling (<= 0 selects deterministic decoding)
    pub temperature: f32,

    /// Top-p (nucleus) sampling threshold
    pub top_p: f32,

    /// Padding token ID fed to finished sequences inside a live batch
    pub pad_token_id: Option<u32>,

    /// Beginning-of-sequence token ID
    pub bos_token_id: Option<u32>,

    /// End-of-sequence token IDs (some models configure several)
    #[serde(default)]
    pub eos_token_ids: Vec<u32>,

    /// First decoder token for encoder-decoder models
    pub decoder_start_token_id: Option<u32>,

    /// Whether to thread decoder cache state between steps
    pub use_cache: bool,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            min_new_tokens: 0,
            max_new_tokens: 16,
            temperature: 1.0,
            top_p: 1.0,
            pad_token_id: None,
            bos_token_id: None,
            eos_token_ids: Vec::new(),
            decoder_start_token_id: None,
            use_cache: true,
        }
    }
}

impl GenerationConfig {
    /// Overlay per-request sampling settings onto this per-call copy
    pub fn apply_request(&mut self, request: &CompletionRequest) {
        self.min_new_tokens = request.min_tokens;
        self.max_new_tokens = request.max_tokens;
        self.temperature = request.temperature;
        self.top_p = request.top_p;
    }

    /// Padding ID with the first end-of-sequence ID as fallback
    pub fn padding_id(&self) -> Option<u32> {
        self.pad_token_id
            .or_else(|| self.eos_token_ids.first().copied())
    }

    /// Whether the caller requested deterministic (arg-max) decoding
    pub fn is_deterministic(&self) -> bool {
        self.temperature <= 0.0 || self.top_p <= 0.0
    }
}

/// Reason why a candidate sequence stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    /// End-of-sequence token generated
    Stop,
    /// Reached the new-token cap
    Length,
}

impl FinishReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FinishReason::Stop => "stop",
            FinishReason::Length => "length",
        }
    }
}

/// Per-replica status after one decode step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceStatus {
    /// Still unfinished after this step
    Live,
    /// Produced an end-of-sequence token this step, or stopped earlier
    Stopped,
    /// Forced stop: the new-token cap was reached while still unfinished
    Exhausted,
}

impl SequenceStatus {
    /// Numeric status code: 1 = live, 0 = stopped, -1 = exhausted
    pub fn code(self) -> i8 {
        match self {
            SequenceStatus::Live => 1,
            SequenceStatus::Stopped => 0,
            SequenceStatus::Exhausted => -1,
        }
    }

    pub fn is_live(self) -> bool {
        matches!(self, SequenceStatus::Live)
    }
}

/// Result of one decode step for the whole batch.
///
/// All vectors are indexed by replica; `top_tokens`/`top_logprobs` are empty
/// unless diagnostics were requested.
#[derive(Debug, Clone)]
pub struct BatchStep {
    /// Chosen token ID per replica
    pub tokens: Vec<u32>,
    /// Log-probability of each chosen token
    pub token_logprobs: Vec<f64>,
    /// Most likely candidate token IDs per replica
    pub top_tokens: Vec<Vec<u32>>,
    /// Log-probabilities matching `top_tokens`
    pub top_logprobs: Vec<Vec<f64>>,
    /// Per-replica status after this step
    pub status: Vec<SequenceStatus>,
}

impl BatchStep {
    /// True once no replica is still live, which ends the stream
    pub fn all_finished(&self) -> bool {
        self.status.iter().all(|s| !s.is_live())
    }
}
