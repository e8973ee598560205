//! Response units emitted by the completion stream

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::generation::FinishReason;

/// Log-probability diagnostics for one emitted token.
///
/// `top_logprobs` always carries the chosen token's own pair, so the
/// selected token is present even when it falls outside the top-k window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogProbs {
    /// Decoded text of the chosen token
    pub token: String,
    /// Log-probability of the chosen token
    pub token_logprob: f64,
    /// Alternative tokens (decoded) mapped to their log-probabilities
    pub top_logprobs: BTreeMap<String, f64>,
}

/// One streamed completion fragment for one replica
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Choice {
    /// Newly stable text fragment
    pub text: String,
    /// Replica index this fragment belongs to
    pub index: usize,
    /// Byte offset of the fragment within the replica's accumulated text
    pub text_offset: usize,
    /// Diagnostics, present only when requested
    pub logprobs: Option<LogProbs>,
    /// Set on the choice that finishes the replica, absent before
    pub finish_reason: Option<FinishReason>,
}

impl Choice {
    pub fn new(text: impl Into<String>, index: usize, text_offset: usize) -> Self {
        Self {
            text: text.into(),
            index,
            text_offset,
            logprobs: None,
            finish_reason: None,
        }
    }

    pub fn with_finish_reason(mut self, reason: FinishReason) -> Self {
        self.finish_reason = Some(reason);
        self
    }

    pub fn with_logprobs(mut self, logprobs: LogProbs) -> Self {
        self.logprobs = Some(logprobs);
        self
    }
}
