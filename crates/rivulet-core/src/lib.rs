//! Rivulet Core - Streaming Text Generation Engine
//!
//! This crate provides the core completion engine for the Rivulet system:
//! a batched autoregressive decoding loop that produces completion tokens
//! incrementally for one or more parallel candidate sequences, exposed as a
//! lazy pull-based stream of choices.

// Module declarations
pub mod choice;
pub mod decoder;
pub mod engine;
pub mod generation;
pub mod infer;
pub mod model;
pub mod tokenizer;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    /// Tokenizer operation errors
    #[error("Tokenizer error [{code}]: {message}\nContext: {context}\nSuggestion: {suggestion}")]
    Tokenizer {
        code: &'static str,
        message: String,
        context: String,
        suggestion: String,
    },

    /// Text generation and decoding-loop errors
    #[error("Generation error [{code}]: {message}\nContext: {context}\nSuggestion: {suggestion}")]
    Generation {
        code: &'static str,
        message: String,
        context: String,
        suggestion: String,
    },

    /// Input validation and parameter errors
    #[error("Invalid input [{code}]: {message}\nContext: {context}\nSuggestion: {suggestion}")]
    InvalidInput {
        code: &'static str,
        message: String,
        context: String,
        suggestion: String,
    },

    /// Model forward-pass errors that survived the retry policy
    #[error("Inference error [{code}]: {message} (after {attempts} attempts)\nContext: {context}\nSuggestion: {suggestion}")]
    Inference {
        code: &'static str,
        message: String,
        context: String,
        suggestion: String,
        attempts: usize,
    },

    /// Other unexpected errors
    #[error("Internal error [{code}]: {message}")]
    Internal {
        code: &'static str,
        message: String,
        #[source]
        source: Option<anyhow::Error>,
    },
}

pub type Result<T> = std::result::Result<T, CoreError>;

impl CoreError {
    /// Create a tokenizer error with context
    pub fn tokenizer<S1, S2, S3>(code: &'static str, message: S1, context: S2, suggestion: S3) -> Self
    where
        S1: Into<String>,
        S2: Into<String>,
        S3: Into<String>,
    {
        Self::Tokenizer {
            code,
            message: message.into(),
            context: context.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Create a generation error with context
    pub fn generation<S1, S2, S3>(code: &'static str, message: S1, context: S2, suggestion: S3) -> Self
    where
        S1: Into<String>,
        S2: Into<String>,
        S3: Into<String>,
    {
        Self::Generation {
            code,
            message: message.into(),
            context: context.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Create an invalid input error with context
    pub fn invalid_input<S1, S2, S3>(code: &'static str, message: S1, context: S2, suggestion: S3) -> Self
    where
        S1: Into<String>,
        S2: Into<String>,
        S3: Into<String>,
    {
        Self::InvalidInput {
            code,
            message: message.into(),
            context: context.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Create an inference error recording the exhausted retry budget
    pub fn inference<S1, S2, S3>(
        code: &'static str,
        message: S1,
        context: S2,
        suggestion: S3,
        attempts: usize,
    ) -> Self
    where
        S1: Into<String>,
        S2: Into<String>,
        S3: Into<String>,
    {
        Self::Inference {
            code,
            message: message.into(),
            context: context.into(),
            suggestion: suggestion.into(),
            attempts,
        }
    }

    /// Get the error code for programmatic handling
    pub fn code(&self) -> &'static str {
        match self {
            Self::Tokenizer { code, .. } => code,
            Self::Generation { code, .. } => code,
            Self::InvalidInput { code, .. } => code,
            Self::Inference { code, .. } => code,
            Self::Internal { code, .. } => code,
        }
    }
}

impl From<anyhow::Error> for CoreError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal {
            code: "INTERNAL_UNKNOWN",
            message: err.to_string(),
            source: Some(err),
        }
    }
}

/// Prelude module for common imports
pub mod prelude {
    pub use crate::{
        choice::{Choice, LogProbs},
        decoder::StreamDecoder,
        engine::{CompletionStream, StreamEngine},
        generation::{
            BatchStep, CompletionRequest, FinishReason, GenerationConfig, Prompt, SequenceStatus,
        },
        generation::generator::TokenGenerator,
        generation::logits::{LogitsProcessor, LogitsProcessorList},
        generation::sampler::Sampler,
        model::{CacheState, EncoderState, Model, ModelInputs, ModelOutput},
        tokenizer::Tokenizer,
        CoreError, Result,
    };
}

// Re-export key types at the crate root
pub use engine::StreamEngine;
pub use generation::{CompletionRequest, GenerationConfig};
pub use model::Model;
pub use tokenizer::Tokenizer;
