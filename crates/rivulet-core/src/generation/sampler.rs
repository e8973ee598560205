//! Token sampling and log-probability collection
//!
//! Converts a post-pipeline score vector into one chosen token plus optional
//! diagnostics: the chosen token's log-probability and the `k` most likely
//! alternatives. Deterministic mode picks the arg-max token; otherwise one
//! draw is taken from the categorical distribution.

use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::{CoreError, Result};

/// Epsilon added before the log so a zero probability never produces -inf.
const LOGPROB_EPSILON: f64 = 1e-7;

/// One sampled token with optional top-k diagnostics
#[derive(Debug, Clone)]
pub struct TokenChoice {
    /// Chosen token ID
    pub token: u32,
    /// Log-probability of the chosen token
    pub logprob: f64,
    /// Most likely candidate token IDs (empty unless diagnostics requested)
    pub top_tokens: Vec<u32>,
    /// Log-probabilities matching `top_tokens`
    pub top_logprobs: Vec<f64>,
}

/// Token sampler over post-pipeline score vectors
pub struct Sampler {
    rng: StdRng,
}

impl Default for Sampler {
    fn default() -> Self {
        Self::new()
    }
}

impl Sampler {
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    /// Create a sampler with a fixed seed for reproducible draws
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Choose one token from a score vector.
    ///
    /// `deterministic` selects the arg-max path; `top_k` requests that many
    /// most-likely alternatives (0 disables diagnostics).
    pub fn sample(&mut self, scores: &[f32], deterministic: bool, top_k: usize) -> Result<TokenChoice> {
        if scores.is_empty() {
            return Err(CoreError::generation(
                "EMPTY_LOGITS",
                "Cannot sample from empty logits",
                "Token sampling",
                "Check that the model forward pass produces valid logits",
            ));
        }

        let probs = softmax(scores);

        let token = if deterministic {
            argmax(&probs)
        } else {
            self.multinomial(&probs)?
        };

        let logprob = ln_prob(probs[token as usize]);

        let (top_tokens, top_logprobs) = if top_k > 0 {
            top_k_logprobs(&probs, top_k)
        } else {
            (Vec::new(), Vec::new())
        };

        Ok(TokenChoice {
            token,
            logprob,
            top_tokens,
            top_logprobs,
        })
    }

    /// Draw one sample from the categorical distribution
    fn multinomial(&mut self, probs: &[f32]) -> Result<u32> {
        let dist = WeightedIndex::new(probs).map_err(|e| {
            CoreError::generation(
                "INVALID_DISTRIBUTION",
                format!("Cannot sample from probability distribution: {e}"),
                "Categorical sampling",
                "Check that the logits pipeline leaves at least one finite score",
            )
        })?;
        Ok(dist.sample(&mut self.rng) as u32)
    }
}

/// Numerically stable softmax over a score vector.
///
/// Masked scores (negative infinity) map to zero probability. Falls back to
/// a uniform distribution if every exponential underflows.
pub fn softmax(scores: &[f32]) -> Vec<f32> {
    let max_score = scores.iter().fold(f32::NEG_INFINITY, |acc, &x| acc.max(x));
    let exp_scores: Vec<f32> = scores.iter().map(|&x| (x - max_score).exp()).collect();
    let sum_exp: f32 = exp_scores.iter().sum();

    if sum_exp > 0.0 {
        exp_scores.iter().map(|&x| x / sum_exp).collect()
    } else {
        vec![1.0 / scores.len() as f32; scores.len()]
    }
}

/// Index of the highest-probability token
fn argmax(probs: &[f32]) -> u32 {
    probs
        .iter()
        .enumerate()
        .max_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(idx, _)| idx as u32)
        .unwrap_or(0)
}

/// Log-probability with an epsilon guard against `ln(0)`
fn ln_prob(prob: f32) -> f64 {
    (prob as f64 + LOGPROB_EPSILON).ln()
}

/// The `k` highest probabilities as `(token IDs, log-probabilities)`
fn top_k_logprobs(probs: &[f32], k: usize) -> (Vec<u32>, Vec<f64>) {
    let mut indexed: Vec<(usize, f32)> = probs.iter().copied().enumerate().collect();
    indexed.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    indexed.truncate(k);

    let tokens = indexed.iter().map(|&(i, _)| i as u32).collect();
    let logprobs = indexed.iter().map(|&(_, p)| ln_prob(p)).collect();
    (tokens, logprobs)
}

/// Round a log-probability to 8 decimal digits for diagnostics output
pub fn round8(value: f64) -> f64 {
    (value * 1e8).round() / 1e8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_softmax_normalizes() {
        let probs = softmax(&[1.0, 2.0, 3.0]);
        let sum: f32 = probs.iter().sum();
        assert!((sum - 1.0).abs() < 1e-6);
        assert!(probs[2] > probs[1]);
        assert!(probs[1] > probs[0]);
    }

    #[test]
    fn test_softmax_zeroes_masked_scores() {
        let probs = softmax(&[0.0, f32::NEG_INFINITY, 0.0]);
        assert_eq!(probs[1], 0.0);
        assert!((probs[0] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_deterministic_picks_argmax() {
        let mut sampler = Sampler::with_seed(42);
        let choice = sampler.sample(&[0.1, 0.2, 5.0, 0.3], true, 0).unwrap();
        assert_eq!(choice.token, 2);
        assert!(choice.top_tokens.is_empty());
        assert!(choice.top_logprobs.is_empty());
    }

    #[test]
    fn test_logprob_matches_softmax_probability() {
        let mut sampler = Sampler::with_seed(42);
        let scores = [1.0, 2.0, 3.0];
        let probs = softmax(&scores);
        let choice = sampler.sample(&scores, true, 0).unwrap();
        let expected = (probs[2] as f64 + 1e-7).ln();
        assert!((choice.logprob - expected).abs() < 1e-12);
        assert!(choice.logprob <= 0.0);
    }

    #[test]
    fn test_multinomial_never_selects_masked_token() {
        let mut sampler = Sampler::with_seed(7);
        let scores = [0.0, f32::NEG_INFINITY, 0.0];
        for _ in 0..100 {
            let choice = sampler.sample(&scores, false, 0).unwrap();
            assert_ne!(choice.token, 1);
        }
    }

    #[test]
    fn test_top_k_ordering_and_size() {
        let mut sampler = Sampler::with_seed(42);
        let choice = sampler.sample(&[0.0, 3.0, 1.0, 2.0], true, 2).unwrap();

        assert_eq!(choice.top_tokens, vec![1, 3]);
        assert_eq!(choice.top_logprobs.len(), 2);
        assert!(choice.top_logprobs[0] > choice.top_logprobs[1]);
    }

    #[test]
    fn test_top_k_larger_than_vocab() {
        let mut sampler = Sampler::with_seed(42);
        let choice = sampler.sample(&[0.0, 1.0], true, 10).unwrap();
        assert_eq!(choice.top_tokens.len(), 2);
    }

    #[test]
    fn test_seeded_sampling_reproducible() {
        let scores = [1.0, 1.0, 1.0, 1.0, 1.0];

        let mut a = Sampler::with_seed(12345);
        let mut b = Sampler::with_seed(12345);

        for _ in 0..20 {
            let ta = a.sample(&scores, false, 0).unwrap().token;
            let tb = b.sample(&scores, false, 0).unwrap().token;
            assert_eq!(ta, tb);
        }
    }

    #[test]
    fn test_empty_scores_rejected() {
        let mut sampler = Sampler::with_seed(42);
        let err = sampler.sample(&[], true, 0).unwrap_err();
        assert_eq!(err.code(), "EMPTY_LOGITS");
    }

    #[test]
    fn test_round8() {
        assert_eq!(round8(-0.123456789), -0.12345679);
        assert_eq!(round8(0.0), 0.0);
    }
}
