//! Logits processing pipeline applied before sampling
//!
//! Each processor is a deterministic transform over the raw next-token score
//! vector. The pipeline is rebuilt per call from the generation config and
//! applied in a fixed order: min-new-tokens enforcement, temperature scaling,
//! then nucleus filtering.

use crate::generation::GenerationConfig;

/// A single transform over the next-token score vector.
///
/// `history` is the replica's full token sequence so far (prompt included);
/// processors must be deterministic and carry no state beyond their
/// construction parameters.
pub trait LogitsProcessor: Send + Sync {
    fn process(&self, history: &[u32], scores: &mut [f32]);
}

/// Forces end-of-sequence scores to negative infinity until the sequence has
/// grown by at least `min_new_tokens` beyond the prompt.
pub struct MinNewTokensProcessor {
    prompt_len: usize,
    min_new_tokens: usize,
    eos_token_ids: Vec<u32>,
}

impl MinNewTokensProcessor {
    pub fn new(prompt_len: usize, min_new_tokens: usize, eos_token_ids: Vec<u32>) -> Self {
        Self {
            prompt_len,
            min_new_tokens,
            eos_token_ids,
        }
    }
}

impl LogitsProcessor for MinNewTokensProcessor {
    fn process(&self, history: &[u32], scores: &mut [f32]) {
        let new_tokens = history.len().saturating_sub(self.prompt_len);
        if new_tokens < self.min_new_tokens {
            for &eos in &self.eos_token_ids {
                if let Some(score) = scores.get_mut(eos as usize) {
                    *score = f32::NEG_INFINITY;
                }
            }
        }
    }
}

/// Divides every score by the temperature (lower = sharper distribution).
pub struct TemperatureWarper {
    temperature: f32,
}

impl TemperatureWarper {
    pub fn new(temperature: f32) -> Self {
        Self { temperature }
    }
}

impl LogitsProcessor for TemperatureWarper {
    fn process(&self, _history: &[u32], scores: &mut [f32]) {
        for score in scores.iter_mut() {
            *score /= self.temperature;
        }
    }
}

/// Nucleus (top-p) filtering: keeps the smallest set of highest-probability
/// tokens whose cumulative mass reaches `top_p`, masking the rest.
pub struct TopPWarper {
    top_p: f32,
}

impl TopPWarper {
    pub fn new(top_p: f32) -> Self {
        Self { top_p }
    }
}

impl LogitsProcessor for TopPWarper {
    fn process(&self, _history: &[u32], scores: &mut [f32]) {
        let mut sorted_indices: Vec<usize> = (0..scores.len()).collect();
        sorted_indices.sort_by(|&a, &b| {
            scores[b]
                .partial_cmp(&scores[a])
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let sorted_scores: Vec<f32> = sorted_indices.iter().map(|&i| scores[i]).collect();
        let sorted_probs = super::sampler::softmax(&sorted_scores);

        // The token that crosses the threshold stays in, so at least one
        // token always survives the filter.
        let mut cumulative = 0.0;
        let mut cutoff = sorted_probs.len();
        for (i, &prob) in sorted_probs.iter().enumerate() {
            cumulative += prob;
            if cumulative >= self.top_p {
                cutoff = i + 1;
                break;
            }
        }

        for &idx in sorted_indices.iter().skip(cutoff) {
            scores[idx] = f32::NEG_INFINITY;
        }
    }
}

/// An ordered pipeline of logits processors.
pub struct LogitsProcessorList {
    processors: Vec<Box<dyn LogitsProcessor>>,
}

impl LogitsProcessorList {
    /// Build the pipeline for one call.
    ///
    /// Mirrors the activation rules of each stage: min-new-tokens needs a
    /// configured end-of-sequence ID, temperature scaling is skipped for the
    /// neutral value 1.0 and for the deterministic sentinel (<= 0), and the
    /// nucleus filter is active only for `0 < top_p < 1` (1.0 exactly
    /// disables it).
    pub fn from_config(config: &GenerationConfig, prompt_len: usize) -> Self {
        let mut processors: Vec<Box<dyn LogitsProcessor>> = Vec::new();

        if config.min_new_tokens > 0 && !config.eos_token_ids.is_empty() {
            processors.push(Box::new(MinNewTokensProcessor::new(
                prompt_len,
                config.min_new_tokens,
                config.eos_token_ids.clone(),
            )));
        }

        if config.temperature > 0.0 && config.temperature != 1.0 {
            processors.push(Box::new(TemperatureWarper::new(config.temperature)));
        }

        if config.top_p > 0.0 && config.top_p < 1.0 {
            processors.push(Box::new(TopPWarper::new(config.top_p)));
        }

        Self { processors }
    }

    /// Apply every processor in order
    pub fn process(&self, history: &[u32], scores: &mut [f32]) {
        for processor in &self.processors {
            processor.process(history, scores);
        }
    }

    pub fn len(&self) -> usize {
        self.processors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_min_new_tokens_masks_eos_below_floor() {
        let processor = MinNewTokensProcessor::new(2, 2, vec![1, 3]);

        // Prompt length 2, one new token generated: still below the floor.
        let history = vec![7, 8, 5];
        let mut scores = vec![0.5, 0.9, 0.1, 0.7];
        processor.process(&history, &mut scores);
        assert_eq!(scores[1], f32::NEG_INFINITY);
        assert_eq!(scores[3], f32::NEG_INFINITY);
        assert_eq!(scores[0], 0.5);
    }

    #[test]
    fn test_min_new_tokens_releases_at_floor() {
        let processor = MinNewTokensProcessor::new(2, 2, vec![1]);

        let history = vec![7, 8, 5, 6];
        let mut scores = vec![0.5, 0.9, 0.1];
        processor.process(&history, &mut scores);
        assert_eq!(scores, vec![0.5, 0.9, 0.1]);
    }

    #[test]
    fn test_min_new_tokens_ignores_out_of_vocab_eos() {
        let processor = MinNewTokensProcessor::new(0, 1, vec![100]);
        let mut scores = vec![0.5, 0.9];
        processor.process(&[], &mut scores);
        assert_eq!(scores, vec![0.5, 0.9]);
    }

    #[test]
    fn test_temperature_scales_scores() {
        let warper = TemperatureWarper::new(0.5);
        let mut scores = vec![1.0, -2.0, 0.0];
        warper.process(&[], &mut scores);
        assert_eq!(scores, vec![2.0, -4.0, 0.0]);
    }

    #[test]
    fn test_top_p_masks_tail() {
        let warper = TopPWarper::new(0.5);
        // One dominant token holds essentially all probability mass.
        let mut scores = vec![0.0, 10.0, 0.0, 0.0];
        warper.process(&[], &mut scores);

        assert_eq!(scores[1], 10.0);
        assert_eq!(scores[0], f32::NEG_INFINITY);
        assert_eq!(scores[2], f32::NEG_INFINITY);
        assert_eq!(scores[3], f32::NEG_INFINITY);
    }

    #[test]
    fn test_top_p_keeps_prefix_reaching_mass() {
        let warper = TopPWarper::new(0.99);
        // Two equal dominant tokens split the mass; both must survive.
        let mut scores = vec![10.0, 10.0, -10.0, -10.0];
        warper.process(&[], &mut scores);

        assert_eq!(scores[0], 10.0);
        assert_eq!(scores[1], 10.0);
        assert_eq!(scores[2], f32::NEG_INFINITY);
        assert_eq!(scores[3], f32::NEG_INFINITY);
    }

    #[test]
    fn test_from_config_stage_activation() {
        // All stages active.
        let config = GenerationConfig {
            min_new_tokens: 2,
            temperature: 0.7,
            top_p: 0.9,
            eos_token_ids: vec![2],
            ..Default::default()
        };
        assert_eq!(LogitsProcessorList::from_config(&config, 1).len(), 3);

        // top_p == 1.0 exactly disables the nucleus filter.
        let config = GenerationConfig {
            temperature: 0.7,
            top_p: 1.0,
            ..Default::default()
        };
        assert_eq!(LogitsProcessorList::from_config(&config, 1).len(), 1);

        // Deterministic sentinels build an empty pipeline.
        let config = GenerationConfig {
            temperature: 0.0,
            top_p: 0.0,
            ..Default::default()
        };
        assert!(LogitsProcessorList::from_config(&config, 1).is_empty());

        // min-new-tokens requires a configured eos ID.
        let config = GenerationConfig {
            min_new_tokens: 2,
            temperature: 1.0,
            top_p: 1.0,
            eos_token_ids: vec![],
            ..Default::default()
        };
        assert!(LogitsProcessorList::from_config(&config, 1).is_empty());
    }
}
