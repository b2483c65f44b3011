//! FUDGE guided decoder.
//!
//! Steers a base language model toward a target class using an auxiliary
//! classifier that scores hypothetical one-token continuations.
//!
//! ## Decoding Step
//!
//! ```text
//! tokens so far
//!     │
//!     ▼ DistributionBuilder (temperature, top-p, NO top-k)
//! base distribution [vocab]
//!     │
//!     ▼ top fudge_top_k by probability
//! candidates (token, base_prob)
//!     │
//!     ▼ classifier on tokens + [candidate], channel 1   (batched)
//! auxiliary scores
//!     │
//!     ▼ softmax(scores / fudge_temperature)
//! auxiliary probs
//!     │
//!     ▼ (1 - λ) · base_prob + λ · aux_prob
//! fused weights, scattered into a zero [vocab] vector
//!     │
//!     ▼ top base_top_k (optional), no renormalization
//!     │
//!     ▼ weighted draw → append → stop on EOS or max_length
//! ```
//!
//! Base probabilities are taken from the full-vocabulary distribution and are
//! not renormalized over the candidates, while auxiliary probabilities are
//! normalized within the candidate set. This asymmetry keeps the base model's
//! absolute confidence in the mix.

use std::collections::BTreeMap;
use std::path::Path;

use candle_core::{DType, Device, Tensor};
use tracing::{debug, info, warn};

use super::distribution::{finite_max, softmax, top_k_indices, DistributionBuilder, FilterParams};
use super::sampler::WeightedSampler;
use crate::checkpoint::FudgeCheckpoint;
use crate::config::GuidanceConfig;
use crate::error::{Error, Result};
use crate::labels::{LabelMapping, TargetClass};
use crate::model::loader::best_device;
use crate::model::{FudgeClassifier, LanguageModel, SequenceClassifier};
use crate::tokenizer::TextTokenizer;

/// Classifier output channel meaning "this continuation is on track for the
/// target class".
pub const ON_TRACK_CHANNEL: usize = 1;

/// A next-token option considered for auxiliary scoring.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    /// Token id.
    pub token_id: u32,
    /// Probability in the (unrenormalized) base distribution.
    pub base_prob: f32,
}

/// Why generation stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    /// `max_length` new tokens were produced.
    MaxLength,
    /// The end-of-sequence token was sampled.
    EndOfSequence,
}

/// Full result of a guided generation call.
#[derive(Debug, Clone)]
pub struct GuidedOutput {
    /// Decoded prompt + continuation, special tokens stripped.
    pub text: String,
    /// Prompt ids followed by generated ids.
    pub token_ids: Vec<u32>,
    /// Number of prompt tokens at the front of `token_ids`.
    pub prompt_len: usize,
    /// Reason for finishing.
    pub finish_reason: FinishReason,
}

impl GuidedOutput {
    /// Generated ids only.
    pub fn generated_ids(&self) -> &[u32] {
        &self.token_ids[self.prompt_len..]
    }
}

/// Guided decoder bound to one base model, classifier, tokenizer and target
/// class.
pub struct FudgeDecoder<M, C, T> {
    builder: DistributionBuilder<M>,
    classifier: C,
    tokenizer: T,
    labels: LabelMapping,
    target_class: usize,
}

impl<M, T> FudgeDecoder<M, FudgeClassifier, T>
where
    M: LanguageModel,
    T: TextTokenizer,
{
    /// Loads the classifier checkpoint and resolves the target class.
    ///
    /// `device` defaults to the best available device.
    pub fn from_checkpoint(
        model: M,
        tokenizer: T,
        checkpoint_path: impl AsRef<Path>,
        target: impl Into<TargetClass>,
        device: Option<Device>,
    ) -> Result<Self> {
        let device = match device {
            Some(device) => device,
            None => best_device()?,
        };
        let checkpoint_path = checkpoint_path.as_ref();
        let checkpoint = FudgeCheckpoint::load(checkpoint_path, &device)?;
        info!(
            path = %checkpoint_path.display(),
            base_model = %checkpoint.base_model_name,
            num_labels = checkpoint.num_labels,
            "loaded classifier checkpoint"
        );

        // Validate labels and target before paying for the classifier build.
        let labels = checkpoint.labels()?;
        let target = target.into();
        labels.resolve(&target)?;

        let classifier = checkpoint.build_classifier(DType::F32, &device)?;
        Self::new(model, classifier, tokenizer, labels, target)
    }
}

impl<M, C, T> FudgeDecoder<M, C, T>
where
    M: LanguageModel,
    C: SequenceClassifier,
    T: TextTokenizer,
{
    /// Assembles a decoder from already-loaded parts.
    pub fn new(
        model: M,
        classifier: C,
        tokenizer: T,
        labels: LabelMapping,
        target: impl Into<TargetClass>,
    ) -> Result<Self> {
        let target_class = labels.resolve(&target.into())?;
        if classifier.num_labels() <= ON_TRACK_CHANNEL {
            return Err(Error::ModelLoad(format!(
                "classifier has {} outputs, needs at least {}",
                classifier.num_labels(),
                ON_TRACK_CHANNEL + 1
            )));
        }
        info!(
            target_class,
            target_name = labels.name_of(target_class).unwrap_or_default(),
            device = ?model.device(),
            "guided decoder ready"
        );

        Ok(Self {
            builder: DistributionBuilder::new(model),
            classifier,
            tokenizer,
            labels,
            target_class,
        })
    }

    /// Index of the resolved target class.
    pub fn target_class(&self) -> usize {
        self.target_class
    }

    /// Name of the resolved target class.
    pub fn target_class_name(&self) -> &str {
        self.labels
            .name_of(self.target_class)
            .unwrap_or_default()
    }

    /// All class names and their indices.
    pub fn available_classes(&self) -> &BTreeMap<String, usize> {
        self.labels.as_map()
    }

    /// The label mapping.
    pub fn labels(&self) -> &LabelMapping {
        &self.labels
    }

    /// Generates text from `prompt`; returns prompt + continuation.
    pub fn generate(&mut self, prompt: &str, config: &GuidanceConfig) -> Result<String> {
        Ok(self.generate_with_details(prompt, config)?.text)
    }

    /// Generates text and reports token ids and the finish reason.
    pub fn generate_with_details(
        &mut self,
        prompt: &str,
        config: &GuidanceConfig,
    ) -> Result<GuidedOutput> {
        config.validate()?;
        let prompt_ids = self.tokenizer.encode(prompt)?;
        let prompt_len = prompt_ids.len();
        info!(
            prompt_tokens = prompt_len,
            max_length = config.max_length,
            lambda = config.lambda_weight,
            target_name = self.target_class_name(),
            "starting guided generation"
        );

        let (token_ids, finish_reason) = self.generate_ids(prompt_ids, config)?;
        let text = self.tokenizer.decode(&token_ids)?;
        info!(
            generated = token_ids.len() - prompt_len,
            ?finish_reason,
            "guided generation finished"
        );

        Ok(GuidedOutput {
            text,
            token_ids,
            prompt_len,
            finish_reason,
        })
    }

    /// Runs the decoding loop on token ids directly.
    pub fn generate_ids(
        &mut self,
        mut tokens: Vec<u32>,
        config: &GuidanceConfig,
    ) -> Result<(Vec<u32>, FinishReason)> {
        config.validate()?;
        if tokens.is_empty() {
            return Err(Error::EmptySequence);
        }
        let eos = self.tokenizer.eos_token_id();
        let mut sampler = WeightedSampler::from_seed_option(config.seed);

        for step in 0..config.max_length {
            let next = self.step(&tokens, config, &mut sampler)?;
            tokens.push(next);
            debug!(step, token = next, "sampled token");

            if Some(next) == eos {
                return Ok((tokens, FinishReason::EndOfSequence));
            }
        }
        Ok((tokens, FinishReason::MaxLength))
    }

    /// One decoding step: returns the sampled token.
    fn step(
        &mut self,
        tokens: &[u32],
        config: &GuidanceConfig,
        sampler: &mut WeightedSampler,
    ) -> Result<u32> {
        let weights = self.fused_weights(tokens, config)?;
        sampler.sample(&weights)
    }

    /// Fused, truncated sampling weights over the full vocabulary for the
    /// position after `tokens`.
    pub fn fused_weights(&mut self, tokens: &[u32], config: &GuidanceConfig) -> Result<Vec<f32>> {
        // top-k is deferred to after fusion.
        let base = self.builder.next_token_distribution(
            tokens,
            &FilterParams {
                temperature: config.temperature,
                top_k: None,
                top_p: config.base_top_p,
            },
        )?;

        let candidates = select_candidates(&base, config.fudge_top_k);
        let scores = self.score_candidates(tokens, &candidates, config.scoring_batch_size)?;
        let fused = fuse_candidates(
            &candidates,
            &scores,
            config.fudge_temperature,
            config.lambda_weight,
        );
        debug!(candidates = candidates.len(), "fused candidate weights");

        let mut weights = scatter(base.len(), &candidates, &fused);
        if let Some(k) = config.base_top_k {
            truncate_top_k(&mut weights, k);
        }
        Ok(weights)
    }

    /// On-track classifier score for `tokens + [candidate]`, per candidate.
    ///
    /// Candidates are scored in batches of at most `batch_size` rows; results
    /// are identical to scoring one candidate at a time.
    pub fn score_candidates(
        &mut self,
        tokens: &[u32],
        candidates: &[Candidate],
        batch_size: usize,
    ) -> Result<Vec<f32>> {
        let device = self.builder.device().clone();
        let row_len = tokens.len() + 1;
        let mut scores = Vec::with_capacity(candidates.len());

        for chunk in candidates.chunks(batch_size.max(1)) {
            let mut ids = Vec::with_capacity(chunk.len() * row_len);
            for candidate in chunk {
                ids.extend_from_slice(tokens);
                ids.push(candidate.token_id);
            }
            let input_ids = Tensor::from_vec(ids, (chunk.len(), row_len), &device)?;
            let logits = self
                .classifier
                .class_logits(&input_ids)?
                .to_dtype(DType::F32)?
                .to_vec2::<f32>()?;

            if logits.len() != chunk.len() {
                return Err(Error::Tensor(candle_core::Error::Msg(format!(
                    "classifier returned {} rows for {} candidates",
                    logits.len(),
                    chunk.len()
                ))));
            }
            for row in logits {
                let score = row.get(ON_TRACK_CHANNEL).copied().ok_or_else(|| {
                    Error::Tensor(candle_core::Error::Msg(format!(
                        "classifier row has {} outputs, expected > {ON_TRACK_CHANNEL}",
                        row.len()
                    )))
                })?;
                scores.push(score);
            }
        }
        Ok(scores)
    }
}

/// The `min(k, vocab)` most probable tokens, most probable first.
pub fn select_candidates(distribution: &[f32], k: usize) -> Vec<Candidate> {
    top_k_indices(distribution, k)
        .into_iter()
        .map(|i| Candidate {
            token_id: i as u32,
            base_prob: distribution[i],
        })
        .collect()
}

/// Softmax of auxiliary scores scaled by `temperature`.
///
/// Scores are shifted by their finite maximum before scaling, so small
/// temperatures sharpen toward the best candidate instead of overflowing.
/// Non-finite scores get zero probability. Returns `None` when no score is
/// finite.
pub fn auxiliary_distribution(scores: &[f32], temperature: f32) -> Option<Vec<f32>> {
    let max = finite_max(scores)?;
    let scaled: Vec<f32> = scores
        .iter()
        .map(|&s| {
            if s.is_finite() {
                (s - max) / temperature
            } else {
                f32::NEG_INFINITY
            }
        })
        .collect();
    Some(softmax(&scaled))
}

/// Convex mix of base and auxiliary probabilities per candidate.
///
/// Falls back to pure base probabilities when every auxiliary score is
/// non-finite.
pub fn fuse_candidates(
    candidates: &[Candidate],
    scores: &[f32],
    fudge_temperature: f32,
    lambda_weight: f32,
) -> Vec<f32> {
    match auxiliary_distribution(scores, fudge_temperature) {
        Some(aux) => candidates
            .iter()
            .zip(aux)
            .map(|(c, q)| (1.0 - lambda_weight) * c.base_prob + lambda_weight * q)
            .collect(),
        None => {
            warn!(
                candidates = candidates.len(),
                "all auxiliary scores are non-finite; using base probabilities"
            );
            candidates.iter().map(|c| c.base_prob).collect()
        }
    }
}

/// Dense `[vocab_size]` weights: fused values at candidate ids, zero elsewhere.
pub fn scatter(vocab_size: usize, candidates: &[Candidate], fused: &[f32]) -> Vec<f32> {
    let mut weights = vec![0.0f32; vocab_size];
    for (candidate, &w) in candidates.iter().zip(fused) {
        weights[candidate.token_id as usize] = w;
    }
    weights
}

/// Zeroes every weight outside the top `k` without renormalizing.
pub fn truncate_top_k(weights: &mut [f32], k: usize) {
    if k >= weights.len() {
        return;
    }
    let mut keep = vec![false; weights.len()];
    for i in top_k_indices(weights, k) {
        keep[i] = true;
    }
    for (w, keep) in weights.iter_mut().zip(keep) {
        if !keep {
            *w = 0.0;
        }
    }
}
