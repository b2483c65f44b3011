//! Auxiliary "future outcome" classifier.
//!
//! A Qwen3 backbone topped with a linear head over `num_labels` classes,
//! read at the final position. Given a prefix, it predicts whether the
//! eventual sequence will belong to the target attribute; the decoder
//! consumes only the on-track channel (index 1) of its output.

use candle_core::{Device, Module, Result, Tensor};
use candle_nn::{linear_no_bias, Linear, VarBuilder};

use super::loader::Qwen3Config;
use super::qwen3::Qwen3Model;
use super::SequenceClassifier;

/// Qwen3 sequence classifier scoring partial continuations.
#[derive(Debug, Clone)]
pub struct FudgeClassifier {
    model: Qwen3Model,
    score: Linear,
    num_labels: usize,
}

impl FudgeClassifier {
    /// Builds the classifier. Weights are read from `model.*` and `score.weight`.
    pub fn new(config: &Qwen3Config, num_labels: usize, vb: VarBuilder) -> Result<Self> {
        let model = Qwen3Model::new(config, vb.pp("model"))?;
        let score = linear_no_bias(config.hidden_size, num_labels, vb.pp("score"))?;
        Ok(Self {
            model,
            score,
            num_labels,
        })
    }

    /// Class logits `[batch, num_labels]` for `[batch, seq_len]` ids.
    pub fn forward(&self, input_ids: &Tensor) -> Result<Tensor> {
        let hidden = self.model.forward(input_ids)?;
        let seq_len = hidden.dim(1)?;
        let last = hidden.narrow(1, seq_len - 1, 1)?.squeeze(1)?;
        self.score.forward(&last)
    }

    /// Returns the device.
    pub fn device(&self) -> &Device {
        self.model.device()
    }
}

impl SequenceClassifier for FudgeClassifier {
    fn class_logits(&mut self, input_ids: &Tensor) -> Result<Tensor> {
        self.forward(input_ids)
    }

    fn num_labels(&self) -> usize {
        self.num_labels
    }
}
