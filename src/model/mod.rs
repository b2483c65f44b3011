//! Model implementations.
//!
//! This module contains:
//! - The [`LanguageModel`] and [`SequenceClassifier`] seams the decoder drives
//! - Model loading from HuggingFace
//! - A Qwen3 backbone with a causal LM head and a classification head

pub mod classifier;
pub mod loader;
pub mod qwen3;

use candle_core::{Device, Result, Tensor};

pub use classifier::FudgeClassifier;
pub use loader::{best_device, download_model, load_config, load_safetensors, ModelFiles, Qwen3Config};
pub use qwen3::{Qwen3ForCausalLM, Qwen3Model};

/// An autoregressive model producing next-token logits.
pub trait LanguageModel {
    /// Logits for the position after the last input token.
    ///
    /// `input_ids` is `[1, seq_len]`; the result is `[1, vocab_size]` or
    /// `[vocab_size]`.
    fn forward_last(&mut self, input_ids: &Tensor) -> Result<Tensor>;

    /// Device the model's weights live on.
    fn device(&self) -> &Device;
}

/// A classifier scoring whole token sequences.
pub trait SequenceClassifier {
    /// Per-class logits for each row of `input_ids`.
    ///
    /// `input_ids` is `[batch, seq_len]`; the result is `[batch, num_labels]`.
    fn class_logits(&mut self, input_ids: &Tensor) -> Result<Tensor>;

    /// Number of output classes.
    fn num_labels(&self) -> usize;
}
