//! nano-fudge: classifier-guided text generation in Rust.
//!
//! This crate implements FUDGE-style controlled decoding on top of candle:
//! - A base causal LM proposes a next-token distribution
//! - An auxiliary classifier scores each candidate continuation for a target class
//! - The two signals are mixed and sampled, one token at a time

pub mod checkpoint;
pub mod config;
pub mod error;
pub mod labels;
pub mod tokenizer;

pub mod engine;
pub mod model;

pub use checkpoint::FudgeCheckpoint;
pub use config::GuidanceConfig;
pub use engine::{
    DistributionBuilder, FilterParams, FinishReason, FudgeDecoder, GuidedOutput, WeightedSampler,
};
pub use error::{Error, Result};
pub use labels::{LabelMapping, TargetClass};
pub use model::{
    best_device, download_model, load_config, load_safetensors, FudgeClassifier, LanguageModel,
    ModelFiles, Qwen3Config, Qwen3ForCausalLM, SequenceClassifier,
};
pub use tokenizer::{HfTokenizer, TextTokenizer};
