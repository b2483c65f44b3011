//! Error types for nano-fudge.

use thiserror::Error;

/// Result type alias for nano-fudge operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for nano-fudge.
#[derive(Error, Debug)]
pub enum Error {
    /// Target class name is not present in the label mapping.
    #[error("unknown class name: {name}. Available classes: {available:?}")]
    UnknownClass {
        name: String,
        available: Vec<String>,
    },

    /// Target class index is outside `0..num_classes`.
    #[error("target class index {index} out of range: must be between 0 and {}", .num_classes.saturating_sub(1))]
    ClassIndexOutOfRange { index: usize, num_classes: usize },

    /// Temperature must be finite and strictly positive.
    #[error("temperature must be strictly positive, got {0}")]
    InvalidTemperature(f32),

    /// A generation option is outside its valid range.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// The token sequence handed to the base model is empty.
    #[error("token sequence is empty")]
    EmptySequence,

    /// Sampling weights carry no usable mass.
    #[error("degenerate distribution: {0}")]
    DegenerateDistribution(String),

    /// Label mapping is not a bijection onto `0..num_labels`.
    #[error("invalid label mapping: {0}")]
    InvalidLabelMapping(String),

    /// Checkpoint is missing fields or malformed.
    #[error("checkpoint error: {0}")]
    Checkpoint(String),

    /// Model loading failed.
    #[error("failed to load model: {0}")]
    ModelLoad(String),

    /// Tokenization error.
    #[error("tokenization error: {0}")]
    Tokenization(String),

    /// Tensor operation error.
    #[error("tensor error: {0}")]
    Tensor(#[from] candle_core::Error),

    /// SafeTensors (de)serialization error.
    #[error("safetensors error: {0}")]
    Safetensors(#[from] safetensors::SafeTensorError),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}
