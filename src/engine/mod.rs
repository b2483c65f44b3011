//! Guided decoding engine.
//!
//! This module contains:
//! - DistributionBuilder for filtered next-token distributions
//! - FudgeDecoder for the classifier-guided decoding loop
//! - WeightedSampler for drawing tokens from fused weights

pub mod distribution;
pub mod fudge;
pub mod sampler;

pub use distribution::{DistributionBuilder, FilterParams};
pub use fudge::{Candidate, FinishReason, FudgeDecoder, GuidedOutput, ON_TRACK_CHANNEL};
pub use sampler::WeightedSampler;
