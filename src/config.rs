//! Configuration types for nano-fudge.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Options for one guided generation call.
///
/// Defaults match the reference FUDGE decoder: 50 new tokens, unit
/// temperatures, a 200-token candidate pool, a final top-50 truncation and
/// an even mix of base and auxiliary probabilities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuidanceConfig {
    /// Maximum number of new tokens.
    pub max_length: usize,
    /// Temperature applied to base-model logits.
    pub temperature: f32,
    /// Temperature applied to auxiliary scores before their softmax.
    pub fudge_temperature: f32,
    /// Final truncation width over the fused weights (None = disabled).
    pub base_top_k: Option<usize>,
    /// Nucleus filter applied before candidate selection (None = disabled).
    pub base_top_p: Option<f32>,
    /// Number of candidates scored by the auxiliary classifier each step.
    pub fudge_top_k: usize,
    /// Mix between base (0.0) and auxiliary (1.0) probabilities.
    pub lambda_weight: f32,
    /// Seed for the sampler (None = seeded from entropy).
    pub seed: Option<u64>,
    /// Maximum candidates per batched classifier forward pass.
    pub scoring_batch_size: usize,
}

impl Default for GuidanceConfig {
    fn default() -> Self {
        Self {
            max_length: 50,
            temperature: 1.0,
            fudge_temperature: 1.0,
            base_top_k: Some(50),
            base_top_p: None,
            fudge_top_k: 200,
            lambda_weight: 0.5,
            seed: None,
            scoring_batch_size: 64,
        }
    }
}

impl GuidanceConfig {
    /// Reads a config from a JSON file. Missing fields take their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Set the maximum number of new tokens.
    pub fn max_length(mut self, max_length: usize) -> Self {
        self.max_length = max_length;
        self
    }

    /// Set the base-model temperature.
    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Set the auxiliary-score temperature.
    pub fn fudge_temperature(mut self, fudge_temperature: f32) -> Self {
        self.fudge_temperature = fudge_temperature;
        self
    }

    /// Set the final truncation width.
    pub fn base_top_k(mut self, base_top_k: Option<usize>) -> Self {
        self.base_top_k = base_top_k;
        self
    }

    /// Set the nucleus threshold.
    pub fn base_top_p(mut self, base_top_p: Option<f32>) -> Self {
        self.base_top_p = base_top_p;
        self
    }

    /// Set the candidate pool size.
    pub fn fudge_top_k(mut self, fudge_top_k: usize) -> Self {
        self.fudge_top_k = fudge_top_k;
        self
    }

    /// Set the fusion weight.
    pub fn lambda_weight(mut self, lambda_weight: f32) -> Self {
        self.lambda_weight = lambda_weight;
        self
    }

    /// Seed the sampler.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Set the classifier batch size.
    pub fn scoring_batch_size(mut self, scoring_batch_size: usize) -> Self {
        self.scoring_batch_size = scoring_batch_size;
        self
    }

    /// Checks every option against its valid range.
    pub fn validate(&self) -> Result<()> {
        if self.max_length == 0 {
            return Err(Error::InvalidParameter(
                "max_length must be a positive integer".to_string(),
            ));
        }
        if !(self.temperature.is_finite() && self.temperature > 0.0) {
            return Err(Error::InvalidTemperature(self.temperature));
        }
        if !(self.fudge_temperature.is_finite() && self.fudge_temperature > 0.0) {
            return Err(Error::InvalidTemperature(self.fudge_temperature));
        }
        if self.base_top_k == Some(0) {
            return Err(Error::InvalidParameter(
                "base_top_k must be a positive integer".to_string(),
            ));
        }
        if let Some(p) = self.base_top_p {
            if !(p > 0.0 && p <= 1.0) {
                return Err(Error::InvalidParameter(format!(
                    "base_top_p must be in (0, 1], got {p}"
                )));
            }
        }
        if self.fudge_top_k == 0 {
            return Err(Error::InvalidParameter(
                "fudge_top_k must be a positive integer".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.lambda_weight) {
            return Err(Error::InvalidParameter(format!(
                "lambda_weight must be in [0, 1], got {}",
                self.lambda_weight
            )));
        }
        if self.scoring_batch_size == 0 {
            return Err(Error::InvalidParameter(
                "scoring_batch_size must be a positive integer".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = GuidanceConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.base_top_k, Some(50));
        assert_eq!(config.base_top_p, None);
    }

    #[test]
    fn test_rejects_non_positive_temperature() {
        let config = GuidanceConfig::default().temperature(0.0);
        assert!(matches!(config.validate(), Err(Error::InvalidTemperature(_))));

        let config = GuidanceConfig::default().fudge_temperature(-1.0);
        assert!(matches!(config.validate(), Err(Error::InvalidTemperature(_))));

        let config = GuidanceConfig::default().temperature(f32::NAN);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_out_of_range_options() {
        assert!(GuidanceConfig::default().lambda_weight(1.5).validate().is_err());
        assert!(GuidanceConfig::default().base_top_p(Some(0.0)).validate().is_err());
        assert!(GuidanceConfig::default().base_top_p(Some(1.0)).validate().is_ok());
        assert!(GuidanceConfig::default().base_top_k(Some(0)).validate().is_err());
        assert!(GuidanceConfig::default().fudge_top_k(0).validate().is_err());
        assert!(GuidanceConfig::default().max_length(0).validate().is_err());
    }
}
