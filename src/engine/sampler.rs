//! Weighted token sampling.
//!
//! The fused FUDGE weights are not re-softmaxed, so the sampler treats its
//! input as unnormalized non-negative weights and draws one index in
//! proportion to them. Weights with no usable mass are an error rather than
//! a silent fallback to index 0.

use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::error::{Error, Result};

/// Multinomial sampler over unnormalized weights.
#[derive(Debug, Clone)]
pub struct WeightedSampler {
    rng: StdRng,
}

impl WeightedSampler {
    /// Creates a sampler seeded from system entropy.
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    /// Creates a sampler with a specific seed for reproducibility.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Seeded when `seed` is given, entropy-seeded otherwise.
    pub fn from_seed_option(seed: Option<u64>) -> Self {
        seed.map_or_else(Self::new, Self::with_seed)
    }

    /// Draws one token id with probability proportional to `weights[id]`.
    pub fn sample(&mut self, weights: &[f32]) -> Result<u32> {
        if let Some(bad) = weights.iter().find(|w| !w.is_finite() || **w < 0.0) {
            return Err(Error::DegenerateDistribution(format!(
                "invalid sampling weight {bad}"
            )));
        }
        let total: f64 = weights.iter().map(|&w| w as f64).sum();
        if total <= 0.0 {
            return Err(Error::DegenerateDistribution(format!(
                "all {} sampling weights are zero",
                weights.len()
            )));
        }

        let dist = WeightedIndex::new(weights.iter().map(|&w| w as f64)).map_err(|e| {
            Error::DegenerateDistribution(format!("failed to create distribution: {e}"))
        })?;
        Ok(dist.sample(&mut self.rng) as u32)
    }
}

impl Default for WeightedSampler {
    fn default() -> Self {
        Self::new()
    }
}
