//! Next-token distribution from the base model.
//!
//! ## Filtering Pipeline
//!
//! ```text
//! Logits [vocab_size]            (last position only)
//!     │
//!     ▼ Top-k mask (optional)     exactly k survivors, rest = -inf
//!     │
//!     ▼ Temperature scaling
//! (logits - max) / temperature
//!     │
//!     ▼ Top-p mask (optional)     smallest sorted prefix covering p, rest = -inf
//!     │
//!     ▼ Softmax
//! Probabilities (masked entries are exactly 0)
//! ```
//!
//! Temperature is monotonic, so selecting top-k before scaling picks the same
//! tokens. Top-p needs the scaled probabilities. With both set the support is
//! the intersection.

use std::cmp::Ordering;

use candle_core::{DType, Device, Tensor};

use crate::error::{Error, Result};
use crate::model::LanguageModel;

/// Filtering options for one distribution query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FilterParams {
    /// Logit divisor; must be finite and > 0.
    pub temperature: f32,
    /// Keep only the k highest logits.
    pub top_k: Option<usize>,
    /// Nucleus threshold in (0, 1].
    pub top_p: Option<f32>,
}

impl Default for FilterParams {
    fn default() -> Self {
        Self {
            temperature: 1.0,
            top_k: None,
            top_p: None,
        }
    }
}

/// Wraps the base model and turns its last-position logits into a
/// filtered probability distribution.
#[derive(Debug)]
pub struct DistributionBuilder<M> {
    model: M,
}

impl<M: LanguageModel> DistributionBuilder<M> {
    /// Wraps a base model.
    pub fn new(model: M) -> Self {
        Self { model }
    }

    /// Device of the wrapped model.
    pub fn device(&self) -> &Device {
        self.model.device()
    }

    /// Raw logits for the position after `tokens`, as f32.
    pub fn next_token_logits(&mut self, tokens: &[u32]) -> Result<Vec<f32>> {
        if tokens.is_empty() {
            return Err(Error::EmptySequence);
        }
        let input_ids = Tensor::new(tokens, self.model.device())?.unsqueeze(0)?;
        let logits = self.model.forward_last(&input_ids)?;

        let logits = match logits.rank() {
            1 => logits,
            2 if logits.dim(0)? == 1 => logits.squeeze(0)?,
            _ => {
                return Err(Error::Tensor(candle_core::Error::Msg(format!(
                    "expected [vocab] or [1, vocab] logits, got {:?}",
                    logits.dims()
                ))))
            }
        };
        Ok(logits.to_dtype(DType::F32)?.to_vec1::<f32>()?)
    }

    /// Filtered probability distribution over the vocabulary.
    pub fn next_token_distribution(
        &mut self,
        tokens: &[u32],
        params: &FilterParams,
    ) -> Result<Vec<f32>> {
        validate_temperature(params.temperature)?;
        let logits = self.next_token_logits(tokens)?;
        distribution_from_logits(logits, params)
    }
}

fn validate_temperature(temperature: f32) -> Result<()> {
    if temperature.is_finite() && temperature > 0.0 {
        Ok(())
    } else {
        Err(Error::InvalidTemperature(temperature))
    }
}

/// Applies temperature, top-k, top-p and softmax to raw logits.
///
/// Logits are shifted by their finite maximum before the temperature divide,
/// so the best token sits at 0 and tiny temperatures cannot overflow. Top-k
/// is selected before scaling, where distinct logits are still distinct.
pub fn distribution_from_logits(mut logits: Vec<f32>, params: &FilterParams) -> Result<Vec<f32>> {
    validate_temperature(params.temperature)?;
    if logits.is_empty() {
        return Err(Error::DegenerateDistribution("empty logits".to_string()));
    }
    let max = finite_max(&logits).ok_or_else(|| {
        Error::DegenerateDistribution(format!("none of {} logits is finite", logits.len()))
    })?;

    if let Some(k) = params.top_k {
        apply_top_k(&mut logits, k);
    }
    for logit in logits.iter_mut() {
        *logit = (*logit - max) / params.temperature;
    }
    if let Some(p) = params.top_p {
        apply_top_p(&mut logits, p);
    }

    let probs = softmax(&logits);
    if probs.iter().any(|p| !p.is_finite()) {
        return Err(Error::DegenerateDistribution(
            "softmax produced non-finite probabilities".to_string(),
        ));
    }
    Ok(probs)
}

/// Largest finite value, if any.
pub(crate) fn finite_max(values: &[f32]) -> Option<f32> {
    values
        .iter()
        .copied()
        .filter(|v| v.is_finite())
        .reduce(f32::max)
}

/// Indices of the `k` largest values, largest first.
///
/// Ties are broken by lower index so exactly `min(k, len)` indices are
/// returned. NaN sorts below every number.
pub fn top_k_indices(values: &[f32], k: usize) -> Vec<usize> {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| descending(values[a], values[b]).then(a.cmp(&b)));
    order.truncate(k.min(values.len()));
    order
}

fn descending(a: f32, b: f32) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        _ => b.partial_cmp(&a).unwrap_or(Ordering::Equal),
    }
}

/// Sets every logit outside the top `k` to `-inf`.
pub fn apply_top_k(logits: &mut [f32], k: usize) {
    if k >= logits.len() {
        return;
    }
    let mut keep = vec![false; logits.len()];
    for i in top_k_indices(logits, k) {
        keep[i] = true;
    }
    for (logit, keep) in logits.iter_mut().zip(keep) {
        if !keep {
            *logit = f32::NEG_INFINITY;
        }
    }
}

/// Nucleus filtering: keeps the smallest highest-probability prefix whose
/// mass exceeds `p` and sets the rest to `-inf`.
///
/// A token is removed when the cumulative probability *before* it already
/// exceeds `p`, so the most likely token always survives.
pub fn apply_top_p(logits: &mut [f32], p: f32) {
    if p >= 1.0 {
        return;
    }
    let order = top_k_indices(logits, logits.len());
    let sorted: Vec<f32> = order.iter().map(|&i| logits[i]).collect();
    let probs = softmax(&sorted);

    let mut cumulative = 0.0f32;
    for (&index, prob) in order.iter().zip(probs) {
        if cumulative > p {
            logits[index] = f32::NEG_INFINITY;
        }
        cumulative += prob;
    }
}

/// Numerically stable softmax over a plain slice.
///
/// Masked (`-inf`) entries map to exactly 0 rather than a tiny positive
/// value, so they stay outside the support and cannot be sampled. An input
/// with no usable entry yields all zeros; callers decide whether that is an
/// error.
pub fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits
        .iter()
        .copied()
        .filter(|v| !v.is_nan())
        .fold(f32::NEG_INFINITY, f32::max);
    if max == f32::NEG_INFINITY {
        return vec![0.0; logits.len()];
    }
    let exps: Vec<f32> = logits.iter().map(|&v| (v - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}
