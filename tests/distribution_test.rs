//! Integration tests for DistributionBuilder.

mod common;

use common::ScriptedModel;
use nano_fudge::engine::distribution::top_k_indices;
use nano_fudge::engine::fudge::select_candidates;
use nano_fudge::{DistributionBuilder, Error, FilterParams};

const LOGITS: [f32; 8] = [0.3, 2.0, -1.0, 1.5, 0.0, 2.5, 0.7, -0.2];

fn builder() -> DistributionBuilder<ScriptedModel> {
    DistributionBuilder::new(ScriptedModel::constant(LOGITS.to_vec()))
}

fn params(temperature: f32, top_k: Option<usize>, top_p: Option<f32>) -> FilterParams {
    FilterParams {
        temperature,
        top_k,
        top_p,
    }
}

fn support(dist: &[f32]) -> Vec<usize> {
    (0..dist.len()).filter(|&i| dist[i] > 0.0).collect()
}

#[test]
fn test_unfiltered_distribution_is_normalized() {
    let mut builder = builder();
    for temperature in [0.1, 0.5, 1.0, 2.0, 10.0] {
        let dist = builder
            .next_token_distribution(&[1, 2], &params(temperature, None, None))
            .unwrap();

        assert_eq!(dist.len(), LOGITS.len());
        assert!(dist.iter().all(|&p| p >= 0.0));
        let sum: f32 = dist.iter().sum();
        assert!((sum - 1.0).abs() < 1e-5, "sum = {sum} at T={temperature}");
    }
}

#[test]
fn test_only_last_position_logits_are_used() {
    let mut builder = DistributionBuilder::new(ScriptedModel::chain());
    let dist = builder
        .next_token_distribution(&[4, 2, 7], &FilterParams::default())
        .unwrap();
    // chain() prefers 1 + 7 % 9 = 8.
    assert_eq!(top_k_indices(&dist, 1), vec![8]);
}

#[test]
fn test_top_k_keeps_exactly_k_largest() {
    let mut builder = builder();
    for k in [1, 3, 5, 8, 20] {
        let dist = builder
            .next_token_distribution(&[1], &params(1.0, Some(k), None))
            .unwrap();
        let mut kept = support(&dist);
        kept.sort_unstable();
        let mut expected = top_k_indices(&LOGITS, k);
        expected.sort_unstable();

        assert_eq!(kept.len(), k.min(LOGITS.len()));
        assert_eq!(kept, expected);
        let sum: f32 = dist.iter().sum();
        assert!((sum - 1.0).abs() < 1e-5);
    }
}

#[test]
fn test_top_k_ties_truncate_exactly() {
    let mut builder = DistributionBuilder::new(ScriptedModel::constant(vec![1.0; 6]));
    let dist = builder
        .next_token_distribution(&[1], &params(1.0, Some(4), None))
        .unwrap();
    assert_eq!(support(&dist).len(), 4);
}

#[test]
fn test_top_p_keeps_at_least_one() {
    let mut builder = DistributionBuilder::new(ScriptedModel::constant(vec![
        20.0, 0.0, 0.0, 0.0,
    ]));
    let dist = builder
        .next_token_distribution(&[1], &params(1.0, None, Some(0.01)))
        .unwrap();
    assert_eq!(support(&dist), vec![0]);
    assert!((dist[0] - 1.0).abs() < 1e-6);
}

#[test]
fn test_top_p_covers_mass() {
    let mut builder = builder();
    let full = builder
        .next_token_distribution(&[1], &params(1.0, None, None))
        .unwrap();
    let p = 0.7;
    let dist = builder
        .next_token_distribution(&[1], &params(1.0, None, Some(p)))
        .unwrap();

    let kept = support(&dist);
    let covered: f32 = kept.iter().map(|&i| full[i]).sum();
    assert!(covered > p);

    // Dropping the least likely survivor would no longer cover p.
    let weakest = kept
        .iter()
        .copied()
        .min_by(|&a, &b| full[a].partial_cmp(&full[b]).unwrap())
        .unwrap();
    assert!(covered - full[weakest] <= p);
}

#[test]
fn test_top_k_and_top_p_intersect() {
    let mut builder = builder();
    let top_k_only = builder
        .next_token_distribution(&[1], &params(1.0, Some(4), None))
        .unwrap();
    let both = builder
        .next_token_distribution(&[1], &params(1.0, Some(4), Some(0.5)))
        .unwrap();

    let k_support = support(&top_k_only);
    let both_support = support(&both);
    assert!(!both_support.is_empty());
    assert!(both_support.iter().all(|i| k_support.contains(i)));
}

#[test]
fn test_rejects_non_positive_temperature() {
    let mut builder = builder();
    for temperature in [0.0, -1.0] {
        let result = builder.next_token_distribution(&[1], &params(temperature, None, None));
        assert!(matches!(result, Err(Error::InvalidTemperature(_))));
    }
}

#[test]
fn test_rejects_empty_sequence() {
    let mut builder = builder();
    let result = builder.next_token_distribution(&[], &FilterParams::default());
    assert!(matches!(result, Err(Error::EmptySequence)));
}

#[test]
fn test_candidates_carry_unfiltered_base_probabilities() {
    let mut builder = builder();
    let dist = builder
        .next_token_distribution(&[1], &FilterParams::default())
        .unwrap();

    for k in [1, 3, 8, 200] {
        let candidates = select_candidates(&dist, k);
        assert_eq!(candidates.len(), k.min(dist.len()));
        for c in &candidates {
            assert_eq!(c.base_prob, dist[c.token_id as usize]);
        }
        assert!(candidates.windows(2).all(|w| w[0].base_prob >= w[1].base_prob));
    }
}

#[test]
fn test_tiny_temperature_is_still_normalized() {
    let mut builder = DistributionBuilder::new(ScriptedModel::constant(vec![-10.0, -20.0, -15.0]));
    let dist = builder
        .next_token_distribution(&[1], &params(1e-38, None, None))
        .unwrap();
    assert_eq!(dist, vec![1.0, 0.0, 0.0]);
}

#[test]
fn test_all_masked_logits_are_degenerate() {
    let mut builder =
        DistributionBuilder::new(ScriptedModel::constant(vec![f32::NEG_INFINITY; 4]));
    let result = builder.next_token_distribution(&[1], &FilterParams::default());
    assert!(matches!(result, Err(Error::DegenerateDistribution(_))));
}
