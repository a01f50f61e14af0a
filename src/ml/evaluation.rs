// ============================================================
// Layer 5 — Evaluation
// ============================================================
// Pure functions over scores and labels; no tensors here.
//
//   strict regime   a span is predicted iff its logit > 0
//   top-k regime    the round(k × num_tokens) highest-scoring
//                   spans are predicted (capped at the span count)
//
// Ranking sorts by score, descending; equal scores keep the
// lower candidate index first so selections are reproducible.
// Scores must be finite: `total_cmp` would rank NaN above every
// real logit, so scoring rejects them before ranking.

use anyhow::{ensure, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Rank fractions evaluated for event mentions.
pub const EVENT_FRACTIONS:  [f64; 3] = [0.2, 0.25, 0.3];
/// Rank fractions evaluated for every other mention type.
pub const ENTITY_FRACTIONS: [f64; 4] = [0.2, 0.25, 0.3, 0.4];

/// Default fraction set of a mention type.
pub fn eval_fractions(mention_type: &str) -> Vec<f64> {
    if mention_type == "events" {
        EVENT_FRACTIONS.to_vec()
    } else {
        ENTITY_FRACTIONS.to_vec()
    }
}

/// Number of spans kept for fraction `k` of `num_tokens` words.
pub fn rank_cutoff(k: f64, num_tokens: usize) -> usize {
    (k * num_tokens as f64).round().max(0.0) as usize
}

/// Fail on the first NaN or infinite score.
pub fn ensure_finite(scores: &[f32]) -> Result<()> {
    if let Some((i, s)) = scores.iter().enumerate().find(|(_, s)| !s.is_finite()) {
        anyhow::bail!("Span {} has a non-finite score ({})", i, s);
    }
    Ok(())
}

pub fn strict_predictions(scores: &[f32]) -> Vec<bool> {
    scores.iter().map(|&s| s > 0.0).collect()
}

/// Indices of the `count` best scores, best first. Expects finite
/// scores (see `ensure_finite`).
pub fn top_k_indices(scores: &[f32], count: usize) -> Vec<usize> {
    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| match scores[b].total_cmp(&scores[a]) {
        Ordering::Equal => a.cmp(&b),
        other           => other,
    });
    order.truncate(count.min(scores.len()));
    order
}

/// Boolean mask of the `count` best scores.
pub fn top_k_predictions(scores: &[f32], count: usize) -> Vec<bool> {
    let mut mask = vec![false; scores.len()];
    for i in top_k_indices(scores, count) {
        mask[i] = true;
    }
    mask
}

// ─── Evaluation ───────────────────────────────────────────────────────────────
/// Binary confusion counts with precision / recall / F1.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Evaluation {
    pub true_positives: usize,
    pub predicted:      usize,
    pub gold:           usize,
}

impl Evaluation {
    pub fn new(predictions: &[bool], labels: &[bool]) -> Result<Self> {
        ensure!(
            predictions.len() == labels.len(),
            "{} predictions for {} labels", predictions.len(), labels.len()
        );
        let true_positives = predictions.iter().zip(labels).filter(|(&p, &l)| p && l).count();
        Ok(Self {
            true_positives,
            predicted: predictions.iter().filter(|&&p| p).count(),
            gold:      labels.iter().filter(|&&l| l).count(),
        })
    }

    pub fn recall(&self) -> f64 {
        ratio(self.true_positives, self.gold)
    }

    pub fn precision(&self) -> f64 {
        ratio(self.true_positives, self.predicted)
    }

    pub fn f1(&self) -> f64 {
        let (p, r) = (self.precision(), self.recall());
        if p + r == 0.0 { 0.0 } else { 2.0 * p * r / (p + r) }
    }
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 { 0.0 } else { num as f64 / den as f64 }
}

// ─── BestRecall ───────────────────────────────────────────────────────────────
/// Best top-k recall seen so far across epochs and fractions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BestRecall {
    pub recall:   f64,
    pub epoch:    usize,
    pub fraction: f64,
}

impl Default for BestRecall {
    fn default() -> Self {
        Self { recall: 0.0, epoch: 0, fraction: 0.0 }
    }
}

impl BestRecall {
    /// Record a result; returns true only on a strict improvement.
    pub fn observe(&mut self, recall: f64, epoch: usize, fraction: f64) -> bool {
        if recall > self.recall {
            *self = Self { recall, epoch, fraction };
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 100 distinct scores, every third span gold.
    fn scores_and_labels() -> (Vec<f32>, Vec<bool>) {
        let scores = (0..100).map(|i| ((i * 37) % 100) as f32 / 10.0 - 5.0).collect();
        let labels = (0..100).map(|i| i % 3 == 0).collect();
        (scores, labels)
    }

    #[test]
    fn test_rank_cutoff_rounds() {
        assert_eq!(rank_cutoff(0.2, 100), 20);
        assert_eq!(rank_cutoff(0.25, 10), 3);
        assert_eq!(rank_cutoff(0.3, 7), 2);
        assert_eq!(rank_cutoff(0.2, 0), 0);
    }

    #[test]
    fn test_top_k_sizes_and_nesting() {
        let (scores, _) = scores_and_labels();
        let k20 = top_k_predictions(&scores, rank_cutoff(0.2, 100));
        let k40 = top_k_predictions(&scores, rank_cutoff(0.4, 100));

        assert_eq!(k20.iter().filter(|&&p| p).count(), 20);
        assert_eq!(k40.iter().filter(|&&p| p).count(), 40);
        assert!(k20.iter().zip(&k40).all(|(&a, &b)| !a || b));
    }

    #[test]
    fn test_top_k_is_capped_at_span_count() {
        let picked = top_k_predictions(&[0.1, -3.0, 2.0], 10);
        assert_eq!(picked, vec![true, true, true]);
    }

    #[test]
    fn test_ties_prefer_lower_index() {
        assert_eq!(top_k_indices(&[1.0, 5.0, 1.0, 1.0], 3), vec![1, 0, 2]);
    }

    #[test]
    fn test_non_finite_scores_are_rejected() {
        assert!(ensure_finite(&[0.3, -2.0, 1e6]).is_ok());
        let err = ensure_finite(&[0.3, f32::NAN, 1.0]).unwrap_err();
        assert!(err.to_string().contains("Span 1"));
        assert!(ensure_finite(&[f32::NEG_INFINITY]).is_err());
    }

    #[test]
    fn test_recall_is_monotonic_in_k() {
        let (scores, labels) = scores_and_labels();
        let recalls: Vec<f64> = [0.2, 0.25, 0.3, 0.4]
            .iter()
            .map(|&k| {
                let preds = top_k_predictions(&scores, rank_cutoff(k, 100));
                Evaluation::new(&preds, &labels).unwrap().recall()
            })
            .collect();
        assert!(recalls.windows(2).all(|w| w[0] <= w[1]), "{recalls:?}");
    }

    #[test]
    fn test_strict_regime_uses_positive_logits() {
        let preds = strict_predictions(&[0.5, 0.0, -0.1, 3.0]);
        assert_eq!(preds, vec![true, false, false, true]);

        let eval = Evaluation::new(&preds, &[true, true, false, false]).unwrap();
        assert_eq!(eval.true_positives, 1);
        assert!((eval.precision() - 0.5).abs() < 1e-12);
        assert!((eval.recall() - 0.5).abs() < 1e-12);
        assert!((eval.f1() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_empty_denominators_give_zero() {
        let eval = Evaluation::new(&[false, false], &[false, false]).unwrap();
        assert_eq!((eval.precision(), eval.recall(), eval.f1()), (0.0, 0.0, 0.0));
        assert!(Evaluation::new(&[true], &[]).is_err());
    }

    #[test]
    fn test_best_recall_updates_on_strict_improvement_only() {
        let mut best = BestRecall::default();
        assert!(!best.observe(0.0, 1, 0.2));
        assert!(best.observe(0.5, 1, 0.2));
        assert!(!best.observe(0.5, 2, 0.3));
        assert!(best.observe(0.6, 3, 0.25));
        assert_eq!(best, BestRecall { recall: 0.6, epoch: 3, fraction: 0.25 });
    }

    #[test]
    fn test_fraction_sets_by_mention_type() {
        assert_eq!(eval_fractions("events"), vec![0.2, 0.25, 0.3]);
        assert_eq!(eval_fractions("entities"), vec![0.2, 0.25, 0.3, 0.4]);
    }
}
