//! Binary classification metrics.
//!
//! Positive class = the report describes a real flood. Undefined ratios (no
//! positives predicted, no negatives present) are reported as 0.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    pub tp: usize,
    pub fp: usize,
    pub tn: usize,
    pub fn_: usize,
}

impl ConfusionMatrix {
    pub fn from_pairs(labels: &[bool], predicted: &[bool]) -> Self {
        let mut m = Self::default();
        for (&truth, &pred) in labels.iter().zip(predicted) {
            match (truth, pred) {
                (true, true) => m.tp += 1,
                (false, true) => m.fp += 1,
                (false, false) => m.tn += 1,
                (true, false) => m.fn_ += 1,
            }
        }
        m
    }

    pub fn total(&self) -> usize {
        self.tp + self.fp + self.tn + self.fn_
    }
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassificationMetrics {
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub specificity: f64,
    pub auc: f64,
}

impl ClassificationMetrics {
    /// Metrics for hard predictions plus continuous scores for AUC.
    pub fn compute(labels: &[bool], predicted: &[bool], scores: &[f64]) -> Self {
        let m = ConfusionMatrix::from_pairs(labels, predicted);
        let precision = ratio(m.tp, m.tp + m.fp);
        let recall = ratio(m.tp, m.tp + m.fn_);
        let f1 = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };
        Self {
            accuracy: ratio(m.tp + m.tn, m.total()),
            precision,
            recall,
            f1,
            specificity: ratio(m.tn, m.tn + m.fp),
            auc: roc_auc(labels, scores),
        }
    }
}

/// Area under the ROC curve via the rank-sum (Mann-Whitney) formulation.
///
/// Tied scores share their average rank. Returns 0.5 when only one class is
/// present.
pub fn roc_auc(labels: &[bool], scores: &[f64]) -> f64 {
    let n = labels.len().min(scores.len());
    let positives = labels[..n].iter().filter(|&&l| l).count();
    let negatives = n - positives;
    if positives == 0 || negatives == 0 {
        return 0.5;
    }

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| scores[a].total_cmp(&scores[b]));

    let mut ranks = vec![0.0; n];
    let mut i = 0;
    while i < n {
        let mut j = i;
        while j + 1 < n && scores[order[j + 1]] == scores[order[i]] {
            j += 1;
        }
        // Ranks are 1-based.
        let avg = (i + j) as f64 / 2.0 + 1.0;
        for &k in &order[i..=j] {
            ranks[k] = avg;
        }
        i = j + 1;
    }

    let rank_sum: f64 = (0..n).filter(|&k| labels[k]).map(|k| ranks[k]).sum();
    let p = positives as f64;
    (rank_sum - p * (p + 1.0) / 2.0) / (p * negatives as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confusion_counts() {
        let labels = [true, true, false, false, true];
        let pred = [true, false, true, false, true];
        let m = ConfusionMatrix::from_pairs(&labels, &pred);
        assert_eq!(
            m,
            ConfusionMatrix {
                tp: 2,
                fp: 1,
                tn: 1,
                fn_: 1
            }
        );
    }

    #[test]
    fn test_metrics_known_values() {
        let labels = [true, true, false, false, true];
        let pred = [true, false, true, false, true];
        let scores = [0.9, 0.4, 0.6, 0.1, 0.8];
        let m = ClassificationMetrics::compute(&labels, &pred, &scores);
        assert!((m.accuracy - 0.6).abs() < 1e-12);
        assert!((m.precision - 2.0 / 3.0).abs() < 1e-12);
        assert!((m.recall - 2.0 / 3.0).abs() < 1e-12);
        assert!((m.f1 - 2.0 / 3.0).abs() < 1e-12);
        assert!((m.specificity - 0.5).abs() < 1e-12);
        // Positive scores 0.9, 0.4, 0.8 vs negatives 0.6, 0.1: 5 of 6 pairs ordered.
        assert!((m.auc - 5.0 / 6.0).abs() < 1e-12, "auc = {}", m.auc);
    }

    #[test]
    fn test_no_predicted_positives_gives_zero_precision() {
        let m = ClassificationMetrics::compute(&[true, false], &[false, false], &[0.0, 0.0]);
        assert_eq!(m.precision, 0.0);
        assert_eq!(m.f1, 0.0);
        assert_eq!(m.specificity, 1.0);
    }

    #[test]
    fn test_auc_perfect_and_inverted() {
        let labels = [false, false, true, true];
        assert_eq!(roc_auc(&labels, &[0.1, 0.2, 0.8, 0.9]), 1.0);
        assert_eq!(roc_auc(&labels, &[0.9, 0.8, 0.2, 0.1]), 0.0);
    }

    #[test]
    fn test_auc_all_ties_is_half() {
        let labels = [false, true, false, true];
        assert_eq!(roc_auc(&labels, &[1.0; 4]), 0.5);
    }

    #[test]
    fn test_auc_single_class_is_half() {
        assert_eq!(roc_auc(&[true, true], &[0.3, 0.9]), 0.5);
        assert_eq!(roc_auc(&[], &[]), 0.5);
    }
}
