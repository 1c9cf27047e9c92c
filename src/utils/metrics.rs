//! Metrics Module for Binary Classifier Evaluation
//!
//! Provides evaluation utilities for the culture classifier:
//! - Streaming Fβ score accumulated batch by batch
//! - ROC-AUC over raw scores
//! - Final evaluation report (loss, accuracy, AUC, Fβ)

use serde::{Deserialize, Serialize};

use crate::{DEFAULT_BETA, DEFAULT_THRESHOLD};

/// Small constant guarding divisions by zero
pub const EPSILON: f64 = 1e-7;

/// Streaming Fβ score for a binary classifier.
///
/// The accumulator tracks three running counters (true positives, predicted
/// positives, actual positives) across batches. `result` is pure: reading it
/// several times between updates yields the same value. The owner of the
/// accumulator is responsible for calling `reset` at epoch boundaries; it is
/// never reset implicitly.
#[derive(Debug, Clone)]
pub struct StreamingFBeta {
    beta: f64,
    threshold: f64,
    true_positives: f64,
    predicted_positives: f64,
    actual_positives: f64,
}

impl Default for StreamingFBeta {
    fn default() -> Self {
        Self::new(DEFAULT_BETA, DEFAULT_THRESHOLD)
    }
}

impl StreamingFBeta {
    /// Create a new accumulator with the given beta and decision threshold
    pub fn new(beta: f64, threshold: f64) -> Self {
        Self {
            beta,
            threshold,
            true_positives: 0.0,
            predicted_positives: 0.0,
            actual_positives: 0.0,
        }
    }

    /// Accumulate one batch of ground-truth labels and raw scores.
    ///
    /// Scores at or above the threshold count as positive predictions.
    /// Accepts any batch size; must be called once per evaluation batch, in
    /// the order batches are yielded.
    pub fn update(&mut self, truth: &[usize], scores: &[f32]) {
        debug_assert_eq!(truth.len(), scores.len());

        for (&label, &score) in truth.iter().zip(scores.iter()) {
            let predicted = f64::from(score) >= self.threshold;
            let actual = label == 1;

            if predicted {
                self.predicted_positives += 1.0;
            }
            if actual {
                self.actual_positives += 1.0;
            }
            if predicted && actual {
                self.true_positives += 1.0;
            }
        }
    }

    /// Current Fβ value over everything accumulated since the last reset.
    ///
    /// A fresh (or just-reset) accumulator yields 0.
    pub fn result(&self) -> f64 {
        let precision = self.true_positives / (self.predicted_positives + EPSILON);
        let recall = self.true_positives / (self.actual_positives + EPSILON);
        let beta_sq = self.beta * self.beta;

        (1.0 + beta_sq) * precision * recall / (beta_sq * precision + recall + EPSILON)
    }

    /// Zero all three counters. Called once per epoch boundary by the
    /// training loop.
    pub fn reset(&mut self) {
        self.true_positives = 0.0;
        self.predicted_positives = 0.0;
        self.actual_positives = 0.0;
    }

    /// Number of true positives seen since the last reset
    pub fn true_positives(&self) -> f64 {
        self.true_positives
    }

    /// Number of positive predictions seen since the last reset
    pub fn predicted_positives(&self) -> f64 {
        self.predicted_positives
    }

    /// Number of actual positives seen since the last reset
    pub fn actual_positives(&self) -> f64 {
        self.actual_positives
    }
}

/// ROC-AUC from raw scores and binary labels.
///
/// Computed as the Mann-Whitney U statistic with average ranks for tied
/// scores. Returns 0.5 when either class is absent (no ranking signal).
pub fn roc_auc(truth: &[usize], scores: &[f32]) -> f64 {
    debug_assert_eq!(truth.len(), scores.len());

    let n_pos = truth.iter().filter(|&&l| l == 1).count();
    let n_neg = truth.len() - n_pos;
    if n_pos == 0 || n_neg == 0 {
        return 0.5;
    }

    let mut indexed: Vec<(f32, usize)> = scores.iter().copied().zip(truth.iter().copied()).collect();
    indexed.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));

    // Average ranks across tied scores, then sum the positive-class ranks
    let mut rank_sum_pos = 0.0f64;
    let mut i = 0;
    while i < indexed.len() {
        let mut j = i;
        while j + 1 < indexed.len() && indexed[j + 1].0 == indexed[i].0 {
            j += 1;
        }
        // ranks are 1-based; ties share the average rank of their span
        let avg_rank = (i + 1 + j + 1) as f64 / 2.0;
        for item in &indexed[i..=j] {
            if item.1 == 1 {
                rank_sum_pos += avg_rank;
            }
        }
        i = j + 1;
    }

    let u = rank_sum_pos - (n_pos * (n_pos + 1)) as f64 / 2.0;
    u / (n_pos as f64 * n_neg as f64)
}

/// Final evaluation report for a trained model against a held-out split
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalReport {
    /// Number of samples evaluated
    pub samples: usize,
    /// Mean binary cross-entropy loss
    pub loss: f64,
    /// Fraction of correct predictions at the decision threshold
    pub accuracy: f64,
    /// ROC-AUC over raw scores
    pub auc: f64,
    /// Fβ at the decision threshold
    pub fbeta: f64,
    /// Beta used for the Fβ score
    pub beta: f64,
    /// Decision threshold
    pub threshold: f64,
}

impl EvalReport {
    /// Build a report from collected truth labels, scores and a mean loss
    pub fn from_scores(truth: &[usize], scores: &[f32], loss: f64, beta: f64, threshold: f64) -> Self {
        let mut fbeta = StreamingFBeta::new(beta, threshold);
        fbeta.update(truth, scores);

        let correct = truth
            .iter()
            .zip(scores.iter())
            .filter(|(&label, &score)| (f64::from(score) >= threshold) == (label == 1))
            .count();

        let accuracy = if truth.is_empty() {
            0.0
        } else {
            correct as f64 / truth.len() as f64
        };

        Self {
            samples: truth.len(),
            loss,
            accuracy,
            auc: roc_auc(truth, scores),
            fbeta: fbeta.result(),
            beta,
            threshold,
        }
    }

    /// Save the report as pretty-printed JSON
    pub fn save(&self, path: &std::path::Path) -> crate::Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| crate::CultureError::Serialization(e.to_string()))?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

impl std::fmt::Display for EvalReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "╔═══════════════════════════════════════╗")?;
        writeln!(f, "║          Evaluation Report            ║")?;
        writeln!(f, "╠═══════════════════════════════════════╣")?;
        writeln!(f, "║ Samples:        {:>8}              ║", self.samples)?;
        writeln!(f, "║ Loss:           {:>8.4}              ║", self.loss)?;
        writeln!(f, "║ Accuracy:       {:>7.2}%              ║", self.accuracy * 100.0)?;
        writeln!(f, "║ ROC-AUC:        {:>8.4}              ║", self.auc)?;
        writeln!(f, "║ F{:.0}:             {:>8.4}              ║", self.beta, self.fbeta)?;
        write!(f, "╚═══════════════════════════════════════╝")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_streaming_fbeta_known_batch() {
        // truth=[1,1,0,0], scores=[0.9,0.4,0.6,0.1] at threshold 0.5
        // predicted=[1,0,1,0] → tp=1, predicted_positive=2, actual_positive=2
        let mut metric = StreamingFBeta::new(1.0, 0.5);
        metric.update(&[1, 1, 0, 0], &[0.9, 0.4, 0.6, 0.1]);

        assert_eq!(metric.true_positives(), 1.0);
        assert_eq!(metric.predicted_positives(), 2.0);
        assert_eq!(metric.actual_positives(), 2.0);
        assert!((metric.result() - 0.5).abs() < 1e-5);
    }

    #[test]
    fn test_streaming_fbeta_accumulates_across_batches() {
        let mut whole = StreamingFBeta::new(1.0, 0.5);
        whole.update(&[1, 1, 0, 0], &[0.9, 0.4, 0.6, 0.1]);

        let mut split = StreamingFBeta::new(1.0, 0.5);
        split.update(&[1, 1], &[0.9, 0.4]);
        split.update(&[0, 0], &[0.6, 0.1]);

        assert!((whole.result() - split.result()).abs() < 1e-12);
    }

    #[test]
    fn test_streaming_fbeta_result_is_pure() {
        let mut metric = StreamingFBeta::new(1.0, 0.5);
        metric.update(&[1, 0], &[0.8, 0.2]);

        let first = metric.result();
        let second = metric.result();
        assert_eq!(first, second);
    }

    #[test]
    fn test_streaming_fbeta_fresh_returns_zero() {
        let metric = StreamingFBeta::new(1.0, 0.5);
        assert_eq!(metric.result(), 0.0);

        let mut reset_metric = StreamingFBeta::new(1.0, 0.5);
        reset_metric.update(&[1, 0], &[0.9, 0.9]);
        reset_metric.reset();
        assert_eq!(reset_metric.result(), 0.0);
    }

    #[test]
    fn test_streaming_fbeta_threshold_is_inclusive() {
        let mut metric = StreamingFBeta::new(1.0, 0.5);
        metric.update(&[1], &[0.5]);
        assert_eq!(metric.true_positives(), 1.0);
    }

    #[test]
    fn test_roc_auc_perfect_ranking() {
        let auc = roc_auc(&[0, 0, 1, 1], &[0.1, 0.2, 0.8, 0.9]);
        assert!((auc - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_roc_auc_inverted_ranking() {
        let auc = roc_auc(&[1, 1, 0, 0], &[0.1, 0.2, 0.8, 0.9]);
        assert!(auc.abs() < 1e-12);
    }

    #[test]
    fn test_roc_auc_ties_average() {
        // All scores equal: no ranking signal, AUC = 0.5
        let auc = roc_auc(&[1, 0, 1, 0], &[0.5, 0.5, 0.5, 0.5]);
        assert!((auc - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_roc_auc_single_class() {
        assert_eq!(roc_auc(&[1, 1], &[0.3, 0.7]), 0.5);
        assert_eq!(roc_auc(&[0, 0], &[0.3, 0.7]), 0.5);
    }

    #[test]
    fn test_eval_report_from_scores() {
        let report = EvalReport::from_scores(&[1, 1, 0, 0], &[0.9, 0.4, 0.6, 0.1], 0.42, 1.0, 0.5);

        assert_eq!(report.samples, 4);
        assert_eq!(report.loss, 0.42);
        // predictions [1,0,1,0] vs [1,1,0,0] → 2 correct
        assert!((report.accuracy - 0.5).abs() < 1e-12);
        assert!((report.fbeta - 0.5).abs() < 1e-5);
    }
}
