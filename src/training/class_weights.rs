//! Class-Imbalance Weighting
//!
//! Derives inverse-prevalence class weights from the train split once,
//! before any training stage runs. Every example's loss contribution is
//! scaled by the weight of its class, which is how imbalance correction
//! reaches the gradient updates.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::utils::error::{CultureError, Result};
use crate::POSITIVE_LABEL;

/// Per-class loss weights for the binary task
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassWeights {
    /// Weight for culture-negative examples (label 0)
    pub negative: f64,
    /// Weight for culture-positive examples (label 1)
    pub positive: f64,
}

impl ClassWeights {
    /// Estimate weights from train-split labels.
    ///
    /// Each label is counted exactly once; `weight[c] = 1 - count[c]/total`,
    /// so the rarer class receives the larger weight. Errors with
    /// `EmptyDataset` when no labels are supplied.
    pub fn estimate(labels: impl IntoIterator<Item = usize>) -> Result<Self> {
        let mut positives = 0usize;
        let mut total = 0usize;

        for label in labels {
            if label == POSITIVE_LABEL {
                positives += 1;
            }
            total += 1;
        }

        if total == 0 {
            return Err(CultureError::EmptyDataset);
        }

        let negatives = total - positives;
        let prevalence = positives as f64 / total as f64;
        info!(
            "Class balance: {} positive / {} total ({:.1}% prevalence)",
            positives,
            total,
            prevalence * 100.0
        );

        Ok(Self {
            negative: 1.0 - negatives as f64 / total as f64,
            positive: 1.0 - prevalence,
        })
    }

    /// Equal weighting, used when no rebalancing is wanted
    pub fn balanced() -> Self {
        Self {
            negative: 0.5,
            positive: 0.5,
        }
    }

    /// Weight for an example with the given label
    pub fn weight_for(&self, label: usize) -> f64 {
        if label == POSITIVE_LABEL {
            self.positive
        } else {
            self.negative
        }
    }
}
