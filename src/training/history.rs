//! Training History
//!
//! Per-epoch metric records collected by the stage runner. The history is
//! the artifact that later stages consume: best-epoch estimation scans its
//! validation-loss trajectory, and the search controller ranks trials by
//! its best value.

use serde::{Deserialize, Serialize};

use crate::utils::error::{CultureError, Result};

/// Metrics recorded for one training epoch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpochRecord {
    /// 1-indexed epoch number
    pub epoch: usize,
    /// Mean weighted training loss
    pub train_loss: f64,
    /// Mean unweighted validation loss, when a validation split exists
    pub val_loss: Option<f64>,
    /// Validation accuracy at the decision threshold
    pub val_accuracy: Option<f64>,
    /// Validation Fβ at the decision threshold
    pub val_fbeta: Option<f64>,
}

/// Ordered collection of epoch records for one training run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrainingHistory {
    records: Vec<EpochRecord>,
}

impl TrainingHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one epoch's record
    pub fn push(&mut self, record: EpochRecord) {
        self.records.push(record);
    }

    /// Number of recorded epochs
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// All records in epoch order
    pub fn records(&self) -> &[EpochRecord] {
        &self.records
    }

    /// Validation-loss trajectory, in epoch order
    pub fn val_losses(&self) -> Vec<f64> {
        self.records.iter().filter_map(|r| r.val_loss).collect()
    }

    /// 1-indexed epoch with the lowest validation loss; ties resolve to the
    /// earliest epoch. Errors with `NoTrainingHistory` when no epoch carries
    /// a validation loss.
    pub fn best_epoch(&self) -> Result<usize> {
        let mut best: Option<(usize, f64)> = None;

        for record in &self.records {
            if let Some(loss) = record.val_loss {
                match best {
                    Some((_, best_loss)) if loss >= best_loss => {}
                    _ => best = Some((record.epoch, loss)),
                }
            }
        }

        best.map(|(epoch, _)| epoch)
            .ok_or(CultureError::NoTrainingHistory)
    }

    /// Lowest validation loss seen across the run
    pub fn best_val_loss(&self) -> Result<f64> {
        let epoch = self.best_epoch()?;
        Ok(self
            .records
            .iter()
            .find(|r| r.epoch == epoch)
            .and_then(|r| r.val_loss)
            .unwrap_or(f64::INFINITY))
    }
}

/// Build a history from a bare validation-loss trajectory
impl From<Vec<f64>> for TrainingHistory {
    fn from(val_losses: Vec<f64>) -> Self {
        let records = val_losses
            .into_iter()
            .enumerate()
            .map(|(i, loss)| EpochRecord {
                epoch: i + 1,
                train_loss: loss,
                val_loss: Some(loss),
                val_accuracy: None,
                val_fbeta: None,
            })
            .collect();
        Self { records }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_best_epoch_is_one_indexed_argmin() {
        let history = TrainingHistory::from(vec![0.9, 0.5, 0.6, 0.4, 0.45]);
        assert_eq!(history.best_epoch().unwrap(), 4);
        assert!((history.best_val_loss().unwrap() - 0.4).abs() < 1e-12);
    }

    #[test]
    fn test_ties_resolve_to_earliest_epoch() {
        let history = TrainingHistory::from(vec![0.5, 0.3, 0.3]);
        assert_eq!(history.best_epoch().unwrap(), 2);
    }

    #[test]
    fn test_empty_history_is_an_error() {
        let history = TrainingHistory::new();
        assert!(matches!(
            history.best_epoch(),
            Err(CultureError::NoTrainingHistory)
        ));
    }

    #[test]
    fn test_history_without_validation_is_an_error() {
        let mut history = TrainingHistory::new();
        history.push(EpochRecord {
            epoch: 1,
            train_loss: 0.7,
            val_loss: None,
            val_accuracy: None,
            val_fbeta: None,
        });
        assert!(matches!(
            history.best_epoch(),
            Err(CultureError::NoTrainingHistory)
        ));
    }
}
