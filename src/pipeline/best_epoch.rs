//! Best-Epoch Estimation
//!
//! After the search picks a winning configuration, the model is rebuilt
//! fresh and retrained with one deliberately high-patience early-stop
//! callback, so the run explores well past the first degradation instead
//! of stopping at a local dip. The estimate is the 1-indexed epoch with
//! the lowest validation loss over the whole trajectory.

use burn::data::dataset::Dataset;
use burn::tensor::backend::AutodiffBackend;

use crate::dataset::burn_dataset::CultureItem;
use crate::model::backbone::CultureBackbone;
use crate::model::builder::StagedModelBuilder;
use crate::model::head::CultureHead;
use crate::search::space::HyperPoint;
use crate::training::callbacks::{Callback, CallbackPolicy, Monitor};
use crate::training::class_weights::ClassWeights;
use crate::training::history::TrainingHistory;
use crate::training::stage_runner::{StageConfig, TrainingStageRunner};
use crate::utils::error::Result;

/// Estimates the ideal epoch count for a chosen configuration
#[derive(Debug, Clone)]
pub struct BestEpochEstimator {
    /// Early-stop patience; high on purpose
    pub patience: usize,
    /// Upper bound on epochs for the estimation run
    pub max_epochs: usize,
}

impl Default for BestEpochEstimator {
    fn default() -> Self {
        Self {
            patience: 10,
            max_epochs: 60,
        }
    }
}

impl BestEpochEstimator {
    pub fn new(patience: usize, max_epochs: usize) -> Self {
        Self {
            patience,
            max_epochs,
        }
    }

    /// Retrain a fresh fine-tune model for `point` and return the
    /// 1-indexed epoch with the minimum validation loss. Errors with
    /// `NoTrainingHistory` when the run records no validated epochs.
    #[allow(clippy::too_many_arguments)]
    pub fn estimate<B, DT, DV>(
        &self,
        builder: &StagedModelBuilder,
        backbone: CultureBackbone<B>,
        head: CultureHead<B>,
        point: &HyperPoint,
        train: &DT,
        val: &DV,
        class_weights: &ClassWeights,
        base_config: &StageConfig,
        device: &B::Device,
    ) -> Result<(usize, TrainingHistory)>
    where
        B: AutodiffBackend,
        DT: Dataset<CultureItem>,
        DV: Dataset<CultureItem>,
    {
        let model =
            builder.build_fine_tune(backbone, head, point.frozen_layer_cutoff, point.dropout_rate);

        let config = StageConfig {
            name: "best_epoch".to_string(),
            max_epochs: self.max_epochs,
            learning_rate: point.learning_rate,
            ..base_config.clone()
        };

        let policy = CallbackPolicy::default().push(Callback::EarlyStop {
            monitor: Monitor::ValLoss,
            patience: self.patience,
        });

        let runner = TrainingStageRunner::new(config);
        let (_, history) = runner.run(model, train, val, class_weights, policy, device)?;

        let best = history.best_epoch()?;
        Ok((best, history))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::error::CultureError;

    #[test]
    fn test_argmin_over_recorded_trajectory() {
        let history = TrainingHistory::from(vec![0.9, 0.5, 0.6, 0.4, 0.45]);
        assert_eq!(history.best_epoch().unwrap(), 4);
    }

    #[test]
    fn test_empty_trajectory_fails() {
        let history = TrainingHistory::new();
        assert!(matches!(
            history.best_epoch(),
            Err(CultureError::NoTrainingHistory)
        ));
    }
}
