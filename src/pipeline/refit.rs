//! Final Refit
//!
//! Once the best epoch count is known, the validation split has served its
//! purpose: train and validation are pooled into one dataset and the
//! winning configuration is refit on it for `ceil(best_epoch * 1.1)`
//! epochs with no validation monitoring. The 10% margin compensates for
//! the larger pooled set needing slightly more passes to reach the same
//! generalization point. Evaluation then runs exactly once against the
//! held-out test split.

use burn::data::dataset::{Dataset, InMemDataset};
use burn::module::AutodiffModule;
use burn::tensor::backend::AutodiffBackend;

use crate::dataset::burn_dataset::{CombinedDataset, CultureItem};
use crate::model::builder::CultureClassifier;
use crate::training::callbacks::CallbackPolicy;
use crate::training::class_weights::ClassWeights;
use crate::training::history::TrainingHistory;
use crate::training::stage_runner::{evaluate, StageConfig, TrainingStageRunner};
use crate::utils::error::Result;
use crate::utils::metrics::EvalReport;

/// Refits the winning configuration on pooled data and evaluates it
#[derive(Debug, Clone)]
pub struct FinalRefitController {
    config: StageConfig,
}

impl FinalRefitController {
    pub fn new(config: StageConfig) -> Self {
        Self { config }
    }

    /// Epoch budget for the refit: `ceil(best_epoch * 1.1)`
    pub fn refit_epochs(best_epoch: usize) -> usize {
        (best_epoch as f64 * 1.1).ceil() as usize
    }

    /// Refit on the pooled train+validation dataset. No validation
    /// monitoring is possible (validation is pooled in), so the run uses
    /// an empty callback policy and a fixed epoch budget.
    pub fn refit<B>(
        &self,
        model: CultureClassifier<B>,
        pooled: &CombinedDataset,
        best_epoch: usize,
        class_weights: &ClassWeights,
        device: &B::Device,
    ) -> Result<(CultureClassifier<B>, TrainingHistory)>
    where
        B: AutodiffBackend,
    {
        let config = StageConfig {
            name: "refit".to_string(),
            max_epochs: Self::refit_epochs(best_epoch),
            ..self.config.clone()
        };

        let empty_val: InMemDataset<CultureItem> = InMemDataset::new(Vec::new());
        let runner = TrainingStageRunner::new(config);
        runner.run(
            model,
            pooled,
            &empty_val,
            class_weights,
            CallbackPolicy::default(),
            device,
        )
    }

    /// Evaluate the refit model once against the held-out test split
    pub fn evaluate_test<B, D>(
        &self,
        model: &CultureClassifier<B>,
        test: &D,
        device: &B::Device,
    ) -> Result<EvalReport>
    where
        B: AutodiffBackend,
        D: Dataset<CultureItem>,
    {
        let inner_model = model.valid();
        let inner_device = Default::default();
        evaluate(
            &inner_model,
            test,
            self.config.batch_size,
            self.config.image_size,
            self.config.beta,
            self.config.threshold,
            &inner_device,
        )
    }
}
