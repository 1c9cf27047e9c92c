//! End-to-End Pipeline
//!
//! Drives the full training sequence: load and split the dataset, train
//! the frozen-backbone feature extractor, fine-tune with defaults, search
//! the fine-tuning hyperparameters, estimate the ideal epoch count for the
//! winner, refit on pooled train+validation data, and evaluate once on
//! the held-out test split.

use std::fs;
use std::path::PathBuf;

use burn::tensor::backend::AutodiffBackend;
use colored::Colorize;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::dataset::burn_dataset::{CombinedDataset, CultureImageDataset};
use crate::dataset::loader::CultureDataset;
use crate::dataset::split::{DatasetSplits, SplitConfig};
use crate::model::backbone::BackboneConfig;
use crate::model::builder::StagedModelBuilder;
use crate::pipeline::best_epoch::BestEpochEstimator;
use crate::pipeline::refit::FinalRefitController;
use crate::search::controller::SearchController;
use crate::search::space::SearchSpace;
use crate::search::strategy::TpeSampler;
use crate::training::callbacks::{Callback, CallbackPolicy, Monitor};
use crate::training::class_weights::ClassWeights;
use crate::training::stage_runner::{StageConfig, TrainingStageRunner};
use crate::utils::error::{CultureError, Result};
use crate::utils::metrics::EvalReport;
use crate::{DEFAULT_BETA, DEFAULT_THRESHOLD, IMAGE_SIZE};

/// Configuration for the full staged pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Dataset root with `negative/` and `positive/` subdirectories
    pub data_dir: PathBuf,
    /// Output directory for checkpoints, logs, and search artifacts
    pub output_dir: PathBuf,
    /// Optional pretrained backbone weights
    pub pretrained_backbone: Option<PathBuf>,

    /// Input image size
    pub image_size: usize,
    /// Backbone width multiplier
    pub base_filters: usize,
    /// Batch size for every stage
    pub batch_size: usize,
    /// Seed for splitting, shuffling, and search
    pub seed: u64,
    /// Fβ beta for validation and test metrics
    pub beta: f64,
    /// Decision threshold
    pub threshold: f64,

    /// Fraction of data held out for the final test
    pub test_fraction: f64,
    /// Fraction of data used for validation
    pub validation_fraction: f64,

    /// Epoch cap for the feature-extraction stage
    pub feat_extract_epochs: usize,
    /// Learning rate for the feature-extraction stage
    pub feat_extract_lr: f64,
    /// Early-stop patience for both fixed stages
    pub early_stop_patience: usize,

    /// Epoch cap for the default fine-tuning stage and each search trial
    pub fine_tune_epochs: usize,
    /// Default fine-tuning learning rate (before the search)
    pub fine_tune_lr: f64,
    /// Default frozen-layer cutoff (before the search)
    pub default_cutoff: usize,
    /// Default head dropout rate
    pub default_dropout: f64,

    /// Number of search trials
    pub search_trials: usize,
    /// Trainings averaged per trial
    pub executions_per_trial: usize,
    /// Early-stop patience inside each trial; high on purpose so trials
    /// are not cut off at a local dip
    pub search_patience: usize,

    /// Patience for the best-epoch estimation run; high on purpose
    pub best_epoch_patience: usize,
    /// Epoch cap for the best-epoch estimation run
    pub best_epoch_max_epochs: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            output_dir: PathBuf::from("output"),
            pretrained_backbone: None,
            image_size: IMAGE_SIZE,
            base_filters: 32,
            batch_size: 32,
            seed: 42,
            beta: DEFAULT_BETA,
            threshold: DEFAULT_THRESHOLD,
            test_fraction: 0.15,
            validation_fraction: 0.15,
            feat_extract_epochs: 30,
            feat_extract_lr: 1e-3,
            early_stop_patience: 5,
            fine_tune_epochs: 30,
            fine_tune_lr: 1e-4,
            default_cutoff: 600,
            default_dropout: 0.3,
            search_trials: 20,
            executions_per_trial: 1,
            search_patience: 10,
            best_epoch_patience: 10,
            best_epoch_max_epochs: 60,
        }
    }
}

impl PipelineConfig {
    /// Validate the configuration before running
    pub fn validate(&self) -> Result<()> {
        SplitConfig::new(self.test_fraction, self.validation_fraction, self.seed)?;
        BackboneConfig::new()
            .with_input_size(self.image_size)
            .with_base_filters(self.base_filters)
            .validate()?;
        if self.batch_size == 0 {
            return Err(CultureError::Config(
                "Batch size must be positive".to_string(),
            ));
        }
        if self.search_trials == 0 || self.executions_per_trial == 0 {
            return Err(CultureError::Config(
                "Search trials and executions per trial must be positive".to_string(),
            ));
        }
        if !(0.0..1.0).contains(&self.default_dropout) {
            return Err(CultureError::Config(
                "Default dropout must be in [0.0, 1.0)".to_string(),
            ));
        }
        Ok(())
    }

    /// Save the configuration as JSON
    pub fn save(&self, path: &std::path::Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| CultureError::Serialization(e.to_string()))?;
        fs::write(path, json)?;
        Ok(())
    }

    /// Load a configuration from JSON
    pub fn load(path: &std::path::Path) -> Result<Self> {
        let json = fs::read_to_string(path)?;
        let config: Self =
            serde_json::from_str(&json).map_err(|e| CultureError::Serialization(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn stage_config(&self, name: &str, max_epochs: usize, learning_rate: f64) -> StageConfig {
        StageConfig {
            name: name.to_string(),
            max_epochs,
            batch_size: self.batch_size,
            learning_rate,
            seed: self.seed,
            beta: self.beta,
            threshold: self.threshold,
            image_size: self.image_size,
            ..StageConfig::default()
        }
    }
}

/// Run the full staged pipeline and return the final test report
pub fn run_pipeline<B: AutodiffBackend>(
    config: &PipelineConfig,
    device: &B::Device,
) -> Result<EvalReport> {
    config.validate()?;
    fs::create_dir_all(&config.output_dir)?;
    config.save(&config.output_dir.join("pipeline_config.json"))?;

    // ── Data ────────────────────────────────────────────────────────────
    println!("\n{}", "═══ Loading dataset ═══".cyan().bold());
    let dataset = CultureDataset::new(&config.data_dir)?;
    dataset.get_stats().print();

    let split_config = SplitConfig::new(
        config.test_fraction,
        config.validation_fraction,
        config.seed,
    )?;
    let splits = DatasetSplits::from_samples(dataset.samples.clone(), split_config)?;
    splits.save(&config.output_dir.join("splits.json"))?;
    println!("{}", splits.stats());

    let class_weights = ClassWeights::estimate(splits.train_set.iter().map(|s| s.label))?;

    let train_set = CultureImageDataset::from_samples(&splits.train_set, config.image_size);
    let val_set = CultureImageDataset::from_samples(&splits.validation_set, config.image_size);
    let test_set = CultureImageDataset::from_samples(&splits.test_set, config.image_size);

    // ── Stage 1: feature extraction ─────────────────────────────────────
    println!(
        "\n{}",
        "═══ Stage 1: feature extraction (frozen backbone) ═══"
            .cyan()
            .bold()
    );
    let mut builder = StagedModelBuilder::new(
        BackboneConfig::new()
            .with_input_size(config.image_size)
            .with_base_filters(config.base_filters),
    )
    .with_dropout(config.default_dropout);
    if let Some(path) = &config.pretrained_backbone {
        builder = builder.with_pretrained(path.clone());
    }

    let stage1_model = builder.build_feature_extractor::<B>(device)?;
    let stage1_policy = CallbackPolicy::default()
        .push(Callback::EarlyStop {
            monitor: Monitor::ValLoss,
            patience: config.early_stop_patience,
        })
        .push(Callback::Checkpoint {
            path: config.output_dir.join("feat_extractor_checkpoint.mpk"),
            monitor: Monitor::ValLoss,
            save_best_only: true,
        })
        .push(Callback::CsvLog {
            path: config.output_dir.join("training_log.csv"),
        })
        .push(Callback::Observability {
            log_dir: config.output_dir.join("logs").join("feat_extract"),
        });

    let runner = TrainingStageRunner::new(config.stage_config(
        "feat_extract",
        config.feat_extract_epochs,
        config.feat_extract_lr,
    ));
    let (stage1_model, stage1_history) = runner.run(
        stage1_model,
        &train_set,
        &val_set,
        &class_weights,
        stage1_policy,
        device,
    )?;
    info!(
        "Feature extraction done: best val_loss {:.4}",
        stage1_history.best_val_loss()?
    );

    // The stage-1 head's weights carry into every fine-tuning run.
    let (backbone, head) = stage1_model.into_parts();

    // ── Stage 2: fine-tuning with defaults ──────────────────────────────
    println!(
        "\n{}",
        "═══ Stage 2: fine-tuning (default configuration) ═══"
            .cyan()
            .bold()
    );
    let stage2_model = builder.build_fine_tune(
        backbone.clone(),
        head.clone(),
        config.default_cutoff,
        config.default_dropout,
    );
    let stage2_policy = CallbackPolicy::default()
        .push(Callback::EarlyStop {
            monitor: Monitor::ValLoss,
            patience: config.early_stop_patience,
        })
        .push(Callback::Checkpoint {
            path: config.output_dir.join("fine_tune_checkpoint.mpk"),
            monitor: Monitor::ValLoss,
            save_best_only: true,
        })
        .push(Callback::CsvLog {
            path: config.output_dir.join("training_log.csv"),
        })
        .push(Callback::Observability {
            log_dir: config.output_dir.join("logs").join("fine_tune"),
        });

    let runner = TrainingStageRunner::new(config.stage_config(
        "fine_tune",
        config.fine_tune_epochs,
        config.fine_tune_lr,
    ));
    let (_, stage2_history) = runner.run(
        stage2_model,
        &train_set,
        &val_set,
        &class_weights,
        stage2_policy,
        device,
    )?;
    info!(
        "Default fine-tune done: best val_loss {:.4}",
        stage2_history.best_val_loss()?
    );

    // ── Stage 3: hyperparameter search ──────────────────────────────────
    println!(
        "\n{}",
        format!(
            "═══ Stage 3: hyperparameter search ({} trials) ═══",
            config.search_trials
        )
        .cyan()
        .bold()
    );
    let space = SearchSpace::default();
    let mut strategy = TpeSampler::default();
    let mut controller =
        SearchController::new(config.output_dir.join("hyperparam_search"), config.seed);

    controller.search(
        &space,
        &mut strategy,
        config.search_trials,
        config.executions_per_trial,
        |id, execution, point| {
            let model = builder.build_fine_tune(
                backbone.clone(),
                head.clone(),
                point.frozen_layer_cutoff,
                point.dropout_rate,
            );
            // each execution of a trial shuffles and augments under its
            // own seed
            let mut stage = config.stage_config(
                &format!("trial_{}", id),
                config.fine_tune_epochs,
                point.learning_rate,
            );
            stage.seed = config.seed.wrapping_add(execution as u64);
            let runner = TrainingStageRunner::new(stage);
            let policy = CallbackPolicy::default().push(Callback::EarlyStop {
                monitor: Monitor::ValLoss,
                patience: config.search_patience,
            });
            let (_, history) =
                runner.run(model, &train_set, &val_set, &class_weights, policy, device)?;
            history.best_val_loss()
        },
    )?;

    let best = controller
        .best_trial()
        .ok_or_else(|| CultureError::Search("Search produced no trials".to_string()))?;
    let best_point = best.point.clone();
    println!(
        "{} lr={:.2e} dropout={:.1} cutoff={} (val_loss {:.4})",
        "Best configuration:".green().bold(),
        best_point.learning_rate,
        best_point.dropout_rate,
        best_point.frozen_layer_cutoff,
        best.objective
    );

    // ── Stage 4: best-epoch estimation ──────────────────────────────────
    println!("\n{}", "═══ Stage 4: best-epoch estimation ═══".cyan().bold());
    let estimator = BestEpochEstimator::new(config.best_epoch_patience, config.best_epoch_max_epochs);
    let fine_tune_base =
        config.stage_config("best_epoch", config.best_epoch_max_epochs, best_point.learning_rate);
    let (best_epoch, _) = estimator.estimate(
        &builder,
        backbone.clone(),
        head.clone(),
        &best_point,
        &train_set,
        &val_set,
        &class_weights,
        &fine_tune_base,
        device,
    )?;
    info!("Estimated best epoch: {}", best_epoch);

    // ── Stage 5: final refit on pooled data ─────────────────────────────
    println!(
        "\n{}",
        format!(
            "═══ Stage 5: final refit ({} epochs on pooled data) ═══",
            FinalRefitController::refit_epochs(best_epoch)
        )
        .cyan()
        .bold()
    );
    let pooled = CombinedDataset::new(&splits.train_set, &splits.validation_set, config.image_size);
    let pooled_weights = ClassWeights::estimate(pooled.labels())?;

    let final_model = builder.build_fine_tune(
        backbone,
        head,
        best_point.frozen_layer_cutoff,
        best_point.dropout_rate,
    );
    let refit_controller = FinalRefitController::new(config.stage_config(
        "refit",
        config.fine_tune_epochs,
        best_point.learning_rate,
    ));
    let (final_model, _) =
        refit_controller.refit(final_model, &pooled, best_epoch, &pooled_weights, device)?;
    final_model.save(&config.output_dir.join("final_model.mpk"))?;

    // ── Final evaluation on the held-out test split ─────────────────────
    println!("\n{}", "═══ Held-out test evaluation ═══".cyan().bold());
    let report = refit_controller.evaluate_test(&final_model, &test_set, device)?;
    report.save(&config.output_dir.join("test_report.json"))?;
    println!("{}", report);

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(PipelineConfig::default().validate().is_ok());
    }

    #[test]
    fn test_invalid_fractions_rejected() {
        let config = PipelineConfig {
            test_fraction: 0.6,
            validation_fraction: 0.5,
            ..PipelineConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_undersized_image_rejected() {
        let config = PipelineConfig {
            image_size: 8,
            ..PipelineConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_trials_rejected() {
        let config = PipelineConfig {
            search_trials: 0,
            ..PipelineConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_round_trips_through_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipeline_config.json");

        let config = PipelineConfig {
            search_trials: 7,
            default_cutoff: 450,
            ..PipelineConfig::default()
        };
        config.save(&path).unwrap();

        let loaded = PipelineConfig::load(&path).unwrap();
        assert_eq!(loaded.search_trials, 7);
        assert_eq!(loaded.default_cutoff, 450);
        assert_eq!(loaded.seed, config.seed);
    }
}
