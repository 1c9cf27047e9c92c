//! Training Stage Runner
//!
//! Runs one fit cycle with a manual Burn training loop: seeded per-epoch
//! shuffling, on-demand batching, class-weighted binary cross-entropy, a
//! validation pass on the inner backend, and the per-epoch callback policy.
//! After the run the best checkpoint (if one was configured) is loaded
//! back, so the returned model is the best-seen, not the last-seen.

use burn::{
    data::dataloader::batcher::Batcher,
    data::dataset::Dataset,
    module::AutodiffModule,
    optim::{AdamConfig, GradientsParams, Optimizer},
    tensor::backend::{AutodiffBackend, Backend},
    tensor::{ElementConversion, Tensor},
};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::dataset::augmentation::{AugmentConfig, Augmenter};
use crate::dataset::burn_dataset::{CultureBatcher, CultureItem};
use crate::model::builder::CultureClassifier;
use crate::training::callbacks::{CallbackPolicy, CallbackRuntime};
use crate::training::class_weights::ClassWeights;
use crate::training::history::{EpochRecord, TrainingHistory};
use crate::utils::error::Result;
use crate::utils::logging::StageLogger;
use crate::utils::metrics::{EvalReport, StreamingFBeta};
use crate::{DEFAULT_BETA, DEFAULT_THRESHOLD, IMAGE_SIZE};

/// Configuration for one training stage
#[derive(Debug, Clone)]
pub struct StageConfig {
    /// Stage name, used in logs and observability paths
    pub name: String,
    /// Upper bound on epochs (early stopping may end the run sooner)
    pub max_epochs: usize,
    /// Batch size
    pub batch_size: usize,
    /// Adam learning rate
    pub learning_rate: f64,
    /// L2 weight decay
    pub weight_decay: f32,
    /// Seed for epoch shuffling and augmentation
    pub seed: u64,
    /// Fβ beta
    pub beta: f64,
    /// Decision threshold for accuracy and Fβ
    pub threshold: f64,
    /// Input image size
    pub image_size: usize,
    /// Training-time augmentation
    pub augment: AugmentConfig,
}

impl Default for StageConfig {
    fn default() -> Self {
        Self {
            name: "stage".to_string(),
            max_epochs: 30,
            batch_size: 32,
            learning_rate: 1e-3,
            weight_decay: 1e-4,
            seed: 42,
            beta: DEFAULT_BETA,
            threshold: DEFAULT_THRESHOLD,
            image_size: IMAGE_SIZE,
            augment: AugmentConfig::default(),
        }
    }
}

impl StageConfig {
    /// Preset for the frozen-backbone feature-extraction stage
    pub fn feature_extraction() -> Self {
        Self {
            name: "feat_extract".to_string(),
            learning_rate: 1e-3,
            ..Self::default()
        }
    }

    /// Preset for the fine-tuning stage at the given learning rate
    pub fn fine_tune(learning_rate: f64) -> Self {
        Self {
            name: "fine_tune".to_string(),
            learning_rate,
            ..Self::default()
        }
    }
}

/// Runs one training stage to completion
#[derive(Debug, Clone)]
pub struct TrainingStageRunner {
    config: StageConfig,
}

impl TrainingStageRunner {
    pub fn new(config: StageConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &StageConfig {
        &self.config
    }

    /// Run the stage: train on `train`, validate on `val`, apply the
    /// callback policy each epoch. Returns the trained model (restored to
    /// its best checkpoint when one was configured) and the history.
    pub fn run<B, DT, DV>(
        &self,
        mut model: CultureClassifier<B>,
        train: &DT,
        val: &DV,
        class_weights: &ClassWeights,
        policy: CallbackPolicy,
        device: &B::Device,
    ) -> Result<(CultureClassifier<B>, TrainingHistory)>
    where
        B: AutodiffBackend,
        DT: Dataset<CultureItem>,
        DV: Dataset<CultureItem>,
    {
        let has_validation = val.len() > 0;
        policy.validate(has_validation)?;

        let checkpoint_path = policy.checkpoint_path().map(|p| p.to_path_buf());
        let mut runtime = CallbackRuntime::new(policy)?;

        let batcher = CultureBatcher::with_image_size(self.config.image_size);
        let augmenter = Augmenter::new(self.config.augment.clone(), self.config.image_size);
        let mut optimizer = AdamConfig::new()
            .with_weight_decay(Some(burn::optim::decay::WeightDecayConfig::new(
                self.config.weight_decay,
            )))
            .init();

        let mut epoch_rng = ChaCha8Rng::seed_from_u64(self.config.seed);
        let mut fbeta = StreamingFBeta::new(self.config.beta, self.config.threshold);
        let mut history = TrainingHistory::new();
        let mut logger = StageLogger::new(&self.config.name, self.config.max_epochs);

        let mut epochs_run = 0;
        for epoch in 1..=self.config.max_epochs {
            logger.start_epoch(epoch - 1);
            epochs_run = epoch;

            // Training phase: shuffled indices, batches built on demand
            let mut indices: Vec<usize> = (0..train.len()).collect();
            indices.shuffle(&mut epoch_rng);
            let mut aug_rng = ChaCha8Rng::seed_from_u64(
                self.config.seed.wrapping_add(epoch as u64),
            );

            let mut epoch_loss = 0.0f64;
            let mut num_batches = 0usize;

            for chunk in indices.chunks(self.config.batch_size) {
                let mut items: Vec<CultureItem> =
                    chunk.iter().filter_map(|&i| train.get(i)).collect();
                if items.is_empty() {
                    continue;
                }
                for item in items.iter_mut() {
                    augmenter.apply(item, &mut aug_rng);
                }

                let batch = batcher.batch(items, device);
                let targets = batch.targets.clone().float();

                let logits = model.forward(batch.images);
                let losses = bce_with_logits(logits, targets.clone());
                let weights = targets
                    .mul_scalar((class_weights.positive - class_weights.negative) as f32)
                    .add_scalar(class_weights.negative as f32);
                let loss =
                    (losses * weights.clone()).sum() / weights.sum().add_scalar(1e-7f32);

                epoch_loss += loss.clone().into_scalar().elem::<f32>() as f64;
                num_batches += 1;

                let grads = loss.backward();
                let grads = GradientsParams::from_grads(grads, &model);
                model = optimizer.step(self.config.learning_rate, model, grads);
            }

            let train_loss = epoch_loss / num_batches.max(1) as f64;

            // Validation phase on the inner backend
            let record = if has_validation {
                fbeta.reset();
                let (val_loss, val_accuracy) =
                    self.validate(&model, val, &batcher, &mut fbeta);
                EpochRecord {
                    epoch,
                    train_loss,
                    val_loss: Some(val_loss),
                    val_accuracy: Some(val_accuracy),
                    val_fbeta: Some(fbeta.result()),
                }
            } else {
                EpochRecord {
                    epoch,
                    train_loss,
                    val_loss: None,
                    val_accuracy: None,
                    val_fbeta: None,
                }
            };

            logger.end_epoch(record.train_loss, record.val_loss, record.val_fbeta);

            let outcome = runtime.on_epoch(&record, |path| model.save(path))?;
            if outcome.improved {
                if let Some(loss) = record.val_loss {
                    logger.log_new_best("val_loss", loss);
                }
            }
            history.push(record);

            if outcome.stop {
                logger.log_early_stop(epoch);
                break;
            }
        }

        logger.log_complete(epochs_run);

        // Restoration via checkpoint selection: the best weights win, not
        // the last ones.
        if let Some(path) = checkpoint_path {
            if path.exists() {
                model = model.load(&path, device)?;
            }
        }

        Ok((model, history))
    }

    fn validate<B, DV>(
        &self,
        model: &CultureClassifier<B>,
        val: &DV,
        batcher: &CultureBatcher,
        fbeta: &mut StreamingFBeta,
    ) -> (f64, f64)
    where
        B: AutodiffBackend,
        DV: Dataset<CultureItem>,
    {
        let inner_device = <B::InnerBackend as Backend>::Device::default();
        let inner_model = model.valid();

        let mut loss_sum = 0.0f64;
        let mut correct = 0usize;
        let mut total = 0usize;

        for start in (0..val.len()).step_by(self.config.batch_size) {
            let end = (start + self.config.batch_size).min(val.len());
            let items: Vec<_> = (start..end).filter_map(|i| val.get(i)).collect();
            if items.is_empty() {
                continue;
            }

            let batch = batcher.batch(items, &inner_device);
            let targets = batch.targets.clone().float();
            let logits = inner_model.forward(batch.images);

            let losses = bce_with_logits(logits.clone(), targets);
            loss_sum += losses.sum().into_scalar().elem::<f32>() as f64;

            let scores: Vec<f32> = burn::tensor::activation::sigmoid(logits)
                .into_data()
                .to_vec()
                .unwrap();
            let labels: Vec<usize> = batch
                .targets
                .into_data()
                .to_vec::<i64>()
                .unwrap()
                .into_iter()
                .map(|l| l as usize)
                .collect();

            // batches feed the metric in yielded order
            fbeta.update(&labels, &scores);

            correct += labels
                .iter()
                .zip(scores.iter())
                .filter(|(&label, &score)| {
                    (f64::from(score) >= self.config.threshold) == (label == 1)
                })
                .count();
            total += labels.len();
        }

        let val_loss = loss_sum / total.max(1) as f64;
        let val_accuracy = correct as f64 / total.max(1) as f64;
        (val_loss, val_accuracy)
    }
}

/// Numerically stable per-example binary cross-entropy with logits:
/// max(x, 0) - x*y + ln(1 + exp(-|x|))
pub fn bce_with_logits<B: Backend>(logits: Tensor<B, 1>, targets: Tensor<B, 1>) -> Tensor<B, 1> {
    let zeros = logits.zeros_like();
    let max_part = logits.clone().max_pair(zeros);
    let log_part = logits.clone().abs().neg().exp().add_scalar(1.0f32).log();
    max_part - logits * targets + log_part
}

/// Evaluate a model against a dataset, returning the full report
pub fn evaluate<B, D>(
    model: &CultureClassifier<B>,
    data: &D,
    batch_size: usize,
    image_size: usize,
    beta: f64,
    threshold: f64,
    device: &B::Device,
) -> Result<EvalReport>
where
    B: Backend,
    D: Dataset<CultureItem>,
{
    let batcher = CultureBatcher::with_image_size(image_size);
    let mut truth = Vec::new();
    let mut scores = Vec::new();
    let mut loss_sum = 0.0f64;

    for start in (0..data.len()).step_by(batch_size) {
        let end = (start + batch_size).min(data.len());
        let items: Vec<_> = (start..end).filter_map(|i| data.get(i)).collect();
        if items.is_empty() {
            continue;
        }

        let batch = batcher.batch(items, device);
        let targets = batch.targets.clone().float();
        let logits = model.forward(batch.images);

        let losses = bce_with_logits(logits.clone(), targets);
        loss_sum += losses.sum().into_scalar().elem::<f32>() as f64;

        let batch_scores: Vec<f32> = burn::tensor::activation::sigmoid(logits)
            .into_data()
            .to_vec()
            .unwrap();
        let batch_labels: Vec<i64> = batch.targets.into_data().to_vec().unwrap();

        scores.extend(batch_scores);
        truth.extend(batch_labels.into_iter().map(|l| l as usize));
    }

    let loss = loss_sum / truth.len().max(1) as f64;
    Ok(EvalReport::from_scores(&truth, &scores, loss, beta, threshold))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::TrainingBackend;
    use crate::model::backbone::BackboneConfig;
    use crate::model::builder::StagedModelBuilder;
    use crate::training::callbacks::{Callback, Monitor};
    use burn::data::dataset::InMemDataset;

    fn tiny_items(count: usize, size: usize) -> Vec<CultureItem> {
        (0..count)
            .map(|i| {
                let label = i % 2;
                let fill = if label == 1 { 0.8 } else { 0.2 };
                CultureItem::from_data(
                    vec![fill; 3 * size * size],
                    label,
                    format!("plate_{}.jpg", i),
                )
            })
            .collect()
    }

    fn tiny_config(size: usize) -> StageConfig {
        StageConfig {
            name: "test".to_string(),
            max_epochs: 2,
            batch_size: 4,
            image_size: size,
            augment: AugmentConfig::disabled(),
            ..StageConfig::default()
        }
    }

    #[test]
    fn test_run_records_one_entry_per_epoch() {
        let size = 16;
        let device = Default::default();
        let builder = StagedModelBuilder::new(
            BackboneConfig::new().with_input_size(size).with_base_filters(4),
        );
        let model = builder
            .build_feature_extractor::<TrainingBackend>(&device)
            .unwrap();

        let train = InMemDataset::new(tiny_items(8, size));
        let val = InMemDataset::new(tiny_items(4, size));

        let runner = TrainingStageRunner::new(tiny_config(size));
        let (_, history) = runner
            .run(
                model,
                &train,
                &val,
                &ClassWeights::balanced(),
                CallbackPolicy::default(),
                &device,
            )
            .unwrap();

        assert_eq!(history.len(), 2);
        let record = &history.records()[0];
        assert!(record.val_loss.is_some());
        assert!(record.val_fbeta.is_some());
        assert!(record.train_loss.is_finite());
    }

    #[test]
    fn test_monitored_policy_requires_validation() {
        let size = 16;
        let device = Default::default();
        let builder = StagedModelBuilder::new(
            BackboneConfig::new().with_input_size(size).with_base_filters(4),
        );
        let model = builder
            .build_feature_extractor::<TrainingBackend>(&device)
            .unwrap();

        let train = InMemDataset::new(tiny_items(8, size));
        let val = InMemDataset::new(Vec::new());
        let policy = CallbackPolicy::default().push(Callback::EarlyStop {
            monitor: Monitor::ValLoss,
            patience: 3,
        });

        let runner = TrainingStageRunner::new(tiny_config(size));
        let result = runner.run(
            model,
            &train,
            &val,
            &ClassWeights::balanced(),
            policy,
            &device,
        );

        assert!(matches!(
            result,
            Err(crate::CultureError::NoValidationSignal(_))
        ));
    }

    #[test]
    fn test_bce_with_logits_known_values() {
        use crate::backend::DefaultBackend;

        let device = Default::default();
        // logit 0 with either label gives ln(2)
        let logits = Tensor::<DefaultBackend, 1>::from_floats([0.0, 0.0], &device);
        let targets = Tensor::<DefaultBackend, 1>::from_floats([0.0, 1.0], &device);

        let losses: Vec<f32> = bce_with_logits(logits, targets)
            .into_data()
            .to_vec()
            .unwrap();

        for loss in losses {
            assert!((loss - std::f32::consts::LN_2).abs() < 1e-6);
        }
    }

    #[test]
    fn test_bce_with_logits_extreme_logits_are_finite() {
        use crate::backend::DefaultBackend;

        let device = Default::default();
        let logits = Tensor::<DefaultBackend, 1>::from_floats([80.0, -80.0], &device);
        let targets = Tensor::<DefaultBackend, 1>::from_floats([1.0, 0.0], &device);

        let losses: Vec<f32> = bce_with_logits(logits, targets)
            .into_data()
            .to_vec()
            .unwrap();

        // confident correct predictions: loss near zero, never NaN/inf
        for loss in losses {
            assert!(loss.is_finite());
            assert!(loss < 1e-3);
        }
    }

    #[test]
    fn test_evaluate_produces_full_report() {
        let size = 16;
        let device = Default::default();
        let builder = StagedModelBuilder::new(
            BackboneConfig::new().with_input_size(size).with_base_filters(4),
        );
        let model = builder
            .build_feature_extractor::<TrainingBackend>(&device)
            .unwrap();
        let inner_model = model.valid();
        let inner_device = Default::default();

        let data = InMemDataset::new(tiny_items(6, size));
        let report = evaluate(&inner_model, &data, 4, size, 1.0, 0.5, &inner_device).unwrap();

        assert_eq!(report.samples, 6);
        assert!(report.loss.is_finite());
        assert!((0.0..=1.0).contains(&report.accuracy));
        assert!((0.0..=1.0).contains(&report.auc));
    }
}
