//! Staged Model Construction
//!
//! `StagedModelBuilder` assembles the classifier for each training stage:
//! a fully frozen backbone with a fresh head for feature extraction, and a
//! partially unfrozen backbone with the stage-1 head for fine-tuning. The
//! head is always passed in by value, so its ownership moves explicitly
//! from one stage to the next.

use std::path::{Path, PathBuf};

use burn::{
    module::Module,
    record::{CompactRecorder, Recorder},
    tensor::backend::{AutodiffBackend, Backend},
    tensor::{activation, Tensor},
};

use crate::model::backbone::{BackboneConfig, CultureBackbone};
use crate::model::freeze::{FreezePlan, Freezer};
use crate::model::head::{CultureHead, HeadConfig};
use crate::utils::error::{CultureError, Result};

/// The full classifier: backbone features plus single-logit head
#[derive(Module, Debug)]
pub struct CultureClassifier<B: Backend> {
    pub backbone: CultureBackbone<B>,
    pub head: CultureHead<B>,
}

impl<B: Backend> CultureClassifier<B> {
    /// Forward pass: images [batch, 3, H, W] -> logits [batch]
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 1> {
        let features = self.backbone.forward(images);
        self.head.forward(features)
    }

    /// Forward pass producing positive-class probabilities in [0, 1]
    pub fn score(&self, images: Tensor<B, 4>) -> Tensor<B, 1> {
        activation::sigmoid(self.forward(images))
    }

    /// Split the classifier back into backbone and head
    pub fn into_parts(self) -> (CultureBackbone<B>, CultureHead<B>) {
        (self.backbone, self.head)
    }

    /// Save the full classifier to a checkpoint file
    pub fn save(&self, path: &Path) -> Result<()> {
        let recorder = CompactRecorder::new();
        recorder
            .record(self.clone().into_record(), path.to_path_buf())
            .map_err(|e| CultureError::Model(format!("Failed to save checkpoint: {}", e)))?;
        Ok(())
    }

    /// Load classifier weights from a checkpoint file, consuming this
    /// classifier as the architecture template
    pub fn load(self, path: &Path, device: &B::Device) -> Result<Self> {
        let recorder = CompactRecorder::new();
        let record = recorder
            .load(path.to_path_buf(), device)
            .map_err(|e| CultureError::Model(format!("Failed to load checkpoint: {}", e)))?;
        Ok(self.load_record(record))
    }
}

/// Builder for the two stage-specific classifier variants
#[derive(Debug, Clone)]
pub struct StagedModelBuilder {
    backbone_config: BackboneConfig,
    hidden_dim: usize,
    dropout_rate: f64,
    pretrained_path: Option<PathBuf>,
}

impl StagedModelBuilder {
    pub fn new(backbone_config: BackboneConfig) -> Self {
        Self {
            backbone_config,
            hidden_dim: 128,
            dropout_rate: 0.3,
            pretrained_path: None,
        }
    }

    /// Use pretrained backbone weights from a file
    pub fn with_pretrained(mut self, path: PathBuf) -> Self {
        self.pretrained_path = Some(path);
        self
    }

    /// Set the head's hidden width
    pub fn with_hidden_dim(mut self, hidden_dim: usize) -> Self {
        self.hidden_dim = hidden_dim;
        self
    }

    /// Set the head's dropout rate
    pub fn with_dropout(mut self, dropout_rate: f64) -> Self {
        self.dropout_rate = dropout_rate;
        self
    }

    fn head_config(&self, feature_dim: usize) -> HeadConfig {
        HeadConfig::new(feature_dim)
            .with_hidden_dim(self.hidden_dim)
            .with_dropout_rate(self.dropout_rate)
    }

    /// Build the feature-extraction variant: the whole backbone frozen,
    /// a freshly initialized head on top.
    pub fn build_feature_extractor<B: AutodiffBackend>(
        &self,
        device: &B::Device,
    ) -> Result<CultureClassifier<B>> {
        self.backbone_config.validate()?;
        let mut backbone = CultureBackbone::<B>::new(&self.backbone_config, device);
        if let Some(path) = &self.pretrained_path {
            backbone = backbone.load(path, device)?;
        }

        let head = CultureHead::new(&self.head_config(backbone.feature_dim()), device);
        let backbone = apply_freeze(backbone, FreezePlan::freeze_all());

        Ok(CultureClassifier { backbone, head })
    }

    /// Build the fine-tuning variant: layers below the cutoff (and all
    /// normalization layers) frozen, the given stage-1 head attached with
    /// its trained weights intact. Only the head's dropout probability is
    /// replaced by the requested rate.
    pub fn build_fine_tune<B: AutodiffBackend>(
        &self,
        backbone: CultureBackbone<B>,
        head: CultureHead<B>,
        cutoff: usize,
        dropout: f64,
    ) -> CultureClassifier<B> {
        let backbone = apply_freeze(backbone, FreezePlan::new(cutoff));
        let head = head.with_dropout_rate(dropout);
        CultureClassifier { backbone, head }
    }
}

/// Apply a freeze plan to a backbone by clearing gradients on the pinned
/// parameters
fn apply_freeze<B: AutodiffBackend>(
    backbone: CultureBackbone<B>,
    plan: FreezePlan,
) -> CultureBackbone<B> {
    let frozen = plan.frozen_param_ids(&backbone);
    let mut freezer = Freezer::new(frozen);
    backbone.map(&mut freezer)
}
