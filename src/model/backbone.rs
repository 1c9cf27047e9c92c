//! Convolutional Backbone for Plate Classification
//!
//! Implements the feature-extraction trunk shared by both training stages.
//! The backbone exposes its layer structure (kind and parameter ids per
//! layer) so the freeze plan can pin a prefix of it during fine-tuning.

use burn::{
    config::Config,
    module::{Module, ParamId},
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig, MaxPool2d, MaxPool2dConfig},
        BatchNorm, BatchNormConfig, PaddingConfig2d, Relu,
    },
    record::{CompactRecorder, Recorder},
    tensor::{backend::Backend, Tensor},
};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::utils::error::CultureError;

/// The kind of a backbone layer, used by the freeze plan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LayerKind {
    Convolution,
    Normalization,
    Activation,
    Pooling,
}

/// Configuration for the backbone
#[derive(Config, Debug)]
pub struct BackboneConfig {
    /// Input image size (assumes square images)
    #[config(default = "224")]
    pub input_size: usize,

    /// Number of input channels (3 for RGB)
    #[config(default = "3")]
    pub in_channels: usize,

    /// Base number of convolutional filters
    #[config(default = "32")]
    pub base_filters: usize,
}

impl BackboneConfig {
    /// Smallest input the four 2x2/stride-2 pooling stages can reduce
    pub const MIN_INPUT_SIZE: usize = 16;

    /// Check that the configuration yields a buildable backbone
    pub fn validate(&self) -> crate::utils::error::Result<()> {
        if self.input_size < Self::MIN_INPUT_SIZE {
            return Err(CultureError::Config(format!(
                "Input size {} is too small: four 2x2 pooling stages need at least {}",
                self.input_size,
                Self::MIN_INPUT_SIZE
            )));
        }
        if self.in_channels == 0 || self.base_filters == 0 {
            return Err(CultureError::Config(
                "Channels and base filters must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// A convolutional block: Conv2d, BatchNorm, ReLU, MaxPool
#[derive(Module, Debug)]
pub struct ConvBlock<B: Backend> {
    pub conv: Conv2d<B>,
    pub bn: BatchNorm<B, 2>,
    pub relu: Relu,
    pub pool: MaxPool2d,
}

impl<B: Backend> ConvBlock<B> {
    pub fn new(in_channels: usize, out_channels: usize, device: &B::Device) -> Self {
        let conv = Conv2dConfig::new([in_channels, out_channels], [3, 3])
            .with_padding(PaddingConfig2d::Same)
            .init(device);
        let bn = BatchNormConfig::new(out_channels).init(device);
        let pool = MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init();

        Self {
            conv,
            bn,
            relu: Relu::new(),
            pool,
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.conv.forward(x);
        let x = self.bn.forward(x);
        let x = self.relu.forward(x);
        self.pool.forward(x)
    }

    /// Layer kinds of this block, in forward order
    fn layer_kinds() -> [LayerKind; 4] {
        [
            LayerKind::Convolution,
            LayerKind::Normalization,
            LayerKind::Activation,
            LayerKind::Pooling,
        ]
    }

    /// Parameter ids per layer, parallel to `layer_kinds`
    fn layer_param_ids(&self) -> [Vec<ParamId>; 4] {
        let mut conv_ids = vec![self.conv.weight.id];
        if let Some(bias) = &self.conv.bias {
            conv_ids.push(bias.id);
        }
        let bn_ids = vec![self.bn.gamma.id, self.bn.beta.id];

        [conv_ids, bn_ids, Vec::new(), Vec::new()]
    }
}

/// Feature-extraction backbone.
///
/// Four conv blocks (3 -> 32 -> 64 -> 128 -> 256) followed by global
/// average pooling; outputs a flat feature vector per image.
#[derive(Module, Debug)]
pub struct CultureBackbone<B: Backend> {
    pub conv1: ConvBlock<B>,
    pub conv2: ConvBlock<B>,
    pub conv3: ConvBlock<B>,
    pub conv4: ConvBlock<B>,
    pub global_pool: AdaptiveAvgPool2d,
    feature_dim: usize,
}

impl<B: Backend> CultureBackbone<B> {
    /// Create a new backbone from configuration
    pub fn new(config: &BackboneConfig, device: &B::Device) -> Self {
        let base = config.base_filters;

        let conv1 = ConvBlock::new(config.in_channels, base, device);
        let conv2 = ConvBlock::new(base, base * 2, device);
        let conv3 = ConvBlock::new(base * 2, base * 4, device);
        let conv4 = ConvBlock::new(base * 4, base * 8, device);
        let global_pool = AdaptiveAvgPool2dConfig::new([1, 1]).init();

        Self {
            conv1,
            conv2,
            conv3,
            conv4,
            global_pool,
            feature_dim: base * 8,
        }
    }

    /// Forward pass producing flat features of shape [batch_size, feature_dim]
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = self.conv1.forward(x);
        let x = self.conv2.forward(x);
        let x = self.conv3.forward(x);
        let x = self.conv4.forward(x);

        let x = self.global_pool.forward(x);
        let [batch_size, channels, _, _] = x.dims();
        x.reshape([batch_size, channels])
    }

    /// Output feature dimension
    pub fn feature_dim(&self) -> usize {
        self.feature_dim
    }

    fn blocks(&self) -> [&ConvBlock<B>; 4] {
        [&self.conv1, &self.conv2, &self.conv3, &self.conv4]
    }

    /// Layer kinds for the whole backbone, in forward order
    pub fn layer_kinds(&self) -> Vec<LayerKind> {
        let mut kinds = Vec::new();
        for _ in self.blocks() {
            kinds.extend(ConvBlock::<B>::layer_kinds());
        }
        kinds.push(LayerKind::Pooling); // global average pool
        kinds
    }

    /// Parameter ids per layer, parallel to `layer_kinds`
    pub fn layer_param_ids(&self) -> Vec<Vec<ParamId>> {
        let mut ids = Vec::new();
        for block in self.blocks() {
            ids.extend(block.layer_param_ids());
        }
        ids.push(Vec::new()); // global average pool has no parameters
        ids
    }

    /// Number of layers in the backbone
    pub fn depth(&self) -> usize {
        self.layer_kinds().len()
    }

    /// Save backbone weights to a file
    pub fn save(&self, path: &Path) -> crate::utils::error::Result<()> {
        let recorder = CompactRecorder::new();
        let record = self.clone().into_record();
        recorder
            .record(record, path.to_path_buf())
            .map_err(|e| CultureError::Model(format!("Failed to save backbone: {}", e)))?;
        Ok(())
    }

    /// Load backbone weights from a file, consuming this backbone as the
    /// architecture template
    pub fn load(self, path: &Path, device: &B::Device) -> crate::utils::error::Result<Self> {
        let recorder = CompactRecorder::new();
        let record = recorder
            .load(path.to_path_buf(), device)
            .map_err(|e| CultureError::Model(format!("Failed to load backbone: {}", e)))?;
        Ok(self.load_record(record))
    }
}
