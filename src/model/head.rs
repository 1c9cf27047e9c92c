//! Classification Head
//!
//! The single-logit head stacked on top of the backbone. The head trained
//! during the feature-extraction stage is carried into every fine-tuning
//! run unchanged.

use burn::{
    config::Config,
    module::Module,
    nn::{Dropout, DropoutConfig, Linear, LinearConfig, Relu},
    tensor::{backend::Backend, Tensor},
};

/// Configuration for the classification head
#[derive(Config, Debug)]
pub struct HeadConfig {
    /// Input feature dimension (backbone output)
    pub feature_dim: usize,

    /// Hidden layer width
    #[config(default = "128")]
    pub hidden_dim: usize,

    /// Dropout rate for regularization
    #[config(default = "0.3")]
    pub dropout_rate: f64,
}

/// Single-logit classification head: fc -> ReLU -> dropout -> fc
#[derive(Module, Debug)]
pub struct CultureHead<B: Backend> {
    pub fc1: Linear<B>,
    pub dropout: Dropout,
    pub fc2: Linear<B>,
}

impl<B: Backend> CultureHead<B> {
    /// Create a new head from configuration
    pub fn new(config: &HeadConfig, device: &B::Device) -> Self {
        let fc1 = LinearConfig::new(config.feature_dim, config.hidden_dim).init(device);
        let dropout = DropoutConfig::new(config.dropout_rate).init();
        let fc2 = LinearConfig::new(config.hidden_dim, 1).init(device);

        Self { fc1, dropout, fc2 }
    }

    /// Replace the dropout probability, leaving the learned weights
    /// untouched. Used when a searched dropout rate is applied to the
    /// stage-1 head.
    pub fn with_dropout_rate(mut self, rate: f64) -> Self {
        self.dropout = DropoutConfig::new(rate).init();
        self
    }

    /// Forward pass: features [batch_size, feature_dim] -> logits [batch_size]
    pub fn forward(&self, features: Tensor<B, 2>) -> Tensor<B, 1> {
        let x = self.fc1.forward(features);
        let x = Relu::new().forward(x);
        let x = self.dropout.forward(x);
        let x = self.fc2.forward(x);

        let [batch_size, _] = x.dims();
        x.reshape([batch_size])
    }
}
