//! # CultureScreen
//!
//! A Rust library for staged transfer-learning on culture plate images
//! using the Burn framework. Trains a binary classifier that separates
//! culture-positive from culture-negative plates.
//!
//! ## Pipeline
//!
//! 1. **Feature extraction**: the backbone stays frozen while a fresh
//!    classification head is trained on top of it
//! 2. **Fine-tuning**: the upper backbone layers unfreeze and training
//!    continues with the stage-1 head
//! 3. **Hyperparameter search**: a TPE sampler explores learning rate,
//!    dropout, and the frozen-layer cutoff
//! 4. **Best-epoch estimation**: the winner retrains with high patience
//!    to find the ideal epoch count
//! 5. **Final refit**: train and validation pool together for the final
//!    model, evaluated once on the held-out test split
//!
//! ## Modules
//!
//! - `dataset`: Data loading, splitting, augmentation, and Burn integration
//! - `model`: Backbone, classification head, and layer freezing
//! - `training`: Stage runner, callbacks, class weights, and history
//! - `search`: Hyperparameter search space, strategies, and controller
//! - `pipeline`: Best-epoch estimation, final refit, and the end-to-end driver
//! - `utils`: Logging, metrics, and error types
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use culturescreen::backend::TrainingBackend;
//! use culturescreen::pipeline::{run_pipeline, PipelineConfig};
//!
//! let config = PipelineConfig {
//!     data_dir: "data/plates".into(),
//!     output_dir: "output".into(),
//!     ..PipelineConfig::default()
//! };
//! let report = run_pipeline::<TrainingBackend>(&config, &Default::default())?;
//! println!("{}", report);
//! ```

pub mod backend;
pub mod dataset;
pub mod model;
pub mod pipeline;
pub mod search;
pub mod training;
pub mod utils;

// Re-export commonly used items for convenience
pub use dataset::burn_dataset::{
    CombinedDataset, CultureBatch, CultureBatcher, CultureImageDataset, CultureItem,
};
pub use dataset::loader::{CultureDataset, CultureSample, DatasetStats};
pub use dataset::split::{DatasetSplits, SplitConfig};
pub use model::backbone::{BackboneConfig, CultureBackbone, LayerKind};
pub use model::builder::{CultureClassifier, StagedModelBuilder};
pub use model::freeze::FreezePlan;
pub use model::head::{CultureHead, HeadConfig};
pub use pipeline::{run_pipeline, BestEpochEstimator, FinalRefitController, PipelineConfig};
pub use search::controller::{SearchController, SearchState, TrialRecord};
pub use search::space::{HyperPoint, SearchSpace};
pub use search::strategy::{RandomSampler, SearchStrategy, TpeSampler};
pub use training::callbacks::{Callback, CallbackPolicy, Monitor};
pub use training::class_weights::ClassWeights;
pub use training::history::{EpochRecord, TrainingHistory};
pub use training::stage_runner::{StageConfig, TrainingStageRunner};
pub use utils::error::{CultureError, Result};
pub use utils::metrics::{EvalReport, StreamingFBeta};

/// Number of classes (binary classification)
pub const NUM_CLASSES: usize = 2;

/// Label for culture-positive plates
pub const POSITIVE_LABEL: usize = 1;

/// Label for culture-negative plates
pub const NEGATIVE_LABEL: usize = 0;

/// Default input image size
pub const IMAGE_SIZE: usize = 224;

/// Default decision threshold for the positive class
pub const DEFAULT_THRESHOLD: f64 = 0.5;

/// Default Fβ beta (F1)
pub const DEFAULT_BETA: f64 = 1.0;

/// Version of the library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
