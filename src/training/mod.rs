//! Training orchestration: class weights, callbacks, history, stage runner

pub mod callbacks;
pub mod class_weights;
pub mod history;
pub mod stage_runner;

pub use callbacks::{Callback, CallbackOutcome, CallbackPolicy, CallbackRuntime, Monitor};
pub use class_weights::ClassWeights;
pub use history::{EpochRecord, TrainingHistory};
pub use stage_runner::{bce_with_logits, evaluate, StageConfig, TrainingStageRunner};
