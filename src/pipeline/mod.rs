//! Staged training pipeline: best-epoch estimation, final refit, and the
//! end-to-end driver tying the stages together.

pub mod best_epoch;
pub mod refit;
pub mod run;

pub use best_epoch::BestEpochEstimator;
pub use refit::FinalRefitController;
pub use run::{run_pipeline, PipelineConfig};
