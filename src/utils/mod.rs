//! Utility modules for error handling, logging, and metrics

pub mod error;
pub mod logging;
pub mod metrics;

pub use error::{CultureError, Result};
pub use logging::{format_duration, init_logging, LogConfig, LogLevel, StageLogger};
pub use metrics::{roc_auc, EvalReport, StreamingFBeta};
