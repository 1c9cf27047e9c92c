//! Logging Module
//!
//! Provides structured logging utilities using the `tracing` crate.
//! Supports various output formats and log levels for debugging and
//! production use.

use tracing::Level;
use tracing_subscriber::FmtSubscriber;

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Minimum log level to display
    pub level: LogLevel,
    /// Whether to include target (module path)
    pub include_target: bool,
    /// Whether to use ANSI colors
    pub ansi_colors: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            include_target: false,
            ansi_colors: true,
        }
    }
}

impl LogConfig {
    /// Create a verbose logging config for debugging
    pub fn verbose() -> Self {
        Self {
            level: LogLevel::Debug,
            include_target: true,
            ansi_colors: true,
        }
    }

    /// Create a quiet logging config (errors only)
    pub fn quiet() -> Self {
        Self {
            level: LogLevel::Error,
            include_target: false,
            ansi_colors: true,
        }
    }
}

/// Log level enum
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Convert to tracing Level
    pub fn to_tracing_level(&self) -> Level {
        match self {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    }

    /// Create from string, defaulting to Info for unknown values
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "trace" => LogLevel::Trace,
            "debug" => LogLevel::Debug,
            "info" => LogLevel::Info,
            "warn" | "warning" => LogLevel::Warn,
            "error" => LogLevel::Error,
            _ => LogLevel::Info,
        }
    }
}

/// Initialize logging with the given configuration
pub fn init_logging(config: &LogConfig) -> std::result::Result<(), String> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(config.level.to_tracing_level())
        .with_ansi(config.ansi_colors)
        .with_target(config.include_target)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| format!("Failed to initialize logging: {}", e))?;

    Ok(())
}

/// Progress logger for one training stage
pub struct StageLogger {
    /// Stage name (e.g. "feat_extract", "fine_tune")
    stage: String,
    /// Current epoch
    epoch: usize,
    /// Maximum epochs for this stage
    max_epochs: usize,
    /// Epoch start time
    epoch_start: std::time::Instant,
    /// Stage start time
    stage_start: std::time::Instant,
}

impl StageLogger {
    /// Create a new stage logger
    pub fn new(stage: &str, max_epochs: usize) -> Self {
        Self {
            stage: stage.to_string(),
            epoch: 0,
            max_epochs,
            epoch_start: std::time::Instant::now(),
            stage_start: std::time::Instant::now(),
        }
    }

    /// Log start of an epoch
    pub fn start_epoch(&mut self, epoch: usize) {
        self.epoch = epoch;
        self.epoch_start = std::time::Instant::now();

        tracing::debug!("[{}] epoch {}/{} started", self.stage, epoch + 1, self.max_epochs);
    }

    /// Log end of an epoch with metrics
    pub fn end_epoch(&self, train_loss: f64, val_loss: Option<f64>, val_fbeta: Option<f64>) {
        let epoch_time = self.epoch_start.elapsed();

        match (val_loss, val_fbeta) {
            (Some(vl), Some(fb)) => tracing::info!(
                "[{}] epoch {}/{} ({:.1}s) | loss {:.4} | val_loss {:.4} | val_fbeta {:.4}",
                self.stage,
                self.epoch + 1,
                self.max_epochs,
                epoch_time.as_secs_f64(),
                train_loss,
                vl,
                fb
            ),
            _ => tracing::info!(
                "[{}] epoch {}/{} ({:.1}s) | loss {:.4}",
                self.stage,
                self.epoch + 1,
                self.max_epochs,
                epoch_time.as_secs_f64(),
                train_loss
            ),
        }
    }

    /// Log a new best monitored value
    pub fn log_new_best(&self, monitor: &str, value: f64) {
        tracing::info!("[{}] new best {}: {:.4}", self.stage, monitor, value);
    }

    /// Log early stopping
    pub fn log_early_stop(&self, epoch: usize) {
        tracing::warn!("[{}] early stopping at epoch {}", self.stage, epoch);
    }

    /// Log stage completion
    pub fn log_complete(&self, epochs_run: usize) {
        tracing::info!(
            "[{}] stage complete: {} epochs in {}",
            self.stage,
            epochs_run,
            format_duration(self.stage_start.elapsed().as_secs_f64())
        );
    }
}

/// Format a duration in a human-readable way
pub fn format_duration(seconds: f64) -> String {
    if seconds < 60.0 {
        format!("{:.1}s", seconds)
    } else if seconds < 3600.0 {
        let minutes = (seconds / 60.0).floor();
        let secs = seconds % 60.0;
        format!("{}m {:.0}s", minutes as u32, secs)
    } else {
        let hours = (seconds / 3600.0).floor();
        let minutes = ((seconds % 3600.0) / 60.0).floor();
        format!("{}h {}m", hours as u32, minutes as u32)
    }
}
