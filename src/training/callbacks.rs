//! Callback Policy
//!
//! Callbacks are tagged variants with typed parameters, combined into an
//! ordered list evaluated once per epoch in declared order. Early stopping
//! halts the run; checkpointing persists weights on monitor improvement
//! (the runner restores the best checkpoint after the run); CSV logging
//! and the observability sink only record, they never affect the outcome.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::training::history::EpochRecord;
use crate::utils::error::{CultureError, Result};

/// Which validation metric a callback watches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Monitor {
    /// Validation loss, lower is better
    ValLoss,
    /// Validation Fβ, higher is better
    ValFBeta,
}

impl Monitor {
    pub fn name(&self) -> &'static str {
        match self {
            Monitor::ValLoss => "val_loss",
            Monitor::ValFBeta => "val_fbeta",
        }
    }

    /// Sentinel that any real value improves on
    fn initial_best(&self) -> f64 {
        match self {
            Monitor::ValLoss => f64::INFINITY,
            Monitor::ValFBeta => f64::NEG_INFINITY,
        }
    }

    /// Strict improvement over the best seen so far
    fn improved(&self, value: f64, best: f64) -> bool {
        match self {
            Monitor::ValLoss => value < best,
            Monitor::ValFBeta => value > best,
        }
    }

    fn value(&self, record: &EpochRecord) -> Option<f64> {
        match self {
            Monitor::ValLoss => record.val_loss,
            Monitor::ValFBeta => record.val_fbeta,
        }
    }
}

/// One callback in the per-epoch policy
#[derive(Debug, Clone)]
pub enum Callback {
    /// Halt once `monitor` fails to improve for `patience` consecutive epochs
    EarlyStop { monitor: Monitor, patience: usize },
    /// Persist weights whenever `monitor` improves strictly on its best,
    /// overwriting the previous checkpoint in place
    Checkpoint {
        path: PathBuf,
        monitor: Monitor,
        save_best_only: bool,
    },
    /// Append one row per epoch with all tracked metrics
    CsvLog { path: PathBuf },
    /// Timestamped observability directory with one JSON record per epoch
    Observability { log_dir: PathBuf },
}

impl Callback {
    /// The monitor this callback watches, if any
    fn monitor(&self) -> Option<Monitor> {
        match self {
            Callback::EarlyStop { monitor, .. } => Some(*monitor),
            Callback::Checkpoint { monitor, .. } => Some(*monitor),
            Callback::CsvLog { .. } | Callback::Observability { .. } => None,
        }
    }
}

/// Ordered callback list for one training stage
#[derive(Debug, Clone, Default)]
pub struct CallbackPolicy {
    callbacks: Vec<Callback>,
}

impl CallbackPolicy {
    pub fn new(callbacks: Vec<Callback>) -> Self {
        Self { callbacks }
    }

    pub fn push(mut self, callback: Callback) -> Self {
        self.callbacks.push(callback);
        self
    }

    pub fn callbacks(&self) -> &[Callback] {
        &self.callbacks
    }

    /// First monitor any callback watches, if one exists
    pub fn first_monitor(&self) -> Option<Monitor> {
        self.callbacks.iter().find_map(|c| c.monitor())
    }

    /// Path of the first checkpoint callback, if one exists
    pub fn checkpoint_path(&self) -> Option<&Path> {
        self.callbacks.iter().find_map(|c| match c {
            Callback::Checkpoint { path, .. } => Some(path.as_path()),
            _ => None,
        })
    }

    /// Fail with `NoValidationSignal` when a monitor-based callback is
    /// configured but no validation split exists
    pub fn validate(&self, has_validation: bool) -> Result<()> {
        if has_validation {
            return Ok(());
        }
        if let Some(monitor) = self.first_monitor() {
            return Err(CultureError::NoValidationSignal(monitor.name().to_string()));
        }
        Ok(())
    }
}

/// Per-run callback state: best values, staleness counters, resolved
/// observability directories
pub struct CallbackRuntime {
    policy: CallbackPolicy,
    best: Vec<f64>,
    stale: Vec<usize>,
    obs_dirs: Vec<Option<PathBuf>>,
}

/// What the callbacks decided for one epoch
#[derive(Debug, Default)]
pub struct CallbackOutcome {
    /// Early stopping fired
    pub stop: bool,
    /// Path a checkpoint was written to this epoch
    pub checkpoint_saved: Option<PathBuf>,
    /// A monitored value improved this epoch
    pub improved: bool,
}

impl CallbackRuntime {
    /// Prepare a policy for one run, creating observability directories
    /// up front
    pub fn new(policy: CallbackPolicy) -> Result<Self> {
        let mut obs_dirs = Vec::with_capacity(policy.callbacks.len());
        for callback in &policy.callbacks {
            if let Callback::Observability { log_dir } = callback {
                let stamp = chrono::Local::now().format("%Y%m%d-%H%M%S").to_string();
                let dir = log_dir.join(stamp);
                fs::create_dir_all(&dir)?;
                obs_dirs.push(Some(dir));
            } else {
                obs_dirs.push(None);
            }
        }

        let best = policy
            .callbacks
            .iter()
            .map(|c| c.monitor().map(|m| m.initial_best()).unwrap_or(0.0))
            .collect();
        let stale = vec![0; policy.callbacks.len()];

        Ok(Self {
            policy,
            best,
            stale,
            obs_dirs,
        })
    }

    /// Evaluate all callbacks for one epoch, in declared order. `save` is
    /// invoked with the checkpoint path when weights should be persisted.
    pub fn on_epoch<F>(&mut self, record: &EpochRecord, mut save: F) -> Result<CallbackOutcome>
    where
        F: FnMut(&Path) -> Result<()>,
    {
        let mut outcome = CallbackOutcome::default();

        for (index, callback) in self.policy.callbacks.iter().enumerate() {
            match callback {
                Callback::EarlyStop { monitor, patience } => {
                    let Some(value) = monitor.value(record) else {
                        return Err(CultureError::NoValidationSignal(
                            monitor.name().to_string(),
                        ));
                    };
                    if monitor.improved(value, self.best[index]) {
                        self.best[index] = value;
                        self.stale[index] = 0;
                        outcome.improved = true;
                    } else {
                        self.stale[index] += 1;
                        if self.stale[index] >= *patience {
                            outcome.stop = true;
                        }
                    }
                }
                Callback::Checkpoint {
                    path,
                    monitor,
                    save_best_only,
                } => {
                    let Some(value) = monitor.value(record) else {
                        return Err(CultureError::NoValidationSignal(
                            monitor.name().to_string(),
                        ));
                    };
                    let improved = monitor.improved(value, self.best[index]);
                    if improved {
                        self.best[index] = value;
                        outcome.improved = true;
                    }
                    if improved || !save_best_only {
                        if let Some(parent) = path.parent() {
                            fs::create_dir_all(parent)?;
                        }
                        save(path)?;
                        debug!(
                            "Checkpoint saved at epoch {} ({} = {:.4})",
                            record.epoch,
                            monitor.name(),
                            value
                        );
                        outcome.checkpoint_saved = Some(path.clone());
                    }
                }
                Callback::CsvLog { path } => {
                    append_csv_row(path, record)?;
                }
                Callback::Observability { .. } => {
                    if let Some(dir) = &self.obs_dirs[index] {
                        let json = serde_json::to_string_pretty(record)
                            .map_err(|e| CultureError::Serialization(e.to_string()))?;
                        fs::write(dir.join(format!("epoch_{:03}.json", record.epoch)), json)?;
                    }
                }
            }
        }

        Ok(outcome)
    }
}

/// Append one metrics row, writing the header first when the file is new
fn append_csv_row(path: &Path, record: &EpochRecord) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let needs_header = !path.exists();
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;

    if needs_header {
        writeln!(file, "epoch,train_loss,val_loss,val_accuracy,val_fbeta")?;
    }

    let fmt = |v: Option<f64>| v.map(|x| format!("{:.6}", x)).unwrap_or_default();
    writeln!(
        file,
        "{},{:.6},{},{},{}",
        record.epoch,
        record.train_loss,
        fmt(record.val_loss),
        fmt(record.val_accuracy),
        fmt(record.val_fbeta),
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(epoch: usize, val_loss: f64) -> EpochRecord {
        EpochRecord {
            epoch,
            train_loss: val_loss,
            val_loss: Some(val_loss),
            val_accuracy: Some(0.5),
            val_fbeta: Some(0.5),
        }
    }

    #[test]
    fn test_early_stop_after_patience_exhausted() {
        let policy = CallbackPolicy::default().push(Callback::EarlyStop {
            monitor: Monitor::ValLoss,
            patience: 2,
        });
        let mut runtime = CallbackRuntime::new(policy).unwrap();

        let save = |_: &Path| Ok(());
        assert!(!runtime.on_epoch(&record(1, 0.5), save).unwrap().stop);
        assert!(!runtime.on_epoch(&record(2, 0.6), save).unwrap().stop);
        assert!(runtime.on_epoch(&record(3, 0.7), save).unwrap().stop);
    }

    #[test]
    fn test_improvement_resets_patience() {
        let policy = CallbackPolicy::default().push(Callback::EarlyStop {
            monitor: Monitor::ValLoss,
            patience: 2,
        });
        let mut runtime = CallbackRuntime::new(policy).unwrap();

        let save = |_: &Path| Ok(());
        runtime.on_epoch(&record(1, 0.5), save).unwrap();
        runtime.on_epoch(&record(2, 0.6), save).unwrap();
        runtime.on_epoch(&record(3, 0.4), save).unwrap(); // resets
        assert!(!runtime.on_epoch(&record(4, 0.5), save).unwrap().stop);
        assert!(runtime.on_epoch(&record(5, 0.5), save).unwrap().stop);
    }

    #[test]
    fn test_checkpoint_only_on_strict_improvement() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("best.mpk");
        let policy = CallbackPolicy::default().push(Callback::Checkpoint {
            path: path.clone(),
            monitor: Monitor::ValLoss,
            save_best_only: true,
        });
        let mut runtime = CallbackRuntime::new(policy).unwrap();

        let mut saves = 0;
        let mut save = |_: &Path| {
            saves += 1;
            Ok(())
        };

        runtime.on_epoch(&record(1, 0.5), &mut save).unwrap();
        runtime.on_epoch(&record(2, 0.5), &mut save).unwrap(); // equal, no save
        runtime.on_epoch(&record(3, 0.4), &mut save).unwrap();

        assert_eq!(saves, 2);
    }

    #[test]
    fn test_csv_log_one_row_per_epoch() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("training_log.csv");
        let policy = CallbackPolicy::default().push(Callback::CsvLog { path: path.clone() });
        let mut runtime = CallbackRuntime::new(policy).unwrap();

        let save = |_: &Path| Ok(());
        runtime.on_epoch(&record(1, 0.5), save).unwrap();
        runtime.on_epoch(&record(2, 0.4), save).unwrap();

        let contents = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 3); // header + 2 epochs
        assert!(lines[0].starts_with("epoch,train_loss"));
        assert!(lines[1].starts_with("1,"));
        assert!(lines[2].starts_with("2,"));
    }

    #[test]
    fn test_missing_validation_signal_is_an_error() {
        let policy = CallbackPolicy::default().push(Callback::EarlyStop {
            monitor: Monitor::ValLoss,
            patience: 2,
        });

        assert!(matches!(
            policy.validate(false),
            Err(CultureError::NoValidationSignal(_))
        ));
        assert!(policy.validate(true).is_ok());

        // unmonitored policies never need validation
        let plain = CallbackPolicy::default().push(Callback::CsvLog {
            path: PathBuf::from("log.csv"),
        });
        assert!(plain.validate(false).is_ok());
    }

    #[test]
    fn test_observability_writes_epoch_records() {
        let dir = tempfile::tempdir().unwrap();
        let policy = CallbackPolicy::default().push(Callback::Observability {
            log_dir: dir.path().to_path_buf(),
        });
        let mut runtime = CallbackRuntime::new(policy).unwrap();

        let save = |_: &Path| Ok(());
        runtime.on_epoch(&record(1, 0.5), save).unwrap();

        // one timestamped subdirectory with one record
        let subdirs: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(subdirs.len(), 1);
        let sub = subdirs[0].as_ref().unwrap().path();
        assert!(sub.join("epoch_001.json").exists());
    }
}
