//! Hyperparameter Search Controller
//!
//! Drives the sample → train → score → rank loop over fine-tuning
//! hyperparameters. Each `search` invocation starts from a clean slate:
//! the artifact directory is wiped first, so no prior trial history
//! carries over. The controller only orchestrates; building and training
//! the per-trial model is the caller-supplied objective closure.

use std::fs;
use std::path::PathBuf;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::search::space::{HyperPoint, SearchSpace};
use crate::search::strategy::SearchStrategy;
use crate::utils::error::{CultureError, Result};

/// Lifecycle of one search run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SearchState {
    Idle,
    Searching,
    Completed,
}

/// One completed trial
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrialRecord {
    /// Sampling order, 0-indexed
    pub id: usize,
    /// The evaluated configuration
    pub point: HyperPoint,
    /// Objective value (mean best validation loss across executions)
    pub objective: f64,
}

/// Orchestrates a hyperparameter search run
pub struct SearchController {
    state: SearchState,
    trials: Vec<TrialRecord>,
    artifact_dir: PathBuf,
    seed: u64,
}

impl SearchController {
    /// Create a controller writing artifacts under `artifact_dir`
    pub fn new(artifact_dir: PathBuf, seed: u64) -> Self {
        Self {
            state: SearchState::Idle,
            trials: Vec::new(),
            artifact_dir,
            seed,
        }
    }

    pub fn state(&self) -> SearchState {
        self.state
    }

    pub fn trials(&self) -> &[TrialRecord] {
        &self.trials
    }

    /// Run the search. The objective closure receives the trial id, the
    /// execution index within the trial, and the sampled point, and returns
    /// that execution's best validation loss; it is called
    /// `executions_per_trial` times per point and the mean is recorded.
    /// Prior search state is always discarded.
    pub fn search<F>(
        &mut self,
        space: &SearchSpace,
        strategy: &mut dyn SearchStrategy,
        max_trials: usize,
        executions_per_trial: usize,
        mut objective: F,
    ) -> Result<()>
    where
        F: FnMut(usize, usize, &HyperPoint) -> Result<f64>,
    {
        space.validate()?;
        if max_trials == 0 || executions_per_trial == 0 {
            return Err(CultureError::Search(
                "max_trials and executions_per_trial must be positive".to_string(),
            ));
        }

        // overwrite semantics: every run starts Idle with no carried-over
        // trial history or artifacts
        if self.artifact_dir.exists() {
            fs::remove_dir_all(&self.artifact_dir)?;
        }
        fs::create_dir_all(&self.artifact_dir)?;
        self.trials.clear();
        self.state = SearchState::Searching;

        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);

        for id in 0..max_trials {
            let point = strategy.suggest(space, &mut rng);

            let mut sum = 0.0;
            for execution in 0..executions_per_trial {
                sum += objective(id, execution, &point)?;
            }
            let mean = sum / executions_per_trial as f64;

            info!(
                "Trial {}: lr={:.2e} dropout={:.1} cutoff={} -> objective {:.4}",
                id, point.learning_rate, point.dropout_rate, point.frozen_layer_cutoff, mean
            );

            strategy.record(point.clone(), mean);
            self.trials.push(TrialRecord {
                id,
                point,
                objective: mean,
            });
        }

        self.save_trials()?;
        self.state = SearchState::Completed;
        Ok(())
    }

    /// The k trials with the lowest objective, ascending; ties resolve to
    /// the earliest-sampled trial.
    pub fn get_best(&self, k: usize) -> Vec<&TrialRecord> {
        let mut ranked: Vec<&TrialRecord> = self.trials.iter().collect();
        // stable sort keeps earlier trial ids first among equal objectives
        ranked.sort_by(|a, b| {
            a.objective
                .partial_cmp(&b.objective)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        ranked.truncate(k);
        ranked
    }

    /// The single best trial, if the search produced any
    pub fn best_trial(&self) -> Option<&TrialRecord> {
        self.get_best(1).into_iter().next()
    }

    fn save_trials(&self) -> Result<()> {
        let json = serde_json::to_string_pretty(&self.trials)
            .map_err(|e| CultureError::Serialization(e.to_string()))?;
        fs::write(self.artifact_dir.join("trials.json"), json)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::strategy::RandomSampler;

    fn controller(dir: &std::path::Path) -> SearchController {
        SearchController::new(dir.join("hyperparam_search"), 7)
    }

    #[test]
    fn test_get_best_returns_lowest_objective() {
        let dir = tempfile::tempdir().unwrap();
        let mut controller = controller(dir.path());
        let mut strategy = RandomSampler::new();

        let objectives = [0.5, 0.3, 0.4];
        controller
            .search(
                &SearchSpace::default(),
                &mut strategy,
                3,
                1,
                |id, _execution, _point| Ok(objectives[id]),
            )
            .unwrap();

        let best = controller.get_best(1);
        assert_eq!(best.len(), 1);
        assert!((best[0].objective - 0.3).abs() < 1e-12);
        assert_eq!(best[0].id, 1);

        // ascending order over all trials
        let all = controller.get_best(3);
        assert_eq!(
            all.iter().map(|t| t.id).collect::<Vec<_>>(),
            vec![1, 2, 0]
        );
    }

    #[test]
    fn test_ties_break_by_earliest_trial() {
        let dir = tempfile::tempdir().unwrap();
        let mut controller = controller(dir.path());
        let mut strategy = RandomSampler::new();

        controller
            .search(&SearchSpace::default(), &mut strategy, 3, 1, |_, _, _| {
                Ok(0.4)
            })
            .unwrap();

        assert_eq!(controller.best_trial().unwrap().id, 0);
    }

    #[test]
    fn test_state_transitions() {
        let dir = tempfile::tempdir().unwrap();
        let mut controller = controller(dir.path());
        assert_eq!(controller.state(), SearchState::Idle);

        let mut strategy = RandomSampler::new();
        controller
            .search(&SearchSpace::default(), &mut strategy, 1, 1, |_, _, _| {
                Ok(0.5)
            })
            .unwrap();
        assert_eq!(controller.state(), SearchState::Completed);
    }

    #[test]
    fn test_rerun_discards_prior_trials_and_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let mut controller = controller(dir.path());
        let mut strategy = RandomSampler::new();

        controller
            .search(&SearchSpace::default(), &mut strategy, 3, 1, |_, _, _| {
                Ok(0.5)
            })
            .unwrap();
        let stale = dir.path().join("hyperparam_search").join("stale.txt");
        std::fs::write(&stale, "old").unwrap();

        let mut strategy = RandomSampler::new();
        controller
            .search(&SearchSpace::default(), &mut strategy, 2, 1, |_, _, _| {
                Ok(0.6)
            })
            .unwrap();

        assert_eq!(controller.trials().len(), 2);
        assert!(!stale.exists());
        assert!(dir
            .path()
            .join("hyperparam_search")
            .join("trials.json")
            .exists());
    }

    #[test]
    fn test_objective_mean_over_executions() {
        let dir = tempfile::tempdir().unwrap();
        let mut controller = controller(dir.path());
        let mut strategy = RandomSampler::new();

        let mut calls = 0;
        controller
            .search(&SearchSpace::default(), &mut strategy, 1, 3, |_, _, _| {
                calls += 1;
                Ok(calls as f64) // 1, 2, 3 -> mean 2
            })
            .unwrap();

        assert_eq!(calls, 3);
        assert!((controller.trials()[0].objective - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_executions_within_a_trial_are_distinguishable() {
        let dir = tempfile::tempdir().unwrap();
        let mut controller = controller(dir.path());
        let mut strategy = RandomSampler::new();

        // the objective must be able to vary per execution (seeding etc.),
        // so each repeat of a trial carries its own execution index
        let mut seen = Vec::new();
        controller
            .search(&SearchSpace::default(), &mut strategy, 2, 3, |id, execution, _| {
                seen.push((id, execution));
                Ok(0.5)
            })
            .unwrap();

        assert_eq!(
            seen,
            vec![(0, 0), (0, 1), (0, 2), (1, 0), (1, 1), (1, 2)]
        );
    }

    #[test]
    fn test_objective_failure_propagates() {
        let dir = tempfile::tempdir().unwrap();
        let mut controller = controller(dir.path());
        let mut strategy = RandomSampler::new();

        let result = controller.search(&SearchSpace::default(), &mut strategy, 1, 1, |_, _, _| {
            Err(CultureError::Training("diverged".to_string()))
        });

        assert!(result.is_err());
        assert_eq!(controller.state(), SearchState::Searching);
    }
}
