//! Train / validation / test splitting
//!
//! Produces deterministic, stratified splits of the culture plate dataset.
//! The test split is held out for the final post-refit evaluation and is
//! never touched during training or hyperparameter search.

use std::collections::HashMap;

use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::dataset::loader::CultureSample;
use crate::utils::error::{CultureError, Result};

/// Configuration for dataset splitting
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SplitConfig {
    /// Fraction of data held out for final evaluation
    pub test_fraction: f64,
    /// Fraction of data used for validation during training
    pub validation_fraction: f64,
    /// Random seed for reproducibility
    pub seed: u64,
    /// Maintain class balance across splits
    pub stratified: bool,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            test_fraction: 0.15,
            validation_fraction: 0.15,
            seed: 42,
            stratified: true,
        }
    }
}

impl SplitConfig {
    /// Create a new split configuration, validating the fractions
    pub fn new(test_fraction: f64, validation_fraction: f64, seed: u64) -> Result<Self> {
        if !(0.0..1.0).contains(&test_fraction) {
            return Err(CultureError::Config(
                "Test fraction must be in [0.0, 1.0)".to_string(),
            ));
        }
        if !(0.0..1.0).contains(&validation_fraction) {
            return Err(CultureError::Config(
                "Validation fraction must be in [0.0, 1.0)".to_string(),
            ));
        }
        if test_fraction + validation_fraction >= 1.0 {
            return Err(CultureError::Config(
                "Test + validation fractions must leave room for training data".to_string(),
            ));
        }

        Ok(Self {
            test_fraction,
            validation_fraction,
            seed,
            stratified: true,
        })
    }
}

/// Train/validation/test partition of the dataset
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetSplits {
    /// Training split
    pub train_set: Vec<CultureSample>,
    /// Validation split, drives early stopping and checkpoint selection
    pub validation_set: Vec<CultureSample>,
    /// Held-out test split, used only after the final refit
    pub test_set: Vec<CultureSample>,
    /// Configuration used to create these splits
    pub config: SplitConfig,
    /// Total number of samples
    pub total_samples: usize,
}

impl DatasetSplits {
    /// Split a list of samples according to the configuration
    pub fn from_samples(samples: Vec<CultureSample>, config: SplitConfig) -> Result<Self> {
        let total_samples = samples.len();
        if total_samples == 0 {
            return Err(CultureError::EmptyDataset);
        }

        let mut rng = ChaCha8Rng::seed_from_u64(config.seed);

        let (train_set, validation_set, test_set) = if config.stratified {
            Self::stratified_split(samples, &config, &mut rng)
        } else {
            Self::random_split(samples, &config, &mut rng)
        };

        Ok(Self {
            train_set,
            validation_set,
            test_set,
            config,
            total_samples,
        })
    }

    fn stratified_split(
        samples: Vec<CultureSample>,
        config: &SplitConfig,
        rng: &mut ChaCha8Rng,
    ) -> (Vec<CultureSample>, Vec<CultureSample>, Vec<CultureSample>) {
        let mut by_class: HashMap<usize, Vec<CultureSample>> = HashMap::new();
        for sample in samples {
            by_class.entry(sample.label).or_default().push(sample);
        }

        let mut train_set = Vec::new();
        let mut validation_set = Vec::new();
        let mut test_set = Vec::new();

        // Iterate labels in order so the split is deterministic
        let mut labels: Vec<usize> = by_class.keys().copied().collect();
        labels.sort_unstable();

        for label in labels {
            let mut class_samples = by_class.remove(&label).unwrap_or_default();
            class_samples.shuffle(rng);

            let n = class_samples.len();
            let n_test = (n as f64 * config.test_fraction).round() as usize;
            let n_val = (n as f64 * config.validation_fraction).round() as usize;

            let mut iter = class_samples.into_iter();
            test_set.extend(iter.by_ref().take(n_test));
            validation_set.extend(iter.by_ref().take(n_val));
            train_set.extend(iter);
        }

        (train_set, validation_set, test_set)
    }

    fn random_split(
        mut samples: Vec<CultureSample>,
        config: &SplitConfig,
        rng: &mut ChaCha8Rng,
    ) -> (Vec<CultureSample>, Vec<CultureSample>, Vec<CultureSample>) {
        samples.shuffle(rng);

        let n = samples.len();
        let n_test = (n as f64 * config.test_fraction).round() as usize;
        let n_val = (n as f64 * config.validation_fraction).round() as usize;

        let mut iter = samples.into_iter();
        let test_set: Vec<_> = iter.by_ref().take(n_test).collect();
        let validation_set: Vec<_> = iter.by_ref().take(n_val).collect();
        let train_set: Vec<_> = iter.collect();

        (train_set, validation_set, test_set)
    }

    /// Get statistics about the splits
    pub fn stats(&self) -> SplitStats {
        SplitStats {
            total_samples: self.total_samples,
            train_size: self.train_set.len(),
            validation_size: self.validation_set.len(),
            test_size: self.test_set.len(),
        }
    }

    /// Save splits to a JSON file for reproducibility
    pub fn save(&self, path: &std::path::Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| CultureError::Serialization(e.to_string()))?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Load splits from a JSON file
    pub fn load(path: &std::path::Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let splits: Self =
            serde_json::from_str(&json).map_err(|e| CultureError::Serialization(e.to_string()))?;
        Ok(splits)
    }
}

/// Statistics about dataset splits
#[derive(Debug, Clone)]
pub struct SplitStats {
    pub total_samples: usize,
    pub train_size: usize,
    pub validation_size: usize,
    pub test_size: usize,
}

impl std::fmt::Display for SplitStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Dataset Split Statistics:")?;
        writeln!(f, "  Total samples: {}", self.total_samples)?;
        writeln!(
            f,
            "  Train: {} ({:.1}%)",
            self.train_size,
            100.0 * self.train_size as f64 / self.total_samples as f64
        )?;
        writeln!(
            f,
            "  Validation: {} ({:.1}%)",
            self.validation_size,
            100.0 * self.validation_size as f64 / self.total_samples as f64
        )?;
        write!(
            f,
            "  Test: {} ({:.1}%)",
            self.test_size,
            100.0 * self.test_size as f64 / self.total_samples as f64
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn create_test_samples() -> Vec<CultureSample> {
        let mut samples = Vec::new();
        let mut id = 0;
        for (label, name, count) in [(0usize, "negative", 80), (1usize, "positive", 20)] {
            for i in 0..count {
                samples.push(CultureSample {
                    path: PathBuf::from(format!("{}/plate_{}.jpg", name, i)),
                    label,
                    class_name: name.to_string(),
                    id,
                });
                id += 1;
            }
        }
        samples
    }

    #[test]
    fn test_default_split_accounts_for_all_samples() {
        let splits =
            DatasetSplits::from_samples(create_test_samples(), SplitConfig::default()).unwrap();
        let stats = splits.stats();

        assert_eq!(stats.total_samples, 100);
        assert_eq!(
            stats.train_size + stats.validation_size + stats.test_size,
            100
        );
    }

    #[test]
    fn test_stratified_keeps_minority_class_in_every_split() {
        let splits =
            DatasetSplits::from_samples(create_test_samples(), SplitConfig::default()).unwrap();

        for set in [&splits.train_set, &splits.validation_set, &splits.test_set] {
            assert!(set.iter().any(|s| s.label == 1));
            assert!(set.iter().any(|s| s.label == 0));
        }
    }

    #[test]
    fn test_same_seed_is_reproducible() {
        let config = SplitConfig::default();
        let a = DatasetSplits::from_samples(create_test_samples(), config.clone()).unwrap();
        let b = DatasetSplits::from_samples(create_test_samples(), config).unwrap();

        let ids = |set: &[CultureSample]| set.iter().map(|s| s.id).collect::<Vec<_>>();
        assert_eq!(ids(&a.train_set), ids(&b.train_set));
        assert_eq!(ids(&a.validation_set), ids(&b.validation_set));
        assert_eq!(ids(&a.test_set), ids(&b.test_set));
    }

    #[test]
    fn test_invalid_fractions_rejected() {
        assert!(SplitConfig::new(0.6, 0.5, 42).is_err());
        assert!(SplitConfig::new(-0.1, 0.1, 42).is_err());
    }

    #[test]
    fn test_empty_input_is_an_error() {
        let result = DatasetSplits::from_samples(Vec::new(), SplitConfig::default());
        assert!(matches!(result, Err(CultureError::EmptyDataset)));
    }
}
