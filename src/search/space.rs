//! Hyperparameter Search Space
//!
//! The fine-tuning stage searches three dimensions: learning rate
//! (continuous, log-scale), dropout rate (stepped grid), and the
//! frozen-layer cutoff (stepped grid).

use rand::seq::SliceRandom;
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::utils::error::{CultureError, Result};

/// One sampled hyperparameter configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HyperPoint {
    /// Adam learning rate
    pub learning_rate: f64,
    /// Head dropout rate
    pub dropout_rate: f64,
    /// Backbone layers below this index stay frozen
    pub frozen_layer_cutoff: usize,
}

/// Bounded search space for fine-tuning hyperparameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchSpace {
    /// Learning-rate bounds, sampled uniformly in log space
    pub learning_rate_bounds: (f64, f64),
    /// Dropout grid bounds and step
    pub dropout_bounds: (f64, f64),
    pub dropout_step: f64,
    /// Frozen-layer-cutoff grid bounds and step
    pub cutoff_bounds: (usize, usize),
    pub cutoff_step: usize,
}

impl Default for SearchSpace {
    fn default() -> Self {
        Self {
            learning_rate_bounds: (1e-4, 1e-2),
            dropout_bounds: (0.1, 0.5),
            dropout_step: 0.1,
            cutoff_bounds: (100, 650),
            cutoff_step: 50,
        }
    }
}

impl SearchSpace {
    /// Validate bounds and steps
    pub fn validate(&self) -> Result<()> {
        let (lr_lo, lr_hi) = self.learning_rate_bounds;
        if lr_lo <= 0.0 || lr_hi <= lr_lo {
            return Err(CultureError::Search(
                "Learning-rate bounds must satisfy 0 < low < high".to_string(),
            ));
        }
        if self.dropout_step <= 0.0 || self.dropout_bounds.1 < self.dropout_bounds.0 {
            return Err(CultureError::Search(
                "Invalid dropout grid".to_string(),
            ));
        }
        if self.cutoff_step == 0 || self.cutoff_bounds.1 < self.cutoff_bounds.0 {
            return Err(CultureError::Search(
                "Invalid frozen-layer-cutoff grid".to_string(),
            ));
        }
        Ok(())
    }

    /// All dropout grid values, low to high
    pub fn dropout_grid(&self) -> Vec<f64> {
        let (lo, hi) = self.dropout_bounds;
        let steps = ((hi - lo) / self.dropout_step).round() as usize;
        (0..=steps).map(|i| lo + i as f64 * self.dropout_step).collect()
    }

    /// All frozen-layer-cutoff grid values, low to high
    pub fn cutoff_grid(&self) -> Vec<usize> {
        let (lo, hi) = self.cutoff_bounds;
        (lo..=hi).step_by(self.cutoff_step).collect()
    }

    /// Draw a uniform random point: log-uniform learning rate, uniform
    /// grid choices for the stepped dimensions
    pub fn sample_random(&self, rng: &mut ChaCha8Rng) -> HyperPoint {
        let (lr_lo, lr_hi) = self.learning_rate_bounds;
        let log_lr = rng.gen_range(lr_lo.ln()..=lr_hi.ln());

        let dropout_grid = self.dropout_grid();
        let cutoff_grid = self.cutoff_grid();

        HyperPoint {
            learning_rate: log_lr.exp().clamp(lr_lo, lr_hi),
            dropout_rate: *dropout_grid.choose(rng).unwrap_or(&self.dropout_bounds.0),
            frozen_layer_cutoff: *cutoff_grid.choose(rng).unwrap_or(&self.cutoff_bounds.0),
        }
    }

    /// Whether a point lies within bounds and on the grids
    pub fn contains(&self, point: &HyperPoint) -> bool {
        let (lr_lo, lr_hi) = self.learning_rate_bounds;
        point.learning_rate >= lr_lo
            && point.learning_rate <= lr_hi
            && self
                .dropout_grid()
                .iter()
                .any(|&d| (d - point.dropout_rate).abs() < 1e-9)
            && self.cutoff_grid().contains(&point.frozen_layer_cutoff)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn test_default_grids() {
        let space = SearchSpace::default();

        let dropout = space.dropout_grid();
        assert_eq!(dropout.len(), 5);
        assert!((dropout[0] - 0.1).abs() < 1e-9);
        assert!((dropout[4] - 0.5).abs() < 1e-9);

        let cutoff = space.cutoff_grid();
        assert_eq!(cutoff.first(), Some(&100));
        assert_eq!(cutoff.last(), Some(&650));
        assert_eq!(cutoff.len(), 12);
    }

    #[test]
    fn test_random_samples_stay_in_space() {
        let space = SearchSpace::default();
        let mut rng = ChaCha8Rng::seed_from_u64(11);

        for _ in 0..100 {
            let point = space.sample_random(&mut rng);
            assert!(space.contains(&point), "out-of-space point: {:?}", point);
        }
    }

    #[test]
    fn test_validation_rejects_bad_bounds() {
        let mut space = SearchSpace::default();
        space.learning_rate_bounds = (1e-2, 1e-4);
        assert!(space.validate().is_err());

        let mut space = SearchSpace::default();
        space.cutoff_step = 0;
        assert!(space.validate().is_err());

        assert!(SearchSpace::default().validate().is_ok());
    }
}
