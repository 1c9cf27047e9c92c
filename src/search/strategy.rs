//! Search Strategies
//!
//! Strategies implement a sample → score → rank contract, so grid, random,
//! or Bayesian approaches are substitutable. `TpeSampler` is the default:
//! a tree-structured Parzen estimator that splits observed trials into
//! good/bad sets by quantile and samples where the density ratio favors
//! the good set (Bergstra et al., 2011). `RandomSampler` is the cheap
//! fallback and the workhorse of the test suite.

use rand::Rng;
use rand_chacha::ChaCha8Rng;

use crate::search::space::{HyperPoint, SearchSpace};

/// A substitutable hyperparameter search strategy
pub trait SearchStrategy {
    /// Suggest the next point to evaluate
    fn suggest(&mut self, space: &SearchSpace, rng: &mut ChaCha8Rng) -> HyperPoint;

    /// Record an observed objective value (lower is better)
    fn record(&mut self, point: HyperPoint, objective: f64);

    /// Best observation so far; ties resolve to the earliest
    fn best(&self) -> Option<(&HyperPoint, f64)>;
}

fn best_of(observations: &[(HyperPoint, f64)]) -> Option<(&HyperPoint, f64)> {
    let mut best: Option<(&HyperPoint, f64)> = None;
    for (point, objective) in observations {
        match best {
            Some((_, current)) if *objective >= current => {}
            _ => best = Some((point, *objective)),
        }
    }
    best
}

/// Uniform random sampling
#[derive(Debug, Default)]
pub struct RandomSampler {
    observations: Vec<(HyperPoint, f64)>,
}

impl RandomSampler {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SearchStrategy for RandomSampler {
    fn suggest(&mut self, space: &SearchSpace, rng: &mut ChaCha8Rng) -> HyperPoint {
        space.sample_random(rng)
    }

    fn record(&mut self, point: HyperPoint, objective: f64) {
        self.observations.push((point, objective));
    }

    fn best(&self) -> Option<(&HyperPoint, f64)> {
        best_of(&self.observations)
    }
}

/// Tree-structured Parzen estimator
#[derive(Debug)]
pub struct TpeSampler {
    /// Quantile splitting good from bad trials
    gamma: f64,
    /// Trials sampled uniformly before the estimator kicks in
    n_startup: usize,
    /// Relative KDE bandwidth
    kde_bandwidth: f64,
    /// Candidates drawn per continuous suggestion
    n_candidates: usize,
    observations: Vec<(HyperPoint, f64)>,
}

impl Default for TpeSampler {
    fn default() -> Self {
        Self {
            gamma: 0.25,
            n_startup: 5,
            kde_bandwidth: 1.0,
            n_candidates: 24,
            observations: Vec::new(),
        }
    }
}

impl TpeSampler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the good/bad split quantile
    pub fn with_gamma(mut self, gamma: f64) -> Self {
        self.gamma = gamma.clamp(0.01, 0.99);
        self
    }

    /// Set the number of random startup trials
    pub fn with_startup(mut self, n: usize) -> Self {
        self.n_startup = n.max(1);
        self
    }

    /// Split observations into good/bad by the gamma quantile of objective
    fn split(&self) -> (Vec<&HyperPoint>, Vec<&HyperPoint>) {
        let mut sorted: Vec<&(HyperPoint, f64)> = self.observations.iter().collect();
        sorted.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));

        let n_good = ((sorted.len() as f64) * self.gamma).ceil() as usize;
        let n_good = n_good.max(1).min(sorted.len().saturating_sub(1).max(1));

        let good = sorted[..n_good].iter().map(|(p, _)| p).collect();
        let bad = sorted[n_good..].iter().map(|(p, _)| p).collect();
        (good, bad)
    }

    /// Continuous dimension: sample candidates around the good set with
    /// Gaussian noise and keep the one maximizing l(x)/g(x)
    fn sample_continuous(
        &self,
        good: &[f64],
        bad: &[f64],
        low: f64,
        high: f64,
        rng: &mut ChaCha8Rng,
    ) -> f64 {
        if good.is_empty() {
            return rng.gen_range(low..=high);
        }

        let bandwidth = self.kde_bandwidth * (high - low) / 10.0;
        let mut best_value = low;
        let mut best_ratio = f64::NEG_INFINITY;

        for _ in 0..self.n_candidates {
            let base = good[rng.gen_range(0..good.len())];
            // Box-Muller transform for the Gaussian kernel noise
            let u1: f64 = rng.gen::<f64>().max(1e-10);
            let u2: f64 = rng.gen::<f64>();
            let noise =
                (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos() * bandwidth;
            let candidate = (base + noise).clamp(low, high);

            let l = kde_score(candidate, good, bandwidth);
            let g = kde_score(candidate, bad, bandwidth);
            let ratio = l / (g + 1e-10);

            if ratio > best_ratio {
                best_ratio = ratio;
                best_value = candidate;
            }
        }

        best_value
    }

    /// Stepped dimension: Laplace-smoothed l/g weights over the grid
    fn sample_stepped(
        &self,
        grid_len: usize,
        good_indices: &[usize],
        bad_indices: &[usize],
        rng: &mut ChaCha8Rng,
    ) -> usize {
        let mut good_counts = vec![1.0f64; grid_len];
        let mut bad_counts = vec![1.0f64; grid_len];
        for &i in good_indices {
            good_counts[i] += 1.0;
        }
        for &i in bad_indices {
            bad_counts[i] += 1.0;
        }

        let mut weights: Vec<f64> = good_counts
            .iter()
            .zip(bad_counts.iter())
            .map(|(l, g)| l / g)
            .collect();
        let total: f64 = weights.iter().sum();
        for w in &mut weights {
            *w /= total;
        }

        let r: f64 = rng.gen();
        let mut cumsum = 0.0;
        for (i, &w) in weights.iter().enumerate() {
            cumsum += w;
            if r < cumsum {
                return i;
            }
        }
        grid_len - 1
    }
}

fn kde_score(x: f64, values: &[f64], bandwidth: f64) -> f64 {
    if values.is_empty() {
        return 1.0;
    }
    values
        .iter()
        .map(|&v| (-(x - v).powi(2) / (2.0 * bandwidth.powi(2))).exp())
        .sum::<f64>()
        / values.len() as f64
}

fn grid_index_of(grid: &[f64], value: f64) -> Option<usize> {
    grid.iter().position(|&g| (g - value).abs() < 1e-9)
}

impl SearchStrategy for TpeSampler {
    fn suggest(&mut self, space: &SearchSpace, rng: &mut ChaCha8Rng) -> HyperPoint {
        if self.observations.len() < self.n_startup {
            return space.sample_random(rng);
        }

        let (good, bad) = self.split();
        let (lr_lo, lr_hi) = space.learning_rate_bounds;

        // Learning rate in log space
        let good_lrs: Vec<f64> = good.iter().map(|p| p.learning_rate.ln()).collect();
        let bad_lrs: Vec<f64> = bad.iter().map(|p| p.learning_rate.ln()).collect();
        let log_lr =
            self.sample_continuous(&good_lrs, &bad_lrs, lr_lo.ln(), lr_hi.ln(), rng);
        let learning_rate = log_lr.exp().clamp(lr_lo, lr_hi);

        // Dropout over its grid
        let dropout_grid = space.dropout_grid();
        let good_drop: Vec<usize> = good
            .iter()
            .filter_map(|p| grid_index_of(&dropout_grid, p.dropout_rate))
            .collect();
        let bad_drop: Vec<usize> = bad
            .iter()
            .filter_map(|p| grid_index_of(&dropout_grid, p.dropout_rate))
            .collect();
        let dropout_rate =
            dropout_grid[self.sample_stepped(dropout_grid.len(), &good_drop, &bad_drop, rng)];

        // Frozen-layer cutoff over its grid
        let cutoff_grid = space.cutoff_grid();
        let good_cut: Vec<usize> = good
            .iter()
            .filter_map(|p| cutoff_grid.iter().position(|&c| c == p.frozen_layer_cutoff))
            .collect();
        let bad_cut: Vec<usize> = bad
            .iter()
            .filter_map(|p| cutoff_grid.iter().position(|&c| c == p.frozen_layer_cutoff))
            .collect();
        let frozen_layer_cutoff =
            cutoff_grid[self.sample_stepped(cutoff_grid.len(), &good_cut, &bad_cut, rng)];

        HyperPoint {
            learning_rate,
            dropout_rate,
            frozen_layer_cutoff,
        }
    }

    fn record(&mut self, point: HyperPoint, objective: f64) {
        self.observations.push((point, objective));
    }

    fn best(&self) -> Option<(&HyperPoint, f64)> {
        best_of(&self.observations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn test_random_sampler_best_is_minimum() {
        let space = SearchSpace::default();
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let mut sampler = RandomSampler::new();

        for objective in [0.5, 0.3, 0.4] {
            let point = sampler.suggest(&space, &mut rng);
            sampler.record(point, objective);
        }

        let (_, best) = sampler.best().unwrap();
        assert!((best - 0.3).abs() < 1e-12);
    }

    #[test]
    fn test_best_ties_resolve_to_earliest() {
        let space = SearchSpace::default();
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        let mut sampler = RandomSampler::new();

        let first = sampler.suggest(&space, &mut rng);
        let marker = first.clone();
        sampler.record(first, 0.3);
        let second = sampler.suggest(&space, &mut rng);
        sampler.record(second, 0.3);

        let (point, _) = sampler.best().unwrap();
        assert_eq!(*point, marker);
    }

    #[test]
    fn test_tpe_startup_phase_is_random_within_space() {
        let space = SearchSpace::default();
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let mut sampler = TpeSampler::new().with_startup(5);

        for _ in 0..5 {
            let point = sampler.suggest(&space, &mut rng);
            assert!(space.contains(&point));
            sampler.record(point, 0.5);
        }
    }

    #[test]
    fn test_tpe_guided_suggestions_stay_in_space() {
        let space = SearchSpace::default();
        let mut rng = ChaCha8Rng::seed_from_u64(4);
        let mut sampler = TpeSampler::new().with_startup(3);

        // synthetic objective: lower learning rates score better
        for _ in 0..20 {
            let point = sampler.suggest(&space, &mut rng);
            assert!(space.contains(&point), "out-of-space point: {:?}", point);
            let objective = point.learning_rate.ln().abs();
            sampler.record(point, objective);
        }
    }

    #[test]
    fn test_tpe_concentrates_on_good_region() {
        let space = SearchSpace::default();
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let mut sampler = TpeSampler::new().with_startup(10);

        // objective strongly favors the smallest learning rates
        for _ in 0..30 {
            let point = sampler.suggest(&space, &mut rng);
            let objective = point.learning_rate; // minimize lr directly
            sampler.record(point, objective);
        }

        // late guided suggestions should lean low
        let mut late_lrs = Vec::new();
        for _ in 0..10 {
            let point = sampler.suggest(&space, &mut rng);
            late_lrs.push(point.learning_rate);
            sampler.record(point.clone(), point.learning_rate);
        }
        let mean_late: f64 = late_lrs.iter().sum::<f64>() / late_lrs.len() as f64;

        // log-uniform mean over [1e-4, 1e-2] is ~2.1e-3; guided sampling
        // should land well below it
        assert!(mean_late < 2.1e-3, "guided mean lr {}", mean_late);
    }
}
