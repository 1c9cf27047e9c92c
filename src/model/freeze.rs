//! Layer Freezing for Staged Transfer Learning
//!
//! `FreezePlan` decides which backbone layers stay frozen during a stage:
//! every layer below the cutoff index, plus all normalization layers
//! regardless of position (their statistics were fitted on the pretraining
//! distribution and are kept pinned). `Freezer` applies the plan by
//! clearing `require_grad` on the affected parameters.

use std::collections::HashSet;

use burn::module::{ModuleMapper, ParamId};
use burn::tensor::backend::AutodiffBackend;
use burn::tensor::Tensor;

use crate::model::backbone::{CultureBackbone, LayerKind};

/// A pure description of which layers to freeze
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreezePlan {
    cutoff: usize,
}

impl FreezePlan {
    /// Freeze every layer below `cutoff`, and all normalization layers
    pub fn new(cutoff: usize) -> Self {
        Self { cutoff }
    }

    /// Freeze the entire backbone (feature-extraction stage)
    pub fn freeze_all() -> Self {
        Self { cutoff: usize::MAX }
    }

    /// The requested cutoff index
    pub fn cutoff(&self) -> usize {
        self.cutoff
    }

    /// Per-layer frozen flags for the given layer sequence.
    ///
    /// The cutoff is clamped to the sequence length, so a cutoff beyond the
    /// backbone depth freezes everything.
    pub fn frozen_mask(&self, kinds: &[LayerKind]) -> Vec<bool> {
        let cutoff = self.cutoff.min(kinds.len());
        kinds
            .iter()
            .enumerate()
            .map(|(index, kind)| index < cutoff || *kind == LayerKind::Normalization)
            .collect()
    }

    /// Number of frozen layers for the given sequence
    pub fn frozen_count(&self, kinds: &[LayerKind]) -> usize {
        self.frozen_mask(kinds).iter().filter(|&&f| f).count()
    }

    /// Collect the parameter ids pinned by this plan for a backbone
    pub fn frozen_param_ids<B: burn::tensor::backend::Backend>(
        &self,
        backbone: &CultureBackbone<B>,
    ) -> HashSet<ParamId> {
        let kinds = backbone.layer_kinds();
        let param_ids = backbone.layer_param_ids();
        let mask = self.frozen_mask(&kinds);

        mask.iter()
            .zip(param_ids.iter())
            .filter(|(frozen, _)| **frozen)
            .flat_map(|(_, ids)| ids.iter().copied())
            .collect()
    }
}

/// Module mapper clearing `require_grad` on frozen parameters
pub struct Freezer {
    frozen: HashSet<ParamId>,
}

impl Freezer {
    pub fn new(frozen: HashSet<ParamId>) -> Self {
        Self { frozen }
    }

    /// Number of parameters this freezer pins
    pub fn num_frozen(&self) -> usize {
        self.frozen.len()
    }
}

impl<B: AutodiffBackend> ModuleMapper<B> for Freezer {
    fn map_float<const D: usize>(&mut self, id: ParamId, tensor: Tensor<B, D>) -> Tensor<B, D> {
        if self.frozen.contains(&id) {
            tensor.set_require_grad(false)
        } else {
            tensor
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::backbone::BackboneConfig;

    /// A deep synthetic layer sequence: repeating conv/norm/activation
    /// groups with a pooling layer every 10th position.
    fn deep_layer_sequence(depth: usize) -> Vec<LayerKind> {
        (0..depth)
            .map(|i| match i % 10 {
                9 => LayerKind::Pooling,
                n if n % 3 == 1 => LayerKind::Normalization,
                n if n % 3 == 2 => LayerKind::Activation,
                _ => LayerKind::Convolution,
            })
            .collect()
    }

    #[test]
    fn test_cutoff_freezes_prefix() {
        let kinds = deep_layer_sequence(700);
        let mask = FreezePlan::new(600).frozen_mask(&kinds);

        assert_eq!(mask.len(), 700);
        assert!(mask[..600].iter().all(|&f| f));
    }

    #[test]
    fn test_normalization_frozen_beyond_cutoff() {
        let kinds = deep_layer_sequence(700);
        let mask = FreezePlan::new(600).frozen_mask(&kinds);

        for (index, kind) in kinds.iter().enumerate().skip(600) {
            match kind {
                LayerKind::Normalization => assert!(mask[index], "norm layer {} not frozen", index),
                _ => assert!(!mask[index], "layer {} unexpectedly frozen", index),
            }
        }
    }

    #[test]
    fn test_cutoff_clamped_to_depth() {
        let kinds = deep_layer_sequence(10);
        let mask = FreezePlan::new(600).frozen_mask(&kinds);
        assert!(mask.iter().all(|&f| f));
    }

    #[test]
    fn test_zero_cutoff_frees_all_but_normalization() {
        let kinds = deep_layer_sequence(30);
        let mask = FreezePlan::new(0).frozen_mask(&kinds);

        for (index, kind) in kinds.iter().enumerate() {
            assert_eq!(mask[index], *kind == LayerKind::Normalization);
        }
    }

    #[test]
    fn test_freeze_all_covers_everything() {
        let kinds = deep_layer_sequence(50);
        assert_eq!(FreezePlan::freeze_all().frozen_count(&kinds), 50);
    }

    #[test]
    fn test_frozen_param_ids_cover_whole_backbone() {
        use crate::backend::DefaultBackend;

        let device = Default::default();
        let backbone =
            CultureBackbone::<DefaultBackend>::new(&BackboneConfig::new(), &device);

        let all = FreezePlan::freeze_all().frozen_param_ids(&backbone);
        let total: usize = backbone.layer_param_ids().iter().map(|ids| ids.len()).sum();
        assert_eq!(all.len(), total);

        // with cutoff 0, only normalization parameters remain pinned
        let norms_only = FreezePlan::new(0).frozen_param_ids(&backbone);
        assert!(norms_only.len() < all.len());
        assert!(!norms_only.is_empty());
    }
}
