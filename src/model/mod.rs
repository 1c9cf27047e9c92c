//! Model architecture: backbone, freeze plan, head, staged builder

pub mod backbone;
pub mod builder;
pub mod freeze;
pub mod head;

pub use backbone::{BackboneConfig, ConvBlock, CultureBackbone, LayerKind};
pub use builder::{CultureClassifier, StagedModelBuilder};
pub use freeze::{FreezePlan, Freezer};
pub use head::{CultureHead, HeadConfig};
