//! Dataset loading, splitting, batching, and augmentation

pub mod augmentation;
pub mod burn_dataset;
pub mod loader;
pub mod split;

pub use augmentation::{AugmentConfig, Augmenter};
pub use burn_dataset::{
    CombinedDataset, CultureBatch, CultureBatcher, CultureImageDataset, CultureItem,
};
pub use loader::{CultureDataset, CultureSample, DatasetStats};
pub use split::{DatasetSplits, SplitConfig, SplitStats};
