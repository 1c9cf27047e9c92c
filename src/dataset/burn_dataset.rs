//! Burn Dataset Integration
//!
//! Implements Burn's Dataset trait and Batcher for the culture plate
//! pipeline. Images are loaded lazily on access and normalized with
//! ImageNet statistics at batch time, matching the pretrained backbone.

use std::path::PathBuf;

use burn::data::dataloader::batcher::Batcher;
use burn::data::dataset::Dataset;
use burn::prelude::*;
use image::imageops::FilterType;
use image::ImageReader;
use serde::{Deserialize, Serialize};

use crate::dataset::loader::CultureSample;
use crate::utils::error::{CultureError, Result};
use crate::IMAGE_SIZE;

/// ImageNet channel means, matching the pretrained backbone weights
pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
/// ImageNet channel standard deviations
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// A single preprocessed plate image ready for batching
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CultureItem {
    /// Image data as flattened CHW float array [3 * H * W], in [0, 1]
    pub image: Vec<f32>,
    /// Binary label (0 = negative, 1 = positive)
    pub label: usize,
    /// Image path (for debugging/logging)
    pub path: String,
}

impl CultureItem {
    /// Create a new item by loading and preprocessing an image
    pub fn from_path(path: &PathBuf, label: usize, image_size: usize) -> Result<Self> {
        let img = ImageReader::open(path)
            .map_err(|e| CultureError::ImageLoad(path.clone(), e.to_string()))?
            .decode()
            .map_err(|e| CultureError::ImageLoad(path.clone(), e.to_string()))?
            .resize_exact(image_size as u32, image_size as u32, FilterType::Triangle)
            .to_rgb8();

        let (width, height) = (image_size, image_size);
        let mut image = vec![0.0f32; 3 * height * width];

        // Convert to CHW format and scale to [0, 1]
        for y in 0..height {
            for x in 0..width {
                let pixel = img.get_pixel(x as u32, y as u32);
                for c in 0..3 {
                    image[c * height * width + y * width + x] = pixel[c] as f32 / 255.0;
                }
            }
        }

        Ok(Self {
            image,
            label,
            path: path.to_string_lossy().to_string(),
        })
    }

    /// Create from pre-loaded image data
    pub fn from_data(image: Vec<f32>, label: usize, path: String) -> Self {
        Self { image, label, path }
    }
}

/// Plate image dataset implementing Burn's Dataset trait.
///
/// Loads images lazily on demand for memory efficiency.
#[derive(Debug, Clone)]
pub struct CultureImageDataset {
    samples: Vec<(PathBuf, usize)>,
    image_size: usize,
}

impl CultureImageDataset {
    /// Create a new dataset from a list of (path, label) samples
    pub fn new(samples: Vec<(PathBuf, usize)>, image_size: usize) -> Self {
        Self {
            samples,
            image_size,
        }
    }

    /// Create from loader samples
    pub fn from_samples(samples: &[CultureSample], image_size: usize) -> Self {
        let pairs = samples.iter().map(|s| (s.path.clone(), s.label)).collect();
        Self::new(pairs, image_size)
    }

    /// Labels of all samples, in sample order
    pub fn labels(&self) -> Vec<usize> {
        self.samples.iter().map(|(_, label)| *label).collect()
    }

    /// Per-class sample counts, indexed by label
    pub fn class_counts(&self) -> [usize; 2] {
        let mut counts = [0usize; 2];
        for (_, label) in &self.samples {
            if *label < 2 {
                counts[*label] += 1;
            }
        }
        counts
    }
}

impl Dataset<CultureItem> for CultureImageDataset {
    fn get(&self, index: usize) -> Option<CultureItem> {
        let (path, label) = self.samples.get(index)?;
        CultureItem::from_path(path, *label, self.image_size).ok()
    }

    fn len(&self) -> usize {
        self.samples.len()
    }
}

/// A batch of plate images for training or evaluation
#[derive(Clone, Debug)]
pub struct CultureBatch<B: Backend> {
    /// Images with shape [batch_size, 3, height, width], ImageNet-normalized
    pub images: Tensor<B, 4>,
    /// Labels with shape [batch_size]
    pub targets: Tensor<B, 1, Int>,
}

/// Batcher for creating training batches
#[derive(Clone, Debug, Default)]
pub struct CultureBatcher {
    image_size: usize,
}

impl CultureBatcher {
    /// Create a new batcher
    pub fn new() -> Self {
        Self {
            image_size: IMAGE_SIZE,
        }
    }

    /// Create a batcher with a custom image size
    pub fn with_image_size(image_size: usize) -> Self {
        Self { image_size }
    }
}

impl<B: Backend> Batcher<B, CultureItem, CultureBatch<B>> for CultureBatcher {
    fn batch(&self, items: Vec<CultureItem>, device: &B::Device) -> CultureBatch<B> {
        let batch_size = items.len();
        let channels = 3;
        let height = self.image_size;
        let width = self.image_size;

        let images_data: Vec<f32> = items.iter().flat_map(|item| item.image.clone()).collect();
        let images = Tensor::<B, 4>::from_floats(
            TensorData::new(images_data, [batch_size, channels, height, width]),
            device,
        );

        // ImageNet normalization: (x - mean) / std, broadcast over the batch
        let mean = Tensor::<B, 4>::from_floats(
            TensorData::new(IMAGENET_MEAN.to_vec(), [1, 3, 1, 1]),
            device,
        );
        let std = Tensor::<B, 4>::from_floats(
            TensorData::new(IMAGENET_STD.to_vec(), [1, 3, 1, 1]),
            device,
        );
        let images = (images - mean) / std;

        let targets_data: Vec<i64> = items.iter().map(|item| item.label as i64).collect();
        let targets =
            Tensor::<B, 1, Int>::from_data(TensorData::new(targets_data, [batch_size]), device);

        CultureBatch { images, targets }
    }
}

/// Pooled dataset merging the train and validation splits for the final
/// refit. Indexing covers the train portion first, then validation.
#[derive(Clone, Debug)]
pub struct CombinedDataset {
    train_samples: Vec<(PathBuf, usize)>,
    validation_samples: Vec<(PathBuf, usize)>,
    image_size: usize,
}

impl CombinedDataset {
    /// Pool two sample lists into one dataset loading at `image_size`
    pub fn new(train: &[CultureSample], validation: &[CultureSample], image_size: usize) -> Self {
        Self {
            train_samples: train.iter().map(|s| (s.path.clone(), s.label)).collect(),
            validation_samples: validation
                .iter()
                .map(|s| (s.path.clone(), s.label))
                .collect(),
            image_size,
        }
    }

    /// Number of samples from the train split
    pub fn num_train(&self) -> usize {
        self.train_samples.len()
    }

    /// Number of samples from the validation split
    pub fn num_validation(&self) -> usize {
        self.validation_samples.len()
    }

    /// Labels of all pooled samples
    pub fn labels(&self) -> Vec<usize> {
        self.train_samples
            .iter()
            .chain(self.validation_samples.iter())
            .map(|(_, label)| *label)
            .collect()
    }
}

impl Dataset<CultureItem> for CombinedDataset {
    fn get(&self, index: usize) -> Option<CultureItem> {
        let (path, label) = if index < self.train_samples.len() {
            self.train_samples.get(index)?
        } else {
            self.validation_samples
                .get(index - self.train_samples.len())?
        };
        CultureItem::from_path(path, *label, self.image_size).ok()
    }

    fn len(&self) -> usize {
        self.train_samples.len() + self.validation_samples.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(name: &str, label: usize, id: usize) -> CultureSample {
        CultureSample {
            path: PathBuf::from(name),
            label,
            class_name: if label == 1 { "positive" } else { "negative" }.to_string(),
            id,
        }
    }

    #[test]
    fn test_culture_item_from_data() {
        let image = vec![0.5f32; 3 * 8 * 8];
        let item = CultureItem::from_data(image, 1, "plate.jpg".to_string());

        assert_eq!(item.label, 1);
        assert_eq!(item.image.len(), 3 * 8 * 8);
    }

    #[test]
    fn test_dataset_class_counts() {
        let samples = vec![
            (PathBuf::from("a.jpg"), 0),
            (PathBuf::from("b.jpg"), 0),
            (PathBuf::from("c.jpg"), 1),
        ];
        let dataset = CultureImageDataset::new(samples, 32);

        assert_eq!(dataset.len(), 3);
        assert_eq!(dataset.class_counts(), [2, 1]);
        assert_eq!(dataset.labels(), vec![0, 0, 1]);
    }

    #[test]
    fn test_combined_dataset_ordering() {
        let train = vec![sample("t1.jpg", 0, 0), sample("t2.jpg", 1, 1)];
        let validation = vec![sample("v1.jpg", 1, 2)];

        let combined = CombinedDataset::new(&train, &validation, IMAGE_SIZE);

        assert_eq!(combined.len(), 3);
        assert_eq!(combined.num_train(), 2);
        assert_eq!(combined.num_validation(), 1);
        assert_eq!(combined.labels(), vec![0, 1, 1]);
    }

    #[test]
    fn test_combined_dataset_loads_at_requested_size() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plate.png");
        image::RgbImage::new(10, 10).save(&path).unwrap();

        let train = vec![CultureSample {
            path,
            label: 0,
            class_name: "negative".to_string(),
            id: 0,
        }];
        let pooled = CombinedDataset::new(&train, &[], 8);

        let item = pooled.get(0).unwrap();
        assert_eq!(item.image.len(), 3 * 8 * 8);
    }

    #[test]
    fn test_batcher_shapes() {
        use crate::backend::DefaultBackend;

        let items = vec![
            CultureItem::from_data(vec![0.5f32; 3 * 8 * 8], 0, "a.jpg".to_string()),
            CultureItem::from_data(vec![0.25f32; 3 * 8 * 8], 1, "b.jpg".to_string()),
        ];

        let batcher = CultureBatcher::with_image_size(8);
        let device = Default::default();
        let batch: CultureBatch<DefaultBackend> = batcher.batch(items, &device);

        assert_eq!(batch.images.dims(), [2, 3, 8, 8]);
        assert_eq!(batch.targets.dims(), [2]);
    }
}
