//! Culture Plate Dataset Loader
//!
//! Scans a class-per-directory image tree (`negative/`, `positive/`) and
//! produces labeled samples for the staged training pipeline. Images are
//! loaded lazily; only paths and labels are held in memory.

use std::path::{Path, PathBuf};

use image::{DynamicImage, ImageReader};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::utils::error::{CultureError, Result};
use crate::{IMAGE_SIZE, NEGATIVE_LABEL, POSITIVE_LABEL};

/// Directory names expected under the dataset root, in label order
pub const CLASS_DIRS: [&str; 2] = ["negative", "positive"];

/// A single plate image with its label and metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CultureSample {
    /// Path to the image file
    pub path: PathBuf,
    /// Binary label (0 = culture-negative, 1 = culture-positive)
    pub label: usize,
    /// Class name ("negative" or "positive")
    pub class_name: String,
    /// Unique sample ID
    pub id: usize,
}

/// Culture plate dataset with lazy image loading
#[derive(Debug)]
pub struct CultureDataset {
    /// Root directory of the dataset
    pub root_dir: PathBuf,
    /// All samples in the dataset
    pub samples: Vec<CultureSample>,
    /// Target image size (width, height)
    pub image_size: (u32, u32),
}

impl CultureDataset {
    /// Create a new dataset from a directory.
    ///
    /// The directory must be structured as:
    /// ```text
    /// root_dir/
    /// ├── negative/
    /// │   ├── plate_001.jpg
    /// │   └── plate_002.jpg
    /// └── positive/
    ///     └── ...
    /// ```
    pub fn new<P: AsRef<Path>>(root_dir: P) -> Result<Self> {
        let root_dir = root_dir.as_ref().to_path_buf();
        info!("Loading culture plate dataset from: {:?}", root_dir);

        if !root_dir.exists() {
            return Err(CultureError::PathNotFound(root_dir));
        }

        let mut samples = Vec::new();
        let mut sample_id: usize = 0;

        for (label, class_name) in CLASS_DIRS.iter().enumerate() {
            let class_dir = root_dir.join(class_name);
            if !class_dir.exists() {
                return Err(CultureError::Dataset(format!(
                    "Expected class directory '{}' under {:?}",
                    class_name, root_dir
                )));
            }

            let before = samples.len();
            for entry in WalkDir::new(&class_dir)
                .min_depth(1)
                .max_depth(1)
                .into_iter()
                .filter_map(|e| e.ok())
            {
                let path = entry.path().to_path_buf();

                // Only include image files
                if let Some(ext) = path.extension() {
                    let ext = ext.to_string_lossy().to_lowercase();
                    if ["jpg", "jpeg", "png", "bmp"].contains(&ext.as_str()) {
                        samples.push(CultureSample {
                            path,
                            label,
                            class_name: class_name.to_string(),
                            id: sample_id,
                        });
                        sample_id += 1;
                    }
                }
            }

            debug!(
                "Class '{}' (label {}): {} samples",
                class_name,
                label,
                samples.len() - before
            );
        }

        if samples.is_empty() {
            return Err(CultureError::EmptyDataset);
        }

        info!("Loaded {} total samples", samples.len());

        Ok(Self {
            root_dir,
            samples,
            image_size: (IMAGE_SIZE as u32, IMAGE_SIZE as u32),
        })
    }

    /// Get the number of samples in the dataset
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Check if the dataset is empty
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Load an image from disk and resize it to the target size
    pub fn load_image(&self, sample: &CultureSample) -> Result<DynamicImage> {
        let img = ImageReader::open(&sample.path)
            .map_err(|e| CultureError::ImageLoad(sample.path.clone(), e.to_string()))?
            .decode()
            .map_err(|e| CultureError::ImageLoad(sample.path.clone(), e.to_string()))?;

        Ok(img.resize_exact(
            self.image_size.0,
            self.image_size.1,
            image::imageops::FilterType::Triangle,
        ))
    }

    /// Shuffle the samples in place with a given seed
    pub fn shuffle(&mut self, seed: u64) {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        self.samples.shuffle(&mut rng);
    }

    /// Per-class sample counts, indexed by label
    pub fn class_counts(&self) -> [usize; 2] {
        let mut counts = [0usize; 2];
        for sample in &self.samples {
            counts[sample.label] += 1;
        }
        counts
    }

    /// Labels of all samples, in sample order
    pub fn labels(&self) -> Vec<usize> {
        self.samples.iter().map(|s| s.label).collect()
    }

    /// Get statistics about the dataset
    pub fn get_stats(&self) -> DatasetStats {
        let counts = self.class_counts();
        DatasetStats {
            total_samples: self.samples.len(),
            negatives: counts[NEGATIVE_LABEL],
            positives: counts[POSITIVE_LABEL],
        }
    }
}

/// Class balance statistics about the dataset
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetStats {
    pub total_samples: usize,
    pub negatives: usize,
    pub positives: usize,
}

impl DatasetStats {
    /// Fraction of culture-positive samples
    pub fn positive_prevalence(&self) -> f64 {
        if self.total_samples == 0 {
            0.0
        } else {
            self.positives as f64 / self.total_samples as f64
        }
    }

    /// Print statistics to console
    pub fn print(&self) {
        println!("\n📊 Dataset Statistics:");
        println!("  Total samples: {}", self.total_samples);
        println!("  Culture-negative: {}", self.negatives);
        println!(
            "  Culture-positive: {} ({:.1}% prevalence)",
            self.positives,
            self.positive_prevalence() * 100.0
        );
    }
}
