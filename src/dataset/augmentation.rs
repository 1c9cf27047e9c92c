//! Data Augmentation Module
//!
//! Light augmentation applied to training items before batching. All
//! randomness comes from a caller-seeded RNG so the final refit replays
//! the exact augmentation stream of the run it mirrors.

use rand::Rng;
use rand_chacha::ChaCha8Rng;

use crate::dataset::burn_dataset::CultureItem;

/// Configuration for training-time augmentation
#[derive(Debug, Clone)]
pub struct AugmentConfig {
    /// Probability of a horizontal flip
    pub flip_probability: f64,
    /// Maximum brightness shift, applied uniformly in [-max, +max]
    pub max_brightness_shift: f32,
}

impl Default for AugmentConfig {
    fn default() -> Self {
        Self {
            flip_probability: 0.5,
            max_brightness_shift: 0.1,
        }
    }
}

impl AugmentConfig {
    /// Disable all augmentation (used for validation and evaluation)
    pub fn disabled() -> Self {
        Self {
            flip_probability: 0.0,
            max_brightness_shift: 0.0,
        }
    }
}

/// Augmenter operating on preprocessed CHW float items
pub struct Augmenter {
    config: AugmentConfig,
    image_size: usize,
}

impl Augmenter {
    pub fn new(config: AugmentConfig, image_size: usize) -> Self {
        Self { config, image_size }
    }

    /// Apply augmentation to one item, drawing from the shared epoch RNG
    pub fn apply(&self, item: &mut CultureItem, rng: &mut ChaCha8Rng) {
        if self.config.flip_probability > 0.0 && rng.gen::<f64>() < self.config.flip_probability {
            self.flip_horizontal(&mut item.image);
        }

        if self.config.max_brightness_shift > 0.0 {
            let shift = rng.gen_range(-self.config.max_brightness_shift..=self.config.max_brightness_shift);
            for v in item.image.iter_mut() {
                *v = (*v + shift).clamp(0.0, 1.0);
            }
        }
    }

    fn flip_horizontal(&self, image: &mut [f32]) {
        let size = self.image_size;
        for c in 0..3 {
            for y in 0..size {
                let row = c * size * size + y * size;
                image[row..row + size].reverse();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn item_with_gradient(size: usize) -> CultureItem {
        let mut image = vec![0.0f32; 3 * size * size];
        for c in 0..3 {
            for y in 0..size {
                for x in 0..size {
                    image[c * size * size + y * size + x] = x as f32 / size as f32;
                }
            }
        }
        CultureItem::from_data(image, 0, "grad.jpg".to_string())
    }

    #[test]
    fn test_flip_reverses_rows() {
        let size = 4;
        let mut item = item_with_gradient(size);
        let original = item.image.clone();

        let augmenter = Augmenter::new(
            AugmentConfig {
                flip_probability: 1.0,
                max_brightness_shift: 0.0,
            },
            size,
        );
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        augmenter.apply(&mut item, &mut rng);

        for c in 0..3 {
            for y in 0..size {
                for x in 0..size {
                    let flipped = item.image[c * size * size + y * size + x];
                    let expected = original[c * size * size + y * size + (size - 1 - x)];
                    assert_eq!(flipped, expected);
                }
            }
        }
    }

    #[test]
    fn test_disabled_config_is_identity() {
        let size = 4;
        let mut item = item_with_gradient(size);
        let original = item.image.clone();

        let augmenter = Augmenter::new(AugmentConfig::disabled(), size);
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        augmenter.apply(&mut item, &mut rng);

        assert_eq!(item.image, original);
    }

    #[test]
    fn test_same_seed_same_augmentation() {
        let size = 4;
        let augmenter = Augmenter::new(AugmentConfig::default(), size);

        let mut a = item_with_gradient(size);
        let mut b = item_with_gradient(size);

        let mut rng_a = ChaCha8Rng::seed_from_u64(99);
        let mut rng_b = ChaCha8Rng::seed_from_u64(99);
        augmenter.apply(&mut a, &mut rng_a);
        augmenter.apply(&mut b, &mut rng_b);

        assert_eq!(a.image, b.image);
    }

    #[test]
    fn test_brightness_stays_in_range() {
        let size = 4;
        let mut item = item_with_gradient(size);

        let augmenter = Augmenter::new(
            AugmentConfig {
                flip_probability: 0.0,
                max_brightness_shift: 0.5,
            },
            size,
        );
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        augmenter.apply(&mut item, &mut rng);

        assert!(item.image.iter().all(|&v| (0.0..=1.0).contains(&v)));
    }
}
