//! # Terrain Classifier
//!
//! Thresholds a rectified image into three binary masks. Masks are `(rows, cols)` arrays of 0/1,
//! matching the image's `(height, width)`.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use image::RgbImage;
use ndarray::{Array2, Zip};

use super::PerMgrParams;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Result of classifying one rectified image.
#[derive(Debug, Clone, PartialEq)]
pub struct TerrainMasks {
    /// Bright ground the rover can drive on.
    pub navigable: Array2<u8>,

    /// Dark rock walls and boulders.
    pub obstacle: Array2<u8>,

    /// Gold coloured sample rocks.
    pub sample: Array2<u8>,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Direction of a colour threshold comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Thresh {
    /// Every channel at or above the threshold.
    AtOrAbove,

    /// Every channel at or below the threshold.
    AtOrBelow,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl TerrainMasks {
    /// Number of set pixels in each mask, `(navigable, obstacle, sample)`.
    pub fn counts(&self) -> (usize, usize, usize) {
        (
            popcount(&self.navigable),
            popcount(&self.obstacle),
            popcount(&self.sample),
        )
    }
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Classify a rectified image into navigable, obstacle and sample masks.
///
/// Navigable and obstacle thresholds are both inclusive, so a pixel sitting exactly on the
/// threshold is set in both masks.
pub fn classify(img: &RgbImage, params: &PerMgrParams) -> TerrainMasks {
    TerrainMasks {
        navigable: color_thresh(img, params.nav_thresh_rgb, Thresh::AtOrAbove),
        obstacle: color_thresh(img, params.obs_thresh_rgb, Thresh::AtOrBelow),
        sample: find_samples(img, params.sample_lower_rgb, params.sample_upper_rgb),
    }
}

/// Set a pixel when all three channels pass the threshold comparison.
pub fn color_thresh(img: &RgbImage, thresh: [u8; 3], dir: Thresh) -> Array2<u8> {
    let (w, h) = img.dimensions();

    Array2::from_shape_fn((h as usize, w as usize), |(row, col)| {
        let px = img.get_pixel(col as u32, row as u32).0;

        let pass = px.iter().zip(thresh.iter()).all(|(&c, &t)| match dir {
            Thresh::AtOrAbove => c >= t,
            Thresh::AtOrBelow => c <= t,
        });

        pass as u8
    })
}

/// Set a pixel whose colour lies inside the inclusive box `[lower, upper]`.
pub fn find_samples(img: &RgbImage, lower: [u8; 3], upper: [u8; 3]) -> Array2<u8> {
    let above = color_thresh(img, lower, Thresh::AtOrAbove);
    let below = color_thresh(img, upper, Thresh::AtOrBelow);

    let mut sample = Array2::zeros(above.dim());
    Zip::from(&mut sample)
        .and(&above)
        .and(&below)
        .for_each(|s, &a, &b| *s = a & b);

    sample
}

/// Number of set pixels in a mask.
pub fn popcount(mask: &Array2<u8>) -> usize {
    mask.iter().filter(|&&v| v != 0).count()
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------
