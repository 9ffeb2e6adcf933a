//! # Perception Parameters

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Parameters for the perception manager.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PerMgrParams {
    // ---- CALIBRATION ----
    /// Width of the camera images.
    ///
    /// Units: pixels
    pub image_width_px: u32,

    /// Height of the camera images.
    ///
    /// Units: pixels
    pub image_height_px: u32,

    /// Four calibration points in the camera image, `[x, y]`, ordered bottom-left,
    /// bottom-right, top-right, top-left. These are the corners of a one world unit square grid
    /// cell seen by the camera.
    ///
    /// Units: pixels
    pub src_points_px: [[f64; 2]; 4],

    /// Half width of the calibration square once rectified. One world unit spans
    /// `2 * dst_size_px` rectified pixels.
    ///
    /// Units: pixels
    pub dst_size_px: f64,

    /// Distance between the bottom of the rectified image and the bottom edge of the
    /// calibration square, the camera cannot see the ground directly under the rover.
    ///
    /// Units: pixels
    pub bottom_offset_px: f64,

    // ---- CLASSIFICATION ----
    /// Pixels with every channel at or above this are navigable.
    pub nav_thresh_rgb: [u8; 3],

    /// Pixels with every channel at or below this are obstacles.
    pub obs_thresh_rgb: [u8; 3],

    /// Lower corner of the sample colour box, inclusive.
    pub sample_lower_rgb: [u8; 3],

    /// Upper corner of the sample colour box, inclusive.
    pub sample_upper_rgb: [u8; 3],
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl PerMgrParams {
    /// Number of rectified pixels per world unit.
    pub fn world_scale(&self) -> f64 {
        2.0 * self.dst_size_px
    }
}

impl Default for PerMgrParams {
    /// Calibration of the simulator's 320x160 forward camera.
    fn default() -> Self {
        Self {
            image_width_px: 320,
            image_height_px: 160,
            src_points_px: [[14.0, 140.0], [301.0, 140.0], [200.0, 96.0], [118.0, 96.0]],
            dst_size_px: 5.0,
            bottom_offset_px: 6.0,
            nav_thresh_rgb: [160, 160, 160],
            obs_thresh_rgb: [160, 160, 160],
            sample_lower_rgb: [100, 100, 0],
            sample_upper_rgb: [250, 250, 60],
        }
    }
}
