//! # Perception module
//!
//! Turns one forward camera image into the terrain information used by the rest of the rover:
//!
//! 1. [`rectify`] warps the image into a top-down view.
//! 2. [`classify`] thresholds the view into navigable, obstacle and sample masks.
//! 3. [`coords`] converts the masks into rover frame polar points (for the decision manager) and
//!    world map cells (for the world map).

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

pub mod classify;
pub mod coords;
mod params;
pub mod rectify;

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use image::{Rgb, RgbImage};
use log::trace;
use serde::Serialize;

use crate::loc::Pose;
use util::{module::State, session::Session};

pub use classify::TerrainMasks;
pub use coords::{PolarCoords, PolarSummary, WorldCells};
pub use params::PerMgrParams;
pub use rectify::{Rectified, Rectifier, RectifyError};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Perception manager.
#[derive(Debug, Clone)]
pub struct PerMgr {
    params: PerMgrParams,

    rectifier: Rectifier,

    /// Side length of the world map the cells are produced for.
    world_size_cells: usize,
}

/// Initialisation data for the [`PerMgr`].
#[derive(Debug, Clone, Copy)]
pub struct PerMgrInit {
    /// Path to the parameter file, relative to the params directory.
    pub params_path: &'static str,

    /// Side length of the world map.
    pub world_size_cells: usize,
}

/// Input data to perception.
#[derive(Debug, Clone)]
pub struct PerInput {
    pub image: RgbImage,
    pub pose: Pose,
}

/// Everything perception learnt from one image.
#[derive(Debug, Clone)]
pub struct PerOutput {
    pub rectified: Rectified,

    pub masks: TerrainMasks,

    /// Navigable pixels in rover frame polar coordinates.
    pub nav_polar: PolarCoords,

    /// Sample pixels in rover frame polar coordinates.
    pub sample_polar: PolarCoords,

    pub obs_cells: WorldCells,
    pub nav_cells: WorldCells,
    pub sample_cells: WorldCells,

    /// Obstacle mask in red, sample mask in green, navigable mask in blue.
    pub vision_image: RgbImage,
}

/// Status report for perception processing.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct PerStatusReport {
    pub num_nav_px: usize,
    pub num_obs_px: usize,
    pub num_sample_px: usize,

    /// Number of rectified pixels which came from inside the camera image.
    pub num_valid_px: usize,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum PerError {
    #[error("Failed to load PerMgrParams: {0}")]
    ParamLoadError(util::params::LoadError),

    #[error("Invalid camera calibration: {0}")]
    CalibrationError(RectifyError),

    #[error("The rectified pixel scale must be positive, got {0}")]
    InvalidScale(f64),

    #[error("The world map must contain at least one cell")]
    EmptyWorld,

    #[error("Could not rectify the camera image: {0}")]
    RectifyError(RectifyError),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl PerMgr {
    /// Create a new perception manager from already loaded parameters.
    ///
    /// Fails if the calibration is degenerate, which is a fatal configuration error.
    pub fn new(params: PerMgrParams, world_size_cells: usize) -> Result<Self, PerError> {
        if !(params.dst_size_px > 0.0) {
            return Err(PerError::InvalidScale(params.world_scale()));
        }

        if world_size_cells == 0 {
            return Err(PerError::EmptyWorld);
        }

        let rectifier = Rectifier::new(
            params.src_points_px,
            params.dst_size_px,
            params.bottom_offset_px,
            params.image_width_px,
            params.image_height_px,
        )
        .map_err(PerError::CalibrationError)?;

        Ok(Self {
            params,
            rectifier,
            world_size_cells,
        })
    }

    pub fn params(&self) -> &PerMgrParams {
        &self.params
    }
}

impl State for PerMgr {
    type InitData = PerMgrInit;
    type InitError = PerError;

    type InputData = PerInput;
    type OutputData = PerOutput;
    type StatusReport = PerStatusReport;
    type ProcError = PerError;

    fn init(init_data: Self::InitData, _session: &Session) -> Result<Self, Self::InitError> {
        let params =
            util::params::load(init_data.params_path).map_err(PerError::ParamLoadError)?;

        Self::new(params, init_data.world_size_cells)
    }

    fn proc(
        &mut self,
        input_data: &Self::InputData,
    ) -> Result<(Self::OutputData, Self::StatusReport), Self::ProcError> {
        let rectified = self
            .rectifier
            .warp(&input_data.image)
            .map_err(PerError::RectifyError)?;

        let masks = classify::classify(&rectified.image, &self.params);

        let nav_rover = coords::rover_coords(&masks.navigable);
        let obs_rover = coords::rover_coords(&masks.obstacle);
        let sample_rover = coords::rover_coords(&masks.sample);

        let scale = self.params.world_scale();
        let to_world = |c: &coords::RoverCoords| {
            coords::pix_to_world(c, &input_data.pose, self.world_size_cells, scale)
        };

        let output = PerOutput {
            nav_polar: coords::to_polar(&nav_rover),
            sample_polar: coords::to_polar(&sample_rover),
            obs_cells: to_world(&obs_rover),
            nav_cells: to_world(&nav_rover),
            sample_cells: to_world(&sample_rover),
            vision_image: vision_image(&masks),
            rectified,
            masks,
        };

        let (num_nav_px, num_obs_px, num_sample_px) = output.masks.counts();
        let report = PerStatusReport {
            num_nav_px,
            num_obs_px,
            num_sample_px,
            num_valid_px: classify::popcount(&output.rectified.valid),
        };

        trace!("PerMgr status: {:?}", report);

        Ok((output, report))
    }
}

impl PerOutput {
    /// Summary of the navigable terrain. Always present once an image has been processed, with a
    /// zero count if nothing navigable was seen.
    pub fn nav_summary(&self) -> PolarSummary {
        self.nav_polar.summary()
    }

    /// Summary of the visible samples, `None` if no sample pixels were seen.
    pub fn sample_summary(&self) -> Option<PolarSummary> {
        if self.sample_polar.is_empty() {
            None
        } else {
            Some(self.sample_polar.summary())
        }
    }
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Render the masks into a single image, obstacles red, samples green and navigable blue.
pub fn vision_image(masks: &TerrainMasks) -> RgbImage {
    let (rows, cols) = masks.navigable.dim();

    RgbImage::from_fn(cols as u32, rows as u32, |x, y| {
        let idx = [y as usize, x as usize];
        let on = |m: &ndarray::Array2<u8>| if m[idx] != 0 { 255 } else { 0 };

        Rgb([on(&masks.obstacle), on(&masks.sample), on(&masks.navigable)])
    })
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    fn mgr() -> PerMgr {
        PerMgr::new(PerMgrParams::default(), 200).unwrap()
    }

    #[test]
    fn test_bad_params() {
        let mut params = PerMgrParams::default();
        params.src_points_px = [[0.0, 0.0], [1.0, 1.0], [2.0, 2.0], [3.0, 3.0]];
        assert!(matches!(
            PerMgr::new(params, 200),
            Err(PerError::CalibrationError(_))
        ));

        let mut params = PerMgrParams::default();
        params.dst_size_px = -1.0;
        assert!(matches!(
            PerMgr::new(params, 200),
            Err(PerError::InvalidScale(_))
        ));

        assert!(matches!(
            PerMgr::new(PerMgrParams::default(), 0),
            Err(PerError::EmptyWorld)
        ));
    }

    #[test]
    fn test_all_bright_image() {
        let mut per = mgr();
        let input = PerInput {
            image: RgbImage::from_pixel(320, 160, Rgb([220, 220, 220])),
            pose: Pose::new(100.0, 100.0, 0.0, 0.0, 0.0),
        };

        let (out, report) = per.proc(&input).unwrap();

        // The region outside the camera view is black and so classified as obstacle. Grey pixels
        // blended at the edge of the view may land on the threshold and count as both.
        assert!(report.num_nav_px > 0);
        assert!(report.num_obs_px > 0);
        assert!(report.num_nav_px + report.num_obs_px >= 320 * 160);
        assert_eq!(report.num_sample_px, 0);
        assert!(report.num_valid_px >= report.num_nav_px);

        assert!(out.sample_summary().is_none());
        assert_eq!(out.nav_summary().count, report.num_nav_px);
        assert_eq!(out.nav_cells.len(), report.num_nav_px);

        // Terrain straight ahead gives a mean heading near zero
        assert!(out.nav_summary().mean_angle_deg.abs() < 10.0);

        // Vision image marks navigable pixels in blue
        let px = out.vision_image.get_pixel(160, 150);
        assert_eq!(px, &Rgb([0, 0, 255]));
    }

    #[test]
    fn test_wrong_image_size() {
        let mut per = mgr();
        let input = PerInput {
            image: RgbImage::new(10, 10),
            pose: Pose::default(),
        };

        assert!(matches!(per.proc(&input), Err(PerError::RectifyError(_))));
    }
}
