//! # Map
//!
//! This module implements the [`WorldMap`], the persistent record of what the rover has seen, and
//! the helpers used to score it against a known map.

// ------------------------------------------------------------------------------------------------
// MODS
// ------------------------------------------------------------------------------------------------

/// Implements the [`WorldMap`] type
mod world_map;

// ------------------------------------------------------------------------------------------------
// EXPORTS
// ------------------------------------------------------------------------------------------------

use std::path::Path;

use ndarray::Array2;

pub use world_map::{
    MapFidelity, MapStats, WorldMap, WorldMapError, WorldMapLayer, WorldMapParams,
};

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Load a ground truth map image, where any nonzero pixel is navigable.
///
/// The image is read as greyscale and indexed `(row, col) = (world y, world x)`, the same as
/// the world map layers.
pub fn load_ground_truth<P: AsRef<Path>>(path: P) -> Result<Array2<u8>, image::ImageError> {
    let img = image::open(path)?.to_luma8();
    let (w, h) = img.dimensions();

    Ok(Array2::from_shape_fn((h as usize, w as usize), |(row, col)| {
        (img.get_pixel(col as u32, row as u32).0[0] != 0) as u8
    }))
}
