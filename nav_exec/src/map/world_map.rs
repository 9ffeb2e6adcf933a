//! # World Map
//!
//! A square grid of evidence accumulators, one layer each for obstacles, navigable terrain and
//! samples. Cells only ever grow, the map is never decayed or reset during a mission.
//!
//! Cells are indexed `(row, col) = (world y, world x)` in every layer.

// ------------------------------------------------------------------------------------------------
// INCLUDES
// ------------------------------------------------------------------------------------------------

use image::{Rgb, RgbImage};
use ndarray::{Array2, Array3, ArrayView2, Zip};
use ndarray_stats::{errors::MinMaxError, QuantileExt};
use serde::{Deserialize, Serialize};

use crate::{loc::Pose, per::WorldCells};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Number of layers in the map.
const NUM_LAYERS: usize = 3;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Parameters of the world map.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct WorldMapParams {
    /// Number of cells along each side of the map.
    pub size_cells: usize,

    /// Amount added to a cell for each point landing in it.
    pub hit_weight: f64,

    /// Maximum roll and pitch either side of level at which the map is updated. Outside this
    /// the rectified image no longer lies on the ground plane.
    ///
    /// Units: degrees
    pub level_tolerance_deg: f64,
}

/// Accumulated world map.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorldMap {
    params: WorldMapParams,

    /// Raw map data, dimension order layer, row (y), col (x).
    data: Array3<f64>,
}

/// Number of cells holding evidence in each layer.
#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct MapStats {
    pub obstacle_cells: usize,
    pub navigable_cells: usize,
    pub sample_cells: usize,

    /// Cells with either navigable or obstacle evidence.
    pub mapped_cells: usize,
}

/// Comparison of the map against a ground truth map.
#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq)]
pub struct MapFidelity {
    /// Share of the ground truth navigable cells which the map correctly marks navigable.
    ///
    /// Units: percent
    pub percent_mapped: f64,

    /// Share of the cells the map marks navigable which are navigable in the ground truth.
    ///
    /// Units: percent
    pub fidelity: f64,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WorldMapLayer {
    Obstacle,
    Navigable,
    Sample,
}

#[derive(Debug, thiserror::Error)]
pub enum WorldMapError {
    #[error("The world map must have at least one cell")]
    NoCells,

    #[error("The hit weight must be positive and finite, got {0}")]
    InvalidHitWeight(f64),

    #[error("The level tolerance must be in [0, 180], got {0}")]
    InvalidLevelTolerance(f64),

    #[error("Cell ({0}, {1}) is outside the map")]
    OutsideMap(usize, usize),

    #[error("Ground truth shape {0:?} doesn't match the map shape {1:?}")]
    ShapeMismatch((usize, usize), (usize, usize)),

    #[error("Couldn't calculate min/max of map: {0}")]
    MinMaxError(MinMaxError),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Default for WorldMapParams {
    fn default() -> Self {
        Self {
            size_cells: 200,
            hit_weight: 255.0,
            level_tolerance_deg: 0.5,
        }
    }
}

impl WorldMapLayer {
    fn index(self) -> usize {
        match self {
            WorldMapLayer::Obstacle => 0,
            WorldMapLayer::Navigable => 1,
            WorldMapLayer::Sample => 2,
        }
    }
}

impl WorldMap {
    /// Create a new, empty map.
    pub fn new(params: WorldMapParams) -> Result<Self, WorldMapError> {
        if params.size_cells == 0 {
            return Err(WorldMapError::NoCells);
        }

        if !(params.hit_weight.is_finite() && params.hit_weight > 0.0) {
            return Err(WorldMapError::InvalidHitWeight(params.hit_weight));
        }

        if !(params.level_tolerance_deg >= 0.0 && params.level_tolerance_deg <= 180.0) {
            return Err(WorldMapError::InvalidLevelTolerance(
                params.level_tolerance_deg,
            ));
        }

        Ok(Self {
            params,
            data: Array3::zeros((NUM_LAYERS, params.size_cells, params.size_cells)),
        })
    }

    pub fn params(&self) -> &WorldMapParams {
        &self.params
    }

    pub fn size_cells(&self) -> usize {
        self.params.size_cells
    }

    /// Returns true if the rover is level enough for its observations to be mapped.
    pub fn pose_valid(&self, pose: &Pose) -> bool {
        pose.is_level(self.params.level_tolerance_deg)
    }

    /// Add one cycle's observations to the map.
    ///
    /// Nothing is changed if `pose_valid` is false. Each point adds the hit weight to its cell,
    /// so several points in the same cell each count. Returns whether the map was updated.
    ///
    /// All cells are checked before any are added, an error leaves the map untouched.
    pub fn accumulate(
        &mut self,
        obstacle: &WorldCells,
        navigable: &WorldCells,
        sample: &WorldCells,
        pose_valid: bool,
    ) -> Result<bool, WorldMapError> {
        if !pose_valid {
            return Ok(false);
        }

        let size = self.params.size_cells;
        for cells in [obstacle, navigable, sample].iter() {
            if let Some((x, y)) = cells.iter().find(|&(x, y)| x >= size || y >= size) {
                return Err(WorldMapError::OutsideMap(x, y));
            }
        }

        let weight = self.params.hit_weight;
        for &(layer, cells) in [
            (WorldMapLayer::Obstacle, obstacle),
            (WorldMapLayer::Navigable, navigable),
            (WorldMapLayer::Sample, sample),
        ]
        .iter()
        {
            let l = layer.index();
            for (x, y) in cells.iter() {
                self.data[[l, y, x]] += weight;
            }
        }

        Ok(true)
    }

    /// Get the value of a cell, or `None` if the cell is outside the map.
    #[cfg(test)]
    fn get(&self, layer: WorldMapLayer, x: usize, y: usize) -> Option<f64> {
        self.data.get([layer.index(), y, x]).copied()
    }

    /// View one layer, indexed `(y, x)`.
    pub fn layer(&self, layer: WorldMapLayer) -> ArrayView2<f64> {
        self.data.index_axis(ndarray::Axis(0), layer.index())
    }

    /// Largest value in a layer.
    pub fn max(&self, layer: WorldMapLayer) -> Result<f64, WorldMapError> {
        self.layer(layer)
            .max()
            .map(|v| *v)
            .map_err(WorldMapError::MinMaxError)
    }

    pub fn stats(&self) -> MapStats {
        let obs = self.layer(WorldMapLayer::Obstacle);
        let nav = self.layer(WorldMapLayer::Navigable);
        let sample = self.layer(WorldMapLayer::Sample);

        let count = |a: &ArrayView2<f64>| a.iter().filter(|&&v| v > 0.0).count();

        let mut mapped_cells = 0;
        Zip::from(&obs).and(&nav).for_each(|&o, &n| {
            if o > 0.0 || n > 0.0 {
                mapped_cells += 1;
            }
        });

        MapStats {
            obstacle_cells: count(&obs),
            navigable_cells: count(&nav),
            sample_cells: count(&sample),
            mapped_cells,
        }
    }

    /// Cells which the map considers navigable: navigable evidence at least as strong as
    /// obstacle evidence.
    pub fn navigable_mask(&self) -> Array2<bool> {
        let obs = self.layer(WorldMapLayer::Obstacle);
        let nav = self.layer(WorldMapLayer::Navigable);

        let mut mask = Array2::from_elem(nav.dim(), false);
        Zip::from(&mut mask)
            .and(&obs)
            .and(&nav)
            .for_each(|m, &o, &n| *m = n > 0.0 && n >= o);

        mask
    }

    /// Compare the map against a ground truth navigable mask of the same shape, indexed
    /// `(y, x)`, where any nonzero cell is navigable.
    pub fn fidelity(&self, ground_truth: &Array2<u8>) -> Result<MapFidelity, WorldMapError> {
        let mask = self.navigable_mask();

        if ground_truth.dim() != mask.dim() {
            return Err(WorldMapError::ShapeMismatch(ground_truth.dim(), mask.dim()));
        }

        let mut good = 0usize;
        let mut mapped = 0usize;
        let mut truth = 0usize;

        Zip::from(&mask).and(ground_truth).for_each(|&m, &g| {
            if m {
                mapped += 1;
            }
            if g != 0 {
                truth += 1;
            }
            if m && g != 0 {
                good += 1;
            }
        });

        let percent = |num: usize, den: usize| {
            if den == 0 {
                0.0
            } else {
                100.0 * num as f64 / den as f64
            }
        };

        Ok(MapFidelity {
            percent_mapped: percent(good, truth),
            fidelity: percent(good, mapped),
        })
    }

    /// Render the map as an image: obstacles in red, samples in green and navigable terrain in
    /// blue, saturating at 255.
    ///
    /// Obstacle evidence is hidden where the cell is considered navigable. The image is flipped
    /// vertically so world y increases up the image.
    pub fn to_image(&self) -> RgbImage {
        let obs = self.layer(WorldMapLayer::Obstacle);
        let nav = self.layer(WorldMapLayer::Navigable);
        let sample = self.layer(WorldMapLayer::Sample);
        let nav_mask = self.navigable_mask();

        let size = self.params.size_cells;
        let to_u8 = |v: f64| v.max(0.0).min(255.0) as u8;

        RgbImage::from_fn(size as u32, size as u32, |col, row| {
            let y = size - 1 - row as usize;
            let x = col as usize;

            let r = if nav_mask[[y, x]] { 0 } else { to_u8(obs[[y, x]]) };

            Rgb([r, to_u8(sample[[y, x]]), to_u8(nav[[y, x]])])
        })
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use ndarray::arr1;

    fn cells(pts: &[(usize, usize)]) -> WorldCells {
        WorldCells {
            x: pts.iter().map(|p| p.0).collect(),
            y: pts.iter().map(|p| p.1).collect(),
        }
    }

    fn small_map() -> WorldMap {
        WorldMap::new(WorldMapParams {
            size_cells: 10,
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_bad_params() {
        let bad = |p: WorldMapParams| WorldMap::new(p).is_err();

        assert!(bad(WorldMapParams {
            size_cells: 0,
            ..Default::default()
        }));
        assert!(bad(WorldMapParams {
            hit_weight: 0.0,
            ..Default::default()
        }));
        assert!(bad(WorldMapParams {
            level_tolerance_deg: -1.0,
            ..Default::default()
        }));
    }

    #[test]
    fn test_accumulate_counts_every_point() {
        let mut map = small_map();

        // Three navigable points in the same cell, one obstacle at (x = 2, y = 7)
        let applied = map
            .accumulate(
                &cells(&[(2, 7)]),
                &cells(&[(4, 5), (4, 5), (4, 5)]),
                &WorldCells::default(),
                true,
            )
            .unwrap();

        assert!(applied);
        assert_eq!(map.get(WorldMapLayer::Navigable, 4, 5), Some(3.0 * 255.0));
        assert_eq!(map.get(WorldMapLayer::Navigable, 5, 4), Some(0.0));
        assert_eq!(map.get(WorldMapLayer::Obstacle, 2, 7), Some(255.0));
        assert_eq!(map.layer(WorldMapLayer::Obstacle)[[7, 2]], 255.0);
        assert_eq!(map.get(WorldMapLayer::Sample, 4, 5), Some(0.0));
        assert_eq!(map.get(WorldMapLayer::Sample, 10, 0), None);
        assert_eq!(map.max(WorldMapLayer::Navigable).unwrap(), 765.0);
    }

    #[test]
    fn test_monotonic_and_gated() {
        let mut map = small_map();
        let obs = cells(&[(0, 0), (9, 9)]);
        let nav = cells(&[(1, 1), (1, 2)]);
        let sample = cells(&[(3, 3)]);

        let mut prev = map.clone();
        for i in 0..20 {
            let valid = i % 3 != 0;
            map.accumulate(&obs, &nav, &sample, valid).unwrap();

            if valid {
                Zip::from(&map.data)
                    .and(&prev.data)
                    .for_each(|&now, &before| assert!(now >= before));
                assert!(map != prev);
            } else {
                assert_eq!(map, prev);
            }

            prev = map.clone();
        }
    }

    #[test]
    fn test_outside_map_leaves_map_untouched() {
        let mut map = small_map();

        let res = map.accumulate(
            &cells(&[(1, 1)]),
            &cells(&[(2, 2), (3, 10)]),
            &WorldCells::default(),
            true,
        );

        assert!(matches!(res, Err(WorldMapError::OutsideMap(3, 10))));
        assert_eq!(map.stats(), MapStats::default());
    }

    #[test]
    fn test_pose_valid() {
        let map = small_map();
        assert!(map.pose_valid(&Pose::new(0.0, 0.0, 10.0, 359.6, 0.4)));
        assert!(!map.pose_valid(&Pose::new(0.0, 0.0, 10.0, 1.0, 0.0)));
    }

    #[test]
    fn test_stats_and_fidelity() {
        let mut map = small_map();

        map.accumulate(
            &cells(&[(0, 0), (1, 0), (1, 0)]),
            &cells(&[(1, 0), (2, 0), (3, 0)]),
            &cells(&[(5, 5)]),
            true,
        )
        .unwrap();

        assert_eq!(
            map.stats(),
            MapStats {
                obstacle_cells: 2,
                navigable_cells: 3,
                sample_cells: 1,
                mapped_cells: 4,
            }
        );

        // (1, 0) has more obstacle than navigable evidence, so only (2, 0) and (3, 0) count
        let mut truth = Array2::zeros((10, 10));
        truth[[0, 2]] = 1;
        truth[[0, 4]] = 1;
        truth[[0, 5]] = 1;
        truth[[0, 6]] = 1;

        let f = map.fidelity(&truth).unwrap();
        assert_eq!(f.percent_mapped, 25.0);
        assert_eq!(f.fidelity, 50.0);

        assert!(matches!(
            map.fidelity(&Array2::zeros((5, 5))),
            Err(WorldMapError::ShapeMismatch(_, _))
        ));
    }

    #[test]
    fn test_to_image() {
        let mut map = small_map();
        map.accumulate(
            &cells(&[(0, 0), (4, 0)]),
            &cells(&[(4, 0)]),
            &WorldCells {
                x: arr1(&[9]),
                y: arr1(&[9]),
            },
            true,
        )
        .unwrap();

        let img = map.to_image();

        // y = 0 is the bottom row of the image
        assert_eq!(img.get_pixel(0, 9), &Rgb([255, 0, 0]));
        assert_eq!(img.get_pixel(4, 9), &Rgb([0, 0, 255]));
        assert_eq!(img.get_pixel(9, 0), &Rgb([0, 255, 0]));
        assert_eq!(img.get_pixel(5, 5), &Rgb([0, 0, 0]));
    }
}
