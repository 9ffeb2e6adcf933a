//! # Geometric transforms
//!
//! Conversions between rectified image pixels, the rover frame (origin at the bottom centre of
//! the rectified image, x forwards, y left), rover frame polar coordinates and world map cells.
//!
//! All functions here are pure.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use ndarray::{Array1, Array2, Zip};
use serde::{Deserialize, Serialize};

use crate::loc::Pose;
use util::maths;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Cartesian points in the rover frame, one per classified pixel.
///
/// Units: rectified pixels
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RoverCoords {
    pub x: Array1<f64>,
    pub y: Array1<f64>,
}

/// Rover frame points in polar form.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PolarCoords {
    /// Units: rectified pixels
    pub dists: Array1<f64>,

    /// Angle from the rover's forward axis, positive to the left.
    ///
    /// Units: radians
    pub angles: Array1<f64>,
}

/// Aggregate of a [`PolarCoords`] set, the form consumed by the decision manager.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PolarSummary {
    /// Number of points summarised.
    pub count: usize,

    /// Units: degrees
    pub mean_angle_deg: f64,

    /// Units: degrees
    pub median_angle_deg: f64,

    /// Units: rectified pixels
    pub mean_dist: f64,
}

/// World map cell indices, one per point.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorldCells {
    pub x: Array1<usize>,
    pub y: Array1<usize>,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl RoverCoords {
    pub fn len(&self) -> usize {
        self.x.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }
}

impl PolarCoords {
    pub fn len(&self) -> usize {
        self.dists.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dists.is_empty()
    }

    /// Summarise the points.
    ///
    /// An empty set summarises to a zero count with all angles and distances zero.
    pub fn summary(&self) -> PolarSummary {
        let angles_deg: Vec<f64> = self.angles.iter().map(|a| a.to_degrees()).collect();

        PolarSummary {
            count: self.len(),
            mean_angle_deg: maths::mean(&angles_deg).unwrap_or(0.0),
            median_angle_deg: maths::median(&angles_deg).unwrap_or(0.0),
            mean_dist: self.dists.mean().unwrap_or(0.0),
        }
    }
}

impl WorldCells {
    pub fn len(&self) -> usize {
        self.x.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    /// Iterate over `(x, y)` cell pairs.
    pub fn iter(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.x.iter().copied().zip(self.y.iter().copied())
    }
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Convert the set pixels of a mask into rover frame coordinates.
///
/// For a mask of `h` rows and `w` columns a pixel at `(row, col)` becomes
/// `x = h - row, y = w / 2 - col`. Points are produced in row-major scan order.
pub fn rover_coords(mask: &Array2<u8>) -> RoverCoords {
    let (h, w) = mask.dim();
    let (h, half_w) = (h as f64, w as f64 / 2.0);

    let (x, y): (Vec<f64>, Vec<f64>) = mask
        .indexed_iter()
        .filter(|(_, v)| **v != 0)
        .map(|((row, col), _)| (h - row as f64, half_w - col as f64))
        .unzip();

    RoverCoords {
        x: Array1::from(x),
        y: Array1::from(y),
    }
}

/// Convert rover frame points to polar form, angles in radians.
pub fn to_polar(coords: &RoverCoords) -> PolarCoords {
    let mut dists = Array1::<f64>::zeros(coords.len());
    let mut angles = Array1::<f64>::zeros(coords.len());

    Zip::from(&mut dists)
        .and(&mut angles)
        .and(&coords.x)
        .and(&coords.y)
        .for_each(|d, a, &x, &y| {
            *d = x.hypot(y);
            *a = y.atan2(x);
        });

    PolarCoords { dists, angles }
}

/// Rotate rover frame points anticlockwise by `yaw_deg`.
pub fn rotate(coords: &RoverCoords, yaw_deg: f64) -> RoverCoords {
    let (sin, cos) = yaw_deg.to_radians().sin_cos();

    RoverCoords {
        x: &coords.x * cos - &coords.y * sin,
        y: &coords.x * sin + &coords.y * cos,
    }
}

/// Scale rotated points from rectified pixels into world units and offset them by the rover's
/// world position.
pub fn translate(coords: &RoverCoords, x_pos: f64, y_pos: f64, scale: f64) -> RoverCoords {
    RoverCoords {
        x: coords.x.mapv(|v| v / scale + x_pos),
        y: coords.y.mapv(|v| v / scale + y_pos),
    }
}

/// Map rover frame points into world map cells for a map of `world_size` by `world_size` cells.
///
/// Coordinates are truncated towards zero and then clamped into `[0, world_size - 1]`, so a
/// point outside the map lands on the nearest edge cell. Non-finite coordinates land on cell 0
/// (or the far edge for positive infinity).
pub fn pix_to_world(coords: &RoverCoords, pose: &Pose, world_size: usize, scale: f64) -> WorldCells {
    let rotated = rotate(coords, pose.yaw_deg);
    let world = translate(&rotated, pose.position_m.x, pose.position_m.y, scale);

    let max = world_size.saturating_sub(1) as f64;
    let to_cell = |v: f64| maths::clamp(&v.trunc(), &0.0, &max).max(0.0) as usize;

    WorldCells {
        x: world.x.mapv(to_cell),
        y: world.y.mapv(to_cell),
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::arr1;
    use rand::{rngs::SmallRng, Rng, SeedableRng};

    #[test]
    fn test_empty_mask() {
        let coords = rover_coords(&Array2::zeros((160, 320)));
        assert!(coords.is_empty());

        let polar = to_polar(&coords);
        assert!(polar.is_empty());

        let summary = polar.summary();
        assert_eq!(summary.count, 0);
        assert_eq!(summary.mean_angle_deg, 0.0);

        let cells = pix_to_world(&coords, &Pose::default(), 200, 10.0);
        assert!(cells.is_empty());
    }

    #[test]
    fn test_rover_coords() {
        let mut mask = Array2::zeros((4, 6));
        mask[[3, 3]] = 1;
        mask[[0, 0]] = 1;

        let c = rover_coords(&mask);

        // Row-major order: (0, 0) first
        assert_eq!(c.x, arr1(&[4.0, 1.0]));
        assert_eq!(c.y, arr1(&[3.0, 0.0]));
    }

    #[test]
    fn test_polar() {
        let c = RoverCoords {
            x: arr1(&[1.0, 0.0, 3.0]),
            y: arr1(&[1.0, 2.0, -4.0]),
        };

        let p = to_polar(&c);

        assert_relative_eq!(p.dists[0], 2f64.sqrt());
        assert_relative_eq!(p.dists[2], 5.0);
        assert_relative_eq!(p.angles[0], std::f64::consts::FRAC_PI_4);
        assert_relative_eq!(p.angles[1], std::f64::consts::FRAC_PI_2);

        let s = p.summary();
        assert_eq!(s.count, 3);
        assert_relative_eq!(s.median_angle_deg, 45.0);
        assert_relative_eq!(
            s.mean_angle_deg,
            (45.0 + 90.0 + (-4f64).atan2(3.0).to_degrees()) / 3.0
        );
    }

    #[test]
    fn test_pix_to_world() {
        // A point 10 px ahead of a rover at (100, 50) facing +y lands 1 cell up in y
        let c = RoverCoords {
            x: arr1(&[10.0]),
            y: arr1(&[0.0]),
        };
        let pose = Pose::new(100.0, 50.0, 90.0, 0.0, 0.0);

        let w = pix_to_world(&c, &pose, 200, 10.0);

        assert_eq!(w.x[0], 100);
        assert_eq!(w.y[0], 51);
    }

    #[test]
    fn test_pix_to_world_truncates() {
        let c = RoverCoords {
            x: arr1(&[19.0, -5.0]),
            y: arr1(&[0.0, 0.0]),
        };
        let pose = Pose::new(10.0, 10.0, 0.0, 0.0, 0.0);

        let w = pix_to_world(&c, &pose, 200, 10.0);

        // 11.9 -> 11, 9.5 -> 9
        assert_eq!(w.x, arr1(&[11, 9]));
    }

    #[test]
    fn test_pix_to_world_always_in_map() {
        let mut rng = SmallRng::seed_from_u64(42);
        let size = 200;

        for _ in 0..200 {
            let pose = Pose::new(
                rng.gen_range(-1e6..1e6),
                rng.gen_range(-1e6..1e6),
                rng.gen_range(0.0..360.0),
                0.0,
                0.0,
            );

            let n = 50;
            let c = RoverCoords {
                x: (0..n).map(|_| rng.gen_range(-1e9..1e9)).collect(),
                y: (0..n).map(|_| rng.gen_range(-1e9..1e9)).collect(),
            };

            let w = pix_to_world(&c, &pose, size, 10.0);

            assert_eq!(w.len(), n);
            assert!(w.iter().all(|(x, y)| x < size && y < size));
        }

        // Non-finite points saturate too
        let c = RoverCoords {
            x: arr1(&[std::f64::NAN, std::f64::INFINITY, std::f64::NEG_INFINITY]),
            y: arr1(&[0.0, 0.0, 0.0]),
        };
        let w = pix_to_world(&c, &Pose::default(), size, 10.0);
        assert_eq!(w.x, arr1(&[0, size - 1, 0]));
    }
}
