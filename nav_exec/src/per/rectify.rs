//! # Perspective Rectifier
//!
//! Maps the forward camera image onto a top-down view of the ground in front of the rover. The
//! mapping is a single homography computed once from four calibration points, applied per frame
//! with an inverse warp:
//!
//! ```text
//!  camera image                      rectified image
//!   ┌──────────────────────┐          ┌──────────────────────┐
//!   │    3 ┌──────┐ 2      │          │                      │
//!   │     ╱        ╲       │   ──►    │        4 ┌─┐ 3       │
//!   │ 0  ╱__________╲ 1    │          │        1 └─┘ 2       │
//!   └──────────────────────┘          └──────────────────────┘
//! ```

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use image::{Rgb, RgbImage};
use nalgebra::{DMatrix, DVector, Matrix3, Point2, Vector3};
use ndarray::Array2;

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Minimum triangle area (in square pixels) between any three calibration points. Below this the
/// points are considered collinear.
const MIN_CALIB_TRIANGLE_AREA_PX2: f64 = 1e-6;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Applies a fixed perspective transform to camera images.
#[derive(Debug, Clone)]
pub struct Rectifier {
    /// Maps rectified pixel coordinates back into the camera image.
    img_from_rect: Matrix3<f64>,

    width: u32,
    height: u32,
}

/// Output of the rectifier.
#[derive(Debug, Clone)]
pub struct Rectified {
    /// Top-down image, same dimensions as the input.
    pub image: RgbImage,

    /// 1 where at least half of the rectified pixel's bilinear sample came from inside the
    /// camera image, 0 elsewhere.
    ///
    /// Shape: `(rows, cols)`
    pub valid: Array2<u8>,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum RectifyError {
    #[error("Calibration points {0:?} are degenerate (three or more are collinear)")]
    DegenerateCalibration([[f64; 2]; 4]),

    #[error("Cannot solve for the perspective transform from the calibration points")]
    NoSolution,

    #[error("Expected a {0}x{1} image but got {2}x{3}")]
    ImageSizeMismatch(u32, u32, u32, u32),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Rectifier {
    /// Build the rectifier from the calibration.
    ///
    /// `src_px` are the calibration points in the camera image. The destination points are
    /// derived from the image size as a `2 * dst_size` square, centred horizontally and raised
    /// `bottom_offset` from the bottom of the image.
    pub fn new(
        src_px: [[f64; 2]; 4],
        dst_size_px: f64,
        bottom_offset_px: f64,
        width: u32,
        height: u32,
    ) -> Result<Self, RectifyError> {
        let dst_px = dst_points(dst_size_px, bottom_offset_px, width, height);

        for pts in [src_px, dst_px].iter() {
            if is_degenerate(pts) {
                return Err(RectifyError::DegenerateCalibration(*pts));
            }
        }

        let rect_from_img =
            homography_from_4pt(&src_px, &dst_px).ok_or(RectifyError::NoSolution)?;
        let img_from_rect = rect_from_img
            .try_inverse()
            .ok_or(RectifyError::NoSolution)?;

        Ok(Self {
            img_from_rect,
            width,
            height,
        })
    }

    /// Warp a camera image into the top-down view.
    ///
    /// Each rectified pixel is sampled bilinearly from the camera image, anything sampled from
    /// outside the camera image is black. The validity mask is the warp of an all-ones image
    /// with the same black border, rounded.
    pub fn warp(&self, img: &RgbImage) -> Result<Rectified, RectifyError> {
        if img.dimensions() != (self.width, self.height) {
            return Err(RectifyError::ImageSizeMismatch(
                self.width,
                self.height,
                img.width(),
                img.height(),
            ));
        }

        let mut image = RgbImage::new(self.width, self.height);
        let mut valid = Array2::zeros((self.height as usize, self.width as usize));

        for (u, v, px) in image.enumerate_pixels_mut() {
            let src = self.map_to_image(Point2::new(u as f64, v as f64));

            let (sx, sy) = match src {
                Some(p) => (p.x, p.y),
                None => continue,
            };

            valid[[v as usize, u as usize]] = sample_validity(self.width, self.height, sx, sy);
            *px = sample_bilinear(img, sx, sy);
        }

        Ok(Rectified { image, valid })
    }

    /// Map a point in the rectified image into the camera image, or `None` if the point maps to
    /// infinity (it lies on the horizon).
    pub fn map_to_image(&self, p: Point2<f64>) -> Option<Point2<f64>> {
        let v = self.img_from_rect * Vector3::new(p.x, p.y, 1.0);

        if v.z.abs() < std::f64::EPSILON {
            return None;
        }

        Some(Point2::new(v.x / v.z, v.y / v.z))
    }
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Destination points of the calibration square in the rectified image, in the same order as
/// the source points.
pub fn dst_points(dst_size_px: f64, bottom_offset_px: f64, width: u32, height: u32) -> [[f64; 2]; 4] {
    let cx = width as f64 / 2.0;
    let bottom = height as f64 - bottom_offset_px;
    let top = bottom - 2.0 * dst_size_px;

    [
        [cx - dst_size_px, bottom],
        [cx + dst_size_px, bottom],
        [cx + dst_size_px, top],
        [cx - dst_size_px, top],
    ]
}

/// Compute H such that `dst ~ H * src` from exactly four correspondences, fixing `H[2][2] = 1`.
fn homography_from_4pt(src: &[[f64; 2]; 4], dst: &[[f64; 2]; 4]) -> Option<Matrix3<f64>> {
    let mut a = Vec::with_capacity(64);
    let mut b = Vec::with_capacity(8);

    for (s, d) in src.iter().zip(dst.iter()) {
        let (x, y) = (s[0], s[1]);
        let (u, v) = (d[0], d[1]);

        a.extend_from_slice(&[x, y, 1.0, 0.0, 0.0, 0.0, -u * x, -u * y]);
        b.push(u);
        a.extend_from_slice(&[0.0, 0.0, 0.0, x, y, 1.0, -v * x, -v * y]);
        b.push(v);
    }

    let a = DMatrix::from_row_slice(8, 8, &a);
    let h = a.lu().solve(&DVector::from_vec(b))?;

    Some(Matrix3::new(
        h[0], h[1], h[2], h[3], h[4], h[5], h[6], h[7], 1.0,
    ))
}

/// True if any three of the four points are (nearly) collinear.
fn is_degenerate(pts: &[[f64; 2]; 4]) -> bool {
    const TRIPLES: [(usize, usize, usize); 4] = [(0, 1, 2), (0, 1, 3), (0, 2, 3), (1, 2, 3)];

    TRIPLES.iter().any(|&(i, j, k)| {
        let (a, b, c) = (pts[i], pts[j], pts[k]);
        let cross = (b[0] - a[0]) * (c[1] - a[1]) - (b[1] - a[1]) * (c[0] - a[0]);

        !cross.is_finite() || 0.5 * cross.abs() < MIN_CALIB_TRIANGLE_AREA_PX2
    })
}

/// The four pixels around `(x, y)` with their bilinear weights, as `(x, y, weight)`.
fn bilinear_taps(x: f64, y: f64) -> [(f64, f64, f64); 4] {
    let x0 = x.floor();
    let y0 = y.floor();
    let fx = x - x0;
    let fy = y - y0;

    [
        (x0, y0, (1.0 - fx) * (1.0 - fy)),
        (x0 + 1.0, y0, fx * (1.0 - fy)),
        (x0, y0 + 1.0, (1.0 - fx) * fy),
        (x0 + 1.0, y0 + 1.0, fx * fy),
    ]
}

fn in_image(width: u32, height: u32, x: f64, y: f64) -> bool {
    x >= 0.0 && y >= 0.0 && x < width as f64 && y < height as f64
}

/// Bilinear sample of `img` at `(x, y)`, pixels outside the image are black.
fn sample_bilinear(img: &RgbImage, x: f64, y: f64) -> Rgb<u8> {
    let mut acc = [0.0f64; 3];

    for &(xi, yi, w) in bilinear_taps(x, y).iter() {
        if w == 0.0 || !in_image(img.width(), img.height(), xi, yi) {
            continue;
        }

        let p = img.get_pixel(xi as u32, yi as u32);
        for c in 0..3 {
            acc[c] += w * p[c] as f64;
        }
    }

    let mut out = [0u8; 3];
    for c in 0..3 {
        out[c] = acc[c].round().max(0.0).min(255.0) as u8;
    }

    Rgb(out)
}

/// Bilinear sample at `(x, y)` of an all-ones image of the given size with a zero border,
/// rounded to 0 or 1.
fn sample_validity(width: u32, height: u32, x: f64, y: f64) -> u8 {
    let inside: f64 = bilinear_taps(x, y)
        .iter()
        .filter(|&&(xi, yi, _)| in_image(width, height, xi, yi))
        .map(|&(_, _, w)| w)
        .sum();

    inside.round().max(0.0).min(1.0) as u8
}

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_calibration_maps_square() {
        let src = [[14.0, 140.0], [301.0, 140.0], [200.0, 96.0], [118.0, 96.0]];
        let rect = Rectifier::new(src, 5.0, 6.0, 320, 160).unwrap();

        // Each destination corner must map back onto its source corner
        for (s, d) in src.iter().zip(dst_points(5.0, 6.0, 320, 160).iter()) {
            let p = rect.map_to_image(Point2::new(d[0], d[1])).unwrap();
            assert_relative_eq!(p.x, s[0], epsilon = 1e-6);
            assert_relative_eq!(p.y, s[1], epsilon = 1e-6);
        }
    }

    #[test]
    fn test_degenerate_calibration() {
        let src = [[0.0, 0.0], [10.0, 10.0], [20.0, 20.0], [0.0, 30.0]];

        assert!(matches!(
            Rectifier::new(src, 5.0, 6.0, 320, 160),
            Err(RectifyError::DegenerateCalibration(_))
        ));

        // Zero size destination is degenerate too
        let src = [[14.0, 140.0], [301.0, 140.0], [200.0, 96.0], [118.0, 96.0]];
        assert!(matches!(
            Rectifier::new(src, 0.0, 6.0, 320, 160),
            Err(RectifyError::DegenerateCalibration(_))
        ));
    }

    #[test]
    fn test_identity_warp() {
        // Source square equal to the destination square gives an identity transform
        let dst = dst_points(20.0, 10.0, 64, 48);
        let rect = Rectifier::new(dst, 20.0, 10.0, 64, 48).unwrap();

        let mut img = RgbImage::new(64, 48);
        img.put_pixel(10, 20, Rgb([200, 100, 50]));

        let out = rect.warp(&img).unwrap();

        assert_eq!(out.image.get_pixel(10, 20), &Rgb([200, 100, 50]));
        assert_eq!(out.image.get_pixel(11, 20), &Rgb([0, 0, 0]));
        assert!(out.valid.iter().all(|&v| v == 1));
    }

    #[test]
    fn test_validity_mask() {
        let src = [[14.0, 140.0], [301.0, 140.0], [200.0, 96.0], [118.0, 96.0]];
        let rect = Rectifier::new(src, 5.0, 6.0, 320, 160).unwrap();

        let img = RgbImage::from_pixel(320, 160, Rgb([255, 255, 255]));
        let out = rect.warp(&img).unwrap();

        // Ahead of the rover is seen by the camera, the ground beside it at the bottom corners
        // of the view is not
        assert_eq!(out.valid[[150, 160]], 1);
        assert_eq!(out.valid[[0, 160]], 1);
        assert_eq!(out.image.get_pixel(160, 150), &Rgb([255, 255, 255]));
        assert_eq!(out.valid[[159, 0]], 0);
        assert_eq!(out.valid[[159, 319]], 0);
        assert_eq!(out.image.get_pixel(0, 159), &Rgb([0, 0, 0]));

        // Mask values never leave {0, 1}
        assert!(out.valid.iter().all(|&v| v <= 1));
    }

    #[test]
    fn test_validity_follows_sample_weight() {
        // Half or more of the sample inside the image counts as valid
        assert_eq!(sample_validity(10, 10, 5.0, 5.0), 1);
        assert_eq!(sample_validity(10, 10, -0.4, 5.0), 1);
        assert_eq!(sample_validity(10, 10, -0.6, 5.0), 0);
        assert_eq!(sample_validity(10, 10, 9.4, 5.0), 1);
        assert_eq!(sample_validity(10, 10, 9.6, 5.0), 0);
        assert_eq!(sample_validity(10, 10, 9.0, 9.0), 1);
        assert_eq!(sample_validity(10, 10, 50.0, -20.0), 0);

        // Colour fades into the black border with the same weights
        let img = RgbImage::from_pixel(10, 10, Rgb([200, 200, 200]));
        assert_eq!(sample_bilinear(&img, -0.25, 5.0), Rgb([150, 150, 150]));
        assert_eq!(sample_bilinear(&img, 9.0, 9.0), Rgb([200, 200, 200]));
    }

    #[test]
    fn test_bright_pixels_are_valid() {
        let src = [[14.0, 140.0], [301.0, 140.0], [200.0, 96.0], [118.0, 96.0]];
        let rect = Rectifier::new(src, 5.0, 6.0, 320, 160).unwrap();

        let img = RgbImage::from_pixel(320, 160, Rgb([220, 220, 220]));
        let out = rect.warp(&img).unwrap();

        // Anything bright enough to be navigable was mostly sampled from the camera image
        for (u, v, px) in out.image.enumerate_pixels() {
            if px.0.iter().all(|&c| c >= 160) {
                assert_eq!(out.valid[[v as usize, u as usize]], 1, "pixel ({}, {})", u, v);
            }
        }
    }

    #[test]
    fn test_size_mismatch() {
        let dst = dst_points(20.0, 10.0, 64, 48);
        let rect = Rectifier::new(dst, 20.0, 10.0, 64, 48).unwrap();

        assert_eq!(
            rect.warp(&RgbImage::new(32, 48)).unwrap_err(),
            RectifyError::ImageSizeMismatch(64, 48, 32, 48)
        );
    }
}
