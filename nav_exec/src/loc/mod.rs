//! # Localisation module
//!
//! The rover does not estimate its own pose, the simulator bridge supplies it every cycle. This
//! module holds the [`Pose`] type and the checks made on it before it is used for mapping.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use nalgebra::Vector2;
use serde::{Deserialize, Serialize};

use comms_if::sim::SimTelemetry;
use util::maths;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// The current pose of the rover in the world frame.
///
/// Attitude angles are in degrees in the range [0, 360), so a slight negative pitch is reported
/// as a value just below 360.
#[derive(Debug, Copy, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Pose {
    /// Position of the rover in the world frame.
    ///
    /// Units: world map cells
    pub position_m: Vector2<f64>,

    /// Heading, anticlockwise from the world x axis.
    ///
    /// Units: degrees
    pub yaw_deg: f64,

    /// Units: degrees
    pub pitch_deg: f64,

    /// Units: degrees
    pub roll_deg: f64,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum PoseError {
    #[error("Pose position is not finite: ({0}, {1})")]
    NonFinitePosition(f64, f64),

    #[error("Pose {0} angle {1} is outside the range [0, 360)")]
    AngleOutOfRange(&'static str, f64),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Pose {
    pub fn new(x: f64, y: f64, yaw_deg: f64, pitch_deg: f64, roll_deg: f64) -> Self {
        Self {
            position_m: Vector2::new(x, y),
            yaw_deg,
            pitch_deg,
            roll_deg,
        }
    }

    /// Build a pose from the position and attitude fields of a telemetry message.
    pub fn from_telemetry(telem: &SimTelemetry) -> Self {
        Self::new(
            telem.position[0],
            telem.position[1],
            telem.yaw,
            telem.pitch,
            telem.roll,
        )
    }

    /// Check the pose is numerically valid.
    ///
    /// All values must be finite and every angle must be in [0, 360). NaN fails both checks.
    pub fn validate(&self) -> Result<(), PoseError> {
        if !(self.position_m.x.is_finite() && self.position_m.y.is_finite()) {
            return Err(PoseError::NonFinitePosition(
                self.position_m.x,
                self.position_m.y,
            ));
        }

        for &(name, angle) in [
            ("yaw", self.yaw_deg),
            ("pitch", self.pitch_deg),
            ("roll", self.roll_deg),
        ]
        .iter()
        {
            if !(angle >= 0.0 && angle < 360.0) {
                return Err(PoseError::AngleOutOfRange(name, angle));
            }
        }

        Ok(())
    }

    /// Returns true if both roll and pitch are within `tolerance_deg` of level.
    ///
    /// Both sides of the 0/360 wrap count, so a tolerance of 0.5 accepts [0, 0.5] and
    /// [359.5, 360).
    pub fn is_level(&self, tolerance_deg: f64) -> bool {
        let within = |a: f64| a <= tolerance_deg || a >= 360.0 - tolerance_deg;

        within(self.roll_deg) && within(self.pitch_deg)
    }

    /// Signed roll and pitch, in (-180, 180], for logging.
    pub fn signed_roll_pitch_deg(&self) -> (f64, f64) {
        (
            maths::signed_deg(self.roll_deg),
            maths::signed_deg(self.pitch_deg),
        )
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_is_level() {
        assert!(Pose::new(0.0, 0.0, 90.0, 0.0, 0.0).is_level(0.5));
        assert!(Pose::new(0.0, 0.0, 90.0, 0.5, 359.5).is_level(0.5));
        assert!(Pose::new(0.0, 0.0, 90.0, 359.9, 0.3).is_level(0.5));

        assert!(!Pose::new(0.0, 0.0, 90.0, 0.51, 0.0).is_level(0.5));
        assert!(!Pose::new(0.0, 0.0, 90.0, 0.0, 359.4).is_level(0.5));
        assert!(!Pose::new(0.0, 0.0, 90.0, 180.0, 0.0).is_level(0.5));
    }

    #[test]
    fn test_validate() {
        assert_eq!(Pose::new(10.0, 20.0, 359.9, 0.0, 0.0).validate(), Ok(()));

        assert!(matches!(
            Pose::new(std::f64::NAN, 20.0, 0.0, 0.0, 0.0).validate(),
            Err(PoseError::NonFinitePosition(_, _))
        ));
        assert!(matches!(
            Pose::new(10.0, 20.0, 360.0, 0.0, 0.0).validate(),
            Err(PoseError::AngleOutOfRange("yaw", _))
        ));
        assert!(matches!(
            Pose::new(10.0, 20.0, 0.0, -1.0, 0.0).validate(),
            Err(PoseError::AngleOutOfRange("pitch", _))
        ));
        assert!(matches!(
            Pose::new(10.0, 20.0, 0.0, 0.0, std::f64::NAN).validate(),
            Err(PoseError::AngleOutOfRange("roll", _))
        ));
    }
}
