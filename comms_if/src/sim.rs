//! # Simulator Bridge Communications Module
//!
//! The bridge delivers one [`SimTelemetry`] message per control cycle and accepts one [`SimCmd`]
//! in return. Both are plain JSON messages, the camera frame being carried as a base64 encoded
//! PNG or JPEG.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use base64::DecodeError;
use image::{DynamicImage, ImageError, ImageOutputFormat, RgbImage};
use serde::{Deserialize, Serialize};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Telemetry sent by the simulator each cycle.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct SimTelemetry {
    /// The forward camera frame, a PNG or JPEG image encoded in base64.
    pub image: String,

    /// Position of the rover in the world frame, `[x, y]`.
    ///
    /// Units: world map cells
    pub position: [f64; 2],

    /// Yaw of the rover, in the range [0, 360).
    ///
    /// Units: degrees
    pub yaw: f64,

    /// Pitch of the rover, in the range [0, 360).
    ///
    /// Units: degrees
    pub pitch: f64,

    /// Roll of the rover, in the range [0, 360).
    ///
    /// Units: degrees
    pub roll: f64,

    /// Forward speed of the rover.
    ///
    /// Units: meters/second
    pub speed: f64,

    /// True if the rover is close enough to a sample to pick it up.
    #[serde(default)]
    pub near_sample: bool,

    /// True while a pickup action is in progress.
    #[serde(default)]
    pub picking_up: bool,

    /// Drive mode requested by the bridge. When absent the rover keeps its own mode.
    #[serde(default)]
    pub mode: Option<String>,
}

/// Command returned to the simulator each cycle.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, Default, PartialEq)]
pub struct SimCmd {
    /// Throttle demand, always non-negative.
    pub throttle: f64,

    /// Brake demand, always non-negative.
    pub brake: f64,

    /// Steering angle, in the range [-15, 15].
    ///
    /// Units: degrees
    pub steer: f64,

    /// Request the simulator start picking up the nearby sample. Edge triggered, only raised on
    /// the cycle the request is made.
    pub send_pickup: bool,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum SimError {
    #[error("Failed to decode the camera frame from base64: {0}")]
    FrameDecodeError(DecodeError),

    #[error("Failed to decode the camera image: {0}")]
    ImageDecodeError(ImageError),

    #[error("Failed to encode the camera image: {0}")]
    ImageEncodeError(ImageError),

    #[error("Could not parse the telemetry message: {0}")]
    TelemetryParseError(serde_json::Error),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl SimTelemetry {
    /// Parse a telemetry message from its JSON representation.
    pub fn from_json(msg: &str) -> Result<Self, SimError> {
        serde_json::from_str(msg).map_err(SimError::TelemetryParseError)
    }

    /// Decode the camera frame carried by this message into an RGB image.
    pub fn decode_image(&self) -> Result<RgbImage, SimError> {
        let bytes = base64::decode(&self.image).map_err(SimError::FrameDecodeError)?;

        let image = image::load_from_memory(&bytes).map_err(SimError::ImageDecodeError)?;

        Ok(image.to_rgb8())
    }

    /// Encode an RGB image as a base64 PNG frame, suitable for the `image` field.
    pub fn encode_image(image: &RgbImage) -> Result<String, SimError> {
        let mut data = Vec::<u8>::new();

        DynamicImage::ImageRgb8(image.clone())
            .write_to(&mut data, ImageOutputFormat::Png)
            .map_err(SimError::ImageEncodeError)?;

        Ok(base64::encode(data))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_frame_codec() {
        let mut img = RgbImage::new(8, 4);
        img.put_pixel(3, 2, Rgb([200, 180, 20]));

        let telem = SimTelemetry {
            image: SimTelemetry::encode_image(&img).unwrap(),
            ..Default::default()
        };

        let decoded = telem.decode_image().unwrap();
        assert_eq!(decoded.dimensions(), (8, 4));
        assert_eq!(decoded.get_pixel(3, 2), &Rgb([200, 180, 20]));
        assert_eq!(decoded.get_pixel(0, 0), &Rgb([0, 0, 0]));
    }

    #[test]
    fn test_telemetry_defaults() {
        let telem = SimTelemetry::from_json(
            r#"{"image": "", "position": [99.5, 85.2], "yaw": 56.8, "pitch": 0.2,
                "roll": 359.8, "speed": 0.4}"#,
        )
        .unwrap();

        assert!(!telem.near_sample);
        assert!(!telem.picking_up);
        assert!(telem.mode.is_none());
        assert!(matches!(telem.decode_image(), Err(SimError::ImageDecodeError(_))));
    }
}
