//! Parameters structure for the DecMgr

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};

use super::DecError;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Parameters for the decision manager.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DecMgrParams {
    // ---- TERRAIN ----
    /// Fewest navigable pixels with which the rover keeps driving forward.
    pub stop_forward: usize,

    /// Fewest navigable pixels with which a stopped rover will start driving again.
    pub go_forward: usize,

    /// Navigable pixel count at or above which the steering may be randomly perturbed.
    pub rand_angle_thresh: usize,

    // ---- DRIVING ----
    /// Speed above which the rover coasts rather than throttling.
    ///
    /// Units: meters/second
    pub max_vel: f64,

    /// Throttle used when driving.
    pub throttle_set: f64,

    /// Brake used when stopping.
    pub brake_set: f64,

    /// Steering limit either side of straight ahead.
    ///
    /// Units: degrees
    pub max_steer_deg: f64,

    /// Speed at or below which the rover counts as stopped.
    ///
    /// Units: meters/second
    pub stop_vel_thresh: f64,

    /// Steering commanded in the idle fallback mode.
    ///
    /// Units: degrees
    pub idle_steer_deg: f64,

    // ---- SAMPLES ----
    /// Fewest sample pixels for a sample to be pursued.
    pub sample_pixel_thresh: usize,

    /// Speed at or above which the rover brakes while approaching a sample.
    ///
    /// Units: meters/second
    pub sample_approach_vel: f64,

    // ---- PERTURBATION ----
    /// Probability of perturbing the steering on a cycle where it is permitted.
    pub perturb_prob: f64,

    /// How far the perturbed steering is centred towards straight ahead.
    ///
    /// Units: degrees
    pub perturb_offset_deg: f64,

    /// Standard deviation of the perturbed steering.
    ///
    /// Units: degrees
    pub perturb_sigma_deg: f64,

    /// Seed for the perturbation generator, 0 to seed from entropy.
    pub rng_seed: u64,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Default for DecMgrParams {
    fn default() -> Self {
        Self {
            stop_forward: 50,
            go_forward: 500,
            rand_angle_thresh: 1500,
            max_vel: 2.0,
            throttle_set: 0.2,
            brake_set: 10.0,
            max_steer_deg: 15.0,
            stop_vel_thresh: 0.2,
            idle_steer_deg: 15.0,
            sample_pixel_thresh: 15,
            sample_approach_vel: 1.0,
            perturb_prob: 0.4,
            perturb_offset_deg: 5.0,
            perturb_sigma_deg: 5.0,
            rng_seed: 0,
        }
    }
}

impl DecMgrParams {
    /// Check the parameters are usable.
    pub fn validate(&self) -> Result<(), DecError> {
        let non_negative = [
            ("max_vel", self.max_vel),
            ("throttle_set", self.throttle_set),
            ("brake_set", self.brake_set),
            ("stop_vel_thresh", self.stop_vel_thresh),
            ("sample_approach_vel", self.sample_approach_vel),
            ("perturb_offset_deg", self.perturb_offset_deg),
            ("perturb_sigma_deg", self.perturb_sigma_deg),
        ];

        for &(name, value) in non_negative.iter() {
            if !(value.is_finite() && value >= 0.0) {
                return Err(DecError::InvalidParam(name, value));
            }
        }

        if !(self.max_steer_deg.is_finite() && self.max_steer_deg > 0.0) {
            return Err(DecError::InvalidParam("max_steer_deg", self.max_steer_deg));
        }

        if !self.idle_steer_deg.is_finite() {
            return Err(DecError::InvalidParam("idle_steer_deg", self.idle_steer_deg));
        }

        if !(self.perturb_prob >= 0.0 && self.perturb_prob <= 1.0) {
            return Err(DecError::InvalidParam("perturb_prob", self.perturb_prob));
        }

        Ok(())
    }
}
