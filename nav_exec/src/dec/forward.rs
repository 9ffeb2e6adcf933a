//! # Forward mode
//!
//! Follow the navigable terrain, stopping when it runs out.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use log::debug;
use rand::Rng;
use rand_distr::StandardNormal;

use super::{clamp_steer, sample_in_sight, DecMgrParams, DecStatusReport};
use crate::{
    per::PolarSummary,
    state::{DriveMode, RoverState},
};

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Forward mode step.
///
/// With enough navigable terrain drive along its mean heading, occasionally perturbing the
/// heading on wide open terrain so the rover doesn't trace the same loop forever. Without enough
/// terrain stop, unless a sample is in sight, in which case the sample override takes over.
pub(super) fn step<R: Rng>(
    params: &DecMgrParams,
    state: &mut RoverState,
    nav: &PolarSummary,
    rng: &mut R,
    report: &mut DecStatusReport,
) {
    if nav.count >= params.stop_forward {
        state.throttle = if state.vel < params.max_vel {
            params.throttle_set
        } else {
            0.0
        };
        state.brake = 0.0;
        state.steer_deg = clamp_steer(params, nav.mean_angle_deg);

        if nav.count >= params.rand_angle_thresh && rng.gen_bool(params.perturb_prob) {
            let steer = perturb_steer(params, state.steer_deg, rng);

            debug!(
                "Perturbing steering from {:.2} to {:.2} deg ({} nav px)",
                state.steer_deg, steer, nav.count
            );

            state.steer_deg = steer;
            report.perturbed = true;
        }
    } else if sample_in_sight(params, state.samples).is_none() {
        state.throttle = 0.0;
        state.brake = params.brake_set;
        state.steer_deg = 0.0;
        state.mode = DriveMode::Stop;
    } else {
        report.deferred_to_sample = true;
    }
}

/// Draw a new steering angle from a normal distribution centred `perturb_offset_deg` closer to
/// straight ahead than `steer_deg`, then clamp it to the steering limits.
pub fn perturb_steer<R: Rng>(params: &DecMgrParams, steer_deg: f64, rng: &mut R) -> f64 {
    let centre = if steer_deg >= 0.0 {
        steer_deg - params.perturb_offset_deg
    } else {
        steer_deg + params.perturb_offset_deg
    };

    let z: f64 = rng.sample(StandardNormal);

    clamp_steer(params, centre + params.perturb_sigma_deg * z)
}
