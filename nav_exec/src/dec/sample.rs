//! # Sample override
//!
//! Applied after the mode step every cycle, whatever the mode.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use log::info;

use super::{clamp_steer, sample_in_sight, DecMgrParams, DecStatusReport};
use crate::state::{DriveMode, RoverState};

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Sample override step.
///
/// Near a sample: stop, then request a pickup once stationary. Otherwise, with a sample in
/// sight, steer towards it at low speed.
pub(super) fn step(params: &DecMgrParams, state: &mut RoverState, report: &mut DecStatusReport) {
    if state.near_sample {
        report.sample_override = true;

        let stationary = state.vel == 0.0;

        if !stationary {
            state.throttle = 0.0;
            state.brake = params.brake_set;
            state.steer_deg = 0.0;
            state.mode = DriveMode::Stop;
        } else if !state.picking_up && state.pickup_latch.try_raise() {
            info!("Stationary near a sample, requesting pickup");

            state.send_pickup = true;
            report.pickup_requested = true;
        }
    } else if let Some(sample) = sample_in_sight(params, state.samples) {
        report.sample_override = true;

        state.steer_deg = clamp_steer(params, sample.median_angle_deg);

        if state.vel >= params.sample_approach_vel {
            state.throttle = 0.0;
            state.brake = params.brake_set;
            state.mode = DriveMode::Stop;
        } else {
            state.throttle = params.throttle_set;
            state.brake = 0.0;
            state.mode = DriveMode::Forward;
        }
    }
}
