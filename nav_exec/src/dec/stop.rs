//! # Stop mode

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use super::{clamp_steer, DecMgrParams};
use crate::{
    per::PolarSummary,
    state::{DriveMode, RoverState},
};

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Stop mode step.
///
/// Brake until stationary. Once stopped, turn on the spot until there is enough navigable
/// terrain ahead and then set off again in Forward.
pub(super) fn step(params: &DecMgrParams, state: &mut RoverState, nav: &PolarSummary) {
    if state.vel > params.stop_vel_thresh {
        state.throttle = 0.0;
        state.brake = params.brake_set;
        state.steer_deg = 0.0;
    } else if nav.count < params.go_forward {
        state.throttle = 0.0;
        state.brake = 0.0;
        state.steer_deg = -params.max_steer_deg;
    } else {
        state.throttle = params.throttle_set;
        state.brake = 0.0;
        state.steer_deg = clamp_steer(params, nav.mean_angle_deg);
        state.mode = DriveMode::Forward;
    }
}
