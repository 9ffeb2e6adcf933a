//! # Rover control state
//!
//! [`RoverState`] is the value threaded through one cycle: telemetry writes into it, perception
//! adds the terrain summaries, and the decision manager returns an updated copy holding the new
//! commands.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use log::warn;
use serde::{Deserialize, Serialize};

use crate::{loc::Pose, per::PolarSummary};
use comms_if::sim::{SimCmd, SimTelemetry};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// The full control state of the rover.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RoverState {
    pub mode: DriveMode,

    /// Forward speed reported by the simulator.
    ///
    /// Units: meters/second
    pub vel: f64,

    /// The rover is close enough to a sample to pick it up.
    pub near_sample: bool,

    /// A pickup is in progress.
    pub picking_up: bool,

    /// Request a pickup this cycle. One-shot, cleared once sent.
    pub send_pickup: bool,

    /// Limits pickup requests to one per opportunity.
    pub pickup_latch: PickupLatch,

    pub pose: Pose,

    /// Navigable terrain seen this cycle, `None` until the first image has been processed.
    pub nav: Option<PolarSummary>,

    /// Samples seen this cycle, `None` when no sample is visible.
    pub samples: Option<PolarSummary>,

    /// Throttle demand, 0 to 1.
    pub throttle: f64,

    /// Brake demand.
    pub brake: f64,

    /// Steering demand, positive left.
    ///
    /// Units: degrees
    pub steer_deg: f64,
}

/// Edge trigger for pickup requests.
///
/// Once raised the latch stays closed until the bridge has reported a pickup starting and then
/// finishing.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PickupLatch {
    raised: bool,
    seen_picking_up: bool,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Driving mode of the rover.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DriveMode {
    Forward,
    Stop,

    /// Fallback for an unrecognised mode injected by the bridge.
    Idle,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Default for DriveMode {
    fn default() -> Self {
        DriveMode::Forward
    }
}

impl DriveMode {
    /// Parse a mode name, case insensitive. Unknown names give [`DriveMode::Idle`].
    pub fn from_name(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "forward" => DriveMode::Forward,
            "stop" => DriveMode::Stop,
            _ => DriveMode::Idle,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            DriveMode::Forward => "forward",
            DriveMode::Stop => "stop",
            DriveMode::Idle => "idle",
        }
    }
}

impl std::fmt::Display for DriveMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl PickupLatch {
    /// Update the latch from this cycle's `picking_up` flag. The latch opens again on the
    /// falling edge of the flag.
    pub fn observe(&mut self, picking_up: bool) {
        if picking_up {
            self.seen_picking_up = true;
        } else if self.seen_picking_up {
            *self = Self::default();
        }
    }

    /// Raise the latch, returning true if it was open.
    pub fn try_raise(&mut self) -> bool {
        if self.raised {
            false
        } else {
            self.raised = true;
            true
        }
    }
}

impl RoverState {
    /// Copy this cycle's telemetry into the state.
    ///
    /// A mode sent by the bridge overrides the current mode.
    pub fn apply_telemetry(&mut self, telem: &SimTelemetry) {
        self.vel = telem.speed;
        self.near_sample = telem.near_sample;
        self.picking_up = telem.picking_up;
        self.pose = Pose::from_telemetry(telem);

        if let Some(ref name) = telem.mode {
            let mode = DriveMode::from_name(name);
            if mode == DriveMode::Idle {
                warn!("Unrecognised mode \"{}\" from the bridge, rover is idle", name);
            }
            self.mode = mode;
        }

        self.pickup_latch.observe(self.picking_up);
    }

    /// The command to send to the simulator.
    pub fn to_cmd(&self) -> SimCmd {
        SimCmd {
            throttle: self.throttle,
            brake: self.brake,
            steer: self.steer_deg,
            send_pickup: self.send_pickup,
        }
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------
