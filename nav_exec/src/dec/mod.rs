//! # Decision module
//!
//! This module implements the [`DecMgr`] state machine, which chooses the throttle, brake and
//! steering demands from the terrain seen this cycle. The rover is in one of three modes:
//!
//! - `Forward` - Driving along the mean heading of the navigable terrain.
//! - `Stop` - Braking to a halt, then turning on the spot until a way forward is found.
//! - `Idle` - Fallback for an unrecognised mode, turns slowly in place.
//!
//! Each cycle applies the following steps in order, a later step overriding the demands of an
//! earlier one:
//!
//! 1. Without any vision data nothing is done.
//! 2. The step for the current mode ([`forward`], [`stop`], or idle).
//! 3. The [`sample`] override, which stops near a sample to pick it up and steers towards any
//!    sample in sight.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

mod forward;
mod params;
mod sample;
mod stop;

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use log::{info, trace};
use rand::{rngs::SmallRng, Rng, SeedableRng};
use serde::Serialize;

use crate::{
    per::PolarSummary,
    state::{DriveMode, RoverState},
};
use util::{maths, module::State, session::Session};

pub use forward::perturb_steer;
pub use params::DecMgrParams;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Decision manager.
///
/// The random source used to perturb the steering is a type parameter so that it can be
/// replaced with a deterministic one.
#[derive(Debug, Clone)]
pub struct DecMgr<R = SmallRng> {
    params: DecMgrParams,

    rng: R,
}

/// What the decision manager did this cycle.
#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct DecStatusReport {
    /// No navigable terrain summary was available, nothing was done.
    pub no_vision: bool,

    /// The steering was randomly perturbed.
    pub perturbed: bool,

    /// Forward would have stopped for lack of terrain but a sample is in sight.
    pub deferred_to_sample: bool,

    /// The sample override changed the demands.
    pub sample_override: bool,

    /// A pickup was requested.
    pub pickup_requested: bool,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum DecError {
    #[error("Failed to load DecMgrParams: {0}")]
    ParamLoadError(util::params::LoadError),

    #[error("Invalid value for DecMgr parameter {0}: {1}")]
    InvalidParam(&'static str, f64),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl DecMgr<SmallRng> {
    /// Create a new decision manager, seeding the random source from the parameters.
    pub fn new(params: DecMgrParams) -> Result<Self, DecError> {
        let rng = match params.rng_seed {
            0 => SmallRng::from_entropy(),
            s => SmallRng::seed_from_u64(s),
        };

        Self::with_rng(params, rng)
    }
}

impl<R: Rng> DecMgr<R> {
    /// Create a new decision manager using the given random source.
    pub fn with_rng(params: DecMgrParams, rng: R) -> Result<Self, DecError> {
        params.validate()?;

        Ok(Self { params, rng })
    }

    pub fn params(&self) -> &DecMgrParams {
        &self.params
    }

    /// Run one decision step, returning the updated state.
    pub fn step(&mut self, state: &RoverState) -> (RoverState, DecStatusReport) {
        let mut next = state.clone();
        let mut report = DecStatusReport::default();

        let nav = match state.nav {
            Some(n) => n,
            None => {
                report.no_vision = true;
                return (next, report);
            }
        };

        match state.mode {
            DriveMode::Forward => {
                forward::step(&self.params, &mut next, &nav, &mut self.rng, &mut report)
            }
            DriveMode::Stop => stop::step(&self.params, &mut next, &nav),
            DriveMode::Idle => {
                next.throttle = 0.0;
                next.brake = 0.0;
                next.steer_deg = clamp_steer(&self.params, self.params.idle_steer_deg);
            }
        }

        sample::step(&self.params, &mut next, &mut report);

        if next.mode != state.mode {
            info!("DecMgr mode change: {} -> {}", state.mode, next.mode);
        }

        trace!(
            "DecMgr demands: throttle {:.2}, brake {:.2}, steer {:.2} deg",
            next.throttle,
            next.brake,
            next.steer_deg
        );

        (next, report)
    }
}

impl State for DecMgr<SmallRng> {
    type InitData = &'static str;
    type InitError = DecError;

    type InputData = RoverState;
    type OutputData = RoverState;
    type StatusReport = DecStatusReport;
    type ProcError = DecError;

    /// Initialise the DecMgr module.
    ///
    /// Expected init data is the path to the parameter file
    fn init(init_data: Self::InitData, _session: &Session) -> Result<Self, Self::InitError> {
        let params = util::params::load(init_data).map_err(DecError::ParamLoadError)?;

        Self::new(params)
    }

    fn proc(
        &mut self,
        input_data: &Self::InputData,
    ) -> Result<(Self::OutputData, Self::StatusReport), Self::ProcError> {
        Ok(self.step(input_data))
    }
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Clamp a steering angle to the steering limits. NaN steers straight ahead.
pub(crate) fn clamp_steer(params: &DecMgrParams, steer_deg: f64) -> f64 {
    if steer_deg.is_nan() {
        return 0.0;
    }

    maths::clamp(&steer_deg, &-params.max_steer_deg, &params.max_steer_deg)
}

/// The sample summary, if enough of a sample is visible to go after it.
pub(crate) fn sample_in_sight(
    params: &DecMgrParams,
    samples: Option<PolarSummary>,
) -> Option<PolarSummary> {
    samples.filter(|s| s.count >= params.sample_pixel_thresh)
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_relative_eq;
    use rand::rngs::mock::StepRng;

    /// Thresholds used in the scenarios.
    fn params() -> DecMgrParams {
        DecMgrParams {
            stop_forward: 200,
            go_forward: 500,
            rand_angle_thresh: 1000,
            ..Default::default()
        }
    }

    /// A manager whose random source never triggers a perturbation.
    fn mgr() -> DecMgr<StepRng> {
        DecMgr::with_rng(params(), StepRng::new(u64::MAX, 0)).unwrap()
    }

    fn summary(count: usize, angle_deg: f64) -> Option<PolarSummary> {
        Some(PolarSummary {
            count,
            mean_angle_deg: angle_deg,
            median_angle_deg: angle_deg,
            mean_dist: 50.0,
        })
    }

    fn state(mode: DriveMode, vel: f64, nav_count: usize) -> RoverState {
        RoverState {
            mode,
            vel,
            nav: summary(nav_count, 5.0),
            ..Default::default()
        }
    }

    #[test]
    fn test_no_vision_does_nothing() {
        let mut s = state(DriveMode::Stop, 3.0, 0);
        s.nav = None;
        s.throttle = 0.7;
        s.near_sample = true;

        let (next, report) = mgr().step(&s);

        assert_eq!(next, s);
        assert!(report.no_vision);
    }

    #[test]
    fn test_forward_enough_terrain() {
        let (next, _) = mgr().step(&state(DriveMode::Forward, 1.0, 500));

        assert_eq!(next.throttle, 0.2);
        assert_eq!(next.brake, 0.0);
        assert_eq!(next.steer_deg, 5.0);
        assert_eq!(next.mode, DriveMode::Forward);

        // Coast at max speed, steer clamped
        let mut s = state(DriveMode::Forward, 2.0, 500);
        s.nav = summary(500, 40.0);
        let (next, _) = mgr().step(&s);

        assert_eq!(next.throttle, 0.0);
        assert_eq!(next.steer_deg, 15.0);
    }

    #[test]
    fn test_forward_not_enough_terrain() {
        let (next, _) = mgr().step(&state(DriveMode::Forward, 1.0, 50));

        assert_eq!(next.throttle, 0.0);
        assert_eq!(next.brake, 10.0);
        assert_eq!(next.steer_deg, 0.0);
        assert_eq!(next.mode, DriveMode::Stop);

        // A weak sample signal doesn't prevent stopping
        let mut s = state(DriveMode::Forward, 1.0, 50);
        s.samples = summary(10, 20.0);
        let (next, _) = mgr().step(&s);
        assert_eq!(next.mode, DriveMode::Stop);
    }

    #[test]
    fn test_forward_defers_to_sample() {
        let mut s = state(DriveMode::Forward, 0.5, 50);
        s.samples = summary(20, -8.0);

        let (next, report) = mgr().step(&s);

        assert!(report.deferred_to_sample);
        assert!(report.sample_override);
        assert_eq!(next.steer_deg, -8.0);
        assert_eq!(next.throttle, 0.2);
        assert_eq!(next.brake, 0.0);
        assert_eq!(next.mode, DriveMode::Forward);
    }

    #[test]
    fn test_stop_mode() {
        // Still moving, keep braking whatever the terrain
        let (next, _) = mgr().step(&state(DriveMode::Stop, 0.5, 5000));
        assert_eq!((next.throttle, next.brake, next.steer_deg), (0.0, 10.0, 0.0));
        assert_eq!(next.mode, DriveMode::Stop);

        // Stopped without a way forward, turn on the spot
        let (next, _) = mgr().step(&state(DriveMode::Stop, 0.1, 30));
        assert_eq!((next.throttle, next.brake, next.steer_deg), (0.0, 0.0, -15.0));
        assert_eq!(next.mode, DriveMode::Stop);

        // Stopped with a way forward, go
        let (next, _) = mgr().step(&state(DriveMode::Stop, 0.1, 600));
        assert_eq!((next.throttle, next.brake, next.steer_deg), (0.2, 0.0, 5.0));
        assert_eq!(next.mode, DriveMode::Forward);
    }

    #[test]
    fn test_idle_mode() {
        let (next, _) = mgr().step(&state(DriveMode::Idle, 0.0, 600));

        assert_eq!((next.throttle, next.brake, next.steer_deg), (0.0, 0.0, 15.0));
        assert_eq!(next.mode, DriveMode::Idle);
    }

    #[test]
    fn test_pickup_requested_once() {
        let mut dec = mgr();
        let mut s = state(DriveMode::Forward, 0.0, 600);
        s.near_sample = true;

        let (next, report) = dec.step(&s);
        assert!(next.send_pickup);
        assert!(report.pickup_requested);

        // Still waiting for the pickup to start, don't ask again
        let mut s = next;
        s.send_pickup = false;
        let (next, _) = dec.step(&s);
        assert!(!next.send_pickup);

        // Picking up, don't ask either
        let mut s = state(DriveMode::Forward, 0.0, 600);
        s.near_sample = true;
        s.picking_up = true;
        let (next, _) = mgr().step(&s);
        assert!(!next.send_pickup);
    }

    #[test]
    fn test_near_sample_while_moving_stops() {
        let mut s = state(DriveMode::Forward, 0.3, 600);
        s.near_sample = true;

        let (next, _) = mgr().step(&s);

        assert!(!next.send_pickup);
        assert_eq!((next.throttle, next.brake, next.steer_deg), (0.0, 10.0, 0.0));
        assert_eq!(next.mode, DriveMode::Stop);
    }

    #[test]
    fn test_sample_approach_too_fast() {
        let mut s = state(DriveMode::Forward, 1.5, 500);
        s.samples = summary(20, 30.0);

        let (next, _) = mgr().step(&s);

        assert_eq!(next.throttle, 0.0);
        assert_eq!(next.brake, 10.0);
        assert_eq!(next.steer_deg, 15.0);
        assert_eq!(next.mode, DriveMode::Stop);
    }

    #[test]
    fn test_perturbation() {
        // Always perturb
        let p = DecMgrParams {
            perturb_prob: 1.0,
            ..params()
        };
        let mut dec = DecMgr::with_rng(p, SmallRng::seed_from_u64(7)).unwrap();

        let mut perturbed_steers = Vec::new();
        for _ in 0..200 {
            let (next, report) = dec.step(&state(DriveMode::Forward, 1.0, 5000));
            assert!(report.perturbed);
            assert!(next.steer_deg.abs() <= 15.0);
            perturbed_steers.push(next.steer_deg);
        }

        // Draws are centred 5 deg below the unperturbed 5 deg steer
        let mean = maths::mean(&perturbed_steers).unwrap();
        assert!(mean.abs() < 2.5);

        // Never perturb
        let p = DecMgrParams {
            perturb_prob: 0.0,
            ..params()
        };
        let mut dec = DecMgr::with_rng(p, SmallRng::seed_from_u64(7)).unwrap();
        for _ in 0..50 {
            let (next, report) = dec.step(&state(DriveMode::Forward, 1.0, 5000));
            assert!(!report.perturbed);
            assert_eq!(next.steer_deg, 5.0);
        }

        // Below the threshold the random source is not consulted
        let (_, report) = mgr().step(&state(DriveMode::Forward, 1.0, 999));
        assert!(!report.perturbed);
    }

    #[test]
    fn test_perturbation_bounded() {
        let p = params();
        let mut rng = SmallRng::seed_from_u64(1234);

        for i in 0..10_000 {
            let steer = -15.0 + (i % 31) as f64;
            let s = perturb_steer(&p, steer, &mut rng);
            assert!(s >= -15.0 && s <= 15.0, "{} out of bounds", s);
        }
    }

    #[test]
    fn test_clamp_steer() {
        let p = params();
        assert_relative_eq!(clamp_steer(&p, 100.0), 15.0);
        assert_relative_eq!(clamp_steer(&p, -100.0), -15.0);
        assert_relative_eq!(clamp_steer(&p, 3.5), 3.5);
        assert_relative_eq!(clamp_steer(&p, std::f64::NAN), 0.0);
    }
}
