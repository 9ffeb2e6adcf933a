//! # Rover
//!
//! Owns every module and runs one perception, mapping and decision cycle per telemetry frame.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use image::RgbImage;
use log::{debug, warn};
use rand::{rngs::SmallRng, Rng};
use serde::Serialize;

use crate::{
    dec::{DecError, DecMgr, DecStatusReport},
    loc::{Pose, PoseError},
    map::{WorldMap, WorldMapError, WorldMapParams},
    per::{PerError, PerInput, PerMgr, PerMgrInit, PerMgrParams},
    state::RoverState,
};
use comms_if::sim::{SimCmd, SimTelemetry};
use util::{
    archive::{Archived, Archiver},
    module::State,
    session::{self, Session},
};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

pub const PER_MGR_PARAMS: &str = "per_mgr.toml";
pub const WORLD_MAP_PARAMS: &str = "world_map.toml";
pub const DEC_MGR_PARAMS: &str = "dec_mgr.toml";

/// Cycle archive path, relative to the session's archive root.
const CYCLE_ARCHIVE: &str = "rover/cycle.csv";

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// The rover's perception and decision loop.
pub struct Rover<R = SmallRng> {
    per_mgr: PerMgr,
    world_map: WorldMap,
    dec_mgr: DecMgr<R>,

    state: RoverState,

    /// Vision image from the most recent cycle.
    vision_image: Option<RgbImage>,

    num_cycles: u64,

    record: Option<CycleRecord>,
    arch_cycle: Archiver,
}

/// Flat summary of one cycle, archived as a CSV row.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CycleRecord {
    pub cycle: u64,
    pub time_s: f64,
    pub mode: &'static str,
    pub vel: f64,
    pub x: f64,
    pub y: f64,
    pub yaw_deg: f64,
    pub pitch_deg: f64,
    pub roll_deg: f64,
    pub num_nav_px: usize,
    pub num_obs_px: usize,
    pub num_sample_px: usize,
    pub nav_mean_angle_deg: f64,
    pub map_updated: bool,
    pub throttle: f64,
    pub brake: f64,
    pub steer_deg: f64,
    pub send_pickup: bool,
    pub perturbed: bool,
    pub sample_override: bool,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum RoverError {
    #[error("Failed to load the WorldMap parameters: {0}")]
    ParamLoadError(util::params::LoadError),

    #[error("Invalid pose from telemetry: {0}")]
    InvalidPose(PoseError),

    #[error("Perception error: {0}")]
    PerError(PerError),

    #[error("World map error: {0}")]
    WorldMapError(WorldMapError),

    #[error("Decision error: {0}")]
    DecError(DecError),

    #[error("Could not create the cycle archive: {0}")]
    ArchiveInitError(String),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Rover<SmallRng> {
    /// Initialise the rover from the parameter files, archiving every cycle into the session.
    pub fn init(session: &Session) -> Result<Self, RoverError> {
        let map_params: WorldMapParams =
            util::params::load(WORLD_MAP_PARAMS).map_err(RoverError::ParamLoadError)?;
        let world_map = WorldMap::new(map_params).map_err(RoverError::WorldMapError)?;

        let per_mgr = PerMgr::init(
            PerMgrInit {
                params_path: PER_MGR_PARAMS,
                world_size_cells: world_map.size_cells(),
            },
            session,
        )
        .map_err(RoverError::PerError)?;

        let dec_mgr = DecMgr::init(DEC_MGR_PARAMS, session).map_err(RoverError::DecError)?;

        let mut rover = Self::from_parts(per_mgr, world_map, dec_mgr);

        rover.arch_cycle = Archiver::from_path(session, CYCLE_ARCHIVE)
            .map_err(|e| RoverError::ArchiveInitError(e.to_string()))?;

        Ok(rover)
    }
}

impl<R: Rng> Rover<R> {
    /// Build a rover from parameters, with the given decision manager.
    ///
    /// The rover built this way doesn't archive its cycles.
    pub fn new(
        per_params: PerMgrParams,
        map_params: WorldMapParams,
        dec_mgr: DecMgr<R>,
    ) -> Result<Self, RoverError> {
        let world_map = WorldMap::new(map_params).map_err(RoverError::WorldMapError)?;
        let per_mgr =
            PerMgr::new(per_params, world_map.size_cells()).map_err(RoverError::PerError)?;

        Ok(Self::from_parts(per_mgr, world_map, dec_mgr))
    }

    fn from_parts(per_mgr: PerMgr, world_map: WorldMap, dec_mgr: DecMgr<R>) -> Self {
        Self {
            per_mgr,
            world_map,
            dec_mgr,
            state: RoverState::default(),
            vision_image: None,
            num_cycles: 0,
            record: None,
            arch_cycle: Archiver::default(),
        }
    }

    /// Run one cycle on a telemetry message and its decoded camera image.
    ///
    /// A pose which fails validation is rejected before anything else, leaving the map and the
    /// control state untouched.
    pub fn cycle(&mut self, telem: &SimTelemetry, image: RgbImage) -> Result<SimCmd, RoverError> {
        self.num_cycles += 1;

        // ---- TELEMETRY ----

        Pose::from_telemetry(telem)
            .validate()
            .map_err(RoverError::InvalidPose)?;
        self.state.apply_telemetry(telem);

        // ---- PERCEPTION ----

        let pose = self.state.pose;
        let (per_out, per_report) = self
            .per_mgr
            .proc(&PerInput { image, pose })
            .map_err(RoverError::PerError)?;

        let nav = per_out.nav_summary();
        self.state.nav = Some(nav);
        self.state.samples = per_out.sample_summary();

        // ---- MAPPING ----

        let pose_valid = self.world_map.pose_valid(&pose);
        if !pose_valid {
            let (roll, pitch) = pose.signed_roll_pitch_deg();
            debug!(
                "Rover not level (roll {:.2}, pitch {:.2} deg), map not updated",
                roll, pitch
            );
        }

        let map_updated = self
            .world_map
            .accumulate(
                &per_out.obs_cells,
                &per_out.nav_cells,
                &per_out.sample_cells,
                pose_valid,
            )
            .map_err(RoverError::WorldMapError)?;

        // ---- DECISION ----

        let (next, dec_report) = self.dec_mgr.step(&self.state);
        self.state = next;

        let cmd = self.state.to_cmd();
        self.state.send_pickup = false;

        self.vision_image = Some(per_out.vision_image);

        self.record = Some(CycleRecord::new(
            self.num_cycles,
            &self.state,
            &per_report,
            map_updated,
            &dec_report,
            &cmd,
        ));

        Ok(cmd)
    }

    pub fn state(&self) -> &RoverState {
        &self.state
    }

    pub fn world_map(&self) -> &WorldMap {
        &self.world_map
    }

    /// Vision image of the last successful cycle.
    pub fn vision_image(&self) -> Option<&RgbImage> {
        self.vision_image.as_ref()
    }

    pub fn num_cycles(&self) -> u64 {
        self.num_cycles
    }

    pub fn last_record(&self) -> Option<&CycleRecord> {
        self.record.as_ref()
    }
}

impl<R> Archived for Rover<R> {
    fn write(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        if let Some(ref record) = self.record {
            self.arch_cycle.serialise(record)?;
        } else {
            warn!("No cycle record to archive");
        }

        Ok(())
    }
}

impl CycleRecord {
    fn new(
        cycle: u64,
        state: &RoverState,
        per: &crate::per::PerStatusReport,
        map_updated: bool,
        dec: &DecStatusReport,
        cmd: &SimCmd,
    ) -> Self {
        Self {
            cycle,
            time_s: session::get_elapsed_seconds(),
            mode: state.mode.name(),
            vel: state.vel,
            x: state.pose.position_m.x,
            y: state.pose.position_m.y,
            yaw_deg: state.pose.yaw_deg,
            pitch_deg: state.pose.pitch_deg,
            roll_deg: state.pose.roll_deg,
            num_nav_px: per.num_nav_px,
            num_obs_px: per.num_obs_px,
            num_sample_px: per.num_sample_px,
            nav_mean_angle_deg: state.nav.map(|n| n.mean_angle_deg).unwrap_or(0.0),
            map_updated,
            throttle: cmd.throttle,
            brake: cmd.brake,
            steer_deg: cmd.steer,
            send_pickup: cmd.send_pickup,
            perturbed: dec.perturbed,
            sample_override: dec.sample_override,
        }
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------
