//! Navigation executable entry point.
//!
//! # Architecture
//!
//! The general execution methodology consists of:
//!
//!     - Initialise the session, logging and all modules
//!     - Main loop, once per telemetry frame:
//!         - Telemetry and image acquisition
//!         - Perception
//!         - World map update
//!         - Decision
//!         - Command output
//!     - Save the world map and report its statistics
//!
//! Telemetry comes either from a recorded simulator log (`nav_exec replay <log>`) or from a
//! bridge talking JSON over stdin and stdout (`nav_exec stdio`).

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use color_eyre::{eyre::WrapErr, Report};
use log::{error, info, warn};
use std::{io, path::PathBuf};
use structopt::StructOpt;

// Internal
use nav_lib::{
    map,
    rover::{Rover, RoverError},
    telem::{ReplayLog, StdioBridge, TelemSource},
};
use util::{
    archive::Archived,
    logger::{logger_init, LevelFilter},
    session::Session,
};

// ---------------------------------------------------------------------------
// STRUCTS
// ---------------------------------------------------------------------------

#[derive(Debug, StructOpt)]
#[structopt(name = "nav_exec", about = "Sample return rover navigation")]
struct Opt {
    /// Log at trace level rather than debug
    #[structopt(short, long)]
    verbose: bool,

    /// Ground truth map image to score the world map against
    #[structopt(long, parse(from_os_str))]
    ground_truth: Option<PathBuf>,

    #[structopt(subcommand)]
    source: Source,
}

#[derive(Debug, StructOpt)]
enum Source {
    /// Replay a recorded simulator run
    #[structopt(name = "replay")]
    Replay {
        /// Path to the run's log file, with its images in an IMG directory beside it
        #[structopt(parse(from_os_str))]
        log: PathBuf,
    },

    /// Drive from telemetry lines on stdin, writing command lines to stdout
    #[structopt(name = "stdio")]
    Stdio,
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Executable main function, entry point.
fn main() -> Result<(), Report> {
    color_eyre::install()?;

    let opt = Opt::from_args();

    // ---- EARLY INITIALISATION ----

    let session = Session::new("nav_exec", "sessions").wrap_err("Failed to create the session")?;

    let level = if opt.verbose {
        LevelFilter::Trace
    } else {
        LevelFilter::Debug
    };
    logger_init(level, &session).wrap_err("Failed to initialise logging")?;

    info!("Sample Return Rover Navigation Executable\n");
    info!("Session directory: {:?}\n", session.session_root);

    // ---- INITIALISE MODULES ----

    info!("Initialising modules...");

    let mut rover = Rover::init(&session).wrap_err("Failed to initialise the rover")?;

    info!("Module initialisation complete\n");

    // ---- MAIN LOOP ----

    match opt.source {
        Source::Replay { ref log } => {
            let source = ReplayLog::open(log)
                .wrap_err_with(|| format!("Failed to open the replay log {:?}", log))?;
            info!("Replaying {} frames from {:?}", source.remaining(), log);

            run(&mut rover, source)?;
        }
        Source::Stdio => {
            let stdin = io::stdin();
            let stdout = io::stdout();

            info!("Waiting for telemetry on stdin");

            run(&mut rover, StdioBridge::new(stdin.lock(), stdout.lock()))?;
        }
    }

    info!("Telemetry source exhausted after {} cycles", rover.num_cycles());

    // ---- SAVE AND REPORT ----

    let world_map = rover.world_map();

    session.save("world_map.json", world_map.clone());
    session.save_image("world_map.png", world_map.to_image());
    if let Some(img) = rover.vision_image() {
        session.save_image("last_vision.png", img.clone());
    }

    let stats = world_map.stats();
    info!("World map statistics: {:#?}", stats);

    if let Some(ref path) = opt.ground_truth {
        let truth = map::load_ground_truth(path)
            .wrap_err_with(|| format!("Failed to load the ground truth map {:?}", path))?;
        let fidelity = world_map
            .fidelity(&truth)
            .wrap_err("Failed to score the world map")?;

        info!(
            "Mapped {:.1} % of the ground truth with {:.1} % fidelity",
            fidelity.percent_mapped, fidelity.fidelity
        );
    }

    session.exit();

    Ok(())
}

/// Run cycles until the source is exhausted.
///
/// A frame with an invalid pose is rejected and the previous command repeated. Any other error
/// stops the rover.
fn run<S: TelemSource>(rover: &mut Rover, mut source: S) -> Result<(), Report> {
    while let Some(frame) = source
        .next_frame()
        .wrap_err("Failed to get the next telemetry frame")?
    {
        let cmd = match rover.cycle(&frame.telem, frame.image) {
            Ok(cmd) => {
                if let Err(e) = rover.write() {
                    warn!("Could not archive the cycle: {}", e);
                }
                cmd
            }
            Err(RoverError::InvalidPose(e)) => {
                warn!("Rejected telemetry frame: {}", e);
                rover.state().to_cmd()
            }
            Err(e) => {
                error!("Rover cycle failed: {}", e);
                return Err(e).wrap_err("Rover cycle failed");
            }
        };

        source
            .send_cmd(&cmd)
            .wrap_err("Failed to send the command")?;
    }

    Ok(())
}
