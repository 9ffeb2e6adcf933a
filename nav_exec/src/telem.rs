//! # Telemetry sources
//!
//! Sources of camera frames and telemetry for the rover, and sinks for its commands:
//!
//! - [`ReplayLog`] - a recorded simulator run, read from its CSV log and image directory.
//! - [`StdioBridge`] - a live bridge exchanging one JSON message per line, telemetry on the input
//!   and commands on the output.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::{
    io::{self, BufRead, Write},
    path::{Path, PathBuf},
};

use image::RgbImage;
use log::{debug, trace};
use serde::Deserialize;

use comms_if::sim::{SimCmd, SimError, SimTelemetry};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Field delimiter of simulator log files.
const LOG_DELIMITER: u8 = b';';

/// Name of the image directory next to a simulator log file.
const LOG_IMAGE_DIR: &str = "IMG";

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

/// A source of telemetry frames which accepts the rover's commands in return.
pub trait TelemSource {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Get the next frame, or `None` once the source is exhausted.
    fn next_frame(&mut self) -> Result<Option<Frame>, Self::Error>;

    /// Send the command produced from the last frame.
    fn send_cmd(&mut self, cmd: &SimCmd) -> Result<(), Self::Error>;
}

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// One cycle's worth of input.
#[derive(Debug, Clone)]
pub struct Frame {
    pub telem: SimTelemetry,

    /// The decoded camera image.
    pub image: RgbImage,
}

/// A recorded simulator run.
#[derive(Debug)]
pub struct ReplayLog {
    /// Directory holding the log file.
    root: PathBuf,

    records: std::vec::IntoIter<LogRecord>,
}

/// One row of a simulator log.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
struct LogRecord {
    path: String,
    steer_angle: f64,
    throttle: f64,
    brake: f64,
    speed: f64,
    #[serde(rename = "X_Position")]
    x_position: f64,
    #[serde(rename = "Y_Position")]
    y_position: f64,
    pitch: f64,
    yaw: f64,
    roll: f64,
}

/// Line based JSON bridge.
pub struct StdioBridge<R, W> {
    reader: R,
    writer: W,
    line: String,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ReplayError {
    #[error("Could not read the log file: {0}")]
    CsvError(csv::Error),

    #[error("Could not load image {0:?}: {1}")]
    ImageLoadError(PathBuf, image::ImageError),
}

#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("Bridge IO error: {0}")]
    IoError(io::Error),

    #[error("Invalid telemetry from the bridge: {0}")]
    TelemetryError(SimError),

    #[error("Could not serialize the command: {0}")]
    SerializeError(serde_json::Error),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl ReplayLog {
    /// Open a simulator log file.
    ///
    /// The whole log is read up front, images are loaded as frames are requested.
    pub fn open<P: AsRef<Path>>(log_path: P) -> Result<Self, ReplayError> {
        let log_path = log_path.as_ref();

        let mut reader = csv::ReaderBuilder::new()
            .delimiter(LOG_DELIMITER)
            .trim(csv::Trim::All)
            .from_path(log_path)
            .map_err(ReplayError::CsvError)?;

        let records = reader
            .deserialize()
            .collect::<Result<Vec<LogRecord>, _>>()
            .map_err(ReplayError::CsvError)?;

        debug!("Loaded {} records from {:?}", records.len(), log_path);

        Ok(Self {
            root: log_path
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_default(),
            records: records.into_iter(),
        })
    }

    /// Number of frames left in the log.
    pub fn remaining(&self) -> usize {
        self.records.len()
    }

    /// Find the image a record refers to.
    ///
    /// Logs store the path on the machine they were recorded on, so if that path doesn't exist
    /// the image is looked for relative to the log, then in the log's image directory.
    fn resolve_image(&self, path: &str) -> PathBuf {
        let recorded = PathBuf::from(path);

        if recorded.is_absolute() && recorded.exists() {
            return recorded;
        }

        let relative = self.root.join(&recorded);
        if relative.exists() {
            return relative;
        }

        match recorded.file_name() {
            Some(name) => self.root.join(LOG_IMAGE_DIR).join(name),
            None => relative,
        }
    }
}

impl TelemSource for ReplayLog {
    type Error = ReplayError;

    fn next_frame(&mut self) -> Result<Option<Frame>, Self::Error> {
        let record = match self.records.next() {
            Some(r) => r,
            None => return Ok(None),
        };

        let path = self.resolve_image(&record.path);
        let image = image::open(&path)
            .map_err(|e| ReplayError::ImageLoadError(path.clone(), e))?
            .to_rgb8();

        trace!(
            "Replaying {:?} (recorded steer {:.2}, throttle {:.2}, brake {:.2})",
            path,
            record.steer_angle,
            record.throttle,
            record.brake
        );

        let telem = SimTelemetry {
            position: [record.x_position, record.y_position],
            yaw: record.yaw,
            pitch: record.pitch,
            roll: record.roll,
            speed: record.speed,
            ..Default::default()
        };

        Ok(Some(Frame { telem, image }))
    }

    /// Commands have nowhere to go during a replay.
    fn send_cmd(&mut self, cmd: &SimCmd) -> Result<(), Self::Error> {
        trace!("Replay command: {:?}", cmd);
        Ok(())
    }
}

impl<R: BufRead, W: Write> StdioBridge<R, W> {
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader,
            writer,
            line: String::new(),
        }
    }

    /// Consume the bridge, returning the writer.
    pub fn into_writer(self) -> W {
        self.writer
    }
}

impl<R: BufRead, W: Write> TelemSource for StdioBridge<R, W> {
    type Error = BridgeError;

    /// Read the next telemetry message, skipping blank lines.
    fn next_frame(&mut self) -> Result<Option<Frame>, Self::Error> {
        loop {
            self.line.clear();

            let n = self
                .reader
                .read_line(&mut self.line)
                .map_err(BridgeError::IoError)?;

            if n == 0 {
                return Ok(None);
            }

            if self.line.trim().is_empty() {
                continue;
            }

            let telem =
                SimTelemetry::from_json(self.line.trim()).map_err(BridgeError::TelemetryError)?;
            let image = telem.decode_image().map_err(BridgeError::TelemetryError)?;

            return Ok(Some(Frame { telem, image }));
        }
    }

    fn send_cmd(&mut self, cmd: &SimCmd) -> Result<(), Self::Error> {
        serde_json::to_writer(&mut self.writer, cmd).map_err(BridgeError::SerializeError)?;
        writeln!(self.writer).map_err(BridgeError::IoError)?;
        self.writer.flush().map_err(BridgeError::IoError)
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use image::Rgb;
    use std::{fs, io::Cursor};

    fn telem_line(x: f64) -> String {
        let img = RgbImage::from_pixel(4, 2, Rgb([10, 20, 30]));
        let telem = SimTelemetry {
            image: SimTelemetry::encode_image(&img).unwrap(),
            position: [x, 2.0],
            speed: 0.5,
            ..Default::default()
        };

        serde_json::to_string(&telem).unwrap()
    }

    #[test]
    fn test_stdio_bridge() {
        let input = format!("{}\n\n{}\n", telem_line(1.0), telem_line(3.0));
        let mut bridge = StdioBridge::new(Cursor::new(input), Vec::new());

        let f = bridge.next_frame().unwrap().unwrap();
        assert_eq!(f.telem.position, [1.0, 2.0]);
        assert_eq!(f.image.get_pixel(3, 1), &Rgb([10, 20, 30]));

        bridge
            .send_cmd(&SimCmd {
                throttle: 0.2,
                steer: -15.0,
                ..Default::default()
            })
            .unwrap();

        let f = bridge.next_frame().unwrap().unwrap();
        assert_eq!(f.telem.position, [3.0, 2.0]);

        assert!(bridge.next_frame().unwrap().is_none());

        let out = String::from_utf8(bridge.into_writer()).unwrap();
        let cmd: SimCmd = serde_json::from_str(out.lines().next().unwrap()).unwrap();
        assert_eq!(cmd.steer, -15.0);
        assert_eq!(cmd.throttle, 0.2);
    }

    #[test]
    fn test_stdio_bridge_bad_message() {
        let mut bridge = StdioBridge::new(Cursor::new("{not json}\n"), Vec::new());

        assert!(matches!(
            bridge.next_frame(),
            Err(BridgeError::TelemetryError(SimError::TelemetryParseError(_)))
        ));
    }

    #[test]
    fn test_replay_log() {
        let root = std::env::temp_dir().join(format!("nav_exec_replay_{}", std::process::id()));
        fs::create_dir_all(root.join("IMG")).unwrap();

        RgbImage::from_pixel(8, 4, Rgb([200, 200, 200]))
            .save(root.join("IMG").join("robocam_0.png"))
            .unwrap();

        // Recorded on another machine, the image is found in the IMG directory
        fs::write(
            root.join("robot_log.csv"),
            "Path;SteerAngle;Throttle;Brake;Speed;X_Position;Y_Position;Pitch;Yaw;Roll\n\
             /home/someone/IMG/robocam_0.png;0;0.2;0;0.5;99.7;85.3;0.1;56.8;359.9\n",
        )
        .unwrap();

        let mut log = ReplayLog::open(root.join("robot_log.csv")).unwrap();
        assert_eq!(log.remaining(), 1);

        let f = log.next_frame().unwrap().unwrap();
        assert_eq!(f.image.dimensions(), (8, 4));
        assert_eq!(f.telem.position, [99.7, 85.3]);
        assert_eq!(f.telem.yaw, 56.8);
        assert_eq!(f.telem.roll, 359.9);
        assert_eq!(f.telem.speed, 0.5);

        assert!(log.next_frame().unwrap().is_none());

        fs::remove_dir_all(&root).unwrap();
    }
}
