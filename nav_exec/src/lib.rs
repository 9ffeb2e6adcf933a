//! # Navigation library.
//!
//! This library allows other crates in the workspace (and the benchmarks and integration tests)
//! to access items defined inside the navigation crate.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Decision module - chooses the drive demands from what the rover can see
pub mod dec;

/// Localisation module - the rover's pose, as supplied by the simulator
pub mod loc;

/// Map module - accumulates everything the rover has seen into the world map
pub mod map;

/// Perception module - turns camera images into terrain information
pub mod per;

/// Rover - runs one full cycle of the other modules
pub mod rover;

/// Rover control state - threaded through each cycle
pub mod state;

/// Telemetry sources - replayed logs and the live bridge
pub mod telem;
