//! # Communications interface crate.
//!
//! Provides the message types exchanged between the rover software and the simulator bridge.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Telemetry and command messages for the simulator bridge
pub mod sim;
