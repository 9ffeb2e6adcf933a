//! Host environment utility functions

use std::path::PathBuf;

/// Environment variable pointing at the root of the software checkout.
///
/// Parameter files are read from `<root>/params` and sessions are written to
/// `<root>/sessions`.
pub const SW_ROOT_ENV_VAR: &str = "SR_ROVER_SW_ROOT";

/// Get the software root directory from the environment.
pub fn get_sw_root() -> Result<PathBuf, std::env::VarError> {
    std::env::var(SW_ROOT_ENV_VAR).map(PathBuf::from)
}
