//! Host platform (linux for example) utility functions

use std::path::PathBuf;

use uname;

/// Name of the environment variable holding the software root directory.
pub const SW_ROOT_ENV: &str = "RC_CAR_SW_ROOT";

/// Retrieve uname information.
pub fn get_uname() -> std::io::Result<uname::Info> {
    uname::uname()
}

/// Get the software root directory from the `RC_CAR_SW_ROOT` environment variable.
pub fn get_sw_root() -> Result<PathBuf, std::env::VarError> {
    std::env::var(SW_ROOT_ENV).map(PathBuf::from)
}

/// True if the host looks like a Raspberry Pi (an ARM linux machine).
pub fn is_arm_host() -> bool {
    match get_uname() {
        Ok(info) => info.machine.starts_with("arm") || info.machine.starts_with("aarch64"),
        Err(_) => false,
    }
}
