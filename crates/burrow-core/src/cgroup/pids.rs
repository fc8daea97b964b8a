//! Process count control via cgroups v2.
//!
//! Manages `pids.max` and reads `pids.current`.

use std::path::Path;

use burrow_common::error::Result;

use super::{read_u64, write_control};

/// Caps the number of tasks in a cgroup.
///
/// # Errors
///
/// Returns an error if writing to `pids.max` fails.
pub fn set_pids_max(cgroup_path: &Path, max: u64) -> Result<()> {
    write_control(cgroup_path, "pids.max", &max.to_string())?;
    tracing::debug!(max, "pids max set");
    Ok(())
}

/// Reads the number of tasks currently in the group.
///
/// # Errors
///
/// Returns an error if `pids.current` is unreadable or not a number.
pub fn read_pids_current(cgroup_path: &Path) -> Result<u64> {
    read_u64(cgroup_path, "pids.current")
}
