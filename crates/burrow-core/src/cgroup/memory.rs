//! Memory resource control via cgroups v2.
//!
//! Manages `memory.max` and reads `memory.current`.

use std::path::Path;

use burrow_common::error::Result;

use super::{read_u64, write_control};

/// Sets the hard memory limit for a cgroup.
///
/// # Errors
///
/// Returns an error if writing to `memory.max` fails.
pub fn set_memory_max(cgroup_path: &Path, bytes: u64) -> Result<()> {
    write_control(cgroup_path, "memory.max", &bytes.to_string())?;
    tracing::debug!(bytes, "memory max set");
    Ok(())
}

/// Reads the group's current memory usage in bytes.
///
/// # Errors
///
/// Returns an error if `memory.current` is unreadable or not a number.
pub fn read_memory_current(cgroup_path: &Path) -> Result<u64> {
    read_u64(cgroup_path, "memory.current")
}
