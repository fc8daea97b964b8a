//! CPU bandwidth control via cgroups v2.
//!
//! Manages `cpu.max` and reads consumption from `cpu.stat`.

use std::path::Path;

use burrow_common::error::{BurrowError, Result};

use super::{read_control, write_control};

/// Sets the CPU bandwidth limit (max microseconds per period).
///
/// Writes `quota_us period_us` to `cpu.max`, where `quota_us` is the
/// maximum CPU time allowed per `period_us` window.
///
/// # Errors
///
/// Returns an error if writing to `cpu.max` fails.
pub fn set_cpu_max(cgroup_path: &Path, quota_us: u64, period_us: u64) -> Result<()> {
    write_control(cgroup_path, "cpu.max", &format!("{quota_us} {period_us}"))?;
    tracing::debug!(quota_us, period_us, "CPU max quota set");
    Ok(())
}

/// Reads the total CPU time consumed by the group, in microseconds.
///
/// # Errors
///
/// Returns an error if `cpu.stat` cannot be read or has no `usage_usec` line.
pub fn read_cpu_usage(cgroup_path: &Path) -> Result<u64> {
    let stat = read_control(cgroup_path, "cpu.stat")?;
    parse_usage_usec(&stat).ok_or_else(|| BurrowError::Config {
        message: format!(
            "no usage_usec in {}",
            cgroup_path.join("cpu.stat").display()
        ),
    })
}

fn parse_usage_usec(stat: &str) -> Option<u64> {
    stat.lines().find_map(|line| {
        let (key, value) = line.split_once(' ')?;
        if key == "usage_usec" {
            value.trim().parse().ok()
        } else {
            None
        }
    })
}
