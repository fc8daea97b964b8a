//! Locating the cgroups v2 unified hierarchy.

use std::path::{Path, PathBuf};

use burrow_common::constants::{CGROUP_V2_CANDIDATES, PROC_MOUNTS};
use burrow_common::error::{BurrowError, Result};

/// Finds where the cgroup v2 hierarchy is mounted.
///
/// Well-known locations are probed first; the mount table is scanned only
/// when none of them carries a `cgroup.controllers` file.
///
/// # Errors
///
/// Returns [`BurrowError::NotFound`] if no cgroup v2 mount exists.
pub fn detect_mount_point() -> Result<PathBuf> {
    if let Some(found) = first_mounted_candidate(CGROUP_V2_CANDIDATES.iter().map(Path::new)) {
        return Ok(found);
    }
    let table = std::fs::read_to_string(PROC_MOUNTS)
        .map_err(|e| BurrowError::io(PROC_MOUNTS, e))?;
    find_in_mount_table(&table).ok_or_else(|| BurrowError::NotFound {
        kind: "cgroup v2 mount",
        id: PROC_MOUNTS.to_string(),
    })
}

fn first_mounted_candidate<'a>(candidates: impl IntoIterator<Item = &'a Path>) -> Option<PathBuf> {
    candidates
        .into_iter()
        .find(|dir| dir.join("cgroup.controllers").is_file())
        .map(Path::to_path_buf)
}

/// Returns the mount point of the first `cgroup2` entry in a `/proc/mounts` dump.
#[must_use]
pub fn find_in_mount_table(table: &str) -> Option<PathBuf> {
    table.lines().find_map(|line| {
        let mut fields = line.split_whitespace();
        let _source = fields.next()?;
        let target = fields.next()?;
        (fields.next()? == "cgroup2").then(|| PathBuf::from(target))
    })
}

/// Reads the controllers available at the root of the hierarchy.
///
/// # Errors
///
/// Returns an I/O error if `cgroup.controllers` cannot be read.
pub fn read_controllers(mount_point: &Path) -> Result<Vec<String>> {
    let file = mount_point.join("cgroup.controllers");
    let content = std::fs::read_to_string(&file).map_err(|e| BurrowError::io(&file, e))?;
    Ok(content.split_whitespace().map(str::to_string).collect())
}
