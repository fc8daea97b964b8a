//! Cgroups v2 resource management.
//!
//! Each container gets one group at `<mount>/burrow/<container_id>` in the
//! unified hierarchy. The manager creates it, enables the controllers it
//! needs on the parent, writes limits, attaches the supervised process,
//! reads usage counters, and removes the group once that process is gone.

pub mod cpu;
pub mod discovery;
pub mod memory;
pub mod pids;

use std::path::{Path, PathBuf};

use burrow_common::constants::{CGROUP_PREFIX, REQUIRED_CONTROLLERS};
use burrow_common::error::{BurrowError, Result, ResultExt};
use burrow_common::outcome::{Outcome, Warning};
use burrow_common::types::{ResourceLimits, ResourceStats};

pub use self::discovery::detect_mount_point;

/// Handle to a cgroup for a specific container.
#[derive(Debug, Clone)]
pub struct CgroupManager {
    /// Path to this container's cgroup directory.
    path: PathBuf,
    /// Controllers available at the hierarchy root.
    controllers: Vec<String>,
}

impl CgroupManager {
    /// Resolves the cgroup for `container_id` on the host's cgroup v2 mount.
    ///
    /// Nothing is created until [`Self::setup`].
    ///
    /// # Errors
    ///
    /// Returns [`BurrowError::NotFound`] if cgroup v2 is not mounted, or an
    /// I/O error if the root controller list cannot be read.
    pub fn new(container_id: &str) -> Result<Self> {
        let mount = detect_mount_point().context("detect cgroup v2 mount point")?;
        Self::with_mount_point(&mount, container_id)
    }

    /// Resolves the cgroup for `container_id` under an explicit hierarchy root.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if `<mount_point>/cgroup.controllers` cannot be read.
    pub fn with_mount_point(mount_point: &Path, container_id: &str) -> Result<Self> {
        let controllers =
            discovery::read_controllers(mount_point).context("read cgroup controllers")?;
        Ok(Self {
            path: Self::path_for(mount_point, container_id),
            controllers,
        })
    }

    /// The cgroup directory a container id maps to.
    #[must_use]
    pub fn path_for(mount_point: &Path, container_id: &str) -> PathBuf {
        mount_point.join(CGROUP_PREFIX).join(container_id)
    }

    /// Path to this container's cgroup directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Controllers available at the hierarchy root.
    #[must_use]
    pub fn controllers(&self) -> &[String] {
        &self.controllers
    }

    /// Creates the cgroup directory and enables controllers on its parent.
    ///
    /// Enabling controllers is best-effort: they may already be on, or the
    /// caller may lack permission for the parent. That failure is a warning.
    ///
    /// # Errors
    ///
    /// Returns an error if the cgroup directory cannot be created.
    pub fn setup(&self) -> Result<Outcome<()>> {
        std::fs::create_dir_all(&self.path)
            .map_err(|e| BurrowError::io(&self.path, e))
            .context("create cgroup directory")?;
        tracing::info!(path = %self.path.display(), "cgroup created");

        let enable = self.subtree_control_line();
        if enable.is_empty() {
            return Ok(Outcome::clean(()));
        }
        let Some(parent) = self.path.parent() else {
            return Ok(Outcome::clean(()));
        };
        let control = parent.join("cgroup.subtree_control");
        match std::fs::write(&control, &enable) {
            Ok(()) => {
                tracing::debug!(controllers = %enable, "controllers enabled");
                Ok(Outcome::clean(()))
            }
            Err(e) => Ok(Outcome::with_warnings(
                (),
                vec![Warning::at("enable controllers", &control, e)],
            )),
        }
    }

    fn subtree_control_line(&self) -> String {
        REQUIRED_CONTROLLERS
            .iter()
            .filter(|c| self.controllers.iter().any(|have| have == *c))
            .map(|c| format!("+{c}"))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Writes every non-zero limit to its control file.
    ///
    /// # Errors
    ///
    /// Returns the first failed write.
    pub fn apply_limits(&self, limits: &ResourceLimits) -> Result<()> {
        if let Some(quota) = limits.cpu_quota() {
            cpu::set_cpu_max(&self.path, quota, limits.cpu_period()).context("set CPU limit")?;
        }
        if let Some(bytes) = limits.memory() {
            memory::set_memory_max(&self.path, bytes).context("set memory limit")?;
        }
        if let Some(max) = limits.pids_max() {
            pids::set_pids_max(&self.path, max).context("set pids limit")?;
        }
        tracing::info!(path = %self.path.display(), ?limits, "resource limits applied");
        Ok(())
    }

    /// Adds a process to this cgroup by writing its PID.
    ///
    /// # Errors
    ///
    /// Returns an error if writing to `cgroup.procs` fails.
    pub fn add_process(&self, pid: u32) -> Result<()> {
        write_control(&self.path, "cgroup.procs", &pid.to_string())
            .context("add process to cgroup")?;
        tracing::debug!(pid, "added process to cgroup");
        Ok(())
    }

    /// Reads usage counters. Unreadable counters stay at zero and produce a warning.
    pub fn stats(&self) -> Outcome<ResourceStats> {
        let mut warnings = Vec::new();
        let mut read = |op: &str, value: Result<u64>| {
            value.unwrap_or_else(|e| {
                warnings.push(Warning::at(op, &self.path, e));
                0
            })
        };
        let stats = ResourceStats {
            cpu_usage_usec: read("read CPU stats", cpu::read_cpu_usage(&self.path)),
            memory_bytes: read("read memory stats", memory::read_memory_current(&self.path)),
            pids: read("read pids stats", pids::read_pids_current(&self.path)),
        };
        Outcome::with_warnings(stats, warnings)
    }

    /// Removes the cgroup directory and any child groups.
    ///
    /// Must only be called once every process in the group has exited.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be removed.
    pub fn cleanup(&self) -> Result<()> {
        if !self.path.exists() {
            return Ok(());
        }
        remove_group(&self.path).context("remove cgroup")?;
        tracing::info!(path = %self.path.display(), "cgroup removed");
        Ok(())
    }
}

/// Removes child groups depth-first, then the group itself.
///
/// On a real cgroupfs the control files vanish with `rmdir`; a plain
/// directory refuses that, so recursive removal is the fallback.
fn remove_group(dir: &Path) -> Result<()> {
    let entries = std::fs::read_dir(dir).map_err(|e| BurrowError::io(dir, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| BurrowError::io(dir, e))?;
        if entry.file_type().is_ok_and(|t| t.is_dir()) {
            remove_group(&entry.path())?;
        }
    }
    if std::fs::remove_dir(dir).is_ok() {
        return Ok(());
    }
    std::fs::remove_dir_all(dir).map_err(|e| BurrowError::io(dir, e))
}

pub(crate) fn write_control(cgroup_path: &Path, file: &str, value: &str) -> Result<()> {
    let path = cgroup_path.join(file);
    std::fs::write(&path, value).map_err(|e| BurrowError::io(path, e))
}

pub(crate) fn read_control(cgroup_path: &Path, file: &str) -> Result<String> {
    let path = cgroup_path.join(file);
    std::fs::read_to_string(&path).map_err(|e| BurrowError::io(path, e))
}

pub(crate) fn read_u64(cgroup_path: &Path, file: &str) -> Result<u64> {
    let raw = read_control(cgroup_path, file)?;
    raw.trim().parse().map_err(|_| BurrowError::Config {
        message: format!(
            "{} is not a number: {:?}",
            cgroup_path.join(file).display(),
            raw.trim()
        ),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fake_hierarchy(controllers: &str) -> tempfile::TempDir {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("cgroup.controllers"), controllers).expect("write");
        dir
    }

    #[test]
    fn path_is_deterministic() {
        assert_eq!(
            CgroupManager::path_for(Path::new("/sys/fs/cgroup"), "abc123"),
            PathBuf::from("/sys/fs/cgroup/burrow/abc123")
        );
    }

    #[test]
    fn missing_controllers_file_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert!(CgroupManager::with_mount_point(dir.path(), "c1").is_err());
    }

    #[test]
    fn setup_enables_only_available_controllers() {
        let root = fake_hierarchy("cpuset cpu io pids\n");
        let cg = CgroupManager::with_mount_point(root.path(), "c1").expect("manager");

        let outcome = cg.setup().expect("setup");
        assert!(!outcome.is_degraded());
        assert!(cg.path().is_dir());
        let control = std::fs::read_to_string(root.path().join("burrow/cgroup.subtree_control"))
            .expect("read");
        assert_eq!(control, "+cpu +pids");
    }

    #[test]
    fn setup_without_known_controllers_writes_nothing() {
        let root = fake_hierarchy("io\n");
        let cg = CgroupManager::with_mount_point(root.path(), "c1").expect("manager");
        cg.setup().expect("setup");
        assert!(!root.path().join("burrow/cgroup.subtree_control").exists());
    }

    #[test]
    fn zero_limits_are_skipped() {
        let root = fake_hierarchy("cpu memory pids\n");
        let cg = CgroupManager::with_mount_point(root.path(), "c1").expect("manager");
        cg.setup().expect("setup");

        let limits = ResourceLimits {
            cpu_quota_us: Some(0),
            memory_bytes: Some(0),
            pids: Some(5),
            ..ResourceLimits::default()
        };
        cg.apply_limits(&limits).expect("apply");

        assert!(!cg.path().join("cpu.max").exists());
        assert!(!cg.path().join("memory.max").exists());
        assert_eq!(
            std::fs::read_to_string(cg.path().join("pids.max")).expect("read"),
            "5"
        );
    }

    #[test]
    fn cpu_limit_uses_default_period() {
        let root = fake_hierarchy("cpu\n");
        let cg = CgroupManager::with_mount_point(root.path(), "c1").expect("manager");
        cg.setup().expect("setup");
        let limits = ResourceLimits {
            cpu_quota_us: Some(25_000),
            memory_bytes: Some(64 * 1024 * 1024),
            ..ResourceLimits::default()
        };
        cg.apply_limits(&limits).expect("apply");
        assert_eq!(
            std::fs::read_to_string(cg.path().join("cpu.max")).expect("read"),
            "25000 100000"
        );
        assert_eq!(
            std::fs::read_to_string(cg.path().join("memory.max")).expect("read"),
            "67108864"
        );
    }

    #[test]
    fn add_process_writes_procs_file() {
        let root = fake_hierarchy("pids\n");
        let cg = CgroupManager::with_mount_point(root.path(), "c1").expect("manager");
        cg.setup().expect("setup");
        cg.add_process(4242).expect("add");
        assert_eq!(
            std::fs::read_to_string(cg.path().join("cgroup.procs")).expect("read"),
            "4242"
        );
    }

    #[test]
    fn stats_tolerate_unreadable_counters() {
        let root = fake_hierarchy("cpu memory pids\n");
        let cg = CgroupManager::with_mount_point(root.path(), "c1").expect("manager");
        cg.setup().expect("setup");
        std::fs::write(cg.path().join("memory.current"), "2048\n").expect("write");
        std::fs::write(cg.path().join("pids.current"), "3\n").expect("write");

        let outcome = cg.stats();
        assert_eq!(
            outcome.value,
            ResourceStats {
                cpu_usage_usec: 0,
                memory_bytes: 2048,
                pids: 3,
            }
        );
        assert_eq!(outcome.warnings.len(), 1);
        assert_eq!(outcome.warnings[0].op, "read CPU stats");
    }

    #[test]
    fn stats_read_cpu_usage() {
        let root = fake_hierarchy("cpu\n");
        let cg = CgroupManager::with_mount_point(root.path(), "c1").expect("manager");
        cg.setup().expect("setup");
        std::fs::write(cg.path().join("cpu.stat"), "usage_usec 777\nuser_usec 700\n")
            .expect("write");
        assert_eq!(cg.stats().value.cpu_usage_usec, 777);
    }

    #[test]
    fn cleanup_removes_group_and_children() {
        let root = fake_hierarchy("pids\n");
        let cg = CgroupManager::with_mount_point(root.path(), "c1").expect("manager");
        cg.setup().expect("setup");
        std::fs::create_dir_all(cg.path().join("child/grandchild")).expect("mkdir");
        std::fs::write(cg.path().join("pids.max"), "5").expect("write");

        cg.cleanup().expect("cleanup");
        assert!(!cg.path().exists());
        assert!(root.path().join("burrow").is_dir());
        cg.cleanup().expect("second cleanup is a no-op");
    }
}
