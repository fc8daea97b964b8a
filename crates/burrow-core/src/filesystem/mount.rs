//! Baseline pseudo-filesystem mounts.
//!
//! Every container gets the same five virtual filesystems once its root has
//! been switched: `/proc`, a `tmpfs` `/dev`, `/dev/pts`, `/dev/shm`, and a
//! read-only `/sys`.

use std::path::{Path, PathBuf};

use burrow_common::error::{BurrowError, Result, ResultExt};
use nix::mount::MsFlags;

use crate::syscall::Syscalls;

/// A single mount request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountSpec {
    /// Mount source (device or pseudo-filesystem name).
    pub source: String,
    /// Absolute mount point inside the container.
    pub destination: PathBuf,
    /// Filesystem type.
    pub fs_type: String,
    /// Filesystem-specific options, joined with commas into the mount data.
    pub options: Vec<String>,
    /// Generic mount flags.
    pub flags: MsFlags,
}

impl MountSpec {
    fn new(source: &str, destination: &str, fs_type: &str, options: &[&str], flags: MsFlags) -> Self {
        Self {
            source: source.to_string(),
            destination: PathBuf::from(destination),
            fs_type: fs_type.to_string(),
            options: options.iter().map(ToString::to_string).collect(),
            flags,
        }
    }

    /// The comma-joined option string passed as mount data, if any.
    #[must_use]
    pub fn data(&self) -> Option<String> {
        (!self.options.is_empty()).then(|| self.options.join(","))
    }
}

/// The fixed, ordered baseline mount set.
#[must_use]
pub fn baseline_mounts() -> Vec<MountSpec> {
    vec![
        MountSpec::new("proc", "/proc", "proc", &[], MsFlags::empty()),
        MountSpec::new(
            "tmpfs",
            "/dev",
            "tmpfs",
            &["nosuid", "strictatime", "mode=755", "size=65536k"],
            MsFlags::MS_NOSUID,
        ),
        MountSpec::new(
            "devpts",
            "/dev/pts",
            "devpts",
            &["nosuid", "noexec", "newinstance", "ptmxmode=0666", "mode=0620"],
            MsFlags::MS_NOSUID | MsFlags::MS_NOEXEC,
        ),
        MountSpec::new(
            "tmpfs",
            "/dev/shm",
            "tmpfs",
            &["nosuid", "noexec", "nodev", "mode=1777", "size=65536k"],
            MsFlags::MS_NOSUID | MsFlags::MS_NOEXEC | MsFlags::MS_NODEV,
        ),
        MountSpec::new(
            "sysfs",
            "/sys",
            "sysfs",
            &["nosuid", "noexec", "nodev", "ro"],
            MsFlags::MS_NOSUID | MsFlags::MS_NOEXEC | MsFlags::MS_NODEV | MsFlags::MS_RDONLY,
        ),
    ]
}

/// Makes every mount in the current namespace recursively private.
///
/// Must run right after the mount namespace is unshared and before any
/// other mount call. On hosts where `/` is a shared mount the new namespace
/// otherwise keeps propagating to the host, and `pivot_root(2)` rejects a
/// shared parent mount with `EINVAL`.
///
/// # Errors
///
/// Returns an error if the remount fails.
pub fn isolate_mount_propagation(sys: &impl Syscalls) -> Result<()> {
    sys.make_rprivate(Path::new("/"))
        .context("make mounts private")?;
    tracing::debug!("mount propagation set to private");
    Ok(())
}

/// Mounts the baseline set relative to the current root.
///
/// # Errors
///
/// See [`provision_baseline_mounts_at`].
pub fn provision_baseline_mounts(sys: &impl Syscalls) -> Result<()> {
    provision_baseline_mounts_at(Path::new("/"), sys)
}

/// Mounts the baseline set with every destination resolved under `root`.
///
/// Mounts are issued in order, each after creating its mount point. The
/// sequence stops at the first failure; mounts already made stay in place.
///
/// # Errors
///
/// Returns the first failure, wrapped with the failing destination.
pub fn provision_baseline_mounts_at(root: &Path, sys: &impl Syscalls) -> Result<()> {
    for spec in baseline_mounts() {
        let target = resolve_under(root, &spec.destination);
        mount_one(&spec, &target, sys)
            .context(format!("create mount {}", spec.destination.display()))?;
    }
    tracing::info!("baseline mounts provisioned");
    Ok(())
}

fn mount_one(spec: &MountSpec, target: &Path, sys: &impl Syscalls) -> Result<()> {
    std::fs::create_dir_all(target).map_err(|e| BurrowError::io(target, e))?;
    sys.mount(spec, target)?;
    tracing::debug!(
        fs_type = %spec.fs_type,
        target = %target.display(),
        "mounted"
    );
    Ok(())
}

fn resolve_under(root: &Path, destination: &Path) -> PathBuf {
    destination
        .strip_prefix("/")
        .map_or_else(|_| root.join(destination), |rel| root.join(rel))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syscall::recording::RecordingSyscalls;

    #[test]
    fn baseline_set_is_ordered() {
        let destinations: Vec<PathBuf> = baseline_mounts()
            .into_iter()
            .map(|m| m.destination)
            .collect();
        assert_eq!(
            destinations,
            ["/proc", "/dev", "/dev/pts", "/dev/shm", "/sys"]
                .iter()
                .map(PathBuf::from)
                .collect::<Vec<_>>()
        );
    }

    #[test]
    fn sysfs_is_read_only() {
        let sys = baseline_mounts().pop().expect("sysfs");
        assert!(sys.flags.contains(MsFlags::MS_RDONLY));
        assert_eq!(sys.data().as_deref(), Some("nosuid,noexec,nodev,ro"));
    }

    #[test]
    fn proc_has_no_data() {
        assert_eq!(baseline_mounts()[0].data(), None);
    }

    #[test]
    fn provisioning_creates_mount_points_and_mounts_in_order() {
        let dir = tempfile::tempdir().expect("tempdir");
        let sys = RecordingSyscalls::new();
        provision_baseline_mounts_at(dir.path(), &sys).expect("provision");

        for sub in ["proc", "dev", "dev/pts", "dev/shm", "sys"] {
            assert!(dir.path().join(sub).is_dir(), "{sub} missing");
        }
        let root = dir.path().display().to_string();
        assert_eq!(
            sys.calls(),
            vec![
                format!("mount proc {root}/proc"),
                format!("mount tmpfs {root}/dev"),
                format!("mount devpts {root}/dev/pts"),
                format!("mount tmpfs {root}/dev/shm"),
                format!("mount sysfs {root}/sys"),
            ]
        );
    }

    #[test]
    fn propagation_is_made_private_from_the_root() {
        let sys = RecordingSyscalls::new();
        isolate_mount_propagation(&sys).expect("private");
        assert_eq!(sys.calls(), ["make_rprivate /"]);

        let failing = RecordingSyscalls::new().failing("make_rprivate");
        let err = isolate_mount_propagation(&failing).expect_err("should fail");
        assert!(err.to_string().starts_with("make mounts private"));
    }

    #[test]
    fn provisioning_stops_at_first_failure() {
        let dir = tempfile::tempdir().expect("tempdir");
        let sys = RecordingSyscalls::new().failing("mount devpts");
        let err = provision_baseline_mounts_at(dir.path(), &sys).expect_err("should fail");

        assert!(err.to_string().starts_with("create mount /dev/pts"));
        assert_eq!(sys.calls().len(), 3);
        assert!(!dir.path().join("dev/shm").exists());
    }
}
