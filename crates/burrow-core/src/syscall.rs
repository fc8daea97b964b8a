//! The system-call seam.
//!
//! Every privileged operation the isolation layer issues goes through
//! [`Syscalls`]. Production code uses [`HostSyscalls`]; tests substitute a
//! recorder to check ordering and failure handling without root.

use std::path::Path;

use burrow_common::error::{BurrowError, Result};
use nix::mount::MsFlags;
use nix::sched::CloneFlags;

use crate::filesystem::mount::MountSpec;

/// Privileged operations needed to build a container environment.
pub trait Syscalls {
    /// Moves the calling process into new namespaces (`unshare(2)`).
    ///
    /// # Errors
    ///
    /// Returns an error if the kernel refuses the request.
    fn unshare(&self, flags: CloneFlags) -> Result<()>;

    /// Sets the hostname of the current UTS namespace.
    ///
    /// # Errors
    ///
    /// Returns an error if `sethostname(2)` fails.
    fn sethostname(&self, name: &str) -> Result<()>;

    /// Mounts `spec` at `target`.
    ///
    /// # Errors
    ///
    /// Returns an error if `mount(2)` fails.
    fn mount(&self, spec: &MountSpec, target: &Path) -> Result<()>;

    /// Swaps the root mount, parking the old root at `put_old`.
    ///
    /// # Errors
    ///
    /// Returns an error if `pivot_root(2)` fails.
    fn pivot_root(&self, new_root: &Path, put_old: &Path) -> Result<()>;

    /// Changes the process root directory.
    ///
    /// # Errors
    ///
    /// Returns an error if `chroot(2)` fails.
    fn chroot(&self, path: &Path) -> Result<()>;

    /// Changes the working directory.
    ///
    /// # Errors
    ///
    /// Returns an error if `chdir(2)` fails.
    fn chdir(&self, path: &Path) -> Result<()>;

    /// Lazily detaches the mount at `path` (`MNT_DETACH`).
    ///
    /// # Errors
    ///
    /// Returns an error if `umount2(2)` fails.
    fn umount_detach(&self, path: &Path) -> Result<()>;

    /// Recursively marks the mount at `path` and everything below it private,
    /// so later mounts neither propagate to nor receive from the host.
    ///
    /// # Errors
    ///
    /// Returns an error if `mount(2)` with `MS_REC|MS_PRIVATE` fails.
    fn make_rprivate(&self, path: &Path) -> Result<()>;

    /// Recursively bind-mounts `source` onto `target`.
    ///
    /// # Errors
    ///
    /// Returns an error if `mount(2)` with `MS_BIND|MS_REC` fails.
    fn bind_mount(&self, source: &Path, target: &Path) -> Result<()>;

    /// Remounts the bind mount at `path` read-only.
    ///
    /// # Errors
    ///
    /// Returns an error if `mount(2)` with `MS_REMOUNT|MS_BIND|MS_RDONLY` fails.
    fn remount_readonly(&self, path: &Path) -> Result<()>;

    /// Removes the empty directory at `path` (`rmdir(2)`).
    ///
    /// # Errors
    ///
    /// Returns an error if the directory is missing, not empty, or busy.
    fn remove_dir(&self, path: &Path) -> Result<()>;
}

/// The real kernel interface, backed by `nix`.
#[derive(Debug, Clone, Copy, Default)]
pub struct HostSyscalls;

impl Syscalls for HostSyscalls {
    fn unshare(&self, flags: CloneFlags) -> Result<()> {
        nix::sched::unshare(flags).map_err(|e| BurrowError::syscall("unshare", e))
    }

    fn sethostname(&self, name: &str) -> Result<()> {
        nix::unistd::sethostname(name).map_err(|e| BurrowError::syscall("sethostname", e))
    }

    fn mount(&self, spec: &MountSpec, target: &Path) -> Result<()> {
        let data = spec.data();
        nix::mount::mount(
            Some(spec.source.as_str()),
            target,
            Some(spec.fs_type.as_str()),
            spec.flags,
            data.as_deref(),
        )
        .map_err(|e| BurrowError::syscall(format!("mount {}", target.display()), e))
    }

    fn pivot_root(&self, new_root: &Path, put_old: &Path) -> Result<()> {
        nix::unistd::pivot_root(new_root, put_old).map_err(|e| {
            BurrowError::syscall(format!("pivot_root {}", new_root.display()), e)
        })
    }

    fn chroot(&self, path: &Path) -> Result<()> {
        nix::unistd::chroot(path)
            .map_err(|e| BurrowError::syscall(format!("chroot {}", path.display()), e))
    }

    fn chdir(&self, path: &Path) -> Result<()> {
        nix::unistd::chdir(path)
            .map_err(|e| BurrowError::syscall(format!("chdir {}", path.display()), e))
    }

    fn umount_detach(&self, path: &Path) -> Result<()> {
        nix::mount::umount2(path, nix::mount::MntFlags::MNT_DETACH)
            .map_err(|e| BurrowError::syscall(format!("umount {}", path.display()), e))
    }

    fn make_rprivate(&self, path: &Path) -> Result<()> {
        remount_flags(path, MsFlags::MS_REC | MsFlags::MS_PRIVATE)
            .map_err(|e| BurrowError::syscall(format!("make {} private", path.display()), e))
    }

    fn bind_mount(&self, source: &Path, target: &Path) -> Result<()> {
        nix::mount::mount(
            Some(source),
            target,
            None::<&str>,
            MsFlags::MS_BIND | MsFlags::MS_REC,
            None::<&str>,
        )
        .map_err(|e| BurrowError::syscall(format!("bind mount {}", target.display()), e))
    }

    fn remount_readonly(&self, path: &Path) -> Result<()> {
        remount_flags(
            path,
            MsFlags::MS_REMOUNT | MsFlags::MS_BIND | MsFlags::MS_RDONLY,
        )
        .map_err(|e| BurrowError::syscall(format!("remount {} read-only", path.display()), e))
    }

    fn remove_dir(&self, path: &Path) -> Result<()> {
        std::fs::remove_dir(path).map_err(|e| BurrowError::io(path, e))
    }
}

/// Changes the flags of an existing mount; source, type and data are unused.
fn remount_flags(path: &Path, flags: MsFlags) -> nix::Result<()> {
    nix::mount::mount(None::<&str>, path, None::<&str>, flags, None::<&str>)
}
