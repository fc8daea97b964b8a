//! Root filesystem switching.
//!
//! `pivot_root(2)` is preferred: it replaces the root mount itself, so the
//! old root can be detached and becomes unreachable. When the kernel refuses
//! (the new root is on the same filesystem as the old one, or the mount
//! namespace is constrained) the manager falls back to `chroot(2)`. The
//! fallback is degraded mode: a chroot can be escaped by a sufficiently
//! privileged process, and the result reports it as such.
//!
//! Every call here mounts, so the caller must already be in a private mount
//! namespace (see [`crate::filesystem::isolate_mount_propagation`]).

use std::path::{Path, PathBuf};

use burrow_common::constants::OLD_ROOT_DIR;
use burrow_common::error::{BurrowError, Result, ResultExt};
use burrow_common::outcome::{Outcome, Warning};

use crate::syscall::Syscalls;

/// Progress of a root switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RootfsState {
    /// Nothing done yet.
    Unprepared,
    /// The staging directory exists inside the new root.
    Prepared,
    /// The root was pivoted.
    Switched,
    /// The root was changed with `chroot` after `pivot_root` failed.
    FallbackSwitched,
}

/// How the root was switched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RootSwitch {
    /// Full isolation via `pivot_root`.
    Pivoted,
    /// Degraded isolation via `chroot`.
    ChrootFallback,
}

/// Switches the calling process into a container root filesystem.
#[derive(Debug)]
pub struct RootfsManager<'a, S: Syscalls> {
    rootfs: PathBuf,
    readonly: bool,
    state: RootfsState,
    sys: &'a S,
}

impl<'a, S: Syscalls> RootfsManager<'a, S> {
    /// Creates a manager for the root filesystem at `rootfs`.
    pub fn new(rootfs: impl Into<PathBuf>, readonly: bool, sys: &'a S) -> Self {
        Self {
            rootfs: rootfs.into(),
            readonly,
            state: RootfsState::Unprepared,
            sys,
        }
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> RootfsState {
        self.state
    }

    /// Path of the root filesystem.
    #[must_use]
    pub fn rootfs(&self) -> &Path {
        &self.rootfs
    }

    fn staging_dir(&self) -> PathBuf {
        self.rootfs.join(OLD_ROOT_DIR)
    }

    /// Checks that the root exists, creates the pivot staging directory and
    /// bind-mounts the root onto itself.
    ///
    /// `pivot_root(2)` only accepts a mount point as the new root, and the
    /// read-only remount needs a mount of its own to act on.
    ///
    /// # Errors
    ///
    /// Returns [`BurrowError::NotFound`] if the rootfs path is absent, or an
    /// error if the staging directory or the bind mount cannot be created.
    pub fn prepare(&mut self) -> Result<()> {
        if !self.rootfs.exists() {
            return Err(BurrowError::NotFound {
                kind: "rootfs",
                id: self.rootfs.display().to_string(),
            });
        }
        let staging = self.staging_dir();
        std::fs::create_dir_all(&staging)
            .map_err(|e| BurrowError::io(&staging, e))
            .context("create old_root")?;
        self.sys
            .bind_mount(&self.rootfs, &self.rootfs)
            .context("bind rootfs")?;
        self.state = RootfsState::Prepared;
        Ok(())
    }

    /// Pivots into the new root and detaches the old one.
    ///
    /// Unmounting and removing the staging directory are best-effort: the
    /// old root may still be busy. Their failures are returned as warnings.
    /// The staging directory is only removed once the old root is detached,
    /// and only with `rmdir`: while still mounted it is the host's root.
    ///
    /// # Errors
    ///
    /// Returns an error if `pivot_root(2)` or the `chdir("/")` that follows fails.
    pub fn pivot_root(&mut self) -> Result<Outcome<()>> {
        self.sys.pivot_root(&self.rootfs, &self.staging_dir())?;
        self.sys.chdir(Path::new("/")).context("chdir to new root")?;

        let mut warnings = Vec::new();
        let old_root = Path::new("/").join(OLD_ROOT_DIR);
        match self.sys.umount_detach(&old_root) {
            Ok(()) => {
                if let Err(e) = self.sys.remove_dir(&old_root) {
                    warnings.push(Warning::at("remove old root", &old_root, e));
                }
            }
            Err(e) => warnings.push(Warning::at("unmount old root", &old_root, e)),
        }

        self.state = RootfsState::Switched;
        tracing::info!(rootfs = %self.rootfs.display(), "pivot_root complete");
        Ok(Outcome::with_warnings((), warnings))
    }

    /// Changes root with `chroot(2)`; weaker isolation than [`Self::pivot_root`].
    ///
    /// # Errors
    ///
    /// Returns an error if any of the `chdir`/`chroot` steps fails.
    pub fn chroot_fallback(&mut self) -> Result<()> {
        self.sys.chdir(&self.rootfs).context("chdir to rootfs")?;
        self.sys.chroot(Path::new(".")).context("chroot")?;
        self.sys
            .chdir(Path::new("/"))
            .context("chdir to / after chroot")?;
        self.state = RootfsState::FallbackSwitched;
        tracing::warn!(rootfs = %self.rootfs.display(), "running in degraded chroot mode");
        Ok(())
    }

    /// Remounts the new root read-only if the bundle asked for it.
    ///
    /// Must run after the switch and after every mount point under `/` has
    /// been created.
    ///
    /// # Errors
    ///
    /// Returns an error if the remount fails; a writable root was not asked for.
    pub fn apply_readonly(&self) -> Result<()> {
        if !self.readonly {
            return Ok(());
        }
        self.sys
            .remount_readonly(Path::new("/"))
            .context("remount root read-only")?;
        tracing::info!(rootfs = %self.rootfs.display(), "root remounted read-only");
        Ok(())
    }

    /// Prepares the root, then pivots, falling back to chroot if pivoting fails.
    ///
    /// # Errors
    ///
    /// Returns an error if preparation fails, or if both `pivot_root` and the
    /// chroot fallback fail.
    pub fn switch_root(&mut self) -> Result<Outcome<RootSwitch>> {
        self.prepare().context("prepare rootfs")?;

        match self.pivot_root() {
            Ok(outcome) => Ok(outcome.map(|()| RootSwitch::Pivoted)),
            Err(pivot_err) => {
                let warning = Warning::at(
                    "pivot_root failed, falling back to chroot",
                    &self.rootfs,
                    &pivot_err,
                );
                self.chroot_fallback().context("chroot fallback")?;
                Ok(Outcome::with_warnings(
                    RootSwitch::ChrootFallback,
                    vec![warning],
                ))
            }
        }
    }
}
