//! Filesystem management for container isolation.
//!
//! Provides `pivot_root` with a `chroot` fallback for switching into the
//! bundle's root filesystem, and the baseline pseudo-filesystem mounts.

pub mod mount;
pub mod rootfs;

pub use self::mount::{
    MountSpec, baseline_mounts, isolate_mount_propagation, provision_baseline_mounts,
};
pub use self::rootfs::{RootSwitch, RootfsManager, RootfsState};
