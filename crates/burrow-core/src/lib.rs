//! # burrow-core
//!
//! Low-level Linux isolation primitives for the burrow runtime.
//!
//! This crate provides safe abstractions over:
//! - **Namespaces**: PID, Mount, Network, User, IPC, UTS isolation.
//! - **Filesystem**: `pivot_root` with a `chroot` fallback, baseline mounts.
//! - **Cgroups v2**: CPU, memory, and process-count limiting and accounting.
//!
//! Privileged calls go through the [`syscall::Syscalls`] trait so the
//! sequencing logic can be exercised without root.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod cgroup;
pub mod filesystem;
pub mod namespace;
pub mod syscall;
