//! Container process orchestration for the burrow runtime.
//!
//! Resolves a bundle into a [`container::ContainerProcess`], re-executes
//! the runtime into a PID namespace when one is requested, carries run
//! state across that boundary, and sequences the isolation steps up to
//! the final `execve`.

#![allow(unsafe_code)]
#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod container;
pub mod engine;
pub mod init;
pub mod process;
pub mod state;
