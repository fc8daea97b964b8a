//! The child side of the re-exec.
//!
//! A runtime started with the init sentinel is PID 1 of a fresh namespace
//! set. It rebuilds its run from the transferred environment and the
//! bundle on disk, then goes straight into the initialization sequence.

use std::convert::Infallible;

use burrow_common::config::BundleConfig;
use burrow_common::constants::INIT_SENTINEL;
use burrow_common::error::{Result, ResultExt};
use burrow_common::types::ContainerId;
use burrow_core::namespace::is_namespaced;
use burrow_core::syscall::HostSyscalls;

use crate::container::ContainerProcess;
use crate::state::TransferredState;

/// Entry point for `burrow container-init`.
///
/// # Errors
///
/// Returns an error if the transferred state is missing or malformed, the
/// bundle cannot be reloaded, or any initialization step fails. Never
/// returns `Ok`.
pub fn handle_container_init() -> Result<Infallible> {
    if !is_namespaced() {
        tracing::debug!(pid = std::process::id(), "container init is not PID 1");
    }
    let transferred = TransferredState::from_env().context("container init")?;
    let mut process = container_from_transfer(transferred)?;
    process.init_container(&HostSyscalls)
}

/// Rebuilds a run from transferred state, reloading the bundle it names.
///
/// # Errors
///
/// Returns an error if the bundle configuration cannot be loaded.
pub fn container_from_transfer(transferred: TransferredState) -> Result<ContainerProcess> {
    let config =
        BundleConfig::load(&transferred.bundle_dir).context("load config in init")?;
    let mut process = ContainerProcess::new(
        ContainerId::new(INIT_SENTINEL),
        transferred.bundle_dir,
        config,
    );
    if let Some(hostname) = transferred.hostname {
        process = process.with_hostname(hostname);
    }
    if let Some(args) = transferred.args {
        process = process.with_args(args);
    }
    if let Some(dir) = transferred.working_dir {
        process = process.with_working_dir(dir);
    }
    Ok(process)
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    #[test]
    fn missing_bundle_is_reported() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = container_from_transfer(TransferredState {
            bundle_dir: dir.path().join("gone"),
            hostname: None,
            args: None,
            working_dir: None,
        })
        .expect_err("should fail");
        assert!(err.to_string().starts_with("load config in init"));
    }

    #[test]
    fn absent_overrides_keep_bundle_values() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(
            dir.path().join("config.json"),
            r#"{
                "ociVersion": "1.0.2",
                "process": {"args": ["/bin/sh"], "cwd": "/srv"},
                "root": {"path": "rootfs"},
                "hostname": "from-bundle"
            }"#,
        )
        .expect("write");

        let process = container_from_transfer(TransferredState {
            bundle_dir: PathBuf::from(dir.path()),
            hostname: None,
            args: None,
            working_dir: None,
        })
        .expect("load");
        let state = process.runtime_state();
        assert_eq!(state.hostname, "from-bundle");
        assert_eq!(state.args, ["/bin/sh"]);
        assert_eq!(state.working_dir, "/srv");
    }
}
