//! UTS namespace isolation.
//!
//! Allows the container to have its own hostname.

use burrow_common::error::{Result, ResultExt};

use crate::syscall::Syscalls;

/// Sets the hostname inside the current UTS namespace.
///
/// An empty name is a no-op. Only meaningful once a UTS namespace is active;
/// otherwise it renames the host.
///
/// # Errors
///
/// Returns an error if `sethostname(2)` fails.
pub fn set_hostname(name: &str, sys: &impl Syscalls) -> Result<()> {
    if name.is_empty() {
        return Ok(());
    }
    sys.sethostname(name).context("set hostname")?;
    tracing::debug!(hostname = name, "container hostname set");
    Ok(())
}
