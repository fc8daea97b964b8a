//! Child exit status handling.

use burrow_common::error::{BurrowError, Result};
use nix::errno::Errno;
use nix::sys::wait::{WaitStatus, waitpid};
use nix::unistd::Pid;

/// Converts a child's wait status into the exit code the runtime reports.
///
/// A normal exit keeps its code; death by signal maps to `128 + signal`,
/// following the shell convention.
///
/// # Errors
///
/// Returns [`BurrowError::UnexpectedStatus`] for any other status.
pub fn translate_exit_status(status: WaitStatus) -> Result<i32> {
    match status {
        WaitStatus::Exited(_, code) => Ok(code),
        WaitStatus::Signaled(_, signal, _) => Ok(128 + signal as i32),
        other => Err(BurrowError::UnexpectedStatus {
            status: format!("{other:?}"),
        }),
    }
}

/// Blocks until `pid` terminates and returns its translated exit code.
///
/// # Errors
///
/// Returns an error if `waitpid(2)` fails or the status is neither an
/// exit nor a signal.
pub fn wait_for_child(pid: Pid) -> Result<i32> {
    loop {
        match waitpid(pid, None) {
            Ok(status) => {
                tracing::debug!(%pid, ?status, "child status collected");
                return translate_exit_status(status);
            }
            Err(Errno::EINTR) => {}
            Err(e) => return Err(BurrowError::syscall(format!("wait for child {pid}"), e)),
        }
    }
}
