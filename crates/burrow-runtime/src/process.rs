//! Process creation and image replacement.
//!
//! The re-exec path clones a child directly into the requested namespaces
//! and has it `execve` the runtime's own binary with the init sentinel, so
//! the child starts over as PID 1 with a clean address space. The target
//! program is started with `execve` as well, replacing the caller.

use std::convert::Infallible;
use std::ffi::{CString, OsString};
use std::os::unix::ffi::OsStrExt;

use burrow_common::constants::{DEFAULT_PATH_ENV, INIT_SENTINEL, REEXEC_STACK_SIZE};
use burrow_common::error::{BurrowError, Result, ResultExt};
use burrow_core::namespace::wait_for_child;
use nix::sched::CloneFlags;
use nix::unistd::Pid;

/// Exit code of a clone child whose `execve` of the runtime failed.
const REEXEC_FAILED: isize = 127;

/// Starts the re-executed init and waits for it.
///
/// The supervising side of a run only talks to its child through this
/// trait, so the cgroup bookkeeping around it can be exercised without
/// cloning anything.
pub trait Launcher {
    /// Starts the container init in the namespaces named by `flags`.
    ///
    /// # Errors
    ///
    /// Returns an error if the child cannot be created.
    fn spawn(&self, flags: CloneFlags, transfer: &[(String, OsString)]) -> Result<Pid>;

    /// Blocks until `pid` exits and returns its exit code.
    ///
    /// # Errors
    ///
    /// Returns an error if waiting fails.
    fn wait(&self, pid: Pid) -> Result<i32>;
}

/// Clones a real child with [`spawn_reexec`] and reaps it.
#[derive(Debug, Clone, Copy, Default)]
pub struct HostLauncher;

impl Launcher for HostLauncher {
    fn spawn(&self, flags: CloneFlags, transfer: &[(String, OsString)]) -> Result<Pid> {
        spawn_reexec(flags, transfer)
    }

    fn wait(&self, pid: Pid) -> Result<i32> {
        wait_for_child(pid)
    }
}

/// Clones a child into `flags` that re-executes this binary as container init.
///
/// `transfer` is appended to the inherited environment, replacing any
/// inherited variables of the same name.
///
/// # Errors
///
/// Returns an error if the executable cannot be located, a value contains
/// a NUL byte, or `clone(2)` fails.
pub fn spawn_reexec(flags: CloneFlags, transfer: &[(String, OsString)]) -> Result<Pid> {
    let exe = std::env::current_exe()
        .map_err(|e| BurrowError::io("/proc/self/exe", e))
        .context("locate runtime executable")?;
    let path = to_cstring(exe.as_os_str().as_bytes())?;
    let argv = [path.clone(), to_cstring(INIT_SENTINEL.as_bytes())?];
    let envp = reexec_env(std::env::vars_os(), transfer)?;

    let mut stack = vec![0u8; REEXEC_STACK_SIZE];
    let child = Box::new(|| match nix::unistd::execve(&path, &argv, &envp) {
        Ok(never) => match never {},
        Err(_) => REEXEC_FAILED,
    });

    // SAFETY: without CLONE_VM the child runs on a copy of this address
    // space, and the callback only calls execve on values built above.
    let pid = unsafe { nix::sched::clone(child, &mut stack, flags, Some(libc::SIGCHLD)) }
        .map_err(|e| BurrowError::syscall("clone", e))?;
    tracing::info!(pid = pid.as_raw(), ?flags, "container init process cloned");
    Ok(pid)
}

/// Builds the child environment: inherited variables minus the transferred
/// keys, followed by the transferred pairs.
fn reexec_env(
    inherited: impl IntoIterator<Item = (OsString, OsString)>,
    transfer: &[(String, OsString)],
) -> Result<Vec<CString>> {
    let mut env = Vec::new();
    for (key, value) in inherited {
        if transfer.iter().any(|(k, _)| k.as_bytes() == key.as_bytes()) {
            continue;
        }
        env.push(env_entry(key.as_bytes(), value.as_bytes())?);
    }
    for (key, value) in transfer {
        env.push(env_entry(key.as_bytes(), value.as_bytes())?);
    }
    Ok(env)
}

fn env_entry(key: &[u8], value: &[u8]) -> Result<CString> {
    let mut entry = Vec::with_capacity(key.len() + value.len() + 1);
    entry.extend_from_slice(key);
    entry.push(b'=');
    entry.extend_from_slice(value);
    to_cstring(&entry)
}

/// Replaces the current process image with `args[0]`.
///
/// An empty `env` is replaced by a default `PATH`. Never returns on success.
///
/// # Errors
///
/// Returns an error if `args` is empty, contains a NUL byte, or `execve(2)` fails.
pub fn exec_target(args: &[String], env: &[String]) -> Result<Infallible> {
    let Some(binary) = args.first() else {
        return Err(BurrowError::Config {
            message: "no command specified".into(),
        });
    };
    let path = to_cstring(binary.as_bytes())?;
    let argv = args
        .iter()
        .map(|a| to_cstring(a.as_bytes()))
        .collect::<Result<Vec<_>>>()?;
    let envp = if env.is_empty() {
        vec![to_cstring(DEFAULT_PATH_ENV.as_bytes())?]
    } else {
        env.iter()
            .map(|e| to_cstring(e.as_bytes()))
            .collect::<Result<Vec<_>>>()?
    };

    tracing::info!(binary = %binary, "executing container process");
    nix::unistd::execve(&path, &argv, &envp)
        .map_err(|e| BurrowError::syscall(format!("exec {binary}"), e))
}

fn to_cstring(bytes: &[u8]) -> Result<CString> {
    CString::new(bytes).map_err(|e| BurrowError::Config {
        message: format!(
            "value contains a NUL byte: {:?}",
            String::from_utf8_lossy(&e.into_vec())
        ),
    })
}

#[cfg(test)]
mod tests {
    use std::ffi::OsStr;

    use super::*;

    #[test]
    fn transferred_keys_replace_inherited_ones() {
        let inherited = vec![
            (OsString::from("HOME"), OsString::from("/root")),
            (OsString::from("BURROW_HOSTNAME"), OsString::from("stale")),
        ];
        let transfer = vec![("BURROW_HOSTNAME".to_string(), OsString::from("fresh"))];
        let env = reexec_env(inherited, &transfer).expect("env");
        let rendered: Vec<&str> = env.iter().map(|c| c.to_str().expect("utf8")).collect();
        assert_eq!(rendered, ["HOME=/root", "BURROW_HOSTNAME=fresh"]);
    }

    #[test]
    fn transferred_values_are_passed_as_raw_bytes() {
        let dir = OsStr::from_bytes(b"/bundles/caf\xe9").to_owned();
        let transfer = vec![("BURROW_BUNDLE_DIR".to_string(), dir)];
        let env = reexec_env(Vec::new(), &transfer).expect("env");
        assert_eq!(env[0].as_bytes(), b"BURROW_BUNDLE_DIR=/bundles/caf\xe9");
    }

    #[test]
    fn empty_args_are_rejected() {
        let err = exec_target(&[], &[]).expect_err("should fail");
        assert!(err.to_string().contains("no command specified"));
    }

    #[test]
    fn nul_bytes_are_rejected_before_exec() {
        let err = exec_target(&["/bin/tr\0ue".to_string()], &[]).expect_err("should fail");
        assert!(matches!(err, BurrowError::Config { .. }));
    }

    #[test]
    fn missing_binary_reports_exec_failure() {
        let err = exec_target(&["/nonexistent/burrow-test-binary".to_string()], &[])
            .expect_err("should fail");
        assert!(err.to_string().starts_with("exec /nonexistent/burrow-test-binary"));
    }
}
