//! Linux namespace management for container isolation.
//!
//! Maps the bundle's namespace list onto `clone(2)`/`unshare(2)` flags,
//! creates namespaces for the calling process, and translates the wait
//! status of a namespaced child into a shell-style exit code.

pub mod uts;
pub mod wait;

use std::fmt;

use burrow_common::error::{Result, ResultExt};
use nix::sched::CloneFlags;

use crate::syscall::Syscalls;

pub use self::uts::set_hostname;
pub use self::wait::{translate_exit_status, wait_for_child};

/// A single namespace type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NamespaceKind {
    /// Hostname and domain name.
    Uts,
    /// Process IDs.
    Pid,
    /// Mount table.
    Mount,
    /// System V IPC and POSIX message queues.
    Ipc,
    /// Network stack.
    Net,
    /// User and group IDs.
    User,
}

impl NamespaceKind {
    /// All kinds, in display order.
    pub const ALL: [Self; 6] = [
        Self::Uts,
        Self::Pid,
        Self::Mount,
        Self::Ipc,
        Self::Net,
        Self::User,
    ];

    /// Parses a bundle namespace type name.
    ///
    /// Returns `None` for names burrow does not know.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "uts" => Some(Self::Uts),
            "pid" => Some(Self::Pid),
            "mount" => Some(Self::Mount),
            "ipc" => Some(Self::Ipc),
            "network" => Some(Self::Net),
            "user" => Some(Self::User),
            _ => None,
        }
    }

    /// The `CLONE_NEW*` flag for this namespace.
    #[must_use]
    pub const fn clone_flag(self) -> CloneFlags {
        match self {
            Self::Uts => CloneFlags::CLONE_NEWUTS,
            Self::Pid => CloneFlags::CLONE_NEWPID,
            Self::Mount => CloneFlags::CLONE_NEWNS,
            Self::Ipc => CloneFlags::CLONE_NEWIPC,
            Self::Net => CloneFlags::CLONE_NEWNET,
            Self::User => CloneFlags::CLONE_NEWUSER,
        }
    }

    const fn label(self) -> &'static str {
        match self {
            Self::Uts => "UTS",
            Self::Pid => "PID",
            Self::Mount => "MOUNT",
            Self::Ipc => "IPC",
            Self::Net => "NET",
            Self::User => "USER",
        }
    }
}

/// Which namespaces to create for a container.
#[allow(clippy::struct_excessive_bools)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NamespaceSet {
    /// Isolate UTS (hostname) namespace.
    pub uts: bool,
    /// Isolate PID namespace.
    pub pid: bool,
    /// Isolate mount namespace.
    pub mount: bool,
    /// Isolate IPC namespace.
    pub ipc: bool,
    /// Isolate network namespace.
    pub net: bool,
    /// Isolate user namespace.
    pub user: bool,
}

impl NamespaceSet {
    /// Builds a set from bundle namespace type names, ignoring unknown ones.
    pub fn from_names<'a>(types: impl IntoIterator<Item = &'a str>) -> Self {
        let mut set = Self::default();
        for name in types {
            match NamespaceKind::from_name(name) {
                Some(kind) => set.insert(kind),
                None => tracing::debug!(namespace = name, "ignoring unknown namespace type"),
            }
        }
        set
    }

    /// Enables one namespace.
    pub fn insert(&mut self, kind: NamespaceKind) {
        *self.slot(kind) = true;
    }

    /// Disables one namespace.
    pub fn remove(&mut self, kind: NamespaceKind) {
        *self.slot(kind) = false;
    }

    /// Whether a namespace is enabled.
    #[must_use]
    pub const fn contains(&self, kind: NamespaceKind) -> bool {
        match kind {
            NamespaceKind::Uts => self.uts,
            NamespaceKind::Pid => self.pid,
            NamespaceKind::Mount => self.mount,
            NamespaceKind::Ipc => self.ipc,
            NamespaceKind::Net => self.net,
            NamespaceKind::User => self.user,
        }
    }

    fn slot(&mut self, kind: NamespaceKind) -> &mut bool {
        match kind {
            NamespaceKind::Uts => &mut self.uts,
            NamespaceKind::Pid => &mut self.pid,
            NamespaceKind::Mount => &mut self.mount,
            NamespaceKind::Ipc => &mut self.ipc,
            NamespaceKind::Net => &mut self.net,
            NamespaceKind::User => &mut self.user,
        }
    }

    /// Enabled namespaces, in display order.
    pub fn iter(&self) -> impl Iterator<Item = NamespaceKind> + '_ {
        NamespaceKind::ALL
            .into_iter()
            .filter(|kind| self.contains(*kind))
    }

    /// Bitwise union of the `CLONE_NEW*` flags of every enabled namespace.
    ///
    /// Empty for an empty set.
    #[must_use]
    pub fn clone_flags(&self) -> CloneFlags {
        self.iter()
            .fold(CloneFlags::empty(), |flags, kind| flags | kind.clone_flag())
    }

    /// Whether no namespace is requested.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.iter().next().is_none()
    }
}

impl fmt::Display for NamespaceSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let labels: Vec<&str> = self.iter().map(NamespaceKind::label).collect();
        write!(f, "[{}]", labels.join(", "))
    }
}

/// Moves the calling process into every namespace in `set`.
///
/// A no-op when the set is empty.
///
/// # Errors
///
/// Returns an error if `unshare(2)` fails, typically for lack of privilege
/// or missing kernel support.
pub fn create_namespaces(set: &NamespaceSet, sys: &impl Syscalls) -> Result<()> {
    let flags = set.clone_flags();
    if flags.is_empty() {
        tracing::debug!("no namespaces requested");
        return Ok(());
    }
    sys.unshare(flags).context("create namespaces")?;
    tracing::info!(namespaces = %set, "namespaces created");
    Ok(())
}

/// Whether the current process is PID 1, i.e. the root of a PID namespace.
#[must_use]
pub fn is_namespaced() -> bool {
    std::process::id() == 1
}
