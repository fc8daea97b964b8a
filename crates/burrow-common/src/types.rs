//! Domain primitive types used across the burrow workspace.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Unique identifier for a container run, used to name its cgroup.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContainerId(String);

impl ContainerId {
    /// Creates a new container ID from a string value.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a random 12-character container ID.
    #[must_use]
    pub fn generate() -> Self {
        let simple = uuid::Uuid::new_v4().simple().to_string();
        Self(simple[..12].to_string())
    }

    /// Returns the inner string representation.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Resource limits for a container.
///
/// `None` and zero both mean "do not constrain"; a limit is never
/// interpreted as "constrain to zero".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceLimits {
    /// CPU quota in microseconds per period.
    pub cpu_quota_us: Option<u64>,
    /// CPU period in microseconds.
    pub cpu_period_us: Option<u64>,
    /// Memory limit in bytes.
    pub memory_bytes: Option<u64>,
    /// Maximum number of processes.
    pub pids: Option<u64>,
}

impl ResourceLimits {
    /// CPU quota, if one is set and non-zero.
    #[must_use]
    pub fn cpu_quota(&self) -> Option<u64> {
        self.cpu_quota_us.filter(|q| *q > 0)
    }

    /// CPU period, defaulting when unset or zero.
    #[must_use]
    pub fn cpu_period(&self) -> u64 {
        self.cpu_period_us
            .filter(|p| *p > 0)
            .unwrap_or(crate::constants::DEFAULT_CPU_PERIOD_US)
    }

    /// Memory limit, if one is set and non-zero.
    #[must_use]
    pub fn memory(&self) -> Option<u64> {
        self.memory_bytes.filter(|m| *m > 0)
    }

    /// Process count limit, if one is set and non-zero.
    #[must_use]
    pub fn pids_max(&self) -> Option<u64> {
        self.pids.filter(|p| *p > 0)
    }

    /// Whether no field constrains anything.
    #[must_use]
    pub fn is_unconstrained(&self) -> bool {
        self.cpu_quota().is_none() && self.memory().is_none() && self.pids_max().is_none()
    }

    /// Returns a copy where every non-zero field of `overrides` replaces the matching field.
    #[must_use]
    pub fn overridden_by(self, overrides: Self) -> Self {
        Self {
            cpu_quota_us: overrides.cpu_quota().or(self.cpu_quota_us),
            cpu_period_us: overrides.cpu_period_us.filter(|p| *p > 0).or(self.cpu_period_us),
            memory_bytes: overrides.memory().or(self.memory_bytes),
            pids: overrides.pids_max().or(self.pids),
        }
    }
}

/// Resource usage read from a container's cgroup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceStats {
    /// Total CPU time consumed, in microseconds.
    pub cpu_usage_usec: u64,
    /// Current memory usage in bytes.
    pub memory_bytes: u64,
    /// Current number of processes.
    pub pids: u64,
}

/// Phase of a container run, from configuration to image replacement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RunPhase {
    /// Configuration loaded, nothing done yet.
    Configured,
    /// Namespace isolation requested.
    NamespacesRequested,
    /// Root filesystem switched.
    RootSwitched,
    /// Baseline mounts in place.
    MountsProvisioned,
    /// Process image replaced by the target binary.
    Execed,
    /// A fatal error stopped the run.
    Failed,
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Configured => write!(f, "configured"),
            Self::NamespacesRequested => write!(f, "namespaces-requested"),
            Self::RootSwitched => write!(f, "root-switched"),
            Self::MountsProvisioned => write!(f, "mounts-provisioned"),
            Self::Execed => write!(f, "execed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}
