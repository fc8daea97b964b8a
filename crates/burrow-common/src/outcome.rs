//! Success-with-warnings results.
//!
//! Several container setup steps are best-effort: unmounting the old root,
//! enabling cgroup controllers, reading usage counters. Their failures must
//! not abort the run, but they must not vanish either. Operations that have
//! such steps return an [`Outcome`] so callers and tests can inspect the
//! warnings structurally and decide where they get logged.

use std::fmt;
use std::path::{Path, PathBuf};

/// A non-fatal problem encountered while an operation still succeeded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Warning {
    /// Operation that degraded.
    pub op: String,
    /// Filesystem path involved, if any.
    pub path: Option<PathBuf>,
    /// Human-readable cause.
    pub message: String,
}

impl Warning {
    /// Creates a warning without a path.
    pub fn new(op: impl Into<String>, message: impl fmt::Display) -> Self {
        Self {
            op: op.into(),
            path: None,
            message: message.to_string(),
        }
    }

    /// Creates a warning tied to a filesystem path.
    pub fn at(op: impl Into<String>, path: &Path, message: impl fmt::Display) -> Self {
        Self {
            op: op.into(),
            path: Some(path.to_path_buf()),
            message: message.to_string(),
        }
    }
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.path {
            Some(path) => write!(f, "{} {}: {}", self.op, path.display(), self.message),
            None => write!(f, "{}: {}", self.op, self.message),
        }
    }
}

/// A successful value together with the warnings produced on the way.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use]
pub struct Outcome<T> {
    /// The produced value.
    pub value: T,
    /// Warnings collected while producing it, in order.
    pub warnings: Vec<Warning>,
}

impl<T> Outcome<T> {
    /// Wraps a value with no warnings.
    pub const fn clean(value: T) -> Self {
        Self {
            value,
            warnings: Vec::new(),
        }
    }

    /// Wraps a value with the given warnings.
    pub const fn with_warnings(value: T, warnings: Vec<Warning>) -> Self {
        Self { value, warnings }
    }

    /// Whether any warning was recorded.
    #[must_use]
    pub fn is_degraded(&self) -> bool {
        !self.warnings.is_empty()
    }

    /// Transforms the value, keeping the warnings.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        Outcome {
            value: f(self.value),
            warnings: self.warnings,
        }
    }

    /// Moves this outcome's warnings into `sink` and returns the bare value.
    pub fn collect_into(self, sink: &mut Vec<Warning>) -> T {
        sink.extend(self.warnings);
        self.value
    }

    /// Emits every warning through `tracing` and returns the bare value.
    pub fn log(self) -> T {
        for warning in &self.warnings {
            tracing::warn!(
                op = %warning.op,
                path = ?warning.path,
                "{}",
                warning.message
            );
        }
        self.value
    }
}
