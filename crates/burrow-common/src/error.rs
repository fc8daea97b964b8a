//! Unified error types for the burrow workspace.
//!
//! Every failure carries the name of the operation that failed and, where one
//! is involved, the filesystem path. Low-level syscall failures are split into
//! privilege problems and everything else so callers can tell them apart
//! without parsing messages.

use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type shared across the workspace.
#[derive(Debug, Error)]
pub enum BurrowError {
    /// A file I/O operation failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path where the I/O error occurred.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A configuration value is invalid.
    #[error("invalid configuration: {message}")]
    Config {
        /// Description of the invalid configuration.
        message: String,
    },

    /// A required resource was not found.
    #[error("{kind} not found: {id}")]
    NotFound {
        /// Type of the missing resource.
        kind: &'static str,
        /// Identifier of the missing resource.
        id: String,
    },

    /// The caller lacks the privilege for an isolation, mount, or cgroup operation.
    #[error("permission denied: {op}: {source}")]
    PermissionDenied {
        /// Operation that was refused.
        op: String,
        /// Underlying OS error.
        source: std::io::Error,
    },

    /// A low-level system call failed.
    #[error("{op}: {source}")]
    Syscall {
        /// Operation that failed, including the path when relevant.
        op: String,
        /// Underlying OS error.
        source: std::io::Error,
    },

    /// A child process reported a wait status that is neither an exit nor a signal.
    #[error("unexpected child status: {status}")]
    UnexpectedStatus {
        /// Debug rendering of the status.
        status: String,
    },

    /// Serialization or deserialization failed.
    #[error("serialization error: {source}")]
    Serialization {
        /// Underlying serialization error.
        #[from]
        source: serde_json::Error,
    },

    /// A failure wrapped with the higher-level operation it interrupted.
    #[error("{op}: {source}")]
    Context {
        /// Higher-level operation name.
        op: String,
        /// The wrapped failure.
        source: Box<BurrowError>,
    },
}

impl BurrowError {
    /// Builds an error for a failed system call.
    ///
    /// `EPERM` and `EACCES` become [`BurrowError::PermissionDenied`]; anything
    /// else becomes [`BurrowError::Syscall`].
    pub fn syscall(op: impl Into<String>, source: impl Into<std::io::Error>) -> Self {
        let source = source.into();
        let op = op.into();
        if source.kind() == std::io::ErrorKind::PermissionDenied {
            Self::PermissionDenied { op, source }
        } else {
            Self::Syscall { op, source }
        }
    }

    /// Builds an I/O error for the given path.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Returns the innermost error, looking through any [`BurrowError::Context`] layers.
    #[must_use]
    pub fn root_cause(&self) -> &Self {
        match self {
            Self::Context { source, .. } => source.root_cause(),
            other => other,
        }
    }

    /// Whether the root cause is a missing resource.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self.root_cause(), Self::NotFound { .. })
    }

    /// Whether the root cause is a privilege failure.
    #[must_use]
    pub fn is_permission_denied(&self) -> bool {
        matches!(self.root_cause(), Self::PermissionDenied { .. })
    }
}

/// Adds operation context to fallible results.
pub trait ResultExt<T> {
    /// Wraps the error, if any, with the name of the operation in progress.
    ///
    /// # Errors
    ///
    /// Returns the original error wrapped in [`BurrowError::Context`].
    fn context(self, op: impl Into<String>) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, op: impl Into<String>) -> Result<T> {
        self.map_err(|e| BurrowError::Context {
            op: op.into(),
            source: Box::new(e),
        })
    }
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, BurrowError>;
