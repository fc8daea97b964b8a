//! Bundle configuration model.
//!
//! A bundle is a directory holding a `config.json` document and a root
//! filesystem tree. Only the subset of the OCI runtime configuration that
//! burrow acts on is modelled; unknown fields are ignored and missing ones
//! take their defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{BurrowError, Result, ResultExt};
use crate::types::ResourceLimits;

/// Root of a bundle's `config.json`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BundleConfig {
    /// Runtime specification version the bundle was written for.
    #[serde(rename = "ociVersion")]
    pub oci_version: String,
    /// Process to run inside the container.
    pub process: ProcessConfig,
    /// Root filesystem location.
    pub root: RootConfig,
    /// Hostname inside the UTS namespace.
    pub hostname: String,
    /// Additional mounts declared by the bundle.
    pub mounts: Vec<MountConfig>,
    /// Linux-specific settings.
    pub linux: LinuxConfig,
}

/// The container process definition.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessConfig {
    /// Whether a terminal is attached.
    pub terminal: bool,
    /// User the process runs as.
    pub user: UserConfig,
    /// Argument list; the first element is the binary.
    pub args: Vec<String>,
    /// Environment in `KEY=value` form.
    pub env: Vec<String>,
    /// Working directory inside the container.
    pub cwd: String,
}

/// Numeric user and group of the container process.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserConfig {
    /// User ID.
    pub uid: u32,
    /// Group ID.
    pub gid: u32,
}

/// Root filesystem settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RootConfig {
    /// Absolute path, or a path relative to the bundle directory.
    pub path: String,
    /// Whether the root should be read-only.
    pub readonly: bool,
}

/// A mount declared in the bundle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MountConfig {
    /// Mount point inside the container.
    pub destination: String,
    /// Filesystem type.
    #[serde(rename = "type")]
    pub fs_type: String,
    /// Mount source.
    pub source: String,
    /// Mount options.
    pub options: Vec<String>,
}

/// Linux-specific settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinuxConfig {
    /// Resource limits.
    pub resources: ResourcesConfig,
    /// Namespaces to create.
    pub namespaces: Vec<NamespaceEntry>,
}

/// Resource limit settings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourcesConfig {
    /// Memory settings.
    pub memory: MemoryConfig,
    /// CPU settings.
    pub cpu: CpuConfig,
    /// Process count settings.
    pub pids: PidsConfig,
}

/// Memory limit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Limit in bytes; zero means unlimited.
    pub limit: u64,
}

/// CPU bandwidth limit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CpuConfig {
    /// Quota in microseconds per period; zero means unlimited.
    pub quota: u64,
    /// Period in microseconds.
    pub period: u64,
}

/// Process count limit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PidsConfig {
    /// Maximum number of processes; zero means unlimited.
    pub limit: u64,
}

/// A namespace request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NamespaceEntry {
    /// Namespace type: `uts`, `pid`, `mount`, `ipc`, `network`, or `user`.
    #[serde(rename = "type")]
    pub ns_type: String,
}

impl ResourcesConfig {
    /// Converts the bundle's resource section into [`ResourceLimits`].
    #[must_use]
    pub fn to_limits(&self) -> ResourceLimits {
        let nonzero = |v: u64| (v > 0).then_some(v);
        ResourceLimits {
            cpu_quota_us: nonzero(self.cpu.quota),
            cpu_period_us: nonzero(self.cpu.period),
            memory_bytes: nonzero(self.memory.limit),
            pids: nonzero(self.pids.limit),
        }
    }
}

impl BundleConfig {
    /// Loads and validates `config.json` from the given bundle directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, is not valid JSON, or
    /// lacks `ociVersion`, `process.args`, or `root.path`.
    pub fn load(bundle_dir: &Path) -> Result<Self> {
        let config_path = bundle_dir.join(crate::constants::CONFIG_FILE_NAME);
        let location = config_path.display().to_string();

        let data = std::fs::read_to_string(&config_path)
            .map_err(|e| BurrowError::io(&config_path, e))
            .context(format!("read config {location}"))?;

        let config: Self = serde_json::from_str(&data)
            .map_err(BurrowError::from)
            .context(format!("parse config {location}"))?;

        config
            .validate()
            .context(format!("validate config {location}"))?;

        tracing::debug!(
            path = %config_path.display(),
            args = ?config.process.args,
            namespaces = config.linux.namespaces.len(),
            "bundle config loaded"
        );
        Ok(config)
    }

    /// Checks the fields every run depends on.
    ///
    /// # Errors
    ///
    /// Returns [`BurrowError::Config`] naming the first missing field.
    pub fn validate(&self) -> Result<()> {
        let missing = if self.oci_version.is_empty() {
            Some("ociVersion")
        } else if self.process.args.is_empty() {
            Some("process.args")
        } else if self.root.path.is_empty() {
            Some("root.path")
        } else {
            None
        };
        match missing {
            Some(field) => Err(BurrowError::Config {
                message: format!("missing {field} field"),
            }),
            None => Ok(()),
        }
    }

    /// Resolves the root filesystem path against the bundle directory.
    #[must_use]
    pub fn rootfs_path(&self, bundle_dir: &Path) -> PathBuf {
        let root = Path::new(&self.root.path);
        if root.is_absolute() {
            root.to_path_buf()
        } else {
            bundle_dir.join(root)
        }
    }

    /// Namespace type names in declaration order.
    #[must_use]
    pub fn namespace_types(&self) -> Vec<&str> {
        self.linux
            .namespaces
            .iter()
            .map(|ns| ns.ns_type.as_str())
            .collect()
    }
}
