//! Run engine: turns command-line intent into a configured container run.

use std::path::PathBuf;

use burrow_common::config::BundleConfig;
use burrow_common::error::{BurrowError, Result, ResultExt};
use burrow_common::types::{ContainerId, ResourceLimits};
use burrow_core::namespace::NamespaceKind;

use crate::container::{ContainerProcess, RunReport};

/// What the caller asked for, before the bundle is consulted.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Bundle directory.
    pub bundle_dir: PathBuf,
    /// Hostname override.
    pub hostname: Option<String>,
    /// Explicit command override; wins over everything else.
    pub command: Vec<String>,
    /// Trailing positional command.
    pub positional: Vec<String>,
    /// Limit overrides; zero or absent fields keep the bundle's value.
    pub limits: ResourceLimits,
    /// Share the host network stack instead of the bundle's request.
    pub host_network: bool,
    /// Container identifier; generated when absent.
    pub id: Option<String>,
}

/// Picks the argument vector: explicit command, then positional, then bundle.
#[must_use]
pub fn resolve_args(command: &[String], positional: &[String], bundle: &[String]) -> Vec<String> {
    [command, positional, bundle]
        .into_iter()
        .find(|args| !args.is_empty())
        .unwrap_or_default()
        .to_vec()
}

/// Loads the bundle and applies every override.
///
/// # Errors
///
/// Returns an error if the bundle directory does not exist or its
/// configuration is missing or invalid.
pub fn prepare(options: &RunOptions) -> Result<ContainerProcess> {
    let bundle_dir = std::fs::canonicalize(&options.bundle_dir)
        .map_err(|e| BurrowError::io(&options.bundle_dir, e))
        .context("resolve bundle directory")?;
    let config = BundleConfig::load(&bundle_dir)?;
    let args = resolve_args(&options.command, &options.positional, &config.process.args);
    let id = options
        .id
        .as_deref()
        .map_or_else(ContainerId::generate, ContainerId::new);

    let mut process = ContainerProcess::new(id, bundle_dir, config)
        .with_args(args)
        .with_limit_overrides(options.limits);
    if let Some(hostname) = options.hostname.as_deref().filter(|h| !h.is_empty()) {
        process = process.with_hostname(hostname);
    }
    if options.host_network {
        process = process.without_namespace(NamespaceKind::Net);
    }
    tracing::debug!(
        id = %process.id(),
        args = ?process.runtime_state().args,
        namespaces = %process.namespaces(),
        "container prepared"
    );
    Ok(process)
}

/// Prepares and runs a container.
///
/// The cgroup is set up only on the re-exec path, where the runtime stays
/// around to remove it after the container exits.
///
/// # Errors
///
/// Returns an error if preparation, cgroup setup or the run fails.
pub fn run(options: &RunOptions) -> Result<RunReport> {
    let mut process = prepare(options)?;
    if process.uses_reexec() {
        process.setup_cgroups()?.log();
    }
    process.run()
}
