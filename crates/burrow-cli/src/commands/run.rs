//! `burrow run` — run a bundle and wait for it.

use std::path::PathBuf;

use burrow_common::types::ResourceLimits;
use burrow_runtime::engine::{self, RunOptions};
use clap::{Args, ValueEnum};

use crate::output;

/// Network setup for the container.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum NetworkMode {
    /// Keep the bundle's namespace request; no interfaces are configured.
    #[default]
    None,
    /// Share the host network stack.
    Host,
}

/// Arguments for the `run` command.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Bundle directory containing config.json and the root filesystem.
    #[arg(long, default_value = ".")]
    pub bundle: PathBuf,

    /// Hostname inside the container.
    #[arg(long)]
    pub hostname: Option<String>,

    /// CPU quota in microseconds per 100ms period.
    #[arg(long, default_value_t = 0)]
    pub cpu: u64,

    /// Memory limit in bytes.
    #[arg(long, default_value_t = 0)]
    pub mem: u64,

    /// Maximum number of processes.
    #[arg(long, default_value_t = 0)]
    pub pids: u64,

    /// Network mode.
    #[arg(long, value_enum, default_value_t = NetworkMode::None)]
    pub net: NetworkMode,

    /// Command and arguments to run instead of the bundle's.
    #[arg(long, num_args = 1.., allow_hyphen_values = true)]
    pub cmd: Vec<String>,

    /// Container identifier; a short random one is generated if omitted.
    #[arg(long)]
    pub id: Option<String>,

    /// Debug logging and a resource summary on exit.
    #[arg(short, long)]
    pub verbose: bool,

    /// Command to run, after `--`.
    #[arg(last = true)]
    pub command: Vec<String>,
}

impl RunArgs {
    fn to_options(&self) -> RunOptions {
        let nonzero = |v: u64| (v > 0).then_some(v);
        RunOptions {
            bundle_dir: self.bundle.clone(),
            hostname: self.hostname.clone(),
            command: self.cmd.clone(),
            positional: self.command.clone(),
            limits: ResourceLimits {
                cpu_quota_us: nonzero(self.cpu),
                memory_bytes: nonzero(self.mem),
                pids: nonzero(self.pids),
                ..ResourceLimits::default()
            },
            host_network: self.net == NetworkMode::Host,
            id: self.id.clone(),
        }
    }
}

/// Executes the `run` command, returning the container's exit code.
///
/// # Errors
///
/// Returns an error if the container cannot be started.
pub fn execute(args: RunArgs) -> anyhow::Result<i32> {
    let options = args.to_options();
    let report = engine::run(&options).map_err(|e| anyhow::anyhow!("{e}"))?;

    for warning in &report.warnings {
        tracing::warn!(op = %warning.op, path = ?warning.path, "{}", warning.message);
    }
    if let Some(stats) = report.stats {
        tracing::info!(
            cpu_usage_usec = stats.cpu_usage_usec,
            memory_bytes = stats.memory_bytes,
            pids = stats.pids,
            "container resource usage"
        );
        if args.verbose {
            output::print_summary(report.exit_code, &stats);
        }
    }
    Ok(report.exit_code)
}
