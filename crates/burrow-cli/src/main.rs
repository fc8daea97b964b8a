//! # burrow — minimal container runtime
//!
//! Runs one process from an OCI-style bundle inside fresh namespaces, a
//! pivoted root filesystem, and an optional cgroup v2 group.
//!
//! The same binary is re-executed as the container's PID 1; that call is
//! recognised before argument parsing.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used, clippy::panic))]

mod commands;
mod output;

use burrow_common::constants::INIT_SENTINEL;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::commands::Cli;

fn main() -> anyhow::Result<()> {
    if std::env::args_os().nth(1).is_some_and(|arg| arg == INIT_SENTINEL) {
        init_tracing(false);
        return match burrow_runtime::init::handle_container_init() {
            Ok(never) => match never {},
            Err(e) => Err(anyhow::Error::new(e).context("container init failed")),
        };
    }

    let cli = Cli::parse();
    init_tracing(cli.is_verbose());
    let code = commands::execute(cli)?;
    std::process::exit(code)
}

/// Logs go to stderr so the container's stdout is left alone.
fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .with_writer(std::io::stderr)
        .init();
}
