//! CLI command definitions and dispatch.

pub mod run;

use clap::{Parser, Subcommand};

/// burrow — run a bundle in an isolated container.
#[derive(Parser, Debug)]
#[command(name = "burrow", version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,
}

/// Available CLI subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a container from a bundle and wait for it to exit.
    Run(run::RunArgs),
    /// Print version information.
    Version,
}

impl Cli {
    /// Whether debug logging was requested.
    pub const fn is_verbose(&self) -> bool {
        match &self.command {
            Command::Run(args) => args.verbose,
            Command::Version => false,
        }
    }
}

/// Dispatches the parsed CLI command to its handler.
///
/// Returns the process exit code.
///
/// # Errors
///
/// Returns an error if the command execution fails.
pub fn execute(cli: Cli) -> anyhow::Result<i32> {
    match cli.command {
        Command::Run(args) => run::execute(args),
        Command::Version => {
            crate::output::print_version();
            Ok(0)
        }
    }
}
