//! CLI command definitions and dispatch.

pub mod export;
pub mod run;
pub mod teardown;

use clap::{Parser, Subcommand};

/// Burrow — daemonless chroot container runtime.
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
    /// Run a command inside an exported root filesystem.
    Run(run::RunArgs),
    /// Export a container's filesystem as a tar archive or directory.
    Export(export::ExportArgs),
    /// Unmount everything mounted under an exported root.
    Teardown(teardown::TeardownArgs),
}

/// Dispatches the parsed CLI command to its handler.
///
/// # Errors
///
/// Returns an error if the command execution fails.
pub fn execute(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Run(args) => run::execute(args),
        Command::Export(args) => export::execute(args),
        Command::Teardown(args) => teardown::execute(args),
    }
}
