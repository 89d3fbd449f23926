//! CLI command definitions and dispatch.

pub mod child;
pub mod kill;
pub mod list;
pub mod run;

use clap::{Parser, Subcommand};

/// runns — minimal mount/PID-namespace container launcher.
#[derive(Parser, Debug)]
#[command(name = "runns", version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,
}

/// Available CLI subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Launch a container from ./config.json.
    Run(run::RunArgs),
    /// Internal re-entry point inside the new namespaces.
    #[command(hide = true)]
    Child(child::ChildArgs),
    /// Terminate a container and remove its registry entry.
    Kill(kill::KillArgs),
    /// List running containers.
    List(list::ListArgs),
}

/// Dispatches the parsed CLI command to its handler.
///
/// # Errors
///
/// Returns an error if the command execution fails.
pub fn execute(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Run(args) => run::execute(args),
        Command::Child(args) => child::execute(args),
        Command::Kill(args) => kill::execute(args),
        Command::List(args) => list::execute(args),
    }
}
