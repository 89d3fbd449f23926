//! `runns run` — launch a container.

use clap::Args;
use runns_core::spec::load_spec;

/// Arguments for the `run` command.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Name to register the container under.
    pub name: String,
}

/// Executes the `run` command: checks the name against the registry, loads
/// `./config.json`, starts the container detached, and returns once the
/// PID is registered.
///
/// # Errors
///
/// Returns an error on a name collision, a missing or invalid spec, or a
/// failed launch.
pub fn execute(args: RunArgs) -> anyhow::Result<()> {
    runns_runtime::launcher::validate_name(&args.name)?;
    let cwd = std::env::current_dir()?;
    let spec = load_spec(&cwd)?;
    runns_runtime::launcher::start(&args.name, &spec)?;
    Ok(())
}
