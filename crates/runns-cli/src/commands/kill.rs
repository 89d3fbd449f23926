//! `runns kill` — terminate a container.

use std::path::Path;

use clap::Args;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use runns_common::constants::REGISTRY_DIR;
use runns_common::error::RunnsError;
use runns_runtime::registry;

/// Arguments for the `kill` command.
#[derive(Args, Debug)]
pub struct KillArgs {
    /// Name of the container to terminate.
    pub name: String,
}

/// Executes the `kill` command.
///
/// The registry entry is removed before the signal is sent, so a failed
/// kill never leaves a stale entry behind.
///
/// # Errors
///
/// Returns an error when the container is unknown, the entry cannot be
/// read or removed, or the signal is refused.
pub fn execute(args: KillArgs) -> anyhow::Result<()> {
    let dir = Path::new(REGISTRY_DIR);
    if !registry::exists(dir, &args.name)? {
        return Err(RunnsError::ContainerNotFound { name: args.name }.into());
    }
    let pid = registry::read_pid(dir, &args.name)?;
    registry::remove(dir, &args.name)?;
    kill(Pid::from_raw(pid), Signal::SIGKILL)?;
    tracing::info!(name = %args.name, pid, "container killed");
    Ok(())
}
