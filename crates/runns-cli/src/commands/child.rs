//! `runns child` — internal re-entry inside the new namespaces.
//!
//! Not intended for direct invocation; the parent spawns it with the spec
//! in the environment.

use clap::Args;

/// Arguments for the hidden `child` command.
#[derive(Args, Debug)]
pub struct ChildArgs {
    /// Container name, forwarded by the parent.
    pub name: String,
}

/// Executes the child-side init: session detach, rootfs construction, and
/// the final exec of the user program. Only returns on error.
///
/// # Errors
///
/// Returns an error if any stage of container init fails.
pub fn execute(_args: ChildArgs) -> anyhow::Result<()> {
    runns_runtime::launcher::init_container()?;
    Ok(())
}
