//! `runns list` — print running containers.

use std::path::Path;

use clap::Args;
use runns_common::constants::REGISTRY_DIR;
use runns_runtime::registry;

/// Arguments for the `list` command.
#[derive(Args, Debug)]
pub struct ListArgs {}

/// Executes the `list` command, printing `<name> <pid>` per container.
/// Entries whose child died early are still listed; the registry is
/// best-effort.
///
/// # Errors
///
/// Returns an error when the registry directory cannot be read.
pub fn execute(_args: ListArgs) -> anyhow::Result<()> {
    for (name, pid) in registry::entries(Path::new(REGISTRY_DIR))? {
        println!("{name} {pid}");
    }
    Ok(())
}
