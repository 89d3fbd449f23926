//! # runns — minimal container launcher CLI
//!
//! Launches a process inside fresh mount and PID namespaces with a private
//! rootfs built from `./config.json`, and tracks running containers as PID
//! files under `/run/runns`.

#![allow(
    clippy::needless_pass_by_value,
    clippy::print_stdout,
    clippy::print_stderr
)]

mod commands;

use clap::Parser;

use crate::commands::Cli;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    commands::execute(cli)
}
