//! # minirun
//!
//! Daemon-less container lifecycle manager.
//! Every invocation is a short-lived process that performs one operation
//! against the on-disk registry and exits.

mod commands;
mod output;

use std::io::IsTerminal;
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::commands::{Cli, Command};

fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    // Supervisors log lifecycle events into the container log.
    let default_level = if matches!(cli.command, Command::Supervise(_)) {
        "info"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .init();

    commands::execute(cli)
}
