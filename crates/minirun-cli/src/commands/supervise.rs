//! `minirun supervise` — Internal: own a container's process until it exits.
//!
//! Spawned by `start` (and by reconciliation with `--attach`); not meant to
//! be run by hand.

use std::process::ExitCode;

use clap::Args;
use minirun_common::config::MinirunConfig;
use minirun_runtime::launcher::Launcher;
use minirun_runtime::supervisor::{self, ATTACH_POLL_INTERVAL};

/// Arguments for the hidden `supervise` command.
#[derive(Args, Debug)]
pub struct SuperviseArgs {
    /// Container name.
    pub name: String,

    /// Re-attach to an already running container instead of launching.
    #[arg(long)]
    pub attach: bool,
}

/// Executes the `supervise` command.
///
/// # Errors
///
/// Returns an error if the registry cannot be read or updated.
pub fn execute(args: SuperviseArgs, config: MinirunConfig) -> anyhow::Result<ExitCode> {
    let name = super::parse_name(&args.name)?;
    if args.attach {
        supervisor::attach(&config, &name, ATTACH_POLL_INTERVAL)?;
    } else {
        let stdin = std::io::stdin();
        let stdout = std::io::stdout();
        supervisor::run(&config, &name, &Launcher::default(), stdin.lock(), stdout.lock())?;
    }
    Ok(ExitCode::SUCCESS)
}
