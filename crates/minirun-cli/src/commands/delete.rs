//! `minirun delete` — Remove a container that is not running.

use std::process::ExitCode;

use clap::Args;
use minirun_common::config::MinirunConfig;

/// Arguments for the `delete` command.
#[derive(Args, Debug)]
pub struct DeleteArgs {
    /// Container name.
    pub name: String,
}

/// Executes the `delete` command.
///
/// # Errors
///
/// Returns an error if the container does not exist or is running.
pub fn execute(args: DeleteArgs, config: MinirunConfig) -> anyhow::Result<ExitCode> {
    let name = super::parse_name(&args.name)?;
    let engine = super::engine(config)?;
    let removed = engine.delete(&name)?;
    println!("{}", removed.name());
    Ok(ExitCode::SUCCESS)
}
