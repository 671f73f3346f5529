//! `minirun logs` — View container logs.

use std::process::ExitCode;

use clap::Args;
use minirun_common::config::MinirunConfig;

/// Arguments for the `logs` command.
#[derive(Args, Debug)]
pub struct LogsArgs {
    /// Container name.
    pub name: String,
}

/// Executes the `logs` command.
///
/// # Errors
///
/// Returns an error if the container is not found or its log is unreadable.
pub fn execute(args: LogsArgs, config: MinirunConfig) -> anyhow::Result<ExitCode> {
    let name = super::parse_name(&args.name)?;
    let engine = super::engine(config)?;
    let logs = engine.logs(&name)?;

    if logs.is_empty() {
        eprintln!("No logs available for container: {name}");
    } else {
        print!("{logs}");
    }

    Ok(ExitCode::SUCCESS)
}
