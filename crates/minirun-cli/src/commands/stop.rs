//! `minirun stop` — Stop a running container.

use std::process::ExitCode;
use std::time::Duration;

use clap::Args;
use minirun_common::config::MinirunConfig;

/// Arguments for the `stop` command.
#[derive(Args, Debug)]
pub struct StopArgs {
    /// Container name.
    pub name: String,

    /// Seconds to wait after SIGTERM before sending SIGKILL.
    #[arg(short, long)]
    pub timeout: Option<u64>,
}

/// Executes the `stop` command.
///
/// # Errors
///
/// Returns an error if the container is not running or does not stop.
pub fn execute(args: StopArgs, config: MinirunConfig) -> anyhow::Result<ExitCode> {
    let name = super::parse_name(&args.name)?;
    let timeout = Duration::from_secs(args.timeout.unwrap_or(config.stop_timeout_secs));
    let engine = super::engine(config)?;
    let record = engine.stop(&name, timeout)?;
    tracing::info!(name = %name, state = %record.state, exit_code = ?record.exit_code, "container stopped");
    println!("{}", record.name());
    Ok(ExitCode::SUCCESS)
}
