//! `minirun start` — Start a created container.

use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use clap::Args;
use minirun_common::config::MinirunConfig;
use minirun_common::types::ContainerName;
use minirun_runtime::engine::Engine;

use crate::output;

/// Arguments for the `start` command.
#[derive(Args, Debug)]
pub struct StartArgs {
    /// Container name.
    pub name: String,

    /// Wait for the container to exit and return its exit code.
    /// Ctrl+C stops the container.
    #[arg(short, long)]
    pub attach: bool,
}

/// Executes the `start` command.
///
/// # Errors
///
/// Returns an error if the container does not exist, is not in the
/// `created` state, or fails to launch.
pub fn execute(args: StartArgs, config: MinirunConfig) -> anyhow::Result<ExitCode> {
    let name = super::parse_name(&args.name)?;
    let stop_timeout = Duration::from_secs(config.stop_timeout_secs);
    let engine = super::engine(config)?;
    let record = engine.start(&name)?;
    println!("{}", record.name());

    if !args.attach {
        return Ok(ExitCode::SUCCESS);
    }
    wait_for_exit(&engine, &name, stop_timeout)
}

fn wait_for_exit(engine: &Engine, name: &ContainerName, stop_timeout: Duration) -> anyhow::Result<ExitCode> {
    let interrupted = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&interrupted);
    ctrlc::set_handler(move || {
        flag.store(true, Ordering::SeqCst);
    })
    .map_err(|e| anyhow::anyhow!("failed to set Ctrl+C handler: {e}"))?;

    loop {
        let record = engine.info(name)?;
        if record.state.is_finished() {
            return Ok(output::exit_code(record.exit_code));
        }
        if interrupted.load(Ordering::SeqCst) {
            eprintln!("Stopping container {name}...");
            let record = engine.stop(name, stop_timeout)?;
            return Ok(output::exit_code(record.exit_code));
        }
        std::thread::sleep(Duration::from_millis(250));
    }
}
