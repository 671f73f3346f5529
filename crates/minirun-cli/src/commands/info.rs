//! `minirun info` — Show a container's record.

use std::process::ExitCode;

use clap::Args;
use minirun_common::config::MinirunConfig;

use crate::output;

/// Arguments for the `info` command.
#[derive(Args, Debug)]
pub struct InfoArgs {
    /// Container name.
    pub name: String,

    /// Print the raw JSON record.
    #[arg(long)]
    pub json: bool,
}

/// Executes the `info` command.
///
/// # Errors
///
/// Returns an error if the container does not exist.
pub fn execute(args: InfoArgs, config: MinirunConfig) -> anyhow::Result<ExitCode> {
    let name = super::parse_name(&args.name)?;
    let engine = super::engine(config)?;
    let record = engine.info(&name)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&record)?);
        return Ok(ExitCode::SUCCESS);
    }

    let limits = record.spec.limits;
    println!("Name:       {}", record.name());
    println!("State:      {}", record.state);
    println!("Rootfs:     {}", record.spec.rootfs.display());
    println!("Command:    {}", record.spec.command.join(" "));
    println!(
        "Memory:     {}",
        limits
            .memory_bytes
            .map_or_else(|| "unlimited".to_string(), output::format_bytes)
    );
    println!(
        "CPU:        {}",
        limits
            .cpu_percent
            .map_or_else(|| "unlimited".to_string(), |p| format!("{p}%"))
    );
    println!("PID:        {}", output::or_dash(record.pid));
    println!("Exit code:  {}", output::or_dash(record.exit_code));
    println!("Created:    {}", output::format_time(&record.created_at));
    println!(
        "Started:    {}",
        record.started_at.as_ref().map_or_else(|| "-".to_string(), output::format_time)
    );
    println!(
        "Finished:   {}",
        record.finished_at.as_ref().map_or_else(|| "-".to_string(), output::format_time)
    );

    Ok(ExitCode::SUCCESS)
}
