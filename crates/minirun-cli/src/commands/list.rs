//! `minirun list` — List registered containers.

use std::process::ExitCode;

use clap::Args;
use minirun_common::config::MinirunConfig;

use crate::output;

/// Arguments for the `list` command.
#[derive(Args, Debug)]
pub struct ListArgs {
    /// Only print container names.
    #[arg(short, long)]
    pub quiet: bool,
}

/// Executes the `list` command.
///
/// # Errors
///
/// Returns an error if the registry cannot be read.
pub fn execute(args: ListArgs, config: MinirunConfig) -> anyhow::Result<ExitCode> {
    let engine = super::engine(config)?;
    let containers = engine.list()?;

    if args.quiet {
        for c in &containers {
            println!("{}", c.name());
        }
        return Ok(ExitCode::SUCCESS);
    }

    if containers.is_empty() {
        println!("No containers found.");
        return Ok(ExitCode::SUCCESS);
    }

    println!(
        "{:<24} {:<10} {:<8} {:<6} {:<20}",
        "NAME", "STATE", "PID", "EXIT", "CREATED"
    );
    for c in &containers {
        println!(
            "{:<24} {:<10} {:<8} {:<6} {:<20}",
            c.name(),
            c.state,
            output::or_dash(c.pid),
            output::or_dash(c.exit_code),
            output::format_time(&c.created_at),
        );
    }

    Ok(ExitCode::SUCCESS)
}
