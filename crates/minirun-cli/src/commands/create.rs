//! `minirun create` — Register a new container.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Args;
use minirun_common::config::MinirunConfig;
use minirun_runtime::spec::{self, SpecRequest};

/// Arguments for the `create` command.
#[derive(Args, Debug)]
pub struct CreateArgs {
    /// Unique container name.
    pub name: String,

    /// Root filesystem directory (defaults to `<data-dir>/rootfs`).
    #[arg(long)]
    pub rootfs: Option<PathBuf>,

    /// Memory limit, e.g. `256MiB` or `1GiB`.
    #[arg(long, value_parser = parse_memory)]
    pub memory: Option<u64>,

    /// CPU bandwidth as a percentage of one core.
    #[arg(long)]
    pub cpus: Option<u32>,

    /// Command and arguments to run (defaults to `/bin/sh`).
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub command: Vec<String>,
}

fn parse_memory(s: &str) -> Result<u64, String> {
    spec::parse_memory(s).map_err(|e| e.to_string())
}

/// Executes the `create` command.
///
/// # Errors
///
/// Returns an error if the spec is invalid or the name is taken.
pub fn execute(args: CreateArgs, config: MinirunConfig) -> anyhow::Result<ExitCode> {
    let engine = super::engine(config)?;
    let record = engine.create(SpecRequest {
        name: args.name,
        rootfs: args.rootfs,
        command: args.command,
        memory_bytes: args.memory,
        cpu_percent: args.cpus,
    })?;
    tracing::info!(name = %record.name(), rootfs = %record.spec.rootfs.display(), "container created");
    println!("{}", record.name());
    Ok(ExitCode::SUCCESS)
}
