//! CLI command definitions and dispatch.

pub mod create;
pub mod delete;
pub mod info;
pub mod list;
pub mod logs;
pub mod start;
pub mod stop;
pub mod supervise;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};
use minirun_common::config::MinirunConfig;
use minirun_common::constants::HOME_ENV;
use minirun_common::types::ContainerName;
use minirun_runtime::engine::Engine;

/// minirun — minimal daemon-less container runtime.
#[derive(Parser, Debug)]
#[command(name = "minirun", version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,

    /// Directory holding container records, locks, and logs.
    #[arg(long, global = true, env = HOME_ENV)]
    pub data_dir: Option<PathBuf>,
}

/// Available CLI subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Register a new container.
    Create(create::CreateArgs),
    /// List registered containers.
    #[command(alias = "ls")]
    List(list::ListArgs),
    /// Show a container's record.
    #[command(alias = "inspect")]
    Info(info::InfoArgs),
    /// Start a created container.
    Start(start::StartArgs),
    /// Stop a running container.
    Stop(stop::StopArgs),
    /// Remove a container that is not running.
    #[command(alias = "rm")]
    Delete(delete::DeleteArgs),
    /// View container logs.
    Logs(logs::LogsArgs),
    /// Launch or re-attach to a container and wait for it to exit.
    #[command(hide = true)]
    Supervise(supervise::SuperviseArgs),
}

/// Dispatches the parsed CLI command to its handler.
///
/// # Errors
///
/// Returns an error if configuration loading or the command fails.
pub fn execute(cli: Cli) -> anyhow::Result<ExitCode> {
    let config = MinirunConfig::load(cli.data_dir).context("cannot load configuration")?;
    match cli.command {
        Command::Create(args) => create::execute(args, config),
        Command::List(args) => list::execute(args, config),
        Command::Info(args) => info::execute(args, config),
        Command::Start(args) => start::execute(args, config),
        Command::Stop(args) => stop::execute(args, config),
        Command::Delete(args) => delete::execute(args, config),
        Command::Logs(args) => logs::execute(args, config),
        Command::Supervise(args) => supervise::execute(args, config),
    }
}

/// Opens the engine for `config`.
pub(crate) fn engine(config: MinirunConfig) -> anyhow::Result<Engine> {
    Ok(Engine::new(config)?)
}

/// Parses a container name argument.
pub(crate) fn parse_name(name: &str) -> anyhow::Result<ContainerName> {
    Ok(ContainerName::parse(name)?)
}
