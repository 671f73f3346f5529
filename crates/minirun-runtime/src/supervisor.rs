//! Process supervisor.
//!
//! `start` does not wait for the container. It spawns a detached
//! `minirun supervise <name>` process that launches the container as its
//! own child, reports the outcome on stdout, waits for an acknowledgement
//! on stdin, and then blocks in `waitpid` until the container terminates
//! and records the exit. The supervisor holds
//! `locks/supervisors/<name>.lock` for its whole life, so "lock held" means
//! "someone is watching this container".
//!
//! If the invoking CLI goes away before acknowledging, the supervisor
//! checks the registry: a record that still says `Created` means the
//! start was never committed, so the container is killed and the record
//! marked failed.
//!
//! A supervisor started with `--attach` re-adopts a running container
//! whose original supervisor died. Not being its parent, it polls
//! liveness and records the exit code as lost.

use std::fs::File;
use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::time::Duration;

use minirun_common::config::MinirunConfig;
use minirun_common::constants::{EXIT_LAUNCH_FAILED, EXIT_STATUS_LOST};
use minirun_common::error::{MinirunError, Result};
use minirun_common::types::{ContainerName, ContainerState};
use minirun_core::cgroup::CgroupManager;
use serde::{Deserialize, Serialize};

use crate::launcher::{self, Launcher};
use crate::lifecycle::LifecycleEvent;
use crate::lock::FileLock;
use crate::logs;
use crate::process::ProcessHandle;
use crate::registry::Registry;
use crate::state::ContainerRecord;

/// Line the CLI writes once the `Running` record is persisted.
pub const ACK: &str = "ok";

/// How often an attached supervisor checks the container.
pub const ATTACH_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Outcome of a launch, sent from supervisor to CLI as one JSON line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LaunchReport {
    /// The entry process is running.
    Started {
        /// PID of the entry process.
        pid: u32,
        /// Kernel start time of the entry process.
        start_time: u64,
    },
    /// The launch failed; nothing is running.
    Failed {
        /// Human-readable cause.
        message: String,
        /// Exit code to record.
        exit_code: i32,
    },
}

/// Writes a report line and flushes it.
///
/// # Errors
///
/// Returns an error if the peer closed the pipe.
pub fn send_report(mut out: impl Write, report: &LaunchReport) -> Result<()> {
    let line = serde_json::to_string(report)?;
    writeln!(out, "{line}")
        .and_then(|()| out.flush())
        .map_err(|e| MinirunError::io("<supervisor stdout>", e))
}

/// Reads one report line. Returns `Ok(None)` at end of input.
///
/// # Errors
///
/// Returns an error if the line cannot be read or is not a report.
pub fn read_report(mut input: impl BufRead) -> Result<Option<LaunchReport>> {
    let mut line = String::new();
    let n = input
        .read_line(&mut line)
        .map_err(|e| MinirunError::io("<supervisor stdout>", e))?;
    if n == 0 {
        return Ok(None);
    }
    Ok(Some(serde_json::from_str(line.trim())?))
}

fn read_ack(mut input: impl BufRead) -> bool {
    let mut line = String::new();
    matches!(input.read_line(&mut line), Ok(n) if n > 0 && line.trim() == ACK)
}

/// Launches the container and supervises it until it terminates.
///
/// `ack` and `report` are the pipes to the CLI that spawned this process.
///
/// # Errors
///
/// Returns an error if the registry cannot be read or the final state
/// cannot be recorded. Launch failures are reported and recorded as
/// `Failed`, not returned.
pub fn run(
    config: &MinirunConfig,
    name: &ContainerName,
    launcher: &Launcher,
    ack: impl BufRead,
    mut report: impl Write,
) -> Result<()> {
    let registry = Registry::open(config)?;
    let Some(_lock) = FileLock::try_exclusive(&registry.supervisor_lock_path(name))? else {
        send_report(
            &mut report,
            &LaunchReport::Failed {
                message: format!("container {name} is already supervised"),
                exit_code: EXIT_LAUNCH_FAILED,
            },
        )?;
        return Ok(());
    };
    let record = registry.get(name)?;
    let log = logs::open_log(&config.logs_dir(), name)?;

    let launched = match launcher.launch(&record.spec, &log) {
        Ok(launched) => launched,
        Err(e) => {
            tracing::error!(name = %name, error = %e, "launch failed");
            let failed = LaunchReport::Failed {
                message: e.to_string(),
                exit_code: e.exit_code(),
            };
            if let Err(err) = send_report(&mut report, &failed) {
                tracing::warn!(name = %name, error = %err, "launch failure not delivered");
            }
            drop(report);
            settle_failed_launch(&registry, name, e.exit_code())?;
            return Ok(());
        }
    };
    drop(log);

    let process = launched.process();
    let started = LaunchReport::Started {
        pid: process.pid,
        start_time: process.start_time,
    };
    let acknowledged = send_report(&mut report, &started).is_ok() && read_ack(ack);
    drop(report);

    if !acknowledged && !start_was_committed(&registry, name, process)? {
        tracing::warn!(name = %name, pid = process.pid, "start was not acknowledged, killing container");
        launched.abort();
        return Ok(());
    }

    tracing::info!(name = %name, pid = process.pid, "supervising container");
    let exit_code = launched.wait();
    tracing::info!(name = %name, pid = process.pid, exit_code, "container exited");
    let _ = record_exit(&registry, name, process, exit_code)?;
    Ok(())
}

/// Decides, under the record lock, whether an unacknowledged start was
/// persisted anyway. An uncommitted start is recorded as failed.
fn start_was_committed(registry: &Registry, name: &ContainerName, process: ProcessHandle) -> Result<bool> {
    let mut entry = registry.entry(name)?;
    match entry.record() {
        Some(record) if record.state == ContainerState::Running => Ok(record.pid == Some(process.pid)),
        Some(record) if record.state == ContainerState::Created => {
            let _ = entry.apply(LifecycleEvent::LaunchFailed {
                exit_code: EXIT_LAUNCH_FAILED,
            })?;
            Ok(false)
        }
        _ => Ok(false),
    }
}

/// Marks a launch that never produced a process as failed, unless the
/// record was already settled. Blocks until the starting CLI releases the
/// record lock.
fn settle_failed_launch(registry: &Registry, name: &ContainerName, exit_code: i32) -> Result<()> {
    let mut entry = registry.entry(name)?;
    if entry
        .record()
        .is_some_and(|record| record.state == ContainerState::Created)
    {
        tracing::info!(name = %name, exit_code, "recording failed launch");
        let _ = entry.apply(LifecycleEvent::LaunchFailed { exit_code })?;
    }
    Ok(())
}

/// Records the termination of `process`, if the registry still tracks it.
///
/// Returns the updated record, or `None` if the record was already
/// settled or describes a different process.
///
/// # Errors
///
/// Returns an error if the record cannot be locked, read, or written.
pub fn record_exit(
    registry: &Registry,
    name: &ContainerName,
    process: ProcessHandle,
    exit_code: i32,
) -> Result<Option<ContainerRecord>> {
    let mut entry = registry.entry(name)?;
    if entry.record().and_then(ContainerRecord::process) != Some(process) {
        tracing::debug!(name = %name, pid = process.pid, "record no longer tracks this process");
        return Ok(None);
    }
    entry
        .apply(LifecycleEvent::ProcessExited { exit_code })
        .map(Some)
}

/// Re-adopts a running container whose supervisor is gone and watches it
/// until it terminates.
///
/// Returns immediately if another supervisor holds the lock or the
/// container is not running.
///
/// # Errors
///
/// Returns an error if the registry cannot be read or written.
pub fn attach(config: &MinirunConfig, name: &ContainerName, poll: Duration) -> Result<()> {
    let registry = Registry::open(config)?;
    let Some(_lock) = FileLock::try_exclusive(&registry.supervisor_lock_path(name))? else {
        tracing::debug!(name = %name, "container already supervised");
        return Ok(());
    };
    let Some(process) = registry.get(name)?.process() else {
        return Ok(());
    };

    tracing::info!(name = %name, pid = process.pid, "attached to running container");
    while process.is_alive() {
        std::thread::sleep(poll);
    }
    tracing::info!(name = %name, pid = process.pid, "container exited, status lost");
    launcher::release_cgroup(&CgroupManager::for_container(name.as_str()));
    let _ = record_exit(&registry, name, process, EXIT_STATUS_LOST)?;
    Ok(())
}

/// Spawns supervisor processes by re-executing the `minirun` binary.
#[derive(Debug, Clone)]
pub struct SupervisorCommand {
    program: PathBuf,
    data_dir: PathBuf,
}

impl SupervisorCommand {
    /// A command running `program` against `data_dir`.
    #[must_use]
    pub const fn new(program: PathBuf, data_dir: PathBuf) -> Self {
        Self { program, data_dir }
    }

    /// A command re-executing the current binary.
    ///
    /// # Errors
    ///
    /// Returns an error if the current executable cannot be determined.
    pub fn current(data_dir: PathBuf) -> Result<Self> {
        let program = std::env::current_exe().map_err(|e| MinirunError::io("/proc/self/exe", e))?;
        Ok(Self::new(program, data_dir))
    }

    fn command(&self, name: &ContainerName, attach: bool, log: File) -> Command {
        let mut cmd = Command::new(&self.program);
        let _ = cmd.arg("--data-dir").arg(&self.data_dir).arg("supervise");
        if attach {
            let _ = cmd.arg("--attach");
        }
        let _ = cmd.arg(name.as_str()).stderr(Stdio::from(log));
        let _ = std::os::unix::process::CommandExt::process_group(&mut cmd, 0);
        cmd
    }

    /// Spawns a launching supervisor with piped stdin and stdout.
    ///
    /// # Errors
    ///
    /// Returns an error if the process cannot be spawned.
    pub fn spawn_launch(&self, name: &ContainerName, log: File) -> Result<Child> {
        self.command(name, false, log)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .spawn()
            .map_err(|e| MinirunError::io(&self.program, e))
    }

    /// Spawns an attaching supervisor and leaves it running.
    ///
    /// # Errors
    ///
    /// Returns an error if the process cannot be spawned.
    pub fn spawn_attach(&self, name: &ContainerName, log: File) -> Result<()> {
        let child = self
            .command(name, true, log)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .spawn()
            .map_err(|e| MinirunError::io(&self.program, e))?;
        tracing::debug!(name = %name, pid = child.id(), "attach supervisor spawned");
        Ok(())
    }
}
