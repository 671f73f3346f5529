//! Runtime engine that orchestrates container lifecycle.

use std::io::{BufReader, Write};
use std::time::{Duration, Instant};

use minirun_common::config::MinirunConfig;
use minirun_common::constants::{EXIT_LAUNCH_FAILED, EXIT_STATUS_LOST};
use minirun_common::error::{MinirunError, Result};
use minirun_common::types::ContainerName;
use minirun_core::cgroup::CgroupManager;
use nix::sys::signal::Signal;

use crate::launcher;
use crate::lifecycle::{self, LifecycleEvent};
use crate::lock::FileLock;
use crate::logs;
use crate::registry::{Entry, Registry};
use crate::spec::{self, SpecRequest};
use crate::state::ContainerRecord;
use crate::supervisor::{self, ACK, LaunchReport, SupervisorCommand};

/// How often `stop` re-reads the record.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// How long `stop` waits after SIGKILL.
const KILL_GRACE: Duration = Duration::from_secs(5);

/// The runtime engine that coordinates all container operations.
///
/// Every method is a complete operation against the on-disk registry; no
/// state is kept in memory between calls.
#[derive(Debug)]
pub struct Engine {
    config: MinirunConfig,
    registry: Registry,
    supervisor: SupervisorCommand,
}

impl Engine {
    /// Creates an engine whose supervisors re-execute the current binary.
    ///
    /// # Errors
    ///
    /// Returns an error if the registry directories cannot be created or
    /// the current executable cannot be located.
    pub fn new(config: MinirunConfig) -> Result<Self> {
        let supervisor = SupervisorCommand::current(config.data_dir.clone())?;
        Self::with_supervisor(config, supervisor)
    }

    /// Creates an engine with an explicit supervisor command.
    ///
    /// # Errors
    ///
    /// Returns an error if the registry directories cannot be created.
    pub fn with_supervisor(config: MinirunConfig, supervisor: SupervisorCommand) -> Result<Self> {
        let registry = Registry::open(&config)?;
        Ok(Self {
            config,
            registry,
            supervisor,
        })
    }

    /// Validates `request` and registers the container.
    ///
    /// # Errors
    ///
    /// Returns [`MinirunError::InvalidSpec`] for a rejected spec or
    /// [`MinirunError::AlreadyExists`] if the name is taken.
    pub fn create(&self, request: SpecRequest) -> Result<ContainerRecord> {
        let spec = spec::validate(request, &self.config)?;
        self.registry.create(spec)
    }

    /// Lists all containers, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the registry cannot be listed.
    pub fn list(&self) -> Result<Vec<ContainerRecord>> {
        let records = self.registry.list()?;
        Ok(records
            .into_iter()
            .map(|record| {
                let fallback = record.clone();
                self.reconcile(record).unwrap_or_else(|e| {
                    tracing::warn!(name = %fallback.name(), error = %e, "cannot reconcile record");
                    fallback
                })
            })
            .collect())
    }

    /// Returns the current record for `name`.
    ///
    /// # Errors
    ///
    /// Returns [`MinirunError::NotFound`] if no such container exists.
    pub fn info(&self, name: &ContainerName) -> Result<ContainerRecord> {
        let record = self.registry.get(name)?;
        self.reconcile(record)
    }

    /// Starts a `Created` container under a detached supervisor.
    ///
    /// # Errors
    ///
    /// Returns [`MinirunError::NotFound`], [`MinirunError::IllegalTransition`]
    /// if the container is not `Created`, or [`MinirunError::LaunchFailure`]
    /// if the launch failed. A failed launch is still recorded.
    pub fn start(&self, name: &ContainerName) -> Result<ContainerRecord> {
        let mut entry = self.registry.entry(name)?;
        let _ = lifecycle::check(
            entry.require()?,
            &LifecycleEvent::Launched {
                pid: 0,
                start_time: 0,
            },
        )?;

        let log = logs::open_log(&self.config.logs_dir(), name)?;
        let mut child = match self.supervisor.spawn_launch(name, log) {
            Ok(child) => child,
            Err(e) => return Self::fail_start(&mut entry, e.to_string(), EXIT_LAUNCH_FAILED),
        };

        let report = child
            .stdout
            .take()
            .map_or(Ok(None), |out| supervisor::read_report(BufReader::new(out)));
        match report {
            Ok(Some(LaunchReport::Started { pid, start_time })) => {
                let record = entry.apply(LifecycleEvent::Launched { pid, start_time })?;
                if let Some(mut stdin) = child.stdin.take() {
                    if let Err(e) = writeln!(stdin, "{ACK}") {
                        tracing::warn!(name = %name, error = %e, "supervisor went away after launch");
                    }
                }
                tracing::info!(name = %name, pid, "container started");
                Ok(record)
            }
            Ok(Some(LaunchReport::Failed { message, exit_code })) => {
                let result = Self::fail_start(&mut entry, message, exit_code);
                // The supervisor settles the record under the same lock.
                drop(entry);
                let _ = child.wait();
                result
            }
            Ok(None) | Err(_) => {
                let result = Self::fail_start(
                    &mut entry,
                    "supervisor exited without reporting; see the container log".into(),
                    EXIT_LAUNCH_FAILED,
                );
                drop(child.stdin.take());
                drop(entry);
                let status = child.wait();
                tracing::warn!(name = %name, ?status, "supervisor exited without a report");
                result
            }
        }
    }

    fn fail_start(entry: &mut Entry<'_>, message: String, exit_code: i32) -> Result<ContainerRecord> {
        let record = entry.apply(LifecycleEvent::LaunchFailed { exit_code })?;
        tracing::warn!(name = %record.name(), exit_code, %message, "container failed to start");
        Err(MinirunError::LaunchFailure {
            name: record.name().to_string(),
            message,
        })
    }

    /// Stops a running container: SIGTERM, then SIGKILL after `timeout`.
    ///
    /// Returns once the termination has been recorded.
    ///
    /// # Errors
    ///
    /// Returns [`MinirunError::IllegalTransition`] if the container is not
    /// running, or [`MinirunError::StopTimeout`] if it survives SIGKILL.
    pub fn stop(&self, name: &ContainerName, timeout: Duration) -> Result<ContainerRecord> {
        let record = self.info(name)?;
        let Some(process) = record.process() else {
            return Err(MinirunError::IllegalTransition {
                name: name.to_string(),
                state: record.state,
                event: "stop",
            });
        };

        tracing::info!(name = %name, pid = process.pid, "sending SIGTERM");
        let _ = process.signal(Signal::SIGTERM)?;
        if let Some(record) = self.wait_until_finished(name, timeout)? {
            return Ok(record);
        }

        tracing::warn!(name = %name, pid = process.pid, "container ignored SIGTERM, sending SIGKILL");
        let _ = process.signal(Signal::SIGKILL)?;
        self.wait_until_finished(name, KILL_GRACE)?
            .ok_or_else(|| MinirunError::StopTimeout {
                name: name.to_string(),
                seconds: (timeout + KILL_GRACE).as_secs(),
            })
    }

    fn wait_until_finished(
        &self,
        name: &ContainerName,
        timeout: Duration,
    ) -> Result<Option<ContainerRecord>> {
        let deadline = Instant::now() + timeout;
        loop {
            let record = self.info(name)?;
            if record.state.is_finished() {
                return Ok(Some(record));
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }

    /// Deletes a container that is not running, together with its log.
    ///
    /// # Errors
    ///
    /// Returns [`MinirunError::NotFound`] or
    /// [`MinirunError::IllegalTransition`] if the container is running.
    pub fn delete(&self, name: &ContainerName) -> Result<ContainerRecord> {
        let _ = self.info(name)?;
        let removed = self.registry.delete(name)?;
        if let Err(e) = logs::remove_log(&self.config.logs_dir(), name) {
            tracing::warn!(name = %name, error = %e, "cannot remove container log");
        }
        if let Err(e) = CgroupManager::for_container(name.as_str()).destroy() {
            tracing::debug!(name = %name, error = %e, "cannot remove leftover cgroup");
        }
        Ok(removed)
    }

    /// Returns the container's log.
    ///
    /// # Errors
    ///
    /// Returns [`MinirunError::NotFound`] if no such container exists.
    pub fn logs(&self, name: &ContainerName) -> Result<String> {
        let _ = self.registry.get(name)?;
        logs::read_logs(&self.config.logs_dir(), name)
    }

    /// Repairs a `Running` record whose supervisor is gone.
    ///
    /// A live container gets a new attaching supervisor. A dead one is
    /// recorded as failed with a lost exit status.
    ///
    /// # Errors
    ///
    /// Returns an error if the locks or the record cannot be accessed.
    pub fn reconcile(&self, record: ContainerRecord) -> Result<ContainerRecord> {
        let Some(process) = record.process() else {
            return Ok(record);
        };
        let name = record.name().clone();
        let Some(probe) = FileLock::try_exclusive(&self.registry.supervisor_lock_path(&name))?
        else {
            return Ok(record);
        };

        if process.is_alive() {
            drop(probe);
            tracing::info!(name = %name, pid = process.pid, "supervisor missing, re-attaching");
            let log = logs::open_log(&self.config.logs_dir(), &name)?;
            self.supervisor.spawn_attach(&name, log)?;
            return Ok(record);
        }

        tracing::warn!(name = %name, pid = process.pid, "container vanished without a supervisor");
        launcher::release_cgroup(&CgroupManager::for_container(name.as_str()));
        let settled = supervisor::record_exit(&self.registry, &name, process, EXIT_STATUS_LOST)?;
        drop(probe);
        match settled {
            Some(updated) => Ok(updated),
            None => self.registry.get(&name),
        }
    }

    /// Returns the configuration this engine runs with.
    #[must_use]
    pub const fn config(&self) -> &MinirunConfig {
        &self.config
    }
}
