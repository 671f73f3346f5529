//! Cgroups v2 resource management.
//!
//! Each container gets `/sys/fs/cgroup/minirun-<name>` with `memory.max`
//! and `cpu.max` written from its [`ResourceLimits`].

pub mod cpu;
pub mod memory;

use std::path::{Path, PathBuf};

use minirun_common::constants::{CGROUP_PREFIX, CGROUP_V2_PATH, CPU_PERIOD_US};
use minirun_common::error::{MinirunError, Result};
use minirun_common::types::ResourceLimits;

/// Handle to a cgroup for a specific container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CgroupManager {
    /// Path to this container's cgroup directory.
    path: PathBuf,
}

impl CgroupManager {
    /// Returns `true` if the unified cgroups v2 hierarchy is mounted.
    #[must_use]
    pub fn is_available() -> bool {
        Path::new(CGROUP_V2_PATH).join("cgroup.controllers").exists()
    }

    /// Returns a handle for the container's cgroup under the system
    /// hierarchy, without touching the filesystem.
    #[must_use]
    pub fn for_container(name: &str) -> Self {
        Self::under(Path::new(CGROUP_V2_PATH), name)
    }

    /// Returns a handle for the container's cgroup under `root`.
    #[must_use]
    pub fn under(root: &Path, name: &str) -> Self {
        Self {
            path: root.join(format!("{CGROUP_PREFIX}{name}")),
        }
    }

    /// Creates the cgroup for the given container.
    ///
    /// The cpu and memory controllers are enabled in the parent's
    /// `cgroup.subtree_control` first; that write is allowed to fail when
    /// they are already enabled or delegated elsewhere. An existing cgroup
    /// left behind by an earlier run is reused.
    ///
    /// # Errors
    ///
    /// Returns an error if the cgroup directory cannot be created.
    pub fn create(name: &str) -> Result<Self> {
        let manager = Self::for_container(name);
        manager.create_dir()?;
        Ok(manager)
    }

    fn create_dir(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            let control = parent.join("cgroup.subtree_control");
            if let Err(e) = std::fs::write(&control, "+cpu +memory") {
                tracing::debug!(path = %control.display(), error = %e, "could not enable controllers");
            }
        }
        match std::fs::create_dir(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                tracing::debug!(path = %self.path.display(), "reusing existing cgroup");
            }
            Err(e) => return Err(MinirunError::io(&self.path, e)),
        }
        tracing::info!(path = %self.path.display(), "cgroup created");
        Ok(())
    }

    /// Applies resource limits to this cgroup.
    ///
    /// # Errors
    ///
    /// Returns an error if writing to cgroup control files fails.
    pub fn apply_limits(&self, limits: &ResourceLimits) -> Result<()> {
        if let Some(bytes) = limits.memory_bytes {
            memory::set_memory_max(&self.path, bytes)?;
        }
        if let Some(percent) = limits.cpu_percent {
            cpu::set_cpu_max(&self.path, cpu::quota_for_percent(percent), CPU_PERIOD_US)?;
        }
        Ok(())
    }

    /// Adds a process to this cgroup by writing its PID.
    ///
    /// # Errors
    ///
    /// Returns an error if writing to `cgroup.procs` fails.
    pub fn add_process(&self, pid: u32) -> Result<()> {
        let procs_path = self.path.join("cgroup.procs");
        std::fs::write(&procs_path, pid.to_string()).map_err(|e| MinirunError::io(&procs_path, e))?;
        tracing::debug!(pid, "added process to cgroup");
        Ok(())
    }

    /// Removes the cgroup directory.
    ///
    /// Cgroup directories can only be removed with `rmdir(2)` once no
    /// process is left in them. A cgroup that does not exist counts as
    /// destroyed.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory exists but cannot be removed.
    pub fn destroy(&self) -> Result<()> {
        match std::fs::remove_dir(&self.path) {
            Ok(()) => {
                tracing::info!(path = %self.path.display(), "cgroup destroyed");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(MinirunError::io(&self.path, e)),
        }
    }

    /// Returns the cgroup directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}
