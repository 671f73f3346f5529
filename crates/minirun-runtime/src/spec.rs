//! Container specification and its validation.
//!
//! A [`ContainerSpec`] is immutable once admitted to the registry. It is
//! only ever produced by [`validate`], which applies configured defaults to
//! a caller's [`SpecRequest`] and rejects anything the launcher could not
//! use.

use std::path::PathBuf;

use minirun_common::config::MinirunConfig;
use minirun_common::error::{MinirunError, Result};
use minirun_common::types::{ContainerName, ResourceLimits};
use serde::{Deserialize, Serialize};

/// Validated, immutable description of a container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerSpec {
    /// Unique name, also the registry key.
    pub name: ContainerName,
    /// Directory presented as `/` inside the container.
    pub rootfs: PathBuf,
    /// Argument vector executed as the container's PID 1.
    pub command: Vec<String>,
    /// Cgroup limits applied at start.
    #[serde(default)]
    pub limits: ResourceLimits,
}

/// A proposed container as supplied by the caller. Omitted fields take the
/// configured defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpecRequest {
    /// Proposed name.
    pub name: String,
    /// Root filesystem; must exist when given explicitly.
    pub rootfs: Option<PathBuf>,
    /// Command; empty means the configured default.
    pub command: Vec<String>,
    /// Memory limit in bytes.
    pub memory_bytes: Option<u64>,
    /// CPU bandwidth as a percentage of one core.
    pub cpu_percent: Option<u32>,
}

impl SpecRequest {
    /// A request for `name` with every other field defaulted.
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

fn invalid(message: impl Into<String>) -> MinirunError {
    MinirunError::InvalidSpec {
        message: message.into(),
    }
}

/// Validates a request against the configuration's defaults.
///
/// An explicit rootfs must be an existing directory and is canonicalized.
/// The default rootfs is taken as configured and only checked at start.
/// Neither may be `/`: the host root cannot be pivoted onto itself.
///
/// # Errors
///
/// Returns [`MinirunError::InvalidSpec`] if the name, rootfs, command, or
/// limits are unusable.
pub fn validate(request: SpecRequest, config: &MinirunConfig) -> Result<ContainerSpec> {
    let name = ContainerName::parse(request.name)?;

    let rootfs = match request.rootfs {
        Some(path) => {
            if !path.is_dir() {
                return Err(invalid(format!(
                    "rootfs {} is not an existing directory",
                    path.display()
                )));
            }
            std::fs::canonicalize(&path).map_err(|e| MinirunError::io(&path, e))?
        }
        None => config.default_rootfs.clone(),
    };
    if rootfs.parent().is_none() {
        return Err(invalid("rootfs must not be the host root directory"));
    }

    let command = if request.command.is_empty() {
        config.default_command.clone()
    } else {
        request.command
    };
    validate_command(&command)?;

    let limits = ResourceLimits {
        memory_bytes: request.memory_bytes.or(config.default_limits.memory_bytes),
        cpu_percent: request.cpu_percent.or(config.default_limits.cpu_percent),
    };
    validate_limits(&limits)?;

    Ok(ContainerSpec {
        name,
        rootfs,
        command,
        limits,
    })
}

fn validate_command(command: &[String]) -> Result<()> {
    match command.first() {
        None => return Err(invalid("command is empty")),
        Some(program) if program.is_empty() => return Err(invalid("command program is empty")),
        Some(_) => {}
    }
    if let Some(arg) = command.iter().find(|arg| arg.contains('\0')) {
        return Err(invalid(format!("command argument {arg:?} contains a NUL byte")));
    }
    Ok(())
}

fn validate_limits(limits: &ResourceLimits) -> Result<()> {
    if limits.memory_bytes == Some(0) {
        return Err(invalid("memory limit must be greater than zero"));
    }
    if let Some(percent) = limits.cpu_percent {
        let cores = std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get);
        let max = u32::try_from(cores).unwrap_or(u32::MAX).saturating_mul(100);
        if percent == 0 || percent > max {
            return Err(invalid(format!(
                "cpu percent must be between 1 and {max}, got {percent}"
            )));
        }
    }
    Ok(())
}

/// Parses memory strings like "128MiB", "256MB", "1GiB" into bytes.
///
/// # Errors
///
/// Returns [`MinirunError::InvalidSpec`] if the string has no valid number
/// or the value overflows.
#[allow(clippy::option_if_let_else)]
pub fn parse_memory(s: &str) -> Result<u64> {
    let s = s.trim();
    let (num_str, multiplier) = if let Some(n) = s.strip_suffix("GiB") {
        (n, 1024 * 1024 * 1024)
    } else if let Some(n) = s.strip_suffix("GB") {
        (n, 1_000_000_000)
    } else if let Some(n) = s.strip_suffix("MiB") {
        (n, 1024 * 1024)
    } else if let Some(n) = s.strip_suffix("MB") {
        (n, 1_000_000)
    } else if let Some(n) = s.strip_suffix("KiB") {
        (n, 1024)
    } else if let Some(n) = s.strip_suffix("KB") {
        (n, 1000)
    } else {
        (s, 1)
    };
    num_str
        .trim()
        .parse::<u64>()
        .ok()
        .and_then(|n| n.checked_mul(multiplier))
        .ok_or_else(|| invalid(format!("invalid memory size {s:?}")))
}
