//! Global configuration model for the minirun runtime.
//!
//! Defaults are overlaid by `<data_dir>/config.json` when present, then by
//! environment variables. CLI flags are applied last by the binary.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::constants;
use crate::error::{MinirunError, Result};
use crate::types::ResourceLimits;

/// Root configuration for the minirun runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MinirunConfig {
    /// Base directory for records, locks, and logs.
    pub data_dir: PathBuf,
    /// Root filesystem used when `create` is given none.
    pub default_rootfs: PathBuf,
    /// Command used when `create` is given none.
    pub default_command: Vec<String>,
    /// Resource limits used when `create` is given none.
    pub default_limits: ResourceLimits,
    /// Grace period between SIGTERM and SIGKILL on `stop`.
    pub stop_timeout_secs: u64,
}

impl Default for MinirunConfig {
    fn default() -> Self {
        Self::with_data_dir(constants::resolve_data_dir())
    }
}

/// Subset of [`MinirunConfig`] that `config.json` may override.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    default_rootfs: Option<PathBuf>,
    default_command: Option<Vec<String>>,
    default_limits: Option<ResourceLimits>,
    stop_timeout_secs: Option<u64>,
}

impl ConfigFile {
    fn apply(self, config: &mut MinirunConfig) {
        if let Some(rootfs) = self.default_rootfs {
            config.default_rootfs = rootfs;
        }
        if let Some(command) = self.default_command {
            config.default_command = command;
        }
        if let Some(limits) = self.default_limits {
            config.default_limits = limits;
        }
        if let Some(secs) = self.stop_timeout_secs {
            config.stop_timeout_secs = secs;
        }
    }
}

impl MinirunConfig {
    /// Builds the default configuration rooted at `data_dir`.
    #[must_use]
    pub fn with_data_dir(data_dir: PathBuf) -> Self {
        Self {
            default_rootfs: data_dir.join(constants::DEFAULT_ROOTFS_DIR),
            data_dir,
            default_command: constants::DEFAULT_COMMAND
                .iter()
                .map(ToString::to_string)
                .collect(),
            default_limits: ResourceLimits {
                memory_bytes: Some(constants::DEFAULT_MEMORY_BYTES),
                cpu_percent: Some(constants::DEFAULT_CPU_PERCENT),
            },
            stop_timeout_secs: constants::DEFAULT_STOP_TIMEOUT_SECS,
        }
    }

    /// Loads the configuration for `data_dir`, or the resolved default
    /// data directory when `None`.
    ///
    /// # Errors
    ///
    /// Returns an error if `config.json` exists but cannot be read or parsed.
    pub fn load(data_dir: Option<PathBuf>) -> Result<Self> {
        let data_dir = data_dir.unwrap_or_else(constants::resolve_data_dir);
        let file = data_dir.join(constants::CONFIG_FILE);

        let mut config = Self::with_data_dir(data_dir);
        if file.is_file() {
            tracing::debug!(path = %file.display(), "loading configuration file");
            let content =
                std::fs::read_to_string(&file).map_err(|e| MinirunError::io(&file, e))?;
            let overrides: ConfigFile = serde_json::from_str(&content)?;
            overrides.apply(&mut config);
        }

        if let Some(rootfs) = std::env::var_os(constants::ROOTFS_ENV).filter(|v| !v.is_empty()) {
            config.default_rootfs = PathBuf::from(rootfs);
        }
        config.validate()?;
        Ok(config)
    }

    /// Checks internal consistency.
    ///
    /// # Errors
    ///
    /// Returns [`MinirunError::Config`] if the default command is empty.
    pub fn validate(&self) -> Result<()> {
        if self.default_command.first().is_none_or(String::is_empty) {
            return Err(MinirunError::Config {
                message: "default_command must name a program".into(),
            });
        }
        Ok(())
    }

    /// Directory holding container records.
    #[must_use]
    pub fn containers_dir(&self) -> PathBuf {
        self.data_dir.join(constants::CONTAINERS_DIR)
    }

    /// Directory holding lock files.
    #[must_use]
    pub fn locks_dir(&self) -> PathBuf {
        self.data_dir.join(constants::LOCKS_DIR)
    }

    /// Directory holding container logs.
    #[must_use]
    pub fn logs_dir(&self) -> PathBuf {
        self.data_dir.join(constants::LOGS_DIR)
    }
}
