//! System-wide constants and default paths.

use std::path::PathBuf;

/// Default base directory for minirun data when running as root without `$HOME`.
pub const SYSTEM_DATA_DIR: &str = "/var/lib/minirun";

/// Environment variable overriding the data directory.
pub const HOME_ENV: &str = "MINIRUN_HOME";

/// Environment variable overriding the default root filesystem.
pub const ROOTFS_ENV: &str = "MINIRUN_ROOTFS";

/// Returns the data directory, preferring `$MINIRUN_HOME`, then
/// `$HOME/.minirun`, falling back to `/var/lib/minirun`.
pub fn resolve_data_dir() -> PathBuf {
    if let Some(dir) = std::env::var_os(HOME_ENV).filter(|v| !v.is_empty()) {
        return PathBuf::from(dir);
    }
    if let Some(home) = std::env::var_os("HOME").filter(|v| !v.is_empty()) {
        return PathBuf::from(home).join(".minirun");
    }
    PathBuf::from(SYSTEM_DATA_DIR)
}

/// Subdirectory holding one JSON record per container.
pub const CONTAINERS_DIR: &str = "containers";

/// Subdirectory holding per-name lock files.
pub const LOCKS_DIR: &str = "locks";

/// Subdirectory of [`LOCKS_DIR`] holding supervisor locks.
pub const SUPERVISOR_LOCKS_DIR: &str = "supervisors";

/// Subdirectory holding container log files.
pub const LOGS_DIR: &str = "logs";

/// Subdirectory used as the default root filesystem.
pub const DEFAULT_ROOTFS_DIR: &str = "rootfs";

/// Optional configuration file inside the data directory.
pub const CONFIG_FILE: &str = "config.json";

/// File extension of persisted container records.
pub const RECORD_EXTENSION: &str = "json";

/// Command executed when `create` is given none.
pub const DEFAULT_COMMAND: &[&str] = &["/bin/sh"];

/// Default memory limit: 512 MiB.
pub const DEFAULT_MEMORY_BYTES: u64 = 512 * 1024 * 1024;

/// Default CPU bandwidth: half of one core.
pub const DEFAULT_CPU_PERCENT: u32 = 50;

/// Seconds `stop` waits after SIGTERM before sending SIGKILL.
pub const DEFAULT_STOP_TIMEOUT_SECS: u64 = 10;

/// Maximum container name length in bytes.
pub const MAX_NAME_LENGTH: usize = 128;

/// Maximum hostname length accepted by `sethostname(2)`.
pub const MAX_HOSTNAME_LENGTH: usize = 64;

/// Cgroups v2 unified hierarchy mount point.
pub const CGROUP_V2_PATH: &str = "/sys/fs/cgroup";

/// Prefix of per-container cgroup directories.
pub const CGROUP_PREFIX: &str = "minirun-";

/// `cpu.max` period in microseconds.
pub const CPU_PERIOD_US: u64 = 100_000;

/// Exit code recorded when the command does not exist inside the rootfs.
pub const EXIT_COMMAND_NOT_FOUND: i32 = 127;

/// Exit code recorded when the command exists but cannot be executed.
pub const EXIT_COMMAND_NOT_EXECUTABLE: i32 = 126;

/// Exit code recorded for any other launch failure.
pub const EXIT_LAUNCH_FAILED: i32 = 125;

/// Exit code recorded when a process vanished without an observable status.
pub const EXIT_STATUS_LOST: i32 = 255;

/// Application name used in CLI output and state files.
pub const APP_NAME: &str = "minirun";
