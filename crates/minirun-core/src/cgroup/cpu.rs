//! CPU resource control via cgroups v2.
//!
//! Manages the `cpu.max` bandwidth control file.

use std::path::Path;

use minirun_common::constants::CPU_PERIOD_US;
use minirun_common::error::{MinirunError, Result};

/// Converts a percentage of one core into a `cpu.max` quota for
/// [`CPU_PERIOD_US`]. 50% yields `50000`, 200% yields `200000`.
#[must_use]
pub fn quota_for_percent(percent: u32) -> u64 {
    u64::from(percent) * CPU_PERIOD_US / 100
}

/// Sets the CPU bandwidth limit (max microseconds per period).
///
/// Writes `quota_us period_us` to `cpu.max`, where `quota_us` is the
/// maximum CPU time allowed per `period_us` window.
///
/// # Errors
///
/// Returns an error if writing to `cpu.max` fails.
pub fn set_cpu_max(cgroup_path: &Path, quota_us: u64, period_us: u64) -> Result<()> {
    let file = cgroup_path.join("cpu.max");
    std::fs::write(&file, format!("{quota_us} {period_us}"))
        .map_err(|e| MinirunError::io(&file, e))?;
    tracing::debug!(quota_us, period_us, "CPU max quota set");
    Ok(())
}
