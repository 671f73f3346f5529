//! Memory resource control via cgroups v2.

use std::path::Path;

use minirun_common::error::{MinirunError, Result};

/// Sets the hard memory limit for a cgroup.
///
/// # Errors
///
/// Returns an error if writing to `memory.max` fails.
pub fn set_memory_max(cgroup_path: &Path, bytes: u64) -> Result<()> {
    let file = cgroup_path.join("memory.max");
    std::fs::write(&file, bytes.to_string()).map_err(|e| MinirunError::io(&file, e))?;
    tracing::debug!(bytes, "memory max set");
    Ok(())
}
