//! User namespace isolation.
//!
//! Maps root inside the container to the invoking user on the host,
//! enabling rootless containers.

use minirun_common::error::{MinirunError, Result};
use nix::unistd::{Gid, Pid, Uid};

/// Formats a single-entry id map: `inside outside 1`.
fn single_id_map(inside: u32, outside: u32) -> String {
    format!("{inside} {outside} 1\n")
}

/// Writes the UID/GID maps for a child that was cloned into a new user
/// namespace, mapping container root to `uid`/`gid` on the host.
///
/// `setgroups` is denied first, as the kernel requires for unprivileged
/// GID maps.
///
/// # Errors
///
/// Returns an error if writing to `/proc/<pid>/setgroups`, `uid_map`, or
/// `gid_map` fails.
pub fn write_id_maps(pid: Pid, uid: Uid, gid: Gid) -> Result<()> {
    let proc_dir = std::path::PathBuf::from(format!("/proc/{pid}"));

    let setgroups = proc_dir.join("setgroups");
    if setgroups.exists() {
        std::fs::write(&setgroups, "deny").map_err(|e| MinirunError::io(&setgroups, e))?;
    }

    let uid_map = proc_dir.join("uid_map");
    std::fs::write(&uid_map, single_id_map(0, uid.as_raw()))
        .map_err(|e| MinirunError::io(&uid_map, e))?;

    let gid_map = proc_dir.join("gid_map");
    std::fs::write(&gid_map, single_id_map(0, gid.as_raw()))
        .map_err(|e| MinirunError::io(&gid_map, e))?;

    tracing::debug!(%pid, uid = uid.as_raw(), gid = gid.as_raw(), "wrote UID/GID maps");
    Ok(())
}
