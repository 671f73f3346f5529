//! Mount utilities for container filesystem setup.

use std::path::Path;

#[cfg(target_os = "linux")]
use nix::mount::{MsFlags, mount};

/// Marks every mount in the current namespace private, so nothing the
/// container mounts or unmounts propagates back to the host.
///
/// # Errors
///
/// Returns the errno if the `mount(2)` syscall fails.
#[cfg(target_os = "linux")]
pub fn make_private() -> nix::Result<()> {
    mount(
        None::<&str>,
        "/",
        None::<&str>,
        MsFlags::MS_REC | MsFlags::MS_PRIVATE,
        None::<&str>,
    )
}

/// Creates a recursive bind mount from `source` to `target`.
///
/// # Errors
///
/// Returns the errno if the `mount(2)` syscall fails.
#[cfg(target_os = "linux")]
pub fn bind_mount(source: &Path, target: &Path) -> nix::Result<()> {
    mount(
        Some(source),
        target,
        None::<&str>,
        MsFlags::MS_BIND | MsFlags::MS_REC,
        None::<&str>,
    )
}

/// Mounts a fresh `proc` filesystem at `target`.
///
/// Must run after entering the container's PID namespace and root so the
/// mount reflects the container's own process tree.
///
/// # Errors
///
/// Returns the errno if the `mount(2)` syscall fails.
#[cfg(target_os = "linux")]
pub fn mount_proc(target: &Path) -> nix::Result<()> {
    mount(
        Some("proc"),
        target,
        Some("proc"),
        MsFlags::MS_NOSUID | MsFlags::MS_NODEV | MsFlags::MS_NOEXEC,
        None::<&str>,
    )
}

/// Stub for non-Linux platforms.
///
/// # Errors
///
/// Always returns `ENOSYS`: mount namespaces require Linux.
#[cfg(not(target_os = "linux"))]
pub fn make_private() -> nix::Result<()> {
    Err(nix::errno::Errno::ENOSYS)
}

/// Stub for non-Linux platforms.
///
/// # Errors
///
/// Always returns `ENOSYS`: bind mounts require Linux.
#[cfg(not(target_os = "linux"))]
pub fn bind_mount(_source: &Path, _target: &Path) -> nix::Result<()> {
    Err(nix::errno::Errno::ENOSYS)
}

/// Stub for non-Linux platforms.
///
/// # Errors
///
/// Always returns `ENOSYS`: procfs mounts require Linux.
#[cfg(not(target_os = "linux"))]
pub fn mount_proc(_target: &Path) -> nix::Result<()> {
    Err(nix::errno::Errno::ENOSYS)
}
