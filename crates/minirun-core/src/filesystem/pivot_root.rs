//! Secure root filesystem switching via `pivot_root(2)`.
//!
//! More secure than `chroot` because it actually changes the root mount
//! point rather than just the process's view of `/`: once the old root is
//! detached, nothing of the host filesystem stays reachable.

use std::path::Path;

/// Makes `rootfs` the root of the calling process's mount namespace.
///
/// The rootfs is bind-mounted onto itself (`pivot_root` needs a mount
/// point), then pivoted with the `"." "."` form so no `put_old` directory
/// has to exist inside the rootfs. The old root, stacked on top of the new
/// one, is lazily detached.
///
/// # Errors
///
/// Returns the errno of the first failing `mount`, `chdir`, `pivot_root`,
/// or `umount2` call.
#[cfg(target_os = "linux")]
pub fn enter_rootfs(rootfs: &Path) -> nix::Result<()> {
    use nix::mount::{MntFlags, umount2};
    use nix::unistd::{chdir, pivot_root};

    super::mount::bind_mount(rootfs, rootfs)?;
    chdir(rootfs)?;
    pivot_root(".", ".")?;
    umount2(".", MntFlags::MNT_DETACH)?;
    chdir("/")
}

/// Stub for non-Linux platforms.
///
/// # Errors
///
/// Always returns `ENOSYS`: `pivot_root` requires Linux.
#[cfg(not(target_os = "linux"))]
pub fn enter_rootfs(_rootfs: &Path) -> nix::Result<()> {
    Err(nix::errno::Errno::ENOSYS)
}
