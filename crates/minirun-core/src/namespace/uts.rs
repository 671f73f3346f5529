//! UTS namespace isolation.
//!
//! Gives the container its own hostname, derived from the container name.

use minirun_common::constants::MAX_HOSTNAME_LENGTH;

/// Returns the hostname a container named `name` gets.
///
/// Container names may be longer than the kernel's hostname limit; the
/// name is truncated in that case. Names are ASCII, so any byte index is a
/// character boundary.
#[must_use]
pub fn hostname_for(name: &str) -> &str {
    &name[..name.len().min(MAX_HOSTNAME_LENGTH)]
}

/// Sets the hostname inside the calling process's UTS namespace.
///
/// # Errors
///
/// Returns the errno if `sethostname(2)` fails.
#[cfg(target_os = "linux")]
pub fn set_hostname(name: &str) -> nix::Result<()> {
    nix::unistd::sethostname(hostname_for(name))
}

/// Stub for non-Linux platforms.
///
/// # Errors
///
/// Always returns `ENOSYS`: UTS namespaces require Linux.
#[cfg(not(target_os = "linux"))]
pub fn set_hostname(_name: &str) -> nix::Result<()> {
    Err(nix::errno::Errno::ENOSYS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_names_are_kept() {
        assert_eq!(hostname_for("web-1"), "web-1");
    }

    #[test]
    fn long_names_are_truncated() {
        let name = "n".repeat(100);
        assert_eq!(hostname_for(&name).len(), MAX_HOSTNAME_LENGTH);
    }
}
