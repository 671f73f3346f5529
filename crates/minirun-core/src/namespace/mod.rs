//! Linux namespace management for container isolation.
//!
//! The launcher creates every namespace in a single `clone(2)` call, so
//! this module only decides which flags to pass and performs the setup
//! steps that follow: UID/GID maps from the parent side and the hostname
//! from inside the child.

pub mod user;
pub mod uts;

#[cfg(target_os = "linux")]
use nix::sched::CloneFlags;

/// Configuration for which namespaces a container gets.
#[allow(clippy::struct_excessive_bools)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NamespaceConfig {
    /// Isolate PID namespace; the entry process becomes PID 1.
    pub pid: bool,
    /// Isolate mount namespace.
    pub mount: bool,
    /// Isolate UTS (hostname) namespace.
    pub uts: bool,
    /// Isolate IPC namespace.
    pub ipc: bool,
    /// Isolate network namespace (no interfaces are configured).
    pub network: bool,
    /// Isolate user namespace, mapping root inside to the caller outside.
    pub user: bool,
}

impl Default for NamespaceConfig {
    fn default() -> Self {
        Self {
            pid: true,
            mount: true,
            uts: true,
            ipc: true,
            network: false,
            user: false,
        }
    }
}

impl NamespaceConfig {
    /// Default namespaces, plus a user namespace when the caller is not root.
    #[must_use]
    pub fn for_current_user() -> Self {
        Self {
            user: !nix::unistd::geteuid().is_root(),
            ..Self::default()
        }
    }

    /// Translates the configuration into `clone(2)` flags.
    #[cfg(target_os = "linux")]
    #[must_use]
    pub fn clone_flags(&self) -> CloneFlags {
        let mut flags = CloneFlags::empty();
        for (enabled, flag) in [
            (self.pid, CloneFlags::CLONE_NEWPID),
            (self.mount, CloneFlags::CLONE_NEWNS),
            (self.uts, CloneFlags::CLONE_NEWUTS),
            (self.ipc, CloneFlags::CLONE_NEWIPC),
            (self.network, CloneFlags::CLONE_NEWNET),
            (self.user, CloneFlags::CLONE_NEWUSER),
        ] {
            if enabled {
                flags.insert(flag);
            }
        }
        flags
    }
}

#[cfg(all(test, target_os = "linux"))]
mod tests {
    use super::*;

    #[test]
    fn default_isolates_pid_mount_uts_ipc() {
        let flags = NamespaceConfig::default().clone_flags();
        assert!(flags.contains(CloneFlags::CLONE_NEWPID));
        assert!(flags.contains(CloneFlags::CLONE_NEWNS));
        assert!(flags.contains(CloneFlags::CLONE_NEWUTS));
        assert!(flags.contains(CloneFlags::CLONE_NEWIPC));
        assert!(!flags.contains(CloneFlags::CLONE_NEWNET));
        assert!(!flags.contains(CloneFlags::CLONE_NEWUSER));
    }

    #[test]
    fn user_namespace_follows_effective_uid() {
        let config = NamespaceConfig::for_current_user();
        assert_eq!(config.user, !nix::unistd::geteuid().is_root());
        assert_eq!(
            config.clone_flags().contains(CloneFlags::CLONE_NEWUSER),
            config.user
        );
    }
}
