//! Filesystem management for container isolation.
//!
//! Provides mount utilities and `pivot_root` for switching the container
//! into its root filesystem. Everything here runs inside the cloned child,
//! after it has entered its own mount namespace.

pub mod mount;
pub mod pivot_root;
