//! # minirun-core
//!
//! Low-level Linux isolation primitives for the minirun runtime.
//!
//! This crate provides safe abstractions over:
//! - **Namespaces**: clone flags for PID, mount, UTS, IPC (and user when
//!   rootless) isolation, UID/GID maps, and the container hostname.
//! - **Filesystem**: private mount propagation, bind mounts, `/proc`, and
//!   `pivot_root` into the container's root filesystem.
//! - **Cgroups v2**: memory and CPU bandwidth limits.
//!
//! Functions that must run inside a freshly cloned child avoid logging and
//! return plain errors; the caller decides how to report them.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod cgroup;
pub mod filesystem;
pub mod namespace;
