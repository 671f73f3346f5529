//! Container lifecycle management for the minirun runtime.
//!
//! Every CLI invocation is a separate, short-lived process. State lives in
//! the on-disk [`registry`], one JSON record per container, guarded by
//! per-name file locks. `start` hands the container to a detached
//! [`supervisor`] process that owns the `waitpid` and writes the exit back
//! to the registry.

#![allow(unsafe_code)]
#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod engine;
pub mod launcher;
pub mod lifecycle;
pub mod lock;
pub mod logs;
pub mod process;
pub mod registry;
pub mod spec;
pub mod state;
pub mod supervisor;
