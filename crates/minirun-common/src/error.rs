//! Unified error types for the minirun workspace.
//!
//! Every command-level failure maps onto one of these variants. The CLI
//! reports them verbatim and exits nonzero.

use std::path::PathBuf;

use thiserror::Error;

use crate::types::ContainerState;

/// Top-level error type shared across the workspace.
#[derive(Debug, Error)]
pub enum MinirunError {
    /// An I/O operation failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path where the I/O error occurred.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A configuration value is invalid.
    #[error("invalid configuration: {message}")]
    Config {
        /// Description of the invalid configuration.
        message: String,
    },

    /// A proposed container specification was rejected.
    #[error("invalid container spec: {message}")]
    InvalidSpec {
        /// Which field was rejected and why.
        message: String,
    },

    /// A container with this name is already registered.
    #[error("container already exists: {name}")]
    AlreadyExists {
        /// Name that collided.
        name: String,
    },

    /// No container with this name is registered.
    #[error("container not found: {name}")]
    NotFound {
        /// Name that was looked up.
        name: String,
    },

    /// The requested lifecycle event is not legal in the current state.
    #[error("cannot {event} container {name} in state {state}")]
    IllegalTransition {
        /// Container the event was applied to.
        name: String,
        /// State the container was in.
        state: ContainerState,
        /// Event that was rejected.
        event: &'static str,
    },

    /// Building the isolated environment or executing the command failed.
    #[error("failed to launch container {name}: {message}")]
    LaunchFailure {
        /// Container that failed to launch.
        name: String,
        /// Underlying cause.
        message: String,
    },

    /// A running container did not terminate after SIGTERM and SIGKILL.
    #[error("container {name} did not stop within {seconds}s")]
    StopTimeout {
        /// Container that kept running.
        name: String,
        /// Total time waited.
        seconds: u64,
    },

    /// A permission or kernel-level operation was denied.
    #[error("permission denied: {message}")]
    PermissionDenied {
        /// Description of the denied operation.
        message: String,
    },

    /// Serialization or deserialization failed.
    #[error("serialization error: {source}")]
    Serialization {
        /// Underlying serialization error.
        #[from]
        source: serde_json::Error,
    },
}

impl MinirunError {
    /// Wraps an I/O error together with the path it occurred at.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, MinirunError>;
