//! Domain primitive types used across the minirun workspace.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::constants::MAX_NAME_LENGTH;
use crate::error::{MinirunError, Result};

/// Validated container name.
///
/// Names double as registry keys and file names, so they are restricted to
/// `[A-Za-z0-9][A-Za-z0-9_.-]*` and at most [`MAX_NAME_LENGTH`] bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContainerName(String);

impl ContainerName {
    /// Parses and validates a container name.
    ///
    /// # Errors
    ///
    /// Returns [`MinirunError::InvalidSpec`] if the name is empty, too long,
    /// or contains characters outside the allowed set.
    pub fn parse(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        let invalid = |reason: &str| MinirunError::InvalidSpec {
            message: format!("invalid container name {name:?}: {reason}"),
        };

        let Some(first) = name.chars().next() else {
            return Err(invalid("name is empty"));
        };
        if name.len() > MAX_NAME_LENGTH {
            return Err(invalid(&format!("longer than {MAX_NAME_LENGTH} bytes")));
        }
        if !first.is_ascii_alphanumeric() {
            return Err(invalid("must start with a letter or digit"));
        }
        if let Some(bad) = name
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')))
        {
            return Err(invalid(&format!("character {bad:?} is not allowed")));
        }
        Ok(Self(name))
    }

    /// Returns the inner string representation.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContainerName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&self.0)
    }
}

impl FromStr for ContainerName {
    type Err = MinirunError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ContainerName {
    type Error = MinirunError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(value)
    }
}

impl From<ContainerName> for String {
    fn from(name: ContainerName) -> Self {
        name.0
    }
}

/// Resource limits for a container.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceLimits {
    /// Memory limit in bytes (`memory.max`).
    pub memory_bytes: Option<u64>,
    /// CPU bandwidth as a percentage of one core (`cpu.max`).
    pub cpu_percent: Option<u32>,
}

impl ResourceLimits {
    /// Returns `true` if no limit is set.
    #[must_use]
    pub const fn is_unlimited(&self) -> bool {
        self.memory_bytes.is_none() && self.cpu_percent.is_none()
    }
}

/// Lifecycle state of a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerState {
    /// Container has been created but not yet started.
    Created,
    /// The container's entry process is alive.
    Running,
    /// The entry process exited with status 0.
    Exited,
    /// The launch failed, or the entry process exited nonzero or was signaled.
    Failed,
}

impl ContainerState {
    /// Returns `true` for the terminal states that carry an exit code.
    #[must_use]
    pub const fn is_finished(self) -> bool {
        matches!(self, Self::Exited | Self::Failed)
    }
}

impl fmt::Display for ContainerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            Self::Created => "created",
            Self::Running => "running",
            Self::Exited => "exited",
            Self::Failed => "failed",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_typical_names() {
        for name in ["a", "web-1", "test-create-123", "db_primary", "v1.2"] {
            assert!(ContainerName::parse(name).is_ok(), "{name} should be valid");
        }
    }

    #[test]
    fn rejects_path_like_names() {
        for name in ["", ".", "..", "../etc", "a/b", "-leading", ".hidden", "sp ace"] {
            assert!(ContainerName::parse(name).is_err(), "{name:?} should be rejected");
        }
    }

    #[test]
    fn rejects_overlong_names() {
        let name = "x".repeat(MAX_NAME_LENGTH + 1);
        assert!(ContainerName::parse(name).is_err());
        assert!(ContainerName::parse("y".repeat(MAX_NAME_LENGTH)).is_ok());
    }

    #[test]
    fn name_deserialization_validates() {
        let ok: ContainerName = serde_json::from_str("\"app\"").expect("valid");
        assert_eq!(ok.as_str(), "app");
        assert!(serde_json::from_str::<ContainerName>("\"a/b\"").is_err());
    }

    #[test]
    fn state_serializes_lowercase() {
        let json = serde_json::to_string(&ContainerState::Exited).expect("serialize");
        assert_eq!(json, "\"exited\"");
        assert_eq!(ContainerState::Failed.to_string(), "failed");
    }

    #[test]
    fn display_honours_width() {
        let name = ContainerName::parse("ok").expect("name");
        assert_eq!(format!("{name:<5}|"), "ok   |");
        assert_eq!(format!("{:<8}|", ContainerState::Exited), "exited  |");
    }

    #[test]
    fn finished_states() {
        assert!(!ContainerState::Created.is_finished());
        assert!(!ContainerState::Running.is_finished());
        assert!(ContainerState::Exited.is_finished());
        assert!(ContainerState::Failed.is_finished());
    }
}
