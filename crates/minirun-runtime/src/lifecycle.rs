//! Lifecycle state machine.
//!
//! ```text
//! Created --launched--> Running --exit 0--------> Exited
//! Created --launch failed--> Failed <--nonzero/signal-- Running
//! Created | Exited | Failed --delete--> (removed)
//! ```
//!
//! There is no restart: `Exited` and `Failed` only accept `delete`.

use chrono::Utc;
use minirun_common::error::{MinirunError, Result};
use minirun_common::types::ContainerState;

use crate::state::ContainerRecord;

/// An event applied to a container record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// The entry process was launched.
    Launched {
        /// PID of the entry process.
        pid: u32,
        /// Kernel start time of the entry process.
        start_time: u64,
    },
    /// The launcher failed before the command ran.
    LaunchFailed {
        /// Exit code describing the failure (125, 126, or 127).
        exit_code: i32,
    },
    /// The entry process terminated.
    ProcessExited {
        /// Exit code, or 128 + signal number.
        exit_code: i32,
    },
    /// The record is being removed.
    Delete,
}

impl LifecycleEvent {
    /// Verb used in error messages.
    #[must_use]
    pub const fn verb(&self) -> &'static str {
        match self {
            Self::Launched { .. } | Self::LaunchFailed { .. } => "start",
            Self::ProcessExited { .. } => "finish",
            Self::Delete => "delete",
        }
    }
}

/// Result of a legal transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The record moves to this state.
    Enter(ContainerState),
    /// The record is removed from the registry.
    Remove,
}

/// Returns the outcome of `event` in state `from`, or `None` if illegal.
#[must_use]
pub const fn next(from: ContainerState, event: &LifecycleEvent) -> Option<Outcome> {
    use ContainerState::{Created, Exited, Failed, Running};
    match (from, event) {
        (Created, LifecycleEvent::Launched { .. }) => Some(Outcome::Enter(Running)),
        (Created, LifecycleEvent::LaunchFailed { .. }) => Some(Outcome::Enter(Failed)),
        (Running, LifecycleEvent::ProcessExited { exit_code: 0 }) => Some(Outcome::Enter(Exited)),
        (Running, LifecycleEvent::ProcessExited { .. }) => Some(Outcome::Enter(Failed)),
        (Created | Exited | Failed, LifecycleEvent::Delete) => Some(Outcome::Remove),
        _ => None,
    }
}

/// Checks that `event` is legal for `record` without changing it.
///
/// # Errors
///
/// Returns [`MinirunError::IllegalTransition`] if the event is not allowed
/// in the record's current state.
pub fn check(record: &ContainerRecord, event: &LifecycleEvent) -> Result<Outcome> {
    next(record.state, event).ok_or_else(|| MinirunError::IllegalTransition {
        name: record.name().to_string(),
        state: record.state,
        event: event.verb(),
    })
}

/// Applies `event` to `record`, updating state and lifecycle fields.
///
/// On error the record is left untouched.
///
/// # Errors
///
/// Returns [`MinirunError::IllegalTransition`] if the event is not allowed.
pub fn apply(record: &mut ContainerRecord, event: LifecycleEvent) -> Result<Outcome> {
    let outcome = check(record, &event)?;
    if let Outcome::Enter(state) = outcome {
        record.state = state;
    }
    let now = Utc::now();
    match event {
        LifecycleEvent::Launched { pid, start_time } => {
            record.pid = Some(pid);
            record.pid_start_time = Some(start_time);
            record.started_at = Some(now);
        }
        LifecycleEvent::LaunchFailed { exit_code } | LifecycleEvent::ProcessExited { exit_code } => {
            record.pid = None;
            record.pid_start_time = None;
            record.exit_code = Some(exit_code);
            record.finished_at = Some(now);
        }
        LifecycleEvent::Delete => {}
    }
    tracing::debug!(name = %record.name(), ?event, ?outcome, "lifecycle transition");
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use minirun_common::types::{ContainerName, ResourceLimits};

    use super::*;
    use crate::spec::ContainerSpec;

    const LAUNCHED: LifecycleEvent = LifecycleEvent::Launched {
        pid: 4242,
        start_time: 99,
    };

    fn record() -> ContainerRecord {
        ContainerRecord::new(ContainerSpec {
            name: ContainerName::parse("sm").expect("name"),
            rootfs: PathBuf::from("/srv/rootfs"),
            command: vec!["/bin/true".into()],
            limits: ResourceLimits::default(),
        })
    }

    fn in_state(state: ContainerState) -> ContainerRecord {
        let mut rec = record();
        match state {
            ContainerState::Created => {}
            ContainerState::Running => {
                apply(&mut rec, LAUNCHED).expect("launch");
            }
            ContainerState::Exited => {
                apply(&mut rec, LAUNCHED).expect("launch");
                apply(&mut rec, LifecycleEvent::ProcessExited { exit_code: 0 }).expect("exit");
            }
            ContainerState::Failed => {
                apply(&mut rec, LifecycleEvent::LaunchFailed { exit_code: 125 }).expect("fail");
            }
        }
        rec
    }

    #[test]
    fn launch_sets_pid_and_start_time() {
        let rec = in_state(ContainerState::Running);
        assert_eq!(rec.state, ContainerState::Running);
        assert_eq!(rec.pid, Some(4242));
        assert_eq!(rec.pid_start_time, Some(99));
        assert!(rec.started_at.is_some());
        assert!(rec.exit_code.is_none());
    }

    #[test]
    fn zero_exit_is_exited() {
        let rec = in_state(ContainerState::Exited);
        assert_eq!(rec.state, ContainerState::Exited);
        assert_eq!(rec.exit_code, Some(0));
        assert!(rec.pid.is_none());
        assert!(rec.finished_at.is_some());
    }

    #[test]
    fn nonzero_exit_is_failed() {
        let mut rec = in_state(ContainerState::Running);
        let outcome = apply(&mut rec, LifecycleEvent::ProcessExited { exit_code: 137 })
            .expect("exit");
        assert_eq!(outcome, Outcome::Enter(ContainerState::Failed));
        assert_eq!(rec.exit_code, Some(137));
        assert!(rec.pid_start_time.is_none());
    }

    #[test]
    fn launch_failure_goes_straight_to_failed() {
        let rec = in_state(ContainerState::Failed);
        assert_eq!(rec.exit_code, Some(125));
        assert!(rec.started_at.is_none());
    }

    #[test]
    fn restart_is_rejected() {
        for state in [ContainerState::Running, ContainerState::Exited, ContainerState::Failed] {
            let mut rec = in_state(state);
            let before = rec.clone();
            let err = apply(&mut rec, LAUNCHED).expect_err("restart");
            assert!(matches!(err, MinirunError::IllegalTransition { event: "start", .. }));
            assert_eq!(rec, before);
        }
    }

    #[test]
    fn delete_only_when_not_running() {
        for state in [ContainerState::Created, ContainerState::Exited, ContainerState::Failed] {
            assert_eq!(
                check(&in_state(state), &LifecycleEvent::Delete).expect("delete"),
                Outcome::Remove
            );
        }
        let err = check(&in_state(ContainerState::Running), &LifecycleEvent::Delete)
            .expect_err("running");
        assert_eq!(err.to_string(), "cannot delete container sm in state running");
    }

    #[test]
    fn exit_requires_running() {
        for state in [ContainerState::Created, ContainerState::Exited, ContainerState::Failed] {
            assert!(next(state, &LifecycleEvent::ProcessExited { exit_code: 0 }).is_none());
        }
    }
}
