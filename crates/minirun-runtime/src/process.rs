//! Process identity and liveness.
//!
//! A PID alone is not an identity: after the process exits the kernel may
//! hand the number to an unrelated process. A [`ProcessHandle`] pairs the
//! PID with its start time from `/proc/<pid>/stat`, and every liveness
//! check compares both.

use std::path::PathBuf;

use minirun_common::error::{MinirunError, Result};
use nix::sys::signal::Signal;
use nix::sys::wait::WaitStatus;

/// A process identified by PID and kernel start time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessHandle {
    /// Process ID in the host PID namespace.
    pub pid: u32,
    /// Start time in clock ticks since boot.
    pub start_time: u64,
}

/// The fields of `/proc/<pid>/stat` that matter here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcStat {
    /// One-letter scheduler state (`R`, `S`, `Z`, ...).
    pub state: char,
    /// Start time in clock ticks since boot.
    pub start_time: u64,
}

impl ProcStat {
    /// Zombies and dead tasks have exited even though `/proc` still lists them.
    #[must_use]
    pub const fn has_exited(&self) -> bool {
        matches!(self.state, 'Z' | 'X' | 'x')
    }
}

impl ProcessHandle {
    /// Captures the identity of a currently existing process.
    ///
    /// # Errors
    ///
    /// Returns an error if `/proc/<pid>/stat` cannot be read or parsed.
    pub fn from_pid(pid: u32) -> Result<Self> {
        let path = stat_path(pid);
        let content = std::fs::read_to_string(&path).map_err(|e| MinirunError::io(&path, e))?;
        let stat = parse_stat(&content).ok_or_else(|| {
            MinirunError::io(
                &path,
                std::io::Error::new(std::io::ErrorKind::InvalidData, "unparsable stat line"),
            )
        })?;
        Ok(Self {
            pid,
            start_time: stat.start_time,
        })
    }

    /// Returns `true` if this exact process is still running.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        read_stat(self.pid)
            .is_some_and(|stat| stat.start_time == self.start_time && !stat.has_exited())
    }

    /// Sends `signal` to the process if it is still the same process.
    ///
    /// Returns `Ok(false)` without signalling when the process is gone.
    ///
    /// # Errors
    ///
    /// Returns an error if `kill(2)` fails for a reason other than the
    /// process having exited.
    pub fn signal(&self, signal: Signal) -> Result<bool> {
        if !self.is_alive() {
            return Ok(false);
        }
        let pid = nix::unistd::Pid::from_raw(i32::try_from(self.pid).unwrap_or(i32::MAX));
        match nix::sys::signal::kill(pid, signal) {
            Ok(()) => {
                tracing::debug!(pid = self.pid, ?signal, "signal sent");
                Ok(true)
            }
            Err(nix::errno::Errno::ESRCH) => Ok(false),
            Err(nix::errno::Errno::EPERM) => Err(MinirunError::PermissionDenied {
                message: format!("cannot send {signal} to pid {}", self.pid),
            }),
            Err(e) => Err(MinirunError::io(
                stat_path(self.pid),
                std::io::Error::from_raw_os_error(e as i32),
            )),
        }
    }
}

fn stat_path(pid: u32) -> PathBuf {
    PathBuf::from(format!("/proc/{pid}/stat"))
}

/// Reads `/proc/<pid>/stat`, returning `None` if the process does not exist.
#[must_use]
pub fn read_stat(pid: u32) -> Option<ProcStat> {
    std::fs::read_to_string(stat_path(pid))
        .ok()
        .and_then(|content| parse_stat(&content))
}

/// Parses a `/proc/<pid>/stat` line.
///
/// The command name in field 2 may itself contain spaces and parentheses,
/// so fields are counted from the last `)`.
#[must_use]
pub fn parse_stat(content: &str) -> Option<ProcStat> {
    let rest = &content[content.rfind(')')? + 1..];
    let mut fields = rest.split_whitespace();
    let state = fields.next()?.chars().next()?;
    // starttime is field 22 overall; state was field 3.
    let start_time = fields.nth(18)?.parse().ok()?;
    Some(ProcStat { state, start_time })
}

/// Maps a wait status to the exit code recorded for the container.
///
/// Normal exits keep their code; signal deaths become `128 + signal`.
#[must_use]
pub fn exit_code(status: WaitStatus) -> Option<i32> {
    match status {
        WaitStatus::Exited(_, code) => Some(code),
        WaitStatus::Signaled(_, signal, _) => Some(128 + signal as i32),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use nix::unistd::Pid;

    use super::*;

    const SAMPLE: &str = "4242 (my (odd) proc) S 1 4242 4242 0 -1 4194560 120 0 0 0 \
                          1 2 0 0 20 0 1 0 987654 2215936 300 18446744073709551615";

    #[test]
    fn parses_start_time_after_tricky_comm() {
        let stat = parse_stat(SAMPLE).expect("parse");
        assert_eq!(stat.state, 'S');
        assert_eq!(stat.start_time, 987_654);
        assert!(!stat.has_exited());
    }

    #[test]
    fn zombie_counts_as_exited() {
        let zombie = SAMPLE.replace(") S ", ") Z ");
        assert!(parse_stat(&zombie).expect("parse").has_exited());
    }

    #[test]
    fn truncated_stat_is_rejected() {
        assert!(parse_stat("12 (sh) S 1 2 3").is_none());
        assert!(parse_stat("garbage").is_none());
    }

    #[test]
    fn current_process_is_alive() {
        let me = ProcessHandle::from_pid(std::process::id()).expect("self");
        assert!(me.is_alive());
    }

    #[test]
    fn mismatched_start_time_is_not_alive() {
        let me = ProcessHandle::from_pid(std::process::id()).expect("self");
        let impostor = ProcessHandle {
            start_time: me.start_time + 1,
            ..me
        };
        assert!(!impostor.is_alive());
        assert!(!impostor.signal(Signal::SIGTERM).expect("signal"));
    }

    #[test]
    fn wait_status_mapping() {
        let pid = Pid::from_raw(1);
        assert_eq!(exit_code(WaitStatus::Exited(pid, 0)), Some(0));
        assert_eq!(exit_code(WaitStatus::Exited(pid, 3)), Some(3));
        assert_eq!(
            exit_code(WaitStatus::Signaled(pid, Signal::SIGKILL, false)),
            Some(137)
        );
        assert_eq!(exit_code(WaitStatus::StillAlive), None);
    }
}
