//! Isolation launcher.
//!
//! Starts a container's entry process with `clone(2)` in fresh PID, mount,
//! UTS, and IPC namespaces (plus a user namespace when rootless), inside
//! its cgroup, with the rootfs pivoted to `/`.
//!
//! Parent and child synchronize over two pipes:
//!
//! - the *go* pipe: the child blocks on it until the parent has written the
//!   id maps and moved the child into its cgroup;
//! - the *error* pipe: close-on-exec, so a successful `exec` closes it
//!   silently. On failure the child writes the stage and errno before it
//!   exits.
//!
//! Any failure after `clone` kills and reaps the child, which tears down
//! its namespaces and mounts, and removes the cgroup.

use std::convert::Infallible;
use std::ffi::CString;
use std::fs::File;
use std::io::{Read, Write};
use std::os::fd::{AsRawFd, RawFd};
use std::path::{Path, PathBuf};
use std::time::Duration;

use minirun_common::constants::{
    APP_NAME, EXIT_COMMAND_NOT_EXECUTABLE, EXIT_COMMAND_NOT_FOUND, EXIT_LAUNCH_FAILED,
    EXIT_STATUS_LOST,
};
use minirun_core::cgroup::CgroupManager;
use minirun_core::filesystem::{mount, pivot_root};
use minirun_core::namespace::{NamespaceConfig, user, uts};
use nix::errno::Errno;
use nix::fcntl::OFlag;
use nix::sys::signal::{Signal, kill};
use nix::sys::wait::{WaitStatus, waitpid};
use nix::unistd::Pid;

use crate::process::{self, ProcessHandle};
use crate::spec::ContainerSpec;

const STACK_SIZE: usize = 1024 * 1024;

const CONTAINER_PATH: &str = "PATH=/usr/local/sbin:/usr/local/bin:/usr/sbin:/usr/bin:/sbin:/bin";

/// Step of the launch that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum Stage {
    /// Checking the rootfs and preparing arguments.
    Prepare = 0,
    /// Creating the pipes or calling `clone(2)`.
    Clone = 1,
    /// Writing UID/GID maps.
    IdMap = 2,
    /// Parent/child handshake.
    Sync = 3,
    /// Setting the hostname.
    Hostname = 4,
    /// Redirecting stdin, stdout, and stderr.
    Stdio = 5,
    /// Making mount propagation private.
    MountPrivate = 6,
    /// Switching to the container's root filesystem.
    PivotRoot = 7,
    /// Executing the command.
    Exec = 8,
}

impl Stage {
    const fn from_code(code: u32) -> Self {
        match code {
            0 => Self::Prepare,
            1 => Self::Clone,
            2 => Self::IdMap,
            4 => Self::Hostname,
            5 => Self::Stdio,
            6 => Self::MountPrivate,
            7 => Self::PivotRoot,
            8 => Self::Exec,
            _ => Self::Sync,
        }
    }

    const fn describe(self) -> &'static str {
        match self {
            Self::Prepare => "preparing launch",
            Self::Clone => "creating namespaces",
            Self::IdMap => "writing id maps",
            Self::Sync => "synchronizing with the container",
            Self::Hostname => "setting hostname",
            Self::Stdio => "redirecting stdio",
            Self::MountPrivate => "making mounts private",
            Self::PivotRoot => "switching root filesystem",
            Self::Exec => "executing command",
        }
    }
}

/// Why a launch failed.
#[derive(Debug, thiserror::Error)]
#[error("{} failed: {source}", .stage.describe())]
pub struct LaunchError {
    /// Step that failed.
    pub stage: Stage,
    /// Underlying OS error.
    pub source: std::io::Error,
}

impl LaunchError {
    fn new(stage: Stage, source: std::io::Error) -> Self {
        Self { stage, source }
    }

    fn errno(stage: Stage, errno: Errno) -> Self {
        Self::new(stage, std::io::Error::from_raw_os_error(errno as i32))
    }

    /// Exit code recorded for this failure.
    ///
    /// `exec` failures follow shell conventions: 127 when the command does
    /// not exist, 126 when it cannot be executed. Everything else is 125.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        if self.stage != Stage::Exec {
            return EXIT_LAUNCH_FAILED;
        }
        match self.source.raw_os_error() {
            Some(libc::ENOENT | libc::ENOTDIR) => EXIT_COMMAND_NOT_FOUND,
            Some(libc::EACCES | libc::EPERM | libc::ENOEXEC) => EXIT_COMMAND_NOT_EXECUTABLE,
            _ => EXIT_LAUNCH_FAILED,
        }
    }
}

/// Launches containers with a fixed namespace configuration.
#[derive(Debug, Clone, Copy)]
pub struct Launcher {
    namespaces: NamespaceConfig,
}

impl Default for Launcher {
    fn default() -> Self {
        Self::new(NamespaceConfig::for_current_user())
    }
}

/// Everything the child needs, prepared before `clone` so the child only
/// performs system calls.
struct ChildPlan {
    hostname: Option<String>,
    private_mounts: bool,
    rootfs: PathBuf,
    program: CString,
    argv: Vec<CString>,
    envp: Vec<CString>,
    stdin: RawFd,
    log: RawFd,
    go_read: RawFd,
    go_write: RawFd,
    err_read: RawFd,
    err_write: RawFd,
}

impl Launcher {
    /// Creates a launcher for the given namespaces.
    #[must_use]
    pub const fn new(namespaces: NamespaceConfig) -> Self {
        Self { namespaces }
    }

    /// Launches `spec` as a child of the calling process.
    ///
    /// The container's stdout and stderr are appended to `log`.
    ///
    /// # Errors
    ///
    /// Returns a [`LaunchError`] naming the failed stage. Nothing is left
    /// running when this returns an error.
    pub fn launch(&self, spec: &ContainerSpec, log: &File) -> Result<Launched, LaunchError> {
        if !spec.rootfs.is_dir() {
            return Err(LaunchError::new(
                Stage::Prepare,
                std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("rootfs {} does not exist", spec.rootfs.display()),
                ),
            ));
        }
        let argv = to_cstrings(&spec.command)?;
        let program = argv.first().cloned().ok_or_else(|| {
            LaunchError::new(
                Stage::Prepare,
                std::io::Error::new(std::io::ErrorKind::InvalidInput, "empty command"),
            )
        })?;
        let hostname = uts::hostname_for(spec.name.as_str()).to_owned();
        let envp = to_cstrings(&[
            CONTAINER_PATH.to_owned(),
            "HOME=/root".to_owned(),
            format!("HOSTNAME={hostname}"),
            format!("container={APP_NAME}"),
        ])?;
        let dev_null = File::open("/dev/null").map_err(|e| LaunchError::new(Stage::Prepare, e))?;

        let mut guard = ChildGuard {
            pid: None,
            cgroup: setup_cgroup(spec),
        };

        let (go_read, go_write) =
            nix::unistd::pipe2(OFlag::O_CLOEXEC).map_err(|e| LaunchError::errno(Stage::Clone, e))?;
        let (err_read, err_write) =
            nix::unistd::pipe2(OFlag::O_CLOEXEC).map_err(|e| LaunchError::errno(Stage::Clone, e))?;

        let plan = ChildPlan {
            hostname: self.namespaces.uts.then_some(hostname),
            private_mounts: self.namespaces.mount,
            rootfs: spec.rootfs.clone(),
            program,
            argv,
            envp,
            stdin: dev_null.as_raw_fd(),
            log: log.as_raw_fd(),
            go_read: go_read.as_raw_fd(),
            go_write: go_write.as_raw_fd(),
            err_read: err_read.as_raw_fd(),
            err_write: err_write.as_raw_fd(),
        };

        let mut stack = vec![0u8; STACK_SIZE];
        // SAFETY: without CLONE_VM the child runs on `stack` in a copy of
        // this address space. The callback only reads `plan`, which was
        // fully built before the call, and ends in exec or exit. Callers
        // launch from a single-threaded supervisor, so no lock can be held
        // by another thread at the time of the copy.
        let pid = unsafe {
            nix::sched::clone(
                Box::new(|| child_main(&plan)),
                &mut stack,
                self.namespaces.clone_flags(),
                Some(libc::SIGCHLD),
            )
        }
        .map_err(|e| LaunchError::errno(Stage::Clone, e))?;
        guard.pid = Some(pid);
        tracing::debug!(pid = pid.as_raw(), name = %spec.name, "container process cloned");

        drop(go_read);
        drop(err_write);

        if self.namespaces.user {
            user::write_id_maps(pid, nix::unistd::geteuid(), nix::unistd::getegid())
                .map_err(|e| LaunchError::new(Stage::IdMap, std::io::Error::other(e)))?;
        }
        guard.join_cgroup(pid);

        File::from(go_write)
            .write_all(&[1])
            .map_err(|e| LaunchError::new(Stage::Sync, e))?;

        let mut report = Vec::new();
        let _ = File::from(err_read)
            .read_to_end(&mut report)
            .map_err(|e| LaunchError::new(Stage::Sync, e))?;
        if let Some(err) = decode_failure(&report) {
            return Err(err);
        }

        let raw_pid = u32::try_from(pid.as_raw()).unwrap_or_default();
        let process = ProcessHandle::from_pid(raw_pid)
            .map_err(|e| LaunchError::new(Stage::Sync, std::io::Error::other(e)))?;
        tracing::info!(pid = raw_pid, name = %spec.name, "container launched");
        Ok(Launched { guard, process })
    }
}

fn to_cstrings(args: &[String]) -> Result<Vec<CString>, LaunchError> {
    args.iter()
        .map(|arg| {
            CString::new(arg.as_bytes()).map_err(|e| {
                LaunchError::new(
                    Stage::Prepare,
                    std::io::Error::new(std::io::ErrorKind::InvalidInput, e),
                )
            })
        })
        .collect()
}

/// Creates the container's cgroup and applies its limits.
///
/// Cgroups are best effort: when v2 is unavailable or not writable (for
/// example rootless), the container runs unconstrained and a warning is
/// logged.
fn setup_cgroup(spec: &ContainerSpec) -> Option<CgroupManager> {
    if spec.limits.is_unlimited() {
        return None;
    }
    if !CgroupManager::is_available() {
        tracing::warn!(name = %spec.name, "cgroups v2 not available, running without resource limits");
        return None;
    }
    let cgroup = match CgroupManager::create(spec.name.as_str()) {
        Ok(cgroup) => cgroup,
        Err(e) => {
            tracing::warn!(name = %spec.name, error = %e, "cannot create cgroup, running without resource limits");
            return None;
        }
    };
    if let Err(e) = cgroup.apply_limits(&spec.limits) {
        tracing::warn!(name = %spec.name, error = %e, "cannot apply resource limits");
        release_cgroup(&cgroup);
        return None;
    }
    Some(cgroup)
}

/// Removes a cgroup, retrying briefly while the kernel finishes moving
/// exited tasks out of it.
pub(crate) fn release_cgroup(cgroup: &CgroupManager) {
    for attempt in 0..10 {
        match cgroup.destroy() {
            Ok(()) => return,
            Err(e) if attempt == 9 => {
                tracing::warn!(path = %cgroup.path().display(), error = %e, "cannot remove cgroup");
            }
            Err(_) => std::thread::sleep(Duration::from_millis(50)),
        }
    }
}

fn decode_failure(report: &[u8]) -> Option<LaunchError> {
    let stage = u32::from_le_bytes(report.get(0..4)?.try_into().ok()?);
    let errno = i32::from_le_bytes(report.get(4..8)?.try_into().ok()?);
    Some(LaunchError::new(
        Stage::from_code(stage),
        std::io::Error::from_raw_os_error(errno),
    ))
}

fn encode_failure(stage: Stage, errno: Errno) -> [u8; 8] {
    let mut buf = [0u8; 8];
    buf[..4].copy_from_slice(&(stage as u32).to_le_bytes());
    buf[4..].copy_from_slice(&(errno as i32).to_le_bytes());
    buf
}

/// Entry point of the cloned child. Only returns if setup or exec failed.
fn child_main(plan: &ChildPlan) -> isize {
    // SAFETY: these are the child's copies of the parent's pipe ends;
    // closing them does not affect the parent.
    unsafe {
        let _ = libc::close(plan.go_write);
        let _ = libc::close(plan.err_read);
    }
    let Err((stage, errno)) = child_setup(plan);
    let buf = encode_failure(stage, errno);
    // SAFETY: writes a local buffer to a pipe this process owns.
    let _ = unsafe { libc::write(plan.err_write, buf.as_ptr().cast(), buf.len()) };
    1
}

fn child_setup(plan: &ChildPlan) -> Result<Infallible, (Stage, Errno)> {
    wait_for_go(plan.go_read).map_err(|e| (Stage::Sync, e))?;
    if let Some(hostname) = &plan.hostname {
        uts::set_hostname(hostname).map_err(|e| (Stage::Hostname, e))?;
    }
    redirect_stdio(plan).map_err(|e| (Stage::Stdio, e))?;
    if plan.private_mounts {
        mount::make_private().map_err(|e| (Stage::MountPrivate, e))?;
    }
    pivot_root::enter_rootfs(&plan.rootfs).map_err(|e| (Stage::PivotRoot, e))?;

    // SAFETY: restoring the default disposition installs no handler.
    let _ = unsafe { libc::signal(libc::SIGPIPE, libc::SIG_DFL) };

    let proc_dir = Path::new("/proc");
    if proc_dir.is_dir() {
        if let Err(e) = mount::mount_proc(proc_dir) {
            let _ = writeln!(std::io::stderr(), "minirun: warning: cannot mount /proc: {e}");
        }
    }
    nix::unistd::execvpe(&plan.program, &plan.argv, &plan.envp).map_err(|e| (Stage::Exec, e))
}

fn wait_for_go(fd: RawFd) -> Result<(), Errno> {
    let mut byte = 0u8;
    loop {
        // SAFETY: reads at most one byte into a local.
        let n = unsafe { libc::read(fd, (&raw mut byte).cast(), 1) };
        match n {
            1 => return Ok(()),
            0 => return Err(Errno::EPIPE),
            _ => match Errno::last() {
                Errno::EINTR => {}
                errno => return Err(errno),
            },
        }
    }
}

fn redirect_stdio(plan: &ChildPlan) -> Result<(), Errno> {
    for (from, to) in [
        (plan.stdin, libc::STDIN_FILENO),
        (plan.log, libc::STDOUT_FILENO),
        (plan.log, libc::STDERR_FILENO),
    ] {
        // SAFETY: both descriptors are open in this process; dup2 does not
        // touch memory.
        let _ = Errno::result(unsafe { libc::dup2(from, to) })?;
    }
    Ok(())
}

/// Kills and reaps the child and removes the cgroup unless disarmed.
struct ChildGuard {
    pid: Option<Pid>,
    cgroup: Option<CgroupManager>,
}

impl ChildGuard {
    fn join_cgroup(&mut self, pid: Pid) {
        let Some(cgroup) = &self.cgroup else {
            return;
        };
        let raw = u32::try_from(pid.as_raw()).unwrap_or_default();
        if let Err(e) = cgroup.add_process(raw) {
            tracing::warn!(pid = raw, error = %e, "cannot join cgroup, running without resource limits");
            release_cgroup(cgroup);
            self.cgroup = None;
        }
    }
}

impl Drop for ChildGuard {
    fn drop(&mut self) {
        if let Some(pid) = self.pid.take() {
            tracing::debug!(pid = pid.as_raw(), "killing container process");
            let _ = kill(pid, Signal::SIGKILL);
            let _ = wait_for_exit(pid);
        }
        if let Some(cgroup) = self.cgroup.take() {
            release_cgroup(&cgroup);
        }
    }
}

fn wait_for_exit(pid: Pid) -> nix::Result<WaitStatus> {
    loop {
        match waitpid(pid, None) {
            Ok(status @ (WaitStatus::Exited(..) | WaitStatus::Signaled(..))) => return Ok(status),
            Ok(_) | Err(Errno::EINTR) => {}
            Err(e) => return Err(e),
        }
    }
}

/// A running container process owned by the caller.
///
/// Dropping it without calling [`Launched::wait`] kills the container.
pub struct Launched {
    guard: ChildGuard,
    process: ProcessHandle,
}

impl Launched {
    /// Identity of the entry process.
    #[must_use]
    pub const fn process(&self) -> ProcessHandle {
        self.process
    }

    /// Blocks until the entry process terminates and returns its exit code
    /// (or `128 + signal`), then removes the cgroup.
    #[must_use]
    pub fn wait(mut self) -> i32 {
        let Some(pid) = self.guard.pid.take() else {
            return EXIT_STATUS_LOST;
        };
        match wait_for_exit(pid) {
            Ok(status) => process::exit_code(status).unwrap_or(EXIT_STATUS_LOST),
            Err(e) => {
                tracing::warn!(pid = pid.as_raw(), error = %e, "lost track of container process");
                EXIT_STATUS_LOST
            }
        }
    }

    /// Kills the container and cleans up.
    pub fn abort(self) {
        drop(self);
    }
}

impl std::fmt::Debug for Launched {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Launched")
            .field("process", &self.process)
            .finish_non_exhaustive()
    }
}
