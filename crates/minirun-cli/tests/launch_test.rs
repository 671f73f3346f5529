//! End-to-end tests that launch real containers from a minimal rootfs
//! assembled out of host binaries.
//!
//! Every test first checks that this host lets us create namespaces and
//! returns early when it does not.

#![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]

use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::time::{Duration, Instant};

use tempfile::TempDir;

const BINARIES: &[&str] = &["/bin/sh", "/bin/true", "/bin/sleep"];

struct Host {
    home: TempDir,
    rootfs: PathBuf,
}

impl Host {
    /// Builds the rootfs and runs `/bin/true` once. Returns `None` when the
    /// host cannot provide what the tests need.
    fn prepare() -> Option<Self> {
        let home = tempfile::tempdir().expect("tempdir");
        let rootfs = home.path().join("image");
        if let Err(reason) = build_rootfs(&rootfs) {
            eprintln!("skipping: cannot assemble rootfs: {reason}");
            return None;
        }
        let host = Self { home, rootfs };

        host.create("support-check", &["/bin/true"]);
        let out = host.run(&["start", "--attach", "support-check"]);
        if !out.status.success() {
            let stderr = String::from_utf8_lossy(&out.stderr);
            if stderr.contains("Operation not permitted") || stderr.contains("Permission denied") {
                eprintln!("skipping: namespaces unavailable: {stderr}");
                return None;
            }
            panic!("/bin/true failed to run: {out:?}");
        }
        Some(host)
    }

    fn run(&self, args: &[&str]) -> Output {
        Command::new(env!("CARGO_BIN_EXE_minirun"))
            .env("MINIRUN_HOME", self.home.path())
            .env_remove("MINIRUN_ROOTFS")
            .env_remove("RUST_LOG")
            .args(args)
            .output()
            .expect("run minirun")
    }

    fn create(&self, name: &str, command: &[&str]) {
        let rootfs = self.rootfs.to_str().expect("utf8 rootfs");
        let mut args = vec!["create", name, "--rootfs", rootfs, "--"];
        args.extend_from_slice(command);
        let out = self.run(&args);
        assert!(out.status.success(), "create {name} failed: {out:?}");
    }

    fn record(&self, name: &str) -> serde_json::Value {
        let path = self.home.path().join("containers").join(format!("{name}.json"));
        let content = std::fs::read_to_string(path).expect("read record");
        serde_json::from_str(&content).expect("record is JSON")
    }

    fn wait_for_state(&self, name: &str, state: &str) -> serde_json::Value {
        let deadline = Instant::now() + Duration::from_secs(10);
        loop {
            let out = self.run(&["info", "--json", name]);
            let record: serde_json::Value =
                serde_json::from_slice(&out.stdout).expect("info --json");
            if record["state"] == state || Instant::now() >= deadline {
                return record;
            }
            std::thread::sleep(Duration::from_millis(50));
        }
    }
}

fn build_rootfs(rootfs: &Path) -> Result<(), String> {
    std::fs::create_dir_all(rootfs.join("proc")).map_err(|e| e.to_string())?;
    for binary in BINARIES {
        copy_into(rootfs, Path::new(binary))?;
        for library in shared_libraries(binary)? {
            copy_into(rootfs, &library)?;
        }
    }
    Ok(())
}

fn shared_libraries(binary: &str) -> Result<Vec<PathBuf>, String> {
    let out = Command::new("ldd")
        .arg(binary)
        .output()
        .map_err(|e| format!("ldd: {e}"))?;
    // Statically linked binaries make ldd exit nonzero with nothing to copy.
    Ok(String::from_utf8_lossy(&out.stdout)
        .split_whitespace()
        .filter(|token| token.starts_with('/'))
        .map(PathBuf::from)
        .collect())
}

fn copy_into(rootfs: &Path, source: &Path) -> Result<(), String> {
    let relative = source.strip_prefix("/").map_err(|e| e.to_string())?;
    let target = rootfs.join(relative);
    if target.exists() {
        return Ok(());
    }
    if let Some(parent) = target.parent() {
        std::fs::create_dir_all(parent).map_err(|e| e.to_string())?;
    }
    let _ = std::fs::copy(source, &target).map_err(|e| format!("{}: {e}", source.display()))?;
    Ok(())
}

#[test]
fn successful_command_ends_exited() {
    let Some(host) = Host::prepare() else {
        return;
    };
    let record = host.record("support-check");
    assert_eq!(record["state"], "exited");
    assert_eq!(record["exit_code"], 0);
    assert!(record["pid"].is_null());

    host.create("detached", &["/bin/true"]);
    assert!(host.run(&["start", "detached"]).status.success());
    let record = host.wait_for_state("detached", "exited");
    assert_eq!(record["state"], "exited");
    assert_eq!(record["exit_code"], 0);
}

#[test]
fn nonzero_exit_is_failed_and_propagated() {
    let Some(host) = Host::prepare() else {
        return;
    };
    host.create("three", &["/bin/sh", "-c", "exit 3"]);
    let out = host.run(&["start", "--attach", "three"]);
    assert_eq!(out.status.code(), Some(3));

    let record = host.record("three");
    assert_eq!(record["state"], "failed");
    assert_eq!(record["exit_code"], 3);
}

#[test]
fn missing_program_records_127() {
    let Some(host) = Host::prepare() else {
        return;
    };
    host.create("nocmd", &["/bin/does-not-exist"]);
    let out = host.run(&["start", "nocmd"]);
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("executing command"));

    let record = host.record("nocmd");
    assert_eq!(record["state"], "failed");
    assert_eq!(record["exit_code"], 127);
}

#[test]
fn running_container_cannot_be_deleted_and_stop_kills_it() {
    let Some(host) = Host::prepare() else {
        return;
    };
    host.create("sleeper", &["/bin/sleep", "30"]);
    assert!(host.run(&["start", "sleeper"]).status.success());
    let record = host.record("sleeper");
    assert_eq!(record["state"], "running");
    assert!(record["pid"].is_u64());

    let out = host.run(&["delete", "sleeper"]);
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("cannot delete"));

    // The entry process is init of its PID namespace and has no SIGTERM
    // handler, so only the SIGKILL escalation ends it.
    let out = host.run(&["stop", "--timeout", "1", "sleeper"]);
    assert!(out.status.success(), "stop failed: {out:?}");
    let record = host.record("sleeper");
    assert_eq!(record["state"], "failed");
    assert_eq!(record["exit_code"], 137);

    assert!(host.run(&["delete", "sleeper"]).status.success());
}
