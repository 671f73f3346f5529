//! End-to-end tests driving the `minirun` binary against an isolated
//! data directory.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use tempfile::TempDir;

struct Sandbox {
    dir: TempDir,
}

impl Sandbox {
    fn new() -> Self {
        Self {
            dir: tempfile::tempdir().expect("tempdir"),
        }
    }

    fn home(&self) -> &Path {
        self.dir.path()
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_minirun"));
        let _ = cmd
            .env("MINIRUN_HOME", self.home())
            .env_remove("MINIRUN_ROOTFS")
            .env_remove("RUST_LOG");
        cmd
    }

    fn run(&self, args: &[&str]) -> Output {
        self.command().args(args).output().expect("run minirun")
    }

    fn record_path(&self, name: &str) -> PathBuf {
        self.home().join("containers").join(format!("{name}.json"))
    }

    fn record(&self, name: &str) -> serde_json::Value {
        let content = std::fs::read_to_string(self.record_path(name)).expect("read record");
        serde_json::from_str(&content).expect("record is JSON")
    }
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn create_writes_parseable_record() {
    let sb = Sandbox::new();
    let out = sb.run(&["create", "test-create-123"]);
    assert!(out.status.success(), "create failed: {out:?}");

    let record = sb.record("test-create-123");
    assert_eq!(record["name"], "test-create-123");
    assert_eq!(record["state"], "created");
    assert_eq!(record["command"][0], "/bin/sh");
    assert_eq!(
        record["rootfs"],
        sb.home().join("rootfs").to_string_lossy().as_ref()
    );
}

#[test]
fn create_with_explicit_command_and_rootfs() {
    let sb = Sandbox::new();
    let rootfs = tempfile::tempdir().expect("rootfs");
    let out = sb.run(&[
        "create",
        "custom",
        "--rootfs",
        rootfs.path().to_str().expect("utf8"),
        "--memory",
        "64MiB",
        "--",
        "/bin/echo",
        "hello",
    ]);
    assert!(out.status.success(), "create failed: {out:?}");

    let record = sb.record("custom");
    assert_eq!(record["command"], serde_json::json!(["/bin/echo", "hello"]));
    assert_eq!(record["limits"]["memory_bytes"], 64 * 1024 * 1024);
    let canonical = std::fs::canonicalize(rootfs.path()).expect("canonical");
    assert_eq!(record["rootfs"], canonical.to_string_lossy().as_ref());
}

#[test]
fn duplicate_create_fails_and_keeps_original() {
    let sb = Sandbox::new();
    assert!(sb.run(&["create", "test-duplicate"]).status.success());
    let before = std::fs::read_to_string(sb.record_path("test-duplicate")).expect("read");

    let out = sb.run(&["create", "test-duplicate", "--", "/bin/false"]);
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("already exists"));

    let after = std::fs::read_to_string(sb.record_path("test-duplicate")).expect("read");
    assert_eq!(before, after);
}

#[test]
fn invalid_create_writes_nothing() {
    let sb = Sandbox::new();
    assert!(!sb.run(&["create", "../escape"]).status.success());
    assert!(!sb.run(&["create", "norootfs", "--rootfs", "/no/such/dir"]).status.success());
    assert!(!sb.record_path("norootfs").exists());
    assert!(stdout(&sb.run(&["list", "--quiet"])).is_empty());
}

#[test]
fn list_shows_created_and_hides_deleted() {
    let sb = Sandbox::new();
    assert!(sb.run(&["create", "test-list-a"]).status.success());
    assert!(sb.run(&["create", "test-list-b"]).status.success());

    let listing = stdout(&sb.run(&["list"]));
    assert!(listing.contains("test-list-a"));
    assert!(listing.contains("test-list-b"));
    let row = format!("{:<24} {:<10} ", "test-list-a", "created");
    assert!(listing.lines().any(|line| line.starts_with(&row)), "{listing}");

    assert!(sb.run(&["delete", "test-list-a"]).status.success());
    let quiet = stdout(&sb.run(&["list", "--quiet"]));
    assert_eq!(quiet, "test-list-b\n");
}

#[test]
fn info_shows_record_fields() {
    let sb = Sandbox::new();
    assert!(sb.run(&["create", "test-info"]).status.success());

    let out = sb.run(&["info", "test-info"]);
    assert!(out.status.success());
    let text = stdout(&out);
    assert!(text.contains("test-info"));
    assert!(text.contains("created"));

    let json: serde_json::Value =
        serde_json::from_str(&stdout(&sb.run(&["info", "test-info", "--json"]))).expect("json");
    assert_eq!(json["name"], "test-info");
}

#[test]
fn delete_removes_record_file() {
    let sb = Sandbox::new();
    assert!(sb.run(&["create", "test-delete"]).status.success());
    assert!(sb.record_path("test-delete").exists());

    assert!(sb.run(&["delete", "test-delete"]).status.success());
    assert!(!sb.record_path("test-delete").exists());
    assert!(!sb.run(&["info", "test-delete"]).status.success());
}

#[test]
fn operations_on_unknown_names_fail() {
    let sb = Sandbox::new();
    for args in [
        ["info", "nonexistent"],
        ["start", "nonexistent"],
        ["stop", "nonexistent"],
        ["delete", "nonexistent"],
        ["logs", "nonexistent"],
    ] {
        let out = sb.run(&args);
        assert!(!out.status.success(), "{args:?} should fail");
        assert!(String::from_utf8_lossy(&out.stderr).contains("not found"));
    }
}

#[test]
fn start_with_missing_rootfs_records_failure() {
    let sb = Sandbox::new();
    assert!(sb.run(&["create", "broken"]).status.success());

    let out = sb.run(&["start", "broken"]);
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("rootfs"));

    let record = sb.record("broken");
    assert_eq!(record["state"], "failed");
    assert_eq!(record["exit_code"], 125);
    assert!(record["pid"].is_null());

    let log = stdout(&sb.run(&["logs", "broken"]));
    assert!(log.contains("launch failed"), "{log}");
    assert!(!log.contains('\x1b'), "log carries terminal escapes: {log:?}");

    let again = sb.run(&["start", "broken"]);
    assert!(!again.status.success());
    assert!(String::from_utf8_lossy(&again.stderr).contains("cannot start"));

    assert!(sb.run(&["delete", "broken"]).status.success());
    assert!(!sb.record_path("broken").exists());
}

#[test]
fn stop_requires_running_container() {
    let sb = Sandbox::new();
    assert!(sb.run(&["create", "idle"]).status.success());
    let out = sb.run(&["stop", "idle"]);
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("cannot stop"));
}

#[test]
fn concurrent_creates_admit_exactly_one() {
    let sb = Sandbox::new();
    let children: Vec<_> = (0..8)
        .map(|_| {
            sb.command()
                .args(["create", "racer"])
                .stdout(std::process::Stdio::null())
                .stderr(std::process::Stdio::null())
                .spawn()
                .expect("spawn")
        })
        .collect();
    let successes = children
        .into_iter()
        .map(|mut c| c.wait().expect("wait"))
        .filter(std::process::ExitStatus::success)
        .count();
    assert_eq!(successes, 1);
    assert_eq!(stdout(&sb.run(&["list", "--quiet"])), "racer\n");
}

#[test]
fn concurrent_creates_of_different_names_all_succeed() {
    let sb = Sandbox::new();
    let children: Vec<_> = (0..6)
        .map(|i| {
            sb.command()
                .args(["create", &format!("worker-{i}")])
                .stdout(std::process::Stdio::null())
                .spawn()
                .expect("spawn")
        })
        .collect();
    for mut child in children {
        assert!(child.wait().expect("wait").success());
    }
    assert_eq!(stdout(&sb.run(&["list", "--quiet"])).lines().count(), 6);
}
