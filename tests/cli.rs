//! CLI integration tests for loopd admin commands.
//!
//! Each test uses an isolated temp directory for the database, ensuring tests
//! can run in parallel safely.

#![allow(deprecated)] // Command::cargo_bin deprecation only affects custom build dirs

use std::path::Path;

use assert_cmd::Command;
use assert_fs::TempDir;
use loopd::store::{SqliteStore, Store};
use predicates::prelude::*;

struct TestContext {
    temp_dir: TempDir,
}

impl TestContext {
    fn new() -> Self {
        Self {
            temp_dir: TempDir::new().expect("failed to create temp dir"),
        }
    }

    fn data_dir(&self) -> &Path {
        self.temp_dir.path()
    }

    fn data_dir_str(&self) -> String {
        self.data_dir().to_string_lossy().to_string()
    }

    fn init(&self) -> assert_cmd::assert::Assert {
        Command::cargo_bin("loopd")
            .expect("failed to find binary")
            .args([
                "admin",
                "init",
                "--data-dir",
                &self.data_dir_str(),
                "--non-interactive",
            ])
            .assert()
    }
}

#[test]
fn init_creates_database_and_admin_token() {
    let ctx = TestContext::new();

    ctx.init()
        .success()
        .stdout(predicate::str::contains("Admin token"));

    assert!(ctx.data_dir().join("loop.db").exists());

    let token = std::fs::read_to_string(ctx.data_dir().join(".admin_token"))
        .expect("failed to read admin token");
    assert!(token.trim().starts_with("loop_"));

    let store = SqliteStore::new(ctx.data_dir().join("loop.db")).expect("failed to open store");
    assert!(store.has_admin_token().expect("failed to query store"));
}

#[test]
fn init_refuses_to_run_twice() {
    let ctx = TestContext::new();

    ctx.init().success();
    ctx.init()
        .failure()
        .stderr(predicate::str::contains("already initialized"));
}

#[test]
fn serve_requires_initialization() {
    let ctx = TestContext::new();

    Command::cargo_bin("loopd")
        .expect("failed to find binary")
        .args(["serve", "--data-dir", &ctx.data_dir_str()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("loopd admin init"));
}

#[test]
fn help_lists_commands() {
    Command::cargo_bin("loopd")
        .expect("failed to find binary")
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("serve").and(predicate::str::contains("admin")));
}
