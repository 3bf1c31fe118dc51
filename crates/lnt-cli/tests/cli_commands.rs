// crates/lnt-cli/tests/cli_commands.rs
// ============================================================================
// Module: CLI Command Tests
// Description: Integration tests for the `lnt` binary.
// Purpose: Validate instance creation and runserver startup failures.
// Dependencies: lnt-cli binary, lnt-config, lnt-db
// ============================================================================

//! ## Overview
//! Runs the compiled `lnt` binary against temporary directories.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::PathBuf;
use std::process::Command;
use std::process::Output;

use lnt_config::Instance;
use lnt_db::V4Db;
use tempfile::TempDir;

// ============================================================================
// SECTION: Helpers
// ============================================================================

fn lnt_bin() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_lnt"))
}

fn lnt(args: &[&str]) -> Output {
    Command::new(lnt_bin()).args(args).output().expect("run lnt")
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[test]
fn create_lays_out_a_loadable_instance() {
    let dir = TempDir::new().expect("tempdir");
    let target = dir.path().join("inst");
    let target_arg = target.to_str().expect("utf-8 path");
    let output = lnt(&["create", target_arg, "--name", "Nightly"]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("created LNT configuration in"));

    let instance = Instance::from_path(&target).expect("instance");
    let config = instance.config();
    assert_eq!(config.name, "Nightly");
    assert_eq!(config.secret_key.len(), 64);

    let db_path = &config.database("default").expect("default db").path;
    let db = V4Db::open("default", db_path, None).expect("open db");
    let suite = db.testsuite().get("nts").expect("nts suite");
    assert_eq!(suite.db_key_name, "NT");
}

#[test]
fn create_honors_suite_options() {
    let dir = TempDir::new().expect("tempdir");
    let target = dir.path().join("inst");
    let output = lnt(&[
        "create",
        target.to_str().expect("utf-8 path"),
        "--default-suite",
        "compile",
        "--suite-key",
        "compile",
    ]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let instance = Instance::from_path(&target).expect("instance");
    let db_path = &instance.config().database("default").expect("default db").path;
    let db = V4Db::open("default", db_path, None).expect("open db");
    assert!(db.testsuite().contains_key("compile"));
}

#[test]
fn create_refuses_existing_path() {
    let dir = TempDir::new().expect("tempdir");
    let output = lnt(&["create", dir.path().to_str().expect("utf-8 path")]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("already exists"), "{stderr}");
}

#[test]
fn create_rejects_bad_suite_key_without_leaving_files() {
    let dir = TempDir::new().expect("tempdir");
    let target = dir.path().join("inst");
    let output =
        lnt(&["create", target.to_str().expect("utf-8 path"), "--suite-key", "bad key"]);
    assert!(!output.status.success());
    assert!(!target.exists());
}

#[test]
fn runserver_fails_for_missing_instance() {
    let dir = TempDir::new().expect("tempdir");
    let missing = dir.path().join("nowhere");
    let output = lnt(&["runserver", missing.to_str().expect("utf-8 path")]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("failed to load instance"), "{stderr}");
}

#[test]
fn runserver_rejects_unresolvable_hostname() {
    let dir = TempDir::new().expect("tempdir");
    let target = dir.path().join("inst");
    let target_arg = target.to_str().expect("utf-8 path");
    assert!(lnt(&["create", target_arg]).status.success());
    let output = lnt(&["runserver", target_arg, "--hostname", "not an address"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("invalid hostname"), "{stderr}");
}

#[test]
fn runserver_refuses_archived_instance() {
    let dir = TempDir::new().expect("tempdir");
    let archive = dir.path().join("instance.tar.gz");
    std::fs::write(&archive, b"").expect("archive");
    let output = lnt(&["runserver", archive.to_str().expect("utf-8 path")]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("archived instances are not supported"), "{stderr}");
}
