// crates/lnt-server/tests/app_setup.rs
// ============================================================================
// Module: Application Setup Tests
// Description: Construction paths of the application object.
// Purpose: Ensure an unconfigured application refuses to serve.
// Dependencies: lnt-server, tempfile
// ============================================================================

//! ## Overview
//! Covers the unconfigured application, debug mode, and config failures.

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
    reason = "Test-only assertions and helpers are permitted."
)]

mod common;

use lnt_config::Instance;
use lnt_server::App;
use lnt_server::AppError;
use tempfile::TempDir;

#[test]
fn unconfigured_app_has_no_router() {
    let app = App::new().expect("app");
    assert!(matches!(app.config(), Err(AppError::NotConfigured)));
    assert!(matches!(app.router(), Err(AppError::NotConfigured)));
    assert!(app.templates().get_template("layout.html").is_ok());
    assert!(!app.version().is_empty());
}

#[test]
fn configured_app_exposes_instance() {
    let dir = common::write_instance("/lnt", true);
    let instance = Instance::from_path(dir.path()).expect("instance");
    let app = App::create_with_instance(instance).expect("app");
    let config = app.config().expect("config");
    assert_eq!(config.name, "Test LNT");
    assert_eq!(config.server.url_prefix, "/lnt");
    assert!(app.instance().is_some());
    assert!(app.memory_log().is_none());
}

#[test]
fn standalone_rejects_missing_instance() {
    let dir = TempDir::new().expect("tempdir");
    let result = App::create_standalone(&dir.path().join("nowhere"));
    assert!(matches!(result, Err(AppError::Config(_))));
}
