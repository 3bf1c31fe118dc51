// crates/lnt-server/tests/file_logging.rs
// ============================================================================
// Module: File Logging Tests
// Description: Installs the global subscriber with a rotating log file.
// Purpose: Validate the startup message, the /log view, and single install.
// Dependencies: lnt-config, lnt-server, tempfile
// ============================================================================

//! ## Overview
//! Runs in its own test binary because it installs the process-wide
//! subscriber.

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

use std::fs;
use std::path::Path;

use axum::http::StatusCode;
use common::get;
use lnt_config::Instance;
use lnt_config::LntConfig;
use lnt_server::App;
use lnt_server::AppError;
use tempfile::TempDir;

/// Builds an application whose log file lives at `log_file`.
fn app_logging_to(dir: &Path, log_file: &Path) -> App {
    let config = LntConfig::from_toml_str(&format!(
        "name = \"Logging\"\n\
         secret_key = \"s\"\n\
         [logging]\n\
         file = \"{}\"\n\
         memory_capacity_bytes = 65536\n",
        log_file.display()
    ))
    .expect("config");
    let instance = Instance::with_config(dir.to_path_buf(), dir.join("lnt.toml"), config);
    App::create_with_instance(instance).expect("app")
}

#[tokio::test]
async fn file_logging_starts_once() {
    let dir = TempDir::new().expect("tempdir");
    let log_file = dir.path().join("lnt.log");
    let app = app_logging_to(dir.path(), &log_file);
    assert!(app.memory_log().is_none());

    app.start_file_logging().expect("start logging");
    let contents = fs::read_to_string(&log_file).expect("log file");
    assert!(contents.contains(" INFO: Started file logging. [in "), "{contents}");

    let memory = app.memory_log().expect("memory log");
    assert!(memory.contents().contains("Started file logging."));

    let router = app.router().expect("router");
    let page = get(&router, "/log").await;
    assert_eq!(page.status, StatusCode::OK);
    assert!(page.body.contains("Started file logging."));

    let second = app_logging_to(dir.path(), &dir.path().join("other.log"));
    let err = second.start_file_logging().expect_err("second install");
    assert!(matches!(err, AppError::Logging(_)));
}
