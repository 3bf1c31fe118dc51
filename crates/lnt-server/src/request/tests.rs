// crates/lnt-server/src/request/tests.rs
// ============================================================================
// Module: Request Context Tests
// Description: Unit tests for route parsing and lazy database resolution.
// Purpose: Ensure each request opens its database once and fails closed.
// Dependencies: lnt-config, lnt-db, tempfile, tokio
// ============================================================================

//! ## Overview
//! Covers path parsing, the `db_log` flag, and the lazy database and
//! test-suite lookups of [`RequestContext`].

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

use std::fs;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use axum::http::StatusCode;
use lnt_config::Instance;
use lnt_config::LntConfig;
use lnt_db::TestSuiteSpec;
use lnt_db::create_database;
use tempfile::TempDir;

use super::RequestContext;
use super::RouteTarget;
use super::db_log_requested;
use super::db_segment_name;

// ============================================================================
// SECTION: Fixtures
// ============================================================================

/// Instance with a `default` database holding suite `nts`, an `other`
/// database holding suite `compile`, and an unreadable `broken` database.
fn instance() -> (TempDir, Arc<Instance>) {
    let dir = TempDir::new().expect("tempdir");
    let data = dir.path().join("data");
    create_database(&data.join("lnt.db"), &[TestSuiteSpec::new("nts", "NT")]).expect("create");
    create_database(&data.join("other.db"), &[TestSuiteSpec::new("compile", "compile")])
        .expect("create other");
    fs::write(data.join("broken.db"), b"not sqlite").expect("broken");
    let config = LntConfig::from_toml_str(
        "name = \"t\"\n\
         secret_key = \"s\"\n\
         [databases.default]\n\
         path = \"data/lnt.db\"\n\
         [databases.other]\n\
         path = \"data/other.db\"\n\
         [databases.broken]\n\
         path = \"data/broken.db\"\n",
    )
    .expect("config");
    let instance =
        Instance::with_config(dir.path().to_path_buf(), dir.path().join("lnt.toml"), config);
    (dir, Arc::new(instance))
}

/// Context for `path` on the fixture instance.
fn context(instance: &Arc<Instance>, path: &str, echo: bool) -> RequestContext {
    RequestContext::new(Arc::clone(instance), RouteTarget::from_path(path, ""), echo)
}

// ============================================================================
// SECTION: Route Target
// ============================================================================

#[test]
fn route_target_defaults_to_default_database() {
    let target = RouteTarget::from_path("/v4/nts/run/3", "");
    assert_eq!(target.db_name, "default");
    assert_eq!(target.testsuite_name.as_deref(), Some("nts"));
}

#[test]
fn route_target_reads_db_segment() {
    let target = RouteTarget::from_path("/db_other/v4/compile/", "");
    assert_eq!(target.db_name, "other");
    assert_eq!(target.testsuite_name.as_deref(), Some("compile"));

    let index = RouteTarget::from_path("/db_other/", "");
    assert_eq!(index.db_name, "other");
    assert_eq!(index.testsuite_name, None);
}

#[test]
fn route_target_strips_prefix_and_api_segment() {
    let target = RouteTarget::from_path("/lnt/api/db_x/v4/nts/machines", "/lnt");
    assert_eq!(target.db_name, "x");
    assert_eq!(target.testsuite_name.as_deref(), Some("nts"));
}

#[test]
fn route_target_without_suite() {
    for path in ["/", "/log", "/v4", "/db_x/machines/1"] {
        assert_eq!(RouteTarget::from_path(path, "").testsuite_name, None, "{path}");
    }
}

#[test]
fn route_target_decodes_segments() {
    let target = RouteTarget::from_path("/db_caf%C3%A9/v4/my%20suite/machine/1", "");
    assert_eq!(target.db_name, "café");
    assert_eq!(target.testsuite_name.as_deref(), Some("my suite"));

    let api = RouteTarget::from_path("/lnt/%61pi/db_x/v%34/a%2Fb/machines", "/lnt");
    assert_eq!(api.db_name, "x");
    assert_eq!(api.testsuite_name.as_deref(), Some("a/b"));
}

#[test]
fn db_segment_requires_prefix_and_name() {
    assert_eq!(db_segment_name("db_main"), Some("main"));
    assert_eq!(db_segment_name("db_"), None);
    assert_eq!(db_segment_name("main"), None);
}

#[test]
fn db_log_flag_needs_a_value() {
    assert!(db_log_requested(Some("db_log=1")));
    assert!(db_log_requested(Some("a=b&db_log=yes")));
    assert!(!db_log_requested(Some("db_log=")));
    assert!(!db_log_requested(Some("db_log")));
    assert!(!db_log_requested(Some("other=1")));
    assert!(!db_log_requested(None));
}

#[test]
fn db_log_flag_is_form_decoded() {
    assert!(db_log_requested(Some("db%5Flog=1")));
    assert!(db_log_requested(Some("x=1&db_log=%31")));
    assert!(db_log_requested(Some("db_log=+")));
    assert!(!db_log_requested(Some("db%5Flog=")));
    assert!(!db_log_requested(Some("db+log=1")));
}

// ============================================================================
// SECTION: Timing
// ============================================================================

#[test]
fn request_time_is_captured_at_construction() {
    let (_dir, instance) = instance();
    let request = context(&instance, "/", false);
    thread::sleep(Duration::from_millis(20));
    let first = request.elapsed_time();
    assert!(first >= Duration::from_millis(20), "{first:?}");
    thread::sleep(Duration::from_millis(5));
    let second = request.elapsed_time();
    assert!(second >= first + Duration::from_millis(5), "{first:?} then {second:?}");
}

// ============================================================================
// SECTION: Lazy Resolution
// ============================================================================

#[tokio::test]
async fn database_is_opened_once_per_request() {
    let (_dir, instance) = instance();
    let request = context(&instance, "/v4/nts/", false);
    assert!(!request.db_opened());
    let first = request.get_db().await.expect("db");
    let second = request.get_db().await.expect("db");
    assert!(Arc::ptr_eq(&first, &second));
    assert!(request.db_opened());
}

#[tokio::test]
async fn testsuite_resolves_from_catalog() {
    let (_dir, instance) = instance();
    let request = context(&instance, "/v4/nts/", false);
    let suite = request.get_testsuite().await.expect("suite");
    assert_eq!(suite.db_key_name, "NT");
}

#[tokio::test]
async fn named_database_resolves_lazily() {
    let (_dir, instance) = instance();
    let request = context(&instance, "/db_other/v4/compile/", false);
    assert_eq!(request.db_name(), "other");
    assert!(!request.db_opened());
    let suite = request.get_testsuite().await.expect("suite");
    assert_eq!(suite.db_key_name, "compile");
    assert!(request.db_opened());
}

#[tokio::test]
async fn unknown_suite_in_named_database_is_not_found() {
    let (_dir, instance) = instance();
    let request = context(&instance, "/db_other/v4/nts/", false);
    let err = request.get_testsuite().await.expect_err("suite lives in default only");
    assert_eq!(err.status(), StatusCode::NOT_FOUND);
    assert_eq!(err.message(), "unknown test suite 'nts'");
    assert!(request.db_opened());
}

#[tokio::test]
async fn unknown_suite_is_not_found() {
    let (_dir, instance) = instance();
    let request = context(&instance, "/v4/missing/", false);
    let err = request.get_testsuite().await.expect_err("unknown suite");
    assert_eq!(err.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn missing_suite_segment_is_not_found() {
    let (_dir, instance) = instance();
    let request = context(&instance, "/", false);
    let err = request.get_testsuite().await.expect_err("no suite");
    assert_eq!(err.status(), StatusCode::NOT_FOUND);
    assert!(!request.db_opened());
}

#[tokio::test]
async fn unknown_database_is_not_found() {
    let (_dir, instance) = instance();
    let request = context(&instance, "/db_nope/", false);
    let err = request.get_db().await.expect_err("unknown db");
    assert_eq!(err.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn unreadable_database_is_internal_error() {
    let (_dir, instance) = instance();
    let request = context(&instance, "/db_broken/", false);
    let err = request.get_db().await.expect_err("broken db");
    assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(err.message(), "internal server error");
}

#[tokio::test]
async fn db_log_collects_statements_when_requested() {
    let (_dir, instance) = instance();
    let request = context(&instance, "/v4/nts/", true);
    let suite = request.get_testsuite().await.expect("suite");
    request.query(move |db| db.machines(&suite)).await.expect("machines");
    let log = request.db_log().expect("db log");
    assert!(log.contains("FROM \"NT_Machine\""));

    let other = context(&instance, "/db_other/v4/compile/", true);
    let suite = other.get_testsuite().await.expect("suite");
    other.query(move |db| db.machines(&suite)).await.expect("machines");
    assert!(other.db_log().expect("db log").contains("FROM \"compile_Machine\""));

    let quiet = context(&instance, "/v4/nts/", false);
    quiet.get_db().await.expect("db");
    assert_eq!(quiet.db_log(), None);
}

#[tokio::test]
async fn close_releases_the_connection() {
    let (_dir, instance) = instance();
    let request = context(&instance, "/v4/nts/", false);
    request.close();
    let db = request.get_db().await.expect("db");
    assert!(!db.is_closed());
    request.close();
    assert!(db.is_closed());
}
