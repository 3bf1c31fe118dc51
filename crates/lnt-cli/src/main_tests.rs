// crates/lnt-cli/src/main_tests.rs
// ============================================================================
// Module: CLI Main Helpers Tests
// Description: Unit tests for bind overrides and instance file rendering.
// Purpose: Ensure command-line overrides and generated configs are valid.
// Dependencies: lnt-cli main helpers
// ============================================================================

//! ## Overview
//! Validates `resolve_bind`, `render_instance_config`, and
//! `generate_secret_key`.

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

use lnt_config::LntConfig;

use super::generate_secret_key;
use super::render_instance_config;
use super::resolve_bind;

// ============================================================================
// SECTION: Tests
// ============================================================================

#[test]
fn bind_keeps_config_without_overrides() {
    let addr = resolve_bind("127.0.0.1:8000", None, None).expect("bind");
    assert_eq!(addr.to_string(), "127.0.0.1:8000");
}

#[test]
fn bind_applies_hostname_and_port() {
    let addr = resolve_bind("127.0.0.1:8000", Some("0.0.0.0"), Some(9100)).expect("bind");
    assert_eq!(addr.to_string(), "0.0.0.0:9100");
    let local = resolve_bind("10.0.0.1:8000", Some("localhost"), None).expect("bind");
    assert_eq!(local.to_string(), "127.0.0.1:8000");
}

#[test]
fn bind_rejects_host_names() {
    let err = resolve_bind("127.0.0.1:8000", Some("lnt.example.com"), None).expect_err("host");
    assert!(err.to_string().contains("invalid hostname"));
}

#[test]
fn rendered_config_loads() {
    let text = render_instance_config("Nightly \"perf\"", "abc123").expect("render");
    let config = LntConfig::from_toml_str(&text).expect("parse");
    assert_eq!(config.name, "Nightly \"perf\"");
    assert_eq!(config.secret_key, "abc123");
    assert_eq!(config.database_names(), vec!["default".to_string()]);
}

#[test]
fn rendered_config_rejects_blank_name() {
    assert!(render_instance_config("  ", "abc123").is_err());
}

#[test]
fn secret_keys_are_random_hex() {
    let first = generate_secret_key();
    let second = generate_secret_key();
    assert_eq!(first.len(), 64);
    assert!(first.chars().all(|c| c.is_ascii_hexdigit()));
    assert_ne!(first, second);
}
