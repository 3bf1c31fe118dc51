// crates/lnt-config/src/lib.rs
// ============================================================================
// Module: LNT Config Library
// Description: Canonical config model, validation, and instance discovery.
// Purpose: Single source of truth for lnt.toml semantics.
// Dependencies: serde, toml
// ============================================================================

//! ## Overview
//! `lnt-config` defines the configuration model for an LNT server instance
//! and the rules for locating it on disk. Validation is strict and
//! fail-closed.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod config;
pub mod instance;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use config::*;
pub use instance::Instance;
