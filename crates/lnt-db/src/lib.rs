// crates/lnt-db/src/lib.rs
// ============================================================================
// Module: LNT Database
// Description: SQLite-backed v4 database access for the LNT server.
// Purpose: Provide the per-request database handle and schema creation.
// Dependencies: lnt-config, rusqlite
// ============================================================================

//! ## Overview
//! This crate opens configured v4 databases, exposes their test-suite
//! catalog, and answers the read queries the frontend and REST API need. It
//! also lays out fresh databases for new instances.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod db;
pub mod model;
pub mod schema;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use db::DbError;
pub use db::MAX_LIST_ROWS;
pub use db::SqlLog;
pub use db::V4Db;
pub use db::get_database;
pub use model::Machine;
pub use model::Order;
pub use model::Run;
pub use model::TestSuite;
pub use schema::TestSuiteSpec;
pub use schema::add_testsuite;
pub use schema::create_database;
