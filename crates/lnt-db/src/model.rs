// crates/lnt-db/src/model.rs
// ============================================================================
// Module: LNT Database Records
// Description: Row types returned by the v4 database handle.
// Purpose: Give views and the REST API typed, serializable records.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! Plain records read from the catalog and the per-suite tables. They derive
//! `Serialize` so views and the REST API can hand them to templates and JSON
//! without conversion. Free-form `Parameters` columns are decoded into JSON
//! objects.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Serialize;
use serde_json::Map;
use serde_json::Value;

// ============================================================================
// SECTION: Records
// ============================================================================

/// A test suite registered in a v4 database.
///
/// # Invariants
/// - `db_key_name` is ASCII alphanumeric or `_` and safe to splice into table
///   names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TestSuite {
    /// Row identifier.
    pub id: i64,
    /// Suite name used in URLs.
    pub name: String,
    /// Table prefix for the suite's tables.
    pub db_key_name: String,
    /// Suite layout version.
    pub version: String,
}

impl TestSuite {
    /// Returns the quoted table name for one of the suite's tables.
    pub(crate) fn table(&self, suffix: &str) -> String {
        format!("\"{}_{suffix}\"", self.db_key_name)
    }
}

/// A machine that submitted runs.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Machine {
    /// Row identifier.
    pub id: i64,
    /// Machine name.
    pub name: String,
    /// Free-form machine parameters.
    pub parameters: Map<String, Value>,
}

/// A revision order that runs are attached to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Order {
    /// Row identifier.
    pub id: i64,
    /// Revision label.
    pub llvm_project_revision: String,
}

/// A single test run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Run {
    /// Row identifier.
    pub id: i64,
    /// Submitting machine.
    pub machine_id: i64,
    /// Revision order.
    pub order_id: i64,
    /// Origin of the imported report, when recorded.
    pub imported_from: Option<String>,
    /// Run start time (`YYYY-MM-DD HH:MM:SS`).
    pub start_time: String,
    /// Run end time (`YYYY-MM-DD HH:MM:SS`).
    pub end_time: String,
    /// Free-form run parameters.
    pub parameters: Map<String, Value>,
}
