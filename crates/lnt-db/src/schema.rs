// crates/lnt-db/src/schema.rs
// ============================================================================
// Module: LNT v4 Schema
// Description: Creation of v4 databases and per-suite tables.
// Purpose: Lay out fresh databases for new instances and tests.
// Dependencies: rusqlite
// ============================================================================

//! ## Overview
//! A v4 database records its layout version in `SchemaVersion` and lists its
//! test suites in `TestSuite`. Every suite owns a family of tables prefixed
//! with its `DBKeyName`. Key names are validated before they are spliced into
//! DDL because `SQLite` cannot bind identifiers.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;

use rusqlite::Connection;
use rusqlite::OpenFlags;
use rusqlite::OptionalExtension;
use rusqlite::params;

use crate::db::DbError;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Schema layout version stored in `SchemaVersion`.
pub const SCHEMA_VERSION: i64 = 4;
/// Name of the schema row in `SchemaVersion`.
pub(crate) const SCHEMA_NAME: &str = "lnt";
/// Layout version recorded for newly created suites.
const TESTSUITE_VERSION: &str = "2";
/// Maximum length of a suite key name.
const MAX_DB_KEY_NAME_LENGTH: usize = 32;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Definition of a test suite to create.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestSuiteSpec {
    /// Suite name used in URLs.
    pub name: String,
    /// Table prefix.
    pub db_key_name: String,
}

impl TestSuiteSpec {
    /// Builds a suite definition.
    #[must_use]
    pub fn new(name: impl Into<String>, db_key_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            db_key_name: db_key_name.into(),
        }
    }
}

// ============================================================================
// SECTION: Creation
// ============================================================================

/// Creates a new v4 database at `path` holding the given suites.
///
/// # Errors
///
/// Returns [`DbError`] when the file already exists or `SQLite` fails.
pub fn create_database(path: &Path, suites: &[TestSuiteSpec]) -> Result<(), DbError> {
    if path.exists() {
        return Err(DbError::Invalid(format!("database already exists: {}", path.display())));
    }
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).map_err(|err| DbError::Io(err.to_string()))?;
    }
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE;
    let mut connection =
        Connection::open_with_flags(path, flags).map_err(|err| DbError::Db(err.to_string()))?;
    let tx = connection.transaction().map_err(|err| DbError::Db(err.to_string()))?;
    tx.execute_batch(
        "CREATE TABLE SchemaVersion (
            Name TEXT PRIMARY KEY,
            Version INTEGER NOT NULL
        );
        CREATE TABLE TestSuite (
            ID INTEGER PRIMARY KEY,
            Name TEXT NOT NULL UNIQUE,
            DBKeyName TEXT NOT NULL UNIQUE,
            Version TEXT NOT NULL
        );",
    )
    .map_err(|err| DbError::Db(err.to_string()))?;
    tx.execute(
        "INSERT INTO SchemaVersion (Name, Version) VALUES (?1, ?2)",
        params![SCHEMA_NAME, SCHEMA_VERSION],
    )
    .map_err(|err| DbError::Db(err.to_string()))?;
    for suite in suites {
        create_suite_tables(&tx, suite)?;
    }
    tx.commit().map_err(|err| DbError::Db(err.to_string()))
}

/// Adds a test suite and its tables to an existing v4 database.
///
/// # Errors
///
/// Returns [`DbError`] when the suite is invalid, already present, or
/// `SQLite` fails.
pub fn add_testsuite(path: &Path, suite: &TestSuiteSpec) -> Result<(), DbError> {
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE;
    let mut connection =
        Connection::open_with_flags(path, flags).map_err(|err| DbError::Db(err.to_string()))?;
    let tx = connection.transaction().map_err(|err| DbError::Db(err.to_string()))?;
    let existing: Option<i64> = tx
        .query_row(
            "SELECT ID FROM TestSuite WHERE Name = ?1 OR DBKeyName = ?2",
            params![suite.name, suite.db_key_name],
            |row| row.get(0),
        )
        .optional()
        .map_err(|err| DbError::Db(err.to_string()))?;
    if existing.is_some() {
        return Err(DbError::Invalid(format!("test suite '{}' already exists", suite.name)));
    }
    create_suite_tables(&tx, suite)?;
    tx.commit().map_err(|err| DbError::Db(err.to_string()))
}

/// Registers a suite and creates its tables inside an open transaction.
fn create_suite_tables(connection: &Connection, suite: &TestSuiteSpec) -> Result<(), DbError> {
    validate_suite_name(&suite.name)?;
    let key = validate_db_key_name(&suite.db_key_name)?;
    connection
        .execute(
            "INSERT INTO TestSuite (Name, DBKeyName, Version) VALUES (?1, ?2, ?3)",
            params![suite.name, key, TESTSUITE_VERSION],
        )
        .map_err(|err| DbError::Db(err.to_string()))?;
    connection
        .execute_batch(&format!(
            "CREATE TABLE \"{key}_Machine\" (
                ID INTEGER PRIMARY KEY,
                Name TEXT NOT NULL,
                Parameters TEXT NOT NULL DEFAULT '{{}}'
            );
            CREATE TABLE \"{key}_Order\" (
                ID INTEGER PRIMARY KEY,
                llvm_project_revision TEXT NOT NULL
            );
            CREATE TABLE \"{key}_Run\" (
                ID INTEGER PRIMARY KEY,
                MachineID INTEGER NOT NULL REFERENCES \"{key}_Machine\"(ID),
                OrderID INTEGER NOT NULL REFERENCES \"{key}_Order\"(ID),
                ImportedFrom TEXT,
                StartTime TEXT NOT NULL,
                EndTime TEXT NOT NULL,
                Parameters TEXT NOT NULL DEFAULT '{{}}'
            );
            CREATE INDEX \"idx_{key}_Run_MachineID\" ON \"{key}_Run\" (MachineID);"
        ))
        .map_err(|err| DbError::Db(err.to_string()))
}

// ============================================================================
// SECTION: Validation
// ============================================================================

/// Validates a suite table prefix and returns it unchanged.
///
/// Surrounding whitespace is rejected rather than trimmed, so a stored key
/// always names its tables exactly.
///
/// # Errors
///
/// Returns [`DbError::Invalid`] when the key is empty, too long, or contains
/// characters other than ASCII alphanumerics and `_`.
pub fn validate_db_key_name(raw: &str) -> Result<String, DbError> {
    if raw.is_empty() {
        return Err(DbError::Invalid("test suite key cannot be empty".to_string()));
    }
    if raw.len() > MAX_DB_KEY_NAME_LENGTH {
        return Err(DbError::Invalid(format!("test suite key '{raw}' is too long")));
    }
    if !raw.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(DbError::Invalid(format!(
            "invalid test suite key '{raw}': only alphanumeric and '_' allowed"
        )));
    }
    Ok(raw.to_string())
}

/// Validates a suite name used as a URL segment.
fn validate_suite_name(name: &str) -> Result<(), DbError> {
    if name.is_empty() || name.contains(['/', '?', '#']) || name.trim() != name {
        return Err(DbError::Invalid(format!("invalid test suite name '{name}'")));
    }
    Ok(())
}
