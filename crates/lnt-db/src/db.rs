// crates/lnt-db/src/db.rs
// ============================================================================
// Module: LNT v4 Database Handle
// Description: Read access to a v4 SQLite database and its test suites.
// Purpose: Back the request context's lazily opened database.
// Dependencies: lnt-config, rusqlite, serde_json, thiserror, tracing
// ============================================================================

//! ## Overview
//! [`V4Db`] wraps one `SQLite` connection to a served database. Opening
//! verifies the schema version and loads the test-suite catalog once; the
//! catalog is immutable for the lifetime of the handle. A handle may carry a
//! [`SqlLog`] that captures every statement it executes (the `db_log`
//! request argument). After [`V4Db::close`] all queries fail with
//! [`DbError::Closed`].

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use lnt_config::LntConfig;
use rusqlite::Connection;
use rusqlite::OpenFlags;
use rusqlite::OptionalExtension;
use rusqlite::Row;
use rusqlite::params;
use serde_json::Map;
use serde_json::Value;
use thiserror::Error;

use crate::model::Machine;
use crate::model::Order;
use crate::model::Run;
use crate::model::TestSuite;
use crate::schema::SCHEMA_NAME;
use crate::schema::SCHEMA_VERSION;
use crate::schema::validate_db_key_name;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Busy timeout applied to every connection.
const BUSY_TIMEOUT: Duration = Duration::from_millis(5_000);
/// Upper bound on rows returned by list queries.
pub const MAX_LIST_ROWS: usize = 1_000;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Database errors.
///
/// # Invariants
/// - Messages never embed row payloads.
#[derive(Debug, Error, Clone)]
pub enum DbError {
    /// Filesystem failure.
    #[error("database io error: {0}")]
    Io(String),
    /// `SQLite` engine error.
    #[error("database error: {0}")]
    Db(String),
    /// The database file does not exist.
    #[error("database file not found: {0}")]
    Missing(String),
    /// Schema version mismatch.
    #[error("database version mismatch: {0}")]
    VersionMismatch(String),
    /// Stored data could not be decoded.
    #[error("database corruption: {0}")]
    Corrupt(String),
    /// Invalid input.
    #[error("invalid database request: {0}")]
    Invalid(String),
    /// The handle was closed.
    #[error("database handle is closed")]
    Closed,
}

// ============================================================================
// SECTION: SQL Capture
// ============================================================================

/// Shared buffer of SQL statements executed by one database handle.
#[derive(Debug, Clone, Default)]
pub struct SqlLog {
    /// Captured statements in execution order.
    entries: Arc<Mutex<Vec<String>>>,
}

impl SqlLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one statement.
    pub fn record(&self, statement: String) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.push(statement);
        }
    }

    /// Returns the captured statements.
    #[must_use]
    pub fn entries(&self) -> Vec<String> {
        self.entries.lock().map(|entries| entries.clone()).unwrap_or_default()
    }

    /// Returns the captured statements joined by newlines.
    #[must_use]
    pub fn contents(&self) -> String {
        self.entries().join("\n")
    }
}

// ============================================================================
// SECTION: Lookup
// ============================================================================

/// Opens the configured database registered under `name`.
///
/// Returns `Ok(None)` when no database of that name is configured.
///
/// # Errors
///
/// Returns [`DbError`] when the configured database cannot be opened.
pub fn get_database(
    config: &LntConfig,
    name: &str,
    sql_log: Option<SqlLog>,
) -> Result<Option<V4Db>, DbError> {
    let Some(database) = config.database(name) else {
        return Ok(None);
    };
    V4Db::open(name, &database.path, sql_log).map(Some)
}

// ============================================================================
// SECTION: Handle
// ============================================================================

/// Open handle to a v4 database.
#[derive(Debug)]
pub struct V4Db {
    /// Configured database name.
    name: String,
    /// Database file path.
    path: PathBuf,
    /// Connection, taken on close.
    connection: Mutex<Option<Connection>>,
    /// Test suites keyed by name.
    testsuite: BTreeMap<String, TestSuite>,
    /// Statement capture when echo is enabled.
    sql_log: Option<SqlLog>,
}

impl V4Db {
    /// Opens an existing database file and loads its test-suite catalog.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] when the file is missing, the schema version is
    /// wrong, or the catalog cannot be read.
    pub fn open(name: &str, path: &Path, sql_log: Option<SqlLog>) -> Result<Self, DbError> {
        if !path.is_file() {
            return Err(DbError::Missing(path.display().to_string()));
        }
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
        let connection =
            Connection::open_with_flags(path, flags).map_err(|err| DbError::Db(err.to_string()))?;
        connection
            .execute_batch("PRAGMA foreign_keys = ON;")
            .map_err(|err| DbError::Db(err.to_string()))?;
        connection.busy_timeout(BUSY_TIMEOUT).map_err(|err| DbError::Db(err.to_string()))?;
        let mut db = Self {
            name: name.to_string(),
            path: path.to_path_buf(),
            connection: Mutex::new(Some(connection)),
            testsuite: BTreeMap::new(),
            sql_log,
        };
        db.check_schema_version()?;
        db.testsuite = db.load_testsuites()?;
        tracing::debug!(database = name, suites = db.testsuite.len(), "opened database");
        Ok(db)
    }

    /// Returns the configured database name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the database file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the test-suite catalog keyed by suite name.
    #[must_use]
    pub const fn testsuite(&self) -> &BTreeMap<String, TestSuite> {
        &self.testsuite
    }

    /// Returns the statement capture, when echo is enabled.
    #[must_use]
    pub const fn sql_log(&self) -> Option<&SqlLog> {
        self.sql_log.as_ref()
    }

    /// Returns true once [`V4Db::close`] has run.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.connection.lock().map_or(true, |guard| guard.is_none())
    }

    /// Releases the connection. Calling it twice is harmless.
    pub fn close(&self) {
        let taken = self.connection.lock().ok().and_then(|mut guard| guard.take());
        if let Some(connection) = taken
            && let Err((_, err)) = connection.close()
        {
            tracing::warn!(database = %self.name, error = %err, "database close failed");
        }
    }

    // ------------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------------

    /// Lists the machines of a suite ordered by name.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] when the query fails.
    pub fn machines(&self, suite: &TestSuite) -> Result<Vec<Machine>, DbError> {
        let sql = format!(
            "SELECT ID, Name, Parameters FROM {} ORDER BY Name, ID LIMIT {MAX_LIST_ROWS}",
            suite.table("Machine")
        );
        self.query_all(&sql, &[], machine_from_row)
    }

    /// Fetches one machine.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] when the query fails.
    pub fn machine(&self, suite: &TestSuite, id: i64) -> Result<Option<Machine>, DbError> {
        let sql =
            format!("SELECT ID, Name, Parameters FROM {} WHERE ID = ?1", suite.table("Machine"));
        self.query_one(&sql, id, machine_from_row)
    }

    /// Lists runs submitted by a machine, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] when the query fails.
    pub fn runs_for_machine(&self, suite: &TestSuite, machine_id: i64) -> Result<Vec<Run>, DbError> {
        let sql = format!(
            "SELECT {RUN_COLUMNS} FROM {} WHERE MachineID = ?1 \
             ORDER BY StartTime DESC, ID DESC LIMIT {MAX_LIST_ROWS}",
            suite.table("Run")
        );
        self.query_all(&sql, &[machine_id], run_from_row)
    }

    /// Lists the most recent runs of a suite.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] when the query fails.
    pub fn recent_runs(&self, suite: &TestSuite, limit: usize) -> Result<Vec<Run>, DbError> {
        let limit = limit.min(MAX_LIST_ROWS);
        let sql = format!(
            "SELECT {RUN_COLUMNS} FROM {} ORDER BY StartTime DESC, ID DESC LIMIT {limit}",
            suite.table("Run")
        );
        self.query_all(&sql, &[], run_from_row)
    }

    /// Fetches one run.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] when the query fails.
    pub fn run(&self, suite: &TestSuite, id: i64) -> Result<Option<Run>, DbError> {
        let sql = format!("SELECT {RUN_COLUMNS} FROM {} WHERE ID = ?1", suite.table("Run"));
        self.query_one(&sql, id, run_from_row)
    }

    /// Fetches one order.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] when the query fails.
    pub fn order(&self, suite: &TestSuite, id: i64) -> Result<Option<Order>, DbError> {
        let sql = format!(
            "SELECT ID, llvm_project_revision FROM {} WHERE ID = ?1",
            suite.table("Order")
        );
        self.query_one(&sql, id, |row| {
            Ok(Order {
                id: row.get(0)?,
                llvm_project_revision: row.get(1)?,
            })
        })
    }

    /// Deletes a run. Returns whether a row was removed.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] when the statement fails.
    pub fn delete_run(&self, suite: &TestSuite, id: i64) -> Result<bool, DbError> {
        let sql = format!("DELETE FROM {} WHERE ID = ?1", suite.table("Run"));
        self.echo(&sql, &[id]);
        let guard = self.lock()?;
        let connection = guard.as_ref().ok_or(DbError::Closed)?;
        let removed =
            connection.execute(&sql, params![id]).map_err(|err| DbError::Db(err.to_string()))?;
        Ok(removed > 0)
    }

    // ------------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------------

    /// Verifies the `SchemaVersion` row.
    fn check_schema_version(&self) -> Result<(), DbError> {
        let sql = "SELECT Version FROM SchemaVersion WHERE Name = ?1";
        self.echo(sql, &[]);
        let guard = self.lock()?;
        let connection = guard.as_ref().ok_or(DbError::Closed)?;
        let version: Option<i64> = connection
            .query_row(sql, params![SCHEMA_NAME], |row| row.get(0))
            .optional()
            .map_err(|err| DbError::VersionMismatch(err.to_string()))?;
        match version {
            Some(SCHEMA_VERSION) => Ok(()),
            Some(other) => Err(DbError::VersionMismatch(format!(
                "expected schema {SCHEMA_VERSION}, found {other}"
            ))),
            None => Err(DbError::VersionMismatch("missing schema version".to_string())),
        }
    }

    /// Reads the test-suite catalog.
    fn load_testsuites(&self) -> Result<BTreeMap<String, TestSuite>, DbError> {
        let rows = self.query_all(
            "SELECT ID, Name, DBKeyName, Version FROM TestSuite ORDER BY Name",
            &[],
            |row| {
                Ok(TestSuite {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    db_key_name: row.get(2)?,
                    version: row.get(3)?,
                })
            },
        )?;
        let mut catalog = BTreeMap::new();
        for suite in rows {
            validate_db_key_name(&suite.db_key_name)
                .map_err(|err| DbError::Corrupt(err.to_string()))?;
            catalog.insert(suite.name.clone(), suite);
        }
        Ok(catalog)
    }

    /// Runs a query returning every mapped row.
    fn query_all<T>(
        &self,
        sql: &str,
        args: &[i64],
        map: impl FnMut(&Row<'_>) -> rusqlite::Result<T>,
    ) -> Result<Vec<T>, DbError> {
        self.echo(sql, args);
        let guard = self.lock()?;
        let connection = guard.as_ref().ok_or(DbError::Closed)?;
        let mut statement = connection.prepare(sql).map_err(|err| DbError::Db(err.to_string()))?;
        let rows = statement
            .query_map(rusqlite::params_from_iter(args.iter()), map)
            .map_err(|err| DbError::Db(err.to_string()))?;
        rows.collect::<Result<Vec<_>, _>>().map_err(map_row_error)
    }

    /// Runs a query keyed by a single id.
    fn query_one<T>(
        &self,
        sql: &str,
        id: i64,
        map: impl FnOnce(&Row<'_>) -> rusqlite::Result<T>,
    ) -> Result<Option<T>, DbError> {
        self.echo(sql, &[id]);
        let guard = self.lock()?;
        let connection = guard.as_ref().ok_or(DbError::Closed)?;
        connection.query_row(sql, params![id], map).optional().map_err(map_row_error)
    }

    /// Locks the connection slot.
    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Option<Connection>>, DbError> {
        self.connection.lock().map_err(|_| DbError::Db("connection lock poisoned".to_string()))
    }

    /// Records a statement when echo is enabled.
    fn echo(&self, sql: &str, args: &[i64]) {
        let Some(log) = &self.sql_log else {
            return;
        };
        let statement = if args.is_empty() {
            sql.to_string()
        } else {
            let rendered = args.iter().map(i64::to_string).collect::<Vec<_>>().join(", ");
            format!("{sql} [{rendered}]")
        };
        tracing::debug!(target: "lnt_db::sql", database = %self.name, "{statement}");
        log.record(statement);
    }
}

impl Drop for V4Db {
    fn drop(&mut self) {
        self.close();
    }
}

// ============================================================================
// SECTION: Row Mapping
// ============================================================================

/// Column list shared by run queries.
const RUN_COLUMNS: &str = "ID, MachineID, OrderID, ImportedFrom, StartTime, EndTime, Parameters";

/// Decodes a machine row.
fn machine_from_row(row: &Row<'_>) -> rusqlite::Result<Machine> {
    Ok(Machine {
        id: row.get(0)?,
        name: row.get(1)?,
        parameters: parameters_from_row(row, 2)?,
    })
}

/// Decodes a run row selected with [`RUN_COLUMNS`].
fn run_from_row(row: &Row<'_>) -> rusqlite::Result<Run> {
    Ok(Run {
        id: row.get(0)?,
        machine_id: row.get(1)?,
        order_id: row.get(2)?,
        imported_from: row.get(3)?,
        start_time: row.get(4)?,
        end_time: row.get(5)?,
        parameters: parameters_from_row(row, 6)?,
    })
}

/// Decodes a JSON object column.
fn parameters_from_row(row: &Row<'_>, index: usize) -> rusqlite::Result<Map<String, Value>> {
    let raw: String = row.get(index)?;
    match serde_json::from_str::<Value>(&raw) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) | Err(_) => Err(rusqlite::Error::FromSqlConversionFailure(
            index,
            rusqlite::types::Type::Text,
            "parameters must be a json object".into(),
        )),
    }
}

/// Maps row decoding failures to corruption, everything else to engine errors.
fn map_row_error(err: rusqlite::Error) -> DbError {
    match err {
        rusqlite::Error::FromSqlConversionFailure(..) | rusqlite::Error::InvalidColumnType(..) => {
            DbError::Corrupt(err.to_string())
        }
        other => DbError::Db(other.to_string()),
    }
}
