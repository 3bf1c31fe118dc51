// crates/lnt-server/src/request.rs
// ============================================================================
// Module: LNT Request Context
// Description: Per-request state with lazily opened database and test suite.
// Purpose: Let handlers reach the addressed database without reopening it.
// Dependencies: lnt-config, lnt-db, percent-encoding, tokio, url
// ============================================================================

//! ## Overview
//! Every request gets one [`RequestContext`], created by the lifecycle
//! middleware from the request path and stored in the request extensions.
//! The database handle and the test suite are resolved on first use and
//! reused for the rest of the request; the middleware closes the handle once
//! the response is ready.
//!
//! Paths are matched as `[/prefix][/api][/db_<name>][/v4/<suite>]/...`. A
//! path without a `db_` segment addresses the `default` database. Segments
//! are percent-decoded before they are matched against configured names.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::borrow::Cow;
use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use lnt_config::Instance;
use lnt_db::DbError;
use lnt_db::SqlLog;
use lnt_db::TestSuite;
use lnt_db::V4Db;
use lnt_db::get_database;
use percent_encoding::percent_decode_str;
use tokio::sync::OnceCell;
use url::form_urlencoded;

use crate::error::ServerError;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Database addressed by paths without a `db_` segment.
pub const DEFAULT_DB_NAME: &str = "default";
/// Prefix marking a database path segment.
pub const DB_SEGMENT_PREFIX: &str = "db_";
/// Query argument enabling SQL capture.
const DB_LOG_ARG: &str = "db_log";

// ============================================================================
// SECTION: Route Target
// ============================================================================

/// Database and test suite addressed by a request path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteTarget {
    /// Database name.
    pub db_name: String,
    /// Test suite name, when the path has a `v4/<suite>` part.
    pub testsuite_name: Option<String>,
}

impl RouteTarget {
    /// Parses the request path below `prefix`.
    #[must_use]
    pub fn from_path(path: &str, prefix: &str) -> Self {
        let rest = if prefix.is_empty() {
            path
        } else {
            path.strip_prefix(prefix).unwrap_or(path)
        };
        let mut segments =
            rest.split('/').filter(|segment| !segment.is_empty()).map(decode_segment).peekable();
        if segments.peek().is_some_and(|segment| *segment == "api") {
            segments.next();
        }
        let db_name = match segments.peek().and_then(|segment| db_segment_name(segment)) {
            Some(name) => {
                let name = name.to_string();
                segments.next();
                name
            }
            None => DEFAULT_DB_NAME.to_string(),
        };
        let testsuite_name = match (segments.next(), segments.next()) {
            (Some(v4), Some(suite)) if v4 == "v4" => Some(suite.into_owned()),
            _ => None,
        };
        Self {
            db_name,
            testsuite_name,
        }
    }
}

/// Percent-decodes one path segment. Invalid UTF-8 is replaced.
fn decode_segment(segment: &str) -> Cow<'_, str> {
    percent_decode_str(segment).decode_utf8_lossy()
}

/// Returns the database name carried by a `db_<name>` segment.
#[must_use]
pub fn db_segment_name(segment: &str) -> Option<&str> {
    segment.strip_prefix(DB_SEGMENT_PREFIX).filter(|name| !name.is_empty())
}

/// Returns true when the form-encoded query string carries a non-empty
/// `db_log` argument.
#[must_use]
pub fn db_log_requested(query: Option<&str>) -> bool {
    query.is_some_and(|query| {
        form_urlencoded::parse(query.as_bytes())
            .any(|(key, value)| key == DB_LOG_ARG && !value.is_empty())
    })
}

// ============================================================================
// SECTION: Request Context
// ============================================================================

/// Per-request state.
///
/// # Invariants
/// - The database is opened at most once per context.
/// - The test suite is resolved at most once per context.
#[derive(Debug)]
pub struct RequestContext {
    /// Construction time.
    request_time: Instant,
    /// Served instance.
    instance: Arc<Instance>,
    /// Addressed database and suite.
    target: RouteTarget,
    /// SQL capture, present when `db_log` was requested.
    db_log: Option<SqlLog>,
    /// Lazily opened database.
    db: OnceCell<Arc<V4Db>>,
    /// Lazily resolved test suite.
    testsuite: OnceCell<TestSuite>,
}

impl RequestContext {
    /// Creates the context for one request.
    #[must_use]
    pub fn new(instance: Arc<Instance>, target: RouteTarget, echo: bool) -> Self {
        Self {
            request_time: Instant::now(),
            instance,
            target,
            db_log: echo.then(SqlLog::new),
            db: OnceCell::new(),
            testsuite: OnceCell::new(),
        }
    }

    /// Time elapsed since the request started.
    #[must_use]
    pub fn elapsed_time(&self) -> Duration {
        self.request_time.elapsed()
    }

    /// Addressed database name.
    #[must_use]
    pub fn db_name(&self) -> &str {
        &self.target.db_name
    }

    /// Addressed test suite name.
    #[must_use]
    pub fn testsuite_name(&self) -> Option<&str> {
        self.target.testsuite_name.as_deref()
    }

    /// Served instance.
    #[must_use]
    pub fn instance(&self) -> &Instance {
        &self.instance
    }

    /// Returns the request's database, opening it on first use.
    ///
    /// # Errors
    ///
    /// Returns 404 when no database of that name is configured and 500 when
    /// it cannot be opened.
    pub async fn get_db(&self) -> Result<Arc<V4Db>, ServerError> {
        self.db.get_or_try_init(|| self.open_db()).await.cloned()
    }

    /// Returns the request's test suite, resolving it on first use.
    ///
    /// # Errors
    ///
    /// Returns 404 when the path names no suite or the database has no suite
    /// of that name.
    pub async fn get_testsuite(&self) -> Result<TestSuite, ServerError> {
        let Some(name) = self.testsuite_name() else {
            return Err(ServerError::not_found("no test suite in request"));
        };
        self.testsuite
            .get_or_try_init(|| async {
                let db = self.get_db().await?;
                db.testsuite()
                    .get(name)
                    .cloned()
                    .ok_or_else(|| ServerError::not_found(format!("unknown test suite '{name}'")))
            })
            .await
            .cloned()
    }

    /// Runs a blocking query against the request's database.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError`] when the database cannot be opened or the
    /// query fails.
    pub async fn query<T, F>(&self, query: F) -> Result<T, ServerError>
    where
        T: Send + 'static,
        F: FnOnce(&V4Db) -> Result<T, DbError> + Send + 'static,
    {
        let db = self.get_db().await?;
        tokio::task::spawn_blocking(move || query(&db))
            .await
            .map_err(|err| ServerError::internal(&format!("query task failed: {err}")))?
            .map_err(ServerError::from)
    }

    /// Captured SQL, when `db_log` was requested.
    #[must_use]
    pub fn db_log(&self) -> Option<String> {
        self.db_log.as_ref().map(SqlLog::contents)
    }

    /// Returns true once the database has been opened.
    #[must_use]
    pub fn db_opened(&self) -> bool {
        self.db.initialized()
    }

    /// Closes the database when it was opened.
    pub fn close(&self) {
        if let Some(db) = self.db.get() {
            db.close();
        }
    }

    /// Opens the addressed database off the async runtime.
    async fn open_db(&self) -> Result<Arc<V4Db>, ServerError> {
        let instance = Arc::clone(&self.instance);
        let name = self.target.db_name.clone();
        let sql_log = self.db_log.clone();
        let opened = tokio::task::spawn_blocking(move || {
            get_database(instance.config(), &name, sql_log)
        })
        .await
        .map_err(|err| ServerError::internal(&format!("database open task failed: {err}")))?;
        match opened {
            Ok(Some(db)) => Ok(Arc::new(db)),
            Ok(None) => {
                Err(ServerError::not_found(format!("unknown database '{}'", self.target.db_name)))
            }
            Err(err) => Err(ServerError::internal(&format!(
                "unable to open database '{}': {err}",
                self.target.db_name
            ))),
        }
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests;
