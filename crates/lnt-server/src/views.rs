// crates/lnt-server/src/views.rs
// ============================================================================
// Module: LNT Frontend Views
// Description: HTML pages for databases, test suites, machines, and runs.
// Purpose: Register the frontend routes under the configured mount point.
// Dependencies: axum, axum-extra, minijinja
// ============================================================================

//! ## Overview
//! Every suite page exists twice: under `/v4/<suite>/` for the `default`
//! database and under `/db_<name>/v4/<suite>/` for any configured database.
//! The database and suite are resolved through the [`RequestContext`]; the
//! path parameters only carry identifiers.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use axum::Extension;
use axum::Router;
use axum::extract::Path;
use axum::extract::State;
use axum::response::Html;
use axum::response::Redirect;
use axum::routing::get;
use axum_extra::extract::cookie::SignedCookieJar;
use lnt_db::Machine;
use minijinja::context;
use serde::Deserialize;

use crate::app::AppState;
use crate::error::ServerError;
use crate::request::RequestContext;
use crate::request::db_segment_name;
use crate::session::baseline_cookie;
use crate::session::read_baseline;
use crate::templates::v4_url;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Runs listed on a suite overview.
const RECENT_RUN_LIMIT: usize = 25;

// ============================================================================
// SECTION: Routes
// ============================================================================

/// Builds the frontend routes below `prefix`.
pub fn frontend(prefix: &str) -> Router<AppState> {
    let path = |suffix: &str| format!("{prefix}{suffix}");
    let mut router = Router::new()
        .route(&path("/"), get(index))
        .route(&path("/log"), get(log_view))
        .route(&path("/{db}/"), get(db_index));
    for base in ["/v4/{suite}", "/{db}/v4/{suite}"] {
        router = router
            .route(&path(&format!("{base}/")), get(v4_overview))
            .route(&path(&format!("{base}/machine/{{id}}")), get(v4_machine))
            .route(&path(&format!("{base}/run/{{id}}")), get(v4_run))
            .route(&path(&format!("{base}/set_baseline/{{id}}")), get(v4_set_baseline));
    }
    router
}

/// Path parameters of database-scoped pages.
#[derive(Debug, Deserialize)]
struct DbParams {
    /// `db_<name>` segment, absent for the default database.
    db: Option<String>,
}

/// Path parameters of item pages.
#[derive(Debug, Deserialize)]
struct ItemParams {
    /// `db_<name>` segment, absent for the default database.
    db: Option<String>,
    /// Row identifier.
    id: i64,
}

/// Rejects a first segment that is not `db_<name>`.
fn check_db_segment(segment: Option<&str>) -> Result<(), ServerError> {
    match segment {
        Some(segment) if db_segment_name(segment).is_none() => {
            Err(ServerError::not_found(format!("no page at '{segment}'")))
        }
        _ => Ok(()),
    }
}

// ============================================================================
// SECTION: Handlers
// ============================================================================

/// Fallback for unmatched paths.
pub async fn not_found() -> ServerError {
    ServerError::not_found("page not found")
}

/// `GET /`: configured databases.
async fn index(
    State(state): State<AppState>,
    Extension(request): Extension<Arc<RequestContext>>,
) -> Result<Html<String>, ServerError> {
    let databases = state.config().database_names();
    state.render("index.html", &request, context! { databases })
}

/// `GET /log`: the in-memory log.
async fn log_view(
    State(state): State<AppState>,
    Extension(request): Extension<Arc<RequestContext>>,
) -> Result<Html<String>, ServerError> {
    let memory = state.memory_log();
    let lines = memory.map(|log| log.lines()).unwrap_or_default();
    state.render("log.html", &request, context! { enabled => memory.is_some(), lines })
}

/// `GET /db_<db>/`: test suites of a database.
async fn db_index(
    State(state): State<AppState>,
    Extension(request): Extension<Arc<RequestContext>>,
    Path(params): Path<DbParams>,
) -> Result<Html<String>, ServerError> {
    check_db_segment(params.db.as_deref())?;
    let db = request.get_db().await?;
    let suites: Vec<_> = db.testsuite().values().cloned().collect();
    state.render("db_index.html", &request, context! { suites })
}

/// `GET .../v4/<suite>/`: machines, recent runs, and the baseline.
async fn v4_overview(
    State(state): State<AppState>,
    Extension(request): Extension<Arc<RequestContext>>,
    Path(params): Path<DbParams>,
    jar: SignedCookieJar,
) -> Result<Html<String>, ServerError> {
    check_db_segment(params.db.as_deref())?;
    let suite = request.get_testsuite().await?;
    let machines = {
        let suite = suite.clone();
        request.query(move |db| db.machines(&suite)).await?
    };
    let runs = {
        let suite = suite.clone();
        request.query(move |db| db.recent_runs(&suite, RECENT_RUN_LIMIT)).await?
    };
    let baseline = read_baseline(&jar, request.db_name(), &suite.name);
    state.render("v4_overview.html", &request, context! { suite, machines, runs, baseline })
}

/// `GET .../v4/<suite>/machine/<id>`: one machine and its runs.
async fn v4_machine(
    State(state): State<AppState>,
    Extension(request): Extension<Arc<RequestContext>>,
    Path(params): Path<ItemParams>,
) -> Result<Html<String>, ServerError> {
    check_db_segment(params.db.as_deref())?;
    let suite = request.get_testsuite().await?;
    let id = params.id;
    let (machine, runs) = {
        let suite = suite.clone();
        request
            .query(move |db| {
                let machine = db.machine(&suite, id)?;
                let runs = match &machine {
                    Some(_) => db.runs_for_machine(&suite, id)?,
                    None => Vec::new(),
                };
                Ok((machine, runs))
            })
            .await?
    };
    let machine = machine.ok_or_else(|| ServerError::not_found(format!("no machine {id}")))?;
    state.render("v4_machine.html", &request, context! { suite, machine, runs })
}

/// `GET .../v4/<suite>/run/<id>`: one run with its machine and order.
async fn v4_run(
    State(state): State<AppState>,
    Extension(request): Extension<Arc<RequestContext>>,
    Path(params): Path<ItemParams>,
    jar: SignedCookieJar,
) -> Result<Html<String>, ServerError> {
    check_db_segment(params.db.as_deref())?;
    let suite = request.get_testsuite().await?;
    let id = params.id;
    let found = {
        let suite = suite.clone();
        request
            .query(move |db| {
                let Some(run) = db.run(&suite, id)? else {
                    return Ok(None);
                };
                let machine: Option<Machine> = db.machine(&suite, run.machine_id)?;
                let order = db.order(&suite, run.order_id)?;
                Ok(Some((run, machine, order)))
            })
            .await?
    };
    let (run, machine, order) =
        found.ok_or_else(|| ServerError::not_found(format!("no run {id}")))?;
    let is_baseline = read_baseline(&jar, request.db_name(), &suite.name) == Some(run.id);
    state.render(
        "v4_run.html",
        &request,
        context! { suite, run, machine, order, is_baseline },
    )
}

/// `GET .../v4/<suite>/set_baseline/<id>`: stores the baseline run in the
/// session and returns to the overview.
async fn v4_set_baseline(
    State(state): State<AppState>,
    Extension(request): Extension<Arc<RequestContext>>,
    Path(params): Path<ItemParams>,
    jar: SignedCookieJar,
) -> Result<(SignedCookieJar, Redirect), ServerError> {
    check_db_segment(params.db.as_deref())?;
    let suite = request.get_testsuite().await?;
    let id = params.id;
    let run = {
        let suite = suite.clone();
        request.query(move |db| db.run(&suite, id)).await?
    };
    if run.is_none() {
        return Err(ServerError::not_found(format!("no run {id}")));
    }
    let db_name = request.db_name();
    let cookie = baseline_cookie(state.url_prefix(), db_name, &suite.name, id);
    tracing::debug!(database = db_name, suite = %suite.name, run = id, "baseline set");
    let overview = v4_url(state.url_prefix(), db_name, &suite.name, "");
    Ok((jar.add(cookie), Redirect::to(&overview)))
}
