// crates/lnt-server/src/api.rs
// ============================================================================
// Module: LNT REST API
// Description: JSON resources for machines, runs, and orders.
// Purpose: Register the `/api/db_<db>/v4/<suite>/` resources.
// Dependencies: axum, axum-extra, serde_json, subtle
// ============================================================================

//! ## Overview
//! Read endpoints are open. Deleting a run requires an `AuthToken` header
//! equal to the configured `api_auth_token`; when no token is configured,
//! deletion is always refused. Failures use the JSON error envelope from
//! [`ApiError`], including malformed path parameters and unknown resources.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use axum::Extension;
use axum::Json;
use axum::Router;
use axum::extract::Path;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::routing::get;
use axum_extra::extract::WithRejection;
use lnt_config::LntConfig;
use serde::Deserialize;
use serde_json::Value;
use serde_json::json;
use subtle::ConstantTimeEq;

use crate::app::AppState;
use crate::error::ApiError;
use crate::error::ServerError;
use crate::request::RequestContext;
use crate::request::db_segment_name;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Header carrying the API token.
pub const AUTH_TOKEN_HEADER: &str = "AuthToken";

// ============================================================================
// SECTION: Routes
// ============================================================================

/// Registers the REST resources below `<prefix>/api`.
pub fn load_api_resources(prefix: &str) -> Router<AppState> {
    let base = "/{db}/v4/{suite}";
    let api = Router::new()
        .route(&format!("{base}/machines"), get(machines))
        .route(&format!("{base}/machines/{{id}}"), get(machine))
        .route(&format!("{base}/runs/{{id}}"), get(run).delete(delete_run))
        .route(&format!("{base}/orders/{{id}}"), get(order))
        .fallback(unknown_resource);
    Router::new().nest(&format!("{prefix}/api"), api)
}

/// Path extractor whose rejections use the JSON envelope.
type ApiPath<T> = WithRejection<Path<T>, ApiError>;

/// Path parameters of collection resources.
#[derive(Debug, Deserialize)]
struct DbParams {
    /// `db_<name>` segment.
    db: String,
}

/// Path parameters of item resources.
#[derive(Debug, Deserialize)]
struct ItemParams {
    /// `db_<name>` segment.
    db: String,
    /// Row identifier.
    id: i64,
}

/// Rejects a database segment without the `db_` prefix.
fn check_db_segment(segment: &str) -> Result<(), ApiError> {
    if db_segment_name(segment).is_none() {
        return Err(ServerError::not_found(format!("no resource at '{segment}'")).into());
    }
    Ok(())
}

/// Checks the `AuthToken` header against the configured token.
fn authorize(config: &LntConfig, headers: &HeaderMap) -> Result<(), ApiError> {
    let Some(expected) = config.api_auth_token.as_deref() else {
        return Err(ServerError::unauthorized("api authentication is not configured").into());
    };
    let provided = headers
        .get(AUTH_TOKEN_HEADER)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| ServerError::unauthorized("missing AuthToken header"))?;
    if bool::from(provided.as_bytes().ct_eq(expected.as_bytes())) {
        Ok(())
    } else {
        Err(ServerError::unauthorized("invalid AuthToken").into())
    }
}

// ============================================================================
// SECTION: Handlers
// ============================================================================

/// Fallback for unmatched paths below `/api`.
async fn unknown_resource() -> ApiError {
    ServerError::not_found("no such api resource").into()
}

/// `GET machines`
async fn machines(
    Extension(request): Extension<Arc<RequestContext>>,
    WithRejection(Path(params), _): ApiPath<DbParams>,
) -> Result<Json<Value>, ApiError> {
    check_db_segment(&params.db)?;
    let suite = request.get_testsuite().await?;
    let machines = request.query(move |db| db.machines(&suite)).await?;
    Ok(Json(json!({ "machines": machines })))
}

/// `GET machines/<id>`: the machine and its runs.
async fn machine(
    Extension(request): Extension<Arc<RequestContext>>,
    WithRejection(Path(params), _): ApiPath<ItemParams>,
) -> Result<Json<Value>, ApiError> {
    check_db_segment(&params.db)?;
    let suite = request.get_testsuite().await?;
    let id = params.id;
    let found = request
        .query(move |db| {
            let Some(machine) = db.machine(&suite, id)? else {
                return Ok(None);
            };
            let runs = db.runs_for_machine(&suite, id)?;
            Ok(Some((machine, runs)))
        })
        .await?;
    let (machine, runs) =
        found.ok_or_else(|| ServerError::not_found(format!("no machine {id}")))?;
    Ok(Json(json!({ "machine": machine, "runs": runs })))
}

/// `GET runs/<id>`: the run with its machine and order.
async fn run(
    Extension(request): Extension<Arc<RequestContext>>,
    WithRejection(Path(params), _): ApiPath<ItemParams>,
) -> Result<Json<Value>, ApiError> {
    check_db_segment(&params.db)?;
    let suite = request.get_testsuite().await?;
    let id = params.id;
    let found = request
        .query(move |db| {
            let Some(run) = db.run(&suite, id)? else {
                return Ok(None);
            };
            let machine = db.machine(&suite, run.machine_id)?;
            let order = db.order(&suite, run.order_id)?;
            Ok(Some((run, machine, order)))
        })
        .await?;
    let (run, machine, order) =
        found.ok_or_else(|| ServerError::not_found(format!("no run {id}")))?;
    Ok(Json(json!({ "run": run, "machine": machine, "order": order })))
}

/// `DELETE runs/<id>`: requires the `AuthToken` header.
async fn delete_run(
    State(state): State<AppState>,
    Extension(request): Extension<Arc<RequestContext>>,
    WithRejection(Path(params), _): ApiPath<ItemParams>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    authorize(state.config(), &headers)?;
    check_db_segment(&params.db)?;
    let suite = request.get_testsuite().await?;
    let id = params.id;
    let deleted = request.query(move |db| db.delete_run(&suite, id)).await?;
    if !deleted {
        return Err(ServerError::not_found(format!("no run {id}")).into());
    }
    tracing::info!(database = request.db_name(), run = id, "run deleted");
    Ok(Json(json!({ "deleted": id })))
}

/// `GET orders/<id>`
async fn order(
    Extension(request): Extension<Arc<RequestContext>>,
    WithRejection(Path(params), _): ApiPath<ItemParams>,
) -> Result<Json<Value>, ApiError> {
    check_db_segment(&params.db)?;
    let suite = request.get_testsuite().await?;
    let id = params.id;
    let order = request
        .query(move |db| db.order(&suite, id))
        .await?
        .ok_or_else(|| ServerError::not_found(format!("no order {id}")))?;
    Ok(Json(json!({ "order": order })))
}
