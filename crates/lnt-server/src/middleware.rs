// crates/lnt-server/src/middleware.rs
// ============================================================================
// Module: LNT Middleware
// Description: Root trailing-slash redirect and the per-request lifecycle.
// Purpose: Create, expose, and close the request context around handlers.
// Dependencies: axum, tracing
// ============================================================================

//! ## Overview
//! [`root_slash_patch`] redirects a request for the bare mount point to the
//! mount point with a trailing `/`. [`request_lifecycle`] builds the
//! [`RequestContext`] for the request, hands it to the handler through the
//! request extensions, then closes the database and logs the request.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use axum::extract::Request;
use axum::extract::State;
use axum::http::StatusCode;
use axum::http::header::LOCATION;
use axum::middleware::Next;
use axum::response::IntoResponse;
use axum::response::Response;

use crate::app::AppState;
use crate::request::RequestContext;
use crate::request::RouteTarget;
use crate::request::db_log_requested;

// ============================================================================
// SECTION: Root Slash
// ============================================================================

/// Redirects `<prefix>` to `<prefix>/`, keeping the query string.
pub async fn root_slash_patch(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let prefix = state.url_prefix();
    if !prefix.is_empty() && request.uri().path() == prefix {
        let location = match request.uri().query() {
            Some(query) => format!("{prefix}/?{query}"),
            None => format!("{prefix}/"),
        };
        return (StatusCode::FOUND, [(LOCATION, location)]).into_response();
    }
    next.run(request).await
}

// ============================================================================
// SECTION: Request Lifecycle
// ============================================================================

/// Wraps a handler with a fresh [`RequestContext`].
pub async fn request_lifecycle(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let target = RouteTarget::from_path(request.uri().path(), state.url_prefix());
    let echo = db_log_requested(request.uri().query());
    let context = Arc::new(RequestContext::new(Arc::clone(state.instance()), target, echo));
    request.extensions_mut().insert(Arc::clone(&context));
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    let response = next.run(request).await;

    context.close();
    let elapsed_ms = context.elapsed_time().as_secs_f64() * 1000.0;
    tracing::debug!(
        method = %method,
        path = %path,
        status = response.status().as_u16(),
        elapsed_ms,
        "request complete"
    );
    response
}
