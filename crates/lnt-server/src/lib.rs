// crates/lnt-server/src/lib.rs
// ============================================================================
// Module: LNT Server
// Description: Web application for browsing LNT v4 databases.
// Purpose: Provide the application object, request lifecycle, and routes.
// Dependencies: axum, lnt-config, lnt-db, minijinja, tracing
// ============================================================================

//! ## Overview
//! The server resolves each request's database and test suite lazily through
//! a per-request context, renders pages from a strict template environment,
//! and exposes a small JSON API. [`App`] ties the pieces together.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod api;
pub mod app;
pub mod error;
pub mod logging;
pub mod middleware;
pub mod request;
pub mod session;
pub mod templates;
pub mod views;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use app::App;
pub use app::AppState;
pub use error::ApiError;
pub use error::AppError;
pub use error::ServerError;
pub use logging::LoggingError;
pub use logging::MemoryLog;
pub use logging::RotatingFileWriter;
pub use request::RequestContext;
pub use request::RouteTarget;
pub use templates::create_template_environment;
