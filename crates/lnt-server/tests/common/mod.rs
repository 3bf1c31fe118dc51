// crates/lnt-server/tests/common/mod.rs
// ============================================================================
// Module: Common Test Fixtures
// Description: Instance directories, seeded databases, and request helpers.
// Purpose: Share fixtures across the server integration tests.
// Dependencies: lnt-config, lnt-db, lnt-server, rusqlite, tower
// ============================================================================

//! ## Overview
//! Builds a temporary LNT instance with a seeded `default` database, an
//! empty `other` database, and an unreadable `broken` database, then drives
//! the application router in-process.

#![allow(dead_code, reason = "Shared test helpers may be unused in some cases.")]

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::path::Path;

use axum::Router;
use axum::body::Body;
use axum::http::HeaderMap;
use axum::http::Request;
use axum::http::StatusCode;
use http_body_util::BodyExt;
use lnt_config::Instance;
use lnt_db::TestSuiteSpec;
use lnt_db::create_database;
use lnt_server::App;
use rusqlite::Connection;
use rusqlite::params;
use tempfile::TempDir;
use tower::ServiceExt;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// API token configured by [`write_instance`].
pub const API_TOKEN: &str = "token-123";

// ============================================================================
// SECTION: Fixtures
// ============================================================================

/// Writes an instance directory and returns it.
pub fn write_instance(url_prefix: &str, with_token: bool) -> TempDir {
    let dir = TempDir::new().expect("tempdir");
    let token = if with_token { format!("api_auth_token = \"{API_TOKEN}\"\n") } else { String::new() };
    let config = format!(
        "name = \"Test LNT\"\n\
         secret_key = \"test-secret\"\n\
         {token}\
         [server]\n\
         url_prefix = \"{url_prefix}\"\n\
         [databases.default]\n\
         path = \"data/lnt.db\"\n\
         [databases.other]\n\
         path = \"data/other.db\"\n\
         [databases.broken]\n\
         path = \"data/broken.db\"\n"
    );
    fs::write(dir.path().join("lnt.toml"), config).expect("write config");
    let data = dir.path().join("data");
    create_database(&data.join("lnt.db"), &[TestSuiteSpec::new("nts", "NT")]).expect("default db");
    create_database(&data.join("other.db"), &[TestSuiteSpec::new("compile", "compile")])
        .expect("other db");
    fs::write(data.join("broken.db"), b"this is not a database file at all").expect("broken db");
    seed(&data.join("lnt.db"));
    dir
}

/// Inserts two machines, one order, and three runs.
fn seed(path: &Path) {
    let connection = Connection::open(path).expect("open seed connection");
    connection
        .execute_batch(
            "INSERT INTO NT_Machine (ID, Name, Parameters) \
                 VALUES (1, 'lab.x86_64-linux', '{\"cpu\":\"x86_64\"}');
             INSERT INTO NT_Machine (ID, Name) VALUES (2, 'lab.arm64-darwin');
             INSERT INTO NT_Order (ID, llvm_project_revision) VALUES (7, 'r1234');",
        )
        .expect("seed machines");
    for (id, machine, start) in
        [(10, 1, "2024-01-01 10:00:00"), (11, 1, "2024-01-02 10:00:00"), (12, 2, "2024-01-03 10:00:00")]
    {
        connection
            .execute(
                "INSERT INTO NT_Run (ID, MachineID, OrderID, StartTime, EndTime) \
                 VALUES (?1, ?2, 7, ?3, ?3)",
                params![id, machine, start],
            )
            .expect("seed run");
    }
}

/// Loads the instance and builds its router.
pub fn router_for(dir: &TempDir) -> Router {
    let instance = Instance::from_path(dir.path()).expect("instance");
    let app = App::create_with_instance(instance).expect("app");
    app.router().expect("router")
}

// ============================================================================
// SECTION: Requests
// ============================================================================

/// Response parts collected for assertions.
pub struct TestResponse {
    /// Status code.
    pub status: StatusCode,
    /// Response headers.
    pub headers: HeaderMap,
    /// Body as text.
    pub body: String,
}

impl TestResponse {
    /// Returns a header as text.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }

    /// Parses the body as JSON.
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_str(&self.body).expect("json body")
    }
}

/// Sends a request through the router.
pub async fn send(router: &Router, request: Request<Body>) -> TestResponse {
    let response = router.clone().oneshot(request).await.expect("router response");
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = response.into_body().collect().await.expect("body").to_bytes();
    TestResponse {
        status,
        headers,
        body: String::from_utf8_lossy(&bytes).into_owned(),
    }
}

/// Sends a `GET` request.
pub async fn get(router: &Router, uri: &str) -> TestResponse {
    send(router, Request::get(uri).body(Body::empty()).expect("request")).await
}
