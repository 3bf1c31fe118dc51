// crates/lnt-server/src/session.rs
// ============================================================================
// Module: LNT Session Cookies
// Description: Signing key derivation and the baseline session cookie.
// Purpose: Keep per-user view settings in cookies signed with the secret key.
// Dependencies: axum-extra, sha2
// ============================================================================

//! ## Overview
//! The configured `secret_key` is stretched with SHA-512 into the 64-byte
//! key the signed cookie jar needs. The only session value is the baseline
//! run chosen per database and test suite.

// ============================================================================
// SECTION: Imports
// ============================================================================

use axum_extra::extract::cookie::Cookie;
use axum_extra::extract::cookie::Key;
use axum_extra::extract::cookie::SameSite;
use axum_extra::extract::cookie::SignedCookieJar;
use sha2::Digest;
use sha2::Sha512;

use crate::error::AppError;

// ============================================================================
// SECTION: Key Derivation
// ============================================================================

/// Derives the cookie signing key from the configured secret.
///
/// # Errors
///
/// Returns [`AppError::Config`] when the derived key is rejected.
pub fn signing_key(secret: &str) -> Result<Key, AppError> {
    let digest = Sha512::digest(secret.as_bytes());
    Key::try_from(digest.as_slice())
        .map_err(|err| AppError::Config(format!("invalid signing key: {err}")))
}

// ============================================================================
// SECTION: Baseline
// ============================================================================

/// Cookie name holding the baseline run of a database's test suite.
#[must_use]
pub fn baseline_key(db: &str, suite: &str) -> String {
    format!("baseline-{db}-{suite}")
}

/// Builds the signed-jar cookie recording `run_id` as the baseline.
#[must_use]
pub fn baseline_cookie(prefix: &str, db: &str, suite: &str, run_id: i64) -> Cookie<'static> {
    let path = if prefix.is_empty() { "/".to_string() } else { prefix.to_string() };
    Cookie::build((baseline_key(db, suite), run_id.to_string()))
        .path(path)
        .http_only(true)
        .same_site(SameSite::Lax)
        .build()
}

/// Reads the baseline run id, ignoring cookies that fail verification.
#[must_use]
pub fn read_baseline(jar: &SignedCookieJar, db: &str, suite: &str) -> Option<i64> {
    jar.get(&baseline_key(db, suite)).and_then(|cookie| cookie.value().parse().ok())
}
