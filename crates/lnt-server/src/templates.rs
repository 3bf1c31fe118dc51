// crates/lnt-server/src/templates.rs
// ============================================================================
// Module: LNT Template Environment
// Description: Bundled templates, filters, and globals for page rendering.
// Purpose: Build the strict template environment used by the frontend.
// Dependencies: minijinja, percent-encoding, time
// ============================================================================

//! ## Overview
//! [`create_template_environment`] creates (or extends) a `minijinja`
//! environment with the LNT filters and URL helpers. Undefined variables are
//! errors, so every page context must supply what its template reads.
//!
//! The URL helpers read the `url_prefix` global, which the application sets
//! when it loads its configuration. Database and suite names are
//! percent-encoded as path segments.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::Duration;

use minijinja::Environment;
use minijinja::Error;
use minijinja::ErrorKind;
use minijinja::HtmlEscape;
use minijinja::State;
use minijinja::UndefinedBehavior;
use minijinja::Value;
use percent_encoding::AsciiSet;
use percent_encoding::CONTROLS;
use percent_encoding::utf8_percent_encode;
use time::OffsetDateTime;
use time::PrimitiveDateTime;
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;

use crate::error::AppError;
use crate::request::DEFAULT_DB_NAME;
use crate::session::baseline_key;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Templates compiled into the binary.
const TEMPLATES: &[(&str, &str)] = &[
    ("layout.html", include_str!("../templates/layout.html")),
    ("index.html", include_str!("../templates/index.html")),
    ("db_index.html", include_str!("../templates/db_index.html")),
    ("v4_overview.html", include_str!("../templates/v4_overview.html")),
    ("v4_machine.html", include_str!("../templates/v4_machine.html")),
    ("v4_run.html", include_str!("../templates/v4_run.html")),
    ("log.html", include_str!("../templates/log.html")),
];

/// Display format for timestamps.
const USER_TIME_FORMAT: &[BorrowedFormatItem<'static>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");

/// Bytes escaped in a single URL path segment.
const PATH_SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// Global holding the mount point used by the URL helpers.
pub const URL_PREFIX_GLOBAL: &str = "url_prefix";

// ============================================================================
// SECTION: Environment
// ============================================================================

/// Creates a template environment, or extends `env`, with LNT filters and
/// globals.
///
/// A fresh environment also gets the bundled templates. Either way the
/// result treats undefined variables as errors.
///
/// # Errors
///
/// Returns [`AppError::Template`] when a bundled template fails to compile.
pub fn create_template_environment(
    env: Option<Environment<'static>>,
) -> Result<Environment<'static>, AppError> {
    let mut env = match env {
        Some(env) => env,
        None => {
            let mut env = Environment::new();
            load_templates(&mut env)?;
            env
        }
    };
    env.set_undefined_behavior(UndefinedBehavior::Strict);
    register_filters(&mut env);
    register_globals(&mut env);
    Ok(env)
}

/// Adds the bundled templates to `env`.
///
/// # Errors
///
/// Returns [`AppError::Template`] when a template fails to compile.
pub fn load_templates(env: &mut Environment<'static>) -> Result<(), AppError> {
    for &(name, source) in TEMPLATES {
        env.add_template(name, source)?;
    }
    Ok(())
}

/// Registers the LNT filters.
fn register_filters(env: &mut Environment<'static>) {
    env.add_filter("asusertime", asusertime);
    env.add_filter("aspreformat", aspreformat);
    env.add_filter("shortname", shortname);
    env.add_filter("filesize", filesize);
    env.add_filter("timedelta", timedelta);
}

/// Registers the LNT global functions.
fn register_globals(env: &mut Environment<'static>) {
    env.add_function("db_url_for", db_url_for);
    env.add_function("v4_url_for", v4_url_for);
    env.add_function("baseline_key", baseline_key_function);
}

// ============================================================================
// SECTION: Filters
// ============================================================================

/// Renders unix seconds or a `YYYY-MM-DD HH:MM:SS` string as
/// `YYYY-MM-DD HH:MM:SS` (UTC). Strings in any other layout pass through.
fn asusertime(value: Value) -> Result<String, Error> {
    if let Some(text) = value.as_str() {
        return match PrimitiveDateTime::parse(text.trim(), USER_TIME_FORMAT) {
            Ok(parsed) => format_timestamp(parsed.assume_utc()),
            Err(_) => Ok(text.to_string()),
        };
    }
    let seconds = f64::try_from(value)?;
    let timestamp = time::Duration::checked_seconds_f64(seconds)
        .and_then(|offset| OffsetDateTime::UNIX_EPOCH.checked_add(offset))
        .ok_or_else(|| Error::new(ErrorKind::InvalidOperation, "timestamp out of range"))?;
    format_timestamp(timestamp)
}

/// Formats a timestamp for display.
fn format_timestamp(timestamp: OffsetDateTime) -> Result<String, Error> {
    timestamp
        .format(USER_TIME_FORMAT)
        .map_err(|err| Error::new(ErrorKind::InvalidOperation, err.to_string()))
}

/// Wraps escaped text in `<pre>`.
fn aspreformat(value: &str) -> Value {
    Value::from_safe_string(format!("<pre>{}</pre>", HtmlEscape(value)))
}

/// Returns the last dotted component of a name.
fn shortname(value: &str) -> String {
    value.rsplit('.').next().unwrap_or(value).to_string()
}

/// Renders a byte count with a binary unit.
fn filesize(value: Value) -> Result<String, Error> {
    let mut size = f64::try_from(value)?;
    for unit in ["bytes", "KB", "MB", "GB"] {
        if size.abs() < 1024.0 {
            return Ok(format!("{size:.1} {unit}"));
        }
        size /= 1024.0;
    }
    Ok(format!("{size:.1} TB"))
}

/// Renders a number of seconds as `1h 2m 3s`.
fn timedelta(value: Value) -> Result<String, Error> {
    let seconds = f64::try_from(value)?;
    let duration = Duration::try_from_secs_f64(seconds).map_err(|_| {
        Error::new(ErrorKind::InvalidOperation, "timedelta expects non-negative seconds")
    })?;
    Ok(format_duration(duration))
}

/// Formats whole seconds, dropping leading zero units.
fn format_duration(duration: Duration) -> String {
    let total = duration.as_secs();
    let (hours, minutes, seconds) = (total / 3600, (total % 3600) / 60, total % 60);
    if hours > 0 {
        format!("{hours}h {minutes}m {seconds}s")
    } else if minutes > 0 {
        format!("{minutes}m {seconds}s")
    } else {
        format!("{seconds}s")
    }
}

// ============================================================================
// SECTION: URL Helpers
// ============================================================================

/// URL of `path` inside database `db`.
#[must_use]
pub fn db_url(prefix: &str, db: &str, path: &str) -> String {
    let path = path.trim_start_matches('/');
    if db == DEFAULT_DB_NAME {
        format!("{prefix}/{path}")
    } else {
        format!("{prefix}/db_{}/{path}", encode_segment(db))
    }
}

/// URL of `path` inside test suite `suite` of database `db`.
#[must_use]
pub fn v4_url(prefix: &str, db: &str, suite: &str, path: &str) -> String {
    let path = path.trim_start_matches('/');
    db_url(prefix, db, &format!("v4/{}/{path}", encode_segment(suite)))
}

/// Percent-encodes a name for use as one path segment.
#[must_use]
pub fn encode_segment(name: &str) -> String {
    utf8_percent_encode(name, PATH_SEGMENT).to_string()
}

/// Mount point published to templates.
fn url_prefix(state: &State<'_, '_>) -> String {
    state
        .lookup(URL_PREFIX_GLOBAL)
        .and_then(|value| value.as_str().map(str::to_string))
        .unwrap_or_default()
}

/// Template function `db_url_for(db, path)`.
fn db_url_for(state: &State<'_, '_>, db: &str, path: Option<&str>) -> String {
    db_url(&url_prefix(state), db, path.unwrap_or_default())
}

/// Template function `v4_url_for(db, suite, path)`.
fn v4_url_for(state: &State<'_, '_>, db: &str, suite: &str, path: Option<&str>) -> String {
    v4_url(&url_prefix(state), db, suite, path.unwrap_or_default())
}

/// Template function `baseline_key(db, suite)`.
fn baseline_key_function(db: &str, suite: &str) -> String {
    baseline_key(db, suite)
}

// ============================================================================
// SECTION: Tests
// ============================================================================
