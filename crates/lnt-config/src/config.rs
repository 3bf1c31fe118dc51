// crates/lnt-config/src/config.rs
// ============================================================================
// Module: LNT Configuration
// Description: Configuration loading and validation for the LNT server.
// Purpose: Provide strict, fail-closed config parsing with hard limits.
// Dependencies: serde, toml, thiserror
// ============================================================================

//! ## Overview
//! Configuration is loaded from a TOML file with strict size and path limits.
//! Missing or invalid configuration fails closed: the server never starts
//! with a partially understood config.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Configuration filename looked up inside an instance directory.
pub const CONFIG_FILE_NAME: &str = "lnt.toml";
/// Maximum configuration file size in bytes.
pub(crate) const MAX_CONFIG_FILE_SIZE: usize = 1024 * 1024;
/// Maximum length of a single path component.
pub(crate) const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
pub(crate) const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Maximum length of a database name.
const MAX_DATABASE_NAME_LENGTH: usize = 64;
/// Maximum number of configured databases.
const MAX_DATABASES: usize = 64;
/// Maximum length of the API auth token.
const MAX_AUTH_TOKEN_LENGTH: usize = 256;
/// Only supported database layout version.
pub const SUPPORTED_DB_VERSION: &str = "0.4";
/// Default rotating log file name (relative to the working directory).
const DEFAULT_LOG_FILE: &str = "lnt.log";
/// Default rotating log size threshold in bytes.
const DEFAULT_LOG_MAX_BYTES: u64 = 1_048_576;
/// Default number of rotated log backups kept.
const DEFAULT_LOG_BACKUP_COUNT: usize = 5;
/// Default in-memory log capacity in bytes.
const DEFAULT_MEMORY_LOG_BYTES: usize = 1024 * 1024;
/// Maximum rotated log backups kept.
const MAX_LOG_BACKUP_COUNT: usize = 100;
/// Default tracing filter directive.
const DEFAULT_LOG_FILTER: &str = "warn,lnt_server=debug,lnt_db=debug,lnt_cli=debug";

// ============================================================================
// SECTION: Configuration Types
// ============================================================================

/// LNT server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LntConfig {
    /// Display name of the installation.
    #[serde(default = "default_name")]
    pub name: String,
    /// Base URL of the zorg repository linked from the UI.
    #[serde(default)]
    pub zorg_url: String,
    /// Secret used to derive the session cookie signing key.
    pub secret_key: String,
    /// Scratch directory for temporary files.
    #[serde(default = "default_temp_dir")]
    pub temp_dir: PathBuf,
    /// Token required for destructive REST API calls.
    #[serde(default)]
    pub api_auth_token: Option<String>,
    /// HTTP server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Named databases served by this instance.
    #[serde(default)]
    pub databases: BTreeMap<String, DatabaseConfig>,
}

impl LntConfig {
    /// Loads and validates configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when reading, parsing or validation fails.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        validate_path(path)?;
        let bytes = fs::read(path).map_err(|err| ConfigError::Io(err.to_string()))?;
        if bytes.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::Invalid("config file exceeds size limit".to_string()));
        }
        let content = std::str::from_utf8(&bytes)
            .map_err(|_| ConfigError::Invalid("config file must be utf-8".to_string()))?;
        Self::from_toml_str(content)
    }

    /// Parses and validates configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when parsing or validation fails.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration for internal consistency.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::Invalid("name must be non-empty".to_string()));
        }
        if self.secret_key.trim().is_empty() {
            return Err(ConfigError::Invalid("secret_key must be non-empty".to_string()));
        }
        validate_path_string("temp_dir", &self.temp_dir.to_string_lossy())?;
        if let Some(token) = &self.api_auth_token {
            if token.trim().is_empty() {
                return Err(ConfigError::Invalid(
                    "api_auth_token must be non-empty when set".to_string(),
                ));
            }
            if token.len() > MAX_AUTH_TOKEN_LENGTH {
                return Err(ConfigError::Invalid("api_auth_token exceeds max length".to_string()));
            }
        }
        self.server.validate()?;
        self.logging.validate()?;
        if self.databases.len() > MAX_DATABASES {
            return Err(ConfigError::Invalid("too many databases configured".to_string()));
        }
        for (name, database) in &self.databases {
            validate_database_name(name)?;
            database.validate(name)?;
        }
        Ok(())
    }

    /// Returns the database configuration registered under `name`.
    #[must_use]
    pub fn database(&self, name: &str) -> Option<&DatabaseConfig> {
        self.databases.get(name)
    }

    /// Returns configured database names in sorted order.
    #[must_use]
    pub fn database_names(&self) -> Vec<String> {
        self.databases.keys().cloned().collect()
    }
}

/// HTTP server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Socket address the server listens on.
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Mount point for all routes (empty for the root).
    #[serde(default)]
    pub url_prefix: String,
    /// Debug mode (disables file logging).
    #[serde(default)]
    pub debug: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            url_prefix: String::new(),
            debug: false,
        }
    }
}

impl ServerConfig {
    /// Validates bind address and mount point.
    fn validate(&self) -> Result<(), ConfigError> {
        self.bind
            .trim()
            .parse::<SocketAddr>()
            .map_err(|_| ConfigError::Invalid("server.bind is not a socket address".to_string()))?;
        let prefix = self.url_prefix.as_str();
        if prefix.is_empty() {
            return Ok(());
        }
        if !prefix.starts_with('/') {
            return Err(ConfigError::Invalid(
                "server.url_prefix must start with '/'".to_string(),
            ));
        }
        if prefix.ends_with('/') {
            return Err(ConfigError::Invalid(
                "server.url_prefix must not end with '/'".to_string(),
            ));
        }
        if prefix.contains(['?', '#', ' ']) {
            return Err(ConfigError::Invalid(
                "server.url_prefix contains reserved characters".to_string(),
            ));
        }
        Ok(())
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Tracing filter directive.
    #[serde(default = "default_log_filter")]
    pub filter: String,
    /// Rotating log file path.
    #[serde(default = "default_log_file")]
    pub file: PathBuf,
    /// Size threshold that triggers rotation (0 disables rotation).
    #[serde(default = "default_log_max_bytes")]
    pub max_bytes: u64,
    /// Number of rotated backups kept.
    #[serde(default = "default_log_backup_count")]
    pub backup_count: usize,
    /// Capacity of the in-memory log shown by the `/log` view.
    #[serde(default = "default_memory_log_bytes")]
    pub memory_capacity_bytes: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
            file: default_log_file(),
            max_bytes: default_log_max_bytes(),
            backup_count: default_log_backup_count(),
            memory_capacity_bytes: default_memory_log_bytes(),
        }
    }
}

impl LoggingConfig {
    /// Validates logging limits and paths.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.filter.trim().is_empty() {
            return Err(ConfigError::Invalid("logging.filter must be non-empty".to_string()));
        }
        validate_path_string("logging.file", &self.file.to_string_lossy())?;
        if self.backup_count > MAX_LOG_BACKUP_COUNT {
            return Err(ConfigError::Invalid(format!(
                "logging.backup_count exceeds {MAX_LOG_BACKUP_COUNT}"
            )));
        }
        if self.memory_capacity_bytes == 0 {
            return Err(ConfigError::Invalid(
                "logging.memory_capacity_bytes must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Configuration for a single served database.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// `SQLite` database path (relative paths resolve against the instance).
    pub path: PathBuf,
    /// Database layout version.
    #[serde(default = "default_db_version")]
    pub db_version: String,
}

impl DatabaseConfig {
    /// Validates the database entry.
    fn validate(&self, name: &str) -> Result<(), ConfigError> {
        validate_path_string(&format!("databases.{name}.path"), &self.path.to_string_lossy())?;
        if self.db_version != SUPPORTED_DB_VERSION {
            return Err(ConfigError::Invalid(format!(
                "databases.{name}.db_version '{}' is unsupported (expected {SUPPORTED_DB_VERSION})",
                self.db_version
            )));
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Defaults
// ============================================================================

/// Default installation name.
fn default_name() -> String {
    "LNT".to_string()
}

/// Default scratch directory.
fn default_temp_dir() -> PathBuf {
    PathBuf::from("lnt_tmp")
}

/// Default bind address.
fn default_bind() -> String {
    "127.0.0.1:8000".to_string()
}

/// Default tracing filter directive.
fn default_log_filter() -> String {
    DEFAULT_LOG_FILTER.to_string()
}

/// Default rotating log file.
fn default_log_file() -> PathBuf {
    PathBuf::from(DEFAULT_LOG_FILE)
}

/// Default rotation threshold.
const fn default_log_max_bytes() -> u64 {
    DEFAULT_LOG_MAX_BYTES
}

/// Default number of rotated backups.
const fn default_log_backup_count() -> usize {
    DEFAULT_LOG_BACKUP_COUNT
}

/// Default memory log capacity.
const fn default_memory_log_bytes() -> usize {
    DEFAULT_MEMORY_LOG_BYTES
}

/// Default database layout version.
fn default_db_version() -> String {
    SUPPORTED_DB_VERSION.to_string()
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration loading or validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O failure while reading configuration.
    #[error("config io error: {0}")]
    Io(String),
    /// TOML parsing error.
    #[error("config parse error: {0}")]
    Parse(String),
    /// Invalid configuration data.
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Validates a filesystem path against security limits.
pub(crate) fn validate_path(path: &Path) -> Result<(), ConfigError> {
    let text = path.to_string_lossy();
    if text.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
    }
    for component in path.components() {
        let value = component.as_os_str().to_string_lossy();
        if value.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid("config path component too long".to_string()));
        }
    }
    Ok(())
}

/// Validates a path string against length constraints.
fn validate_path_string(field: &str, value: &str) -> Result<(), ConfigError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::Invalid(format!("{field} must be non-empty")));
    }
    if trimmed.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid(format!("{field} exceeds max length")));
    }
    for component in Path::new(trimmed).components() {
        let component_value = component.as_os_str().to_string_lossy();
        if component_value.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid(format!("{field} path component too long")));
        }
    }
    Ok(())
}

/// Validates a database name used in URLs (`/db_<name>/`).
fn validate_database_name(name: &str) -> Result<(), ConfigError> {
    if name.is_empty() || name.len() > MAX_DATABASE_NAME_LENGTH {
        return Err(ConfigError::Invalid(format!(
            "database name must be 1..={MAX_DATABASE_NAME_LENGTH} characters"
        )));
    }
    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-') {
        return Err(ConfigError::Invalid(format!(
            "invalid database name '{name}': only alphanumeric, '_' and '-' allowed"
        )));
    }
    Ok(())
}
