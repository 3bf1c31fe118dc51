// crates/lnt-config/src/instance.rs
// ============================================================================
// Module: LNT Instance
// Description: Instance directory discovery and path resolution.
// Purpose: Turn a user-supplied path into a validated, self-contained config.
// Dependencies: crate::config
// ============================================================================

//! ## Overview
//! An instance is a directory holding `lnt.toml` plus the databases it names.
//! [`Instance::from_path`] accepts either the directory or the config file
//! itself; relative paths inside the config are resolved against the
//! instance directory so the server can run from any working directory.
//! The rotating log file is the one exception: it stays relative to the
//! working directory.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::path::PathBuf;

use crate::config::CONFIG_FILE_NAME;
use crate::config::ConfigError;
use crate::config::LntConfig;
use crate::config::validate_path;

// ============================================================================
// SECTION: Instance
// ============================================================================

/// A loaded LNT instance.
#[derive(Debug, Clone)]
pub struct Instance {
    /// Directory containing the instance config.
    path: PathBuf,
    /// Path of the config file that was loaded.
    config_path: PathBuf,
    /// Validated configuration with resolved paths.
    config: LntConfig,
}

impl Instance {
    /// Loads an instance from a directory or a config file path.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the path is unusable or the config is
    /// invalid.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        validate_path(path)?;
        let text = path.to_string_lossy();
        if text.ends_with(".tar.gz") || text.ends_with(".tgz") {
            return Err(ConfigError::Invalid(
                "archived instances are not supported; extract the archive first".to_string(),
            ));
        }
        let metadata = std::fs::metadata(path)
            .map_err(|err| ConfigError::Io(format!("{}: {err}", path.display())))?;
        let (dir, config_path) = if metadata.is_dir() {
            (path.to_path_buf(), path.join(CONFIG_FILE_NAME))
        } else {
            let dir = path
                .parent()
                .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
            (dir, path.to_path_buf())
        };
        if !config_path.is_file() {
            return Err(ConfigError::Io(format!(
                "no {CONFIG_FILE_NAME} found at {}",
                config_path.display()
            )));
        }
        let config = LntConfig::load(&config_path)?;
        Ok(Self::with_config(dir, config_path, config))
    }

    /// Builds an instance from an already validated config.
    #[must_use]
    pub fn with_config(path: PathBuf, config_path: PathBuf, mut config: LntConfig) -> Self {
        let dir = if path.as_os_str().is_empty() { PathBuf::from(".") } else { path };
        for database in config.databases.values_mut() {
            database.path = resolve(&dir, &database.path);
        }
        config.temp_dir = resolve(&dir, &config.temp_dir);
        Self {
            path: dir,
            config_path,
            config,
        }
    }

    /// Returns the instance directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the loaded config file path.
    #[must_use]
    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Returns the instance configuration.
    #[must_use]
    pub const fn config(&self) -> &LntConfig {
        &self.config
    }

    /// Returns a mutable handle for command-line overrides.
    pub const fn config_mut(&mut self) -> &mut LntConfig {
        &mut self.config
    }
}

/// Joins `path` onto `base` unless it is already absolute.
fn resolve(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() { path.to_path_buf() } else { base.join(path) }
}
