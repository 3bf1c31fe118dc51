//! Instance discovery tests for lnt-config.
// crates/lnt-config/tests/instance_discovery.rs
// =============================================================================
// Module: Instance Discovery Tests
// Description: Validate instance loading from directories and config files.
// Purpose: Ensure relative paths resolve against the instance directory.
// =============================================================================

use std::fs;

use lnt_config::Instance;
use tempfile::TempDir;

type TestResult = Result<(), String>;

const CONFIG: &str = r#"
name = "Test Instance"
secret_key = "abc"

[databases.default]
path = "data/lnt.db"

[databases.archive]
path = "/var/lib/lnt/archive.db"
"#;

fn write_instance() -> Result<TempDir, String> {
    let dir = TempDir::new().map_err(|err| err.to_string())?;
    fs::write(dir.path().join("lnt.toml"), CONFIG).map_err(|err| err.to_string())?;
    Ok(dir)
}

#[test]
fn loads_from_directory_and_resolves_relative_paths() -> TestResult {
    let dir = write_instance()?;
    let instance = Instance::from_path(dir.path()).map_err(|err| err.to_string())?;
    if instance.path() != dir.path() {
        return Err("instance path mismatch".to_string());
    }
    if instance.config_path() != dir.path().join("lnt.toml") {
        return Err("config path mismatch".to_string());
    }
    let default = instance.config().database("default").ok_or("missing default")?;
    if default.path != dir.path().join("data/lnt.db") {
        return Err(format!("relative path not resolved: {}", default.path.display()));
    }
    let archive = instance.config().database("archive").ok_or("missing archive")?;
    if archive.path != std::path::Path::new("/var/lib/lnt/archive.db") {
        return Err("absolute path must be kept".to_string());
    }
    if instance.config().temp_dir != dir.path().join("lnt_tmp") {
        return Err("temp_dir not resolved".to_string());
    }
    Ok(())
}

#[test]
fn loads_from_config_file_path() -> TestResult {
    let dir = write_instance()?;
    let instance =
        Instance::from_path(&dir.path().join("lnt.toml")).map_err(|err| err.to_string())?;
    if instance.config().name != "Test Instance" {
        return Err("config not loaded".to_string());
    }
    if instance.path() != dir.path() {
        return Err("instance dir should be the config parent".to_string());
    }
    Ok(())
}

#[test]
fn directory_without_config_is_rejected() -> TestResult {
    let dir = TempDir::new().map_err(|err| err.to_string())?;
    match Instance::from_path(dir.path()) {
        Err(err) if err.to_string().contains("no lnt.toml found") => Ok(()),
        Err(err) => Err(format!("unexpected error: {err}")),
        Ok(_) => Err("expected missing config error".to_string()),
    }
}

#[test]
fn archived_instances_are_rejected() -> TestResult {
    match Instance::from_path(std::path::Path::new("instance.tar.gz")) {
        Err(err) if err.to_string().contains("archived instances are not supported") => Ok(()),
        Err(err) => Err(format!("unexpected error: {err}")),
        Ok(_) => Err("expected archive rejection".to_string()),
    }
}
