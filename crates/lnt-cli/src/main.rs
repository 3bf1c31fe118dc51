// crates/lnt-cli/src/main.rs
// ============================================================================
// Module: LNT CLI Entry Point
// Description: Command dispatcher for serving and creating LNT instances.
// Purpose: Provide the `lnt runserver` and `lnt create` commands.
// Dependencies: clap, lnt-config, lnt-db, lnt-server, rand, thiserror, tokio
// ============================================================================

//! ## Overview
//! `runserver` loads an instance, applies the command-line bind and debug
//! overrides, installs logging, and serves until the listener fails.
//! `create` lays out a new instance directory with a fresh secret key and a
//! default database.

// ============================================================================
// SECTION: Modules
// ============================================================================

#[cfg(test)]
mod main_tests;

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs;
use std::io::Write;
use std::net::IpAddr;
use std::net::Ipv4Addr;
use std::net::SocketAddr;
use std::path::Path;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::ArgAction;
use clap::Args;
use clap::Parser;
use clap::Subcommand;
use lnt_config::CONFIG_FILE_NAME;
use lnt_config::Instance;
use lnt_config::LntConfig;
use lnt_db::TestSuiteSpec;
use lnt_db::create_database;
use lnt_db::schema::validate_db_key_name;
use lnt_server::App;
use rand::RngCore;
use rand::rngs::OsRng;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Database registered by `create`, relative to the instance.
const DEFAULT_DB_PATH: &str = "data/lnt.db";
/// Name of the database registered by `create`.
const DEFAULT_DB_NAME: &str = "default";
/// Random bytes in a generated secret key.
const SECRET_KEY_BYTES: usize = 32;

// ============================================================================
// SECTION: CLI Types
// ============================================================================

/// Top-level CLI definition.
#[derive(Parser, Debug)]
#[command(name = "lnt", version, disable_help_subcommand = true)]
struct Cli {
    /// Selected subcommand to execute.
    #[command(subcommand)]
    command: Commands,
}

/// Supported CLI subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Serve an LNT instance over HTTP.
    Runserver(RunserverCommand),
    /// Create a new LNT instance directory.
    Create(CreateCommand),
}

/// Arguments of the `runserver` command.
#[derive(Args, Debug)]
struct RunserverCommand {
    /// Instance directory or path to its `lnt.toml`.
    #[arg(value_name = "INSTANCE")]
    instance: PathBuf,
    /// Address to listen on (overrides `server.bind`).
    #[arg(long, value_name = "H")]
    hostname: Option<String>,
    /// Port to listen on (overrides `server.bind`).
    #[arg(long, value_name = "P")]
    port: Option<u16>,
    /// Debug mode: log to stderr and memory only.
    #[arg(long, action = ArgAction::SetTrue)]
    debug: bool,
}

/// Arguments of the `create` command.
#[derive(Args, Debug)]
struct CreateCommand {
    /// Instance directory to create.
    #[arg(value_name = "PATH")]
    path: PathBuf,
    /// Installation name shown in the UI.
    #[arg(long, value_name = "N", default_value = "LNT")]
    name: String,
    /// Test suite created in the default database.
    #[arg(long, value_name = "S", default_value = "nts")]
    default_suite: String,
    /// Table prefix of the default test suite.
    #[arg(long, value_name = "K", default_value = "NT")]
    suite_key: String,
}

/// CLI error wrapper for user-facing failures.
#[derive(Debug, Error)]
#[error("{message}")]
struct CliError {
    /// Human-readable error message.
    message: String,
}

impl CliError {
    /// Constructs a new [`CliError`].
    const fn new(message: String) -> Self {
        Self {
            message,
        }
    }
}

/// CLI result alias for fallible operations.
type CliResult<T> = Result<T, CliError>;

// ============================================================================
// SECTION: Entry Point
// ============================================================================

/// CLI entry point returning an exit code.
#[tokio::main(flavor = "multi_thread")]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => code,
        Err(err) => emit_error(&err.to_string()),
    }
}

/// Executes the CLI command dispatcher.
async fn run() -> CliResult<ExitCode> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Runserver(command) => command_runserver(command).await,
        Commands::Create(command) => command_create(&command),
    }
}

// ============================================================================
// SECTION: Runserver Command
// ============================================================================

/// Executes the `runserver` command.
async fn command_runserver(command: RunserverCommand) -> CliResult<ExitCode> {
    let mut instance = Instance::from_path(&command.instance)
        .map_err(|err| CliError::new(format!("failed to load instance: {err}")))?;
    let config = instance.config_mut();
    let bind = resolve_bind(&config.server.bind, command.hostname.as_deref(), command.port)?;
    config.server.bind = bind.to_string();
    if command.debug {
        config.server.debug = true;
    }
    let url = format!("http://{bind}{}/", config.server.url_prefix);

    let app = App::create_with_instance(instance)
        .map_err(|err| CliError::new(format!("failed to create application: {err}")))?;
    app.start_file_logging()
        .map_err(|err| CliError::new(format!("failed to start logging: {err}")))?;
    tracing::info!(url = %url, debug = command.debug, "starting server");
    write_stdout_line(&format!("Serving LNT at {url}"))
        .map_err(|err| CliError::new(output_error("stdout", &err)))?;
    app.serve().await.map_err(|err| CliError::new(format!("server failed: {err}")))?;
    Ok(ExitCode::SUCCESS)
}

/// Applies `--hostname` and `--port` to the configured bind address.
fn resolve_bind(current: &str, hostname: Option<&str>, port: Option<u16>) -> CliResult<SocketAddr> {
    let mut addr: SocketAddr = current
        .trim()
        .parse()
        .map_err(|_| CliError::new(format!("invalid configured bind address '{current}'")))?;
    if let Some(hostname) = hostname {
        addr.set_ip(parse_hostname(hostname)?);
    }
    if let Some(port) = port {
        addr.set_port(port);
    }
    Ok(addr)
}

/// Parses a listen address; `localhost` means the IPv4 loopback.
fn parse_hostname(hostname: &str) -> CliResult<IpAddr> {
    if hostname.eq_ignore_ascii_case("localhost") {
        return Ok(IpAddr::V4(Ipv4Addr::LOCALHOST));
    }
    hostname
        .parse()
        .map_err(|_| CliError::new(format!("invalid hostname '{hostname}': expected an IP address")))
}

// ============================================================================
// SECTION: Create Command
// ============================================================================

/// `lnt.toml` written by `create`.
#[derive(Debug, Serialize)]
struct InstanceFile<'a> {
    /// Installation name.
    name: &'a str,
    /// Session signing secret.
    secret_key: &'a str,
    /// Registered databases.
    databases: BTreeMap<&'a str, DatabaseEntry<'a>>,
}

/// One `[databases.<name>]` table.
#[derive(Debug, Serialize)]
struct DatabaseEntry<'a> {
    /// Database path relative to the instance.
    path: &'a str,
}

/// Executes the `create` command.
fn command_create(command: &CreateCommand) -> CliResult<ExitCode> {
    let path = command.path.as_path();
    if path.exists() {
        return Err(CliError::new(format!(
            "refusing to create instance: {} already exists",
            path.display()
        )));
    }
    validate_db_key_name(&command.suite_key)
        .map_err(|err| CliError::new(format!("invalid --suite-key: {err}")))?;
    let config_text = render_instance_config(&command.name, &generate_secret_key())?;

    fs::create_dir_all(path)
        .map_err(|err| CliError::new(format!("failed to create {}: {err}", path.display())))?;
    if let Err(err) = populate_instance(path, &config_text, command) {
        let _ = fs::remove_dir_all(path);
        return Err(err);
    }

    let lines = [
        format!("created LNT configuration in {}", path.display()),
        format!("  configuration file: {}", path.join(CONFIG_FILE_NAME).display()),
        format!("  database file: {}", path.join(DEFAULT_DB_PATH).display()),
        format!("You can run the server with: lnt runserver {}", path.display()),
    ];
    for line in &lines {
        write_stdout_line(line).map_err(|err| CliError::new(output_error("stdout", &err)))?;
    }
    Ok(ExitCode::SUCCESS)
}

/// Writes the config file and default database into a fresh directory.
fn populate_instance(path: &Path, config_text: &str, command: &CreateCommand) -> CliResult<()> {
    let config_path = path.join(CONFIG_FILE_NAME);
    fs::write(&config_path, config_text).map_err(|err| {
        CliError::new(format!("failed to write {}: {err}", config_path.display()))
    })?;
    let suite = TestSuiteSpec::new(command.default_suite.clone(), command.suite_key.clone());
    create_database(&path.join(DEFAULT_DB_PATH), &[suite])
        .map_err(|err| CliError::new(format!("failed to create database: {err}")))?;
    Instance::from_path(path)
        .map_err(|err| CliError::new(format!("created instance does not load: {err}")))?;
    Ok(())
}

/// Renders and validates the `lnt.toml` of a new instance.
fn render_instance_config(name: &str, secret_key: &str) -> CliResult<String> {
    let file = InstanceFile {
        name,
        secret_key,
        databases: BTreeMap::from([(
            DEFAULT_DB_NAME,
            DatabaseEntry {
                path: DEFAULT_DB_PATH,
            },
        )]),
    };
    let text = toml::to_string(&file)
        .map_err(|err| CliError::new(format!("failed to render configuration: {err}")))?;
    LntConfig::from_toml_str(&text)
        .map_err(|err| CliError::new(format!("invalid instance settings: {err}")))?;
    Ok(text)
}

/// Returns a hex-encoded random secret.
fn generate_secret_key() -> String {
    let mut bytes = [0_u8; SECRET_KEY_BYTES];
    OsRng.fill_bytes(&mut bytes);
    let mut secret = String::with_capacity(SECRET_KEY_BYTES * 2);
    for byte in bytes {
        let _ = write!(secret, "{byte:02x}");
    }
    secret
}

// ============================================================================
// SECTION: Output Helpers
// ============================================================================

/// Writes a single line to stdout.
fn write_stdout_line(message: &str) -> std::io::Result<()> {
    let mut stdout = std::io::stdout();
    writeln!(&mut stdout, "{message}")
}

/// Writes a single line to stderr.
fn write_stderr_line(message: &str) -> std::io::Result<()> {
    let mut stderr = std::io::stderr();
    writeln!(&mut stderr, "{message}")
}

/// Formats an output stream failure.
fn output_error(stream: &str, error: &std::io::Error) -> String {
    format!("failed to write to {stream}: {error}")
}

/// Emits an error message to stderr and returns a failure exit code.
fn emit_error(message: &str) -> ExitCode {
    let _ = write_stderr_line(message);
    ExitCode::FAILURE
}
