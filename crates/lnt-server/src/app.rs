// crates/lnt-server/src/app.rs
// ============================================================================
// Module: LNT Application
// Description: Application construction, configuration loading, and serving.
// Purpose: Wire templates, routes, middleware, session key, and logging.
// Dependencies: axum, lnt-config, minijinja, tokio
// ============================================================================

//! ## Overview
//! [`App::create_with_instance`] builds the application for a loaded
//! [`Instance`]: it extends the template environment, loads the
//! configuration (template globals and session key), and registers the
//! frontend and REST routes. [`App::create_standalone`] does the same from a
//! path and then starts file logging.
//!
//! [`App::router`] assembles the routes with the request lifecycle and
//! root-slash middleware into an [`axum::Router`] bound to an [`AppState`].

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::sync::OnceLock;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use axum::Router;
use axum::extract::FromRef;
use axum::middleware::from_fn_with_state;
use axum::response::Html;
use axum_extra::extract::cookie::Key;
use lnt_config::Instance;
use lnt_config::LntConfig;
use minijinja::Environment;
use minijinja::Value;
use minijinja::context;
use serde::Serialize;

use crate::api::load_api_resources;
use crate::error::AppError;
use crate::error::ServerError;
use crate::logging;
use crate::logging::MemoryLog;
use crate::middleware::request_lifecycle;
use crate::middleware::root_slash_patch;
use crate::request::RequestContext;
use crate::session::signing_key;
use crate::templates::URL_PREFIX_GLOBAL;
use crate::templates::create_template_environment;
use crate::templates::load_templates;
use crate::views;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Application version reported to templates.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// ============================================================================
// SECTION: Template Globals
// ============================================================================

/// The `app` template global.
#[derive(Debug, Serialize)]
struct AppGlobal<'a> {
    /// Instance name.
    name: &'a str,
    /// Server version.
    version: &'a str,
    /// Start time in unix seconds.
    start_time: u64,
}

/// The `old_config` template global.
#[derive(Debug, Serialize)]
struct ConfigGlobal<'a> {
    /// Instance name.
    name: &'a str,
    /// Zorg buildbot URL.
    zorg_url: &'a str,
    /// Configured database names.
    databases: Vec<String>,
}

// ============================================================================
// SECTION: Application
// ============================================================================

/// The LNT web application.
pub struct App {
    /// Construction time.
    start_time: SystemTime,
    /// Server version.
    version: &'static str,
    /// Template environment.
    templates: Environment<'static>,
    /// Loaded instance.
    instance: Option<Arc<Instance>>,
    /// Session cookie signing key.
    secret_key: Option<Key>,
    /// In-memory log, attached by [`App::start_file_logging`].
    memory_log: Arc<OnceLock<MemoryLog>>,
    /// Registered frontend and API routes.
    routes: Router<AppState>,
}

impl App {
    /// Builds an application with the bundled templates and no
    /// configuration.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Template`] when a bundled template fails to
    /// compile.
    pub fn new() -> Result<Self, AppError> {
        let mut templates = Environment::new();
        load_templates(&mut templates)?;
        Ok(Self {
            start_time: SystemTime::now(),
            version: VERSION,
            templates,
            instance: None,
            secret_key: None,
            memory_log: Arc::new(OnceLock::new()),
            routes: Router::new(),
        })
    }

    /// Builds the application for a loaded instance.
    ///
    /// # Errors
    ///
    /// Returns [`AppError`] when templates or configuration fail to load.
    pub fn create_with_instance(instance: Instance) -> Result<Self, AppError> {
        let mut app = Self::new()?;
        app.templates = create_template_environment(Some(std::mem::take(&mut app.templates)))?;
        app.load_config(instance)?;
        let prefix = app.config()?.server.url_prefix.clone();
        app.routes = views::frontend(&prefix).merge(load_api_resources(&prefix));
        Ok(app)
    }

    /// Loads the instance at `config_path`, builds the application, and
    /// starts file logging.
    ///
    /// # Errors
    ///
    /// Returns [`AppError`] when the instance, application, or logging
    /// fails to load.
    pub fn create_standalone(config_path: &Path) -> Result<Self, AppError> {
        let instance =
            Instance::from_path(config_path).map_err(|err| AppError::Config(err.to_string()))?;
        let app = Self::create_with_instance(instance)?;
        app.start_file_logging()?;
        Ok(app)
    }

    /// Stores the instance, publishes the `app`, `old_config`, and
    /// `url_prefix` template globals, and derives the session key.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Config`] when the session key cannot be derived.
    pub fn load_config(&mut self, instance: Instance) -> Result<(), AppError> {
        let config = instance.config();
        let start_time =
            self.start_time.duration_since(UNIX_EPOCH).map(|elapsed| elapsed.as_secs()).unwrap_or(0);
        self.templates.add_global(
            "app",
            Value::from_serialize(AppGlobal {
                name: &config.name,
                version: self.version,
                start_time,
            }),
        );
        self.templates.add_global(
            "old_config",
            Value::from_serialize(ConfigGlobal {
                name: &config.name,
                zorg_url: &config.zorg_url,
                databases: config.database_names(),
            }),
        );
        self.templates.add_global(URL_PREFIX_GLOBAL, config.server.url_prefix.clone());
        self.secret_key = Some(signing_key(&config.secret_key)?);
        tracing::debug!(instance = %instance.path().display(), "loaded configuration");
        self.instance = Some(Arc::new(instance));
        Ok(())
    }

    /// Installs logging: stderr, the in-memory log, and (outside debug mode)
    /// the rotating log file.
    ///
    /// # Errors
    ///
    /// Returns [`AppError`] when configuration is missing or logging is
    /// already installed.
    pub fn start_file_logging(&self) -> Result<(), AppError> {
        let config = self.config()?;
        let handles = logging::start_file_logging(&config.logging, config.server.debug)
            .map_err(|err| AppError::Logging(err.to_string()))?;
        self.memory_log
            .set(handles.memory)
            .map_err(|_| AppError::Logging("memory log already attached".to_string()))
    }

    /// Returns the loaded configuration.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::NotConfigured`] before [`App::load_config`].
    pub fn config(&self) -> Result<&LntConfig, AppError> {
        self.instance.as_deref().map(Instance::config).ok_or(AppError::NotConfigured)
    }

    /// Returns the loaded instance.
    #[must_use]
    pub fn instance(&self) -> Option<&Instance> {
        self.instance.as_deref()
    }

    /// Construction time.
    #[must_use]
    pub const fn start_time(&self) -> SystemTime {
        self.start_time
    }

    /// Server version.
    #[must_use]
    pub const fn version(&self) -> &'static str {
        self.version
    }

    /// Template environment.
    #[must_use]
    pub const fn templates(&self) -> &Environment<'static> {
        &self.templates
    }

    /// In-memory log, once file logging has started.
    #[must_use]
    pub fn memory_log(&self) -> Option<&MemoryLog> {
        self.memory_log.get()
    }

    /// Assembles the router with middleware and shared state.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::NotConfigured`] before [`App::load_config`].
    pub fn router(&self) -> Result<Router, AppError> {
        let instance = self.instance.clone().ok_or(AppError::NotConfigured)?;
        let key = self.secret_key.clone().ok_or(AppError::NotConfigured)?;
        let url_prefix = instance.config().server.url_prefix.clone();
        let state = AppState {
            shared: Arc::new(SharedState {
                instance,
                templates: self.templates.clone(),
                key,
                memory_log: Arc::clone(&self.memory_log),
                url_prefix,
            }),
        };
        Ok(self
            .routes
            .clone()
            .fallback(views::not_found)
            .layer(from_fn_with_state(state.clone(), request_lifecycle))
            .layer(from_fn_with_state(state.clone(), root_slash_patch))
            .with_state(state))
    }

    /// Binds `server.bind` and serves until the listener fails.
    ///
    /// # Errors
    ///
    /// Returns [`AppError`] when configuration is missing or the socket
    /// cannot be bound.
    pub async fn serve(&self) -> Result<(), AppError> {
        let config = self.config()?;
        let addr: SocketAddr = config
            .server
            .bind
            .trim()
            .parse()
            .map_err(|_| AppError::Config("invalid bind address".to_string()))?;
        let router = self.router()?;
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|err| AppError::Transport(format!("bind {addr} failed: {err}")))?;
        tracing::info!(address = %addr, prefix = %config.server.url_prefix, "serving LNT");
        axum::serve(listener, router)
            .await
            .map_err(|err| AppError::Transport(format!("http server failed: {err}")))
    }
}

// ============================================================================
// SECTION: Shared State
// ============================================================================

/// State shared by every handler.
#[derive(Clone)]
pub struct AppState {
    /// Immutable shared data.
    shared: Arc<SharedState>,
}

/// Data behind [`AppState`].
struct SharedState {
    /// Served instance.
    instance: Arc<Instance>,
    /// Template environment.
    templates: Environment<'static>,
    /// Session cookie signing key.
    key: Key,
    /// In-memory log.
    memory_log: Arc<OnceLock<MemoryLog>>,
    /// Mount point.
    url_prefix: String,
}

impl AppState {
    /// Served instance.
    #[must_use]
    pub fn instance(&self) -> &Arc<Instance> {
        &self.shared.instance
    }

    /// Instance configuration.
    #[must_use]
    pub fn config(&self) -> &LntConfig {
        self.shared.instance.config()
    }

    /// Mount point (empty at the root).
    #[must_use]
    pub fn url_prefix(&self) -> &str {
        &self.shared.url_prefix
    }

    /// In-memory log, when file logging has started.
    #[must_use]
    pub fn memory_log(&self) -> Option<&MemoryLog> {
        self.shared.memory_log.get()
    }

    /// Renders a page with the request's common context merged in.
    ///
    /// # Errors
    ///
    /// Returns 500 when the template is missing or fails to render.
    pub fn render(
        &self,
        name: &str,
        request: &RequestContext,
        page: Value,
    ) -> Result<Html<String>, ServerError> {
        let template = self
            .shared
            .templates
            .get_template(name)
            .map_err(|err| ServerError::internal(&format!("template {name}: {err}")))?;
        let context = context! {
            db_name => request.db_name(),
            testsuite_name => request.testsuite_name(),
            db_log => request.db_log(),
            elapsed => request.elapsed_time().as_secs_f64(),
            ..page
        };
        template
            .render(context)
            .map(Html)
            .map_err(|err| ServerError::internal(&format!("render {name}: {err}")))
    }
}

impl FromRef<AppState> for Key {
    fn from_ref(state: &AppState) -> Self {
        state.shared.key.clone()
    }
}
