//! Configuration management for session-mux.
//!
//! Configuration is loaded with the following priority (highest to lowest):
//! 1. Command-line arguments
//! 2. Environment variables
//! 3. Configuration file (JSON)
//! 4. Default values

use std::net::IpAddr;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::api::{ServerConfig, DEFAULT_MAX_BODY_BYTES};
use crate::cli::Args;
use crate::dispatch::{CookieScope, DispatchConfig};
use crate::session::{
    CookieConfig, MemoryConfig, DEFAULT_COOKIE_MAX_AGE, DEFAULT_IDLE_TIMEOUT,
    DEFAULT_POLL_INTERVAL,
};

/// Application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Server configuration.
    pub server: ServerSection,
    /// Session backend configuration.
    pub session: SessionSection,
    /// Dispatch pipeline configuration.
    pub dispatch: DispatchSection,
    /// Logging configuration.
    pub logging: LoggingSection,
}

/// Server configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    /// Host address to bind to.
    pub host: String,
    /// Port to listen on.
    pub port: u16,
    /// Path prefix stripped before route matching.
    pub prefix: String,
    /// Enable graceful shutdown.
    pub graceful_shutdown: bool,
    /// Largest request body accepted, in bytes.
    pub max_body_bytes: usize,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
            prefix: String::new(),
            graceful_shutdown: true,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

/// Which session backend the server uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Cookie-identified sessions kept in memory and reaped when idle.
    #[default]
    Memory,
    /// A throwaway session per request.
    Request,
}

/// Session configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSection {
    pub backend: BackendKind,
    /// Name of the identity cookie.
    pub cookie_name: String,
    pub cookie_domain: String,
    pub cookie_path: String,
    /// Max-Age of the identity cookie in seconds.
    pub cookie_max_age_secs: u64,
    /// Idle time after which a session is reaped, in seconds. 0 disables
    /// reaping.
    pub timeout_secs: u64,
    /// Reaper tick in milliseconds.
    pub poll_interval_ms: u64,
}

impl Default for SessionSection {
    fn default() -> Self {
        let cookie = CookieConfig::default();
        Self {
            backend: BackendKind::default(),
            cookie_name: cookie.name,
            cookie_domain: cookie.domain,
            cookie_path: cookie.path,
            cookie_max_age_secs: DEFAULT_COOKIE_MAX_AGE.as_secs(),
            timeout_secs: DEFAULT_IDLE_TIMEOUT.as_secs(),
            poll_interval_ms: DEFAULT_POLL_INTERVAL.as_millis() as u64,
        }
    }
}

/// Dispatch configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchSection {
    /// Requests slower than this are logged. 0 disables the check.
    pub slow_threshold_ms: u64,
    /// Track per-route latency and expose it on the state route.
    pub monitor: bool,
    /// Register the `/_mux/*` introspection routes.
    pub introspection: bool,
    pub filters_enabled: bool,
    pub handlers_enabled: bool,
}

impl Default for DispatchSection {
    fn default() -> Self {
        Self {
            slow_threshold_ms: 0,
            monitor: false,
            introspection: true,
            filters_enabled: true,
            handlers_enabled: true,
        }
    }
}

/// Logging configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Log level (error, warn, info, debug, trace) or a full filter directive.
    pub level: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        serde_json::from_str(&content).map_err(ConfigError::Json)
    }

    /// Apply environment variable overrides.
    pub fn apply_env(&mut self) {
        self.apply_vars(|key| std::env::var(key).ok());
    }

    fn apply_vars(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(host) = var("SESSION_MUX_HOST") {
            self.server.host = host;
        }

        if let Some(port) = var("SESSION_MUX_PORT") {
            if let Ok(port) = port.parse() {
                self.server.port = port;
            }
        }

        if let Some(prefix) = var("SESSION_MUX_PREFIX") {
            self.server.prefix = prefix;
        }

        if let Some(timeout) = var("SESSION_MUX_SESSION_TIMEOUT") {
            if let Ok(timeout) = timeout.parse() {
                self.session.timeout_secs = timeout;
            }
        }

        if let Some(level) = var("SESSION_MUX_LOG_LEVEL") {
            self.logging.level = level;
        } else if let Some(level) = var("RUST_LOG") {
            self.logging.level = level;
        }
    }

    /// Apply CLI argument overrides.
    pub fn apply_args(&mut self, args: &Args) {
        if let Some(host) = args.host {
            self.server.host = host.to_string();
        }

        if let Some(port) = args.port {
            self.server.port = port;
        }

        if let Some(ref prefix) = args.prefix {
            self.server.prefix = prefix.clone();
        }

        if let Some(timeout) = args.session_timeout {
            self.session.timeout_secs = timeout;
        }

        if let Some(ref level) = args.log_level {
            self.logging.level = level.clone();
        }
    }

    /// Load configuration with full priority chain.
    ///
    /// Priority: CLI args > env vars > config file > defaults
    pub fn load(args: &Args) -> Result<Self, ConfigError> {
        let mut config = match args.config {
            Some(ref path) => Config::from_file(path)?,
            None => Config::default(),
        };
        config.apply_env();
        config.apply_args(args);
        Ok(config)
    }

    /// Convert to ServerConfig for the HTTP server.
    pub fn to_server_config(&self) -> Result<ServerConfig, ConfigError> {
        let host: IpAddr = self
            .server
            .host
            .parse()
            .map_err(|_| ConfigError::InvalidHost(self.server.host.clone()))?;

        let mut server_config = ServerConfig::new(host.to_string(), self.server.port)
            .with_max_body_bytes(self.server.max_body_bytes);
        if !self.server.graceful_shutdown {
            server_config = server_config.without_graceful_shutdown();
        }
        Ok(server_config)
    }

    /// Convert to MemoryConfig for the memory backend.
    pub fn to_memory_config(&self) -> Result<MemoryConfig, ConfigError> {
        let session = &self.session;
        if session.cookie_name.is_empty() {
            return Err(ConfigError::InvalidValue("session.cookie_name", String::new()));
        }
        if session.poll_interval_ms == 0 {
            return Err(ConfigError::InvalidValue(
                "session.poll_interval_ms",
                "0".to_string(),
            ));
        }

        Ok(MemoryConfig {
            cookie: CookieConfig {
                name: session.cookie_name.clone(),
                domain: session.cookie_domain.clone(),
                path: session.cookie_path.clone(),
                max_age: Duration::from_secs(session.cookie_max_age_secs),
            },
            idle_timeout: Duration::from_secs(session.timeout_secs),
            poll_interval: Duration::from_millis(session.poll_interval_ms),
        })
    }

    /// Convert to DispatchConfig for the dispatcher.
    pub fn to_dispatch_config(&self) -> DispatchConfig {
        let slow_threshold = match self.dispatch.slow_threshold_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        };
        DispatchConfig {
            prefix: self.server.prefix.clone(),
            cookie: CookieScope {
                domain: self.session.cookie_domain.clone(),
                path: self.session.cookie_path.clone(),
            },
            slow_threshold,
            filters_enabled: self.dispatch.filters_enabled,
            handlers_enabled: self.dispatch.handlers_enabled,
        }
    }

    /// Get the log level filter string.
    pub fn log_filter(&self) -> &str {
        &self.logging.level
    }
}

/// Configuration errors.
#[derive(Debug)]
pub enum ConfigError {
    /// IO error reading config file.
    Io(std::io::Error),
    /// JSON parsing error.
    Json(serde_json::Error),
    /// Invalid host address.
    InvalidHost(String),
    /// A setting holds a value the server cannot run with.
    InvalidValue(&'static str, String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "failed to read config file: {}", e),
            Self::Json(e) => write!(f, "failed to parse config file: {}", e),
            Self::InvalidHost(host) => write!(f, "invalid host address: {}", host),
            Self::InvalidValue(name, value) => {
                write!(f, "invalid value for {}: '{}'", name, value)
            }
        }
    }
}

impl std::error::Error for ConfigError {}
