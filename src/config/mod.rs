//! Configuration management for authgate
//!
//! This module handles loading, parsing, and validating application configuration
//! from YAML files and environment variables.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::auth::session::{MAX_IDLE_TIMEOUT, MAX_SWEEP_INTERVAL};
use crate::auth::token::MAX_TOKEN_TTL;
use crate::auth::{signing_secret, SessionConfig, TokenCodec};
use crate::models::Identity;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Authentication configuration
    #[serde(default)]
    pub auth: AuthConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::FileRead(format!("Failed to read config file: {}", e)))?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let expanded = expand_env_vars(yaml);
        let config: Config = serde_yaml::from_str(&expanded)
            .map_err(|e| ConfigError::Parse(format!("Failed to parse YAML: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from environment variables with prefix AUTHGATE_
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Config::default();

        if let Ok(host) = std::env::var("AUTHGATE_SERVER_HOST") {
            config.server.host = host;
        }
        if let Ok(port) = std::env::var("AUTHGATE_SERVER_PORT") {
            config.server.port = port
                .parse()
                .map_err(|_| ConfigError::Parse("Invalid port number".to_string()))?;
        }

        if let Ok(mechanism) = std::env::var("AUTHGATE_AUTH_MECHANISM") {
            config.auth.mechanism = match mechanism.to_lowercase().as_str() {
                "session" => AuthMechanism::Session,
                "token" => AuthMechanism::Token,
                other => {
                    return Err(ConfigError::InvalidValue(format!(
                        "Unknown auth mechanism: {}",
                        other
                    )))
                }
            };
        }
        if let Ok(secs) = std::env::var("AUTHGATE_SESSION_IDLE_TIMEOUT_SECS") {
            config.auth.session.idle_timeout_secs = secs
                .parse()
                .map_err(|_| ConfigError::Parse("Invalid session idle timeout".to_string()))?;
        }
        if let Ok(cross_site) = std::env::var("AUTHGATE_SESSION_CROSS_SITE") {
            config.auth.session.cross_site = cross_site.parse().unwrap_or(true);
        }
        if let Ok(secret) = std::env::var("AUTHGATE_TOKEN_SECRET") {
            config.auth.token.secret = Some(secret);
        }

        if let Ok(level) = std::env::var("AUTHGATE_LOG_LEVEL") {
            config.logging.level = level;
        }
        if let Ok(format) = std::env::var("AUTHGATE_LOG_FORMAT") {
            config.logging.format = format;
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject values that would break the session or token machinery
    pub fn validate(&self) -> Result<(), ConfigError> {
        let session = &self.auth.session;
        check_range(
            "auth.session.idle_timeout_secs",
            session.idle_timeout_secs,
            MAX_IDLE_TIMEOUT,
        )?;
        check_range(
            "auth.session.sweep_interval_secs",
            session.sweep_interval_secs,
            MAX_SWEEP_INTERVAL,
        )?;
        if session.cookie_name.is_empty() || session.header_name.is_empty() {
            return Err(ConfigError::InvalidValue(
                "auth.session cookie and header names must not be empty".to_string(),
            ));
        }
        check_range("auth.token.ttl_secs", self.auth.token.ttl_secs, MAX_TOKEN_TTL)
    }
}

/// Durations must be in `1..=max` seconds
fn check_range(field: &str, secs: u64, max: Duration) -> Result<(), ConfigError> {
    if secs == 0 || secs > max.as_secs() {
        return Err(ConfigError::InvalidValue(format!(
            "{} must be between 1 and {}",
            field,
            max.as_secs()
        )));
    }
    Ok(())
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerConfig {
    /// Host address to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

/// Which credential mechanism guards the API
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AuthMechanism {
    /// Opaque handle resolved through the session registry
    #[default]
    Session,

    /// Self-contained signed token
    Token,
}

/// Authentication configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AuthConfig {
    /// Active mechanism
    #[serde(default)]
    pub mechanism: AuthMechanism,

    /// Session registry settings
    #[serde(default)]
    pub session: SessionSettings,

    /// Token codec settings
    #[serde(default)]
    pub token: TokenSettings,

    /// Accounts accepted by the login endpoint
    #[serde(default)]
    pub users: Vec<UserAccount>,
}

/// Session registry and cookie settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionSettings {
    /// Inactivity timeout in seconds
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,

    /// Background sweep period in seconds
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,

    /// Cookie carrying the session handle
    #[serde(default = "default_cookie_name")]
    pub cookie_name: String,

    /// Header consulted when the cookie is missing
    #[serde(default = "default_session_header")]
    pub header_name: String,

    /// Emit `Secure; SameSite=None` for cross-origin frontends
    #[serde(default = "default_cross_site")]
    pub cross_site: bool,
}

impl SessionSettings {
    /// Registry configuration derived from these settings
    pub fn registry_config(&self) -> SessionConfig {
        SessionConfig {
            idle_timeout: Duration::from_secs(self.idle_timeout_secs),
            sweep_interval: Duration::from_secs(self.sweep_interval_secs),
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            idle_timeout_secs: default_idle_timeout(),
            sweep_interval_secs: default_sweep_interval(),
            cookie_name: default_cookie_name(),
            header_name: default_session_header(),
            cross_site: default_cross_site(),
        }
    }
}

fn default_idle_timeout() -> u64 {
    600 // 10 minutes
}

fn default_sweep_interval() -> u64 {
    60
}

fn default_cookie_name() -> String {
    "session_id".to_string()
}

fn default_session_header() -> String {
    "X-Session-ID".to_string()
}

fn default_cross_site() -> bool {
    true
}

/// Token codec settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TokenSettings {
    /// Signing secret; when absent the `JWT_SECRET` environment variable is used
    #[serde(default)]
    pub secret: Option<String>,

    /// Token lifetime in seconds
    #[serde(default = "default_token_ttl")]
    pub ttl_secs: u64,

    /// `iss` claim value
    #[serde(default = "default_issuer")]
    pub issuer: String,
}

impl TokenSettings {
    /// Build a codec from these settings
    ///
    /// An empty or missing `secret` falls back to the process-wide
    /// `JWT_SECRET` key.
    pub fn codec(&self) -> TokenCodec {
        let ttl = Duration::from_secs(self.ttl_secs);
        match self.secret.as_deref() {
            Some(secret) if !secret.is_empty() => {
                TokenCodec::with_settings(secret.as_bytes(), ttl, self.issuer.as_str())
            }
            _ => TokenCodec::with_settings(signing_secret(), ttl, self.issuer.as_str()),
        }
    }
}

impl Default for TokenSettings {
    fn default() -> Self {
        Self {
            secret: None,
            ttl_secs: default_token_ttl(),
            issuer: default_issuer(),
        }
    }
}

fn default_token_ttl() -> u64 {
    86400 // 24 hours
}

fn default_issuer() -> String {
    "playtz-api".to_string()
}

/// Login account
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserAccount {
    pub id: String,
    pub username: String,
    pub email: String,

    /// Argon2 PHC string, see `authgate hash-password`
    pub password_hash: String,

    #[serde(default)]
    pub role_id: String,

    #[serde(default)]
    pub role_name: String,

    #[serde(default = "default_active")]
    pub active: bool,
}

impl UserAccount {
    /// Identity snapshot handed out at login
    pub fn identity(&self) -> Identity {
        Identity::new(
            &self.id,
            &self.username,
            &self.email,
            &self.role_id,
            &self.role_name,
        )
    }
}

fn default_active() -> bool {
    true
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: `json` or `pretty`
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

/// Configuration error types
#[derive(Debug, thiserror::Error, Clone, PartialEq)]
pub enum ConfigError {
    /// Error reading configuration file
    #[error("Failed to read configuration file: {0}")]
    FileRead(String),

    /// Error parsing configuration
    #[error("Failed to parse configuration: {0}")]
    Parse(String),

    /// Invalid configuration value
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

/// Expand environment variables in a string
///
/// Supports `${VAR_NAME}` syntax; unset variables are left as written.
fn expand_env_vars(input: &str) -> String {
    let re = regex_lite::Regex::new(r"\$\{([^}]+)\}")
        .expect("Invalid regex pattern for environment variable expansion");

    re.replace_all(input, |caps: &regex_lite::Captures| {
        let var_name = &caps[1];
        std::env::var(var_name).unwrap_or_else(|_| caps[0].to_string())
    })
    .into_owned()
}
