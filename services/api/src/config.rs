//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use std::net::SocketAddr;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub database_url: String,
    pub log_level: Level,
    pub jwt_access_secret: String,
    pub jwt_refresh_secret: String,
    pub access_token_minutes: i64,
    pub refresh_token_days: i64,
    pub cookie_domain: Option<String>,
    pub cookie_secure: bool,
    pub frontend_url: String,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination.
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        // --- Load Server and Database Settings ---
        let bind_address_str =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
        let bind_address = bind_address_str.parse::<SocketAddr>().map_err(|e| {
            ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string())
        })?;

        let database_url = std::env::var("DATABASE_URL")
            .map_err(|_| ConfigError::MissingVar("DATABASE_URL".to_string()))?;

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        // --- Load Token Settings ---
        // Secrets must carry enough entropy for HMAC; short values are refused
        // outright rather than silently accepted.
        let jwt_access_secret = require_secret("JWT_ACCESS_SECRET")?;
        let jwt_refresh_secret = require_secret("JWT_REFRESH_SECRET")?;

        let access_token_minutes = parse_or_default("ACCESS_TOKEN_MINUTES", 15)?;
        let refresh_token_days = parse_or_default("REFRESH_TOKEN_DAYS", 30)?;

        // --- Load Cookie and Frontend Settings ---
        let cookie_domain = std::env::var("COOKIE_DOMAIN").ok();
        let app_env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());
        let cookie_secure = app_env == "production";

        let frontend_url = std::env::var("FRONTEND_URL")
            .unwrap_or_else(|_| "http://localhost:3000".to_string());

        Ok(Self {
            bind_address,
            database_url,
            log_level,
            jwt_access_secret,
            jwt_refresh_secret,
            access_token_minutes,
            refresh_token_days,
            cookie_domain,
            cookie_secure,
            frontend_url,
        })
    }
}

/// Loads a required secret and enforces a 32-byte minimum length.
fn require_secret(name: &str) -> Result<String, ConfigError> {
    let value =
        std::env::var(name).map_err(|_| ConfigError::MissingVar(name.to_string()))?;
    if value.len() < 32 {
        return Err(ConfigError::InvalidValue(
            name.to_string(),
            "secret must be at least 32 bytes".to_string(),
        ));
    }
    Ok(value)
}

/// Parses an optional integer variable, falling back to a default.
fn parse_or_default(name: &str, default: i64) -> Result<i64, ConfigError> {
    match std::env::var(name) {
        Ok(raw) => raw.parse::<i64>().map_err(|_| {
            ConfigError::InvalidValue(
                name.to_string(),
                format!("'{}' is not a valid integer", raw),
            )
        }),
        Err(_) => Ok(default),
    }
}
