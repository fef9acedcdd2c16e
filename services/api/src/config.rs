//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use chrono::{Duration, FixedOffset};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
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
    /// JSON document backing the installation's local store.
    pub local_store_path: PathBuf,
    /// Zone used to decide which calendar day a write falls on.
    pub utc_offset: FixedOffset,
    pub cors_origin: String,
    pub session_ttl: Duration,
    pub reset_token_ttl: Duration,
    /// Base of the link printed for password resets; the token is appended.
    pub reset_url_base: String,
    pub openai_api_key: Option<String>,
    pub feedback_model: String,
    pub feedback_seed: Option<u64>,
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
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let or_default = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        // --- Server and Database Settings ---
        let bind_address = parse_var("BIND_ADDRESS", &or_default("BIND_ADDRESS", "0.0.0.0:3000"))?;

        let database_url =
            lookup("DATABASE_URL").ok_or_else(|| ConfigError::MissingVar("DATABASE_URL".to_string()))?;

        let log_level_str = or_default("RUST_LOG", "INFO");
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        // --- Journal Settings ---
        let local_store_path = PathBuf::from(or_default("LOCAL_STORE_PATH", "./raven-local.json"));
        let utc_offset = parse_var("JOURNAL_UTC_OFFSET", &or_default("JOURNAL_UTC_OFFSET", "+00:00"))?;

        // --- Auth Settings ---
        let cors_origin = or_default("CORS_ORIGIN", "http://localhost:5173");
        let session_days: i64 = parse_var("SESSION_DAYS", &or_default("SESSION_DAYS", "30"))?;
        let reset_minutes: i64 =
            parse_var("RESET_TOKEN_MINUTES", &or_default("RESET_TOKEN_MINUTES", "60"))?;
        if session_days <= 0 || reset_minutes <= 0 {
            return Err(ConfigError::InvalidValue(
                "SESSION_DAYS/RESET_TOKEN_MINUTES".to_string(),
                "durations must be positive".to_string(),
            ));
        }
        let reset_url_base =
            or_default("RESET_URL_BASE", "http://localhost:5173/#reset-password?token=");

        // --- Feedback Settings ---
        let openai_api_key = lookup("OPENAI_API_KEY").filter(|k| !k.trim().is_empty());
        let feedback_model = or_default("FEEDBACK_MODEL", "gpt-4o-mini");
        let feedback_seed = lookup("FEEDBACK_SEED")
            .map(|s| parse_var::<u64>("FEEDBACK_SEED", &s))
            .transpose()?;

        Ok(Self {
            bind_address,
            database_url,
            log_level,
            local_store_path,
            utc_offset,
            cors_origin,
            session_ttl: Duration::days(session_days),
            reset_token_ttl: Duration::minutes(reset_minutes),
            reset_url_base,
            openai_api_key,
            feedback_model,
            feedback_seed,
        })
    }
}

fn parse_var<T>(key: &str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidValue(key.to_string(), e.to_string()))
}
