//! services/kiosk/src/config.rs
//!
//! Defines the kiosk's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use loyalty_core::{Capability, EndpointMap, ProgressTarget};
use reqwest::Url;
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
    /// Remote REST API base, without a trailing slash.
    pub api_base_url: String,
    pub log_level: Level,
    pub session_path: PathBuf,
    pub reward_target: ProgressTarget,
    pub request_timeout: Duration,
    pub cors_origin: String,
    pub endpoints: EndpointMap,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any key/value source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // --- Server Settings ---
        let bind_address_str = lookup("BIND_ADDRESS").unwrap_or_else(|| "0.0.0.0:4000".to_string());
        let bind_address = bind_address_str.parse::<SocketAddr>().map_err(|e| {
            ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string())
        })?;

        let log_level_str = lookup("RUST_LOG").unwrap_or_else(|| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let cors_origin =
            lookup("CORS_ORIGIN").unwrap_or_else(|| "http://localhost:3000".to_string());

        let session_path = lookup("SESSION_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./.kiosk/session.json"));

        // --- Remote API Settings ---
        let api_base_url = lookup("API_BASE_URL")
            .ok_or_else(|| ConfigError::MissingVar("API_BASE_URL".to_string()))?;
        let parsed = Url::parse(api_base_url.trim()).map_err(|e| {
            ConfigError::InvalidValue("API_BASE_URL".to_string(), e.to_string())
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidValue(
                "API_BASE_URL".to_string(),
                format!("unsupported scheme '{}'", parsed.scheme()),
            ));
        }
        let api_base_url = api_base_url.trim().trim_end_matches('/').to_string();

        let request_timeout_secs = parse_or("REQUEST_TIMEOUT_SECS", &lookup, 10u64)?;
        if request_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "REQUEST_TIMEOUT_SECS".to_string(),
                "must be greater than zero".to_string(),
            ));
        }

        // --- Loyalty Program Settings ---
        let reward_target = parse_or("REWARD_TARGET", &lookup, 10u32)
            .and_then(|t| {
                ProgressTarget::new(t).ok_or_else(|| {
                    ConfigError::InvalidValue(
                        "REWARD_TARGET".to_string(),
                        "must be greater than zero".to_string(),
                    )
                })
            })?;

        let mut endpoints = EndpointMap::default();
        for capability in Capability::ALL {
            let var = format!("ENDPOINT_{}", capability.env_key());
            if let Some(template) = lookup(&var) {
                endpoints
                    .set(capability, &template)
                    .map_err(|e| ConfigError::InvalidValue(var, e.to_string()))?;
            }
        }

        Ok(Self {
            bind_address,
            api_base_url,
            log_level,
            session_path,
            reward_target,
            request_timeout: Duration::from_secs(request_timeout_secs),
            cors_origin,
            endpoints,
        })
    }
}

fn parse_or<F, T>(key: &str, lookup: &F, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidValue(key.to_string(), e.to_string())),
        None => Ok(default),
    }
}
