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
    pub cors_origin: String,
    pub openai_api_key: Option<String>,
    pub parse_api_key: Option<String>,
    pub parse_api_base_url: String,
    pub stripe_secret_key: Option<String>,
    pub stripe_webhook_secret: Option<String>,
    pub paypal_client_id: Option<String>,
    pub paypal_client_secret: Option<String>,
    pub paypal_api_base_url: String,
    pub standard_model: String,
    pub eco_model: String,
    pub premium_model: String,
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

        let cors_origin = std::env::var("CORS_ORIGIN")
            .unwrap_or_else(|_| "http://localhost:3000".to_string());

        // --- Load API Keys (as optional) ---
        let openai_api_key = std::env::var("OPENAI_API_KEY").ok();
        let parse_api_key = std::env::var("LLAMA_CLOUD_API_KEY").ok();
        let stripe_secret_key = std::env::var("STRIPE_SECRET_KEY").ok();
        let stripe_webhook_secret = std::env::var("STRIPE_WEBHOOK_SECRET").ok();
        let paypal_client_id = std::env::var("PAYPAL_CLIENT_ID").ok();
        let paypal_client_secret = std::env::var("PAYPAL_CLIENT_SECRET").ok();

        // --- Load Adapter-specific Settings ---
        let parse_api_base_url = std::env::var("PARSE_API_BASE_URL")
            .unwrap_or_else(|_| "https://api.cloud.llamaindex.ai/api/parsing".to_string());
        let paypal_api_base_url = std::env::var("PAYPAL_API_BASE_URL")
            .unwrap_or_else(|_| "https://api-m.sandbox.paypal.com".to_string());
        let standard_model =
            std::env::var("STANDARD_MODEL").unwrap_or_else(|_| "gpt-4o".to_string());
        let eco_model = std::env::var("ECO_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string());
        let premium_model =
            std::env::var("PREMIUM_MODEL").unwrap_or_else(|_| "gpt-4.1".to_string());

        Ok(Self {
            bind_address,
            database_url,
            log_level,
            cors_origin,
            openai_api_key,
            parse_api_key,
            parse_api_base_url,
            stripe_secret_key,
            stripe_webhook_secret,
            paypal_client_id,
            paypal_client_secret,
            paypal_api_base_url,
            standard_model,
            eco_model,
            premium_model,
        })
    }
}
