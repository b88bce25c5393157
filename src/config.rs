//! Configuration module
//!
//! Loads configuration from environment variables.

use std::env;

/// Application configuration
#[derive(Clone)]
pub struct Config {
    /// Database connection URL
    pub database_url: String,

    /// Maximum database connections in pool
    pub database_max_connections: u32,

    /// Server host
    pub host: String,

    /// Server port
    pub port: u16,

    /// Environment (development, production)
    pub environment: String,

    /// Gateway API secret key
    pub stripe_secret_key: String,

    /// Shared secret used to sign webhook notifications
    pub stripe_webhook_secret: String,

    /// Gateway API base URL (overridable for test doubles)
    pub stripe_api_base: String,

    /// ISO currency code for joining fees
    pub payment_currency: String,

    /// Where the checkout page sends the user after paying / abandoning
    pub payment_success_url: String,
    pub payment_cancel_url: String,

    /// Accepted clock skew for webhook signature timestamps
    pub webhook_tolerance_secs: i64,

    /// Age after which an UNPAID attempt is cancelled by the expiry job
    pub unpaid_payment_ttl_minutes: i64,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url = required("DATABASE_URL")?;

        let database_max_connections = parsed("DATABASE_MAX_CONNECTIONS", "10")?;

        let host = env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());

        let port = parsed("PORT", "3000")?;

        let environment = env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());

        let stripe_secret_key = required("STRIPE_SECRET_KEY")?;
        let stripe_webhook_secret = required("STRIPE_WEBHOOK_SECRET")?;
        let stripe_api_base =
            env::var("STRIPE_API_BASE").unwrap_or_else(|_| "https://api.stripe.com".to_string());

        let payment_currency = env::var("PAYMENT_CURRENCY")
            .unwrap_or_else(|_| "usd".to_string())
            .to_lowercase();
        let payment_success_url = required("PAYMENT_SUCCESS_URL")?;
        let payment_cancel_url = required("PAYMENT_CANCEL_URL")?;

        let webhook_tolerance_secs = parsed("WEBHOOK_TOLERANCE_SECS", "300")?;
        let unpaid_payment_ttl_minutes = parsed("UNPAID_PAYMENT_TTL_MINUTES", "1440")?;

        Ok(Self {
            database_url,
            database_max_connections,
            host,
            port,
            environment,
            stripe_secret_key,
            stripe_webhook_secret,
            stripe_api_base,
            payment_currency,
            payment_success_url,
            payment_cancel_url,
            webhook_tolerance_secs,
            unpaid_payment_ttl_minutes,
        })
    }

    /// Check if running in production
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    env::var(name).map_err(|_| ConfigError::MissingEnv(name))
}

fn parsed<T: std::str::FromStr>(name: &'static str, default: &str) -> Result<T, ConfigError> {
    env::var(name)
        .unwrap_or_else(|_| default.to_string())
        .parse()
        .map_err(|_| ConfigError::InvalidValue(name))
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("environment", &self.environment)
            .field("database_max_connections", &self.database_max_connections)
            .field("stripe_api_base", &self.stripe_api_base)
            .field("payment_currency", &self.payment_currency)
            .field("webhook_tolerance_secs", &self.webhook_tolerance_secs)
            .field("unpaid_payment_ttl_minutes", &self.unpaid_payment_ttl_minutes)
            .finish_non_exhaustive()
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnv(&'static str),

    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(&'static str),
}
