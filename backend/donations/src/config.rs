//! Application configuration loaded from environment variables.
//!
//! Loaded once in `main` and passed explicitly into every constructor that
//! needs it; nothing else in the crate reads the environment.

use crate::errors::{DonationError, Result};

#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the SQLite database file
    pub database_url: String,
    /// Port for the REST API server
    pub api_port: u16,
    /// Key of the payment gateway used for new donations (e.g. "mock", "stripe")
    pub payment_driver: String,
    /// Smallest accepted donation, in minor currency units
    pub min_amount_cents: i64,
    /// Largest accepted donation, in minor currency units
    pub max_amount_cents: i64,
    /// ISO 4217 currency code for all monetary amounts
    pub currency: String,
    /// How long to wait for the gateway before treating the charge as failed
    pub gateway_timeout_secs: u64,
    /// Simulated processing delay of the mock gateway (zero in tests)
    pub mock_latency_ms: u64,
    /// Whether the Stripe gateway may be selected
    pub stripe_enabled: bool,
    /// Stripe API secret; the Stripe gateway reports unavailable without it
    pub stripe_secret_key: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Config {
            database_url: env_var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite:./giveback.db".to_string()),
            api_port: env_var("API_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .map_err(|_| DonationError::Config("Invalid API_PORT".to_string()))?,
            payment_driver: env_var("PAYMENT_DRIVER").unwrap_or_else(|_| "mock".to_string()),
            min_amount_cents: env_var("PAYMENT_MIN_AMOUNT_CENTS")
                .unwrap_or_else(|_| "100".to_string())
                .parse()
                .map_err(|_| {
                    DonationError::Config("Invalid PAYMENT_MIN_AMOUNT_CENTS".to_string())
                })?,
            max_amount_cents: env_var("PAYMENT_MAX_AMOUNT_CENTS")
                .unwrap_or_else(|_| "1000000".to_string())
                .parse()
                .map_err(|_| {
                    DonationError::Config("Invalid PAYMENT_MAX_AMOUNT_CENTS".to_string())
                })?,
            currency: env_var("PAYMENT_CURRENCY").unwrap_or_else(|_| "EUR".to_string()),
            gateway_timeout_secs: env_var("PAYMENT_TIMEOUT_SECS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .map_err(|_| DonationError::Config("Invalid PAYMENT_TIMEOUT_SECS".to_string()))?,
            mock_latency_ms: env_var("MOCK_PAYMENT_LATENCY_MS")
                .unwrap_or_else(|_| "500".to_string())
                .parse()
                .map_err(|_| {
                    DonationError::Config("Invalid MOCK_PAYMENT_LATENCY_MS".to_string())
                })?,
            stripe_enabled: env_var("STRIPE_ENABLED")
                .unwrap_or_else(|_| "false".to_string())
                .parse()
                .map_err(|_| DonationError::Config("Invalid STRIPE_ENABLED".to_string()))?,
            stripe_secret_key: env_var("STRIPE_SECRET_KEY").ok(),
        })
    }
}

/// The same fallback values `from_env` uses when a variable is unset.
impl Default for Config {
    fn default() -> Self {
        Config {
            database_url: "sqlite:./giveback.db".to_string(),
            api_port: 3000,
            payment_driver: "mock".to_string(),
            min_amount_cents: 100,
            max_amount_cents: 1_000_000,
            currency: "EUR".to_string(),
            gateway_timeout_secs: 30,
            mock_latency_ms: 500,
            stripe_enabled: false,
            stripe_secret_key: None,
        }
    }
}

fn env_var(key: &str) -> Result<String> {
    std::env::var(key).map_err(|_| DonationError::Config(format!("Missing env var: {key}")))
}
