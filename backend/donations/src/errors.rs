//! Application-wide error types.
//!
//! Validation failures and payment declines are kept apart on purpose:
//! a decline is an ordinary, committed outcome carried as a value (see
//! [`crate::payments::PaymentAttempt`]), while a [`DonationError`] always
//! means the request itself was rejected or something exceptional broke.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DonationError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Payment gateway error: {0}")]
    Gateway(String),

    #[error("Configuration error: {0}")]
    Config(String),

    /// Input rejected before any persistence; `field` names the offending
    /// request field so callers can surface a field-tagged message.
    #[error("{message}")]
    Validation {
        field: &'static str,
        message: String,
    },

    /// A donation status move that the lifecycle state machine forbids.
    #[error("Invalid donation status transition: {from} -> {to}")]
    InvalidTransition {
        from: &'static str,
        to: &'static str,
    },

    #[error("{0} not found")]
    NotFound(&'static str),
}

impl DonationError {
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        DonationError::Validation {
            field,
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, DonationError>;
