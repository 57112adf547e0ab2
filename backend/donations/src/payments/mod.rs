//! Payment gateway abstraction.
//!
//! A [`PaymentGateway`] is a pluggable charge/verify/refund backend. The
//! [`PaymentManager`] holds the closed set of registered backends and resolves
//! a configuration key (`"mock"`, `"stripe"`) to one of them, falling back to
//! the configured default when no key is given.
//!
//! Gateways are side-effect-free with respect to donation and campaign rows;
//! all persistence belongs to the donation service. Ordinary declines are
//! values ([`PaymentAttempt::Declined`]), never `Err` — the error channel is
//! reserved for conditions like an unreachable gateway.

mod mock;
mod stripe;

pub use mock::MockGateway;
pub use stripe::StripeGateway;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::config::Config;
use crate::errors::{DonationError, Result};
use crate::models::{CardDetails, Donation, NewDonation};

// ─────────────────────────────────────────────────────────
// Gateway results
// ─────────────────────────────────────────────────────────

/// Outcome of a charge attempt. Both variants are ordinary, committed
/// results; the donation service persists a row for either.
#[derive(Debug, Clone)]
pub enum PaymentAttempt {
    Approved(ChargeReceipt),
    Declined(ChargeDecline),
}

/// Details of an approved charge.
#[derive(Debug, Clone)]
pub struct ChargeReceipt {
    /// Identifier assigned by the gateway (`MOCK_*`, Stripe `pi_*`).
    pub gateway_transaction_id: String,
    /// Processor fee withheld from the charge, in cents.
    pub fee_cents: i64,
    /// Amount after the processor fee, in cents.
    pub net_cents: i64,
}

/// Details of a declined charge.
#[derive(Debug, Clone)]
pub struct ChargeDecline {
    /// Categorical code such as `CARD_DECLINED` or `INSUFFICIENT_FUNDS`.
    pub error_code: String,
    /// User-facing explanation from the gateway.
    pub error_message: String,
    /// Some gateways assign an identifier even to declined charges.
    pub gateway_transaction_id: Option<String>,
}

/// Result of looking up a previously processed transaction.
#[derive(Debug, Clone)]
pub struct PaymentVerification {
    pub success: bool,
    pub status: String,
    pub verified_at: DateTime<Utc>,
}

/// Result of a successful refund.
#[derive(Debug, Clone)]
pub struct RefundReceipt {
    pub refund_id: String,
    pub amount_cents: i64,
    pub refunded_at: DateTime<Utc>,
}

// ─────────────────────────────────────────────────────────
// Gateway trait
// ─────────────────────────────────────────────────────────

/// A payment processing backend.
#[async_trait]
pub trait PaymentGateway: Send + Sync + std::fmt::Debug {
    /// Attempt to charge the card for the given pending donation.
    ///
    /// The donation carries the normalized amount and the internal
    /// transaction identifier; raw card fields are used for the charge and
    /// never persisted.
    async fn process_payment(
        &self,
        donation: &NewDonation,
        card: &CardDetails,
    ) -> Result<PaymentAttempt>;

    /// Idempotent lookup of a processed transaction's status.
    async fn verify_payment(&self, gateway_transaction_id: &str) -> Result<PaymentVerification>;

    /// Refund a completed donation; `amount_cents` of `None` refunds in full.
    async fn refund_payment(
        &self,
        donation: &Donation,
        amount_cents: Option<i64>,
    ) -> Result<RefundReceipt>;

    /// Human-readable processor name for display.
    fn name(&self) -> &'static str;

    /// Whether the backend is usable with the current configuration.
    fn is_available(&self) -> bool;
}

// ─────────────────────────────────────────────────────────
// Manager
// ─────────────────────────────────────────────────────────

/// Registry of payment backends, keyed by driver name.
///
/// The set is closed and built once at startup from [`Config`]; there is no
/// runtime registration. Registration order is the display order.
pub struct PaymentManager {
    drivers: Vec<(&'static str, Arc<dyn PaymentGateway>)>,
    default_driver: String,
}

impl PaymentManager {
    /// Build the registry with the mock and Stripe backends.
    pub fn from_config(config: &Config) -> Self {
        let drivers: Vec<(&'static str, Arc<dyn PaymentGateway>)> = vec![
            ("mock", Arc::new(MockGateway::from_config(config))),
            ("stripe", Arc::new(StripeGateway::from_config(config))),
        ];
        PaymentManager {
            drivers,
            default_driver: config.payment_driver.clone(),
        }
    }

    /// Resolve a driver by name, or the configured default when `None`.
    pub fn driver(&self, name: Option<&str>) -> Result<Arc<dyn PaymentGateway>> {
        let name = name.unwrap_or(&self.default_driver);
        self.drivers
            .iter()
            .find(|(key, _)| *key == name)
            .map(|(_, gateway)| Arc::clone(gateway))
            .ok_or_else(|| DonationError::Config(format!("Payment driver [{name}] not found.")))
    }

    /// Name of the configured default driver.
    pub fn default_driver(&self) -> &str {
        &self.default_driver
    }

    /// `(key, display name)` pairs for every backend reporting available,
    /// in registration order.
    pub fn available_drivers(&self) -> Vec<(&'static str, &'static str)> {
        self.drivers
            .iter()
            .filter(|(_, gateway)| gateway.is_available())
            .map(|(key, gateway)| (*key, gateway.name()))
            .collect()
    }
}
