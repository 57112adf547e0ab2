//! Stripe payment backend.
//!
//! Charges are created as confirmed PaymentIntents against the Stripe REST
//! API (form-encoded, bearer-authenticated). The backend reports unavailable
//! until `STRIPE_ENABLED` is set and a secret key is configured; selecting it
//! anyway is a loud error, not a silent decline.
//!
//! Stripe card errors map onto the same decline shape the mock produces, so
//! the donation service treats both backends identically.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{error, info};

use crate::config::Config;
use crate::errors::{DonationError, Result};
use crate::models::{CardDetails, Donation, NewDonation};
use crate::payments::{
    ChargeDecline, ChargeReceipt, PaymentAttempt, PaymentGateway, PaymentVerification,
    RefundReceipt,
};

const STRIPE_API_BASE: &str = "https://api.stripe.com/v1";

#[derive(Debug)]
pub struct StripeGateway {
    client: reqwest::Client,
    enabled: bool,
    secret_key: Option<String>,
    currency: String,
}

impl StripeGateway {
    pub fn from_config(config: &Config) -> Self {
        StripeGateway {
            client: reqwest::Client::new(),
            enabled: config.stripe_enabled,
            secret_key: config.stripe_secret_key.clone(),
            currency: config.currency.to_lowercase(),
        }
    }

    fn secret_key(&self) -> Result<&str> {
        self.secret_key
            .as_deref()
            .filter(|_| self.enabled)
            .ok_or_else(|| DonationError::Gateway("Stripe gateway is not configured".to_string()))
    }
}

/// Split an `MM/YY` expiry into Stripe's month and four-digit year fields.
pub(crate) fn parse_expiry(expiry: &str) -> Result<(String, String)> {
    let month = expiry.get(0..2);
    let year = expiry.get(3..5);
    match (month, year) {
        (Some(month), Some(year))
            if expiry.len() == 5
                && expiry.as_bytes()[2] == b'/'
                && month.bytes().chain(year.bytes()).all(|b| b.is_ascii_digit()) =>
        {
            Ok((month.to_string(), format!("20{year}")))
        }
        _ => Err(DonationError::Gateway(format!(
            "Invalid card expiry format: {expiry:?}"
        ))),
    }
}

// ─────────────────────────────────────────────────────────
// Wire types
// ─────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct PaymentIntent {
    id: String,
    status: String,
}

#[derive(Debug, Deserialize)]
struct StripeErrorBody {
    error: StripeError,
}

#[derive(Debug, Deserialize)]
struct StripeError {
    #[serde(rename = "type")]
    kind: String,
    code: Option<String>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Refund {
    id: String,
    amount: i64,
    created: i64,
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    async fn process_payment(
        &self,
        donation: &NewDonation,
        card: &CardDetails,
    ) -> Result<PaymentAttempt> {
        let key = self.secret_key()?;
        let (exp_month, exp_year) = parse_expiry(&card.card_expiry)?;

        let params: Vec<(&str, String)> = vec![
            ("amount", donation.amount_cents.to_string()),
            ("currency", self.currency.clone()),
            ("payment_method_data[type]", "card".to_string()),
            ("payment_method_data[card][number]", card.normalized_number()),
            ("payment_method_data[card][exp_month]", exp_month),
            ("payment_method_data[card][exp_year]", exp_year),
            ("payment_method_data[card][cvc]", card.card_cvc.clone()),
            ("confirmation_method", "manual".to_string()),
            ("confirm", "true".to_string()),
            ("metadata[transaction_id]", donation.transaction_id.clone()),
            ("metadata[campaign_id]", donation.campaign_id.to_string()),
        ];

        let response = self
            .client
            .post(format!("{STRIPE_API_BASE}/payment_intents"))
            .bearer_auth(key)
            .form(&params)
            .send()
            .await?;

        let http_status = response.status();
        if http_status.is_success() {
            let intent: PaymentIntent = response.json().await?;
            if intent.status == "succeeded" {
                info!(
                    transaction_id = %donation.transaction_id,
                    payment_intent = %intent.id,
                    "Stripe payment succeeded"
                );
                return Ok(PaymentAttempt::Approved(ChargeReceipt {
                    gateway_transaction_id: intent.id,
                    // Stripe reports its fee later, on the balance
                    // transaction, so it is unknown at charge time.
                    fee_cents: 0,
                    net_cents: donation.amount_cents,
                }));
            }
            return Ok(PaymentAttempt::Declined(ChargeDecline {
                error_code: "STRIPE_ERROR".to_string(),
                error_message: format!("Payment not completed (status: {})", intent.status),
                gateway_transaction_id: Some(intent.id),
            }));
        }

        let body: StripeErrorBody = response.json().await.map_err(|_| {
            DonationError::Gateway(format!("Stripe error (HTTP {http_status})"))
        })?;
        if body.error.kind == "card_error" {
            // Declines come back as card_error; everything else is on us.
            return Ok(PaymentAttempt::Declined(ChargeDecline {
                error_code: body
                    .error
                    .code
                    .map(|code| code.to_uppercase())
                    .unwrap_or_else(|| "CARD_DECLINED".to_string()),
                error_message: body
                    .error
                    .message
                    .unwrap_or_else(|| "Payment declined by issuing bank".to_string()),
                gateway_transaction_id: None,
            }));
        }

        error!(
            transaction_id = %donation.transaction_id,
            kind = %body.error.kind,
            "Stripe payment failed"
        );
        Err(DonationError::Gateway(format!(
            "Stripe error: {}",
            body.error.message.unwrap_or_else(|| http_status.to_string())
        )))
    }

    async fn verify_payment(&self, gateway_transaction_id: &str) -> Result<PaymentVerification> {
        let key = self.secret_key()?;
        let intent: PaymentIntent = self
            .client
            .get(format!(
                "{STRIPE_API_BASE}/payment_intents/{gateway_transaction_id}"
            ))
            .bearer_auth(key)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(PaymentVerification {
            success: intent.status == "succeeded",
            status: intent.status,
            verified_at: Utc::now(),
        })
    }

    async fn refund_payment(
        &self,
        donation: &Donation,
        amount_cents: Option<i64>,
    ) -> Result<RefundReceipt> {
        let key = self.secret_key()?;
        let payment_intent = donation.gateway_transaction_id.as_deref().ok_or_else(|| {
            DonationError::Gateway("Donation has no gateway transaction to refund".to_string())
        })?;

        let mut params: Vec<(&str, String)> =
            vec![("payment_intent", payment_intent.to_string())];
        if let Some(amount) = amount_cents {
            params.push(("amount", amount.to_string()));
        }

        let refund: Refund = self
            .client
            .post(format!("{STRIPE_API_BASE}/refunds"))
            .bearer_auth(key)
            .form(&params)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(RefundReceipt {
            refund_id: refund.id,
            amount_cents: refund.amount,
            refunded_at: DateTime::from_timestamp(refund.created, 0).unwrap_or_else(Utc::now),
        })
    }

    fn name(&self) -> &'static str {
        "Stripe"
    }

    fn is_available(&self) -> bool {
        self.enabled && self.secret_key.is_some()
    }
}
