//! Mock payment backend.
//!
//! Deterministic stand-in for a real processor, driven entirely by the card
//! number's last digit:
//!
//! | last digit | outcome                         |
//! |-----------|----------------------------------|
//! | `1`       | declined, `CARD_DECLINED`        |
//! | `2`       | declined, `INSUFFICIENT_FUNDS`   |
//! | other     | approved                         |
//!
//! Approved charges carry a `MOCK_` gateway identifier and a 2.9% processor
//! fee, computed in integer arithmetic so `5000` cents always yields fee
//! `145` and net `4855`.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tracing::info;

use crate::config::Config;
use crate::errors::Result;
use crate::models::{random_token, CardDetails, Donation, NewDonation};
use crate::payments::{
    ChargeDecline, ChargeReceipt, PaymentAttempt, PaymentGateway, PaymentVerification,
    RefundReceipt,
};

/// Processor fee of 2.9%, truncated: `floor(amount_cents * 0.029)`.
pub(crate) fn mock_fee(amount_cents: i64) -> i64 {
    amount_cents * 29 / 1000
}

#[derive(Debug)]
pub struct MockGateway {
    latency: Duration,
}

impl MockGateway {
    pub fn from_config(config: &Config) -> Self {
        MockGateway {
            latency: Duration::from_millis(config.mock_latency_ms),
        }
    }
}

#[async_trait]
impl PaymentGateway for MockGateway {
    async fn process_payment(
        &self,
        donation: &NewDonation,
        card: &CardDetails,
    ) -> Result<PaymentAttempt> {
        info!(
            transaction_id = %donation.transaction_id,
            amount_cents = donation.amount_cents,
            card_last_four = %card.last_four(),
            "Mock payment processing started"
        );

        // Simulated processing delay.
        tokio::time::sleep(self.latency).await;

        match card.normalized_number().chars().last() {
            Some('1') => Ok(PaymentAttempt::Declined(ChargeDecline {
                error_code: "CARD_DECLINED".to_string(),
                error_message: "Payment declined by issuing bank".to_string(),
                gateway_transaction_id: None,
            })),
            Some('2') => Ok(PaymentAttempt::Declined(ChargeDecline {
                error_code: "INSUFFICIENT_FUNDS".to_string(),
                error_message: "Insufficient funds".to_string(),
                gateway_transaction_id: None,
            })),
            _ => {
                let gateway_transaction_id = random_token("MOCK_", 15);
                let fee_cents = mock_fee(donation.amount_cents);
                info!(
                    transaction_id = %donation.transaction_id,
                    gateway_transaction_id = %gateway_transaction_id,
                    "Mock payment processed successfully"
                );
                Ok(PaymentAttempt::Approved(ChargeReceipt {
                    gateway_transaction_id,
                    fee_cents,
                    net_cents: donation.amount_cents - fee_cents,
                }))
            }
        }
    }

    async fn verify_payment(&self, _gateway_transaction_id: &str) -> Result<PaymentVerification> {
        // The mock never loses a transaction.
        Ok(PaymentVerification {
            success: true,
            status: "completed".to_string(),
            verified_at: Utc::now(),
        })
    }

    async fn refund_payment(
        &self,
        donation: &Donation,
        amount_cents: Option<i64>,
    ) -> Result<RefundReceipt> {
        let amount_cents = amount_cents.unwrap_or(donation.amount_cents);
        let refund_id = random_token("REF_", 10);
        info!(
            donation_id = donation.id,
            refund_amount_cents = amount_cents,
            refund_id = %refund_id,
            "Mock refund processed"
        );
        Ok(RefundReceipt {
            refund_id,
            amount_cents,
            refunded_at: Utc::now(),
        })
    }

    fn name(&self) -> &'static str {
        "Mock Payment Service"
    }

    fn is_available(&self) -> bool {
        true
    }
}
