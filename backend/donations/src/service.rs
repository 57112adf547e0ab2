//! Donation orchestration — the core processing pipeline.
//!
//! `DonationService::process_donation` drives one attempt end to end:
//!
//! 1. Eligibility and amount validation, before anything is persisted.
//! 2. Gateway charge, with a timeout, *outside* any database transaction so
//!    the pool never holds locks across network latency. A timeout becomes an
//!    ordinary decline, never a stranded pending row.
//! 3. Reconciliation: one short transaction that inserts the finalized
//!    donation row and, for approved charges, folds the amount into the
//!    campaign's aggregate counters and closes the campaign when the goal is
//!    reached. The row insert is the transaction's first statement, so
//!    SQLite's writer lock serializes the counter math against concurrent
//!    donations to the same campaign.
//!
//! Declines commit a `failed` row and leave the aggregates untouched; that is
//! a valid outcome, not a rollback. Only system errors (gateway unreachable,
//! persistence failure) roll back and propagate.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::db;
use crate::errors::{DonationError, Result};
use crate::models::{
    format_amount, round_to_cents, Campaign, CampaignStatus, CardDetails, Donation,
    DonationRequest, DonationStatus, NewDonation,
};
use crate::notify::Notifier;
use crate::payments::{ChargeDecline, PaymentAttempt, PaymentManager};

/// Final state of a processed donation attempt.
///
/// Both variants carry the persisted donation row; `Failed` is the committed
/// decline outcome, not an error.
#[derive(Debug, Clone)]
pub enum DonationOutcome {
    Completed {
        donation: Donation,
    },
    Failed {
        donation: Donation,
        error_code: String,
        error_message: String,
    },
}

/// Stateless coordinator between the payment gateways and the ledger.
pub struct DonationService {
    pool: SqlitePool,
    manager: Arc<PaymentManager>,
    notifier: Arc<dyn Notifier>,
    min_amount_cents: i64,
    max_amount_cents: i64,
    gateway_timeout: Duration,
}

impl DonationService {
    pub fn new(
        pool: SqlitePool,
        manager: Arc<PaymentManager>,
        notifier: Arc<dyn Notifier>,
        config: &Config,
    ) -> Self {
        DonationService {
            pool,
            manager,
            notifier,
            min_amount_cents: config.min_amount_cents,
            max_amount_cents: config.max_amount_cents,
            gateway_timeout: Duration::from_secs(config.gateway_timeout_secs),
        }
    }

    /// Process one donation attempt against an already-loaded campaign.
    ///
    /// Validation failures return `Err` before any row exists. Once the
    /// gateway has answered, exactly one donation row is committed — failed
    /// or completed — and `Ok` carries it either way.
    pub async fn process_donation(
        &self,
        campaign: &Campaign,
        donor_id: i64,
        request: DonationRequest,
    ) -> Result<DonationOutcome> {
        self.check_eligibility(campaign)?;
        let amount_cents = self.normalize_amount(request.amount)?;

        let mut donation = NewDonation::pending(
            campaign.id,
            donor_id,
            amount_cents,
            request.is_anonymous,
            request.message,
        );

        info!(
            campaign_id = campaign.id,
            donor_id,
            transaction_id = %donation.transaction_id,
            amount_cents,
            "Processing donation"
        );

        match self.settle(donor_id, &mut donation, &request.card).await {
            Ok(outcome) => Ok(outcome),
            Err(err) => {
                error!(
                    campaign_id = campaign.id,
                    donor_id,
                    error = %err,
                    "Donation processing failed"
                );
                Err(err)
            }
        }
    }

    // ─── validation ──────────────────────────────────────

    fn check_eligibility(&self, campaign: &Campaign) -> Result<()> {
        if campaign.status != CampaignStatus::Active {
            return Err(DonationError::validation(
                "campaign",
                "This campaign is not currently accepting donations.",
            ));
        }
        if campaign.has_ended(Utc::now()) {
            return Err(DonationError::validation(
                "campaign",
                "This campaign has ended and is no longer accepting donations.",
            ));
        }
        Ok(())
    }

    fn normalize_amount(&self, amount: f64) -> Result<i64> {
        let cents = round_to_cents(amount);
        if cents < self.min_amount_cents {
            return Err(DonationError::validation(
                "amount",
                format!(
                    "Donation amount must be at least €{}.",
                    format_amount(self.min_amount_cents)
                ),
            ));
        }
        if cents > self.max_amount_cents {
            return Err(DonationError::validation(
                "amount",
                format!(
                    "Donation amount cannot exceed €{}.",
                    format_amount(self.max_amount_cents)
                ),
            ));
        }
        Ok(cents)
    }

    // ─── charge and reconcile ────────────────────────────

    async fn settle(
        &self,
        donor_id: i64,
        donation: &mut NewDonation,
        card: &CardDetails,
    ) -> Result<DonationOutcome> {
        let attempt = self.charge(donation, card).await?;
        let now = Utc::now();

        let decline = match attempt {
            PaymentAttempt::Approved(receipt) => {
                info!(
                    transaction_id = %donation.transaction_id,
                    gateway_transaction_id = %receipt.gateway_transaction_id,
                    fee_cents = receipt.fee_cents,
                    net_cents = receipt.net_cents,
                    "Payment approved"
                );
                donation.mark_completed(receipt.gateway_transaction_id, now)?;
                None
            }
            PaymentAttempt::Declined(decline) => {
                donation.mark_failed(decline.gateway_transaction_id.clone())?;
                Some(decline)
            }
        };

        let donation_id = self.persist_outcome(donation, now).await?;
        let stored = db::get_donation(&self.pool, donation_id)
            .await?
            .ok_or(DonationError::NotFound("Donation"))?;

        match decline {
            None => {
                self.dispatch_confirmation(donor_id, &stored);
                info!(
                    donation_id = stored.id,
                    campaign_id = stored.campaign_id,
                    "Donation completed"
                );
                Ok(DonationOutcome::Completed { donation: stored })
            }
            Some(decline) => {
                info!(
                    donation_id = stored.id,
                    campaign_id = stored.campaign_id,
                    error_code = %decline.error_code,
                    "Donation payment declined"
                );
                Ok(DonationOutcome::Failed {
                    donation: stored,
                    error_code: decline.error_code,
                    error_message: decline.error_message,
                })
            }
        }
    }

    /// Charge the card on the configured gateway, bounding the wait.
    async fn charge(&self, donation: &NewDonation, card: &CardDetails) -> Result<PaymentAttempt> {
        let gateway = self.manager.driver(None)?;
        match tokio::time::timeout(self.gateway_timeout, gateway.process_payment(donation, card))
            .await
        {
            Ok(attempt) => attempt,
            Err(_) => {
                warn!(
                    transaction_id = %donation.transaction_id,
                    timeout_secs = self.gateway_timeout.as_secs(),
                    "Payment gateway timed out"
                );
                Ok(PaymentAttempt::Declined(ChargeDecline {
                    error_code: "GATEWAY_TIMEOUT".to_string(),
                    error_message: "The payment could not be processed in time. Please try again."
                        .to_string(),
                    gateway_transaction_id: None,
                }))
            }
        }
    }

    /// Commit the finalized donation and, when completed, the campaign
    /// aggregate updates, as one atomic unit.
    async fn persist_outcome(&self, donation: &NewDonation, now: DateTime<Utc>) -> Result<i64> {
        let mut tx = self.pool.begin().await?;

        // First statement on purpose: the INSERT acquires the writer lock,
        // so the counter reads below see no concurrent mutation.
        let donation_id = db::insert_donation(&mut *tx, donation, now).await?;

        if donation.status == DonationStatus::Completed {
            let prior = db::count_prior_completed_donations(
                &mut *tx,
                donation.campaign_id,
                donation.donor_id,
                donation_id,
            )
            .await?;
            db::apply_completed_donation(
                &mut *tx,
                donation.campaign_id,
                donation.amount_cents,
                prior == 0,
                now,
            )
            .await?;
            if db::close_campaign_if_goal_reached(&mut *tx, donation.campaign_id, now).await? {
                info!(campaign_id = donation.campaign_id, "Campaign goal reached");
            }
        }

        tx.commit().await?;
        Ok(donation_id)
    }

    /// Queue the thank-you notification off the critical path.
    fn dispatch_confirmation(&self, donor_id: i64, donation: &Donation) {
        let notifier = Arc::clone(&self.notifier);
        let donation = donation.clone();
        tokio::spawn(async move {
            if let Err(err) = notifier.donation_confirmation(donor_id, &donation).await {
                warn!(
                    donation_id = donation.id,
                    error = %err,
                    "Confirmation dispatch failed"
                );
            }
        });
    }
}
