//! Donor-facing notifications.
//!
//! Confirmations are dispatched off the donation critical path, fire and
//! forget; a failed notification never fails the donation. Delivery here is
//! a structured log line standing in for the mail channel, behind the
//! [`Notifier`] trait so a real mailer can be dropped in.

use async_trait::async_trait;
use tracing::info;

use crate::errors::Result;
use crate::models::{format_amount, Donation};

#[async_trait]
pub trait Notifier: Send + Sync {
    /// Send the post-donation thank-you confirmation to the donor.
    async fn donation_confirmation(&self, donor_id: i64, donation: &Donation) -> Result<()>;
}

/// Renders the confirmation mail and writes it to the log.
pub struct MailLogNotifier;

#[async_trait]
impl Notifier for MailLogNotifier {
    async fn donation_confirmation(&self, donor_id: i64, donation: &Donation) -> Result<()> {
        info!(
            donor_id,
            donation_id = donation.id,
            subject = "Thank You for Your Donation!",
            body = %confirmation_body(donation),
            "Donation confirmation dispatched"
        );
        Ok(())
    }
}

/// The mail body for a completed donation.
pub fn confirmation_body(donation: &Donation) -> String {
    format!(
        "Hello!\n\
         \n\
         Thank you for your generous donation.\n\
         Your donation of €{amount} has been successfully processed.\n\
         We truly appreciate your support!\n\
         Transaction ID: {transaction_id}\n\
         Date: {date}\n\
         Thank you for making a difference!",
        amount = format_amount(donation.amount_cents),
        transaction_id = donation.transaction_id,
        date = donation.created_at.format("%B %-d, %Y"),
    )
}
