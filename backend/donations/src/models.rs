//! Domain types shared across the donation backend.
//!
//! ## Money
//!
//! All monetary amounts are integer minor currency units (`*_cents` columns
//! and fields). Decimal input is converted exactly once, at the edge, via
//! [`round_to_cents`]; everything past that point is integer arithmetic.
//!
//! ## Status as a Finite-State Machine
//!
//! [`DonationStatus`] enforces a strict one-directional lifecycle:
//!
//! ```text
//! pending ──► completed ──► refunded
//!     └─────► failed
//! ```
//!
//! Backward transitions and transitions out of terminal states (`failed`,
//! `refunded`) are rejected by the `mark_*` guards. A failed attempt is kept
//! as its own row; retries create a fresh donation.

use chrono::{DateTime, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::errors::{DonationError, Result};

// ─────────────────────────────────────────────────────────
// Status enums
// ─────────────────────────────────────────────────────────

/// Lifecycle status of a campaign.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum CampaignStatus {
    /// Accepting donations.
    Active,
    /// Goal reached; accepts no further donations.
    Completed,
    /// Closed by its owner before reaching the goal.
    Cancelled,
}

impl CampaignStatus {
    /// Short identifier string as stored in the database.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Lifecycle status of a single donation attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum DonationStatus {
    /// Created, gateway outcome not yet known.
    Pending,
    /// Gateway approved the charge; campaign aggregates include it.
    Completed,
    /// Gateway declined the charge; kept for the audit trail.
    Failed,
    /// A completed donation whose charge was later reversed.
    Refunded,
}

impl DonationStatus {
    /// Short identifier string as stored in the database.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Refunded => "refunded",
        }
    }

    /// Whether `self -> next` is a permitted lifecycle edge.
    pub fn can_transition_to(self, next: DonationStatus) -> bool {
        matches!(
            (self, next),
            (DonationStatus::Pending, DonationStatus::Completed)
                | (DonationStatus::Pending, DonationStatus::Failed)
                | (DonationStatus::Completed, DonationStatus::Refunded)
        )
    }
}

// ─────────────────────────────────────────────────────────
// Campaign
// ─────────────────────────────────────────────────────────

/// A fundraising campaign as stored in / read from the database.
///
/// `current_amount_cents`, `donations_count`, and `donors_count` are running
/// aggregates over the campaign's completed donations. They are mutated only
/// by the donation service's reconciliation step, never by campaign edits.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Campaign {
    pub id: i64,
    pub title: String,
    pub slug: String,
    pub description: String,
    pub goal_amount_cents: i64,
    pub current_amount_cents: i64,
    pub creator_id: i64,
    pub status: CampaignStatus,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub donations_count: i64,
    pub donors_count: i64,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Campaign {
    /// True once the campaign's end instant (when set) has passed.
    pub fn has_ended(&self, now: DateTime<Utc>) -> bool {
        self.end_date.is_some_and(|end| end < now)
    }

    /// Apply an owner edit to the mutable campaign fields.
    ///
    /// The slug is fixed at creation; edits never change it. Aggregate
    /// counters and status are deliberately not editable here.
    pub fn apply(&mut self, edit: CampaignEdit) -> Result<()> {
        if let Some(title) = edit.title {
            validate_title(&title)?;
            self.title = title;
        }
        if let Some(description) = edit.description {
            validate_description(&description)?;
            self.description = description;
        }
        if let Some(goal) = edit.goal_amount {
            self.goal_amount_cents = goal_cents(goal)?;
        }
        if let Some(end) = edit.end_date {
            if let Some(start) = self.start_date {
                if end <= start {
                    return Err(DonationError::validation(
                        "end_date",
                        "End date must be after the start date.",
                    ));
                }
            }
            self.end_date = Some(end);
        }
        Ok(())
    }
}

/// A validated campaign ready for insertion.
#[derive(Debug, Clone)]
pub struct NewCampaign {
    pub title: String,
    pub slug: String,
    pub description: String,
    pub goal_amount_cents: i64,
    pub creator_id: i64,
    pub status: CampaignStatus,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
}

impl NewCampaign {
    /// Validate the raw input and compute the derived fields (slug, cents).
    ///
    /// New campaigns always start `active` with zeroed aggregate counters.
    pub fn new(
        title: String,
        description: String,
        goal_amount: f64,
        creator_id: i64,
        start_date: Option<DateTime<Utc>>,
        end_date: Option<DateTime<Utc>>,
    ) -> Result<Self> {
        validate_title(&title)?;
        validate_description(&description)?;
        let goal_amount_cents = goal_cents(goal_amount)?;
        if let (Some(start), Some(end)) = (start_date, end_date) {
            if end <= start {
                return Err(DonationError::validation(
                    "end_date",
                    "End date must be after the start date.",
                ));
            }
        }
        let slug = slugify(&title);
        if slug.is_empty() {
            return Err(DonationError::validation(
                "title",
                "Campaign title must contain at least one letter or number.",
            ));
        }
        Ok(NewCampaign {
            title,
            slug,
            description,
            goal_amount_cents,
            creator_id,
            status: CampaignStatus::Active,
            start_date,
            end_date,
        })
    }
}

/// Owner-supplied edits to an existing campaign; absent fields are unchanged.
#[derive(Debug, Clone, Default)]
pub struct CampaignEdit {
    pub title: Option<String>,
    pub description: Option<String>,
    pub goal_amount: Option<f64>,
    pub end_date: Option<DateTime<Utc>>,
}

fn validate_title(title: &str) -> Result<()> {
    if title.trim().is_empty() {
        return Err(DonationError::validation(
            "title",
            "Please enter a campaign title.",
        ));
    }
    if title.chars().count() > 255 {
        return Err(DonationError::validation(
            "title",
            "Campaign title cannot exceed 255 characters.",
        ));
    }
    Ok(())
}

fn validate_description(description: &str) -> Result<()> {
    if description.trim().is_empty() {
        return Err(DonationError::validation(
            "description",
            "Please enter a campaign description.",
        ));
    }
    if description.chars().count() > 5000 {
        return Err(DonationError::validation(
            "description",
            "Campaign description cannot exceed 5000 characters.",
        ));
    }
    Ok(())
}

fn goal_cents(goal_amount: f64) -> Result<i64> {
    let cents = round_to_cents(goal_amount);
    if cents < 100 {
        return Err(DonationError::validation(
            "goal_amount",
            "Campaign goal must be at least €1.00.",
        ));
    }
    if cents > 99_999_999 {
        return Err(DonationError::validation(
            "goal_amount",
            "Campaign goal cannot exceed €999,999.99.",
        ));
    }
    Ok(cents)
}

// ─────────────────────────────────────────────────────────
// Donation
// ─────────────────────────────────────────────────────────

/// A donation attempt as stored in / read from the database.
///
/// One row per attempt: failed attempts are kept, never retried in place,
/// and rows are only ever soft-deleted so the campaign's history stays
/// reconstructible.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Donation {
    pub id: i64,
    pub campaign_id: i64,
    pub donor_id: i64,
    pub amount_cents: i64,
    pub payment_method: String,
    /// Internal identifier, generated before the gateway is called.
    pub transaction_id: String,
    /// Gateway-assigned identifier, set only once a gateway responded.
    pub gateway_transaction_id: Option<String>,
    pub status: DonationStatus,
    pub is_anonymous: bool,
    pub message: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Donation {
    /// Transition `completed -> refunded` after a successful gateway refund.
    pub fn mark_refunded(&mut self) -> Result<()> {
        if !self.status.can_transition_to(DonationStatus::Refunded) {
            return Err(DonationError::InvalidTransition {
                from: self.status.as_str(),
                to: DonationStatus::Refunded.as_str(),
            });
        }
        self.status = DonationStatus::Refunded;
        Ok(())
    }
}

/// A donation under construction: created `pending` in memory, finalized by
/// the gateway outcome, and only then persisted.
#[derive(Debug, Clone)]
pub struct NewDonation {
    pub campaign_id: i64,
    pub donor_id: i64,
    pub amount_cents: i64,
    pub payment_method: String,
    pub transaction_id: String,
    pub gateway_transaction_id: Option<String>,
    pub status: DonationStatus,
    pub is_anonymous: bool,
    pub message: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl NewDonation {
    /// Build a pending donation with a fresh `TXN_` transaction identifier.
    pub fn pending(
        campaign_id: i64,
        donor_id: i64,
        amount_cents: i64,
        is_anonymous: bool,
        message: Option<String>,
    ) -> Self {
        NewDonation {
            campaign_id,
            donor_id,
            amount_cents,
            payment_method: "credit_card".to_string(),
            transaction_id: random_token("TXN_", 10),
            gateway_transaction_id: None,
            status: DonationStatus::Pending,
            is_anonymous,
            message,
            completed_at: None,
        }
    }

    /// Transition `pending -> completed` with the gateway's identifier.
    pub fn mark_completed(&mut self, gateway_transaction_id: String, at: DateTime<Utc>) -> Result<()> {
        self.transition_to(DonationStatus::Completed)?;
        self.gateway_transaction_id = Some(gateway_transaction_id);
        self.completed_at = Some(at);
        Ok(())
    }

    /// Transition `pending -> failed`, keeping whatever identifier the
    /// gateway returned (declines may carry none).
    pub fn mark_failed(&mut self, gateway_transaction_id: Option<String>) -> Result<()> {
        self.transition_to(DonationStatus::Failed)?;
        self.gateway_transaction_id = gateway_transaction_id;
        Ok(())
    }

    fn transition_to(&mut self, next: DonationStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(DonationError::InvalidTransition {
                from: self.status.as_str(),
                to: next.as_str(),
            });
        }
        self.status = next;
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────
// Donation input
// ─────────────────────────────────────────────────────────

/// Caller-validated donation input handed to the donation service.
#[derive(Debug, Clone)]
pub struct DonationRequest {
    /// Decimal amount in major currency units; the service converts to cents.
    pub amount: f64,
    pub is_anonymous: bool,
    pub message: Option<String>,
    pub card: CardDetails,
}

/// Raw card fields, passed through to the gateway and never persisted.
#[derive(Clone)]
pub struct CardDetails {
    pub card_number: String,
    pub card_expiry: String,
    pub card_cvc: String,
    pub card_holder_name: String,
}

impl CardDetails {
    /// Card number with spaces stripped.
    pub fn normalized_number(&self) -> String {
        self.card_number.replace(' ', "")
    }

    /// Last four digits, for log display.
    pub fn last_four(&self) -> String {
        let digits = self.normalized_number();
        let cut = digits.len().saturating_sub(4);
        digits.get(cut..).unwrap_or("").to_string()
    }
}

impl std::fmt::Debug for CardDetails {
    // Keeps full card numbers and CVCs out of debug output and logs.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CardDetails")
            .field("card_number", &format_args!("****{}", self.last_four()))
            .field("card_expiry", &self.card_expiry)
            .field("card_holder_name", &self.card_holder_name)
            .finish_non_exhaustive()
    }
}

// ─────────────────────────────────────────────────────────
// Value helpers
// ─────────────────────────────────────────────────────────

/// Convert a decimal amount to integer minor units, rounding half away from
/// zero at two decimal places (`49.995` becomes `5000` cents).
///
/// Client-supplied cent values are never trusted directly; this is the only
/// decimal-to-cents conversion in the crate.
pub fn round_to_cents(amount: f64) -> i64 {
    // Snap to the nearest thousandth first so that values like 49.995, which
    // have no exact binary representation, still round on their decimal half.
    // The cast saturates on non-finite input; the saturating add keeps the
    // half-step from overflowing at the extremes.
    let millis = (amount * 1000.0).round() as i64;
    if millis >= 0 {
        millis.saturating_add(5) / 10
    } else {
        millis.saturating_sub(5) / 10
    }
}

/// Render cents as a grouped decimal string, e.g. `1000000` -> `"10,000.00"`.
pub fn format_amount(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let cents = cents.abs();
    let whole = (cents / 100).to_string();
    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, digit) in whole.bytes().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit as char);
    }
    format!("{sign}{grouped}.{:02}", cents % 100)
}

/// Lowercased, hyphen-joined URL slug: punctuation dropped, runs of
/// separators collapsed, no leading or trailing hyphen.
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut pending_hyphen = false;
    for c in title.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_hyphen && !slug.is_empty() {
                slug.push('-');
            }
            pending_hyphen = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_hyphen = true;
        }
    }
    slug
}

/// `prefix` plus a random alphanumeric suffix of `len` characters.
///
/// Uniqueness is advisory; the donations table's UNIQUE constraint is the
/// backstop for the internal transaction identifier.
pub fn random_token(prefix: &str, len: usize) -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect();
    format!("{prefix}{suffix}")
}

// ─────────────────────────────────────────────────────────
// Unit tests
// ─────────────────────────────────────────────────────────
