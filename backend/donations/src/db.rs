//! Database layer — pool setup, migrations, and campaign/donation queries.
//!
//! Read and single-statement write helpers take the pool. The helpers used
//! inside the donation reconciliation transaction take `&mut SqliteConnection`
//! instead so the service can run them on one transaction handle.

use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::info;

use crate::errors::{DonationError, Result};
use crate::models::{Campaign, CampaignStatus, Donation, DonationStatus, NewCampaign, NewDonation};

/// Establish a SQLite connection pool and run pending migrations.
///
/// WAL mode keeps readers unblocked while the reconciliation transaction
/// holds the single writer slot; the busy timeout covers writer contention.
pub async fn init_pool(database_url: &str) -> Result<SqlitePool> {
    // Make sure the URL carries the sqlite scheme before parsing.
    let url = if database_url.starts_with("sqlite:") {
        database_url.to_string()
    } else {
        format!("sqlite:{database_url}")
    };

    let options = SqliteConnectOptions::from_str(&url)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .foreign_keys(true)
        .busy_timeout(Duration::from_secs(5));

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;
    info!("Database migrations applied successfully");
    Ok(pool)
}

const CAMPAIGN_COLUMNS: &str = "id, title, slug, description, goal_amount_cents, \
     current_amount_cents, creator_id, status, start_date, end_date, \
     donations_count, donors_count, completed_at, created_at, updated_at, deleted_at";

const DONATION_COLUMNS: &str = "id, campaign_id, donor_id, amount_cents, payment_method, \
     transaction_id, gateway_transaction_id, status, is_anonymous, message, \
     completed_at, created_at, updated_at, deleted_at";

// ─────────────────────────────────────────────────────────
// Campaign writes
// ─────────────────────────────────────────────────────────

/// Insert a validated campaign and return the stored row.
///
/// A slug collision surfaces as a `title` validation error rather than a
/// database error, since the slug is derived from the title.
pub async fn insert_campaign(
    pool: &SqlitePool,
    new: &NewCampaign,
    now: DateTime<Utc>,
) -> Result<Campaign> {
    let result = sqlx::query(
        r#"
        INSERT INTO campaigns
            (title, slug, description, goal_amount_cents, current_amount_cents,
             creator_id, status, start_date, end_date, donations_count,
             donors_count, created_at, updated_at)
        VALUES (?1, ?2, ?3, ?4, 0, ?5, ?6, ?7, ?8, 0, 0, ?9, ?9)
        "#,
    )
    .bind(&new.title)
    .bind(&new.slug)
    .bind(&new.description)
    .bind(new.goal_amount_cents)
    .bind(new.creator_id)
    .bind(new.status)
    .bind(new.start_date)
    .bind(new.end_date)
    .bind(now)
    .execute(pool)
    .await
    .map_err(|err| {
        if is_unique_violation(&err) {
            DonationError::validation("title", "A campaign with a similar title already exists.")
        } else {
            err.into()
        }
    })?;

    let id = result.last_insert_rowid();
    get_campaign(pool, id)
        .await?
        .ok_or(DonationError::NotFound("Campaign"))
}

/// Persist the editable fields of an already-validated campaign.
pub async fn update_campaign(
    pool: &SqlitePool,
    campaign: &Campaign,
    now: DateTime<Utc>,
) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE campaigns
        SET    title = ?2, description = ?3, goal_amount_cents = ?4,
               end_date = ?5, updated_at = ?6
        WHERE  id = ?1 AND deleted_at IS NULL
        "#,
    )
    .bind(campaign.id)
    .bind(&campaign.title)
    .bind(&campaign.description)
    .bind(campaign.goal_amount_cents)
    .bind(campaign.end_date)
    .bind(now)
    .execute(pool)
    .await?;
    Ok(())
}

/// Move an active campaign to `cancelled`. Returns `false` when the campaign
/// was not active (already completed, cancelled, or deleted).
pub async fn cancel_campaign(pool: &SqlitePool, id: i64, now: DateTime<Utc>) -> Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE campaigns
        SET    status = ?2, updated_at = ?3
        WHERE  id = ?1 AND status = ?4 AND deleted_at IS NULL
        "#,
    )
    .bind(id)
    .bind(CampaignStatus::Cancelled)
    .bind(now)
    .bind(CampaignStatus::Active)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Soft-delete a campaign. Donation rows are left untouched so the payment
/// audit trail stays reconstructible.
pub async fn soft_delete_campaign(pool: &SqlitePool, id: i64, now: DateTime<Utc>) -> Result<bool> {
    let result = sqlx::query(
        "UPDATE campaigns SET deleted_at = ?2, updated_at = ?2 WHERE id = ?1 AND deleted_at IS NULL",
    )
    .bind(id)
    .bind(now)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

// ─────────────────────────────────────────────────────────
// Campaign reads
// ─────────────────────────────────────────────────────────

/// Fetch a campaign by id, skipping soft-deleted rows.
pub async fn get_campaign(pool: &SqlitePool, id: i64) -> Result<Option<Campaign>> {
    let row = sqlx::query_as::<_, Campaign>(&format!(
        "SELECT {CAMPAIGN_COLUMNS} FROM campaigns WHERE id = ?1 AND deleted_at IS NULL",
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// Fetch a campaign by its URL slug, skipping soft-deleted rows.
pub async fn get_campaign_by_slug(pool: &SqlitePool, slug: &str) -> Result<Option<Campaign>> {
    let row = sqlx::query_as::<_, Campaign>(&format!(
        "SELECT {CAMPAIGN_COLUMNS} FROM campaigns WHERE slug = ?1 AND deleted_at IS NULL",
    ))
    .bind(slug)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// Fetch active campaigns, optionally filtered by a case-insensitive search
/// over title and description, most recently started first.
pub async fn list_active_campaigns(
    pool: &SqlitePool,
    search: Option<&str>,
) -> Result<Vec<Campaign>> {
    let pattern = search
        .filter(|term| !term.is_empty())
        .map(|term| format!("%{term}%"));
    let rows = sqlx::query_as::<_, Campaign>(&format!(
        r#"
        SELECT {CAMPAIGN_COLUMNS}
        FROM   campaigns
        WHERE  status = ?1 AND deleted_at IS NULL
               AND (?2 IS NULL OR title LIKE ?2 OR description LIKE ?2)
        ORDER  BY start_date DESC, id DESC
        "#,
    ))
    .bind(CampaignStatus::Active)
    .bind(pattern)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

// ─────────────────────────────────────────────────────────
// Donation reads
// ─────────────────────────────────────────────────────────

/// Fetch a donation by id, skipping soft-deleted rows.
pub async fn get_donation(pool: &SqlitePool, id: i64) -> Result<Option<Donation>> {
    let row = sqlx::query_as::<_, Donation>(&format!(
        "SELECT {DONATION_COLUMNS} FROM donations WHERE id = ?1 AND deleted_at IS NULL",
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// Fetch a campaign's completed donations, newest first.
///
/// Failed and pending attempts stay out of public listings; they remain
/// reachable by id for the audit trail.
pub async fn list_completed_donations_for_campaign(
    pool: &SqlitePool,
    campaign_id: i64,
) -> Result<Vec<Donation>> {
    let rows = sqlx::query_as::<_, Donation>(&format!(
        r#"
        SELECT {DONATION_COLUMNS}
        FROM   donations
        WHERE  campaign_id = ?1 AND status = ?2 AND deleted_at IS NULL
        ORDER  BY created_at DESC, id DESC
        "#,
    ))
    .bind(campaign_id)
    .bind(DonationStatus::Completed)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Fetch a donor's completed donations across campaigns, newest first.
pub async fn list_completed_donations_for_donor(
    pool: &SqlitePool,
    donor_id: i64,
) -> Result<Vec<Donation>> {
    let rows = sqlx::query_as::<_, Donation>(&format!(
        r#"
        SELECT {DONATION_COLUMNS}
        FROM   donations
        WHERE  donor_id = ?1 AND status = ?2 AND deleted_at IS NULL
        ORDER  BY created_at DESC, id DESC
        "#,
    ))
    .bind(donor_id)
    .bind(DonationStatus::Completed)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

// ─────────────────────────────────────────────────────────
// Reconciliation helpers (run on one transaction handle)
// ─────────────────────────────────────────────────────────

/// Insert a finalized donation row and return its id.
///
/// Inside the reconciliation transaction this must stay the first statement:
/// the INSERT takes SQLite's writer lock, which serializes the follow-up
/// counter reads and updates against concurrent donations.
pub async fn insert_donation(
    conn: &mut SqliteConnection,
    new: &NewDonation,
    now: DateTime<Utc>,
) -> Result<i64> {
    let result = sqlx::query(
        r#"
        INSERT INTO donations
            (campaign_id, donor_id, amount_cents, payment_method, transaction_id,
             gateway_transaction_id, status, is_anonymous, message, completed_at,
             created_at, updated_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?11)
        "#,
    )
    .bind(new.campaign_id)
    .bind(new.donor_id)
    .bind(new.amount_cents)
    .bind(&new.payment_method)
    .bind(&new.transaction_id)
    .bind(new.gateway_transaction_id.as_deref())
    .bind(new.status)
    .bind(new.is_anonymous)
    .bind(new.message.as_deref())
    .bind(new.completed_at)
    .bind(now)
    .execute(&mut *conn)
    .await?;
    Ok(result.last_insert_rowid())
}

/// Count a donor's completed donations to a campaign, excluding one row.
///
/// Used to decide whether the row just inserted is the donor's first
/// completed donation (and `donors_count` should grow).
pub async fn count_prior_completed_donations(
    conn: &mut SqliteConnection,
    campaign_id: i64,
    donor_id: i64,
    exclude_donation_id: i64,
) -> Result<i64> {
    let (count,): (i64,) = sqlx::query_as(
        r#"
        SELECT COUNT(*)
        FROM   donations
        WHERE  campaign_id = ?1 AND donor_id = ?2 AND status = ?3
               AND id <> ?4 AND deleted_at IS NULL
        "#,
    )
    .bind(campaign_id)
    .bind(donor_id)
    .bind(DonationStatus::Completed)
    .bind(exclude_donation_id)
    .fetch_one(&mut *conn)
    .await?;
    Ok(count)
}

/// Fold one completed donation into the campaign's running aggregates.
pub async fn apply_completed_donation(
    conn: &mut SqliteConnection,
    campaign_id: i64,
    amount_cents: i64,
    first_time_donor: bool,
    now: DateTime<Utc>,
) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE campaigns
        SET    current_amount_cents = current_amount_cents + ?2,
               donations_count = donations_count + 1,
               donors_count = donors_count + ?3,
               updated_at = ?4
        WHERE  id = ?1
        "#,
    )
    .bind(campaign_id)
    .bind(amount_cents)
    .bind(i64::from(first_time_donor))
    .bind(now)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Flip an active campaign to `completed` once its total covers the goal.
/// Returns whether this call performed the flip.
pub async fn close_campaign_if_goal_reached(
    conn: &mut SqliteConnection,
    campaign_id: i64,
    now: DateTime<Utc>,
) -> Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE campaigns
        SET    status = ?2, completed_at = ?3, updated_at = ?3
        WHERE  id = ?1 AND status = ?4
               AND current_amount_cents >= goal_amount_cents
        "#,
    )
    .bind(campaign_id)
    .bind(CampaignStatus::Completed)
    .bind(now)
    .bind(CampaignStatus::Active)
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected() > 0)
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}
