//! Axum REST API handlers.
//!
//! The API owns card-field syntactic validation and identity plumbing,
//! then hands validated input to [`DonationService`]. Donor and creator
//! identifiers are trusted opaque values here; there is no authentication
//! layer in front of them.
//!
//! Error mapping: validation problems return `422` with a field-keyed
//! `errors` object, payment declines return `402` with the gateway's code
//! and message, unknown ids return `404`, and system errors return `500`
//! with a generic message (detail stays in the logs).

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tracing::error;

use crate::config::Config;
use crate::db;
use crate::errors::DonationError;
use crate::models::{
    format_amount, round_to_cents, Campaign, CampaignEdit, CardDetails, Donation, DonationRequest,
    DonationStatus, NewCampaign,
};
use crate::payments::PaymentManager;
use crate::service::{DonationOutcome, DonationService};

pub struct ApiState {
    pub pool: SqlitePool,
    pub service: DonationService,
    pub manager: Arc<PaymentManager>,
    pub config: Config,
}

/// Build the application router. Middleware layers are added by the caller.
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/campaigns", get(list_campaigns).post(create_campaign))
        .route(
            "/campaigns/:id",
            get(get_campaign).put(update_campaign).delete(delete_campaign),
        )
        .route("/campaigns/:id/cancel", post(cancel_campaign))
        .route("/campaigns/:id/donate", post(donate))
        .route("/campaigns/:id/donations", get(campaign_donations))
        .route("/donors/:donor_id/donations", get(donor_donations))
        .route("/payments/gateways", get(gateways))
        .with_state(state)
}

// ─────────────────────────────────────────────────────────
// Request shapes
// ─────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct CreateCampaignBody {
    pub title: String,
    pub description: String,
    pub goal_amount: f64,
    pub creator_id: i64,
    #[serde(default)]
    pub start_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_date: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
pub struct UpdateCampaignBody {
    pub creator_id: i64,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub goal_amount: Option<f64>,
    #[serde(default)]
    pub end_date: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
pub struct OwnerBody {
    pub creator_id: i64,
}

#[derive(Deserialize)]
pub struct OwnerQuery {
    pub creator_id: i64,
}

#[derive(Deserialize)]
pub struct CampaignListQuery {
    #[serde(default)]
    pub search: Option<String>,
}

#[derive(Deserialize)]
pub struct DonateBody {
    pub donor_id: i64,
    pub amount: f64,
    #[serde(default)]
    pub is_anonymous: bool,
    #[serde(default)]
    pub message: Option<String>,
    pub card_number: String,
    pub card_expiry: String,
    pub card_cvc: String,
    pub card_holder_name: String,
}

// ─────────────────────────────────────────────────────────
// Response shapes
// ─────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

#[derive(Serialize)]
pub struct CampaignsResponse {
    pub count: usize,
    pub campaigns: Vec<Campaign>,
}

#[derive(Serialize)]
pub struct CampaignDetailResponse {
    pub campaign: Campaign,
    pub donations: Vec<DonationView>,
    pub payment_driver: String,
}

#[derive(Serialize)]
pub struct DonationsResponse {
    pub count: usize,
    pub donations: Vec<DonationView>,
}

#[derive(Serialize)]
pub struct DonorDonationsResponse {
    pub count: usize,
    pub donations: Vec<Donation>,
}

#[derive(Serialize)]
pub struct DonateSuccessResponse {
    pub success: bool,
    pub donation: Donation,
    pub campaign: Option<Campaign>,
}

#[derive(Serialize)]
pub struct PaymentFailedResponse {
    pub success: bool,
    pub error_code: String,
    pub error_message: String,
    pub donation_id: i64,
}

#[derive(Serialize)]
pub struct GatewayInfo {
    pub key: &'static str,
    pub name: &'static str,
}

#[derive(Serialize)]
pub struct GatewaysResponse {
    pub default: String,
    pub gateways: Vec<GatewayInfo>,
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Serialize)]
pub struct ValidationErrors {
    pub errors: BTreeMap<&'static str, String>,
}

/// A donation as shown in public listings: the donor reference is withheld
/// for anonymous donations, and gateway identifiers are never exposed.
#[derive(Serialize)]
pub struct DonationView {
    pub id: i64,
    pub campaign_id: i64,
    pub donor_id: Option<i64>,
    pub amount_cents: i64,
    pub status: DonationStatus,
    pub is_anonymous: bool,
    pub message: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<Donation> for DonationView {
    fn from(donation: Donation) -> Self {
        DonationView {
            donor_id: (!donation.is_anonymous).then_some(donation.donor_id),
            id: donation.id,
            campaign_id: donation.campaign_id,
            amount_cents: donation.amount_cents,
            status: donation.status,
            is_anonymous: donation.is_anonymous,
            message: donation.message,
            completed_at: donation.completed_at,
            created_at: donation.created_at,
        }
    }
}

// ─────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────

/// `GET /health`
pub async fn health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// `GET /campaigns?search=`
///
/// Active campaigns, optionally filtered by a title/description search.
pub async fn list_campaigns(
    State(state): State<Arc<ApiState>>,
    Query(query): Query<CampaignListQuery>,
) -> impl IntoResponse {
    match db::list_active_campaigns(&state.pool, query.search.as_deref()).await {
        Ok(campaigns) => {
            let count = campaigns.len();
            (
                StatusCode::OK,
                Json(serde_json::json!(CampaignsResponse { count, campaigns })),
            )
                .into_response()
        }
        Err(err) => error_response(err),
    }
}

/// `POST /campaigns`
pub async fn create_campaign(
    State(state): State<Arc<ApiState>>,
    Json(body): Json<CreateCampaignBody>,
) -> impl IntoResponse {
    let new = match NewCampaign::new(
        body.title,
        body.description,
        body.goal_amount,
        body.creator_id,
        body.start_date,
        body.end_date,
    ) {
        Ok(new) => new,
        Err(err) => return error_response(err),
    };
    match db::insert_campaign(&state.pool, &new, Utc::now()).await {
        Ok(campaign) => (StatusCode::CREATED, Json(campaign)).into_response(),
        Err(err) => error_response(err),
    }
}

/// `GET /campaigns/:id`
///
/// The campaign together with its completed donations, newest first.
pub async fn get_campaign(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<i64>,
) -> impl IntoResponse {
    let campaign = match load_campaign(&state.pool, id).await {
        Ok(campaign) => campaign,
        Err(response) => return response,
    };
    match db::list_completed_donations_for_campaign(&state.pool, id).await {
        Ok(donations) => (
            StatusCode::OK,
            Json(CampaignDetailResponse {
                campaign,
                donations: donations.into_iter().map(DonationView::from).collect(),
                payment_driver: state.manager.default_driver().to_string(),
            }),
        )
            .into_response(),
        Err(err) => error_response(err),
    }
}

/// `PUT /campaigns/:id`
///
/// Owner edit of title, description, goal, and end date. The slug and the
/// aggregate counters never change through this path.
pub async fn update_campaign(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<i64>,
    Json(body): Json<UpdateCampaignBody>,
) -> impl IntoResponse {
    let mut campaign = match load_campaign(&state.pool, id).await {
        Ok(campaign) => campaign,
        Err(response) => return response,
    };
    if campaign.creator_id != body.creator_id {
        return forbidden();
    }

    let edit = CampaignEdit {
        title: body.title,
        description: body.description,
        goal_amount: body.goal_amount,
        end_date: body.end_date,
    };
    if let Err(err) = campaign.apply(edit) {
        return error_response(err);
    }

    if let Err(err) = db::update_campaign(&state.pool, &campaign, Utc::now()).await {
        return error_response(err);
    }
    match load_campaign(&state.pool, id).await {
        Ok(campaign) => (StatusCode::OK, Json(campaign)).into_response(),
        Err(response) => response,
    }
}

/// `POST /campaigns/:id/cancel`
///
/// Owner-initiated close of an active campaign before its goal is reached.
pub async fn cancel_campaign(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<i64>,
    Json(body): Json<OwnerBody>,
) -> impl IntoResponse {
    let campaign = match load_campaign(&state.pool, id).await {
        Ok(campaign) => campaign,
        Err(response) => return response,
    };
    if campaign.creator_id != body.creator_id {
        return forbidden();
    }

    match db::cancel_campaign(&state.pool, id, Utc::now()).await {
        Ok(true) => match load_campaign(&state.pool, id).await {
            Ok(campaign) => (StatusCode::OK, Json(campaign)).into_response(),
            Err(response) => response,
        },
        Ok(false) => error_response(DonationError::validation(
            "campaign",
            "Only an active campaign can be cancelled.",
        )),
        Err(err) => error_response(err),
    }
}

/// `DELETE /campaigns/:id?creator_id=`
///
/// Soft delete; the campaign's donations stay on record.
pub async fn delete_campaign(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<i64>,
    Query(query): Query<OwnerQuery>,
) -> impl IntoResponse {
    let campaign = match load_campaign(&state.pool, id).await {
        Ok(campaign) => campaign,
        Err(response) => return response,
    };
    if campaign.creator_id != query.creator_id {
        return forbidden();
    }

    match db::soft_delete_campaign(&state.pool, id, Utc::now()).await {
        Ok(true) => StatusCode::NO_CONTENT.into_response(),
        Ok(false) => error_response(DonationError::NotFound("Campaign")),
        Err(err) => error_response(err),
    }
}

/// `POST /campaigns/:id/donate`
pub async fn donate(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<i64>,
    Json(body): Json<DonateBody>,
) -> impl IntoResponse {
    let campaign = match load_campaign(&state.pool, id).await {
        Ok(campaign) => campaign,
        Err(response) => return response,
    };

    let errors = validate_donation_body(
        &body,
        state.config.min_amount_cents,
        state.config.max_amount_cents,
    );
    if !errors.is_empty() {
        return (StatusCode::UNPROCESSABLE_ENTITY, Json(ValidationErrors { errors }))
            .into_response();
    }

    let donor_id = body.donor_id;
    let request = DonationRequest {
        amount: body.amount,
        is_anonymous: body.is_anonymous,
        message: body.message,
        card: CardDetails {
            card_number: body.card_number,
            card_expiry: body.card_expiry,
            card_cvc: body.card_cvc,
            card_holder_name: body.card_holder_name,
        },
    };

    match state.service.process_donation(&campaign, donor_id, request).await {
        Ok(DonationOutcome::Completed { donation }) => {
            // Refetch so the response shows the post-donation totals.
            let campaign = db::get_campaign(&state.pool, donation.campaign_id)
                .await
                .ok()
                .flatten();
            (
                StatusCode::OK,
                Json(DonateSuccessResponse {
                    success: true,
                    donation,
                    campaign,
                }),
            )
                .into_response()
        }
        Ok(DonationOutcome::Failed {
            donation,
            error_code,
            error_message,
        }) => (
            StatusCode::PAYMENT_REQUIRED,
            Json(PaymentFailedResponse {
                success: false,
                error_code,
                error_message,
                donation_id: donation.id,
            }),
        )
            .into_response(),
        Err(err) => error_response(err),
    }
}

/// `GET /campaigns/:id/donations`
///
/// Completed donations for a campaign, anonymity-masked.
pub async fn campaign_donations(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<i64>,
) -> impl IntoResponse {
    if let Err(response) = load_campaign(&state.pool, id).await {
        return response;
    }
    match db::list_completed_donations_for_campaign(&state.pool, id).await {
        Ok(donations) => {
            let donations: Vec<DonationView> =
                donations.into_iter().map(DonationView::from).collect();
            let count = donations.len();
            (
                StatusCode::OK,
                Json(serde_json::json!(DonationsResponse { count, donations })),
            )
                .into_response()
        }
        Err(err) => error_response(err),
    }
}

/// `GET /donors/:donor_id/donations`
///
/// A donor's own completed donations, unmasked.
pub async fn donor_donations(
    State(state): State<Arc<ApiState>>,
    Path(donor_id): Path<i64>,
) -> impl IntoResponse {
    match db::list_completed_donations_for_donor(&state.pool, donor_id).await {
        Ok(donations) => {
            let count = donations.len();
            (
                StatusCode::OK,
                Json(DonorDonationsResponse { count, donations }),
            )
                .into_response()
        }
        Err(err) => error_response(err),
    }
}

/// `GET /payments/gateways`
///
/// Available payment backends and the configured default.
pub async fn gateways(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    let gateways = state
        .manager
        .available_drivers()
        .into_iter()
        .map(|(key, name)| GatewayInfo { key, name })
        .collect();
    Json(GatewaysResponse {
        default: state.manager.default_driver().to_string(),
        gateways,
    })
}

// ─────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────

async fn load_campaign(pool: &SqlitePool, id: i64) -> Result<Campaign, Response> {
    match db::get_campaign(pool, id).await {
        Ok(Some(campaign)) => Ok(campaign),
        Ok(None) => Err(error_response(DonationError::NotFound("Campaign"))),
        Err(err) => Err(error_response(err)),
    }
}

fn error_response(err: DonationError) -> Response {
    match err {
        DonationError::Validation { field, message } => {
            let mut errors = BTreeMap::new();
            errors.insert(field, message);
            (StatusCode::UNPROCESSABLE_ENTITY, Json(ValidationErrors { errors }))
                .into_response()
        }
        DonationError::NotFound(what) => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: format!("{what} not found"),
            }),
        )
            .into_response(),
        err => {
            error!(error = %err, "Request failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: "Something went wrong. Please try again later.".to_string(),
                }),
            )
                .into_response()
        }
    }
}

fn forbidden() -> Response {
    (
        StatusCode::FORBIDDEN,
        Json(ErrorResponse {
            error: "Only the campaign owner can modify this campaign.".to_string(),
        }),
    )
        .into_response()
}

/// Syntactic validation of the donation body, collecting one message per
/// offending field. Amount range is checked here for a complete error map;
/// the donation service independently enforces the same bounds.
fn validate_donation_body(
    body: &DonateBody,
    min_amount_cents: i64,
    max_amount_cents: i64,
) -> BTreeMap<&'static str, String> {
    let mut errors = BTreeMap::new();

    let scaled = body.amount * 100.0;
    if !body.amount.is_finite() {
        errors.insert(
            "amount",
            "The donation amount must be a valid number.".to_string(),
        );
    } else if (scaled - scaled.round()).abs() > 1e-6 {
        errors.insert(
            "amount",
            "The donation amount can have at most 2 decimal places.".to_string(),
        );
    } else if round_to_cents(body.amount) < min_amount_cents {
        errors.insert(
            "amount",
            format!(
                "The minimum donation amount is €{}.",
                format_amount(min_amount_cents)
            ),
        );
    } else if round_to_cents(body.amount) > max_amount_cents {
        errors.insert(
            "amount",
            format!(
                "The maximum donation amount is €{}.",
                format_amount(max_amount_cents)
            ),
        );
    }

    let digits = body.card_number.replace(' ', "");
    if digits.is_empty() {
        errors.insert("card_number", "Please enter your card number.".to_string());
    } else if !digits.bytes().all(|b| b.is_ascii_digit()) {
        errors.insert("card_number", "Please enter a valid card number.".to_string());
    } else if digits.len() < 13 {
        errors.insert("card_number", "Card number is too short.".to_string());
    } else if digits.len() > 19 {
        errors.insert("card_number", "Card number is too long.".to_string());
    }

    if body.card_expiry.is_empty() {
        errors.insert(
            "card_expiry",
            "Please enter the card expiry date.".to_string(),
        );
    } else {
        match parse_card_expiry(&body.card_expiry) {
            Some((year, month)) => {
                // A card is considered expired once the first day of its
                // expiry month is in the past.
                let month_start = NaiveDate::from_ymd_opt(year, month, 1);
                if month_start.is_some_and(|start| start < Utc::now().date_naive()) {
                    errors.insert("card_expiry", "Card has expired.".to_string());
                }
            }
            None => {
                errors.insert(
                    "card_expiry",
                    "Please enter expiry date in MM/YY format.".to_string(),
                );
            }
        }
    }

    if body.card_cvc.is_empty() {
        errors.insert("card_cvc", "Please enter the card CVC.".to_string());
    } else if !((3..=4).contains(&body.card_cvc.len())
        && body.card_cvc.bytes().all(|b| b.is_ascii_digit()))
    {
        errors.insert("card_cvc", "CVC must be 3 or 4 digits.".to_string());
    }

    let name = &body.card_holder_name;
    if name.is_empty() {
        errors.insert(
            "card_holder_name",
            "Please enter the cardholder name.".to_string(),
        );
    } else if name.chars().count() < 2 {
        errors.insert(
            "card_holder_name",
            "Cardholder name must be at least 2 characters.".to_string(),
        );
    } else if name.chars().count() > 100 {
        errors.insert(
            "card_holder_name",
            "Cardholder name cannot exceed 100 characters.".to_string(),
        );
    } else if !name
        .chars()
        .all(|c| c.is_ascii_alphabetic() || c.is_whitespace() || matches!(c, '-' | '.' | '\''))
    {
        errors.insert(
            "card_holder_name",
            "Cardholder name contains invalid characters.".to_string(),
        );
    }

    errors
}

/// `MM/YY` into `(full_year, month)`; `None` when the shape is wrong.
fn parse_card_expiry(expiry: &str) -> Option<(i32, u32)> {
    if expiry.len() != 5 || expiry.as_bytes()[2] != b'/' {
        return None;
    }
    let month: u32 = expiry.get(0..2)?.parse().ok()?;
    let year: i32 = expiry.get(3..5)?.parse().ok()?;
    if !(1..=12).contains(&month) {
        return None;
    }
    Some((2000 + year, month))
}
