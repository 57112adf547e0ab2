//! HTTP-level tests driving the router with `tower::ServiceExt::oneshot`.
//!
//! These exercise the full request path: JSON extraction, per-field
//! validation, the donation service, and the response shapes, over the same
//! SQLite harness as the pipeline tests.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use crate::api::{self, ApiState};
use crate::db;
use crate::models::DonationStatus;
use crate::notify::MailLogNotifier;
use crate::payments::PaymentManager;
use crate::service::DonationService;
use crate::test_donations::{test_env, TestEnv};

// ─── harness ─────────────────────────────────────────────

async fn test_app() -> (TestEnv, Router) {
    let env = test_env().await;
    let app = app_for(&env);
    (env, app)
}

fn app_for(env: &TestEnv) -> Router {
    let config = env.config.clone();
    let manager = Arc::new(PaymentManager::from_config(&config));
    let service = DonationService::new(
        env.pool.clone(),
        Arc::clone(&manager),
        Arc::new(MailLogNotifier),
        &config,
    );
    api::router(Arc::new(ApiState {
        pool: env.pool.clone(),
        service,
        manager,
        config,
    }))
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(value) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(value.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

async fn get(app: &Router, uri: &str) -> (StatusCode, Value) {
    send(app, "GET", uri, None).await
}

async fn post(app: &Router, uri: &str, body: Value) -> (StatusCode, Value) {
    send(app, "POST", uri, Some(body)).await
}

async fn create_campaign(app: &Router, title: &str, goal_amount: f64) -> Value {
    let (status, body) = post(
        app,
        "/campaigns",
        json!({
            "title": title,
            "description": "A campaign created from the tests",
            "goal_amount": goal_amount,
            "creator_id": 1,
        }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "create failed: {body}");
    body
}

fn donate_body(donor_id: i64, amount: f64, card_number: &str) -> Value {
    json!({
        "donor_id": donor_id,
        "amount": amount,
        "card_number": card_number,
        "card_expiry": "12/30",
        "card_cvc": "123",
        "card_holder_name": "Jordan Veldman",
    })
}

// ─── plumbing ────────────────────────────────────────────

#[tokio::test]
async fn health_endpoint_reports_ok() {
    let (_env, app) = test_app().await;
    let (status, body) = get(&app, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn gateways_endpoint_lists_only_available_backends() {
    let (_env, app) = test_app().await;
    let (status, body) = get(&app, "/payments/gateways").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["default"], "mock");

    let gateways = body["gateways"].as_array().unwrap();
    assert_eq!(gateways.len(), 1);
    assert_eq!(gateways[0]["key"], "mock");
    assert_eq!(gateways[0]["name"], "Mock Payment Service");
}

// ─── campaign lifecycle ──────────────────────────────────

#[tokio::test]
async fn create_and_fetch_campaign() {
    let (_env, app) = test_app().await;
    let created = create_campaign(&app, "Office Garden", 500.0).await;

    assert_eq!(created["slug"], "office-garden");
    assert_eq!(created["status"], "active");
    assert_eq!(created["goal_amount_cents"], 50_000);
    assert_eq!(created["current_amount_cents"], 0);
    assert_eq!(created["donations_count"], 0);
    assert_eq!(created["donors_count"], 0);

    let id = created["id"].as_i64().unwrap();
    let (status, body) = get(&app, &format!("/campaigns/{id}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["campaign"]["title"], "Office Garden");
    assert_eq!(body["donations"], json!([]));
    assert_eq!(body["payment_driver"], "mock");
}

#[tokio::test]
async fn create_campaign_rejects_invalid_input() {
    let (_env, app) = test_app().await;

    let (status, body) = post(
        &app,
        "/campaigns",
        json!({
            "title": "",
            "description": "No title",
            "goal_amount": 100.0,
            "creator_id": 1,
        }),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["errors"]["title"], "Please enter a campaign title.");

    let (status, body) = post(
        &app,
        "/campaigns",
        json!({
            "title": "Tiny Goal",
            "description": "Goal below the floor",
            "goal_amount": 0.5,
            "creator_id": 1,
        }),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(
        body["errors"]["goal_amount"],
        "Campaign goal must be at least €1.00."
    );
}

#[tokio::test]
async fn duplicate_title_is_a_slug_conflict() {
    let (_env, app) = test_app().await;
    create_campaign(&app, "Spring Gala", 100.0).await;

    let (status, body) = post(
        &app,
        "/campaigns",
        json!({
            "title": "Spring Gala",
            "description": "Second attempt at the same title",
            "goal_amount": 100.0,
            "creator_id": 2,
        }),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(
        body["errors"]["title"],
        "A campaign with a similar title already exists."
    );
}

#[tokio::test]
async fn listing_filters_by_search_term() {
    let (_env, app) = test_app().await;
    create_campaign(&app, "Save the Bees", 100.0).await;
    create_campaign(&app, "Office Garden", 100.0).await;

    let (status, body) = get(&app, "/campaigns").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 2);

    let (status, body) = get(&app, "/campaigns?search=bees").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 1);
    assert_eq!(body["campaigns"][0]["title"], "Save the Bees");
}

#[tokio::test]
async fn update_requires_the_owner_and_keeps_the_slug() {
    let (_env, app) = test_app().await;
    let created = create_campaign(&app, "Office Garden", 500.0).await;
    let id = created["id"].as_i64().unwrap();

    let (status, body) = send(
        &app,
        "PUT",
        &format!("/campaigns/{id}"),
        Some(json!({ "creator_id": 999, "title": "Hijacked" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(
        body["error"],
        "Only the campaign owner can modify this campaign."
    );

    let (status, body) = send(
        &app,
        "PUT",
        &format!("/campaigns/{id}"),
        Some(json!({ "creator_id": 1, "title": "Office Garden Revamp" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["title"], "Office Garden Revamp");
    // The slug is fixed at creation; edits never move public URLs.
    assert_eq!(body["slug"], "office-garden");
}

#[tokio::test]
async fn cancel_stops_further_donations() {
    let (_env, app) = test_app().await;
    let created = create_campaign(&app, "Mural Project", 500.0).await;
    let id = created["id"].as_i64().unwrap();

    let (status, body) = post(
        &app,
        &format!("/campaigns/{id}/cancel"),
        json!({ "creator_id": 1 }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "cancelled");

    let (status, body) = post(
        &app,
        &format!("/campaigns/{id}/cancel"),
        json!({ "creator_id": 1 }),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(
        body["errors"]["campaign"],
        "Only an active campaign can be cancelled."
    );

    let (status, body) = post(
        &app,
        &format!("/campaigns/{id}/donate"),
        donate_body(7, 10.0, "4242 4242 4242 4240"),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(
        body["errors"]["campaign"],
        "This campaign is not currently accepting donations."
    );
}

#[tokio::test]
async fn delete_is_soft_and_hides_the_campaign() {
    let (_env, app) = test_app().await;
    let created = create_campaign(&app, "Pop-Up Library", 500.0).await;
    let id = created["id"].as_i64().unwrap();

    let (status, _) = send(
        &app,
        "DELETE",
        &format!("/campaigns/{id}?creator_id=999"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send(
        &app,
        "DELETE",
        &format!("/campaigns/{id}?creator_id=1"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert_eq!(body, Value::Null);

    let (status, body) = get(&app, &format!("/campaigns/{id}")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Campaign not found");

    let (_, body) = get(&app, "/campaigns").await;
    assert_eq!(body["count"], 0);
}

// ─── donations ───────────────────────────────────────────

#[tokio::test]
async fn donate_returns_the_updated_campaign() {
    let (_env, app) = test_app().await;
    let created = create_campaign(&app, "Clean Water Fund", 500.0).await;
    let id = created["id"].as_i64().unwrap();

    let (status, body) = post(
        &app,
        &format!("/campaigns/{id}/donate"),
        donate_body(7, 50.0, "4242 4242 4242 4240"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["donation"]["status"], "completed");
    assert_eq!(body["donation"]["amount_cents"], 5_000);
    assert_eq!(body["campaign"]["current_amount_cents"], 5_000);
    assert_eq!(body["campaign"]["donations_count"], 1);
    assert_eq!(body["campaign"]["donors_count"], 1);

    let (status, body) = get(&app, &format!("/campaigns/{id}/donations")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 1);
    assert_eq!(body["donations"][0]["donor_id"], 7);
}

#[tokio::test]
async fn declined_payment_maps_to_402() {
    let (env, app) = test_app().await;
    let created = create_campaign(&app, "Animal Shelter Fund", 500.0).await;
    let id = created["id"].as_i64().unwrap();

    let (status, body) = post(
        &app,
        &format!("/campaigns/{id}/donate"),
        donate_body(7, 50.0, "4242 4242 4242 4241"),
    )
    .await;
    assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
    assert_eq!(body["success"], false);
    assert_eq!(body["error_code"], "CARD_DECLINED");
    assert_eq!(body["error_message"], "Payment declined by issuing bank");

    // The failed attempt is on record but not in the public listing.
    let donation_id = body["donation_id"].as_i64().unwrap();
    let stored = db::get_donation(&env.pool, donation_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, DonationStatus::Failed);

    let (_, body) = get(&app, &format!("/campaigns/{id}/donations")).await;
    assert_eq!(body["count"], 0);
}

#[tokio::test]
async fn donation_validation_reports_every_field() {
    let (_env, app) = test_app().await;
    let created = create_campaign(&app, "Choir Tour", 500.0).await;
    let id = created["id"].as_i64().unwrap();

    let (status, body) = post(
        &app,
        &format!("/campaigns/{id}/donate"),
        json!({
            "donor_id": 7,
            "amount": -5.0,
            "card_number": "12",
            "card_expiry": "bad",
            "card_cvc": "x",
            "card_holder_name": "",
        }),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    let errors = body["errors"].as_object().unwrap();
    for field in [
        "amount",
        "card_number",
        "card_expiry",
        "card_cvc",
        "card_holder_name",
    ] {
        assert!(errors.contains_key(field), "missing error for {field}");
    }
}

#[tokio::test]
async fn donating_to_an_unknown_campaign_is_404() {
    let (_env, app) = test_app().await;
    let (status, body) = post(
        &app,
        "/campaigns/999/donate",
        donate_body(7, 10.0, "4242 4242 4242 4240"),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Campaign not found");
}

#[tokio::test]
async fn anonymous_donations_hide_the_donor_in_listings() {
    let (_env, app) = test_app().await;
    let created = create_campaign(&app, "Scholarship Pool", 500.0).await;
    let id = created["id"].as_i64().unwrap();

    let mut body = donate_body(7, 25.0, "4242 4242 4242 4240");
    body["is_anonymous"] = json!(true);
    body["message"] = json!("From a friend");
    let (status, _) = post(&app, &format!("/campaigns/{id}/donate"), body).await;
    assert_eq!(status, StatusCode::OK);

    let (_, listing) = get(&app, &format!("/campaigns/{id}/donations")).await;
    assert_eq!(listing["count"], 1);
    assert!(listing["donations"][0]["donor_id"].is_null());
    assert_eq!(listing["donations"][0]["is_anonymous"], true);
    assert_eq!(listing["donations"][0]["message"], "From a friend");

    // The donor's own history stays unmasked.
    let (status, history) = get(&app, "/donors/7/donations").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(history["count"], 1);
    assert_eq!(history["donations"][0]["donor_id"], 7);
}

#[tokio::test]
async fn goal_close_is_visible_in_the_donate_response() {
    let (_env, app) = test_app().await;
    let created = create_campaign(&app, "New Ambulance", 100.0).await;
    let id = created["id"].as_i64().unwrap();

    let (status, body) = post(
        &app,
        &format!("/campaigns/{id}/donate"),
        donate_body(7, 100.0, "4242 4242 4242 4240"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["campaign"]["status"], "completed");
}
