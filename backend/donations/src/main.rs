//! Giveback donation backend — entry point.
//!
//! Wires the SQLite pool, the payment gateway registry, and the donation
//! service together, then serves the Axum REST API.

use std::sync::Arc;

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

use donations::api::{self, ApiState};
use donations::config::Config;
use donations::db;
use donations::notify::MailLogNotifier;
use donations::payments::PaymentManager;
use donations::service::DonationService;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialise structured logging (RUST_LOG controls verbosity).
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // Load optional .env file (ignored if missing).
    let _ = dotenvy::dotenv();

    // Load config from environment.
    let config = Config::from_env().map_err(|e| anyhow::anyhow!("{e}"))?;

    // Set up the SQLite connection pool and run migrations.
    let pool = db::init_pool(&config.database_url).await?;

    // Payment backends and the donation pipeline.
    let manager = Arc::new(PaymentManager::from_config(&config));
    let service = DonationService::new(
        pool.clone(),
        Arc::clone(&manager),
        Arc::new(MailLogNotifier),
        &config,
    );

    // ─── REST API ─────────────────────────────────────────
    let state = Arc::new(ApiState {
        pool,
        service,
        manager,
        config: config.clone(),
    });

    let app = api::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr = format!("0.0.0.0:{}", config.api_port);
    info!("API listening on http://{addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
