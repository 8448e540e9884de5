//! Payout Service - Main Application Entry Point
//!
//! # Startup Flow
//!
//! 1. Load configuration from environment variables
//! 2. Create database connection pool and run migrations
//! 3. Build the provider client and field cipher
//! 4. Spawn the stale-payout reconciliation poller
//! 5. Build the HTTP router and start serving

use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::EnvFilter;

use axum::{
    Router, middleware as axum_middleware,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

use soundbridge_payouts::{
    config, crypto::FieldCipher, db, handlers, middleware,
    provider::http::HttpProviderClient,
    services::{PayoutContext, PayoutSettings, webhook_service},
    state::{AppState, WebhookState},
    stores::postgres::{PgCreatorStore, PgPayoutLedger},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = config::Config::from_env()?;
    tracing::info!("Configuration loaded");

    let pool = db::create_pool(&config.database_url).await?;
    tracing::info!("Database pool created");

    db::run_migrations(&pool).await?;
    tracing::info!("Database migrations complete");

    let cipher = Arc::new(FieldCipher::from_hex_key(&config.field_encryption_key)?);
    let provider = HttpProviderClient::new(
        &config.provider_api_url,
        &config.provider_api_token,
        Duration::from_secs(config.provider_timeout_secs),
    )?;

    let ctx = Arc::new(PayoutContext {
        ledger: Arc::new(PgPayoutLedger::new(pool.clone())),
        creators: Arc::new(PgCreatorStore::new(pool.clone())),
        provider: Arc::new(provider),
        cipher,
        settings: PayoutSettings {
            platform_fee_percent: config.platform_fee_percent,
        },
    });

    // Background reconciliation: payouts stuck in processing past the
    // cutoff get their provider state polled and applied.
    let poll_ctx = ctx.clone();
    let interval = Duration::from_secs(config.reconcile_interval_secs);
    let stale_after = chrono::Duration::seconds(config.reconcile_stale_after_secs as i64);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            match webhook_service::reconcile_stale(
                poll_ctx.ledger.as_ref(),
                poll_ctx.provider.as_ref(),
                stale_after,
            )
            .await
            {
                Ok(0) => {}
                Ok(n) => tracing::info!(advanced = n, "reconciliation poll advanced payouts"),
                Err(e) => tracing::error!(error = %e, "reconciliation poll failed"),
            }
        }
    });

    let state = AppState {
        pool: pool.clone(),
        webhook: WebhookState {
            ledger: ctx.ledger.clone(),
            secret: Arc::new(config.provider_webhook_secret.clone()),
        },
        ctx,
    };

    // Management API: API-key authenticated.
    let authenticated_routes = Router::new()
        .route("/api/v1/payouts", post(handlers::payouts::create_payout))
        .route("/api/v1/payouts", get(handlers::payouts::list_payouts))
        .route("/api/v1/payouts/{id}", get(handlers::payouts::get_payout))
        .route(
            "/api/v1/payouts/batch",
            post(handlers::payouts::batch_payouts),
        )
        .route_layer(axum_middleware::from_fn_with_state(
            pool.clone(),
            middleware::auth::auth_middleware,
        ));

    let app = Router::new()
        // Public routes: health, and the signature-authenticated webhook.
        .route("/health", get(handlers::health::health_check))
        .route(
            "/webhooks/provider",
            post(handlers::webhooks::provider_webhook),
        )
        .merge(authenticated_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = format!("0.0.0.0:{}", config.server_port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
