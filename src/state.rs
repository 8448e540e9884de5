//! Shared application state for the HTTP layer.

use std::sync::Arc;

use axum::extract::FromRef;

use crate::db::DbPool;
use crate::services::PayoutContext;
use crate::stores::PayoutLedger;

/// State shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub pool: DbPool,
    pub ctx: Arc<PayoutContext>,
    pub webhook: WebhookState,
}

/// The slice of state the webhook endpoint needs. Split out so the webhook
/// router can be built standalone in tests, with no database pool behind it.
#[derive(Clone)]
pub struct WebhookState {
    pub ledger: Arc<dyn PayoutLedger>,
    pub secret: Arc<String>,
}

impl FromRef<AppState> for WebhookState {
    fn from_ref(state: &AppState) -> Self {
        state.webhook.clone()
    }
}
