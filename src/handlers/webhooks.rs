//! Provider webhook endpoint.
//!
//! One logical entry point for all provider callbacks. The contract, which
//! the provider's retry behavior depends on:
//!
//! - validation/setup pings are acknowledged unauthenticated with
//!   `{"received": true}`
//! - a missing or invalid signature is the only 401
//! - everything else returns 200, even when processing logs an error or
//!   the referenced transfer is unknown; anything else triggers provider
//!   retry storms

use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
};

use crate::models::webhook::{PingAck, ProviderEvent};
use crate::services::webhook_service::{
    self, SIGNATURE_HEADER, WebhookOutcome,
};
use crate::state::WebhookState;

/// Build the webhook router. Standalone so tests can drive it without the
/// rest of the application state.
pub fn router(state: WebhookState) -> Router {
    Router::new()
        .route("/webhooks/provider", post(provider_webhook))
        .with_state(state)
}

/// POST /webhooks/provider
pub async fn provider_webhook(
    State(state): State<WebhookState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    // Validation pings are accepted unauthenticated, before any signature
    // handling.
    if webhook_service::is_validation_ping(&body) {
        return (StatusCode::OK, Json(PingAck::new())).into_response();
    }

    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());
    if let Err(e) = webhook_service::verify_signature(&state.secret, &body, signature) {
        tracing::warn!(error = %e, "rejecting webhook with bad signature");
        return StatusCode::UNAUTHORIZED.into_response();
    }

    let event: ProviderEvent = match serde_json::from_slice(&body) {
        Ok(event) => event,
        Err(e) => {
            // Authenticated but unparseable; acknowledge so the provider
            // does not redeliver something we will never understand.
            tracing::warn!(error = %e, "authenticated webhook body failed to parse");
            return (StatusCode::OK, Json(PingAck::new())).into_response();
        }
    };

    match webhook_service::handle_event(state.ledger.as_ref(), event).await {
        Ok(outcome) => {
            if let WebhookOutcome::UnknownTransfer { ref transfer_id } = outcome {
                tracing::warn!(transfer_id, "acknowledging webhook for unknown transfer");
            }
            (StatusCode::OK, Json(PingAck::new())).into_response()
        }
        Err(e) => {
            // Internal failure: log with full context but still 200; the
            // reconciliation poller will converge the payout.
            tracing::error!(error = %e, "webhook processing failed");
            (StatusCode::OK, Json(PingAck::new())).into_response()
        }
    }
}
