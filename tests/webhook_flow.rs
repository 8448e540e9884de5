//! Webhook Reconciler behavior, driven through the real HTTP endpoint.

mod common;

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::{WEBHOOK_SECRET, harness, seed_ngn_corridor};
use http_body_util::BodyExt;
use rust_decimal_macros::dec;
use tower::ServiceExt;
use uuid::Uuid;

use soundbridge_payouts::handlers::webhooks;
use soundbridge_payouts::models::payout::{PayoutRequest, PayoutStatus};
use soundbridge_payouts::services::{payout_service, webhook_service};
use soundbridge_payouts::state::WebhookState;
use soundbridge_payouts::stores::PayoutLedger;

struct WebhookHarness {
    h: common::TestHarness,
    state: WebhookState,
}

impl WebhookHarness {
    fn new() -> Self {
        let h = harness();
        let state = WebhookState {
            ledger: h.ledger.clone(),
            secret: Arc::new(WEBHOOK_SECRET.to_string()),
        };
        Self { h, state }
    }

    /// Initiate a payout and return (payout_id, provider_transfer_id).
    async fn processing_payout(&self) -> (Uuid, String) {
        seed_ngn_corridor(&self.h).await;
        let creator_id = self.h.seed_creator(Some("NG"), "NGN", dec!(500.00)).await;
        let result = payout_service::request_payout(
            &self.h.ctx,
            PayoutRequest {
                creator_id,
                amount: dec!(50.00),
                source_currency: "USD".to_string(),
                reason: None,
                metadata: None,
                client_reference: None,
            },
        )
        .await
        .unwrap();
        let payout = result.payout.unwrap();
        let transfer_id = payout.provider_transfer_id.clone().unwrap();
        (payout.id, transfer_id)
    }

    async fn post(&self, body: &[u8], signature: Option<&str>) -> (StatusCode, serde_json::Value) {
        let mut builder = Request::builder()
            .method("POST")
            .uri("/webhooks/provider")
            .header("content-type", "application/json");
        if let Some(sig) = signature {
            builder = builder.header("X-Webhook-Signature", sig);
        }
        let response = webhooks::router(self.state.clone())
            .oneshot(builder.body(Body::from(body.to_vec())).unwrap())
            .await
            .unwrap();

        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    async fn post_signed(&self, body: serde_json::Value) -> (StatusCode, serde_json::Value) {
        let raw = serde_json::to_vec(&body).unwrap();
        let signature = webhook_service::sign(WEBHOOK_SECRET, &raw);
        self.post(&raw, Some(&signature)).await
    }
}

fn state_change(transfer_id: &str, state: &str) -> serde_json::Value {
    serde_json::json!({
        "event_type": "transfers#state-change",
        "data": {
            "resource": {"id": transfer_id, "type": "transfer"},
            "current_state": state,
            "previous_state": "processing",
            "occurred_at": "2026-08-07T10:30:00Z"
        }
    })
}

#[tokio::test]
async fn state_change_completes_the_payout() {
    let wh = WebhookHarness::new();
    let (payout_id, transfer_id) = wh.processing_payout().await;

    let (status, body) = wh
        .post_signed(state_change(&transfer_id, "outgoing_payment_sent"))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["received"], serde_json::json!(true));

    let payout = wh.h.ledger.get(payout_id).await.unwrap().unwrap();
    assert_eq!(payout.status, PayoutStatus::Completed);
    assert!(payout.completed_at.is_some());
    assert_eq!(payout.status_history.len(), 3);
}

#[tokio::test]
async fn duplicate_delivery_changes_nothing() {
    let wh = WebhookHarness::new();
    let (payout_id, transfer_id) = wh.processing_payout().await;

    wh.post_signed(state_change(&transfer_id, "outgoing_payment_sent"))
        .await;
    let first = wh.h.ledger.get(payout_id).await.unwrap().unwrap();

    let (status, _) = wh
        .post_signed(state_change(&transfer_id, "outgoing_payment_sent"))
        .await;
    assert_eq!(status, StatusCode::OK);

    let second = wh.h.ledger.get(payout_id).await.unwrap().unwrap();
    assert_eq!(second.status_history.len(), first.status_history.len());
    assert_eq!(second.completed_at, first.completed_at);
}

#[tokio::test]
async fn tampered_body_is_rejected_with_no_ledger_writes() {
    let wh = WebhookHarness::new();
    let (payout_id, transfer_id) = wh.processing_payout().await;

    let original = serde_json::to_vec(&state_change(&transfer_id, "outgoing_payment_sent")).unwrap();
    let signature = webhook_service::sign(WEBHOOK_SECRET, &original);
    let tampered = serde_json::to_vec(&state_change(&transfer_id, "charged_back")).unwrap();

    let (status, _) = wh.post(&tampered, Some(&signature)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let payout = wh.h.ledger.get(payout_id).await.unwrap().unwrap();
    assert_eq!(payout.status, PayoutStatus::Processing);
    assert_eq!(payout.status_history.len(), 2);
}

#[tokio::test]
async fn missing_signature_is_rejected() {
    let wh = WebhookHarness::new();
    let (_, transfer_id) = wh.processing_payout().await;

    let body = serde_json::to_vec(&state_change(&transfer_id, "outgoing_payment_sent")).unwrap();
    let (status, _) = wh.post(&body, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn validation_pings_are_acknowledged_unauthenticated() {
    let wh = WebhookHarness::new();

    let (status, body) = wh.post(b"", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["received"], serde_json::json!(true));

    // JSON without the event envelope counts as a ping too.
    let (status, body) = wh.post(br#"{"hello": "world"}"#, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["received"], serde_json::json!(true));
}

#[tokio::test]
async fn unknown_transfer_is_acknowledged_not_retried() {
    let wh = WebhookHarness::new();
    wh.processing_payout().await;

    let (status, _) = wh
        .post_signed(state_change("trf-does-not-exist", "outgoing_payment_sent"))
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn bounce_then_chargeback_walks_failed_to_refunded() {
    let wh = WebhookHarness::new();
    let (payout_id, transfer_id) = wh.processing_payout().await;

    wh.post_signed(state_change(&transfer_id, "bounced_back")).await;
    let failed = wh.h.ledger.get(payout_id).await.unwrap().unwrap();
    assert_eq!(failed.status, PayoutStatus::Failed);
    assert!(failed.failed_at.is_some());
    assert!(failed.error_message.is_some());

    wh.post_signed(state_change(&transfer_id, "charged_back")).await;
    let refunded = wh.h.ledger.get(payout_id).await.unwrap().unwrap();
    assert_eq!(refunded.status, PayoutStatus::Refunded);
    // failed_at is set once and survives the refund transition.
    assert_eq!(refunded.failed_at, failed.failed_at);
}

#[tokio::test]
async fn stale_transition_after_completion_is_dropped() {
    let wh = WebhookHarness::new();
    let (payout_id, transfer_id) = wh.processing_payout().await;

    wh.post_signed(state_change(&transfer_id, "outgoing_payment_sent"))
        .await;

    // A stale intermediate state arriving late must not regress the payout
    // and must still be acknowledged.
    let (status, _) = wh
        .post_signed(state_change(&transfer_id, "funds_converted"))
        .await;
    assert_eq!(status, StatusCode::OK);

    let payout = wh.h.ledger.get(payout_id).await.unwrap().unwrap();
    assert_eq!(payout.status, PayoutStatus::Completed);
}

#[tokio::test]
async fn active_case_flags_without_status_change() {
    let wh = WebhookHarness::new();
    let (payout_id, transfer_id) = wh.processing_payout().await;

    let (status, _) = wh
        .post_signed(serde_json::json!({
            "event_type": "transfers#active-cases",
            "data": {
                "resource": {"id": transfer_id, "type": "transfer"},
                "active_cases": ["deposit_amount_less_invoice"]
            }
        }))
        .await;
    assert_eq!(status, StatusCode::OK);

    let payout = wh.h.ledger.get(payout_id).await.unwrap().unwrap();
    assert!(payout.has_active_issue);
    assert_eq!(payout.status, PayoutStatus::Processing);
    assert_eq!(payout.status_history.len(), 2);
}

#[tokio::test]
async fn unconsumed_event_types_are_acknowledged() {
    let wh = WebhookHarness::new();
    wh.processing_payout().await;

    let (status, _) = wh
        .post_signed(serde_json::json!({
            "event_type": "balances#credit",
            "data": {"amount": 100}
        }))
        .await;
    assert_eq!(status, StatusCode::OK);
}
