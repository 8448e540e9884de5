//! Inbound provider webhook payload types.
//!
//! The transfer provider delivers asynchronous status callbacks as JSON with
//! an `event_type` and a `data` envelope. Two event classes matter here:
//!
//! - **transfer state change** (`transfers#state-change`): carries the
//!   transfer id and its new provider-side state, which maps onto a
//!   `PayoutStatus` transition.
//! - **active case** (`transfers#active-cases`): flags a non-terminal hold
//!   or investigation on a transfer without changing its status.
//!
//! Anything else (including validation/setup pings with no `event_type` or
//! `data` at all) is acknowledged without side effects.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::payout::PayoutStatus;

pub const EVENT_TRANSFER_STATE_CHANGE: &str = "transfers#state-change";
pub const EVENT_TRANSFER_ACTIVE_CASES: &str = "transfers#active-cases";

/// Raw provider event envelope, parsed after signature verification.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderEvent {
    pub event_type: String,
    pub data: serde_json::Value,
}

/// Payload of a `transfers#state-change` event.
#[derive(Debug, Clone, Deserialize)]
pub struct StateChangeData {
    pub resource: EventResource,
    pub current_state: String,
    pub previous_state: Option<String>,
    pub occurred_at: Option<DateTime<Utc>>,
}

/// Payload of a `transfers#active-cases` event.
#[derive(Debug, Clone, Deserialize)]
pub struct ActiveCasesData {
    pub resource: EventResource,
    #[serde(default)]
    pub active_cases: Vec<String>,
}

/// The transfer the event refers to. The provider serializes ids as numbers
/// in some event versions and strings in others.
#[derive(Debug, Clone, Deserialize)]
pub struct EventResource {
    pub id: TransferId,
    #[serde(rename = "type")]
    pub resource_type: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum TransferId {
    Num(i64),
    Str(String),
}

impl TransferId {
    pub fn as_string(&self) -> String {
        match self {
            TransferId::Num(n) => n.to_string(),
            TransferId::Str(s) => s.clone(),
        }
    }
}

/// Map a provider transfer state onto the ledger status it implies.
///
/// `outgoing_payment_sent` is the provider's "money left our account"
/// terminal; `bounced_back` and `funds_refunded` mean the transfer did not
/// reach the destination. Every state not listed is an intermediate
/// processing step and maps to `Processing` (re-delivery of which the ledger
/// absorbs as a no-op).
pub fn status_for_provider_state(state: &str) -> PayoutStatus {
    match state {
        "outgoing_payment_sent" => PayoutStatus::Completed,
        "bounced_back" | "funds_refunded" => PayoutStatus::Failed,
        "charged_back" => PayoutStatus::Refunded,
        "cancelled" => PayoutStatus::Cancelled,
        _ => PayoutStatus::Processing,
    }
}

/// Fixed acknowledgment returned for validation/setup pings.
#[derive(Debug, Serialize)]
pub struct PingAck {
    pub received: bool,
}

impl PingAck {
    pub fn new() -> Self {
        Self { received: true }
    }
}

impl Default for PingAck {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_state_mapping() {
        assert_eq!(
            status_for_provider_state("outgoing_payment_sent"),
            PayoutStatus::Completed
        );
        assert_eq!(status_for_provider_state("bounced_back"), PayoutStatus::Failed);
        assert_eq!(status_for_provider_state("funds_refunded"), PayoutStatus::Failed);
        assert_eq!(status_for_provider_state("charged_back"), PayoutStatus::Refunded);
        assert_eq!(status_for_provider_state("cancelled"), PayoutStatus::Cancelled);
        // Unknown and intermediate states all count as processing.
        assert_eq!(status_for_provider_state("funds_converted"), PayoutStatus::Processing);
        assert_eq!(status_for_provider_state(""), PayoutStatus::Processing);
    }

    #[test]
    fn transfer_id_accepts_numbers_and_strings() {
        let event: StateChangeData = serde_json::from_value(serde_json::json!({
            "resource": {"id": 16521632, "type": "transfer"},
            "current_state": "outgoing_payment_sent",
            "previous_state": "processing"
        }))
        .unwrap();
        assert_eq!(event.resource.id.as_string(), "16521632");

        let event: StateChangeData = serde_json::from_value(serde_json::json!({
            "resource": {"id": "trf-abc", "type": "transfer"},
            "current_state": "cancelled"
        }))
        .unwrap();
        assert_eq!(event.resource.id.as_string(), "trf-abc");
    }
}
