//! Webhook Reconciler: authenticates provider callbacks and applies the
//! resulting status transitions to the ledger.
//!
//! Callbacks may arrive out of order and more than once. The ledger's
//! idempotent `apply_transition` absorbs duplicates, and stale transitions
//! that would walk an illegal edge are logged and dropped rather than
//! retried; the provider always gets a 200 for them.
//!
//! Also home to the reconciliation poller, the only retry path for payouts
//! that already have a `provider_transfer_id`.

use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use uuid::Uuid;

use crate::models::payout::PayoutStatus;
use crate::models::webhook::{
    ActiveCasesData, EVENT_TRANSFER_ACTIVE_CASES, EVENT_TRANSFER_STATE_CHANGE, ProviderEvent,
    StateChangeData, status_for_provider_state,
};
use crate::provider::ProviderClient;
use crate::stores::{LedgerError, PayoutLedger, TransitionError};

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the hex HMAC-SHA256 digest of the raw request body.
pub const SIGNATURE_HEADER: &str = "X-Webhook-Signature";

#[derive(Debug, thiserror::Error)]
pub enum SignatureError {
    #[error("missing signature header")]
    Missing,

    #[error("signature is not valid hex")]
    Malformed,

    #[error("signature verification failed")]
    Mismatch,
}

/// Verify the webhook signature over the raw body.
///
/// Accepts the digest with or without a `sha256=` prefix. The comparison is
/// constant-time (`Mac::verify_slice`).
pub fn verify_signature(
    secret: &str,
    body: &[u8],
    signature_header: Option<&str>,
) -> Result<(), SignatureError> {
    let header = signature_header.ok_or(SignatureError::Missing)?;
    let hex_digest = header.strip_prefix("sha256=").unwrap_or(header);
    let digest = hex::decode(hex_digest).map_err(|_| SignatureError::Malformed)?;

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("HMAC accepts any key length");
    mac.update(body);
    mac.verify_slice(&digest)
        .map_err(|_| SignatureError::Mismatch)
}

/// Compute the hex signature for a body. Used by delivery tooling and the
/// test suite; the service itself only verifies.
pub fn sign(secret: &str, body: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("HMAC accepts any key length");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

/// Whether the request is a validation/setup ping: empty body, or JSON
/// without the `event_type`/`data` envelope. Pings are acknowledged
/// unauthenticated and cause no side effects.
pub fn is_validation_ping(body: &[u8]) -> bool {
    if body.is_empty() {
        return true;
    }
    match serde_json::from_slice::<serde_json::Value>(body) {
        Ok(value) => {
            !(value.get("event_type").map(|v| v.is_string()).unwrap_or(false)
                && value.get("data").is_some())
        }
        // Not JSON at all: treat as a ping rather than triggering provider
        // retries.
        Err(_) => true,
    }
}

/// What a processed event did, for handler logging.
#[derive(Debug)]
pub enum WebhookOutcome {
    /// State change applied; the payout now has `status`.
    Applied { payout_id: Uuid, status: PayoutStatus },

    /// Duplicate delivery; ledger untouched.
    Duplicate { payout_id: Uuid },

    /// Stale transition that would walk an illegal edge; dropped.
    OutOfOrder {
        payout_id: Uuid,
        from: PayoutStatus,
        to: PayoutStatus,
    },

    /// Active case/hold flagged without a status change.
    IssueFlagged { payout_id: Uuid },

    /// The transfer belongs to another system instance or is stale; only
    /// logged, never an error (that would cause a retry storm).
    UnknownTransfer { transfer_id: String },

    /// Event type or payload shape we do not consume.
    Ignored { event_type: String },
}

/// Apply one authenticated provider event to the ledger.
pub async fn handle_event(
    ledger: &dyn PayoutLedger,
    event: ProviderEvent,
) -> Result<WebhookOutcome, LedgerError> {
    match event.event_type.as_str() {
        EVENT_TRANSFER_STATE_CHANGE => {
            let data: StateChangeData = match serde_json::from_value(event.data) {
                Ok(data) => data,
                Err(e) => {
                    tracing::warn!(error = %e, "malformed state-change payload");
                    return Ok(WebhookOutcome::Ignored {
                        event_type: event.event_type,
                    });
                }
            };
            apply_state_change(ledger, data).await
        }
        EVENT_TRANSFER_ACTIVE_CASES => {
            let data: ActiveCasesData = match serde_json::from_value(event.data) {
                Ok(data) => data,
                Err(e) => {
                    tracing::warn!(error = %e, "malformed active-cases payload");
                    return Ok(WebhookOutcome::Ignored {
                        event_type: event.event_type,
                    });
                }
            };
            let transfer_id = data.resource.id.as_string();
            let Some(payout) = ledger.get_by_provider_transfer_id(&transfer_id).await? else {
                tracing::warn!(transfer_id, "active case for unknown transfer");
                return Ok(WebhookOutcome::UnknownTransfer { transfer_id });
            };
            let note = if data.active_cases.is_empty() {
                "active case opened".to_string()
            } else {
                data.active_cases.join(", ")
            };
            ledger.flag_active_issue(payout.id, &note).await?;
            Ok(WebhookOutcome::IssueFlagged { payout_id: payout.id })
        }
        other => {
            tracing::debug!(event_type = other, "ignoring provider event");
            Ok(WebhookOutcome::Ignored {
                event_type: event.event_type,
            })
        }
    }
}

async fn apply_state_change(
    ledger: &dyn PayoutLedger,
    data: StateChangeData,
) -> Result<WebhookOutcome, LedgerError> {
    let transfer_id = data.resource.id.as_string();
    let Some(payout) = ledger.get_by_provider_transfer_id(&transfer_id).await? else {
        tracing::warn!(
            transfer_id,
            state = %data.current_state,
            "state change for unknown transfer"
        );
        return Ok(WebhookOutcome::UnknownTransfer { transfer_id });
    };

    let target = status_for_provider_state(&data.current_state);
    let error = match target {
        PayoutStatus::Failed => Some(TransitionError::note(format!(
            "transfer {} (provider state: {})",
            if data.current_state == "bounced_back" {
                "bounced back"
            } else {
                "was refunded"
            },
            data.current_state
        ))),
        PayoutStatus::Refunded => Some(TransitionError::note("transfer charged back")),
        _ => None,
    };

    match ledger.apply_transition(payout.id, target, error).await {
        Ok(outcome) if outcome.applied => {
            tracing::info!(
                payout_id = %payout.id,
                transfer_id,
                status = target.as_str(),
                "webhook applied status transition"
            );
            Ok(WebhookOutcome::Applied {
                payout_id: payout.id,
                status: target,
            })
        }
        Ok(_) => {
            tracing::debug!(payout_id = %payout.id, transfer_id, "duplicate webhook delivery");
            Ok(WebhookOutcome::Duplicate { payout_id: payout.id })
        }
        Err(LedgerError::IllegalTransition { from, to }) => {
            tracing::warn!(
                payout_id = %payout.id,
                transfer_id,
                from = from.as_str(),
                to = to.as_str(),
                "dropping out-of-order webhook transition"
            );
            Ok(WebhookOutcome::OutOfOrder {
                payout_id: payout.id,
                from,
                to,
            })
        }
        Err(e) => Err(e),
    }
}

/// Poll the provider for payouts stuck in `processing` longer than
/// `stale_after` and apply whatever state the provider reports. Returns how
/// many payouts were advanced.
pub async fn reconcile_stale(
    ledger: &dyn PayoutLedger,
    provider: &dyn ProviderClient,
    stale_after: chrono::Duration,
) -> Result<u32, LedgerError> {
    let cutoff = Utc::now() - stale_after;
    let stale = ledger.list_stale_processing(cutoff).await?;
    let mut advanced = 0;

    for payout in stale {
        let Some(transfer_id) = payout.provider_transfer_id.as_deref() else {
            // Processing without a transfer id cannot happen through
            // mark_processing; log and skip rather than guessing.
            tracing::error!(payout_id = %payout.id, "processing payout without transfer id");
            continue;
        };

        let state = match provider.get_transfer_state(transfer_id).await {
            Ok(state) => state,
            Err(e) => {
                tracing::warn!(
                    payout_id = %payout.id,
                    transfer_id,
                    error = %e,
                    "status poll failed; will retry next cycle"
                );
                continue;
            }
        };

        let target = status_for_provider_state(&state);
        if target == PayoutStatus::Processing {
            continue;
        }

        let error = (target == PayoutStatus::Failed)
            .then(|| TransitionError::note(format!("reconciled from provider state {state}")));
        match ledger.apply_transition(payout.id, target, error).await {
            Ok(outcome) if outcome.applied => {
                tracing::info!(
                    payout_id = %payout.id,
                    transfer_id,
                    status = target.as_str(),
                    "reconciliation advanced payout"
                );
                advanced += 1;
            }
            Ok(_) => {}
            Err(LedgerError::IllegalTransition { from, to }) => {
                tracing::warn!(
                    payout_id = %payout.id,
                    from = from.as_str(),
                    to = to.as_str(),
                    "reconciliation skipped illegal transition"
                );
            }
            Err(e) => return Err(e),
        }
    }

    Ok(advanced)
}
