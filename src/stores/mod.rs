//! Storage seams for the payout core.
//!
//! The Transfer Initiator and Webhook Reconciler depend on these traits
//! rather than a concrete database client, so storage engines can be
//! swapped and tests can run against the in-memory implementations.
//!
//! All ledger mutations funnel through `apply_transition`, the single
//! atomic operation that enforces the status graph and the append-only
//! history invariant.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::models::bank_account::BankAccount;
use crate::models::creator::{CreatorBalance, CreatorProfile};
use crate::models::payout::{ErrorCode, NewPayout, Payout, PayoutStatus};

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("payout not found")]
    NotFound,

    #[error("illegal status transition {from:?} -> {to:?}")]
    IllegalTransition { from: PayoutStatus, to: PayoutStatus },

    #[error("provider transfer id {0} already recorded")]
    DuplicateProviderTransferId(String),

    #[error("corrupt status history: {0}")]
    CorruptHistory(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("creator not found")]
    NotFound,

    #[error("insufficient balance")]
    InsufficientBalance,

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Extra context recorded alongside a transition into `Failed` (or the
/// charge-back note on a `Refunded` transition).
#[derive(Debug, Clone)]
pub struct TransitionError {
    pub code: Option<ErrorCode>,
    pub message: String,
}

impl TransitionError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            message: message.into(),
        }
    }

    pub fn note(message: impl Into<String>) -> Self {
        Self {
            code: None,
            message: message.into(),
        }
    }
}

/// Result of `apply_transition`. `applied == false` means the event was a
/// duplicate of the current state and the ledger did nothing.
#[derive(Debug, Clone)]
pub struct TransitionOutcome {
    pub payout: Payout,
    pub applied: bool,
}

/// The durable record of payout attempts.
#[async_trait]
pub trait PayoutLedger: Send + Sync {
    /// Insert a new payout in `Pending` with one history entry.
    async fn create(&self, new: NewPayout) -> Result<Payout, LedgerError>;

    async fn get(&self, id: Uuid) -> Result<Option<Payout>, LedgerError>;

    /// Look up by the provider's transfer id (webhook correlation).
    /// Soft-deleted rows are excluded.
    async fn get_by_provider_transfer_id(
        &self,
        provider_transfer_id: &str,
    ) -> Result<Option<Payout>, LedgerError>;

    /// Look up by the client idempotency reference (replay detection).
    async fn get_by_client_reference(
        &self,
        client_reference: &str,
    ) -> Result<Option<Payout>, LedgerError>;

    /// Paginated payout history for one creator, most-recent-first,
    /// excluding soft-deleted rows.
    async fn list_for_creator(
        &self,
        creator_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Payout>, LedgerError>;

    /// `Processing` payouts created before `cutoff`, for the
    /// reconciliation poller.
    async fn list_stale_processing(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Payout>, LedgerError>;

    /// Record the provider acknowledgment: set `provider_transfer_id` and
    /// `provider_fee`, then transition `Pending -> Processing`.
    async fn mark_processing(
        &self,
        id: Uuid,
        provider_transfer_id: &str,
        provider_fee: Decimal,
    ) -> Result<Payout, LedgerError>;

    /// The single mutation path for status changes. Validates the edge,
    /// appends exactly one history entry, sets `completed_at`/`failed_at`
    /// exactly once, and no-ops when the most recent history entry already
    /// reflects `target` (duplicate webhook delivery).
    async fn apply_transition(
        &self,
        id: Uuid,
        target: PayoutStatus,
        error: Option<TransitionError>,
    ) -> Result<TransitionOutcome, LedgerError>;

    /// Flag a provider active case/hold without a status transition.
    async fn flag_active_issue(&self, id: Uuid, note: &str) -> Result<(), LedgerError>;

    /// Logical delete. Rows are never hard-deleted.
    async fn soft_delete(&self, id: Uuid) -> Result<(), LedgerError>;
}

/// Apply a status transition to a payout value in place.
///
/// Shared by the Postgres and in-memory ledgers so both enforce identical
/// semantics: idempotent no-op on duplicate events, legality check against
/// the status graph, exactly one history append, and set-once timestamps.
/// Returns whether the transition was applied.
pub(crate) fn transition_in_place(
    payout: &mut Payout,
    target: PayoutStatus,
    error: Option<&TransitionError>,
    now: DateTime<Utc>,
) -> Result<bool, LedgerError> {
    // Duplicate delivery: the most recent history entry already reflects
    // the target status.
    if payout
        .status_history
        .last()
        .is_some_and(|entry| entry.status == target)
    {
        return Ok(false);
    }

    if !payout.status.can_transition_to(target) {
        return Err(LedgerError::IllegalTransition {
            from: payout.status,
            to: target,
        });
    }

    let from = payout.status;
    payout.status_history.push(crate::models::payout::StatusHistoryEntry {
        status: target,
        from_status: Some(from),
        timestamp: now,
        error_message: error.map(|e| e.message.clone()),
    });
    payout.status = target;

    match target {
        PayoutStatus::Completed => {
            if payout.completed_at.is_none() {
                payout.completed_at = Some(now);
            }
        }
        PayoutStatus::Failed => {
            if payout.failed_at.is_none() {
                payout.failed_at = Some(now);
            }
            if let Some(err) = error {
                payout.error_code = err.code;
                payout.error_message = Some(err.message.clone());
            }
        }
        _ => {}
    }

    Ok(true)
}

/// Collaborator stores: creator profiles, verified bank accounts, and the
/// platform balance ledger.
#[async_trait]
pub trait CreatorStore: Send + Sync {
    async fn get_profile(&self, creator_id: Uuid) -> Result<Option<CreatorProfile>, StoreError>;

    /// Most recently created account flagged `is_verified = true`, or `None`
    /// when the creator has no verified account (a normal outcome).
    async fn get_verified_bank_account(
        &self,
        creator_id: Uuid,
    ) -> Result<Option<BankAccount>, StoreError>;

    async fn get_available_balance(
        &self,
        creator_id: Uuid,
    ) -> Result<Option<CreatorBalance>, StoreError>;

    /// Atomically deduct `amount` from the creator's balance. Refuses to
    /// overdraw with `StoreError::InsufficientBalance`.
    async fn deduct_balance(
        &self,
        creator_id: Uuid,
        amount: Decimal,
    ) -> Result<CreatorBalance, StoreError>;
}
