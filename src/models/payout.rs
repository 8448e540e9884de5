//! Payout data models and API request/response types.
//!
//! This module defines:
//! - `Payout`: the ledger entity for one payout attempt
//! - `PayoutStatus`: the status state machine and its legal edges
//! - `StatusHistoryEntry`: one entry in the append-only transition log
//! - Request/response types for the payout API
//! - `PayoutResult` and `ErrorCode`: the structured outcome of the
//!   Transfer Initiator

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Status of a payout attempt.
///
/// Transitions form a directed graph with no cycles back to `Pending`:
///
/// ```text
/// pending    -> processing | failed | cancelled
/// processing -> completed | failed | cancelled | refunded
/// failed     -> refunded                (charge-back)
/// completed, cancelled, refunded        (terminal)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayoutStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
    Refunded,
}

impl PayoutStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PayoutStatus::Pending => "pending",
            PayoutStatus::Processing => "processing",
            PayoutStatus::Completed => "completed",
            PayoutStatus::Failed => "failed",
            PayoutStatus::Cancelled => "cancelled",
            PayoutStatus::Refunded => "refunded",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(PayoutStatus::Pending),
            "processing" => Some(PayoutStatus::Processing),
            "completed" => Some(PayoutStatus::Completed),
            "failed" => Some(PayoutStatus::Failed),
            "cancelled" => Some(PayoutStatus::Cancelled),
            "refunded" => Some(PayoutStatus::Refunded),
            _ => None,
        }
    }

    /// Whether `self -> to` is a legal edge of the status graph.
    ///
    /// Re-applying the current status is not an edge; callers treat that
    /// case as an idempotent no-op before consulting this check.
    pub fn can_transition_to(&self, to: PayoutStatus) -> bool {
        use PayoutStatus::*;
        matches!(
            (self, to),
            (Pending, Processing)
                | (Pending, Failed)
                | (Pending, Cancelled)
                | (Processing, Completed)
                | (Processing, Failed)
                | (Processing, Cancelled)
                | (Processing, Refunded)
                | (Failed, Refunded)
        )
    }

    /// Terminal statuses accept no further transitions (except
    /// `Failed -> Refunded` for charge-backs).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PayoutStatus::Completed | PayoutStatus::Cancelled | PayoutStatus::Refunded
        )
    }
}

/// One entry in a payout's append-only status history.
///
/// History is only ever appended to; entries are never mutated or removed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusHistoryEntry {
    pub status: PayoutStatus,
    pub from_status: Option<PayoutStatus>,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// Error taxonomy for payout failures.
///
/// These are result codes, not Rust error types: the Transfer Initiator and
/// Batch Coordinator return them inside `PayoutResult` rather than bubbling
/// them up as `Err`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Creator or provider account balance cannot cover the payout.
    /// Fatal; requires a top-up, never a retry.
    InsufficientBalance,
    /// No verified bank account, or the provider rejected the destination.
    InvalidBankAccount,
    /// Creator has no profile/balance rows. Data integrity issue.
    CreatorNotFound,
    /// Provider rate limit hit. Retry after a delay.
    RateLimitExceeded,
    /// Provider call timed out. The transfer may still have been created.
    Timeout,
    /// Connection-level failure before the provider answered.
    NetworkError,
    /// Provider 5xx.
    ServerError,
    /// No payout route for the resolved country/currency.
    UnsupportedCountry,
}

impl ErrorCode {
    pub fn retryable(&self) -> bool {
        matches!(
            self,
            ErrorCode::RateLimitExceeded
                | ErrorCode::Timeout
                | ErrorCode::NetworkError
                | ErrorCode::ServerError
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::InsufficientBalance => "INSUFFICIENT_BALANCE",
            ErrorCode::InvalidBankAccount => "INVALID_BANK_ACCOUNT",
            ErrorCode::CreatorNotFound => "CREATOR_NOT_FOUND",
            ErrorCode::RateLimitExceeded => "RATE_LIMIT_EXCEEDED",
            ErrorCode::Timeout => "TIMEOUT",
            ErrorCode::NetworkError => "NETWORK_ERROR",
            ErrorCode::ServerError => "SERVER_ERROR",
            ErrorCode::UnsupportedCountry => "UNSUPPORTED_COUNTRY",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "INSUFFICIENT_BALANCE" => Some(ErrorCode::InsufficientBalance),
            "INVALID_BANK_ACCOUNT" => Some(ErrorCode::InvalidBankAccount),
            "CREATOR_NOT_FOUND" => Some(ErrorCode::CreatorNotFound),
            "RATE_LIMIT_EXCEEDED" => Some(ErrorCode::RateLimitExceeded),
            "TIMEOUT" => Some(ErrorCode::Timeout),
            "NETWORK_ERROR" => Some(ErrorCode::NetworkError),
            "SERVER_ERROR" => Some(ErrorCode::ServerError),
            "UNSUPPORTED_COUNTRY" => Some(ErrorCode::UnsupportedCountry),
            _ => None,
        }
    }
}

/// One attempt to move money from the platform to a creator.
///
/// Rows are soft-deleted via `deleted_at` (audit requirement) and the
/// `status_history` log is append-only. `completed_at` / `failed_at` are set
/// exactly once, on the transition into the matching status.
#[derive(Debug, Clone, Serialize)]
pub struct Payout {
    pub id: Uuid,
    pub creator_id: Uuid,

    /// Stable client-generated reference; the provider idempotency key.
    pub client_reference: String,

    /// Amount in the creator's target currency.
    pub amount: Decimal,
    pub currency: String,

    /// Amount deducted from the platform ledger, pre-conversion.
    pub source_amount: Decimal,
    pub source_currency: String,
    pub exchange_rate: Decimal,

    /// Masked destination, e.g. `"GBP ••••1234"`.
    pub destination_ref: String,

    /// Set once the provider acknowledges transfer creation. Unique across
    /// non-deleted payouts.
    pub provider_transfer_id: Option<String>,
    pub provider_fee: Decimal,
    pub platform_fee: Decimal,

    pub status: PayoutStatus,
    pub status_history: Vec<StatusHistoryEntry>,

    /// Set when the provider reports an active case/hold on the transfer
    /// without changing its terminal status.
    pub has_active_issue: bool,

    pub error_code: Option<ErrorCode>,
    pub error_message: Option<String>,

    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub failed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing)]
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Input for creating a new ledger row. Always starts in `Pending` with a
/// single history entry.
#[derive(Debug, Clone)]
pub struct NewPayout {
    pub creator_id: Uuid,
    pub client_reference: String,
    pub amount: Decimal,
    pub currency: String,
    pub source_amount: Decimal,
    pub source_currency: String,
    pub exchange_rate: Decimal,
    pub destination_ref: String,
    pub platform_fee: Decimal,
}

/// Request to pay out a creator.
///
/// # JSON Example
///
/// ```json
/// {
///   "creator_id": "550e8400-e29b-41d4-a716-446655440000",
///   "amount": "50.00",
///   "source_currency": "USD",
///   "reason": "balance_withdrawal"
/// }
/// ```
///
/// `client_reference` is optional; when absent the initiator generates one.
/// Callers that retry after transient failures must reuse the reference they
/// got back, otherwise the at-most-one-transfer guarantee does not hold.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayoutRequest {
    pub creator_id: Uuid,

    /// Amount in source-currency units (platform ledger currency).
    pub amount: Decimal,

    pub source_currency: String,

    pub reason: Option<String>,

    pub metadata: Option<serde_json::Value>,

    pub client_reference: Option<String>,
}

impl PayoutRequest {
    /// Fill in a generated client reference when the caller did not supply
    /// one. The Batch Coordinator normalizes every item through this before
    /// scheduling so retries stay idempotent.
    pub fn with_reference(mut self) -> Self {
        if self.client_reference.is_none() {
            self.client_reference = Some(format!("payout-{}", Uuid::new_v4()));
        }
        self
    }
}

/// Structured outcome of the Transfer Initiator.
///
/// Expected business failures never surface as `Err`; they come back here
/// with `success == false` and a classified `code`.
#[derive(Debug, Clone, Serialize)]
pub struct PayoutResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payout: Option<Payout>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<ErrorCode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retryable: Option<bool>,
}

impl PayoutResult {
    pub fn ok(payout: Payout) -> Self {
        Self {
            success: true,
            payout: Some(payout),
            error: None,
            code: None,
            retryable: None,
        }
    }

    pub fn failed(code: ErrorCode, error: impl Into<String>) -> Self {
        Self {
            success: false,
            payout: None,
            error: Some(error.into()),
            code: Some(code),
            retryable: Some(code.retryable()),
        }
    }

    /// Failure that left a (failed) ledger row behind, i.e. the request
    /// reached the provider.
    pub fn failed_with_payout(payout: Payout, code: ErrorCode, error: impl Into<String>) -> Self {
        Self {
            success: false,
            payout: Some(payout),
            error: Some(error.into()),
            code: Some(code),
            retryable: Some(code.retryable()),
        }
    }

    /// Local validation failure; nothing was persisted and nothing reached
    /// the provider.
    pub fn rejected(error: impl Into<String>) -> Self {
        Self {
            success: false,
            payout: None,
            error: Some(error.into()),
            code: None,
            retryable: Some(false),
        }
    }
}

/// A batch item that failed, with everything needed to retry it.
#[derive(Debug, Clone, Serialize)]
pub struct FailedPayout {
    /// The normalized request (client reference filled in), safe to re-submit.
    pub request: PayoutRequest,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<ErrorCode>,
    pub error: String,
    pub retryable: bool,
}

/// Aggregate totals for one Batch Coordinator run.
#[derive(Debug, Clone, Serialize)]
pub struct BatchSummary {
    pub total: usize,
    pub success_count: usize,
    pub failure_count: usize,
    /// Source-currency totals of the successful payouts.
    pub totals_by_currency: std::collections::HashMap<String, Decimal>,
}

/// Result of one Batch Coordinator run. Transient; not persisted.
#[derive(Debug, Clone, Serialize)]
pub struct BatchPayoutResult {
    pub summary: BatchSummary,
    pub successful: Vec<Payout>,
    pub failed: Vec<FailedPayout>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legal_edges() {
        use PayoutStatus::*;
        assert!(Pending.can_transition_to(Processing));
        assert!(Pending.can_transition_to(Failed));
        assert!(Pending.can_transition_to(Cancelled));
        assert!(Processing.can_transition_to(Completed));
        assert!(Processing.can_transition_to(Failed));
        assert!(Processing.can_transition_to(Cancelled));
        assert!(Processing.can_transition_to(Refunded));
        assert!(Failed.can_transition_to(Refunded));
    }

    #[test]
    fn no_cycles_back_to_pending() {
        use PayoutStatus::*;
        for from in [Pending, Processing, Completed, Failed, Cancelled, Refunded] {
            assert!(!from.can_transition_to(Pending), "{from:?} -> pending must be illegal");
        }
    }

    #[test]
    fn terminal_statuses_are_sinks() {
        use PayoutStatus::*;
        for to in [Pending, Processing, Completed, Failed, Cancelled, Refunded] {
            assert!(!Completed.can_transition_to(to));
            assert!(!Cancelled.can_transition_to(to));
            assert!(!Refunded.can_transition_to(to));
        }
        // The single exception on the failed sink: charge-backs.
        assert!(Failed.can_transition_to(Refunded));
        assert!(!Failed.can_transition_to(Processing));
    }

    #[test]
    fn status_round_trips_through_strings() {
        use PayoutStatus::*;
        for status in [Pending, Processing, Completed, Failed, Cancelled, Refunded] {
            assert_eq!(PayoutStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(PayoutStatus::parse("checking"), None);
    }

    #[test]
    fn retryability_matches_taxonomy() {
        assert!(!ErrorCode::InsufficientBalance.retryable());
        assert!(!ErrorCode::InvalidBankAccount.retryable());
        assert!(!ErrorCode::CreatorNotFound.retryable());
        assert!(!ErrorCode::UnsupportedCountry.retryable());
        assert!(ErrorCode::RateLimitExceeded.retryable());
        assert!(ErrorCode::Timeout.retryable());
        assert!(ErrorCode::NetworkError.retryable());
        assert!(ErrorCode::ServerError.retryable());
    }

    #[test]
    fn with_reference_is_stable() {
        let req = PayoutRequest {
            creator_id: Uuid::new_v4(),
            amount: Decimal::new(5000, 2),
            source_currency: "USD".to_string(),
            reason: None,
            metadata: None,
            client_reference: None,
        }
        .with_reference();

        let reference = req.client_reference.clone().unwrap();
        // Normalizing again must not rotate the reference.
        assert_eq!(req.with_reference().client_reference.unwrap(), reference);
    }
}
