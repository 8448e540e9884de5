//! Transfer provider client seam.
//!
//! The payout core talks to the money-transfer provider through the
//! `ProviderClient` trait: quoting, transfer creation, platform account
//! balance, and transfer-status polling. The HTTP implementation targets a
//! Wise-like REST API; the mock implementation drives the test suite.

pub mod http;
pub mod mock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::models::payout::ErrorCode;

/// Provider-side failure, classified so the Transfer Initiator can map it
/// straight onto the payout error taxonomy.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ProviderError {
    /// The platform's provider account cannot fund the transfer. Requires
    /// an operator top-up; retrying cannot help.
    #[error("provider account has insufficient funds")]
    InsufficientFunds,

    /// The provider rejected the destination account.
    #[error("provider rejected destination: {0}")]
    InvalidDestination(String),

    /// No route for the requested currency corridor.
    #[error("unsupported payout route: {0}")]
    UnsupportedRoute(String),

    #[error("provider rate limit exceeded")]
    RateLimited { retry_after_secs: Option<u64> },

    /// The call timed out. The transfer may still have been created; only a
    /// status poll by transfer id can tell.
    #[error("provider request timed out")]
    Timeout,

    #[error("network error: {0}")]
    Network(String),

    #[error("provider server error: {0}")]
    Server(String),
}

impl ProviderError {
    pub fn code(&self) -> ErrorCode {
        match self {
            ProviderError::InsufficientFunds => ErrorCode::InsufficientBalance,
            ProviderError::InvalidDestination(_) => ErrorCode::InvalidBankAccount,
            ProviderError::UnsupportedRoute(_) => ErrorCode::UnsupportedCountry,
            ProviderError::RateLimited { .. } => ErrorCode::RateLimitExceeded,
            ProviderError::Timeout => ErrorCode::Timeout,
            ProviderError::Network(_) => ErrorCode::NetworkError,
            ProviderError::Server(_) => ErrorCode::ServerError,
        }
    }

    pub fn retryable(&self) -> bool {
        self.code().retryable()
    }
}

#[derive(Debug, Clone)]
pub struct QuoteRequest {
    pub source_currency: String,
    pub target_currency: String,
    pub source_amount: Decimal,
}

/// A time-limited currency-conversion offer. Must be consumed by transfer
/// creation before `expires_at` or re-fetched.
#[derive(Debug, Clone)]
pub struct Quote {
    pub quote_id: String,
    pub rate: Decimal,
    pub source_amount: Decimal,
    pub target_amount: Decimal,
    pub expires_at: DateTime<Utc>,
}

/// Decrypted destination details passed to transfer creation.
#[derive(Debug, Clone)]
pub struct TransferDestination {
    pub account_number: String,
    pub routing_number: String,
    pub account_holder_name: String,
    pub currency: String,
    pub country: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CreateTransferRequest {
    /// Stable client reference; the provider deduplicates on it, which is
    /// what makes naive retries safe.
    pub reference: String,
    pub quote_id: Option<String>,
    pub source_currency: String,
    pub source_amount: Decimal,
    pub target_currency: String,
    pub target_amount: Decimal,
    pub destination: TransferDestination,
}

#[derive(Debug, Clone)]
pub struct TransferReceipt {
    pub transfer_id: String,
    pub fee: Decimal,
    pub state: String,
}

#[async_trait]
pub trait ProviderClient: Send + Sync {
    async fn get_quote(&self, request: QuoteRequest) -> Result<Quote, ProviderError>;

    async fn create_transfer(
        &self,
        request: CreateTransferRequest,
    ) -> Result<TransferReceipt, ProviderError>;

    /// Available balance of the platform's provider account in `currency`.
    async fn get_account_balance(&self, currency: &str) -> Result<Decimal, ProviderError>;

    /// Authoritative provider-side state of a transfer, for the
    /// reconciliation poller.
    async fn get_transfer_state(&self, provider_transfer_id: &str)
    -> Result<String, ProviderError>;
}
