//! Business logic for the payout orchestration core.

pub mod bank_accounts;
pub mod batch;
pub mod payout_service;
pub mod resolver;
pub mod webhook_service;

use std::sync::Arc;

use rust_decimal::Decimal;

use crate::crypto::FieldCipher;
use crate::provider::ProviderClient;
use crate::stores::{CreatorStore, PayoutLedger};

/// Tunables for the Transfer Initiator.
#[derive(Debug, Clone)]
pub struct PayoutSettings {
    /// Platform's cut of each payout, as a percent of the source amount.
    /// 0 = full pass-through (balance withdrawals); ticket-sale flows run
    /// with 5.
    pub platform_fee_percent: Decimal,
}

impl Default for PayoutSettings {
    fn default() -> Self {
        Self {
            platform_fee_percent: Decimal::ZERO,
        }
    }
}

/// Everything the payout services depend on, behind trait objects so tests
/// swap in the in-memory stores and the mock provider.
#[derive(Clone)]
pub struct PayoutContext {
    pub ledger: Arc<dyn PayoutLedger>,
    pub creators: Arc<dyn CreatorStore>,
    pub provider: Arc<dyn ProviderClient>,
    pub cipher: Arc<FieldCipher>,
    pub settings: PayoutSettings,
}
