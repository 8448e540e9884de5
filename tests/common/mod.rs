//! Shared test fixtures: in-memory stores, mock provider, and seeded
//! creators.

// Each integration test binary compiles this module separately and uses a
// different subset of it.
#![allow(dead_code)]

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use uuid::Uuid;

use soundbridge_payouts::crypto::FieldCipher;
use soundbridge_payouts::models::bank_account::BankAccount;
use soundbridge_payouts::provider::mock::MockProvider;
use soundbridge_payouts::services::{PayoutContext, PayoutSettings};
use soundbridge_payouts::stores::memory::{InMemoryCreatorStore, InMemoryLedger};

pub const WEBHOOK_SECRET: &str = "whsec_test_secret";

pub fn field_cipher() -> FieldCipher {
    FieldCipher::from_hex_key(&"ab".repeat(32)).unwrap()
}

pub struct TestHarness {
    pub ctx: Arc<PayoutContext>,
    pub ledger: Arc<InMemoryLedger>,
    pub creators: Arc<InMemoryCreatorStore>,
    pub provider: Arc<MockProvider>,
    pub cipher: Arc<FieldCipher>,
}

pub fn harness() -> TestHarness {
    harness_with_settings(PayoutSettings::default())
}

pub fn harness_with_settings(settings: PayoutSettings) -> TestHarness {
    let ledger = Arc::new(InMemoryLedger::new());
    let creators = Arc::new(InMemoryCreatorStore::new());
    let provider = Arc::new(MockProvider::new());
    let cipher = Arc::new(field_cipher());

    let ctx = Arc::new(PayoutContext {
        ledger: ledger.clone(),
        creators: creators.clone(),
        provider: provider.clone(),
        cipher: cipher.clone(),
        settings,
    });

    TestHarness {
        ctx,
        ledger,
        creators,
        provider,
        cipher,
    }
}

impl TestHarness {
    /// Seed a creator with a profile, a USD balance, and a verified bank
    /// account in `currency`.
    pub async fn seed_creator(
        &self,
        country: Option<&str>,
        currency: &str,
        balance: Decimal,
    ) -> Uuid {
        let creator_id = Uuid::new_v4();
        self.creators
            .insert_profile(creator_id, "Test Creator", country)
            .await;
        self.creators.set_balance(creator_id, balance, "USD").await;
        self.creators
            .insert_bank_account(BankAccount {
                id: Uuid::new_v4(),
                creator_id,
                account_number_encrypted: self.cipher.encrypt("0123456789").unwrap(),
                routing_number_encrypted: self.cipher.encrypt("044150149").unwrap(),
                account_holder_name: "Test Creator".to_string(),
                currency: currency.to_string(),
                country: country.map(str::to_string),
                is_verified: true,
                created_at: Utc::now(),
            })
            .await;
        creator_id
    }

    /// Seed a creator with a balance but no bank account on file.
    pub async fn seed_creator_without_account(&self, balance: Decimal) -> Uuid {
        let creator_id = Uuid::new_v4();
        self.creators
            .insert_profile(creator_id, "No Account", Some("US"))
            .await;
        self.creators.set_balance(creator_id, balance, "USD").await;
        creator_id
    }
}

/// The standard USD -> NGN corridor used across the scenario tests.
pub async fn seed_ngn_corridor(h: &TestHarness) {
    h.provider.set_rate("USD", "NGN", dec!(1600)).await;
    h.provider.set_fee(dec!(1.20)).await;
}
