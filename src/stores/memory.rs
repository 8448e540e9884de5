//! In-memory store implementations.
//!
//! Used by the test suite and by local development without Postgres. The
//! ledger mirrors the Postgres implementation's transition semantics
//! exactly (both delegate to `transition_in_place`).

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::models::bank_account::BankAccount;
use crate::models::creator::{CreatorBalance, CreatorProfile};
use crate::models::payout::{NewPayout, Payout, PayoutStatus, StatusHistoryEntry};

use super::{
    CreatorStore, LedgerError, PayoutLedger, StoreError, TransitionError, TransitionOutcome,
    transition_in_place,
};

#[derive(Default)]
pub struct InMemoryLedger {
    payouts: RwLock<HashMap<Uuid, Payout>>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PayoutLedger for InMemoryLedger {
    async fn create(&self, new: NewPayout) -> Result<Payout, LedgerError> {
        let now = Utc::now();
        let payout = Payout {
            id: Uuid::new_v4(),
            creator_id: new.creator_id,
            client_reference: new.client_reference,
            amount: new.amount,
            currency: new.currency,
            source_amount: new.source_amount,
            source_currency: new.source_currency,
            exchange_rate: new.exchange_rate,
            destination_ref: new.destination_ref,
            provider_transfer_id: None,
            provider_fee: Decimal::ZERO,
            platform_fee: new.platform_fee,
            status: PayoutStatus::Pending,
            status_history: vec![StatusHistoryEntry {
                status: PayoutStatus::Pending,
                from_status: None,
                timestamp: now,
                error_message: None,
            }],
            has_active_issue: false,
            error_code: None,
            error_message: None,
            created_at: now,
            completed_at: None,
            failed_at: None,
            deleted_at: None,
        };
        self.payouts.write().await.insert(payout.id, payout.clone());
        Ok(payout)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Payout>, LedgerError> {
        Ok(self.payouts.read().await.get(&id).cloned())
    }

    async fn get_by_provider_transfer_id(
        &self,
        provider_transfer_id: &str,
    ) -> Result<Option<Payout>, LedgerError> {
        Ok(self
            .payouts
            .read()
            .await
            .values()
            .find(|p| {
                p.deleted_at.is_none()
                    && p.provider_transfer_id.as_deref() == Some(provider_transfer_id)
            })
            .cloned())
    }

    async fn get_by_client_reference(
        &self,
        client_reference: &str,
    ) -> Result<Option<Payout>, LedgerError> {
        Ok(self
            .payouts
            .read()
            .await
            .values()
            .filter(|p| p.deleted_at.is_none() && p.client_reference == client_reference)
            .max_by_key(|p| p.created_at)
            .cloned())
    }

    async fn list_for_creator(
        &self,
        creator_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Payout>, LedgerError> {
        let mut payouts: Vec<Payout> = self
            .payouts
            .read()
            .await
            .values()
            .filter(|p| p.creator_id == creator_id && p.deleted_at.is_none())
            .cloned()
            .collect();
        payouts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(payouts
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn list_stale_processing(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Payout>, LedgerError> {
        Ok(self
            .payouts
            .read()
            .await
            .values()
            .filter(|p| {
                p.status == PayoutStatus::Processing
                    && p.deleted_at.is_none()
                    && p.created_at < cutoff
            })
            .cloned()
            .collect())
    }

    async fn mark_processing(
        &self,
        id: Uuid,
        provider_transfer_id: &str,
        provider_fee: Decimal,
    ) -> Result<Payout, LedgerError> {
        let mut payouts = self.payouts.write().await;

        let duplicate = payouts.values().any(|p| {
            p.id != id
                && p.deleted_at.is_none()
                && p.provider_transfer_id.as_deref() == Some(provider_transfer_id)
        });
        if duplicate {
            return Err(LedgerError::DuplicateProviderTransferId(
                provider_transfer_id.to_string(),
            ));
        }

        let payout = payouts.get_mut(&id).ok_or(LedgerError::NotFound)?;
        payout.provider_transfer_id = Some(provider_transfer_id.to_string());
        payout.provider_fee = provider_fee;
        transition_in_place(payout, PayoutStatus::Processing, None, Utc::now())?;
        Ok(payout.clone())
    }

    async fn apply_transition(
        &self,
        id: Uuid,
        target: PayoutStatus,
        error: Option<TransitionError>,
    ) -> Result<TransitionOutcome, LedgerError> {
        let mut payouts = self.payouts.write().await;
        let payout = payouts.get_mut(&id).ok_or(LedgerError::NotFound)?;
        let applied = transition_in_place(payout, target, error.as_ref(), Utc::now())?;
        Ok(TransitionOutcome {
            payout: payout.clone(),
            applied,
        })
    }

    async fn flag_active_issue(&self, id: Uuid, note: &str) -> Result<(), LedgerError> {
        let mut payouts = self.payouts.write().await;
        let payout = payouts.get_mut(&id).ok_or(LedgerError::NotFound)?;
        payout.has_active_issue = true;
        tracing::warn!(payout_id = %id, note, "active case flagged on payout");
        Ok(())
    }

    async fn soft_delete(&self, id: Uuid) -> Result<(), LedgerError> {
        let mut payouts = self.payouts.write().await;
        let payout = payouts.get_mut(&id).ok_or(LedgerError::NotFound)?;
        if payout.deleted_at.is_none() {
            payout.deleted_at = Some(Utc::now());
        }
        Ok(())
    }
}

#[derive(Default)]
struct CreatorData {
    profiles: HashMap<Uuid, CreatorProfile>,
    balances: HashMap<Uuid, CreatorBalance>,
    bank_accounts: Vec<BankAccount>,
}

#[derive(Default)]
pub struct InMemoryCreatorStore {
    inner: RwLock<CreatorData>,
}

impl InMemoryCreatorStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_profile(&self, creator_id: Uuid, display_name: &str, country_code: Option<&str>) {
        self.inner.write().await.profiles.insert(
            creator_id,
            CreatorProfile {
                creator_id,
                display_name: display_name.to_string(),
                country_code: country_code.map(str::to_string),
                created_at: Utc::now(),
            },
        );
    }

    pub async fn set_balance(&self, creator_id: Uuid, amount: Decimal, currency: &str) {
        self.inner.write().await.balances.insert(
            creator_id,
            CreatorBalance {
                creator_id,
                amount,
                currency: currency.to_string(),
                updated_at: Utc::now(),
            },
        );
    }

    pub async fn insert_bank_account(&self, account: BankAccount) {
        self.inner.write().await.bank_accounts.push(account);
    }
}

#[async_trait]
impl CreatorStore for InMemoryCreatorStore {
    async fn get_profile(&self, creator_id: Uuid) -> Result<Option<CreatorProfile>, StoreError> {
        Ok(self.inner.read().await.profiles.get(&creator_id).cloned())
    }

    async fn get_verified_bank_account(
        &self,
        creator_id: Uuid,
    ) -> Result<Option<BankAccount>, StoreError> {
        Ok(self
            .inner
            .read()
            .await
            .bank_accounts
            .iter()
            .filter(|a| a.creator_id == creator_id && a.is_verified)
            .max_by_key(|a| a.created_at)
            .cloned())
    }

    async fn get_available_balance(
        &self,
        creator_id: Uuid,
    ) -> Result<Option<CreatorBalance>, StoreError> {
        Ok(self.inner.read().await.balances.get(&creator_id).cloned())
    }

    async fn deduct_balance(
        &self,
        creator_id: Uuid,
        amount: Decimal,
    ) -> Result<CreatorBalance, StoreError> {
        let mut inner = self.inner.write().await;
        let balance = inner
            .balances
            .get_mut(&creator_id)
            .ok_or(StoreError::NotFound)?;
        if balance.amount < amount {
            return Err(StoreError::InsufficientBalance);
        }
        balance.amount -= amount;
        balance.updated_at = Utc::now();
        Ok(balance.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn new_payout(creator_id: Uuid) -> NewPayout {
        NewPayout {
            creator_id,
            client_reference: format!("payout-{}", Uuid::new_v4()),
            amount: dec!(80000),
            currency: "NGN".to_string(),
            source_amount: dec!(50.00),
            source_currency: "USD".to_string(),
            exchange_rate: dec!(1600),
            destination_ref: "NGN ••••6789".to_string(),
            platform_fee: Decimal::ZERO,
        }
    }

    #[tokio::test]
    async fn create_starts_pending_with_one_history_entry() {
        let ledger = InMemoryLedger::new();
        let payout = ledger.create(new_payout(Uuid::new_v4())).await.unwrap();
        assert_eq!(payout.status, PayoutStatus::Pending);
        assert_eq!(payout.status_history.len(), 1);
        assert_eq!(payout.status_history[0].status, PayoutStatus::Pending);
        assert!(payout.status_history[0].from_status.is_none());
    }

    #[tokio::test]
    async fn duplicate_transition_is_a_noop() {
        let ledger = InMemoryLedger::new();
        let payout = ledger.create(new_payout(Uuid::new_v4())).await.unwrap();
        ledger.mark_processing(payout.id, "trf-1", dec!(0.83)).await.unwrap();

        let first = ledger
            .apply_transition(payout.id, PayoutStatus::Completed, None)
            .await
            .unwrap();
        assert!(first.applied);
        let completed_at = first.payout.completed_at.unwrap();

        // Same webhook delivered again: no new history entry, timestamp
        // unchanged.
        let second = ledger
            .apply_transition(payout.id, PayoutStatus::Completed, None)
            .await
            .unwrap();
        assert!(!second.applied);
        assert_eq!(second.payout.status_history.len(), first.payout.status_history.len());
        assert_eq!(second.payout.completed_at.unwrap(), completed_at);
    }

    #[tokio::test]
    async fn illegal_transition_is_rejected() {
        let ledger = InMemoryLedger::new();
        let payout = ledger.create(new_payout(Uuid::new_v4())).await.unwrap();
        ledger.mark_processing(payout.id, "trf-2", dec!(0.5)).await.unwrap();
        ledger
            .apply_transition(payout.id, PayoutStatus::Completed, None)
            .await
            .unwrap();

        // A stale "processing" event arriving after completion is illegal,
        // not a silent success.
        let err = ledger
            .apply_transition(payout.id, PayoutStatus::Processing, None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LedgerError::IllegalTransition {
                from: PayoutStatus::Completed,
                to: PayoutStatus::Processing
            }
        ));
    }

    #[tokio::test]
    async fn failed_transition_records_error_once() {
        let ledger = InMemoryLedger::new();
        let payout = ledger.create(new_payout(Uuid::new_v4())).await.unwrap();
        ledger.mark_processing(payout.id, "trf-3", dec!(0.5)).await.unwrap();

        let outcome = ledger
            .apply_transition(
                payout.id,
                PayoutStatus::Failed,
                Some(TransitionError::note("transfer bounced back")),
            )
            .await
            .unwrap();
        assert!(outcome.applied);
        let failed_at = outcome.payout.failed_at.unwrap();
        assert_eq!(
            outcome.payout.error_message.as_deref(),
            Some("transfer bounced back")
        );

        // Charge-back after failure is the one legal exit from failed.
        let refunded = ledger
            .apply_transition(payout.id, PayoutStatus::Refunded, None)
            .await
            .unwrap();
        assert!(refunded.applied);
        assert_eq!(refunded.payout.failed_at.unwrap(), failed_at);
        assert_eq!(refunded.payout.status_history.len(), 4);
    }

    #[tokio::test]
    async fn provider_transfer_id_must_be_unique() {
        let ledger = InMemoryLedger::new();
        let a = ledger.create(new_payout(Uuid::new_v4())).await.unwrap();
        let b = ledger.create(new_payout(Uuid::new_v4())).await.unwrap();
        ledger.mark_processing(a.id, "trf-dup", dec!(0.5)).await.unwrap();

        let err = ledger.mark_processing(b.id, "trf-dup", dec!(0.5)).await.unwrap_err();
        assert!(matches!(err, LedgerError::DuplicateProviderTransferId(_)));
    }

    #[tokio::test]
    async fn soft_deleted_payouts_leave_listings_but_not_storage() {
        let ledger = InMemoryLedger::new();
        let creator_id = Uuid::new_v4();
        let payout = ledger.create(new_payout(creator_id)).await.unwrap();
        ledger.soft_delete(payout.id).await.unwrap();

        assert!(ledger.list_for_creator(creator_id, 10, 0).await.unwrap().is_empty());
        // Point reads still work; the row is never hard-deleted.
        assert!(ledger.get(payout.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn deduct_refuses_to_overdraw() {
        let store = InMemoryCreatorStore::new();
        let creator_id = Uuid::new_v4();
        store.insert_profile(creator_id, "Ada", Some("NG")).await;
        store.set_balance(creator_id, dec!(10.00), "USD").await;

        let err = store.deduct_balance(creator_id, dec!(50.00)).await.unwrap_err();
        assert!(matches!(err, StoreError::InsufficientBalance));

        let balance = store.deduct_balance(creator_id, dec!(10.00)).await.unwrap();
        assert_eq!(balance.amount, Decimal::ZERO);
    }
}
