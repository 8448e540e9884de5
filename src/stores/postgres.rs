//! Postgres-backed store implementations.
//!
//! Every ledger mutation runs inside a database transaction with the payout
//! row locked `FOR UPDATE`, so concurrent webhook deliveries serialize on
//! the row and the append-only history can never interleave.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::FromRow;
use uuid::Uuid;

use crate::db::DbPool;
use crate::models::bank_account::BankAccount;
use crate::models::creator::{CreatorBalance, CreatorProfile};
use crate::models::payout::{
    ErrorCode, NewPayout, Payout, PayoutStatus, StatusHistoryEntry,
};

use super::{
    CreatorStore, LedgerError, PayoutLedger, StoreError, TransitionError, TransitionOutcome,
    transition_in_place,
};

pub struct PgPayoutLedger {
    pool: DbPool,
}

impl PgPayoutLedger {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

/// Raw `payouts` row; `status` and `status_history` are decoded into their
/// typed forms in `TryFrom`.
#[derive(Debug, FromRow)]
struct PayoutRow {
    id: Uuid,
    creator_id: Uuid,
    client_reference: String,
    amount: Decimal,
    currency: String,
    source_amount: Decimal,
    source_currency: String,
    exchange_rate: Decimal,
    destination_ref: String,
    provider_transfer_id: Option<String>,
    provider_fee: Decimal,
    platform_fee: Decimal,
    status: String,
    status_history: serde_json::Value,
    has_active_issue: bool,
    error_code: Option<String>,
    error_message: Option<String>,
    created_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
    failed_at: Option<DateTime<Utc>>,
    deleted_at: Option<DateTime<Utc>>,
}

impl TryFrom<PayoutRow> for Payout {
    type Error = LedgerError;

    fn try_from(row: PayoutRow) -> Result<Self, LedgerError> {
        let status = PayoutStatus::parse(&row.status)
            .ok_or_else(|| LedgerError::CorruptHistory(format!("unknown status {}", row.status)))?;
        let status_history: Vec<StatusHistoryEntry> =
            serde_json::from_value(row.status_history)
                .map_err(|e| LedgerError::CorruptHistory(e.to_string()))?;
        Ok(Payout {
            id: row.id,
            creator_id: row.creator_id,
            client_reference: row.client_reference,
            amount: row.amount,
            currency: row.currency,
            source_amount: row.source_amount,
            source_currency: row.source_currency,
            exchange_rate: row.exchange_rate,
            destination_ref: row.destination_ref,
            provider_transfer_id: row.provider_transfer_id,
            provider_fee: row.provider_fee,
            platform_fee: row.platform_fee,
            status,
            status_history,
            has_active_issue: row.has_active_issue,
            error_code: row.error_code.as_deref().and_then(ErrorCode::parse),
            error_message: row.error_message,
            created_at: row.created_at,
            completed_at: row.completed_at,
            failed_at: row.failed_at,
            deleted_at: row.deleted_at,
        })
    }
}

fn history_json(history: &[StatusHistoryEntry]) -> Result<serde_json::Value, LedgerError> {
    serde_json::to_value(history).map_err(|e| LedgerError::CorruptHistory(e.to_string()))
}

/// Persist the mutable fields `transition_in_place` may have touched.
async fn write_back(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    payout: &Payout,
) -> Result<(), LedgerError> {
    sqlx::query(
        r#"
        UPDATE payouts
        SET status = $1,
            status_history = $2,
            completed_at = $3,
            failed_at = $4,
            error_code = $5,
            error_message = $6
        WHERE id = $7
        "#,
    )
    .bind(payout.status.as_str())
    .bind(history_json(&payout.status_history)?)
    .bind(payout.completed_at)
    .bind(payout.failed_at)
    .bind(payout.error_code.map(|c| c.as_str()))
    .bind(&payout.error_message)
    .bind(payout.id)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn fetch_for_update(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    id: Uuid,
) -> Result<Payout, LedgerError> {
    let row = sqlx::query_as::<_, PayoutRow>("SELECT * FROM payouts WHERE id = $1 FOR UPDATE")
        .bind(id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or(LedgerError::NotFound)?;
    row.try_into()
}

#[async_trait]
impl PayoutLedger for PgPayoutLedger {
    async fn create(&self, new: NewPayout) -> Result<Payout, LedgerError> {
        let now = Utc::now();
        let history = vec![StatusHistoryEntry {
            status: PayoutStatus::Pending,
            from_status: None,
            timestamp: now,
            error_message: None,
        }];

        let row = sqlx::query_as::<_, PayoutRow>(
            r#"
            INSERT INTO payouts (
                creator_id,
                client_reference,
                amount,
                currency,
                source_amount,
                source_currency,
                exchange_rate,
                destination_ref,
                platform_fee,
                status,
                status_history,
                created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, 'pending', $10, $11)
            RETURNING *
            "#,
        )
        .bind(new.creator_id)
        .bind(&new.client_reference)
        .bind(new.amount)
        .bind(&new.currency)
        .bind(new.source_amount)
        .bind(&new.source_currency)
        .bind(new.exchange_rate)
        .bind(&new.destination_ref)
        .bind(new.platform_fee)
        .bind(history_json(&history)?)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        row.try_into()
    }

    async fn get(&self, id: Uuid) -> Result<Option<Payout>, LedgerError> {
        let row = sqlx::query_as::<_, PayoutRow>("SELECT * FROM payouts WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Payout::try_from).transpose()
    }

    async fn get_by_provider_transfer_id(
        &self,
        provider_transfer_id: &str,
    ) -> Result<Option<Payout>, LedgerError> {
        let row = sqlx::query_as::<_, PayoutRow>(
            "SELECT * FROM payouts WHERE provider_transfer_id = $1 AND deleted_at IS NULL",
        )
        .bind(provider_transfer_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Payout::try_from).transpose()
    }

    async fn get_by_client_reference(
        &self,
        client_reference: &str,
    ) -> Result<Option<Payout>, LedgerError> {
        let row = sqlx::query_as::<_, PayoutRow>(
            r#"
            SELECT * FROM payouts
            WHERE client_reference = $1 AND deleted_at IS NULL
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(client_reference)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Payout::try_from).transpose()
    }

    async fn list_for_creator(
        &self,
        creator_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Payout>, LedgerError> {
        let rows = sqlx::query_as::<_, PayoutRow>(
            r#"
            SELECT * FROM payouts
            WHERE creator_id = $1 AND deleted_at IS NULL
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(creator_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Payout::try_from).collect()
    }

    async fn list_stale_processing(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Payout>, LedgerError> {
        let rows = sqlx::query_as::<_, PayoutRow>(
            r#"
            SELECT * FROM payouts
            WHERE status = 'processing' AND deleted_at IS NULL AND created_at < $1
            ORDER BY created_at
            "#,
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Payout::try_from).collect()
    }

    async fn mark_processing(
        &self,
        id: Uuid,
        provider_transfer_id: &str,
        provider_fee: Decimal,
    ) -> Result<Payout, LedgerError> {
        let mut tx = self.pool.begin().await?;

        let duplicate: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM payouts
                WHERE provider_transfer_id = $1 AND id != $2 AND deleted_at IS NULL
            )
            "#,
        )
        .bind(provider_transfer_id)
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;
        if duplicate {
            tx.rollback().await?;
            return Err(LedgerError::DuplicateProviderTransferId(
                provider_transfer_id.to_string(),
            ));
        }

        let mut payout = fetch_for_update(&mut tx, id).await?;
        payout.provider_transfer_id = Some(provider_transfer_id.to_string());
        payout.provider_fee = provider_fee;
        transition_in_place(&mut payout, PayoutStatus::Processing, None, Utc::now())?;

        sqlx::query("UPDATE payouts SET provider_transfer_id = $1, provider_fee = $2 WHERE id = $3")
            .bind(provider_transfer_id)
            .bind(provider_fee)
            .bind(id)
            .execute(&mut *tx)
            .await?;
        write_back(&mut tx, &payout).await?;

        tx.commit().await?;
        Ok(payout)
    }

    async fn apply_transition(
        &self,
        id: Uuid,
        target: PayoutStatus,
        error: Option<TransitionError>,
    ) -> Result<TransitionOutcome, LedgerError> {
        let mut tx = self.pool.begin().await?;

        let mut payout = fetch_for_update(&mut tx, id).await?;
        let applied = transition_in_place(&mut payout, target, error.as_ref(), Utc::now())?;
        if applied {
            write_back(&mut tx, &payout).await?;
        }
        tx.commit().await?;

        Ok(TransitionOutcome { payout, applied })
    }

    async fn flag_active_issue(&self, id: Uuid, note: &str) -> Result<(), LedgerError> {
        let updated = sqlx::query("UPDATE payouts SET has_active_issue = true WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?
            .rows_affected();
        if updated == 0 {
            return Err(LedgerError::NotFound);
        }
        tracing::warn!(payout_id = %id, note, "active case flagged on payout");
        Ok(())
    }

    async fn soft_delete(&self, id: Uuid) -> Result<(), LedgerError> {
        let updated = sqlx::query(
            "UPDATE payouts SET deleted_at = NOW() WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .execute(&self.pool)
        .await?
        .rows_affected();
        if updated == 0 {
            return Err(LedgerError::NotFound);
        }
        Ok(())
    }
}

pub struct PgCreatorStore {
    pool: DbPool,
}

impl PgCreatorStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CreatorStore for PgCreatorStore {
    async fn get_profile(&self, creator_id: Uuid) -> Result<Option<CreatorProfile>, StoreError> {
        let profile = sqlx::query_as::<_, CreatorProfile>(
            "SELECT * FROM creator_profiles WHERE creator_id = $1",
        )
        .bind(creator_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(profile)
    }

    async fn get_verified_bank_account(
        &self,
        creator_id: Uuid,
    ) -> Result<Option<BankAccount>, StoreError> {
        let account = sqlx::query_as::<_, BankAccount>(
            r#"
            SELECT * FROM creator_bank_accounts
            WHERE creator_id = $1 AND is_verified = true
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(creator_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(account)
    }

    async fn get_available_balance(
        &self,
        creator_id: Uuid,
    ) -> Result<Option<CreatorBalance>, StoreError> {
        let balance = sqlx::query_as::<_, CreatorBalance>(
            "SELECT * FROM creator_balances WHERE creator_id = $1",
        )
        .bind(creator_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(balance)
    }

    async fn deduct_balance(
        &self,
        creator_id: Uuid,
        amount: Decimal,
    ) -> Result<CreatorBalance, StoreError> {
        // Single guarded UPDATE: the WHERE clause refuses to overdraw, and
        // the CHECK constraint backstops it.
        let balance = sqlx::query_as::<_, CreatorBalance>(
            r#"
            UPDATE creator_balances
            SET amount = amount - $1,
                updated_at = NOW()
            WHERE creator_id = $2 AND amount >= $1
            RETURNING *
            "#,
        )
        .bind(amount)
        .bind(creator_id)
        .fetch_optional(&self.pool)
        .await?;

        match balance {
            Some(balance) => Ok(balance),
            None => {
                // Distinguish "no such creator" from "not enough money".
                let exists: bool = sqlx::query_scalar(
                    "SELECT EXISTS(SELECT 1 FROM creator_balances WHERE creator_id = $1)",
                )
                .bind(creator_id)
                .fetch_one(&self.pool)
                .await?;
                if exists {
                    Err(StoreError::InsufficientBalance)
                } else {
                    Err(StoreError::NotFound)
                }
            }
        }
    }
}
