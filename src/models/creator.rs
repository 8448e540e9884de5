//! Creator profile and balance rows consumed by the payout core.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

/// Creator profile as stored. Only `country_code` matters to the
/// Country/Currency Resolver; it is nullable because many historical
/// profiles never captured it.
#[derive(Debug, Clone, FromRow)]
pub struct CreatorProfile {
    pub creator_id: Uuid,
    pub display_name: String,
    pub country_code: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A creator's available platform balance.
///
/// The balance is the source of every payout; the database CHECK constraint
/// keeps it non-negative and `deduct_balance` refuses to overdraw.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct CreatorBalance {
    pub creator_id: Uuid,
    pub amount: Decimal,
    pub currency: String,
    pub updated_at: DateTime<Utc>,
}
