//! Operator API key model for management-API authentication.

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

/// An operator API key as stored.
///
/// Only the SHA-256 hash of the key is persisted; the plaintext is shown
/// once at provisioning time and never stored.
#[derive(Debug, Clone, FromRow)]
pub struct ApiKey {
    pub id: Uuid,
    pub key_hash: String,
    pub label: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}
