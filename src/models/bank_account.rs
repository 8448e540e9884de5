//! Bank account models: the encrypted row as stored, and the decrypted view
//! handed to the Transfer Initiator.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

/// A creator's payout destination as stored.
///
/// `account_number_encrypted` and `routing_number_encrypted` hold
/// field-level AES-256-GCM ciphertext (hex-encoded nonce || ciphertext).
/// Only verified accounts are ever used for payouts.
#[derive(Debug, Clone, FromRow)]
pub struct BankAccount {
    pub id: Uuid,
    pub creator_id: Uuid,
    pub account_number_encrypted: String,
    pub routing_number_encrypted: String,
    pub account_holder_name: String,
    pub currency: String,
    pub country: Option<String>,
    pub is_verified: bool,
    pub created_at: DateTime<Utc>,
}

/// Decrypted payout destination. Lives only in memory for the duration of a
/// transfer creation; never serialized into responses or logs.
#[derive(Debug, Clone)]
pub struct DecryptedBankAccount {
    pub account_number: String,
    pub routing_number: String,
    pub account_holder_name: String,
    pub currency: String,
    pub country: Option<String>,
}

impl DecryptedBankAccount {
    /// Masked reference recorded on the payout row, e.g. `"NGN ••••6789"`.
    pub fn masked_ref(&self) -> String {
        let digits: String = self
            .account_number
            .chars()
            .filter(|c| c.is_ascii_digit())
            .collect();
        let last4 = if digits.len() >= 4 {
            &digits[digits.len() - 4..]
        } else {
            digits.as_str()
        };
        format!("{} ••••{}", self.currency, last4)
    }
}

/// API-safe view of a bank account (no account numbers at all).
#[derive(Debug, Serialize)]
pub struct BankAccountSummary {
    pub id: Uuid,
    pub account_holder_name: String,
    pub currency: String,
    pub country: Option<String>,
    pub is_verified: bool,
    pub created_at: DateTime<Utc>,
}

impl From<BankAccount> for BankAccountSummary {
    fn from(account: BankAccount) -> Self {
        Self {
            id: account.id,
            account_holder_name: account.account_holder_name,
            currency: account.currency,
            country: account.country,
            is_verified: account.is_verified,
            created_at: account.created_at,
        }
    }
}
