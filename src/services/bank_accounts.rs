//! Bank Account Fetcher: the verified payout destination, decrypted.

use uuid::Uuid;

use crate::crypto::{CryptoError, FieldCipher};
use crate::models::bank_account::DecryptedBankAccount;
use crate::stores::{CreatorStore, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Stored ciphertext failed to decrypt. The account is unusable until
    /// the creator re-adds it.
    #[error(transparent)]
    Decrypt(#[from] CryptoError),
}

/// Fetch and decrypt the creator's most recently verified bank account.
///
/// `Ok(None)` is a normal outcome (creator has not added a bank account
/// yet); callers reject the payout with an actionable message rather than
/// treating it as a failure of this function.
pub async fn fetch_verified(
    creators: &dyn CreatorStore,
    cipher: &FieldCipher,
    creator_id: Uuid,
) -> Result<Option<DecryptedBankAccount>, FetchError> {
    let Some(account) = creators.get_verified_bank_account(creator_id).await? else {
        return Ok(None);
    };

    Ok(Some(DecryptedBankAccount {
        account_number: cipher.decrypt(&account.account_number_encrypted)?,
        routing_number: cipher.decrypt(&account.routing_number_encrypted)?,
        account_holder_name: account.account_holder_name,
        currency: account.currency,
        country: account.country,
    }))
}
