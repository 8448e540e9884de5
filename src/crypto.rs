//! Field-level encryption for bank account details.
//!
//! Account and routing numbers are stored as AES-256-GCM ciphertext,
//! hex-encoded as `nonce || ciphertext` (12-byte nonce, tag appended by
//! GCM). The payout core only ever decrypts; encryption is exposed for
//! provisioning tooling and tests.

use aes_gcm::{
    Aes256Gcm, Nonce,
    aead::{Aead, KeyInit},
};

const NONCE_LEN: usize = 12;

#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    /// Key is not 32 bytes of hex.
    #[error("invalid encryption key: {0}")]
    InvalidKey(String),

    /// Ciphertext is malformed or fails authentication.
    #[error("unable to decrypt field")]
    DecryptFailed,
}

/// Decrypts (and, for tooling, encrypts) individual stored fields.
#[derive(Clone)]
pub struct FieldCipher {
    cipher: Aes256Gcm,
}

impl FieldCipher {
    /// Build from a 64-hex-character (32-byte) key.
    pub fn from_hex_key(hex_key: &str) -> Result<Self, CryptoError> {
        let key_bytes =
            hex::decode(hex_key).map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
        let cipher = Aes256Gcm::new_from_slice(&key_bytes)
            .map_err(|_| CryptoError::InvalidKey("key must be 32 bytes".to_string()))?;
        Ok(Self { cipher })
    }

    /// Decrypt a hex-encoded `nonce || ciphertext` field.
    pub fn decrypt(&self, field: &str) -> Result<String, CryptoError> {
        let raw = hex::decode(field).map_err(|_| CryptoError::DecryptFailed)?;
        if raw.len() <= NONCE_LEN {
            return Err(CryptoError::DecryptFailed);
        }
        let (nonce, ciphertext) = raw.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| CryptoError::DecryptFailed)?;
        String::from_utf8(plaintext).map_err(|_| CryptoError::DecryptFailed)
    }

    /// Encrypt a field with a random nonce. Hex output matches what
    /// `decrypt` expects.
    pub fn encrypt(&self, plaintext: &str) -> Result<String, CryptoError> {
        let nonce_bytes: [u8; NONCE_LEN] = rand::random();
        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), plaintext.as_bytes())
            .map_err(|_| CryptoError::DecryptFailed)?;
        let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&ciphertext);
        Ok(hex::encode(out))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_cipher() -> FieldCipher {
        FieldCipher::from_hex_key(&"ab".repeat(32)).unwrap()
    }

    #[test]
    fn round_trip() {
        let cipher = test_cipher();
        let encrypted = cipher.encrypt("0123456789").unwrap();
        assert_ne!(encrypted, "0123456789");
        assert_eq!(cipher.decrypt(&encrypted).unwrap(), "0123456789");
    }

    #[test]
    fn nonces_vary_between_encryptions() {
        let cipher = test_cipher();
        let a = cipher.encrypt("same plaintext").unwrap();
        let b = cipher.encrypt("same plaintext").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn tampered_ciphertext_fails_auth() {
        let cipher = test_cipher();
        let mut encrypted = cipher.encrypt("0123456789").unwrap();
        // Flip the final hex digit.
        let last = encrypted.pop().unwrap();
        encrypted.push(if last == '0' { '1' } else { '0' });
        assert!(matches!(cipher.decrypt(&encrypted), Err(CryptoError::DecryptFailed)));
    }

    #[test]
    fn wrong_key_fails_auth() {
        let encrypted = test_cipher().encrypt("0123456789").unwrap();
        let other = FieldCipher::from_hex_key(&"cd".repeat(32)).unwrap();
        assert!(other.decrypt(&encrypted).is_err());
    }

    #[test]
    fn rejects_short_keys() {
        assert!(FieldCipher::from_hex_key("abcd").is_err());
        assert!(FieldCipher::from_hex_key("not hex").is_err());
    }
}
