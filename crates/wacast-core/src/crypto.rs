//! Webhook verify-token encryption
//!
//! The provider's verification GET carries an opaque token we minted when
//! the tenant registered their webhook. The plaintext pairs the business
//! account with its organization so the GET can be authenticated without a
//! session.

use crate::errors::{CoreError, CoreResult};
use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::{AeadCore, Aes256Gcm, Key, Nonce};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

const NONCE_LEN: usize = 12;

/// Plaintext of a webhook verify token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookVerifyToken {
    pub business_account_id: String,
    pub organization_id: Uuid,
}

/// AES-256-GCM service keyed from the configured encryption key string
#[derive(Clone)]
pub struct EncryptionService {
    cipher: Aes256Gcm,
}

impl EncryptionService {
    /// Derive a 256-bit key from the configured secret string
    pub fn new(encryption_key: &str) -> Self {
        let digest = Sha256::digest(encryption_key.as_bytes());
        let key = Key::<Aes256Gcm>::from_slice(&digest);
        Self {
            cipher: Aes256Gcm::new(key),
        }
    }

    /// Encrypt any serializable value into a URL-safe opaque token
    pub fn encrypt<T: Serialize>(&self, value: &T) -> CoreResult<String> {
        let plaintext = serde_json::to_vec(value)?;

        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext.as_slice())
            .map_err(|_| CoreError::internal("encryption failed"))?;

        let mut combined = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        combined.extend_from_slice(&nonce);
        combined.extend_from_slice(&ciphertext);

        Ok(URL_SAFE_NO_PAD.encode(combined))
    }

    /// Decrypt a token produced by [`EncryptionService::encrypt`]
    pub fn decrypt<T: DeserializeOwned>(&self, token: &str) -> CoreResult<T> {
        let combined = URL_SAFE_NO_PAD
            .decode(token)
            .map_err(|_| CoreError::validation("malformed token"))?;

        if combined.len() <= NONCE_LEN {
            return Err(CoreError::validation("malformed token"));
        }

        let (nonce, ciphertext) = combined.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| CoreError::validation("token decryption failed"))?;

        serde_json::from_slice(&plaintext).map_err(CoreError::from)
    }
}
