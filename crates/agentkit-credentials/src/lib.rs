//! Sealed credential bundles.
//!
//! Integration credentials (OAuth tokens, client secrets) are stored as an
//! opaque string: a JSON map encrypted with AES-256-GCM under a key derived
//! from the `ENCRYPTION_KEY` setting. The sealed form is
//! `base64url(nonce || ciphertext)`; the nonce is random per seal, so
//! sealing the same map twice produces different strings that both unseal
//! to the original.

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde_json::{Map, Value};
use thiserror::Error;

const NONCE_LEN: usize = 12;

/// Errors from sealing or unsealing credentials.
#[derive(Debug, Error)]
pub enum CredentialError {
  #[error("sealed credentials are not valid base64: {0}")]
  Encoding(#[from] base64::DecodeError),

  #[error("sealed credentials are malformed or the key is wrong")]
  Crypto,

  #[error("credential payload is not a JSON object: {0}")]
  Payload(#[from] serde_json::Error),
}

/// Seals and unseals credential maps with a process-wide symmetric key.
#[derive(Clone)]
pub struct CredentialSealer {
  cipher: Aes256Gcm,
}

impl CredentialSealer {
  /// Build a sealer from the configured key material.
  ///
  /// The raw key string is padded with zero bytes (or truncated) to exactly
  /// 32 bytes, matching how deployments have historically provisioned
  /// `ENCRYPTION_KEY`.
  pub fn new(key: &str) -> Self {
    let mut key_bytes = [0u8; 32];
    let raw = key.as_bytes();
    let len = raw.len().min(32);
    key_bytes[..len].copy_from_slice(&raw[..len]);

    Self {
      cipher: Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key_bytes)),
    }
  }

  /// Encrypt a credential map into an opaque string.
  pub fn seal(&self, credentials: &Map<String, Value>) -> Result<String, CredentialError> {
    let plaintext = serde_json::to_vec(&Value::Object(credentials.clone()))?;

    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
    let ciphertext = self
      .cipher
      .encrypt(&nonce, plaintext.as_slice())
      .map_err(|_| CredentialError::Crypto)?;

    let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    sealed.extend_from_slice(&nonce);
    sealed.extend_from_slice(&ciphertext);
    Ok(URL_SAFE_NO_PAD.encode(sealed))
  }

  /// Decrypt an opaque string back into the credential map.
  pub fn unseal(&self, sealed: &str) -> Result<Map<String, Value>, CredentialError> {
    let bytes = URL_SAFE_NO_PAD.decode(sealed)?;
    if bytes.len() < NONCE_LEN {
      return Err(CredentialError::Crypto);
    }

    let (nonce, ciphertext) = bytes.split_at(NONCE_LEN);
    let plaintext = self
      .cipher
      .decrypt(Nonce::from_slice(nonce), ciphertext)
      .map_err(|_| CredentialError::Crypto)?;

    match serde_json::from_slice(&plaintext)? {
      Value::Object(map) => Ok(map),
      other => Ok(Map::from_iter([("value".to_string(), other)])),
    }
  }
}
