//! Field-level encryption at rest.
//!
//! Ciphertext is `"enc:" + base64(nonce || ciphertext+tag)` with AES-256-GCM
//! and a fresh 12-byte nonce per value. Rows written before a key was
//! configured carry no prefix and read back as-is.

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use thiserror::Error;

const ENC_PREFIX: &str = "enc:";
const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("encryption key must be 64 hex chars (32 bytes)")]
    InvalidKey,

    #[error("encryption failed")]
    Encrypt,

    #[error("decryption failed: {0}")]
    Decrypt(String),
}

/// Encrypts and decrypts stored text fields. Without a key it is a no-op.
#[derive(Clone)]
pub struct FieldCipher {
    cipher: Option<Aes256Gcm>,
}

impl std::fmt::Debug for FieldCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldCipher")
            .field("enabled", &self.cipher.is_some())
            .finish()
    }
}

impl FieldCipher {
    /// Build from a hex key. An empty key disables encryption.
    pub fn from_hex(key_hex: &str) -> Result<Self, CryptoError> {
        let key_hex = key_hex.trim();
        if key_hex.is_empty() {
            return Ok(Self::plaintext());
        }
        let key = hex::decode(key_hex).map_err(|_| CryptoError::InvalidKey)?;
        let cipher = Aes256Gcm::new_from_slice(&key).map_err(|_| CryptoError::InvalidKey)?;
        Ok(Self {
            cipher: Some(cipher),
        })
    }

    pub fn plaintext() -> Self {
        Self { cipher: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.cipher.is_some()
    }

    pub fn encrypt(&self, plaintext: &str) -> Result<String, CryptoError> {
        let Some(cipher) = &self.cipher else {
            return Ok(plaintext.to_string());
        };

        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|_| CryptoError::Encrypt)?;

        let mut packed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        packed.extend_from_slice(&nonce);
        packed.extend_from_slice(&ciphertext);
        Ok(format!("{}{}", ENC_PREFIX, STANDARD.encode(packed)))
    }

    /// Decrypt a stored value. Unprefixed values are returned unchanged.
    pub fn decrypt(&self, stored: &str) -> Result<String, CryptoError> {
        let Some(encoded) = stored.strip_prefix(ENC_PREFIX) else {
            return Ok(stored.to_string());
        };
        let Some(cipher) = &self.cipher else {
            return Err(CryptoError::Decrypt("value is encrypted but no key is configured".into()));
        };

        let packed = STANDARD
            .decode(encoded)
            .map_err(|e| CryptoError::Decrypt(format!("base64: {e}")))?;
        if packed.len() < NONCE_LEN + TAG_LEN {
            return Err(CryptoError::Decrypt("ciphertext too short".into()));
        }

        let (nonce_bytes, ciphertext) = packed.split_at(NONCE_LEN);
        let plaintext = cipher
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .map_err(|_| CryptoError::Decrypt("wrong key or corrupted data".into()))?;

        String::from_utf8(plaintext).map_err(|e| CryptoError::Decrypt(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f";

    #[test]
    fn test_encrypt_decrypt() {
        let cipher = FieldCipher::from_hex(KEY).unwrap();
        let stored = cipher.encrypt("User lives in Bali").unwrap();

        assert!(stored.starts_with("enc:"));
        assert!(!stored.contains("Bali"));
        assert_eq!(cipher.decrypt(&stored).unwrap(), "User lives in Bali");
    }

    #[test]
    fn test_nonce_is_fresh_per_value() {
        let cipher = FieldCipher::from_hex(KEY).unwrap();
        assert_ne!(cipher.encrypt("same").unwrap(), cipher.encrypt("same").unwrap());
    }

    #[test]
    fn test_plaintext_passthrough() {
        let cipher = FieldCipher::from_hex(KEY).unwrap();
        assert_eq!(cipher.decrypt("legacy row").unwrap(), "legacy row");

        let off = FieldCipher::from_hex("").unwrap();
        assert!(!off.is_enabled());
        assert_eq!(off.encrypt("hello").unwrap(), "hello");
    }

    #[test]
    fn test_invalid_key() {
        assert!(matches!(FieldCipher::from_hex("zz"), Err(CryptoError::InvalidKey)));
        assert!(matches!(FieldCipher::from_hex("00ff"), Err(CryptoError::InvalidKey)));
    }

    #[test]
    fn test_wrong_key_fails() {
        let stored = FieldCipher::from_hex(KEY).unwrap().encrypt("secret").unwrap();
        let other = FieldCipher::from_hex(&"ab".repeat(32)).unwrap();
        assert!(matches!(other.decrypt(&stored), Err(CryptoError::Decrypt(_))));
    }

    #[test]
    fn test_truncated_ciphertext() {
        let cipher = FieldCipher::from_hex(KEY).unwrap();
        let short = format!("enc:{}", STANDARD.encode([0u8; 10]));
        assert!(matches!(cipher.decrypt(&short), Err(CryptoError::Decrypt(_))));
    }

    #[test]
    fn test_encrypted_value_without_key() {
        let stored = FieldCipher::from_hex(KEY).unwrap().encrypt("x").unwrap();
        assert!(FieldCipher::plaintext().decrypt(&stored).is_err());
    }
}
