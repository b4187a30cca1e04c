use aes_gcm::aead::{Aead, AeadCore, OsRng};
use aes_gcm::{Aes256Gcm, Key, KeyInit, Nonce};
use anyhow::{Context, Result, anyhow};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;

use crate::domain::value_objects::charges::BillingKey;

const NONCE_LEN: usize = 12;

/// AES-256-GCM cipher for the stored billing key. The ciphertext layout is
/// `base64(nonce || ciphertext+tag)`; the 32-byte master key arrives hex
/// encoded from the environment.
pub struct BillingKeyCipher {
    cipher: Aes256Gcm,
}

impl BillingKeyCipher {
    pub fn from_hex(master_key_hex: &str) -> Result<Self> {
        let key_bytes = hex::decode(master_key_hex.trim())
            .context("billing key master key is not valid hex")?;
        anyhow::ensure!(
            key_bytes.len() == 32,
            "billing key master key must be 32 bytes, got {}",
            key_bytes.len()
        );

        let key = Key::<Aes256Gcm>::from_slice(&key_bytes);
        Ok(Self {
            cipher: Aes256Gcm::new(key),
        })
    }

    /// Decrypts a stored billing key. Call sites hold the result only for
    /// the duration of the charge call; the plaintext never hits a log.
    pub fn decrypt(&self, ciphertext_b64: &str) -> Result<BillingKey> {
        let raw = BASE64
            .decode(ciphertext_b64.trim())
            .context("stored billing key is not valid base64")?;
        anyhow::ensure!(raw.len() > NONCE_LEN, "stored billing key is truncated");

        let (nonce, ciphertext) = raw.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| anyhow!("billing key decryption failed"))?;

        let raw_key = String::from_utf8(plaintext).context("decrypted billing key is not utf-8")?;
        Ok(BillingKey::new(raw_key))
    }

    /// Encrypts a billing key for storage. The account system owns the
    /// write path in production; this exists for tooling and tests.
    pub fn encrypt(&self, billing_key: &BillingKey) -> Result<String> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);

        let ciphertext = self
            .cipher
            .encrypt(&nonce, billing_key.expose().as_bytes())
            .map_err(|_| anyhow!("billing key encryption failed"))?;

        let mut payload = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        payload.extend_from_slice(nonce.as_slice());
        payload.extend_from_slice(&ciphertext);
        Ok(BASE64.encode(payload))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY_HEX: &str = "000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f";

    #[test]
    fn round_trip() {
        let cipher = BillingKeyCipher::from_hex(KEY_HEX).unwrap();
        let stored = cipher
            .encrypt(&BillingKey::new("bk_live_abc123".to_string()))
            .unwrap();

        let decrypted = cipher.decrypt(&stored).unwrap();
        assert_eq!(decrypted.expose(), "bk_live_abc123");
    }

    #[test]
    fn wrong_key_fails_to_decrypt() {
        let cipher = BillingKeyCipher::from_hex(KEY_HEX).unwrap();
        let stored = cipher
            .encrypt(&BillingKey::new("bk_live_abc123".to_string()))
            .unwrap();

        let other = BillingKeyCipher::from_hex(
            "ffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffff",
        )
        .unwrap();
        assert!(other.decrypt(&stored).is_err());
    }

    #[test]
    fn truncated_ciphertext_is_rejected() {
        let cipher = BillingKeyCipher::from_hex(KEY_HEX).unwrap();
        assert!(cipher.decrypt("AAAA").is_err());
    }

    #[test]
    fn short_master_key_is_rejected() {
        assert!(BillingKeyCipher::from_hex("0011").is_err());
    }
}
