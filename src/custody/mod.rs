// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Key Custody Vault
//!
//! Protects per-user owner keys at rest with AES-256-GCM under a single
//! process-wide secret (`ENCRYPTION_KEY`).
//!
//! ## Stored Format
//!
//! ```text
//! <nonce hex>:<ciphertext+tag hex>
//! ```
//!
//! A fresh 96-bit nonce is drawn from the system RNG on every call to
//! [`KeyVault::protect`], so protecting the same key twice never yields the
//! same custody string. The GCM tag makes a changed secret or a tampered
//! record fail loudly in [`KeyVault::reveal`] instead of decrypting to junk.

pub mod keys;

use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM, NONCE_LEN};
use ring::rand::{SecureRandom, SystemRandom};
use serde::{Deserialize, Serialize};

pub use keys::{generate_owner_key, RawKey};

/// Length of the vault secret in bytes.
pub const SECRET_LEN: usize = 32;

/// Encrypted owner key as persisted on the user account (`iv:ciphertext`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CustodyRecord(String);

impl CustodyRecord {
    pub fn new(stored: impl Into<String>) -> Self {
        Self(stored.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Errors from protecting or revealing key material.
#[derive(Debug, thiserror::Error)]
pub enum CustodyError {
    #[error("Invalid vault secret: {0}")]
    InvalidSecret(String),

    #[error("Malformed custody record: {0}")]
    Malformed(String),

    #[error("Custody record could not be decrypted (secret changed or record tampered)")]
    DecryptionFailed,

    #[error("Encryption failed")]
    EncryptionFailed,

    #[error("System RNG unavailable")]
    Rng,
}

/// Symmetric vault for owner keys.
pub struct KeyVault {
    key: LessSafeKey,
    rng: SystemRandom,
}

impl KeyVault {
    /// Create a vault from a 32-byte secret.
    pub fn new(secret: &[u8]) -> Result<Self, CustodyError> {
        if secret.len() != SECRET_LEN {
            return Err(CustodyError::InvalidSecret(format!(
                "expected {SECRET_LEN} bytes, got {}",
                secret.len()
            )));
        }
        let unbound = UnboundKey::new(&AES_256_GCM, secret)
            .map_err(|_| CustodyError::InvalidSecret("rejected by AES-256-GCM".to_string()))?;

        Ok(Self {
            key: LessSafeKey::new(unbound),
            rng: SystemRandom::new(),
        })
    }

    /// Create a vault from the `ENCRYPTION_KEY` setting.
    ///
    /// Accepts 64 hex characters (optionally `0x`-prefixed) or a raw
    /// 32-character string.
    pub fn from_config_secret(value: &str) -> Result<Self, CustodyError> {
        let trimmed = value.trim();
        let stripped = trimmed.strip_prefix("0x").unwrap_or(trimmed);
        if stripped.len() == SECRET_LEN * 2 && stripped.chars().all(|c| c.is_ascii_hexdigit()) {
            let bytes = alloy::hex::decode(stripped)
                .map_err(|e| CustodyError::InvalidSecret(e.to_string()))?;
            return Self::new(&bytes);
        }
        Self::new(trimmed.as_bytes())
    }

    /// Encrypt an owner key under a fresh nonce.
    pub fn protect(&self, raw: &RawKey) -> Result<CustodyRecord, CustodyError> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        self.rng.fill(&mut nonce_bytes).map_err(|_| CustodyError::Rng)?;

        let mut in_out = zeroize::Zeroizing::new(raw.expose().as_bytes().to_vec());
        self.key
            .seal_in_place_append_tag(
                Nonce::assume_unique_for_key(nonce_bytes),
                Aad::empty(),
                &mut *in_out,
            )
            .map_err(|_| CustodyError::EncryptionFailed)?;

        Ok(CustodyRecord(format!(
            "{}:{}",
            alloy::hex::encode(nonce_bytes),
            alloy::hex::encode(in_out.as_slice())
        )))
    }

    /// Decrypt a custody record back into the owner key.
    pub fn reveal(&self, record: &CustodyRecord) -> Result<RawKey, CustodyError> {
        let (nonce_hex, cipher_hex) = record
            .as_str()
            .split_once(':')
            .ok_or_else(|| CustodyError::Malformed("missing `:` separator".to_string()))?;

        let nonce_vec = alloy::hex::decode(nonce_hex)
            .map_err(|e| CustodyError::Malformed(format!("nonce: {e}")))?;
        let nonce_bytes: [u8; NONCE_LEN] = nonce_vec.as_slice().try_into().map_err(|_| {
            CustodyError::Malformed(format!(
                "nonce must be {NONCE_LEN} bytes, got {}",
                nonce_vec.len()
            ))
        })?;

        let mut buffer = zeroize::Zeroizing::new(
            alloy::hex::decode(cipher_hex)
                .map_err(|e| CustodyError::Malformed(format!("ciphertext: {e}")))?,
        );

        let plaintext = self
            .key
            .open_in_place(
                Nonce::assume_unique_for_key(nonce_bytes),
                Aad::empty(),
                buffer.as_mut_slice(),
            )
            .map_err(|_| CustodyError::DecryptionFailed)?;

        let key = std::str::from_utf8(plaintext)
            .map_err(|_| CustodyError::Malformed("plaintext is not UTF-8".to_string()))?;

        Ok(RawKey::new(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vault() -> KeyVault {
        KeyVault::new(&[7u8; SECRET_LEN]).unwrap()
    }

    #[test]
    fn reveal_returns_protected_key() {
        let vault = vault();
        let (key, _) = generate_owner_key();

        let record = vault.protect(&key).unwrap();
        let revealed = vault.reveal(&record).unwrap();

        assert_eq!(revealed.expose(), key.expose());
    }

    #[test]
    fn protect_uses_fresh_nonce_each_call() {
        let vault = vault();
        let key = RawKey::new("0x4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318");

        let first = vault.protect(&key).unwrap();
        let second = vault.protect(&key).unwrap();

        assert_ne!(first, second);
        let (first_nonce, _) = first.as_str().split_once(':').unwrap();
        let (second_nonce, _) = second.as_str().split_once(':').unwrap();
        assert_ne!(first_nonce, second_nonce);
    }

    #[test]
    fn record_does_not_contain_plaintext() {
        let vault = vault();
        let (key, _) = generate_owner_key();
        let record = vault.protect(&key).unwrap();
        assert!(!record.as_str().contains(&key.expose()[2..]));
    }

    #[test]
    fn reveal_with_changed_secret_fails() {
        let (key, _) = generate_owner_key();
        let record = vault().protect(&key).unwrap();

        let other = KeyVault::new(&[8u8; SECRET_LEN]).unwrap();
        assert!(matches!(
            other.reveal(&record),
            Err(CustodyError::DecryptionFailed)
        ));
    }

    #[test]
    fn reveal_rejects_malformed_records() {
        let vault = vault();
        for stored in ["", "deadbeef", "zz:00", "00:zz", "0011:aabb"] {
            assert!(
                vault.reveal(&CustodyRecord::new(stored)).is_err(),
                "expected failure for {stored:?}"
            );
        }
    }

    #[test]
    fn reveal_detects_tampering() {
        let vault = vault();
        let (key, _) = generate_owner_key();
        let record = vault.protect(&key).unwrap();

        let (nonce, cipher) = record.as_str().split_once(':').unwrap();
        let mut bytes = alloy::hex::decode(cipher).unwrap();
        bytes[0] ^= 0x01;
        let tampered = CustodyRecord::new(format!("{nonce}:{}", alloy::hex::encode(bytes)));

        assert!(matches!(
            vault.reveal(&tampered),
            Err(CustodyError::DecryptionFailed)
        ));
    }

    #[test]
    fn config_secret_accepts_hex_and_raw() {
        let hex_secret = "0x".to_string() + &"ab".repeat(SECRET_LEN);
        assert!(KeyVault::from_config_secret(&hex_secret).is_ok());
        assert!(KeyVault::from_config_secret("0123456789abcdef0123456789abcdeX").is_ok());
        assert!(KeyVault::from_config_secret("too-short").is_err());
    }
}
