// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Owner key material and secp256k1 key generation.

use std::fmt;

use alloy::primitives::{keccak256, Address};
use zeroize::Zeroizing;

/// Raw owner private key, hex-encoded with a `0x` prefix.
///
/// The buffer is wiped on drop and `Debug` never prints the key. Callers
/// should hold a `RawKey` only for the span of a single signing operation.
pub struct RawKey(Zeroizing<String>);

impl RawKey {
    pub fn new(hex_key: impl Into<String>) -> Self {
        Self(Zeroizing::new(hex_key.into()))
    }

    /// Borrow the hex key for signing.
    pub fn expose(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Debug for RawKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RawKey(<redacted>)")
    }
}

/// Generate a secp256k1 owner key and derive its Ethereum address.
///
/// The address is the last 20 bytes of keccak256 over the uncompressed
/// public key coordinates (the `0x04` prefix is skipped).
pub fn generate_owner_key() -> (RawKey, Address) {
    use k256::ecdsa::SigningKey;
    use k256::elliptic_curve::rand_core::OsRng;

    let signing_key = SigningKey::random(&mut OsRng);

    let raw = RawKey::new(format!("0x{}", alloy::hex::encode(signing_key.to_bytes())));

    let public_key = signing_key.verifying_key().to_encoded_point(false);
    let hash = keccak256(&public_key.as_bytes()[1..]);
    let address = Address::from_slice(&hash[12..]);

    (raw, address)
}
