// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Conversion of revealed owner keys into alloy signers.

use alloy::signers::local::PrivateKeySigner;

use super::client::ChainError;
use crate::custody::RawKey;

/// Create a signer from a hex private key (with or without `0x`).
pub fn signer_from_key(key: &RawKey) -> Result<PrivateKeySigner, ChainError> {
    let key_bytes = zeroize::Zeroizing::new(
        alloy::hex::decode(key.expose()).map_err(|e| ChainError::InvalidKey(e.to_string()))?,
    );

    PrivateKeySigner::from_slice(&key_bytes).map_err(|e| ChainError::InvalidKey(e.to_string()))
}
