// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! PBKDF2-HMAC-SHA256 password hashing.
//!
//! Stored format: `pbkdf2-sha256$<iterations>$<salt hex>$<hash hex>`.

use std::num::NonZeroU32;

use ring::{
    pbkdf2,
    rand::{SecureRandom, SystemRandom},
};

use super::AuthError;

const ALGORITHM_TAG: &str = "pbkdf2-sha256";
const ITERATIONS: u32 = 100_000;
const SALT_LEN: usize = 16;
const HASH_LEN: usize = 32;

/// Minimum accepted password length.
pub const MIN_PASSWORD_LEN: usize = 6;

/// Hash a password with a fresh random salt.
pub fn hash_password(password: &str) -> Result<String, AuthError> {
    let iterations = NonZeroU32::new(ITERATIONS)
        .ok_or_else(|| AuthError::InternalError("zero iterations".into()))?;

    let mut salt = [0u8; SALT_LEN];
    SystemRandom::new()
        .fill(&mut salt)
        .map_err(|_| AuthError::InternalError("system RNG unavailable".into()))?;

    let mut hash = [0u8; HASH_LEN];
    pbkdf2::derive(
        pbkdf2::PBKDF2_HMAC_SHA256,
        iterations,
        &salt,
        password.as_bytes(),
        &mut hash,
    );

    Ok(format!(
        "{ALGORITHM_TAG}${ITERATIONS}${}${}",
        alloy::hex::encode(salt),
        alloy::hex::encode(hash)
    ))
}

/// Check a password against a stored hash in constant time.
///
/// Malformed stored values never verify.
pub fn verify_password(password: &str, stored: &str) -> bool {
    let mut parts = stored.split('$');
    let (Some(tag), Some(iterations), Some(salt), Some(hash), None) = (
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
    ) else {
        return false;
    };
    if tag != ALGORITHM_TAG {
        return false;
    }

    let Some(iterations) = iterations.parse::<u32>().ok().and_then(NonZeroU32::new) else {
        return false;
    };
    let (Ok(salt), Ok(hash)) = (alloy::hex::decode(salt), alloy::hex::decode(hash)) else {
        return false;
    };

    pbkdf2::verify(
        pbkdf2::PBKDF2_HMAC_SHA256,
        iterations,
        &salt,
        password.as_bytes(),
        &hash,
    )
    .is_ok()
}
