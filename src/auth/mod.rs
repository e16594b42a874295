// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Authentication Module
//!
//! Email/password accounts with server-issued session tokens.
//!
//! ## Auth Flow
//!
//! 1. `POST /v1/auth/login` verifies the PBKDF2 password hash
//! 2. The server issues an HS256 session token (24h), returned in the body
//!    and as an `HttpOnly` `token` cookie
//! 3. Authenticated handlers take the [`Auth`] extractor, which yields an
//!    explicit [`AuthenticatedUser`] passed on to the orchestrators

pub mod error;
pub mod extractor;
pub mod password;
pub mod session;

use serde::Serialize;
use utoipa::ToSchema;

pub use error::AuthError;
pub use extractor::{Auth, SESSION_COOKIE};
pub use password::{hash_password, verify_password, MIN_PASSWORD_LEN};
pub use session::SessionManager;

/// Principal attached to an authenticated request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct AuthenticatedUser {
    /// Ledger account id
    pub account_id: String,
    /// Session expiry (unix seconds)
    pub expires_at: i64,
}
