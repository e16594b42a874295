// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Monerium proxy endpoints.

use std::sync::Arc;

use alloy::primitives::Address;
use axum::{extract::State, Json};
use serde_json::Value;

use crate::{
    auth::Auth,
    error::ApiError,
    providers::monerium::{MoneriumClient, SafeBalance},
    state::AppState,
};

fn client(state: &AppState) -> Result<Arc<MoneriumClient>, ApiError> {
    state
        .monerium
        .clone()
        .ok_or_else(|| ApiError::unavailable("Monerium integration is not configured"))
}

/// Tokens supported by Monerium.
#[utoipa::path(
    get,
    path = "/v1/monerium/tokens",
    tag = "Monerium",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Monerium token list"),
        (status = 401, description = "Unauthorized"),
        (status = 502, description = "Monerium request failed"),
        (status = 503, description = "Monerium not configured")
    )
)]
pub async fn tokens(Auth(_user): Auth, State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let client = client(&state)?;
    Ok(Json(client.tokens().await?))
}

/// EURe balance of the caller's Safe as seen by Monerium.
#[utoipa::path(
    get,
    path = "/v1/monerium/balance",
    tag = "Monerium",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Safe EURe balance", body = SafeBalance),
        (status = 401, description = "Unauthorized"),
        (status = 409, description = "Wallet not provisioned"),
        (status = 502, description = "Monerium request failed"),
        (status = 503, description = "Monerium not configured")
    )
)]
pub async fn safe_balance(
    Auth(user): Auth,
    State(state): State<AppState>,
) -> Result<Json<SafeBalance>, ApiError> {
    let client = client(&state)?;
    let account = state
        .ledger
        .get_account(&user.account_id)?
        .ok_or_else(|| ApiError::not_found("Account not found"))?;
    let wallet: Address = account
        .wallet_address
        .as_deref()
        .ok_or_else(|| ApiError::conflict("Wallet is not provisioned yet"))?
        .parse()
        .map_err(|_| ApiError::internal("Stored wallet address is invalid"))?;

    Ok(Json(client.safe_balance(wallet).await?))
}
