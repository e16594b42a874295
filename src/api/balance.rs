// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Wallet balance endpoint.

use axum::{extract::State, Json};

use crate::{auth::Auth, error::ApiError, funds::WalletBalance, state::AppState};

/// Get the settlement-token balance of the caller's Safe.
#[utoipa::path(
    get,
    path = "/v1/wallet/balance",
    tag = "Funds",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Wallet balance", body = WalletBalance),
        (status = 401, description = "Unauthorized"),
        (status = 409, description = "Wallet not provisioned"),
        (status = 503, description = "Chain unavailable")
    )
)]
pub async fn wallet_balance(
    Auth(user): Auth,
    State(state): State<AppState>,
) -> Result<Json<WalletBalance>, ApiError> {
    Ok(Json(state.funds.wallet_balance(&user).await?))
}
