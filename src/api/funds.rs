// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Fund movement endpoints.
//!
//! Every movement runs under the caller's account lock, so two requests for
//! the same account are applied one after the other.

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{
    api::transactions::TransactionResponse,
    auth::Auth,
    error::ApiError,
    funds::MovementOutcome,
    state::AppState,
};

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct SendRequest {
    /// Recipient address (0x-prefixed)
    pub to: String,
    /// Amount in token units, e.g. "12.5"
    pub amount: String,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct AmountRequest {
    /// Amount in token units, e.g. "12.5"
    pub amount: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct MovementResponse {
    pub status: String,
    /// Savings balance after the movement
    pub balance: String,
    pub tx_hash: String,
    pub explorer_url: String,
    pub transaction: TransactionResponse,
}

impl From<MovementOutcome> for MovementResponse {
    fn from(outcome: MovementOutcome) -> Self {
        let balance = outcome.savings_balance();
        Self {
            status: "success".to_string(),
            balance,
            tx_hash: outcome.record.tx_hash.clone(),
            explorer_url: outcome.record.explorer_url.clone(),
            transaction: TransactionResponse::new(outcome.record, outcome.decimals),
        }
    }
}

/// Send settlement tokens from the caller's Safe to another address.
#[utoipa::path(
    post,
    path = "/v1/funds/send",
    tag = "Funds",
    security(("bearer_auth" = [])),
    request_body = SendRequest,
    responses(
        (status = 200, description = "Transfer confirmed", body = MovementResponse),
        (status = 400, description = "Invalid amount or address"),
        (status = 401, description = "Unauthorized"),
        (status = 409, description = "Wallet not provisioned"),
        (status = 422, description = "Transaction reverted"),
        (status = 503, description = "Chain unavailable"),
        (status = 504, description = "Confirmation timed out")
    )
)]
pub async fn send(
    Auth(user): Auth,
    State(state): State<AppState>,
    Json(request): Json<SendRequest>,
) -> Result<Json<MovementResponse>, ApiError> {
    let _guard = state.locks.lock(&user.account_id).await;
    let outcome = state.funds.send(&user, &request.to, &request.amount).await?;
    Ok(Json(outcome.into()))
}

/// Move settlement tokens from the caller's Safe into savings.
#[utoipa::path(
    post,
    path = "/v1/funds/invest",
    tag = "Funds",
    security(("bearer_auth" = [])),
    request_body = AmountRequest,
    responses(
        (status = 200, description = "Investment confirmed", body = MovementResponse),
        (status = 400, description = "Invalid amount or insufficient wallet balance"),
        (status = 401, description = "Unauthorized"),
        (status = 409, description = "Wallet not provisioned"),
        (status = 422, description = "Transaction reverted"),
        (status = 503, description = "Chain unavailable"),
        (status = 504, description = "Confirmation timed out")
    )
)]
pub async fn invest(
    Auth(user): Auth,
    State(state): State<AppState>,
    Json(request): Json<AmountRequest>,
) -> Result<Json<MovementResponse>, ApiError> {
    let _guard = state.locks.lock(&user.account_id).await;
    let outcome = state.funds.invest(&user, &request.amount).await?;
    Ok(Json(outcome.into()))
}

/// Withdraw savings back to the caller's Safe.
#[utoipa::path(
    post,
    path = "/v1/funds/withdraw",
    tag = "Funds",
    security(("bearer_auth" = [])),
    request_body = AmountRequest,
    responses(
        (status = 200, description = "Withdrawal confirmed", body = MovementResponse),
        (status = 400, description = "Invalid amount or insufficient savings"),
        (status = 401, description = "Unauthorized"),
        (status = 409, description = "Wallet not provisioned"),
        (status = 422, description = "Transaction reverted"),
        (status = 503, description = "Chain or reserve unavailable"),
        (status = 504, description = "Confirmation timed out")
    )
)]
pub async fn withdraw(
    Auth(user): Auth,
    State(state): State<AppState>,
    Json(request): Json<AmountRequest>,
) -> Result<Json<MovementResponse>, ApiError> {
    let _guard = state.locks.lock(&user.account_id).await;
    let outcome = state.funds.withdraw(&user, &request.amount).await?;
    Ok(Json(outcome.into()))
}
