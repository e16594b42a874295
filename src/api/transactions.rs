// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Transaction history endpoint.

use axum::{
    extract::{Query, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::{
    auth::Auth,
    blockchain::format_amount,
    error::ApiError,
    ledger::{TransactionKind, TransactionRecord, TransactionStatus},
    state::AppState,
};

// =============================================================================
// Request/Response Types
// =============================================================================

/// Query parameters for history requests.
#[derive(Debug, Deserialize, IntoParams)]
pub struct HistoryQuery {
    /// Maximum number of records (default 50, max 500)
    pub limit: Option<usize>,
}

/// A ledger record as returned to clients.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TransactionResponse {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: TransactionKind,
    /// Amount in token units
    pub amount: String,
    pub currency: String,
    pub from_address: String,
    pub to_address: String,
    pub status: TransactionStatus,
    pub tx_hash: String,
    pub explorer_url: String,
    pub timestamp: DateTime<Utc>,
    pub description: String,
}

impl TransactionResponse {
    pub fn new(record: TransactionRecord, decimals: u8) -> Self {
        Self {
            amount: format_amount(record.amount.value(), decimals),
            id: record.id,
            kind: record.kind,
            currency: record.currency,
            from_address: record.from_address,
            to_address: record.to_address,
            status: record.status,
            tx_hash: record.tx_hash,
            explorer_url: record.explorer_url,
            timestamp: record.timestamp,
            description: record.description,
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TransactionListResponse {
    pub transactions: Vec<TransactionResponse>,
    pub total: usize,
}

// =============================================================================
// Handlers
// =============================================================================

/// List the caller's transactions, newest first.
#[utoipa::path(
    get,
    path = "/v1/transactions",
    tag = "Funds",
    security(("bearer_auth" = [])),
    params(HistoryQuery),
    responses(
        (status = 200, description = "Transaction history", body = TransactionListResponse),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Account not found")
    )
)]
pub async fn list_transactions(
    Auth(user): Auth,
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<TransactionListResponse>, ApiError> {
    let records = state.funds.history(&user, query.limit)?;
    let decimals = state.funds.decimals().await?;

    let transactions: Vec<_> = records
        .into_iter()
        .map(|record| TransactionResponse::new(record, decimals))
        .collect();

    Ok(Json(TransactionListResponse {
        total: transactions.len(),
        transactions,
    }))
}
