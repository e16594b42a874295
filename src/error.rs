// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::error;
use utoipa::ToSchema;

use crate::auth::AuthError;
use crate::funds::FundsError;
use crate::ledger::LedgerError;
use crate::providers::monerium::MoneriumError;
use crate::provisioning::ProvisioningError;

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
    /// On-chain transaction the failure relates to
    pub tx_hash: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    tx_hash: Option<String>,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            tx_hash: None,
        }
    }

    pub fn with_tx_hash(mut self, tx_hash: impl Into<String>) -> Self {
        self.tx_hash = Some(tx_hash.into());
        self
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, message)
    }

    pub fn unprocessable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNPROCESSABLE_ENTITY, message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorBody {
            error: self.message,
            tx_hash: self.tx_hash,
        });
        (self.status, body).into_response()
    }
}

impl From<FundsError> for ApiError {
    fn from(e: FundsError) -> Self {
        match e {
            FundsError::Validation(msg) => Self::bad_request(msg),
            FundsError::AccountNotFound(_) => Self::not_found("Account not found"),
            FundsError::WalletNotProvisioned(_) => {
                Self::conflict("Wallet is not provisioned yet; complete provisioning first")
            }
            FundsError::RpcUnavailable(msg) => {
                Self::unavailable(format!("Blockchain temporarily unavailable: {msg}"))
            }
            FundsError::ReserveInsufficient { .. } => {
                Self::unavailable("Withdrawals are temporarily unavailable")
            }
            FundsError::ConfirmationTimeout { tx_hash } => Self::new(
                StatusCode::GATEWAY_TIMEOUT,
                "Transaction submitted but not yet confirmed; check its status before retrying",
            )
            .with_tx_hash(tx_hash),
            FundsError::OnChainRevert { tx_hash, reason } => {
                let err = Self::unprocessable(format!("Transaction failed: {reason}"));
                match tx_hash {
                    Some(hash) => err.with_tx_hash(hash),
                    None => err,
                }
            }
            FundsError::LedgerWriteFailed { tx_hash, .. } => {
                Self::internal("Transaction confirmed but could not be recorded; support has been alerted")
                    .with_tx_hash(tx_hash)
            }
            FundsError::Custody(msg) => {
                error!(error = %msg, "Custody failure");
                Self::internal("Wallet key unavailable")
            }
            FundsError::Ledger(e) => e.into(),
            FundsError::Internal(msg) => {
                error!(error = %msg, "Internal error");
                Self::internal("Internal server error")
            }
        }
    }
}

impl From<ProvisioningError> for ApiError {
    fn from(e: ProvisioningError) -> Self {
        match e {
            ProvisioningError::Validation(msg) => Self::bad_request(msg),
            ProvisioningError::EmailTaken(_) => {
                Self::conflict("A user with this email already exists")
            }
            ProvisioningError::AccountNotFound(_) => Self::not_found("Account not found"),
            ProvisioningError::DeploymentFailed { reason, tx_hash } => {
                let err = Self::unavailable(format!("Wallet deployment failed: {reason}"));
                match tx_hash {
                    Some(hash) => err.with_tx_hash(hash),
                    None => err,
                }
            }
            ProvisioningError::GasFundingFailed(msg) => Self::unavailable(msg),
            ProvisioningError::LedgerWriteFailed { tx_hash, .. } => {
                Self::internal("Wallet deployed but could not be recorded; support has been alerted")
                    .with_tx_hash(tx_hash)
            }
            ProvisioningError::Custody(e) => {
                error!(error = %e, "Custody failure during provisioning");
                Self::internal("Wallet key could not be secured")
            }
            ProvisioningError::Auth(msg) => {
                error!(error = %msg, "Password hashing failed");
                Self::internal("Internal server error")
            }
            ProvisioningError::Ledger(e) => e.into(),
        }
    }
}

impl From<LedgerError> for ApiError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::NotFound(_) => Self::not_found("Account not found"),
            LedgerError::EmailTaken(_) => Self::conflict("A user with this email already exists"),
            LedgerError::InsufficientSavings { .. } => Self::bad_request("Insufficient savings"),
            other => {
                error!(error = %other, "Ledger failure");
                Self::internal("Storage error")
            }
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(e: AuthError) -> Self {
        Self::new(e.status_code(), e.to_string())
    }
}

impl From<MoneriumError> for ApiError {
    fn from(e: MoneriumError) -> Self {
        error!(error = %e, "Monerium request failed");
        Self::new(StatusCode::BAD_GATEWAY, "Monerium request failed")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    #[test]
    fn constructors_set_status_and_message() {
        let nf = ApiError::not_found("missing");
        assert_eq!(nf.status, StatusCode::NOT_FOUND);
        assert_eq!(nf.message, "missing");

        let bad = ApiError::bad_request("bad");
        assert_eq!(bad.status, StatusCode::BAD_REQUEST);
        assert_eq!(bad.message, "bad");

        let unp = ApiError::unprocessable("oops");
        assert_eq!(unp.status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(unp.message, "oops");
    }

    #[tokio::test]
    async fn into_response_returns_json_body() {
        let response = ApiError::bad_request("bad data").into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body_bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = String::from_utf8(body_bytes.to_vec()).unwrap();
        assert_eq!(body, r#"{"error":"bad data"}"#);
    }

    #[tokio::test]
    async fn timeout_body_carries_tx_hash() {
        let err: ApiError = FundsError::ConfirmationTimeout {
            tx_hash: "0xabc".into(),
        }
        .into();
        assert_eq!(err.status, StatusCode::GATEWAY_TIMEOUT);

        let body_bytes = to_bytes(err.into_response().into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&body_bytes).unwrap();
        assert_eq!(body["tx_hash"], "0xabc");
    }

    #[test]
    fn funds_errors_map_to_statuses() {
        let cases: Vec<(FundsError, StatusCode)> = vec![
            (FundsError::Validation("x".into()), StatusCode::BAD_REQUEST),
            (FundsError::AccountNotFound("a".into()), StatusCode::NOT_FOUND),
            (FundsError::WalletNotProvisioned("a".into()), StatusCode::CONFLICT),
            (FundsError::RpcUnavailable("x".into()), StatusCode::SERVICE_UNAVAILABLE),
            (
                FundsError::ReserveInsufficient {
                    available: "1".into(),
                    requested: "2".into(),
                },
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                FundsError::OnChainRevert {
                    tx_hash: None,
                    reason: "x".into(),
                },
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (
                FundsError::LedgerWriteFailed {
                    tx_hash: "0x1".into(),
                    account_id: "a".into(),
                    source: LedgerError::Overflow,
                },
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (FundsError::Custody("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status, status);
        }
    }

    #[test]
    fn provisioning_errors_map_to_statuses() {
        assert_eq!(
            ApiError::from(ProvisioningError::EmailTaken("a@x.com".into())).status,
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError::from(ProvisioningError::Validation("x".into())).status,
            StatusCode::BAD_REQUEST
        );
        let ledger = ApiError::from(ProvisioningError::LedgerWriteFailed {
            tx_hash: "0xdep".into(),
            account_id: "a".into(),
            source: LedgerError::Overflow,
        });
        assert_eq!(ledger.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(ledger.tx_hash.as_deref(), Some("0xdep"));
    }
}
