// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Account endpoints: sign-up, login, logout, profile and provisioning resume.

use axum::{
    extract::State,
    http::{header::SET_COOKIE, HeaderMap, HeaderValue, StatusCode},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{
    auth::{verify_password, Auth, AuthError, SESSION_COOKIE},
    blockchain::format_amount,
    error::ApiError,
    ledger::{AccountPatch, UserAccount},
    provisioning::{ProvisioningReport, ProvisioningState, SignupRequest as SagaSignup},
    state::AppState,
};

/// Decimals assumed for display when the token cannot be queried.
const FALLBACK_DECIMALS: u8 = 18;

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct SignupRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct UpdateProfileRequest {
    pub name: String,
}

/// Public view of an account. Never includes key material.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AccountResponse {
    pub id: String,
    pub name: String,
    pub email: String,
    /// Owner EOA of the Safe
    pub owner_address: String,
    /// Safe address, absent until deployment confirmed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wallet_address: Option<String>,
    pub savings_balance: String,
    pub total_deposited: String,
    pub total_withdrawn: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub savings_start_date: Option<DateTime<Utc>>,
    pub provisioning_state: ProvisioningState,
    pub created_at: DateTime<Utc>,
}

impl AccountResponse {
    pub fn new(account: &UserAccount, decimals: u8) -> Self {
        Self {
            id: account.id.clone(),
            name: account.name.clone(),
            email: account.email.clone(),
            owner_address: account.owner_address.clone(),
            wallet_address: account.wallet_address.clone(),
            savings_balance: format_amount(account.savings_balance.value(), decimals),
            total_deposited: format_amount(account.total_deposited.value(), decimals),
            total_withdrawn: format_amount(account.total_withdrawn.value(), decimals),
            savings_start_date: account.savings_start_date,
            provisioning_state: ProvisioningState::of(account),
            created_at: account.created_at,
        }
    }
}

/// Result of a provisioning run.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ProvisioningResponse {
    pub account: AccountResponse,
    pub provisioning_state: ProvisioningState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deployment_tx: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gas_tx: Option<String>,
    /// Why provisioning did not complete
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Session token (sign-up only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct LoginResponse {
    pub token: String,
    pub expires_in: i64,
    pub account: AccountResponse,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct LogoutResponse {
    pub message: String,
}

async fn display_decimals(state: &AppState) -> u8 {
    match state.funds.decimals().await {
        Ok(decimals) => decimals,
        Err(e) => {
            tracing::warn!(error = %e, "Token decimals unavailable, assuming {FALLBACK_DECIMALS}");
            FALLBACK_DECIMALS
        }
    }
}

fn session_cookie(state: &AppState, token: &str, max_age: i64) -> Result<HeaderValue, ApiError> {
    let secure = if state.secure_cookies { "; Secure" } else { "" };
    HeaderValue::from_str(&format!(
        "{SESSION_COOKIE}={token}; HttpOnly; Path=/; Max-Age={max_age}; SameSite=Lax{secure}"
    ))
    .map_err(|_| ApiError::internal("Failed to build session cookie"))
}

fn provisioning_status(report: &ProvisioningReport, created: bool) -> StatusCode {
    match report.state {
        ProvisioningState::AccountCreatedDegraded => StatusCode::MULTI_STATUS,
        _ if created => StatusCode::CREATED,
        _ => StatusCode::OK,
    }
}

/// Register a user and provision their Safe.
///
/// Returns 201 when the wallet is linked and 207 when the account exists but
/// the Safe could not be deployed.
#[utoipa::path(
    post,
    path = "/v1/auth/signup",
    tag = "Auth",
    request_body = SignupRequest,
    responses(
        (status = 201, description = "Account and wallet created", body = ProvisioningResponse),
        (status = 207, description = "Account created, wallet deployment failed", body = ProvisioningResponse),
        (status = 400, description = "Invalid input"),
        (status = 409, description = "Email already registered")
    )
)]
pub async fn signup(
    State(state): State<AppState>,
    Json(request): Json<SignupRequest>,
) -> Result<(StatusCode, HeaderMap, Json<ProvisioningResponse>), ApiError> {
    let report = state
        .provisioning
        .signup(SagaSignup {
            name: request.name,
            email: request.email,
            password: request.password,
        })
        .await?;

    let token = state.sessions.issue(&report.account.id)?;
    let mut headers = HeaderMap::new();
    headers.insert(
        SET_COOKIE,
        session_cookie(&state, &token, state.sessions.ttl_secs())?,
    );

    let status = provisioning_status(&report, true);
    let decimals = display_decimals(&state).await;
    let response = ProvisioningResponse {
        account: AccountResponse::new(&report.account, decimals),
        provisioning_state: report.state,
        deployment_tx: report.deployment_tx,
        gas_tx: report.gas_tx,
        error: report.error,
        token: Some(token),
    };

    Ok((status, headers, Json(response)))
}

/// Exchange email and password for a session token.
#[utoipa::path(
    post,
    path = "/v1/auth/login",
    tag = "Auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Logged in", body = LoginResponse),
        (status = 401, description = "Invalid credentials")
    )
)]
pub async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> Result<(HeaderMap, Json<LoginResponse>), ApiError> {
    let email = request.email.trim().to_lowercase();
    let account = state
        .ledger
        .find_account_by_email(&email)?
        .filter(|account| verify_password(&request.password, &account.password_hash))
        .ok_or(AuthError::InvalidCredentials)?;

    let token = state.sessions.issue(&account.id)?;
    let mut headers = HeaderMap::new();
    headers.insert(
        SET_COOKIE,
        session_cookie(&state, &token, state.sessions.ttl_secs())?,
    );

    tracing::info!(account_id = %account.id, "User logged in");

    let decimals = display_decimals(&state).await;
    Ok((
        headers,
        Json(LoginResponse {
            token,
            expires_in: state.sessions.ttl_secs(),
            account: AccountResponse::new(&account, decimals),
        }),
    ))
}

/// Clear the session cookie.
#[utoipa::path(
    post,
    path = "/v1/auth/logout",
    tag = "Auth",
    responses((status = 200, description = "Logged out", body = LogoutResponse))
)]
pub async fn logout(
    State(state): State<AppState>,
) -> Result<(HeaderMap, Json<LogoutResponse>), ApiError> {
    let mut headers = HeaderMap::new();
    headers.insert(SET_COOKIE, session_cookie(&state, "", 0)?);
    Ok((
        headers,
        Json(LogoutResponse {
            message: "Logged out".to_string(),
        }),
    ))
}

/// Get the authenticated user's account.
#[utoipa::path(
    get,
    path = "/v1/users/me",
    tag = "Users",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Current account", body = AccountResponse),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Account not found")
    )
)]
pub async fn me(
    Auth(user): Auth,
    State(state): State<AppState>,
) -> Result<Json<AccountResponse>, ApiError> {
    let account = state
        .ledger
        .get_account(&user.account_id)?
        .ok_or(AuthError::UnknownAccount)?;
    let decimals = display_decimals(&state).await;
    Ok(Json(AccountResponse::new(&account, decimals)))
}

/// Update the display name.
#[utoipa::path(
    put,
    path = "/v1/users/me",
    tag = "Users",
    security(("bearer_auth" = [])),
    request_body = UpdateProfileRequest,
    responses(
        (status = 200, description = "Profile updated", body = AccountResponse),
        (status = 400, description = "Invalid name"),
        (status = 401, description = "Unauthorized")
    )
)]
pub async fn update_profile(
    Auth(user): Auth,
    State(state): State<AppState>,
    Json(request): Json<UpdateProfileRequest>,
) -> Result<Json<AccountResponse>, ApiError> {
    let name = request.name.trim();
    if name.is_empty() {
        return Err(ApiError::bad_request("Name is required."));
    }

    let account = state.ledger.patch_account(
        &user.account_id,
        &AccountPatch::new().name(name).touch(Utc::now()),
    )?;
    let decimals = display_decimals(&state).await;
    Ok(Json(AccountResponse::new(&account, decimals)))
}

/// Resume provisioning for the authenticated user.
///
/// Redeploys (or links) the Safe for a degraded account and retries gas
/// funding for a linked one. A fully provisioned account is returned as is.
#[utoipa::path(
    post,
    path = "/v1/users/me/provision",
    tag = "Users",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Provisioning state", body = ProvisioningResponse),
        (status = 207, description = "Wallet deployment still failing", body = ProvisioningResponse),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Account not found")
    )
)]
pub async fn provision(
    Auth(user): Auth,
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<ProvisioningResponse>), ApiError> {
    let report = state.provisioning.resume(&user.account_id).await?;

    let status = provisioning_status(&report, false);
    let decimals = display_decimals(&state).await;
    Ok((
        status,
        Json(ProvisioningResponse {
            account: AccountResponse::new(&report.account, decimals),
            provisioning_state: report.state,
            deployment_tx: report.deployment_tx,
            gas_tx: report.gas_tx,
            error: report.error,
            token: None,
        }),
    ))
}
