// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    error::ErrorBody,
    funds::WalletBalance,
    ledger::{TransactionKind, TransactionStatus},
    providers::monerium::SafeBalance,
    provisioning::ProvisioningState,
    state::AppState,
};

pub mod balance;
pub mod funds;
pub mod health;
pub mod monerium;
pub mod transactions;
pub mod users;

pub fn router(state: AppState) -> Router {
    let v1_routes = Router::new()
        .route("/auth/signup", post(users::signup))
        .route("/auth/login", post(users::login))
        .route("/auth/logout", post(users::logout))
        .route("/users/me", get(users::me).put(users::update_profile))
        .route("/users/me/provision", post(users::provision))
        .route("/funds/send", post(funds::send))
        .route("/funds/invest", post(funds::invest))
        .route("/funds/withdraw", post(funds::withdraw))
        .route("/wallet/balance", get(balance::wallet_balance))
        .route("/transactions", get(transactions::list_transactions))
        .route("/monerium/tokens", get(monerium::tokens))
        .route("/monerium/balance", get(monerium::safe_balance))
        .with_state(state.clone());

    let health_routes = Router::new()
        .route("/health", get(health::liveness))
        .route("/health/ready", get(health::readiness))
        .with_state(state);

    Router::new()
        .nest("/v1", v1_routes)
        .merge(health_routes)
        .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        users::signup,
        users::login,
        users::logout,
        users::me,
        users::update_profile,
        users::provision,
        funds::send,
        funds::invest,
        funds::withdraw,
        balance::wallet_balance,
        transactions::list_transactions,
        monerium::tokens,
        monerium::safe_balance,
        health::liveness,
        health::readiness
    ),
    components(
        schemas(
            users::SignupRequest,
            users::LoginRequest,
            users::UpdateProfileRequest,
            users::AccountResponse,
            users::ProvisioningResponse,
            users::LoginResponse,
            users::LogoutResponse,
            funds::SendRequest,
            funds::AmountRequest,
            funds::MovementResponse,
            transactions::TransactionResponse,
            transactions::TransactionListResponse,
            health::ReadyResponse,
            health::HealthChecks,
            health::HealthResponse,
            ErrorBody,
            WalletBalance,
            SafeBalance,
            ProvisioningState,
            TransactionKind,
            TransactionStatus
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Auth", description = "Sign-up and sessions"),
        (name = "Users", description = "Account profile and provisioning"),
        (name = "Funds", description = "Send, invest, withdraw and history"),
        (name = "Monerium", description = "Monerium EURe proxy"),
        (name = "Health", description = "Liveness and readiness checks")
    )
)]
pub struct ApiDoc;
