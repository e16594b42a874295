// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Monerium API proxy (client-credentials).
//!
//! The access token is cached process-wide with an explicit expiry. Refresh
//! is single-flight: the first caller to find the cache stale fetches a new
//! token while holding the cache lock, and concurrent callers wait on that
//! lock and reuse the result.

use std::future::Future;
use std::time::{Duration, Instant};

use alloy::primitives::Address;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;
use utoipa::ToSchema;

/// Tokens are refreshed this long before the server-side expiry.
const EXPIRY_SKEW: Duration = Duration::from_secs(60);

const MONERIUM_ACCEPT: &str = "application/vnd.monerium.api-v2+json";

/// Decimals reported when Monerium has no balance for an address.
const DEFAULT_EURE_DECIMALS: u8 = 18;

#[derive(Debug, thiserror::Error)]
pub enum MoneriumError {
    #[error("Monerium auth failed: {0}")]
    Auth(String),

    #[error("Monerium request failed: {0}")]
    Request(String),

    #[error("Monerium response was invalid: {0}")]
    InvalidResponse(String),
}

// =============================================================================
// Token cache
// =============================================================================

struct CachedToken {
    token: String,
    expires_at: Instant,
}

/// Access-token cache with single-flight refresh.
pub struct TokenCache {
    state: Mutex<Option<CachedToken>>,
    skew: Duration,
}

impl TokenCache {
    pub fn new(skew: Duration) -> Self {
        Self {
            state: Mutex::new(None),
            skew,
        }
    }

    /// Return the cached token, or run `fetch` to obtain a fresh one.
    ///
    /// `fetch` yields `(access_token, expires_in_secs)`.
    pub async fn get_or_refresh<F, Fut>(&self, fetch: F) -> Result<String, MoneriumError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<(String, u64), MoneriumError>>,
    {
        let mut cached = self.state.lock().await;
        if let Some(entry) = cached.as_ref() {
            if Instant::now() < entry.expires_at {
                return Ok(entry.token.clone());
            }
        }

        let (token, expires_in) = fetch().await?;
        let lifetime = Duration::from_secs(expires_in).saturating_sub(self.skew);
        *cached = Some(CachedToken {
            token: token.clone(),
            expires_at: Instant::now() + lifetime,
        });
        Ok(token)
    }
}

// =============================================================================
// Client
// =============================================================================

/// Monerium connection settings.
#[derive(Debug, Clone)]
pub struct MoneriumConfig {
    pub api_url: String,
    pub client_id: String,
    pub client_secret: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Debug, Deserialize)]
struct BalanceItem {
    currency: String,
    decimals: u8,
    amount: String,
}

#[derive(Debug, Deserialize)]
struct BalancesResponse {
    #[serde(default)]
    balances: Vec<BalanceItem>,
}

/// EURe balance of a Safe as reported by Monerium.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct SafeBalance {
    pub eure_balance: String,
    pub eure_decimals: u8,
    /// False when Monerium does not know the address
    pub linked: bool,
}

impl SafeBalance {
    fn unlinked() -> Self {
        Self {
            eure_balance: "0".to_string(),
            eure_decimals: DEFAULT_EURE_DECIMALS,
            linked: false,
        }
    }
}

pub struct MoneriumClient {
    config: MoneriumConfig,
    http: Client,
    token: TokenCache,
}

impl MoneriumClient {
    pub fn new(config: MoneriumConfig) -> Result<Self, MoneriumError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| MoneriumError::Request(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            config,
            http,
            token: TokenCache::new(EXPIRY_SKEW),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.api_url.trim_end_matches('/'), path)
    }

    async fn access_token(&self) -> Result<String, MoneriumError> {
        self.token
            .get_or_refresh(|| async {
                let form = [
                    ("grant_type", "client_credentials"),
                    ("client_id", self.config.client_id.as_str()),
                    ("client_secret", self.config.client_secret.as_str()),
                ];
                let response = self
                    .http
                    .post(self.url("/auth/token"))
                    .form(&form)
                    .send()
                    .await
                    .map_err(|e| MoneriumError::Auth(format!("token request failed: {e}")))?;

                if !response.status().is_success() {
                    let status = response.status();
                    let body = response.text().await.unwrap_or_default();
                    return Err(MoneriumError::Auth(format!(
                        "token request returned {status}: {body}"
                    )));
                }

                let token: TokenResponse = response
                    .json()
                    .await
                    .map_err(|e| MoneriumError::Auth(format!("invalid token response: {e}")))?;

                tracing::info!(expires_in = token.expires_in, "Monerium access token obtained");
                Ok((token.access_token, token.expires_in))
            })
            .await
    }

    /// Tokens supported by Monerium, passed through as returned.
    pub async fn tokens(&self) -> Result<Value, MoneriumError> {
        let token = self.access_token().await?;
        let response = self
            .http
            .get(self.url("/tokens"))
            .bearer_auth(token)
            .header("Accept", MONERIUM_ACCEPT)
            .send()
            .await
            .map_err(|e| MoneriumError::Request(format!("GET /tokens failed: {e}")))?;

        if !response.status().is_success() {
            return Err(MoneriumError::Request(format!(
                "GET /tokens returned {}",
                response.status()
            )));
        }

        response
            .json()
            .await
            .map_err(|e| MoneriumError::InvalidResponse(format!("GET /tokens invalid JSON: {e}")))
    }

    /// EURe balance of `safe` on Sepolia.
    pub async fn safe_balance(&self, safe: Address) -> Result<SafeBalance, MoneriumError> {
        let token = self.access_token().await?;
        let path = format!("/balances/sepolia/{safe}");
        let response = self
            .http
            .get(self.url(&path))
            .query(&[("currency", "eur")])
            .bearer_auth(token)
            .header("Accept", MONERIUM_ACCEPT)
            .send()
            .await
            .map_err(|e| MoneriumError::Request(format!("GET {path} failed: {e}")))?;

        if response.status() == StatusCode::NOT_FOUND {
            tracing::info!(safe = %safe, "Safe not linked to Monerium");
            return Ok(SafeBalance::unlinked());
        }
        if !response.status().is_success() {
            return Err(MoneriumError::Request(format!(
                "GET {path} returned {}",
                response.status()
            )));
        }

        let body: BalancesResponse = response
            .json()
            .await
            .map_err(|e| MoneriumError::InvalidResponse(format!("GET {path} invalid JSON: {e}")))?;

        Ok(eur_balance(body))
    }
}

fn eur_balance(body: BalancesResponse) -> SafeBalance {
    body.balances
        .into_iter()
        .find(|b| b.currency.eq_ignore_ascii_case("eur"))
        .map(|b| SafeBalance {
            eure_balance: b.amount,
            eure_decimals: b.decimals,
            linked: true,
        })
        .unwrap_or_else(|| SafeBalance {
            linked: true,
            ..SafeBalance::unlinked()
        })
}
