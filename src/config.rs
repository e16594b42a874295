// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! Configuration is loaded from the environment at startup (a `.env` file is
//! read first when present).
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `HOST` | Server bind address | `0.0.0.0` |
//! | `PORT` | Server bind port | `8080` |
//! | `DATA_DIR` | Directory holding the ledger database | `./data` |
//! | `RPC_URL` | Sepolia JSON-RPC endpoint | public Sepolia node |
//! | `OPERATOR_PRIVATE_KEY` | Operating signer (deployments, gas, reserve) | Required |
//! | `ENCRYPTION_KEY` | Vault secret, 64 hex chars or 32 bytes | Required |
//! | `SESSION_SECRET` | HS256 session signing secret | Required |
//! | `SETTLEMENT_TOKEN_ADDRESS` | ERC-20 settlement asset | Required |
//! | `SETTLEMENT_CURRENCY` | Currency label on records | `FEURE` |
//! | `SAVINGS_VEHICLE_ADDRESS` | Destination of investments | `0x5B38…ddC4` |
//! | `GAS_FUNDING_AMOUNT` | ETH sent to each new owner EOA | `0.01` |
//! | `CONFIRMATION_TIMEOUT_SECS` | Receipt wait bound | `120` |
//! | `SAFE_PROXY_FACTORY` | Safe proxy factory | Safe v1.4.1 Sepolia |
//! | `SAFE_SINGLETON` | Safe singleton | Safe v1.4.1 Sepolia |
//! | `SAFE_FALLBACK_HANDLER` | Safe fallback handler | Safe v1.4.1 Sepolia |
//! | `MONERIUM_API_URL` | Monerium API base | `https://api.monerium.dev` |
//! | `MONERIUM_CLIENT_ID` | Monerium client id | Optional |
//! | `MONERIUM_CLIENT_SECRET` | Monerium client secret | Optional |
//! | `MAINTENANCE_INTERVAL_SECS` | Gas retry / solvency sweep interval | `300` |
//! | `COOKIE_SECURE` | Mark the session cookie `Secure` | `true` |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |

use std::path::PathBuf;
use std::time::Duration;

use alloy::primitives::{Address, U256};
use zeroize::Zeroizing;

use crate::blockchain::{
    parse_amount, SafeContracts, DEFAULT_CONFIRMATION_TIMEOUT, SAFE_V141_SEPOLIA, SEPOLIA,
};
use crate::custody::RawKey;
use crate::providers::monerium::MoneriumConfig;

pub const HOST_ENV: &str = "HOST";
pub const PORT_ENV: &str = "PORT";
pub const DATA_DIR_ENV: &str = "DATA_DIR";
pub const RPC_URL_ENV: &str = "RPC_URL";
pub const OPERATOR_PRIVATE_KEY_ENV: &str = "OPERATOR_PRIVATE_KEY";
pub const ENCRYPTION_KEY_ENV: &str = "ENCRYPTION_KEY";
pub const SESSION_SECRET_ENV: &str = "SESSION_SECRET";
pub const SETTLEMENT_TOKEN_ENV: &str = "SETTLEMENT_TOKEN_ADDRESS";
pub const SETTLEMENT_CURRENCY_ENV: &str = "SETTLEMENT_CURRENCY";
pub const SAVINGS_VEHICLE_ENV: &str = "SAVINGS_VEHICLE_ADDRESS";
pub const GAS_FUNDING_AMOUNT_ENV: &str = "GAS_FUNDING_AMOUNT";
pub const CONFIRMATION_TIMEOUT_ENV: &str = "CONFIRMATION_TIMEOUT_SECS";
pub const SAFE_PROXY_FACTORY_ENV: &str = "SAFE_PROXY_FACTORY";
pub const SAFE_SINGLETON_ENV: &str = "SAFE_SINGLETON";
pub const SAFE_FALLBACK_HANDLER_ENV: &str = "SAFE_FALLBACK_HANDLER";
pub const MONERIUM_API_URL_ENV: &str = "MONERIUM_API_URL";
pub const MONERIUM_CLIENT_ID_ENV: &str = "MONERIUM_CLIENT_ID";
pub const MONERIUM_CLIENT_SECRET_ENV: &str = "MONERIUM_CLIENT_SECRET";
pub const MAINTENANCE_INTERVAL_ENV: &str = "MAINTENANCE_INTERVAL_SECS";
pub const COOKIE_SECURE_ENV: &str = "COOKIE_SECURE";

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_DATA_DIR: &str = "./data";
pub const DEFAULT_CURRENCY: &str = "FEURE";
pub const DEFAULT_SAVINGS_VEHICLE: &str = "0x5B38Da6a701c568545dCfcB03FcB875f56beddC4";
pub const DEFAULT_GAS_FUNDING_AMOUNT: &str = "0.01";
pub const DEFAULT_MONERIUM_API_URL: &str = "https://api.monerium.dev";
pub const DEFAULT_MAINTENANCE_INTERVAL_SECS: u64 = 300;

/// Native ETH decimals, used for the gas funding amount.
const NATIVE_DECIMALS: u8 = 18;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} is required")]
    Missing(&'static str),

    #[error("{var} is invalid: {reason}")]
    Invalid { var: &'static str, reason: String },
}

fn invalid(var: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        var,
        reason: reason.into(),
    }
}

/// Process configuration.
///
/// Holds secrets, so it deliberately has no `Debug`.
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub data_dir: PathBuf,
    pub rpc_url: String,
    pub operator_key: RawKey,
    pub encryption_key: Zeroizing<String>,
    pub session_secret: Zeroizing<String>,
    pub settlement_token: Address,
    pub settlement_currency: String,
    pub savings_vehicle: Address,
    /// Wei sent to each new owner EOA
    pub gas_funding_amount: U256,
    pub confirmation_timeout: Duration,
    pub safe: SafeContracts,
    pub monerium: Option<MoneriumConfig>,
    pub maintenance_interval: Duration,
    pub secure_cookies: bool,
}

impl AppConfig {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load from an arbitrary lookup function.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let required = |name: &'static str| get(name).ok_or(ConfigError::Missing(name));
        let address = |name: &'static str, default: Option<&str>| -> Result<Address, ConfigError> {
            let value = match (get(name), default) {
                (Some(v), _) => v,
                (None, Some(d)) => d.to_string(),
                (None, None) => return Err(ConfigError::Missing(name)),
            };
            value
                .parse()
                .map_err(|_| invalid(name, format!("`{value}` is not an address")))
        };
        let secs = |name: &'static str, default: u64| -> Result<Duration, ConfigError> {
            match get(name) {
                Some(v) => v
                    .parse::<u64>()
                    .ok()
                    .filter(|s| *s > 0)
                    .map(Duration::from_secs)
                    .ok_or_else(|| invalid(name, "expected a positive number of seconds")),
                None => Ok(Duration::from_secs(default)),
            }
        };

        let port = match get(PORT_ENV) {
            Some(v) => v.parse().map_err(|_| invalid(PORT_ENV, "expected a port number"))?,
            None => DEFAULT_PORT,
        };

        let operator_key = RawKey::new(required(OPERATOR_PRIVATE_KEY_ENV)?);
        let encryption_key = Zeroizing::new(required(ENCRYPTION_KEY_ENV)?);
        let session_secret = Zeroizing::new(required(SESSION_SECRET_ENV)?);

        let gas_input = get(GAS_FUNDING_AMOUNT_ENV)
            .unwrap_or_else(|| DEFAULT_GAS_FUNDING_AMOUNT.to_string());
        let gas_funding_amount = parse_amount(&gas_input, NATIVE_DECIMALS)
            .map_err(|e| invalid(GAS_FUNDING_AMOUNT_ENV, e.to_string()))?;

        let safe = SafeContracts {
            proxy_factory: address(SAFE_PROXY_FACTORY_ENV, Some(SAFE_V141_SEPOLIA.proxy_factory))?,
            singleton: address(SAFE_SINGLETON_ENV, Some(SAFE_V141_SEPOLIA.singleton))?,
            fallback_handler: address(
                SAFE_FALLBACK_HANDLER_ENV,
                Some(SAFE_V141_SEPOLIA.fallback_handler),
            )?,
        };

        let monerium = match (get(MONERIUM_CLIENT_ID_ENV), get(MONERIUM_CLIENT_SECRET_ENV)) {
            (Some(client_id), Some(client_secret)) => Some(MoneriumConfig {
                api_url: get(MONERIUM_API_URL_ENV)
                    .unwrap_or_else(|| DEFAULT_MONERIUM_API_URL.to_string()),
                client_id,
                client_secret,
            }),
            _ => None,
        };

        let secure_cookies = match get(COOKIE_SECURE_ENV).as_deref() {
            None => true,
            Some("1") | Some("true") => true,
            Some("0") | Some("false") => false,
            Some(other) => {
                return Err(invalid(
                    COOKIE_SECURE_ENV,
                    format!("`{other}` is not a boolean"),
                ))
            }
        };

        Ok(Self {
            host: get(HOST_ENV).unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port,
            data_dir: PathBuf::from(
                get(DATA_DIR_ENV).unwrap_or_else(|| DEFAULT_DATA_DIR.to_string()),
            ),
            rpc_url: get(RPC_URL_ENV).unwrap_or_else(|| SEPOLIA.rpc_url.to_string()),
            operator_key,
            encryption_key,
            session_secret,
            settlement_token: address(SETTLEMENT_TOKEN_ENV, None)?,
            settlement_currency: get(SETTLEMENT_CURRENCY_ENV)
                .unwrap_or_else(|| DEFAULT_CURRENCY.to_string()),
            savings_vehicle: address(SAVINGS_VEHICLE_ENV, Some(DEFAULT_SAVINGS_VEHICLE))?,
            gas_funding_amount,
            confirmation_timeout: secs(
                CONFIRMATION_TIMEOUT_ENV,
                DEFAULT_CONFIRMATION_TIMEOUT.as_secs(),
            )?,
            safe,
            monerium,
            maintenance_interval: secs(MAINTENANCE_INTERVAL_ENV, DEFAULT_MAINTENANCE_INTERVAL_SECS)?,
            secure_cookies,
        })
    }

    /// Path of the ledger database file.
    pub fn ledger_path(&self) -> PathBuf {
        self.data_dir.join("ledger.redb")
    }

    /// Bind address as `host:port`.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
