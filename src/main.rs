// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::{env, sync::Arc};

use fidg_custody_server::{
    api::router,
    auth::SessionManager,
    blockchain::{signing::signer_from_key, ChainClient, SafeClient, SEPOLIA},
    config::AppConfig,
    custody::{KeyVault, RawKey},
    funds::FundMovement,
    ledger::{LedgerStore, RedbLedger},
    locks::AccountLocks,
    maintenance::MaintenanceWorker,
    providers::monerium::MoneriumClient,
    provisioning::ProvisioningSaga,
    state::AppState,
};
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);

    // LOG_FORMAT=json for log shippers, human-readable otherwise
    if env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json")) {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn shutdown_signal(shutdown: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
    info!("Shutdown signal received");
    shutdown.cancel();
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = AppConfig::from_env().expect("Invalid configuration");

    std::fs::create_dir_all(&config.data_dir).expect("Failed to create data directory");
    let ledger: Arc<dyn LedgerStore> =
        Arc::new(RedbLedger::open(&config.ledger_path()).expect("Failed to open ledger"));

    let vault = Arc::new(
        KeyVault::from_config_secret(&config.encryption_key).expect("Invalid ENCRYPTION_KEY"),
    );
    let operator_key = Arc::new(RawKey::new(config.operator_key.expose()));
    let operator_address = signer_from_key(&operator_key)
        .expect("Invalid OPERATOR_PRIVATE_KEY")
        .address();

    let chain = Arc::new(
        ChainClient::new(
            SEPOLIA,
            &config.rpc_url,
            config.settlement_token,
            config.confirmation_timeout,
        )
        .expect("Failed to create chain client"),
    );
    let safe = Arc::new(SafeClient::new(
        chain.clone(),
        config.safe,
        operator_key.clone(),
    ));

    let locks = Arc::new(AccountLocks::new());
    let provisioning = Arc::new(ProvisioningSaga::new(
        ledger.clone(),
        vault.clone(),
        chain.clone(),
        safe.clone(),
        locks.clone(),
        operator_key.clone(),
        operator_address,
        SEPOLIA,
        config.settlement_currency.clone(),
        config.gas_funding_amount,
    ));
    let funds = Arc::new(FundMovement::new(
        ledger.clone(),
        vault,
        chain.clone(),
        safe,
        operator_key,
        operator_address,
        config.savings_vehicle,
        SEPOLIA,
        config.settlement_currency.clone(),
    ));

    let monerium = match config.monerium.clone() {
        Some(monerium_config) => Some(Arc::new(
            MoneriumClient::new(monerium_config).expect("Failed to create Monerium client"),
        )),
        None => {
            info!("Monerium integration disabled");
            None
        }
    };

    let state = AppState {
        ledger: ledger.clone(),
        provisioning: provisioning.clone(),
        funds,
        sessions: Arc::new(SessionManager::new(config.session_secret.as_bytes())),
        locks,
        signer: chain.clone(),
        monerium,
        secure_cookies: config.secure_cookies,
    };

    let shutdown = CancellationToken::new();
    let worker = MaintenanceWorker::new(ledger, provisioning, chain, operator_address)
        .with_interval(config.maintenance_interval);
    let worker_handle = tokio::spawn(worker.run(shutdown.clone()));

    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind listener");

    info!(
        %addr,
        network = SEPOLIA.name,
        operator = %operator_address,
        "Fidg custody server listening (docs at /docs)"
    );

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await
        .expect("HTTP server failed");

    shutdown.cancel();
    let _ = worker_handle.await;
    info!("Server stopped");
}
