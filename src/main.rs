// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::{net::SocketAddr, sync::Arc, time::Duration};

use axum_server::{tls_rustls::RustlsConfig, Handle};
use deposit_reconciler::{
    api::router,
    config::{AppConfig, DEFAULT_LOG_FILTER},
    providers::{TokenCache, TransakClient},
    state::{AppState, AuthConfig},
    storage::DepositDatabase,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// In-flight requests get this long to finish after a shutdown signal.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    init_logging();

    // Install the ring crypto provider for rustls (before any TLS operation)
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| "failed to install rustls crypto provider")?;

    let config = AppConfig::from_env();
    let database_path = config.database_path();
    let deposits = DepositDatabase::open(&database_path)?;
    info!(path = %database_path.display(), "Opened deposit database");

    let auth_config = AuthConfig::from_identity(&config.identity)?;
    if auth_config.jwks.is_none() {
        warn!("IDENTITY_JWKS_URL not set; bearer tokens are only accepted by development builds");
    }

    let transak = match TransakClient::from_config(&config.fiat, Arc::new(TokenCache::new())) {
        Ok(client) => Some(client),
        Err(e) => {
            warn!(error = %e, "Session creation disabled");
            None
        }
    };
    if config.fiat.webhook_secret.is_none() {
        warn!("TRANSAK_WEBHOOK_SECRET not set; fiat webhooks will be rejected");
    }
    if !config.custodial.has_secrets() {
        warn!("Custodial provider secrets not set; custodial webhooks will be rejected");
    }

    let addr: SocketAddr = config.bind_addr().parse()?;
    let tls = config.tls.clone();

    let mut state = AppState::new(deposits, config).with_auth_config(auth_config);
    if let Some(client) = transak {
        state = state.with_transak(client);
    }
    let app = router(state);

    let handle = Handle::new();
    let shutdown = handle.clone();
    tokio::spawn(async move {
        if wait_for_shutdown_signal().await {
            shutdown.graceful_shutdown(Some(SHUTDOWN_GRACE));
        }
    });

    match tls {
        Some(tls) => {
            let rustls_config = RustlsConfig::from_pem_file(&tls.cert_path, &tls.key_path).await?;
            info!(%addr, "Deposit reconciler listening on https (docs at /docs)");
            axum_server::bind_rustls(addr, rustls_config)
                .handle(handle)
                .serve(app.into_make_service())
                .await?;
        }
        None => {
            info!(%addr, "Deposit reconciler listening on http (docs at /docs)");
            axum_server::bind(addr)
                .handle(handle)
                .serve(app.into_make_service())
                .await?;
        }
    }

    info!("Server stopped");
    Ok(())
}

/// `LOG_FORMAT=json` selects JSON lines, anything else the pretty formatter.
fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let json = std::env::var("LOG_FORMAT")
        .map(|format| format.trim().eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

async fn wait_for_shutdown_signal() -> bool {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            info!("Shutdown signal received");
            true
        }
        Err(e) => {
            warn!(error = %e, "Failed to listen for shutdown signal");
            false
        }
    }
}
