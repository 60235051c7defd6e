//! osu! stats updater
//!
//! Single-binary Rust service that:
//! 1. Provisions configured API credentials into the durable credential store
//! 2. Periodically refreshes every tracked player's per-mode statistics
//! 3. Spreads lookups over the credential pool within each credential's quota
//! 4. Serves pool health and Prometheus metrics on a status listener

mod config;
mod error;
mod metrics;
mod orchestrator;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::Router;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use metrics_exporter_prometheus::PrometheusHandle;
use osu_auth::{CredentialStore, UserTokenStore};
use osu_pool::{Clock, CredentialPool, FetchClient, SystemClock, TokenBroker};
use stats_store::{FilePerformanceStore, PlayerStore};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::orchestrator::UpdateOrchestrator;

/// Shared state for the status endpoints
#[derive(Clone)]
struct AppState {
    pool: Arc<CredentialPool>,
    prometheus: PrometheusHandle,
}

fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and LOG_LEVEL / RUST_LOG support
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("starting stats-updater");

    // Install Prometheus metrics recorder before any metrics are emitted
    let prometheus = metrics::install_recorder();

    // CLI: --config <path> and --once
    let args: Vec<String> = std::env::args().collect();
    let cli_config_path = args
        .iter()
        .position(|a| a == "--config")
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str());
    let once = args.iter().any(|a| a == "--once");

    let config_path = Config::resolve_path(cli_config_path);
    info!(path = %config_path.display(), "loading configuration");

    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    info!(
        api_base = %config.api.api_base,
        credentials = config.credentials.len(),
        max_workers = config.updater.max_workers,
        listen_addr = %config.status.listen_addr,
        "configuration loaded"
    );

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let credentials = Arc::new(
        CredentialStore::load(config.storage.credentials_path.clone())
            .await
            .context("failed to load credential store")?,
    );
    provision_credentials(&config, &credentials, clock.now_millis()).await?;
    if credentials.is_empty().await {
        return Err(error::Error::NoCredentials.into());
    }

    let pool = Arc::new(CredentialPool::new(
        credentials,
        clock,
        config.pool.limits(),
        config.pool.retry(),
    ));

    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.api.timeout_secs))
        .build()
        .context("failed to build HTTP client")?;

    let mut broker = TokenBroker::new(
        pool.clone(),
        http.clone(),
        config.api.token_url.clone(),
        config.api.scope.clone(),
    );
    if config.pool.prefer_delegated_tokens {
        let delegated = match &config.storage.delegated_tokens_path {
            Some(path) => UserTokenStore::load(path.clone())
                .await
                .context("failed to load delegated user tokens")?,
            None => UserTokenStore::in_memory(),
        };
        broker = broker.with_delegated(Arc::new(delegated));
    }
    let fetcher = Arc::new(FetchClient::new(
        Arc::new(broker),
        http,
        config.api.api_base.clone(),
    ));

    let players = Arc::new(
        PlayerStore::load(config.storage.players_path.clone())
            .await
            .context("failed to load tracked players")?,
    );
    let performance = Arc::new(
        FilePerformanceStore::load(config.storage.performance_path.clone())
            .await
            .context("failed to load performance records")?,
    );
    let orchestrator =
        UpdateOrchestrator::new(fetcher, players, performance, config.updater.max_workers);

    let cancel = CancellationToken::new();

    let app = build_router(AppState {
        pool: pool.clone(),
        prometheus,
    });
    let listen_addr = config.status.listen_addr;
    let listener = TcpListener::bind(listen_addr)
        .await
        .with_context(|| format!("failed to bind to {listen_addr}"))?;
    info!(addr = %listen_addr, "status listener ready");

    let server_cancel = cancel.clone();
    let server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { server_cancel.cancelled().await })
            .await
    });

    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        signal_cancel.cancel();
    });

    run_updates(
        &orchestrator,
        &cancel,
        Duration::from_secs(config.updater.cycle_interval_secs),
        once,
    )
    .await;

    // --once exits here too; stop the status listener
    cancel.cancel();
    match server.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!(error = %e, "status server error during shutdown"),
        Err(e) => error!(error = %e, "status server task panicked"),
    }

    info!("shutdown complete");
    Ok(())
}

/// Make sure every configured credential exists in the store.
///
/// Existing rows keep their quota and health; stored credentials missing
/// from config are left alone.
async fn provision_credentials(
    config: &Config,
    store: &CredentialStore,
    now_millis: u64,
) -> Result<()> {
    for credential in &config.credentials {
        let secret = credential.resolve_secret()?;
        let created = store
            .ensure(&credential.name, &credential.client_id, secret, now_millis)
            .await
            .with_context(|| format!("failed to provision credential {}", credential.name))?;
        if created {
            info!(credential = %credential.name, "new credential provisioned");
        }
    }
    Ok(())
}

/// Run batches until cancelled, pausing `interval` between them.
async fn run_updates(
    orchestrator: &UpdateOrchestrator,
    cancel: &CancellationToken,
    interval: Duration,
    once: bool,
) {
    loop {
        let summary = orchestrator.update_all(cancel).await;
        info!(
            run_id = %summary.run_id,
            updated = summary.updated,
            failed = summary.failed,
            "update cycle complete"
        );
        if once || cancel.is_cancelled() {
            break;
        }
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }
    }
}

/// Pool health: 200 while at least one credential is active, 503 otherwise.
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let body = state.pool.health().await;
    let active = body["credentials_active"].as_u64().unwrap_or(0);
    let status_code = if active > 0 {
        axum::http::StatusCode::OK
    } else {
        axum::http::StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status_code,
        [(axum::http::header::CONTENT_TYPE, "application/json")],
        body.to_string(),
    )
}

/// Prometheus text exposition.
async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    (
        axum::http::StatusCode::OK,
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        state.prometheus.render(),
    )
}

/// Wait for SIGTERM or SIGINT for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}
