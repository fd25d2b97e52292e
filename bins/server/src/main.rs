//! Wallet backend server.
//!
//! Wires the in-process ledger, the authorization service and the
//! cashback manager into the HTTP router, and runs the two background
//! sweeps (authorization expiry, cashback release).

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use wallet_api::{create_router, AppState};
use wallet_core::{
    AccountRegistry, AuthorizationService, CashbackRetentionManager, CashbackSweeper,
    ExpirationSweeper, LedgerService, LedgerStore, LogNotifier, MovementTypeCatalog,
};
use wallet_shared::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::load().context("failed to load configuration")?;

    let store = Arc::new(LedgerStore::new());
    let registry = Arc::new(AccountRegistry::new(
        Arc::clone(&store),
        config.wallet.clone(),
    ));
    let catalog = Arc::new(MovementTypeCatalog::with_defaults());
    let ledger = Arc::new(LedgerService::new(
        Arc::clone(&store),
        Arc::clone(&registry),
        Arc::clone(&catalog),
    ));
    let authorizations = Arc::new(AuthorizationService::new(
        Arc::clone(&ledger),
        &config.authorization,
        Arc::new(LogNotifier),
    ));
    let cashback = Arc::new(CashbackRetentionManager::new(store, registry, catalog));

    spawn_sweepers(&config, Arc::clone(&authorizations), Arc::clone(&cashback));

    let router = create_router(AppState {
        ledger,
        authorizations,
        cashback,
    });

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, "Wallet server listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;
    Ok(())
}

fn spawn_sweepers(
    config: &AppConfig,
    authorizations: Arc<AuthorizationService>,
    cashback: Arc<CashbackRetentionManager>,
) {
    let expiration = ExpirationSweeper::new(authorizations);
    let expiration_interval = Duration::from_secs(config.authorization.sweep_interval_secs.max(1));
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(expiration_interval);
        loop {
            interval.tick().await;
            expiration.tick();
        }
    });

    let release = CashbackSweeper::new(cashback);
    let release_interval = Duration::from_secs(config.wallet.cashback_sweep_interval_secs.max(1));
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(release_interval);
        loop {
            interval.tick().await;
            release.tick();
        }
    });
}

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
        () = ctrl_c => {},
        () = terminate => {},
    }
    info!("Shutdown signal received");
}
