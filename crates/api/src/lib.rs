//! HTTP API for the wallet backend.
//!
//! Thin layer over `wallet-core`: extracts identity and audit context
//! from gateway headers, maps domain errors to stable error codes and
//! exposes the wallet, POS and cashback surfaces under `/api/v1`.

pub mod error;
pub mod middleware;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use wallet_core::{AuthorizationService, CashbackRetentionManager, LedgerService};

/// Shared application state.
#[derive(Debug, Clone)]
pub struct AppState {
    /// The account ledger.
    pub ledger: Arc<LedgerService>,
    /// The POS balance-authorization service.
    pub authorizations: Arc<AuthorizationService>,
    /// The cashback retention manager.
    pub cashback: Arc<CashbackRetentionManager>,
}

/// Builds the application router.
#[must_use]
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .nest("/api/v1", routes::api_routes())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
