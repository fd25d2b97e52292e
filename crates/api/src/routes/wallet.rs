//! Customer wallet routes: balance and statement.

use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::Deserialize;

use wallet_core::{BalanceSnapshot, Movement, StatementFilter};

use crate::error::ApiError;
use crate::middleware::Identity;
use crate::AppState;

/// Wallet routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/wallet/balance", get(balance))
        .route("/wallet/statement", get(statement))
}

async fn balance(
    State(state): State<AppState>,
    identity: Identity,
) -> Result<Json<BalanceSnapshot>, ApiError> {
    // First touch of a wallet creates the account when the channel
    // auto-creates, so a fresh customer sees zeroed balances, not a 404.
    let snapshot = state.ledger.ensure_account(identity.account)?;
    Ok(Json(snapshot))
}

#[derive(Debug, Deserialize)]
struct StatementQuery {
    from: Option<DateTime<Utc>>,
    to: Option<DateTime<Utc>>,
    type_code: Option<String>,
    limit: Option<usize>,
}

async fn statement(
    State(state): State<AppState>,
    identity: Identity,
    Query(query): Query<StatementQuery>,
) -> Result<Json<Vec<Movement>>, ApiError> {
    state.ledger.ensure_account(identity.account)?;
    let filter = StatementFilter {
        from: query.from,
        to: query.to,
        type_code: query.type_code,
        limit: query.limit,
    };
    let movements = state.ledger.statement(identity.account, &filter)?;
    Ok(Json(movements))
}
