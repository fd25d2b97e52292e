//! Route definitions.

pub mod authorizations;
pub mod cashback;
pub mod health;
pub mod wallet;

use axum::Router;

use crate::AppState;

/// All `/api/v1` routes.
#[must_use]
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .merge(health::routes())
        .merge(wallet::routes())
        .merge(authorizations::routes())
        .merge(cashback::routes())
}
