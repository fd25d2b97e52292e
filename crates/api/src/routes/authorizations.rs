//! Balance authorization routes.
//!
//! The POS surface lives under `/pos` and addresses accounts
//! explicitly; the customer surface under `/authorizations` is bound to
//! the identity headers and can only act on its own authorizations.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;

use wallet_core::{AccountKey, BalanceAuthorization};

use crate::error::ApiError;
use crate::middleware::{AuditContext, Identity};
use crate::AppState;

/// Authorization routes, POS and customer side.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/pos/authorizations", post(create))
        .route("/pos/authorizations/{id}", get(show))
        .route("/pos/authorizations/{id}/debit", post(debit))
        .route("/pos/reversals", post(reverse))
        .route("/authorizations/{id}/approve", post(approve))
        .route("/authorizations/{id}/deny", post(deny))
}

#[derive(Debug, Deserialize)]
struct CreateRequest {
    customer_id: i64,
    channel_id: i64,
    amount: Decimal,
    terminal: String,
}

async fn create(
    State(state): State<AppState>,
    AuditContext(ctx): AuditContext,
    Json(request): Json<CreateRequest>,
) -> Result<(StatusCode, Json<BalanceAuthorization>), ApiError> {
    let account = AccountKey {
        customer_id: request.customer_id,
        channel_id: request.channel_id,
    };
    let authorization =
        state
            .authorizations
            .create(account, request.amount, &request.terminal, &ctx)?;
    Ok((StatusCode::CREATED, Json(authorization)))
}

async fn show(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<BalanceAuthorization>, ApiError> {
    Ok(Json(state.authorizations.get(id)?))
}

#[derive(Debug, Deserialize)]
struct DebitRequest {
    nsu: String,
}

async fn debit(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    AuditContext(ctx): AuditContext,
    Json(request): Json<DebitRequest>,
) -> Result<Json<BalanceAuthorization>, ApiError> {
    if request.nsu.trim().is_empty() {
        return Err(ApiError::validation("nsu must not be empty"));
    }
    Ok(Json(state.authorizations.debit(id, &request.nsu, &ctx)?))
}

#[derive(Debug, Deserialize)]
struct ReverseRequest {
    nsu: String,
    reason: Option<String>,
}

async fn reverse(
    State(state): State<AppState>,
    AuditContext(ctx): AuditContext,
    Json(request): Json<ReverseRequest>,
) -> Result<Json<BalanceAuthorization>, ApiError> {
    let reason = request
        .reason
        .unwrap_or_else(|| "requested by POS".to_string());
    Ok(Json(state.authorizations.reverse(&request.nsu, &reason, &ctx)?))
}

async fn approve(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    identity: Identity,
    AuditContext(ctx): AuditContext,
) -> Result<Json<BalanceAuthorization>, ApiError> {
    check_owner(&state, id, identity)?;
    Ok(Json(state.authorizations.approve(id, &ctx)?))
}

#[derive(Debug, Deserialize, Default)]
struct DenyRequest {
    reason: Option<String>,
}

async fn deny(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    identity: Identity,
    AuditContext(ctx): AuditContext,
    Json(request): Json<DenyRequest>,
) -> Result<Json<BalanceAuthorization>, ApiError> {
    check_owner(&state, id, identity)?;
    let reason = request.reason.unwrap_or_else(|| "denied by customer".to_string());
    Ok(Json(state.authorizations.deny(id, &reason, &ctx)?))
}

/// Customers only see their own authorizations; anything else reads as
/// not found so ids cannot be probed.
fn check_owner(state: &AppState, id: Uuid, identity: Identity) -> Result<(), ApiError> {
    let authorization = state.authorizations.get(id)?;
    if authorization.account == identity.account {
        Ok(())
    } else {
        Err(ApiError::new(
            404,
            "AUTHORIZATION_NOT_FOUND",
            format!("authorization {id} not found"),
        ))
    }
}
