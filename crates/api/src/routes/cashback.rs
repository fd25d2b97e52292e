//! Cashback routes: POS accrual and redemption, retention management.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;

use wallet_core::movement::codes;
use wallet_core::{
    AccountKey, CashbackRetention, EntryRequest, ExternalReference, Movement,
};

use crate::error::ApiError;
use crate::middleware::{AuditContext, Identity};
use crate::AppState;

/// Cashback routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/pos/cashback", post(accrue))
        .route("/pos/cashback/debit", post(redeem))
        .route("/cashback/retentions", get(retentions))
        .route("/cashback/retentions/{id}/release", post(release))
}

#[derive(Debug, Deserialize)]
struct CashbackRequest {
    customer_id: i64,
    channel_id: i64,
    amount: Decimal,
    /// Transaction identifier in the originating system; makes retries
    /// idempotent.
    reference: String,
    origin_system: Option<String>,
    description: Option<String>,
}

impl CashbackRequest {
    fn account(&self) -> AccountKey {
        AccountKey {
            customer_id: self.customer_id,
            channel_id: self.channel_id,
        }
    }

    fn entry(&self, type_code: &str, default_description: &str) -> EntryRequest {
        EntryRequest {
            account: self.account(),
            type_code: type_code.to_string(),
            amount: self.amount,
            description: self
                .description
                .clone()
                .unwrap_or_else(|| default_description.to_string()),
            external_reference: Some(ExternalReference {
                reference: self.reference.clone(),
                origin_system: self
                    .origin_system
                    .clone()
                    .unwrap_or_else(|| "POS".to_string()),
            }),
        }
    }
}

async fn accrue(
    State(state): State<AppState>,
    AuditContext(ctx): AuditContext,
    Json(request): Json<CashbackRequest>,
) -> Result<(StatusCode, Json<Movement>), ApiError> {
    let movement = state
        .ledger
        .credit(request.entry(codes::CASHBACK_CREDIT, "Purchase cashback"), &ctx)?;
    Ok((StatusCode::CREATED, Json(movement)))
}

async fn redeem(
    State(state): State<AppState>,
    AuditContext(ctx): AuditContext,
    Json(request): Json<CashbackRequest>,
) -> Result<Json<Movement>, ApiError> {
    let movement = state
        .ledger
        .debit(request.entry(codes::CASHBACK_DEBIT, "Cashback redemption"), &ctx)?;
    Ok(Json(movement))
}

async fn retentions(
    State(state): State<AppState>,
    identity: Identity,
) -> Result<Json<Vec<CashbackRetention>>, ApiError> {
    state.ledger.ensure_account(identity.account)?;
    Ok(Json(state.cashback.retentions(identity.account)?))
}

#[derive(Debug, Deserialize, Default)]
struct ReleaseRequest {
    reason: Option<String>,
    /// Release before the due date (promotions, goodwill).
    #[serde(default)]
    early: bool,
}

async fn release(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<ReleaseRequest>,
) -> Result<Json<CashbackRetention>, ApiError> {
    let reason = request
        .reason
        .unwrap_or_else(|| "manual release".to_string());
    let released = if request.early {
        state.cashback.release_early(id, &reason, Utc::now())?
    } else {
        state.cashback.release(id, &reason, Utc::now())?
    };
    Ok(Json(released))
}
