//! Identity and audit-context extractors.
//!
//! Authentication itself happens at the gateway; by the time a request
//! reaches this service the gateway has resolved the customer and
//! stamped the identity headers. The extractors only read them.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use std::convert::Infallible;

use wallet_core::{AccountKey, OperationContext};

use crate::error::ApiError;

/// Header carrying the authenticated customer id.
pub const CUSTOMER_ID_HEADER: &str = "x-customer-id";
/// Header carrying the sales channel id.
pub const CHANNEL_ID_HEADER: &str = "x-channel-id";
/// Header naming the system that originated the request.
pub const ORIGIN_SYSTEM_HEADER: &str = "x-origin-system";

/// The authenticated caller's wallet account.
#[derive(Debug, Clone, Copy)]
pub struct Identity {
    /// Account resolved from the identity headers.
    pub account: AccountKey,
}

impl<S> FromRequestParts<S> for Identity
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let customer_id = header_i64(parts, CUSTOMER_ID_HEADER)?;
        let channel_id = header_i64(parts, CHANNEL_ID_HEADER)?;
        Ok(Self {
            account: AccountKey {
                customer_id,
                channel_id,
            },
        })
    }
}

fn header_i64(parts: &Parts, name: &str) -> Result<i64, ApiError> {
    parts
        .headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<i64>().ok())
        .ok_or_else(|| ApiError::unauthorized(format!("missing or invalid {name} header")))
}

/// Audit context assembled from request headers. Never rejects: every
/// field is optional.
#[derive(Debug, Clone)]
pub struct AuditContext(
    /// The captured context.
    pub OperationContext,
);

impl<S> FromRequestParts<S> for AuditContext
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = |name: &str| {
            parts
                .headers
                .get(name)
                .and_then(|value| value.to_str().ok())
                .map(ToString::to_string)
        };
        // First hop of the forwarding chain is the client.
        let ip_address = header("x-forwarded-for")
            .map(|chain| chain.split(',').next().unwrap_or_default().trim().to_string())
            .filter(|ip| !ip.is_empty());
        Ok(Self(OperationContext {
            ip_address,
            user_agent: header("user-agent"),
            origin_system: header(ORIGIN_SYSTEM_HEADER),
        }))
    }
}
