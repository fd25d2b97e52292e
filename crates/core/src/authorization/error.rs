//! Authorization error taxonomy.

use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use super::types::AuthorizationStatus;
use crate::ledger::LedgerError;

/// Errors produced by the authorization service.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthorizationError {
    /// No authorization with the given id.
    #[error("authorization {id} not found")]
    NotFound {
        /// Requested authorization id.
        id: Uuid,
    },

    /// No settled authorization carries the given NSU.
    #[error("no authorization found for NSU {nsu}")]
    NsuNotFound {
        /// Requested fiscal transaction number.
        nsu: String,
    },

    /// The authorization timed out before the operation.
    #[error("authorization {id} expired at {expired_at}")]
    Expired {
        /// Authorization id.
        id: Uuid,
        /// When the window closed.
        expired_at: DateTime<Utc>,
    },

    /// The authorization is not in a status that allows the operation.
    #[error("authorization {id} is {status}, cannot {action}")]
    InvalidState {
        /// Authorization id.
        id: Uuid,
        /// Current status.
        status: AuthorizationStatus,
        /// Attempted operation.
        action: &'static str,
    },

    /// The NSU was already used to settle another authorization.
    #[error("NSU {nsu} already used by authorization {existing}")]
    DuplicateNsu {
        /// Offending fiscal transaction number.
        nsu: String,
        /// Authorization that already holds it.
        existing: Uuid,
    },

    /// Underlying ledger failure.
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

impl AuthorizationError {
    /// Stable error code for API responses.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } | Self::NsuNotFound { .. } => "AUTHORIZATION_NOT_FOUND",
            Self::Expired { .. } => "AUTHORIZATION_EXPIRED",
            Self::InvalidState { .. } | Self::DuplicateNsu { .. } => "INVALID_STATE",
            Self::Ledger(inner) => inner.error_code(),
        }
    }

    /// HTTP status code this error maps to.
    #[must_use]
    pub const fn http_status_code(&self) -> u16 {
        match self {
            Self::NotFound { .. } | Self::NsuNotFound { .. } => 404,
            Self::Expired { .. } => 410,
            Self::InvalidState { .. } | Self::DuplicateNsu { .. } => 409,
            Self::Ledger(inner) => inner.http_status_code(),
        }
    }
}
