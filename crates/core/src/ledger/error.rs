//! Ledger error taxonomy.
//!
//! Every variant carries a stable error code and an HTTP status, so the
//! API layer can map failures without inspecting messages.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

use crate::account::AccountKey;

/// Errors produced by ledger and cashback operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    // ========================================================================
    // Account errors
    // ========================================================================
    /// No account exists for the key and auto-creation is off.
    #[error("account {key} not found")]
    AccountNotFound {
        /// Requested account.
        key: AccountKey,
    },

    /// The account has been deactivated.
    #[error("account {key} is inactive")]
    AccountInactive {
        /// Requested account.
        key: AccountKey,
    },

    /// The account is blocked for outgoing movements.
    #[error("account {key} is blocked: {reason}")]
    AccountBlocked {
        /// Requested account.
        key: AccountKey,
        /// Reason recorded when the account was blocked.
        reason: String,
    },

    // ========================================================================
    // Movement errors
    // ========================================================================
    /// Amount is zero or negative.
    #[error("invalid amount: {amount}")]
    InvalidAmount {
        /// Offending amount.
        amount: Decimal,
    },

    /// Movement type code is unknown or inactive.
    #[error("invalid movement type: {code}")]
    InvalidMovementType {
        /// Offending type code.
        code: String,
    },

    /// Not enough spendable funds in the targeted bucket.
    #[error("insufficient balance: available {available}, requested {requested}")]
    InsufficientBalance {
        /// Spendable funds at the time of the attempt.
        available: Decimal,
        /// Requested amount.
        requested: Decimal,
    },

    /// Not enough blocked funds to unblock or settle.
    #[error("insufficient blocked balance: blocked {blocked}, requested {requested}")]
    InsufficientBlockedBalance {
        /// Blocked funds at the time of the attempt.
        blocked: Decimal,
        /// Requested amount.
        requested: Decimal,
    },

    // ========================================================================
    // Reversal errors
    // ========================================================================
    /// No movement with the given id.
    #[error("movement {id} not found")]
    MovementNotFound {
        /// Requested movement id.
        id: Uuid,
    },

    /// The movement's type does not allow reversal.
    #[error("movement type {code} is not reversible")]
    TypeNotReversible {
        /// Type code of the movement.
        code: String,
    },

    /// Reversing the movement would overdraw the account.
    #[error(
        "insufficient balance for reversal: available {available}, requested {requested}"
    )]
    InsufficientBalanceForReversal {
        /// Spendable funds at the time of the attempt.
        available: Decimal,
        /// Amount the reversal needs to claw back.
        requested: Decimal,
    },

    // ========================================================================
    // Cashback retention errors
    // ========================================================================
    /// No retention with the given id.
    #[error("cashback retention {id} not found")]
    RetentionNotFound {
        /// Requested retention id.
        id: Uuid,
    },

    /// The retention's release date has not arrived yet.
    #[error("cashback retention not yet due, release due at {due_at}")]
    RetentionNotYetDue {
        /// When the retention becomes releasable.
        due_at: DateTime<Utc>,
    },

    // ========================================================================
    // State errors
    // ========================================================================
    /// The entity is not in a state that allows the operation.
    #[error("invalid state: {detail}")]
    InvalidState {
        /// What was attempted and why it was rejected.
        detail: String,
    },
}

impl LedgerError {
    /// Stable error code for API responses.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::AccountNotFound { .. } => "ACCOUNT_NOT_FOUND",
            Self::AccountInactive { .. } => "ACCOUNT_INACTIVE",
            Self::AccountBlocked { .. } => "ACCOUNT_BLOCKED",
            Self::InvalidAmount { .. } => "INVALID_AMOUNT",
            Self::InvalidMovementType { .. } => "INVALID_MOVEMENT_TYPE",
            Self::InsufficientBalance { .. } => "INSUFFICIENT_BALANCE",
            Self::InsufficientBlockedBalance { .. } => "INSUFFICIENT_BLOCKED_BALANCE",
            Self::MovementNotFound { .. } => "MOVEMENT_NOT_FOUND",
            Self::TypeNotReversible { .. } => "TYPE_NOT_REVERSIBLE",
            Self::InsufficientBalanceForReversal { .. } => "INSUFFICIENT_BALANCE_FOR_REVERSAL",
            Self::RetentionNotFound { .. } => "RETENTION_NOT_FOUND",
            Self::RetentionNotYetDue { .. } => "NOT_YET_DUE",
            Self::InvalidState { .. } => "INVALID_STATE",
        }
    }

    /// HTTP status code this error maps to.
    #[must_use]
    pub const fn http_status_code(&self) -> u16 {
        match self {
            Self::AccountNotFound { .. }
            | Self::MovementNotFound { .. }
            | Self::RetentionNotFound { .. } => 404,
            Self::InvalidAmount { .. } | Self::InvalidMovementType { .. } => 400,
            Self::InvalidState { .. } => 409,
            Self::AccountInactive { .. }
            | Self::AccountBlocked { .. }
            | Self::InsufficientBalance { .. }
            | Self::InsufficientBlockedBalance { .. }
            | Self::TypeNotReversible { .. }
            | Self::InsufficientBalanceForReversal { .. }
            | Self::RetentionNotYetDue { .. } => 422,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use rust_decimal_macros::dec;

    #[test]
    fn test_error_codes_are_stable() {
        let key = AccountKey {
            customer_id: 1,
            channel_id: 1,
        };
        assert_eq!(
            LedgerError::AccountNotFound { key }.error_code(),
            "ACCOUNT_NOT_FOUND"
        );
        assert_eq!(
            LedgerError::InsufficientBalance {
                available: dec!(1),
                requested: dec!(2),
            }
            .error_code(),
            "INSUFFICIENT_BALANCE"
        );
        assert_eq!(
            LedgerError::RetentionNotYetDue { due_at: Utc::now() }.error_code(),
            "NOT_YET_DUE"
        );
    }

    fn key() -> AccountKey {
        AccountKey {
            customer_id: 1,
            channel_id: 1,
        }
    }

    #[rstest]
    #[case(LedgerError::AccountNotFound { key: key() }, 404)]
    #[case(LedgerError::MovementNotFound { id: Uuid::nil() }, 404)]
    #[case(LedgerError::InvalidAmount { amount: dec!(-1) }, 400)]
    #[case(LedgerError::InvalidMovementType { code: "X".to_string() }, 400)]
    #[case(LedgerError::InvalidState { detail: "x".to_string() }, 409)]
    #[case(LedgerError::AccountBlocked { key: key(), reason: String::new() }, 422)]
    #[case(LedgerError::InsufficientBlockedBalance { blocked: dec!(0), requested: dec!(1) }, 422)]
    #[case(LedgerError::TypeNotReversible { code: "BLOCK".to_string() }, 422)]
    fn test_http_status_mapping(#[case] error: LedgerError, #[case] status: u16) {
        assert_eq!(error.http_status_code(), status);
    }
}
