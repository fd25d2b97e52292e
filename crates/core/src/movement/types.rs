//! Movement domain types.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::account::AccountKey;
use crate::context::OperationContext;

/// Category of a ledger movement.
///
/// Closed set: every movement type maps to exactly one category, and the
/// category decides which balance bucket the movement touches and in
/// which direction. New movement types can be registered at runtime, new
/// categories cannot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MovementCategory {
    /// Adds funds to the cash balance.
    Credit,
    /// Removes funds from the cash balance.
    Debit,
    /// Accrues cashback into the blocked cashback bucket (retained).
    CashbackCredit,
    /// Spends available cashback.
    CashbackDebit,
    /// Moves retained cashback into the available bucket.
    CashbackRelease,
    /// Reserves part of the cash balance. Audit-only: the cash balance
    /// itself does not change.
    Block,
    /// Releases a previous reservation. Audit-only.
    Unblock,
    /// Inverse movement produced by a reversal.
    Reversal,
}

impl MovementCategory {
    /// String representation used in serialized output.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Credit => "CREDIT",
            Self::Debit => "DEBIT",
            Self::CashbackCredit => "CASHBACK_CREDIT",
            Self::CashbackDebit => "CASHBACK_DEBIT",
            Self::CashbackRelease => "CASHBACK_RELEASE",
            Self::Block => "BLOCK",
            Self::Unblock => "UNBLOCK",
            Self::Reversal => "REVERSAL",
        }
    }

    /// Whether movements in this category touch a cashback bucket
    /// rather than the cash balance.
    #[must_use]
    pub const fn is_cashback(self) -> bool {
        matches!(
            self,
            Self::CashbackCredit | Self::CashbackDebit | Self::CashbackRelease
        )
    }
}

impl fmt::Display for MovementCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Processing status of a movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MovementStatus {
    /// Created but not yet applied.
    Pending,
    /// Applied to the account.
    Processed,
    /// Abandoned before being applied.
    Cancelled,
    /// Applied, then undone by a reversal movement.
    Reversed,
}

impl MovementStatus {
    /// String representation used in serialized output.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Processed => "PROCESSED",
            Self::Cancelled => "CANCELLED",
            Self::Reversed => "REVERSED",
        }
    }

    /// Parses a status from its string representation.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(Self::Pending),
            "PROCESSED" => Some(Self::Processed),
            "CANCELLED" => Some(Self::Cancelled),
            "REVERSED" => Some(Self::Reversed),
            _ => None,
        }
    }
}

impl fmt::Display for MovementStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A registered movement type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MovementType {
    /// Unique type code (e.g. "CASHBACK_CREDIT").
    pub code: String,
    /// Human-readable name.
    pub name: String,
    /// Category deciding the affected bucket and direction.
    pub category: MovementCategory,
    /// Whether movements of this type can be reversed.
    pub reversible: bool,
    /// Whether movements of this type appear in customer statements.
    /// Block/unblock audit rows are hidden.
    pub visible_in_statement: bool,
    /// Inactive types are rejected at resolve time.
    pub active: bool,
}

/// External reference used for idempotency and reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalReference {
    /// Identifier in the originating system (e.g. a POS NSU).
    pub reference: String,
    /// Originating system name.
    pub origin_system: String,
}

/// An immutable ledger entry recording one balance change.
///
/// `balance_before` / `balance_after` snapshot the bucket the movement
/// touched: the cash balance for cash categories, the relevant cashback
/// bucket for cashback categories. For audit-only categories (block,
/// unblock) the two values are equal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Movement {
    /// Unique movement id.
    pub id: Uuid,
    /// Account this movement belongs to.
    pub account: AccountKey,
    /// Movement type code.
    pub type_code: String,
    /// Category resolved at creation time.
    pub category: MovementCategory,
    /// Absolute amount. Always positive; direction comes from the category.
    pub amount: Decimal,
    /// Affected bucket before the movement.
    pub balance_before: Decimal,
    /// Affected bucket after the movement.
    pub balance_after: Decimal,
    /// Free-form description.
    pub description: String,
    /// External reference, when the operation came from another system.
    pub external_reference: Option<ExternalReference>,
    /// Processing status.
    pub status: MovementStatus,
    /// Id of the movement this one reverses, for `Reversal` movements.
    pub reversal_of: Option<Uuid>,
    /// Audit context captured at creation.
    pub context: OperationContext,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// Internal draft used by services to record a movement.
#[derive(Debug)]
pub(crate) struct MovementDraft<'a> {
    pub account: AccountKey,
    pub movement_type: &'a MovementType,
    pub amount: Decimal,
    pub balance_before: Decimal,
    pub balance_after: Decimal,
    pub description: String,
    pub external_reference: Option<ExternalReference>,
    pub reversal_of: Option<Uuid>,
}

impl Movement {
    pub(crate) fn record(
        draft: MovementDraft<'_>,
        ctx: &OperationContext,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            account: draft.account,
            type_code: draft.movement_type.code.clone(),
            category: draft.movement_type.category,
            amount: draft.amount,
            balance_before: draft.balance_before,
            balance_after: draft.balance_after,
            description: draft.description,
            external_reference: draft.external_reference,
            status: MovementStatus::Processed,
            reversal_of: draft.reversal_of,
            context: ctx.clone(),
            created_at: now,
        }
    }

    /// Whether this movement answers an idempotent retry carrying the
    /// given external reference and type code.
    #[must_use]
    pub fn matches_reference(&self, reference: &ExternalReference, type_code: &str) -> bool {
        self.status != MovementStatus::Cancelled
            && self.type_code == type_code
            && self.external_reference.as_ref() == Some(reference)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn sample_movement() -> Movement {
        Movement {
            id: Uuid::new_v4(),
            account: AccountKey {
                customer_id: 1,
                channel_id: 1,
            },
            type_code: "CREDIT".to_string(),
            category: MovementCategory::Credit,
            amount: dec!(10.00),
            balance_before: dec!(0),
            balance_after: dec!(10.00),
            description: "test".to_string(),
            external_reference: Some(ExternalReference {
                reference: "REF-1".to_string(),
                origin_system: "POS".to_string(),
            }),
            status: MovementStatus::Processed,
            reversal_of: None,
            context: OperationContext::default(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_status_roundtrip() {
        for status in [
            MovementStatus::Pending,
            MovementStatus::Processed,
            MovementStatus::Cancelled,
            MovementStatus::Reversed,
        ] {
            assert_eq!(MovementStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(MovementStatus::parse("UNKNOWN"), None);
    }

    #[test]
    fn test_category_is_cashback() {
        assert!(MovementCategory::CashbackCredit.is_cashback());
        assert!(MovementCategory::CashbackRelease.is_cashback());
        assert!(!MovementCategory::Credit.is_cashback());
        assert!(!MovementCategory::Block.is_cashback());
    }

    #[test]
    fn test_matches_reference() {
        let movement = sample_movement();
        let reference = ExternalReference {
            reference: "REF-1".to_string(),
            origin_system: "POS".to_string(),
        };
        assert!(movement.matches_reference(&reference, "CREDIT"));
        assert!(!movement.matches_reference(&reference, "DEBIT"));

        let other = ExternalReference {
            reference: "REF-2".to_string(),
            origin_system: "POS".to_string(),
        };
        assert!(!movement.matches_reference(&other, "CREDIT"));
    }

    #[test]
    fn test_cancelled_movement_never_matches() {
        let mut movement = sample_movement();
        movement.status = MovementStatus::Cancelled;
        let reference = ExternalReference {
            reference: "REF-1".to_string(),
            origin_system: "POS".to_string(),
        };
        assert!(!movement.matches_reference(&reference, "CREDIT"));
    }
}
