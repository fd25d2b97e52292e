//! Balance authorization domain types.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::account::AccountKey;
use crate::context::OperationContext;

/// Lifecycle of a balance authorization.
///
/// ```text
/// PENDING --approve--> APPROVED --debit--> COMPLETED --reverse--> REVERSED
///    |                     |
///    +--deny--> DENIED <---+
///    |                     |
///    +--timeout--> EXPIRED <+
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthorizationStatus {
    /// Created by the POS, waiting for customer approval.
    Pending,
    /// Approved by the customer; funds are reserved.
    Approved,
    /// Declined by the customer or the merchant.
    Denied,
    /// Timed out before approval or settlement.
    Expired,
    /// Settled: funds debited, reservation released.
    Completed,
    /// Settlement undone; funds returned.
    Reversed,
}

impl AuthorizationStatus {
    /// String representation used in serialized output.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Approved => "APPROVED",
            Self::Denied => "DENIED",
            Self::Expired => "EXPIRED",
            Self::Completed => "COMPLETED",
            Self::Reversed => "REVERSED",
        }
    }

    /// Parses a status from its string representation.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(Self::Pending),
            "APPROVED" => Some(Self::Approved),
            "DENIED" => Some(Self::Denied),
            "EXPIRED" => Some(Self::Expired),
            "COMPLETED" => Some(Self::Completed),
            "REVERSED" => Some(Self::Reversed),
            _ => None,
        }
    }

    /// Whether the authorization can still change on its own (i.e. may
    /// time out).
    #[must_use]
    pub const fn is_live(self) -> bool {
        matches!(self, Self::Pending | Self::Approved)
    }
}

impl fmt::Display for AuthorizationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A request from a POS to spend part of a customer's wallet balance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalanceAuthorization {
    /// Unique authorization id.
    pub id: Uuid,
    /// Account whose balance is authorized.
    pub account: AccountKey,
    /// Amount requested.
    pub amount: Decimal,
    /// POS terminal that requested the authorization.
    pub terminal: String,
    /// Current lifecycle status.
    pub status: AuthorizationStatus,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Instant after which the current status times out. Reset on
    /// approval to give the POS its settlement window.
    pub expires_at: DateTime<Utc>,
    /// When the customer approved.
    pub approved_at: Option<DateTime<Utc>>,
    /// When the POS settled.
    pub completed_at: Option<DateTime<Utc>>,
    /// When the authorization was denied.
    pub denied_at: Option<DateTime<Utc>>,
    /// Reason given on denial.
    pub denial_reason: Option<String>,
    /// Fiscal transaction number recorded at settlement.
    pub nsu: Option<String>,
    /// Movement that reserved the funds.
    pub block_movement_id: Option<Uuid>,
    /// Movement that debited the funds at settlement.
    pub debit_movement_id: Option<Uuid>,
    /// Movement that returned the funds on reversal.
    pub reversal_movement_id: Option<Uuid>,
    /// Audit context captured at creation.
    pub context: OperationContext,
}

impl BalanceAuthorization {
    /// Whether the authorization has timed out at `now`.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.status.is_live() && self.expires_at <= now
    }
}
