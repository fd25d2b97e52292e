//! Cashback retention domain types.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::account::AccountKey;

/// Status of a cashback retention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RetentionStatus {
    /// Cashback is held in the blocked bucket.
    Retained,
    /// Cashback has been moved to the available bucket.
    Released,
    /// Retention was voided (e.g. the accrual was reversed).
    Cancelled,
}

impl RetentionStatus {
    /// String representation used in serialized output.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Retained => "RETAINED",
            Self::Released => "RELEASED",
            Self::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for RetentionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One tranche of accrued cashback held until its release date.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CashbackRetention {
    /// Unique retention id.
    pub id: Uuid,
    /// Account holding the cashback.
    pub account: AccountKey,
    /// Accrual movement that created this retention.
    pub movement_id: Uuid,
    /// Retained amount.
    pub amount: Decimal,
    /// Status of the tranche.
    pub status: RetentionStatus,
    /// When the cashback was accrued.
    pub retained_at: DateTime<Utc>,
    /// When the tranche becomes releasable.
    pub release_due_at: DateTime<Utc>,
    /// When the tranche was actually released.
    pub released_at: Option<DateTime<Utc>>,
    /// Why the tranche was released (scheduled sweep, manual, promo).
    pub release_reason: Option<String>,
}

impl CashbackRetention {
    /// Whether the tranche is releasable at `now`.
    #[must_use]
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == RetentionStatus::Retained && self.release_due_at <= now
    }
}
