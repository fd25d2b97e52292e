//! Account domain types.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::ledger::LedgerError;

/// Identity of a wallet account: one account per customer per channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccountKey {
    /// Customer identifier in the upstream identity system.
    pub customer_id: i64,
    /// Sales channel identifier.
    pub channel_id: i64,
}

impl fmt::Display for AccountKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.customer_id, self.channel_id)
    }
}

/// Per-channel defaults applied to accounts created under that channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// Channel identifier.
    pub channel_id: i64,
    /// Daily movement limit recorded on new accounts.
    pub daily_limit: Decimal,
    /// Monthly movement limit recorded on new accounts.
    pub monthly_limit: Decimal,
    /// Whether accounts are created lazily on first reference.
    pub auto_create_accounts: bool,
    /// Whether the cash balance may go negative.
    pub allow_negative_balance: bool,
    /// Days cashback stays retained before release.
    pub cashback_retention_days: u32,
}

/// A wallet account.
///
/// Four balance buckets: cash (`balance`, of which `blocked_balance` is
/// reserved) and cashback (`cashback_available` spendable now,
/// `cashback_blocked` still under retention).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    /// Account identity.
    pub key: AccountKey,
    /// Total cash balance, including the blocked portion.
    pub balance: Decimal,
    /// Portion of the cash balance reserved by authorizations.
    pub blocked_balance: Decimal,
    /// Cashback spendable now.
    pub cashback_available: Decimal,
    /// Cashback still under retention.
    pub cashback_blocked: Decimal,
    /// Daily movement limit.
    pub daily_limit: Decimal,
    /// Monthly movement limit.
    pub monthly_limit: Decimal,
    /// Inactive accounts reject all movements.
    pub active: bool,
    /// Blocked accounts reject debits; credits still land.
    pub blocked: bool,
    /// Reason recorded when the account was blocked.
    pub block_reason: Option<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Timestamp of the last balance change.
    pub updated_at: DateTime<Utc>,
}

impl Account {
    /// Creates a fresh account with zeroed balances and channel defaults.
    #[must_use]
    pub fn open(key: AccountKey, config: &ChannelConfig, now: DateTime<Utc>) -> Self {
        Self {
            key,
            balance: Decimal::ZERO,
            blocked_balance: Decimal::ZERO,
            cashback_available: Decimal::ZERO,
            cashback_blocked: Decimal::ZERO,
            daily_limit: config.daily_limit,
            monthly_limit: config.monthly_limit,
            active: true,
            blocked: false,
            block_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Cash available for spending: balance minus the blocked portion.
    #[must_use]
    pub fn available(&self) -> Decimal {
        self.balance - self.blocked_balance
    }

    /// Total cashback, retained or not.
    #[must_use]
    pub fn cashback_total(&self) -> Decimal {
        self.cashback_available + self.cashback_blocked
    }

    /// Everything the customer could spend right now.
    #[must_use]
    pub fn total_available(&self) -> Decimal {
        self.available() + self.cashback_available
    }

    /// Checks the account can receive credits.
    ///
    /// # Errors
    ///
    /// Returns `AccountInactive` if the account has been deactivated.
    pub fn ensure_active(&self) -> Result<(), LedgerError> {
        if self.active {
            Ok(())
        } else {
            Err(LedgerError::AccountInactive { key: self.key })
        }
    }

    /// Checks the account can move funds out (debits, blocks).
    ///
    /// # Errors
    ///
    /// Returns `AccountInactive` or `AccountBlocked`.
    pub fn ensure_operational(&self) -> Result<(), LedgerError> {
        self.ensure_active()?;
        if self.blocked {
            return Err(LedgerError::AccountBlocked {
                key: self.key,
                reason: self.block_reason.clone().unwrap_or_default(),
            });
        }
        Ok(())
    }

    /// Point-in-time view of all balance buckets.
    #[must_use]
    pub fn snapshot(&self) -> BalanceSnapshot {
        BalanceSnapshot {
            balance: self.balance,
            blocked_balance: self.blocked_balance,
            available: self.available(),
            cashback_available: self.cashback_available,
            cashback_blocked: self.cashback_blocked,
            cashback_total: self.cashback_total(),
            total_available: self.total_available(),
        }
    }
}

/// Point-in-time view of an account's balances.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceSnapshot {
    /// Total cash balance.
    pub balance: Decimal,
    /// Reserved portion of the cash balance.
    pub blocked_balance: Decimal,
    /// Cash available for spending.
    pub available: Decimal,
    /// Cashback spendable now.
    pub cashback_available: Decimal,
    /// Cashback still under retention.
    pub cashback_blocked: Decimal,
    /// Total cashback.
    pub cashback_total: Decimal,
    /// Cash available plus cashback available.
    pub total_available: Decimal,
}
