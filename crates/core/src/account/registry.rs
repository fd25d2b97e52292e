//! Account registry: creation, lookup and status management.

use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use rust_decimal::Decimal;
use tracing::info;

use wallet_shared::WalletSettings;

use super::types::{Account, AccountKey, ChannelConfig};
use crate::ledger::store::SharedEntry;
use crate::ledger::{LedgerError, LedgerStore};

/// Per-channel configuration overrides with deployment-wide defaults.
#[derive(Debug)]
pub struct ChannelCatalog {
    overrides: DashMap<i64, ChannelConfig>,
    defaults: WalletSettings,
}

impl ChannelCatalog {
    /// Creates a catalog with the given deployment defaults.
    #[must_use]
    pub fn new(defaults: WalletSettings) -> Self {
        Self {
            overrides: DashMap::new(),
            defaults,
        }
    }

    /// Installs or replaces a channel override.
    pub fn configure(&self, config: ChannelConfig) {
        self.overrides.insert(config.channel_id, config);
    }

    /// Effective configuration for a channel.
    #[must_use]
    pub fn config_for(&self, channel_id: i64) -> ChannelConfig {
        self.overrides
            .get(&channel_id)
            .map(|c| c.clone())
            .unwrap_or_else(|| ChannelConfig {
                channel_id,
                daily_limit: self.defaults.default_daily_limit,
                monthly_limit: self.defaults.default_monthly_limit,
                auto_create_accounts: self.defaults.auto_create_accounts,
                allow_negative_balance: self.defaults.allow_negative_balance,
                cashback_retention_days: self.defaults.cashback_retention_days,
            })
    }
}

/// Creates accounts and manages their lifecycle flags.
///
/// Accounts are created lazily on first reference when the channel
/// allows it; otherwise callers get `AccountNotFound` until the account
/// is opened explicitly.
#[derive(Debug)]
pub struct AccountRegistry {
    store: Arc<LedgerStore>,
    channels: ChannelCatalog,
}

impl AccountRegistry {
    /// Creates a registry over the given store.
    #[must_use]
    pub fn new(store: Arc<LedgerStore>, settings: WalletSettings) -> Self {
        Self {
            store,
            channels: ChannelCatalog::new(settings),
        }
    }

    /// Effective configuration for a channel.
    #[must_use]
    pub fn channel_config(&self, channel_id: i64) -> ChannelConfig {
        self.channels.config_for(channel_id)
    }

    /// Installs or replaces a channel override.
    pub fn configure_channel(&self, config: ChannelConfig) {
        self.channels.configure(config);
    }

    /// Opens an account explicitly, regardless of the channel's
    /// auto-create flag. Returns the existing account if one is already
    /// open for the key.
    pub fn open(&self, key: AccountKey) -> Account {
        let config = self.channels.config_for(key.channel_id);
        let (entry, created) = self
            .store
            .get_or_insert_with(key, || Account::open(key, &config, Utc::now()));
        if created {
            info!(account = %key, "Account opened");
        }
        let guard = entry.lock();
        guard.account.clone()
    }

    /// Returns the entry for `key`, creating the account if the channel
    /// auto-creates.
    ///
    /// # Errors
    ///
    /// Returns `AccountNotFound` when the account does not exist and the
    /// channel does not auto-create.
    pub fn ensure(&self, key: AccountKey) -> Result<SharedEntry, LedgerError> {
        if let Some(entry) = self.store.get(key) {
            return Ok(entry);
        }
        let config = self.channels.config_for(key.channel_id);
        if !config.auto_create_accounts {
            return Err(LedgerError::AccountNotFound { key });
        }
        let (entry, created) = self
            .store
            .get_or_insert_with(key, || Account::open(key, &config, Utc::now()));
        if created {
            info!(account = %key, "Account auto-created");
        }
        Ok(entry)
    }

    /// Returns the entry for `key` without creating anything.
    ///
    /// # Errors
    ///
    /// Returns `AccountNotFound` when no account exists for the key.
    pub fn get(&self, key: AccountKey) -> Result<SharedEntry, LedgerError> {
        self.store
            .get(key)
            .ok_or(LedgerError::AccountNotFound { key })
    }

    /// Blocks the account for outgoing movements.
    ///
    /// # Errors
    ///
    /// Returns `AccountNotFound` when no account exists for the key.
    pub fn block(&self, key: AccountKey, reason: &str) -> Result<Account, LedgerError> {
        let entry = self.get(key)?;
        let mut guard = entry.lock();
        guard.account.blocked = true;
        guard.account.block_reason = Some(reason.to_string());
        guard.account.updated_at = Utc::now();
        info!(account = %key, reason, "Account blocked");
        Ok(guard.account.clone())
    }

    /// Lifts an account block.
    ///
    /// # Errors
    ///
    /// Returns `AccountNotFound` when no account exists for the key.
    pub fn unblock(&self, key: AccountKey) -> Result<Account, LedgerError> {
        let entry = self.get(key)?;
        let mut guard = entry.lock();
        guard.account.blocked = false;
        guard.account.block_reason = None;
        guard.account.updated_at = Utc::now();
        info!(account = %key, "Account unblocked");
        Ok(guard.account.clone())
    }

    /// Activates or deactivates the account.
    ///
    /// # Errors
    ///
    /// Returns `AccountNotFound` when no account exists for the key.
    pub fn set_active(&self, key: AccountKey, active: bool) -> Result<Account, LedgerError> {
        let entry = self.get(key)?;
        let mut guard = entry.lock();
        guard.account.active = active;
        guard.account.updated_at = Utc::now();
        Ok(guard.account.clone())
    }

    /// Updates the recorded movement limits.
    ///
    /// # Errors
    ///
    /// Returns `AccountNotFound` when no account exists for the key.
    pub fn set_limits(
        &self,
        key: AccountKey,
        daily: Decimal,
        monthly: Decimal,
    ) -> Result<Account, LedgerError> {
        let entry = self.get(key)?;
        let mut guard = entry.lock();
        guard.account.daily_limit = daily;
        guard.account.monthly_limit = monthly;
        guard.account.updated_at = Utc::now();
        Ok(guard.account.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn registry(auto_create: bool) -> AccountRegistry {
        let settings = WalletSettings {
            auto_create_accounts: auto_create,
            ..WalletSettings::default()
        };
        AccountRegistry::new(Arc::new(LedgerStore::new()), settings)
    }

    fn key() -> AccountKey {
        AccountKey {
            customer_id: 10,
            channel_id: 1,
        }
    }

    #[test]
    fn test_ensure_auto_creates() {
        let registry = registry(true);
        let entry = registry.ensure(key()).unwrap();
        let guard = entry.lock();
        assert_eq!(guard.account.key, key());
        assert_eq!(guard.account.daily_limit, dec!(5000));
    }

    #[test]
    fn test_ensure_respects_auto_create_flag() {
        let registry = registry(false);
        let err = registry.ensure(key()).unwrap_err();
        assert_eq!(err.error_code(), "ACCOUNT_NOT_FOUND");

        // Explicit open works regardless of the flag.
        registry.open(key());
        assert!(registry.ensure(key()).is_ok());
    }

    #[test]
    fn test_open_is_idempotent() {
        let registry = registry(true);
        let first = registry.open(key());
        let second = registry.open(key());
        assert_eq!(first.created_at, second.created_at);
    }

    #[test]
    fn test_channel_override_applies_to_new_accounts() {
        let registry = registry(true);
        registry.configure_channel(ChannelConfig {
            channel_id: 9,
            daily_limit: dec!(100),
            monthly_limit: dec!(1000),
            auto_create_accounts: true,
            allow_negative_balance: false,
            cashback_retention_days: 7,
        });
        let account = registry.open(AccountKey {
            customer_id: 1,
            channel_id: 9,
        });
        assert_eq!(account.daily_limit, dec!(100));
        assert_eq!(registry.channel_config(9).cashback_retention_days, 7);
        // Other channels keep the defaults.
        assert_eq!(registry.channel_config(1).cashback_retention_days, 30);
    }

    #[test]
    fn test_block_and_unblock() {
        let registry = registry(true);
        registry.open(key());
        let account = registry.block(key(), "fraud review").unwrap();
        assert!(account.blocked);
        assert_eq!(account.block_reason.as_deref(), Some("fraud review"));

        let account = registry.unblock(key()).unwrap();
        assert!(!account.blocked);
        assert!(account.block_reason.is_none());
    }

    #[test]
    fn test_block_unknown_account() {
        let registry = registry(true);
        assert!(registry.block(key(), "x").is_err());
    }
}
