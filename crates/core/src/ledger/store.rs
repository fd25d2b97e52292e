//! In-process ledger storage.
//!
//! Accounts live behind per-account mutexes inside a concurrent map.
//! Every read-modify-write of an account happens under its own lock, so
//! balance checks and movement appends are atomic per account without a
//! global lock. Secondary indexes map movement and retention ids back
//! to their owning account.

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use uuid::Uuid;

use crate::account::{Account, AccountKey};
use crate::cashback::CashbackRetention;
use crate::movement::Movement;

/// Everything the ledger holds for one account, guarded by one lock.
#[derive(Debug)]
pub struct AccountEntry {
    /// The account itself.
    pub account: Account,
    /// Append-only movement history, oldest first.
    pub movements: Vec<Movement>,
    /// Cashback retentions, open and settled.
    pub retentions: Vec<CashbackRetention>,
}

impl AccountEntry {
    /// Wraps a fresh account with empty history.
    #[must_use]
    pub fn new(account: Account) -> Self {
        Self {
            account,
            movements: Vec::new(),
            retentions: Vec::new(),
        }
    }
}

/// Shared handle to a locked account entry.
pub type SharedEntry = Arc<Mutex<AccountEntry>>;

/// Concurrent in-process store for accounts and their history.
#[derive(Debug, Default)]
pub struct LedgerStore {
    accounts: DashMap<AccountKey, SharedEntry>,
    movement_index: DashMap<Uuid, AccountKey>,
    retention_index: DashMap<Uuid, AccountKey>,
}

impl LedgerStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up an account entry.
    #[must_use]
    pub fn get(&self, key: AccountKey) -> Option<SharedEntry> {
        self.accounts.get(&key).map(|e| Arc::clone(e.value()))
    }

    /// Returns the entry for `key`, inserting a new one built by
    /// `make_account` if absent. The boolean is true when the account
    /// was created by this call.
    pub fn get_or_insert_with<F>(&self, key: AccountKey, make_account: F) -> (SharedEntry, bool)
    where
        F: FnOnce() -> Account,
    {
        let mut created = false;
        let entry = self
            .accounts
            .entry(key)
            .or_insert_with(|| {
                created = true;
                Arc::new(Mutex::new(AccountEntry::new(make_account())))
            })
            .clone();
        (entry, created)
    }

    /// Whether an account exists for the key.
    #[must_use]
    pub fn contains(&self, key: AccountKey) -> bool {
        self.accounts.contains_key(&key)
    }

    /// All account keys currently in the store.
    #[must_use]
    pub fn keys(&self) -> Vec<AccountKey> {
        self.accounts.iter().map(|e| *e.key()).collect()
    }

    /// Records which account owns a movement.
    pub fn index_movement(&self, movement_id: Uuid, key: AccountKey) {
        self.movement_index.insert(movement_id, key);
    }

    /// Account owning the given movement.
    #[must_use]
    pub fn movement_account(&self, movement_id: Uuid) -> Option<AccountKey> {
        self.movement_index.get(&movement_id).map(|e| *e.value())
    }

    /// Records which account owns a cashback retention.
    pub fn index_retention(&self, retention_id: Uuid, key: AccountKey) {
        self.retention_index.insert(retention_id, key);
    }

    /// Account owning the given cashback retention.
    #[must_use]
    pub fn retention_account(&self, retention_id: Uuid) -> Option<AccountKey> {
        self.retention_index.get(&retention_id).map(|e| *e.value())
    }
}
