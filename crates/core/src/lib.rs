//! Core business logic for the wallet backend.
//!
//! Pure domain crate with ZERO web or storage dependencies. It implements:
//! - The per-(customer, channel) account ledger with balance, blocked
//!   balance and cashback buckets
//! - The movement type catalog (closed category set)
//! - Cashback retention and scheduled release
//! - The POS balance-authorization state machine and its expiration sweep
//!
//! All state lives in process behind per-account locks. Every balance
//! mutation produces an immutable [`movement::Movement`] audit record.

pub mod account;
pub mod authorization;
pub mod cashback;
pub mod context;
pub mod ledger;
pub mod movement;

pub use account::{Account, AccountKey, AccountRegistry, BalanceSnapshot, ChannelConfig};
pub use authorization::{
    AuthorizationError, AuthorizationEvent, AuthorizationNotifier, AuthorizationService,
    AuthorizationStatus, BalanceAuthorization, ExpirationSweeper, LogNotifier,
};
pub use cashback::{CashbackRetention, CashbackRetentionManager, CashbackSweeper, RetentionStatus};
pub use context::OperationContext;
pub use ledger::{EntryRequest, LedgerError, LedgerService, LedgerStore, StatementFilter};
pub use movement::{
    ExternalReference, Movement, MovementCategory, MovementStatus, MovementType,
    MovementTypeCatalog,
};
