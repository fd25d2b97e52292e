//! The account ledger: movements, balances and reversals.

mod error;
mod service;
pub mod store;

pub use error::LedgerError;
pub use service::{EntryRequest, LedgerService, StatementFilter};
pub use store::{AccountEntry, LedgerStore, SharedEntry};

#[cfg(test)]
mod service_props;
