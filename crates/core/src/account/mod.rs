//! Accounts, balance snapshots and the account registry.

mod registry;
mod types;

pub use registry::{AccountRegistry, ChannelCatalog};
pub use types::{Account, AccountKey, BalanceSnapshot, ChannelConfig};
