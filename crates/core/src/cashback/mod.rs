//! Cashback retention and scheduled release.

mod manager;
mod sweeper;
mod types;

pub use manager::{CashbackRetentionManager, SweepOutcome};
pub use sweeper::CashbackSweeper;
pub use types::{CashbackRetention, RetentionStatus};
