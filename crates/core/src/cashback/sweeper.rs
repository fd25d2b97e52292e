//! Periodic cashback retention sweep.

use std::sync::Arc;

use chrono::Utc;

use super::manager::{CashbackRetentionManager, SweepOutcome};

/// Drives the scheduled cashback release. The server runs [`tick`]
/// on an interval; each tick releases every tranche whose retention
/// period has elapsed.
///
/// [`tick`]: CashbackSweeper::tick
#[derive(Debug)]
pub struct CashbackSweeper {
    manager: Arc<CashbackRetentionManager>,
}

impl CashbackSweeper {
    /// Creates a sweeper over the given manager.
    #[must_use]
    pub fn new(manager: Arc<CashbackRetentionManager>) -> Self {
        Self { manager }
    }

    /// Runs one sweep pass at the current instant.
    pub fn tick(&self) -> SweepOutcome {
        self.manager.sweep_due(Utc::now())
    }
}
