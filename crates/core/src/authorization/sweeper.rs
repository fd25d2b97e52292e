//! Periodic expiration sweep for balance authorizations.

use std::sync::Arc;

use chrono::Utc;
use tracing::info;

use super::service::AuthorizationService;

/// Drives authorization expiry. Polling already self-heals individual
/// authorizations; the sweep catches the ones nobody polls, so approved
/// reservations never stay stuck on customer balances.
#[derive(Debug)]
pub struct ExpirationSweeper {
    service: Arc<AuthorizationService>,
}

impl ExpirationSweeper {
    /// Creates a sweeper over the given service.
    #[must_use]
    pub fn new(service: Arc<AuthorizationService>) -> Self {
        Self { service }
    }

    /// Runs one sweep pass at the current instant. Returns how many
    /// authorizations were expired.
    pub fn tick(&self) -> usize {
        let expired = self.service.expire_due(Utc::now());
        if expired > 0 {
            info!(expired, "Authorization expiration sweep finished");
        }
        expired
    }
}
