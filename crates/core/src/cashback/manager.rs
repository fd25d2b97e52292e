//! Cashback retention manager: release and scheduled sweep.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use crate::account::{AccountKey, AccountRegistry};
use crate::context::OperationContext;
use crate::ledger::{AccountEntry, LedgerError, LedgerStore};
use crate::movement::{codes, Movement, MovementDraft, MovementTypeCatalog};

use super::types::{CashbackRetention, RetentionStatus};

/// Result of one retention sweep pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepOutcome {
    /// Tranches released this pass.
    pub released: usize,
    /// Tranches that were due but could not be released. They stay
    /// retained and are retried next pass.
    pub errors: usize,
}

/// Releases retained cashback tranches once their retention period
/// elapses, moving funds from the blocked to the available bucket and
/// recording a release movement for each tranche.
#[derive(Debug)]
pub struct CashbackRetentionManager {
    store: Arc<LedgerStore>,
    registry: Arc<AccountRegistry>,
    catalog: Arc<MovementTypeCatalog>,
}

impl CashbackRetentionManager {
    /// Creates a manager over the given store, registry and catalog.
    #[must_use]
    pub fn new(
        store: Arc<LedgerStore>,
        registry: Arc<AccountRegistry>,
        catalog: Arc<MovementTypeCatalog>,
    ) -> Self {
        Self {
            store,
            registry,
            catalog,
        }
    }

    /// Releases a due tranche.
    ///
    /// # Errors
    ///
    /// Returns `RetentionNotFound`, `RetentionNotYetDue` when the
    /// release date has not arrived, or `InvalidState` when the tranche
    /// is no longer retained.
    pub fn release(
        &self,
        retention_id: Uuid,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<CashbackRetention, LedgerError> {
        self.release_inner(retention_id, reason, now, true)
    }

    /// Releases a tranche before its due date (promotions, goodwill).
    ///
    /// # Errors
    ///
    /// Returns `RetentionNotFound` or `InvalidState` when the tranche is
    /// no longer retained.
    pub fn release_early(
        &self,
        retention_id: Uuid,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<CashbackRetention, LedgerError> {
        self.release_inner(retention_id, reason, now, false)
    }

    fn release_inner(
        &self,
        retention_id: Uuid,
        reason: &str,
        now: DateTime<Utc>,
        enforce_due: bool,
    ) -> Result<CashbackRetention, LedgerError> {
        let key = self
            .store
            .retention_account(retention_id)
            .ok_or(LedgerError::RetentionNotFound { id: retention_id })?;
        let entry = self.registry.get(key)?;
        let mut guard = entry.lock();

        let index = guard
            .retentions
            .iter()
            .position(|r| r.id == retention_id)
            .ok_or(LedgerError::RetentionNotFound { id: retention_id })?;
        let retention = &guard.retentions[index];
        if retention.status != RetentionStatus::Retained {
            return Err(LedgerError::InvalidState {
                detail: format!("retention {retention_id} is {}", retention.status),
            });
        }
        if enforce_due && retention.release_due_at > now {
            return Err(LedgerError::RetentionNotYetDue {
                due_at: retention.release_due_at,
            });
        }

        self.release_at(&mut guard, index, reason, now)
    }

    /// Releases every due tranche across all accounts. Each account is
    /// processed under its own lock; one account failing does not stop
    /// the others.
    pub fn sweep_due(&self, now: DateTime<Utc>) -> SweepOutcome {
        let mut outcome = SweepOutcome::default();
        for key in self.store.keys() {
            let Some(entry) = self.store.get(key) else {
                continue;
            };
            let mut guard = entry.lock();
            loop {
                let Some(index) = guard.retentions.iter().position(|r| r.is_due(now)) else {
                    break;
                };
                match self.release_at(&mut guard, index, "scheduled release", now) {
                    Ok(_) => outcome.released += 1,
                    Err(error) => {
                        warn!(account = %key, %error, "Cashback release failed, will retry");
                        outcome.errors += 1;
                        break;
                    }
                }
            }
        }
        if outcome.released > 0 || outcome.errors > 0 {
            info!(
                released = outcome.released,
                errors = outcome.errors,
                "Cashback retention sweep finished"
            );
        }
        outcome
    }

    /// All retention tranches of an account, open and settled.
    ///
    /// # Errors
    ///
    /// Returns `AccountNotFound` when no account exists for the key.
    pub fn retentions(&self, key: AccountKey) -> Result<Vec<CashbackRetention>, LedgerError> {
        let entry = self.registry.get(key)?;
        let guard = entry.lock();
        Ok(guard.retentions.clone())
    }

    fn release_at(
        &self,
        guard: &mut AccountEntry,
        index: usize,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<CashbackRetention, LedgerError> {
        let amount = guard.retentions[index].amount;
        if guard.account.cashback_blocked < amount {
            return Err(LedgerError::InvalidState {
                detail: format!(
                    "retained cashback {} does not cover tranche of {amount}",
                    guard.account.cashback_blocked
                ),
            });
        }

        let release_type = self.catalog.resolve(codes::CASHBACK_RELEASE)?;
        let key = guard.account.key;
        let before = guard.account.cashback_available;
        guard.account.cashback_blocked -= amount;
        guard.account.cashback_available += amount;
        guard.account.updated_at = now;

        let movement = Movement::record(
            MovementDraft {
                account: key,
                movement_type: &release_type,
                amount,
                balance_before: before,
                balance_after: guard.account.cashback_available,
                description: format!("Cashback release: {reason}"),
                external_reference: None,
                reversal_of: None,
            },
            &OperationContext::system("CASHBACK_SWEEPER"),
            now,
        );
        self.store.index_movement(movement.id, key);
        guard.movements.push(movement);

        let retention = &mut guard.retentions[index];
        retention.status = RetentionStatus::Released;
        retention.released_at = Some(now);
        retention.release_reason = Some(reason.to_string());
        info!(
            account = %key,
            retention = %retention.id,
            amount = %amount,
            reason,
            "Cashback tranche released"
        );
        Ok(retention.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::{AccountRegistry, ChannelConfig};
    use crate::context::OperationContext;
    use crate::ledger::{EntryRequest, LedgerService, StatementFilter};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use wallet_shared::WalletSettings;

    struct Fixture {
        service: Arc<LedgerService>,
        manager: CashbackRetentionManager,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(LedgerStore::new());
        let registry = Arc::new(AccountRegistry::new(
            Arc::clone(&store),
            WalletSettings::default(),
        ));
        let catalog = Arc::new(MovementTypeCatalog::with_defaults());
        let service = Arc::new(LedgerService::new(
            Arc::clone(&store),
            Arc::clone(&registry),
            Arc::clone(&catalog),
        ));
        let manager = CashbackRetentionManager::new(store, registry, catalog);
        Fixture { service, manager }
    }

    fn key() -> AccountKey {
        AccountKey {
            customer_id: 5,
            channel_id: 1,
        }
    }

    fn accrue(fixture: &Fixture, amount: Decimal) -> Uuid {
        let movement = fixture
            .service
            .credit(
                EntryRequest {
                    account: key(),
                    type_code: codes::CASHBACK_CREDIT.to_string(),
                    amount,
                    description: "purchase cashback".to_string(),
                    external_reference: None,
                },
                &OperationContext::system("TEST"),
            )
            .unwrap();
        let retentions = fixture.manager.retentions(key()).unwrap();
        retentions
            .iter()
            .find(|r| r.movement_id == movement.id)
            .unwrap()
            .id
    }

    #[test]
    fn test_release_before_due_rejected() {
        let fixture = fixture();
        let retention_id = accrue(&fixture, dec!(10));
        let err = fixture
            .manager
            .release(retention_id, "impatient", Utc::now())
            .unwrap_err();
        assert_eq!(err.error_code(), "NOT_YET_DUE");
    }

    #[test]
    fn test_release_early_moves_funds() {
        let fixture = fixture();
        let retention_id = accrue(&fixture, dec!(10));
        let released = fixture
            .manager
            .release_early(retention_id, "promo", Utc::now())
            .unwrap();
        assert_eq!(released.status, RetentionStatus::Released);
        assert_eq!(released.release_reason.as_deref(), Some("promo"));

        let snapshot = fixture.service.balance_snapshot(key()).unwrap();
        assert_eq!(snapshot.cashback_available, dec!(10));
        assert_eq!(snapshot.cashback_blocked, dec!(0));

        // The release shows up in the statement.
        let statement = fixture
            .service
            .statement(key(), &StatementFilter::default())
            .unwrap();
        assert_eq!(statement[0].type_code, codes::CASHBACK_RELEASE);
    }

    #[test]
    fn test_release_after_due_date() {
        let fixture = fixture();
        let retention_id = accrue(&fixture, dec!(10));
        let later = Utc::now() + chrono::Duration::days(31);
        assert!(fixture.manager.release(retention_id, "due", later).is_ok());
    }

    #[test]
    fn test_release_twice_rejected() {
        let fixture = fixture();
        let retention_id = accrue(&fixture, dec!(10));
        fixture
            .manager
            .release_early(retention_id, "promo", Utc::now())
            .unwrap();
        let err = fixture
            .manager
            .release_early(retention_id, "again", Utc::now())
            .unwrap_err();
        assert_eq!(err.error_code(), "INVALID_STATE");
    }

    #[test]
    fn test_release_unknown_retention() {
        let fixture = fixture();
        let err = fixture
            .manager
            .release_early(Uuid::new_v4(), "ghost", Utc::now())
            .unwrap_err();
        assert_eq!(err.error_code(), "RETENTION_NOT_FOUND");
    }

    #[test]
    fn test_sweep_releases_only_due_tranches() {
        let fixture = fixture();
        // Channel 2 retains for a single day.
        fixture.service.registry().configure_channel(ChannelConfig {
            channel_id: 2,
            daily_limit: dec!(5000),
            monthly_limit: dec!(50000),
            auto_create_accounts: true,
            allow_negative_balance: false,
            cashback_retention_days: 1,
        });
        let due_key = AccountKey {
            customer_id: 5,
            channel_id: 2,
        };
        fixture
            .service
            .credit(
                EntryRequest {
                    account: due_key,
                    type_code: codes::CASHBACK_CREDIT.to_string(),
                    amount: dec!(7),
                    description: "cashback".to_string(),
                    external_reference: None,
                },
                &OperationContext::system("TEST"),
            )
            .unwrap();
        accrue(&fixture, dec!(10)); // 30-day retention, not due

        // Two days later the 1-day tranche is due, the 30-day one is not.
        let sweep_at = Utc::now() + chrono::Duration::days(2);
        let outcome = fixture.manager.sweep_due(sweep_at);
        assert_eq!(outcome.released, 1);
        assert_eq!(outcome.errors, 0);

        assert_eq!(
            fixture
                .service
                .balance_snapshot(due_key)
                .unwrap()
                .cashback_available,
            dec!(7)
        );
        assert_eq!(
            fixture
                .service
                .balance_snapshot(key())
                .unwrap()
                .cashback_available,
            dec!(0)
        );

        // Nothing left to do on the next pass.
        assert_eq!(fixture.manager.sweep_due(sweep_at), SweepOutcome::default());
    }

    #[test]
    fn test_released_cashback_is_spendable() {
        let fixture = fixture();
        let retention_id = accrue(&fixture, dec!(10));
        fixture
            .manager
            .release_early(retention_id, "promo", Utc::now())
            .unwrap();

        fixture
            .service
            .debit(
                EntryRequest {
                    account: key(),
                    type_code: codes::CASHBACK_DEBIT.to_string(),
                    amount: dec!(4),
                    description: "redeem".to_string(),
                    external_reference: None,
                },
                &OperationContext::system("TEST"),
            )
            .unwrap();
        assert_eq!(
            fixture
                .service
                .balance_snapshot(key())
                .unwrap()
                .cashback_available,
            dec!(6)
        );
    }
}
