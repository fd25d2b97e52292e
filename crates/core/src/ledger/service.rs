//! Ledger service: all balance-changing operations.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use tracing::{debug, info};
use uuid::Uuid;

use crate::account::{Account, AccountKey, AccountRegistry, BalanceSnapshot};
use crate::cashback::{CashbackRetention, RetentionStatus};
use crate::context::OperationContext;
use crate::movement::{
    codes, ExternalReference, Movement, MovementCategory, MovementDraft, MovementStatus,
    MovementTypeCatalog,
};

use super::error::LedgerError;
use super::store::{AccountEntry, LedgerStore};

/// Parameters of a credit or debit entry.
#[derive(Debug, Clone)]
pub struct EntryRequest {
    /// Target account.
    pub account: AccountKey,
    /// Movement type code; its category decides the affected bucket.
    pub type_code: String,
    /// Positive amount.
    pub amount: Decimal,
    /// Free-form description.
    pub description: String,
    /// External reference for idempotency, when present.
    pub external_reference: Option<ExternalReference>,
}

/// Filters for statement queries.
#[derive(Debug, Clone, Default)]
pub struct StatementFilter {
    /// Only movements at or after this instant.
    pub from: Option<DateTime<Utc>>,
    /// Only movements at or before this instant.
    pub to: Option<DateTime<Utc>>,
    /// Only movements of this type.
    pub type_code: Option<String>,
    /// Maximum number of movements to return. Defaults to 50.
    pub limit: Option<usize>,
}

/// Statement page size when no limit is requested.
const DEFAULT_STATEMENT_LIMIT: usize = 50;

/// The ledger service.
///
/// Every operation resolves its movement type, takes the account lock,
/// re-validates balances under that lock and appends an immutable
/// movement record. Retries carrying the same external reference and
/// type return the already-recorded movement instead of applying twice.
#[derive(Debug)]
pub struct LedgerService {
    store: Arc<LedgerStore>,
    registry: Arc<AccountRegistry>,
    catalog: Arc<MovementTypeCatalog>,
}

impl LedgerService {
    /// Creates a ledger service over the given store, registry and catalog.
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

    /// The account registry backing this ledger.
    #[must_use]
    pub fn registry(&self) -> &AccountRegistry {
        &self.registry
    }

    /// The movement type catalog backing this ledger.
    #[must_use]
    pub fn catalog(&self) -> &MovementTypeCatalog {
        &self.catalog
    }

    /// Ensures the account exists (creating it when the channel
    /// auto-creates) and returns its balances.
    ///
    /// # Errors
    ///
    /// Returns `AccountNotFound` when the account does not exist and the
    /// channel does not auto-create.
    pub fn ensure_account(&self, key: AccountKey) -> Result<BalanceSnapshot, LedgerError> {
        let entry = self.registry.ensure(key)?;
        let guard = entry.lock();
        Ok(guard.account.snapshot())
    }

    /// Current view of the account.
    ///
    /// # Errors
    ///
    /// Returns `AccountNotFound` when no account exists for the key.
    pub fn account(&self, key: AccountKey) -> Result<Account, LedgerError> {
        let entry = self.registry.get(key)?;
        let guard = entry.lock();
        Ok(guard.account.clone())
    }

    /// Current balances of the account.
    ///
    /// # Errors
    ///
    /// Returns `AccountNotFound` when no account exists for the key.
    pub fn balance_snapshot(&self, key: AccountKey) -> Result<BalanceSnapshot, LedgerError> {
        let entry = self.registry.get(key)?;
        let guard = entry.lock();
        Ok(guard.account.snapshot())
    }

    /// Credits funds into the account.
    ///
    /// Cash credits land in the cash balance. Cashback credits land in
    /// the blocked cashback bucket and open a retention tranche that the
    /// cashback sweep releases once its retention period elapses; when
    /// the channel's retention period is zero days the cashback is
    /// immediately available and no tranche is opened.
    ///
    /// # Errors
    ///
    /// Returns `InvalidMovementType` for non-credit types, `InvalidAmount`,
    /// `AccountNotFound` or `AccountInactive`.
    pub fn credit(
        &self,
        request: EntryRequest,
        ctx: &OperationContext,
    ) -> Result<Movement, LedgerError> {
        let movement_type = self.catalog.resolve(&request.type_code)?;
        if !matches!(
            movement_type.category,
            MovementCategory::Credit | MovementCategory::CashbackCredit
        ) {
            return Err(LedgerError::InvalidMovementType {
                code: request.type_code,
            });
        }
        Self::validate_amount(request.amount)?;

        let entry = self.registry.ensure(request.account)?;
        let mut guard = entry.lock();
        if let Some(existing) =
            Self::find_existing(&guard, request.external_reference.as_ref(), &movement_type.code)
        {
            debug!(movement = %existing.id, "Idempotent replay, returning recorded credit");
            return Ok(existing);
        }
        guard.account.ensure_active()?;

        let now = Utc::now();
        let movement = if movement_type.category == MovementCategory::Credit {
            let before = guard.account.balance;
            guard.account.balance += request.amount;
            Movement::record(
                MovementDraft {
                    account: request.account,
                    movement_type: &movement_type,
                    amount: request.amount,
                    balance_before: before,
                    balance_after: guard.account.balance,
                    description: request.description,
                    external_reference: request.external_reference,
                    reversal_of: None,
                },
                ctx,
                now,
            )
        } else if self
            .registry
            .channel_config(request.account.channel_id)
            .cashback_retention_days
            == 0
        {
            // Zero-day retention: immediately available, no tranche.
            let before = guard.account.cashback_available;
            guard.account.cashback_available += request.amount;
            Movement::record(
                MovementDraft {
                    account: request.account,
                    movement_type: &movement_type,
                    amount: request.amount,
                    balance_before: before,
                    balance_after: guard.account.cashback_available,
                    description: request.description,
                    external_reference: request.external_reference,
                    reversal_of: None,
                },
                ctx,
                now,
            )
        } else {
            let before = guard.account.cashback_blocked;
            guard.account.cashback_blocked += request.amount;
            let movement = Movement::record(
                MovementDraft {
                    account: request.account,
                    movement_type: &movement_type,
                    amount: request.amount,
                    balance_before: before,
                    balance_after: guard.account.cashback_blocked,
                    description: request.description,
                    external_reference: request.external_reference,
                    reversal_of: None,
                },
                ctx,
                now,
            );
            let config = self.registry.channel_config(request.account.channel_id);
            let retention = CashbackRetention {
                id: Uuid::new_v4(),
                account: request.account,
                movement_id: movement.id,
                amount: request.amount,
                status: RetentionStatus::Retained,
                retained_at: now,
                release_due_at: now + Duration::days(i64::from(config.cashback_retention_days)),
                released_at: None,
                release_reason: None,
            };
            self.store.index_retention(retention.id, request.account);
            guard.retentions.push(retention);
            movement
        };

        guard.account.updated_at = now;
        self.store.index_movement(movement.id, request.account);
        guard.movements.push(movement.clone());
        info!(
            account = %request.account,
            movement = %movement.id,
            type_code = %movement.type_code,
            amount = %movement.amount,
            "Credit applied"
        );
        Ok(movement)
    }

    /// Debits funds from the account.
    ///
    /// Cash debits draw on the available balance (total minus blocked).
    /// Cashback debits draw on the available cashback bucket only;
    /// retained cashback is never spendable.
    ///
    /// # Errors
    ///
    /// Returns `InvalidMovementType` for non-debit types, `InvalidAmount`,
    /// `AccountNotFound`, `AccountInactive`, `AccountBlocked` or
    /// `InsufficientBalance`.
    pub fn debit(
        &self,
        request: EntryRequest,
        ctx: &OperationContext,
    ) -> Result<Movement, LedgerError> {
        let movement_type = self.catalog.resolve(&request.type_code)?;
        if !matches!(
            movement_type.category,
            MovementCategory::Debit | MovementCategory::CashbackDebit
        ) {
            return Err(LedgerError::InvalidMovementType {
                code: request.type_code,
            });
        }
        Self::validate_amount(request.amount)?;

        let entry = self.registry.ensure(request.account)?;
        let mut guard = entry.lock();
        if let Some(existing) =
            Self::find_existing(&guard, request.external_reference.as_ref(), &movement_type.code)
        {
            debug!(movement = %existing.id, "Idempotent replay, returning recorded debit");
            return Ok(existing);
        }
        guard.account.ensure_operational()?;

        let now = Utc::now();
        let (before, after) = if movement_type.category == MovementCategory::Debit {
            let available = guard.account.available();
            let config = self.registry.channel_config(request.account.channel_id);
            if available < request.amount && !config.allow_negative_balance {
                return Err(LedgerError::InsufficientBalance {
                    available,
                    requested: request.amount,
                });
            }
            let before = guard.account.balance;
            guard.account.balance -= request.amount;
            (before, guard.account.balance)
        } else {
            let available = guard.account.cashback_available;
            if available < request.amount {
                return Err(LedgerError::InsufficientBalance {
                    available,
                    requested: request.amount,
                });
            }
            guard.account.cashback_available -= request.amount;
            (available, guard.account.cashback_available)
        };

        let movement = Movement::record(
            MovementDraft {
                account: request.account,
                movement_type: &movement_type,
                amount: request.amount,
                balance_before: before,
                balance_after: after,
                description: request.description,
                external_reference: request.external_reference,
                reversal_of: None,
            },
            ctx,
            now,
        );
        guard.account.updated_at = now;
        self.store.index_movement(movement.id, request.account);
        guard.movements.push(movement.clone());
        info!(
            account = %request.account,
            movement = %movement.id,
            type_code = %movement.type_code,
            amount = %movement.amount,
            "Debit applied"
        );
        Ok(movement)
    }

    /// Reserves part of the available cash balance.
    ///
    /// Audit-only: the cash balance does not change, only the blocked
    /// portion grows. The recorded movement has `balance_before ==
    /// balance_after`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidAmount`, `AccountNotFound`, `AccountInactive`,
    /// `AccountBlocked` or `InsufficientBalance`.
    pub fn block(
        &self,
        key: AccountKey,
        amount: Decimal,
        description: String,
        ctx: &OperationContext,
    ) -> Result<Movement, LedgerError> {
        let movement_type = self.catalog.resolve(codes::BLOCK)?;
        Self::validate_amount(amount)?;

        let entry = self.registry.get(key)?;
        let mut guard = entry.lock();
        guard.account.ensure_operational()?;

        let available = guard.account.available();
        if available < amount {
            return Err(LedgerError::InsufficientBalance {
                available,
                requested: amount,
            });
        }

        let now = Utc::now();
        guard.account.blocked_balance += amount;
        let movement = Movement::record(
            MovementDraft {
                account: key,
                movement_type: &movement_type,
                amount,
                balance_before: guard.account.balance,
                balance_after: guard.account.balance,
                description,
                external_reference: None,
                reversal_of: None,
            },
            ctx,
            now,
        );
        guard.account.updated_at = now;
        self.store.index_movement(movement.id, key);
        guard.movements.push(movement.clone());
        info!(account = %key, amount = %amount, "Balance blocked");
        Ok(movement)
    }

    /// Releases part of the blocked cash balance.
    ///
    /// Deliberately works on blocked and inactive accounts too: lifting
    /// a reservation never takes funds from the customer, and deny and
    /// expiry flows must always be able to run.
    ///
    /// # Errors
    ///
    /// Returns `InvalidAmount`, `AccountNotFound` or
    /// `InsufficientBlockedBalance`.
    pub fn unblock(
        &self,
        key: AccountKey,
        amount: Decimal,
        description: String,
        ctx: &OperationContext,
    ) -> Result<Movement, LedgerError> {
        let movement_type = self.catalog.resolve(codes::UNBLOCK)?;
        Self::validate_amount(amount)?;

        let entry = self.registry.get(key)?;
        let mut guard = entry.lock();
        if guard.account.blocked_balance < amount {
            return Err(LedgerError::InsufficientBlockedBalance {
                blocked: guard.account.blocked_balance,
                requested: amount,
            });
        }

        let now = Utc::now();
        guard.account.blocked_balance -= amount;
        let movement = Movement::record(
            MovementDraft {
                account: key,
                movement_type: &movement_type,
                amount,
                balance_before: guard.account.balance,
                balance_after: guard.account.balance,
                description,
                external_reference: None,
                reversal_of: None,
            },
            ctx,
            now,
        );
        guard.account.updated_at = now;
        self.store.index_movement(movement.id, key);
        guard.movements.push(movement.clone());
        info!(account = %key, amount = %amount, "Balance unblocked");
        Ok(movement)
    }

    /// Settles previously reserved funds: debits the cash balance and
    /// releases the matching reservation in one atomic step, producing
    /// the debit and unblock audit rows.
    ///
    /// # Errors
    ///
    /// Returns `InvalidMovementType` for non-debit types, `InvalidAmount`,
    /// `AccountNotFound`, `AccountInactive` or
    /// `InsufficientBlockedBalance` when the reservation does not cover
    /// the amount.
    pub fn settle_blocked(
        &self,
        request: EntryRequest,
        ctx: &OperationContext,
    ) -> Result<(Movement, Movement), LedgerError> {
        let debit_type = self.catalog.resolve(&request.type_code)?;
        if debit_type.category != MovementCategory::Debit {
            return Err(LedgerError::InvalidMovementType {
                code: request.type_code,
            });
        }
        let unblock_type = self.catalog.resolve(codes::UNBLOCK)?;
        Self::validate_amount(request.amount)?;

        let entry = self.registry.get(request.account)?;
        let mut guard = entry.lock();
        guard.account.ensure_active()?;
        if guard.account.blocked_balance < request.amount {
            return Err(LedgerError::InsufficientBlockedBalance {
                blocked: guard.account.blocked_balance,
                requested: request.amount,
            });
        }

        let now = Utc::now();
        let before = guard.account.balance;
        guard.account.balance -= request.amount;
        let debit = Movement::record(
            MovementDraft {
                account: request.account,
                movement_type: &debit_type,
                amount: request.amount,
                balance_before: before,
                balance_after: guard.account.balance,
                description: request.description,
                external_reference: request.external_reference,
                reversal_of: None,
            },
            ctx,
            now,
        );
        guard.account.blocked_balance -= request.amount;
        let unblock = Movement::record(
            MovementDraft {
                account: request.account,
                movement_type: &unblock_type,
                amount: request.amount,
                balance_before: guard.account.balance,
                balance_after: guard.account.balance,
                description: "Release of settled reservation".to_string(),
                external_reference: None,
                reversal_of: None,
            },
            ctx,
            now,
        );

        guard.account.updated_at = now;
        self.store.index_movement(debit.id, request.account);
        self.store.index_movement(unblock.id, request.account);
        guard.movements.push(debit.clone());
        guard.movements.push(unblock.clone());
        info!(
            account = %request.account,
            amount = %request.amount,
            "Reserved funds settled"
        );
        Ok((debit, unblock))
    }

    /// Reverses a processed movement, restoring the funds it moved.
    ///
    /// Cash credits claw back from the available balance; cash debits
    /// are credited back. Reversing a still-retained cashback accrual
    /// cancels the retention tranche; once released, the claw-back draws
    /// on available cashback. The original movement is marked reversed
    /// and the inverse movement links back to it.
    ///
    /// # Errors
    ///
    /// Returns `MovementNotFound`, `InvalidState` when the movement is
    /// not in processed state, `TypeNotReversible` or
    /// `InsufficientBalanceForReversal`.
    pub fn reverse(
        &self,
        movement_id: Uuid,
        reason: &str,
        ctx: &OperationContext,
    ) -> Result<Movement, LedgerError> {
        let key = self
            .store
            .movement_account(movement_id)
            .ok_or(LedgerError::MovementNotFound { id: movement_id })?;
        let entry = self.registry.get(key)?;
        let mut guard = entry.lock();

        let index = guard
            .movements
            .iter()
            .position(|m| m.id == movement_id)
            .ok_or(LedgerError::MovementNotFound { id: movement_id })?;
        let original = guard.movements[index].clone();
        if original.status != MovementStatus::Processed {
            return Err(LedgerError::InvalidState {
                detail: format!("movement {movement_id} is {}", original.status),
            });
        }
        let original_type = self
            .catalog
            .get(&original.type_code)
            .ok_or_else(|| LedgerError::InvalidMovementType {
                code: original.type_code.clone(),
            })?;
        if !original_type.reversible {
            return Err(LedgerError::TypeNotReversible {
                code: original.type_code,
            });
        }

        let amount = original.amount;
        let (before, after) = match original.category {
            MovementCategory::Credit => {
                let available = guard.account.available();
                if available < amount {
                    return Err(LedgerError::InsufficientBalanceForReversal {
                        available,
                        requested: amount,
                    });
                }
                let before = guard.account.balance;
                guard.account.balance -= amount;
                (before, guard.account.balance)
            }
            MovementCategory::Debit => {
                let before = guard.account.balance;
                guard.account.balance += amount;
                (before, guard.account.balance)
            }
            MovementCategory::CashbackCredit => {
                let retained = guard
                    .retentions
                    .iter()
                    .position(|r| {
                        r.movement_id == movement_id && r.status == RetentionStatus::Retained
                    });
                if let Some(retention_index) = retained {
                    let now = Utc::now();
                    let retention = &mut guard.retentions[retention_index];
                    retention.status = RetentionStatus::Cancelled;
                    retention.released_at = Some(now);
                    retention.release_reason = Some(format!("reversal: {reason}"));
                    let before = guard.account.cashback_blocked;
                    guard.account.cashback_blocked -= amount;
                    (before, guard.account.cashback_blocked)
                } else {
                    let available = guard.account.cashback_available;
                    if available < amount {
                        return Err(LedgerError::InsufficientBalanceForReversal {
                            available,
                            requested: amount,
                        });
                    }
                    guard.account.cashback_available -= amount;
                    (available, guard.account.cashback_available)
                }
            }
            MovementCategory::CashbackDebit => {
                let before = guard.account.cashback_available;
                guard.account.cashback_available += amount;
                (before, guard.account.cashback_available)
            }
            _ => {
                return Err(LedgerError::TypeNotReversible {
                    code: original.type_code,
                });
            }
        };

        let now = Utc::now();
        let reversal_type = self.catalog.resolve(codes::REVERSAL)?;
        let reversal = Movement::record(
            MovementDraft {
                account: key,
                movement_type: &reversal_type,
                amount,
                balance_before: before,
                balance_after: after,
                description: format!("Reversal of {}: {reason}", original.type_code),
                external_reference: None,
                reversal_of: Some(movement_id),
            },
            ctx,
            now,
        );
        guard.movements[index].status = MovementStatus::Reversed;
        guard.account.updated_at = now;
        self.store.index_movement(reversal.id, key);
        guard.movements.push(reversal.clone());
        info!(
            account = %key,
            original = %movement_id,
            reversal = %reversal.id,
            amount = %amount,
            "Movement reversed"
        );
        Ok(reversal)
    }

    /// Looks up a movement by id.
    ///
    /// # Errors
    ///
    /// Returns `MovementNotFound`.
    pub fn movement(&self, movement_id: Uuid) -> Result<Movement, LedgerError> {
        let key = self
            .store
            .movement_account(movement_id)
            .ok_or(LedgerError::MovementNotFound { id: movement_id })?;
        let entry = self.registry.get(key)?;
        let guard = entry.lock();
        guard
            .movements
            .iter()
            .find(|m| m.id == movement_id)
            .cloned()
            .ok_or(LedgerError::MovementNotFound { id: movement_id })
    }

    /// Customer-facing statement: visible movements, newest first.
    ///
    /// Block and unblock audit rows are hidden; every other movement
    /// type appears unless its catalog entry opts out.
    ///
    /// # Errors
    ///
    /// Returns `AccountNotFound` when no account exists for the key.
    pub fn statement(
        &self,
        key: AccountKey,
        filter: &StatementFilter,
    ) -> Result<Vec<Movement>, LedgerError> {
        let entry = self.registry.get(key)?;
        let guard = entry.lock();
        let limit = filter.limit.unwrap_or(DEFAULT_STATEMENT_LIMIT);
        let movements = guard
            .movements
            .iter()
            .rev()
            .filter(|m| self.is_visible(m))
            .filter(|m| filter.from.is_none_or(|from| m.created_at >= from))
            .filter(|m| filter.to.is_none_or(|to| m.created_at <= to))
            .filter(|m| {
                filter
                    .type_code
                    .as_ref()
                    .is_none_or(|code| &m.type_code == code)
            })
            .take(limit)
            .cloned()
            .collect();
        Ok(movements)
    }

    fn is_visible(&self, movement: &Movement) -> bool {
        self.catalog
            .get(&movement.type_code)
            .is_none_or(|t| t.visible_in_statement)
    }

    fn validate_amount(amount: Decimal) -> Result<(), LedgerError> {
        if amount <= Decimal::ZERO {
            return Err(LedgerError::InvalidAmount { amount });
        }
        Ok(())
    }

    fn find_existing(
        entry: &AccountEntry,
        reference: Option<&ExternalReference>,
        type_code: &str,
    ) -> Option<Movement> {
        let reference = reference?;
        entry
            .movements
            .iter()
            .find(|m| m.matches_reference(reference, type_code))
            .cloned()
    }
}
