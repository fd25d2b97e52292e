//! Movement type catalog.

use dashmap::DashMap;

use super::types::{MovementCategory, MovementType};
use crate::ledger::LedgerError;

/// Built-in movement type codes.
pub mod codes {
    /// Generic cash credit.
    pub const CREDIT: &str = "CREDIT";
    /// Generic cash debit.
    pub const DEBIT: &str = "DEBIT";
    /// Cashback accrual (retained until release).
    pub const CASHBACK_CREDIT: &str = "CASHBACK_CREDIT";
    /// Cashback redemption.
    pub const CASHBACK_DEBIT: &str = "CASHBACK_DEBIT";
    /// Scheduled release of retained cashback.
    pub const CASHBACK_RELEASE: &str = "CASHBACK_RELEASE";
    /// Balance reservation (audit-only).
    pub const BLOCK: &str = "BLOCK";
    /// Balance reservation release (audit-only).
    pub const UNBLOCK: &str = "UNBLOCK";
    /// Inverse movement produced by a reversal.
    pub const REVERSAL: &str = "REVERSAL";
}

/// Registry of movement types, keyed by code.
///
/// Ships with the built-in types every deployment needs; channels may
/// register additional types at runtime as long as they fit one of the
/// closed [`MovementCategory`] variants.
#[derive(Debug, Default)]
pub struct MovementTypeCatalog {
    types: DashMap<String, MovementType>,
}

impl MovementTypeCatalog {
    /// Creates an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a catalog pre-populated with the built-in types.
    #[must_use]
    pub fn with_defaults() -> Self {
        let catalog = Self::new();
        let defaults = [
            (codes::CREDIT, "Account credit", MovementCategory::Credit, true, true),
            (codes::DEBIT, "Account debit", MovementCategory::Debit, true, true),
            (
                codes::CASHBACK_CREDIT,
                "Cashback accrual",
                MovementCategory::CashbackCredit,
                true,
                true,
            ),
            (
                codes::CASHBACK_DEBIT,
                "Cashback redemption",
                MovementCategory::CashbackDebit,
                true,
                true,
            ),
            (
                codes::CASHBACK_RELEASE,
                "Cashback retention release",
                MovementCategory::CashbackRelease,
                false,
                true,
            ),
            (codes::BLOCK, "Balance block", MovementCategory::Block, false, false),
            (codes::UNBLOCK, "Balance unblock", MovementCategory::Unblock, false, false),
            (
                codes::REVERSAL,
                "Movement reversal",
                MovementCategory::Reversal,
                false,
                true,
            ),
        ];
        for (code, name, category, reversible, visible) in defaults {
            catalog.register(MovementType {
                code: code.to_string(),
                name: name.to_string(),
                category,
                reversible,
                visible_in_statement: visible,
                active: true,
            });
        }
        catalog
    }

    /// Registers (or replaces) a movement type.
    pub fn register(&self, movement_type: MovementType) {
        self.types
            .insert(movement_type.code.clone(), movement_type);
    }

    /// Resolves an active movement type by code.
    ///
    /// # Errors
    ///
    /// Returns `InvalidMovementType` if the code is unknown or inactive.
    pub fn resolve(&self, code: &str) -> Result<MovementType, LedgerError> {
        self.types
            .get(code)
            .filter(|t| t.active)
            .map(|t| t.clone())
            .ok_or_else(|| LedgerError::InvalidMovementType {
                code: code.to_string(),
            })
    }

    /// Looks up a type by code, active or not.
    #[must_use]
    pub fn get(&self, code: &str) -> Option<MovementType> {
        self.types.get(code).map(|t| t.clone())
    }

    /// Deactivates a movement type. Existing movements keep their code;
    /// new movements of this type are rejected.
    pub fn deactivate(&self, code: &str) {
        if let Some(mut entry) = self.types.get_mut(code) {
            entry.active = false;
        }
    }

    /// Lists all registered types, active or not.
    #[must_use]
    pub fn list(&self) -> Vec<MovementType> {
        let mut types: Vec<_> = self.types.iter().map(|e| e.clone()).collect();
        types.sort_by(|a, b| a.code.cmp(&b.code));
        types
    }
}
