//! Property-based tests for the ledger service.

use std::sync::Arc;

use proptest::prelude::*;
use rust_decimal::Decimal;

use wallet_shared::WalletSettings;

use crate::account::{AccountKey, AccountRegistry};
use crate::context::OperationContext;
use crate::ledger::{EntryRequest, LedgerService, LedgerStore};
use crate::movement::{codes, MovementTypeCatalog};

fn build_service() -> Arc<LedgerService> {
    let store = Arc::new(LedgerStore::new());
    let registry = Arc::new(AccountRegistry::new(
        Arc::clone(&store),
        WalletSettings::default(),
    ));
    let catalog = Arc::new(MovementTypeCatalog::with_defaults());
    Arc::new(LedgerService::new(store, registry, catalog))
}

fn key() -> AccountKey {
    AccountKey {
        customer_id: 1,
        channel_id: 1,
    }
}

fn ctx() -> OperationContext {
    OperationContext::system("PROPTEST")
}

fn entry(type_code: &str, cents: i64) -> EntryRequest {
    EntryRequest {
        account: key(),
        type_code: type_code.to_string(),
        amount: Decimal::new(cents, 2),
        description: "prop".to_string(),
        external_reference: None,
    }
}

/// One step of a random ledger workload.
#[derive(Debug, Clone)]
enum Op {
    Credit(i64),
    Debit(i64),
    Block(i64),
    Unblock(i64),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (1i64..=100_000).prop_map(Op::Credit),
        (1i64..=100_000).prop_map(Op::Debit),
        (1i64..=100_000).prop_map(Op::Block),
        (1i64..=100_000).prop_map(Op::Unblock),
    ]
}

proptest! {
    /// The recorded movement chain always carries consistent snapshots:
    /// each applied movement's delta matches its amount and direction.
    #[test]
    fn prop_movement_snapshots_are_consistent(ops in prop::collection::vec(op_strategy(), 1..60)) {
        let service = build_service();
        let context = ctx();

        for op in ops {
            let result = match op {
                Op::Credit(cents) => service.credit(entry(codes::CREDIT, cents), &context),
                Op::Debit(cents) => service.debit(entry(codes::DEBIT, cents), &context),
                Op::Block(cents) => service.block(
                    key(),
                    Decimal::new(cents, 2),
                    "hold".to_string(),
                    &context,
                ),
                Op::Unblock(cents) => service.unblock(
                    key(),
                    Decimal::new(cents, 2),
                    "release".to_string(),
                    &context,
                ),
            };
            if let Ok(movement) = result {
                match movement.type_code.as_str() {
                    "CREDIT" => prop_assert_eq!(
                        movement.balance_after - movement.balance_before,
                        movement.amount
                    ),
                    "DEBIT" => prop_assert_eq!(
                        movement.balance_before - movement.balance_after,
                        movement.amount
                    ),
                    // Audit-only rows never move the balance.
                    _ => prop_assert_eq!(movement.balance_before, movement.balance_after),
                }
            }
        }
    }

    /// Whatever the workload, the account never violates its structural
    /// invariants: no negative buckets, blocked never exceeds balance.
    #[test]
    fn prop_buckets_never_go_negative(ops in prop::collection::vec(op_strategy(), 1..60)) {
        let service = build_service();
        let context = ctx();
        service.ensure_account(key()).unwrap();

        for op in ops {
            let _ = match op {
                Op::Credit(cents) => service.credit(entry(codes::CREDIT, cents), &context),
                Op::Debit(cents) => service.debit(entry(codes::DEBIT, cents), &context),
                Op::Block(cents) => service.block(
                    key(),
                    Decimal::new(cents, 2),
                    "hold".to_string(),
                    &context,
                ),
                Op::Unblock(cents) => service.unblock(
                    key(),
                    Decimal::new(cents, 2),
                    "release".to_string(),
                    &context,
                ),
            };
            let snapshot = service.balance_snapshot(key()).unwrap();
            prop_assert!(snapshot.balance >= Decimal::ZERO);
            prop_assert!(snapshot.blocked_balance >= Decimal::ZERO);
            prop_assert!(snapshot.blocked_balance <= snapshot.balance);
            prop_assert_eq!(snapshot.available, snapshot.balance - snapshot.blocked_balance);
        }
    }

    /// Crediting then reversing is always a no-op on the balance.
    #[test]
    fn prop_reversal_restores_balance(cents in 1i64..=1_000_000) {
        let service = build_service();
        let context = ctx();

        let before = Decimal::ZERO;
        let movement = service.credit(entry(codes::CREDIT, cents), &context).unwrap();
        service.reverse(movement.id, "prop", &context).unwrap();
        let snapshot = service.balance_snapshot(key()).unwrap();
        prop_assert_eq!(snapshot.balance, before);
    }
}
