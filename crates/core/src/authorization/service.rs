//! Balance authorization service.
//!
//! Orchestrates the POS authorization lifecycle on top of the ledger.
//! Lock order is authorization first, account second; the ledger takes
//! its own account lock per call and never reaches back into this
//! service, so the order cannot invert.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use tracing::{info, warn};
use uuid::Uuid;

use wallet_shared::AuthorizationSettings;

use crate::account::AccountKey;
use crate::context::OperationContext;
use crate::ledger::{EntryRequest, LedgerError, LedgerService};
use crate::movement::{codes, ExternalReference};

use super::error::AuthorizationError;
use super::types::{AuthorizationStatus, BalanceAuthorization};

/// Lifecycle events emitted by the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthorizationEvent {
    /// Authorization created, waiting for approval.
    Created,
    /// Customer approved; funds reserved.
    Approved,
    /// Authorization denied.
    Denied,
    /// POS settled the authorization.
    Completed,
    /// Settlement reversed.
    Reversed,
    /// Authorization timed out.
    Expired,
}

/// Receives lifecycle events, e.g. to push notifications to the
/// customer's app.
pub trait AuthorizationNotifier: Send + Sync + std::fmt::Debug {
    /// Called after the corresponding state change has been committed.
    fn notify(&self, event: AuthorizationEvent, authorization: &BalanceAuthorization);
}

/// Notifier that only writes a log line per event.
#[derive(Debug, Default)]
pub struct LogNotifier;

impl AuthorizationNotifier for LogNotifier {
    fn notify(&self, event: AuthorizationEvent, authorization: &BalanceAuthorization) {
        info!(
            authorization = %authorization.id,
            account = %authorization.account,
            amount = %authorization.amount,
            status = %authorization.status,
            ?event,
            "Authorization event"
        );
    }
}

/// The POS balance-authorization service.
///
/// Holds every authorization behind its own lock, with an NSU index for
/// settlement and reversal lookups. Funds move only through the ledger:
/// approval blocks, settlement settles the blocked amount, denial and
/// expiry unblock, reversal reverses the settlement debit.
#[derive(Debug)]
pub struct AuthorizationService {
    ledger: Arc<LedgerService>,
    authorizations: DashMap<Uuid, Arc<Mutex<BalanceAuthorization>>>,
    nsu_index: DashMap<String, Uuid>,
    pending_ttl: Duration,
    approved_ttl: Duration,
    notifier: Arc<dyn AuthorizationNotifier>,
}

impl AuthorizationService {
    /// Creates an authorization service over the given ledger.
    #[must_use]
    pub fn new(
        ledger: Arc<LedgerService>,
        settings: &AuthorizationSettings,
        notifier: Arc<dyn AuthorizationNotifier>,
    ) -> Self {
        Self {
            ledger,
            authorizations: DashMap::new(),
            nsu_index: DashMap::new(),
            pending_ttl: seconds(settings.pending_ttl_secs),
            approved_ttl: seconds(settings.approved_ttl_secs),
            notifier,
        }
    }

    /// Creates a PENDING authorization for the account.
    ///
    /// The account is created lazily when the channel auto-creates. The
    /// balance check here is advisory and counts everything the
    /// customer could spend, available cashback included; the binding
    /// check happens when approval reserves the funds.
    ///
    /// # Errors
    ///
    /// Returns `InvalidAmount`, `AccountNotFound`, `AccountInactive`,
    /// `AccountBlocked` or `InsufficientBalance`.
    pub fn create(
        &self,
        key: AccountKey,
        amount: Decimal,
        terminal: &str,
        ctx: &OperationContext,
    ) -> Result<BalanceAuthorization, AuthorizationError> {
        if amount <= Decimal::ZERO {
            return Err(LedgerError::InvalidAmount { amount }.into());
        }
        self.ledger.ensure_account(key)?;
        let account = self.ledger.account(key)?;
        account.ensure_operational()?;
        let available = account.total_available();
        if available < amount {
            return Err(LedgerError::InsufficientBalance {
                available,
                requested: amount,
            }
            .into());
        }

        let now = Utc::now();
        let authorization = BalanceAuthorization {
            id: Uuid::new_v4(),
            account: key,
            amount,
            terminal: terminal.to_string(),
            status: AuthorizationStatus::Pending,
            created_at: now,
            expires_at: now + self.pending_ttl,
            approved_at: None,
            completed_at: None,
            denied_at: None,
            denial_reason: None,
            nsu: None,
            block_movement_id: None,
            debit_movement_id: None,
            reversal_movement_id: None,
            context: ctx.clone(),
        };
        self.authorizations
            .insert(authorization.id, Arc::new(Mutex::new(authorization.clone())));
        info!(
            authorization = %authorization.id,
            account = %key,
            amount = %amount,
            "Authorization created"
        );
        self.notifier
            .notify(AuthorizationEvent::Created, &authorization);
        Ok(authorization)
    }

    /// Approves a PENDING authorization, reserving the funds and opening
    /// the settlement window.
    ///
    /// # Errors
    ///
    /// Returns `NotFound`, `Expired` when the approval window has
    /// closed, `InvalidState` for non-pending authorizations, or a
    /// ledger error when the reservation fails. A failed reservation
    /// leaves the authorization PENDING.
    pub fn approve(
        &self,
        id: Uuid,
        ctx: &OperationContext,
    ) -> Result<BalanceAuthorization, AuthorizationError> {
        let entry = self.entry(id)?;
        let mut authorization = entry.lock();
        let now = Utc::now();
        if authorization.is_expired(now) {
            let expired_at = authorization.expires_at;
            self.expire_locked(&mut authorization);
            return Err(AuthorizationError::Expired { id, expired_at });
        }
        if authorization.status != AuthorizationStatus::Pending {
            return Err(AuthorizationError::InvalidState {
                id,
                status: authorization.status,
                action: "approve",
            });
        }

        let block = self.ledger.block(
            authorization.account,
            authorization.amount,
            format!("Authorization {id} hold"),
            ctx,
        )?;

        authorization.status = AuthorizationStatus::Approved;
        authorization.approved_at = Some(now);
        authorization.expires_at = now + self.approved_ttl;
        authorization.block_movement_id = Some(block.id);
        info!(authorization = %id, "Authorization approved");
        self.notifier
            .notify(AuthorizationEvent::Approved, &authorization);
        Ok(authorization.clone())
    }

    /// Denies an authorization, releasing any reservation. Denying an
    /// already-denied or expired authorization is a no-op, and a
    /// timed-out authorization flips to EXPIRED rather than DENIED: the
    /// timeout outcome wins.
    ///
    /// # Errors
    ///
    /// Returns `NotFound`, or `InvalidState` for settled authorizations.
    pub fn deny(
        &self,
        id: Uuid,
        reason: &str,
        ctx: &OperationContext,
    ) -> Result<BalanceAuthorization, AuthorizationError> {
        let entry = self.entry(id)?;
        let mut authorization = entry.lock();
        if authorization.is_expired(Utc::now()) {
            self.expire_locked(&mut authorization);
            return Ok(authorization.clone());
        }
        match authorization.status {
            AuthorizationStatus::Denied | AuthorizationStatus::Expired => {
                return Ok(authorization.clone());
            }
            AuthorizationStatus::Pending => {}
            AuthorizationStatus::Approved => {
                self.ledger.unblock(
                    authorization.account,
                    authorization.amount,
                    format!("Authorization {id} denied"),
                    ctx,
                )?;
            }
            status => {
                return Err(AuthorizationError::InvalidState {
                    id,
                    status,
                    action: "deny",
                });
            }
        }

        authorization.status = AuthorizationStatus::Denied;
        authorization.denied_at = Some(Utc::now());
        authorization.denial_reason = Some(reason.to_string());
        info!(authorization = %id, reason, "Authorization denied");
        self.notifier
            .notify(AuthorizationEvent::Denied, &authorization);
        Ok(authorization.clone())
    }

    /// Current view of an authorization. Polling is also how the POS
    /// learns about expiry, so a timed-out authorization is flipped to
    /// EXPIRED (releasing any reservation) before being returned.
    ///
    /// # Errors
    ///
    /// Returns `NotFound`.
    pub fn get(&self, id: Uuid) -> Result<BalanceAuthorization, AuthorizationError> {
        let entry = self.entry(id)?;
        let mut authorization = entry.lock();
        if authorization.is_expired(Utc::now()) {
            self.expire_locked(&mut authorization);
        }
        Ok(authorization.clone())
    }

    /// Looks up the authorization settled under the given NSU.
    ///
    /// # Errors
    ///
    /// Returns `NsuNotFound`.
    pub fn find_by_nsu(&self, nsu: &str) -> Result<BalanceAuthorization, AuthorizationError> {
        let id = self
            .nsu_index
            .get(nsu)
            .map(|entry| *entry.value())
            .ok_or_else(|| AuthorizationError::NsuNotFound {
                nsu: nsu.to_string(),
            })?;
        self.get(id)
    }

    /// Settles an APPROVED authorization: debits the reserved funds,
    /// releases the reservation and records the NSU. Produces the debit
    /// and unblock audit rows in one atomic ledger step.
    ///
    /// # Errors
    ///
    /// Returns `NotFound`, `Expired` when the settlement window has
    /// closed, `InvalidState` for non-approved authorizations,
    /// `DuplicateNsu`, or a ledger error. A failed settlement leaves
    /// the authorization APPROVED and the NSU unused.
    pub fn debit(
        &self,
        id: Uuid,
        nsu: &str,
        ctx: &OperationContext,
    ) -> Result<BalanceAuthorization, AuthorizationError> {
        let entry = self.entry(id)?;
        let mut authorization = entry.lock();
        let now = Utc::now();
        if authorization.is_expired(now) {
            let expired_at = authorization.expires_at;
            self.expire_locked(&mut authorization);
            return Err(AuthorizationError::Expired { id, expired_at });
        }
        if authorization.status != AuthorizationStatus::Approved {
            return Err(AuthorizationError::InvalidState {
                id,
                status: authorization.status,
                action: "debit",
            });
        }

        match self.nsu_index.entry(nsu.to_string()) {
            Entry::Occupied(occupied) => {
                if *occupied.get() != id {
                    return Err(AuthorizationError::DuplicateNsu {
                        nsu: nsu.to_string(),
                        existing: *occupied.get(),
                    });
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(id);
            }
        }

        let settlement = self.ledger.settle_blocked(
            EntryRequest {
                account: authorization.account,
                type_code: codes::DEBIT.to_string(),
                amount: authorization.amount,
                description: format!("POS settlement, NSU {nsu}"),
                external_reference: Some(ExternalReference {
                    reference: nsu.to_string(),
                    origin_system: "POS".to_string(),
                }),
            },
            ctx,
        );
        let (debit, _unblock) = match settlement {
            Ok(movements) => movements,
            Err(error) => {
                // The NSU stays free for a retry.
                self.nsu_index.remove(nsu);
                return Err(error.into());
            }
        };

        authorization.status = AuthorizationStatus::Completed;
        authorization.completed_at = Some(now);
        authorization.nsu = Some(nsu.to_string());
        authorization.debit_movement_id = Some(debit.id);
        info!(authorization = %id, nsu, "Authorization settled");
        self.notifier
            .notify(AuthorizationEvent::Completed, &authorization);
        Ok(authorization.clone())
    }

    /// Reverses a settled authorization by its NSU, returning the funds.
    /// The reason is recorded on the reversal movement. Reversing an
    /// already-reversed authorization is a no-op, so the POS can safely
    /// retry.
    ///
    /// # Errors
    ///
    /// Returns `NsuNotFound`, `InvalidState` for unsettled
    /// authorizations, or a ledger error.
    pub fn reverse(
        &self,
        nsu: &str,
        reason: &str,
        ctx: &OperationContext,
    ) -> Result<BalanceAuthorization, AuthorizationError> {
        let id = self
            .nsu_index
            .get(nsu)
            .map(|entry| *entry.value())
            .ok_or_else(|| AuthorizationError::NsuNotFound {
                nsu: nsu.to_string(),
            })?;
        let entry = self.entry(id)?;
        let mut authorization = entry.lock();
        match authorization.status {
            AuthorizationStatus::Reversed => return Ok(authorization.clone()),
            AuthorizationStatus::Completed => {}
            status => {
                return Err(AuthorizationError::InvalidState {
                    id,
                    status,
                    action: "reverse",
                });
            }
        }
        let debit_id =
            authorization
                .debit_movement_id
                .ok_or(AuthorizationError::InvalidState {
                    id,
                    status: authorization.status,
                    action: "reverse",
                })?;

        let reversal = self.ledger.reverse(debit_id, reason, ctx)?;
        authorization.status = AuthorizationStatus::Reversed;
        authorization.reversal_movement_id = Some(reversal.id);
        info!(authorization = %id, nsu, "Authorization reversed");
        self.notifier
            .notify(AuthorizationEvent::Reversed, &authorization);
        Ok(authorization.clone())
    }

    /// Expires every live authorization whose window has closed at
    /// `now`, releasing reservations held by approved ones. Returns how
    /// many were expired.
    pub fn expire_due(&self, now: DateTime<Utc>) -> usize {
        let live: Vec<_> = self
            .authorizations
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        let mut expired = 0;
        for entry in live {
            let mut authorization = entry.lock();
            if authorization.is_expired(now) && self.expire_locked(&mut authorization) {
                expired += 1;
            }
        }
        expired
    }

    /// Flips a timed-out authorization to EXPIRED. If releasing an
    /// approved reservation fails the status is left untouched so the
    /// next sweep retries. Returns whether the flip happened.
    fn expire_locked(&self, authorization: &mut BalanceAuthorization) -> bool {
        if authorization.status == AuthorizationStatus::Approved {
            let release = self.ledger.unblock(
                authorization.account,
                authorization.amount,
                format!("Authorization {} expired", authorization.id),
                &OperationContext::system("EXPIRATION_SWEEPER"),
            );
            if let Err(error) = release {
                warn!(
                    authorization = %authorization.id,
                    %error,
                    "Failed to release reservation of expired authorization, will retry"
                );
                return false;
            }
        }
        authorization.status = AuthorizationStatus::Expired;
        info!(authorization = %authorization.id, "Authorization expired");
        self.notifier
            .notify(AuthorizationEvent::Expired, authorization);
        true
    }

    fn entry(
        &self,
        id: Uuid,
    ) -> Result<Arc<Mutex<BalanceAuthorization>>, AuthorizationError> {
        self.authorizations
            .get(&id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or(AuthorizationError::NotFound { id })
    }
}

fn seconds(secs: u64) -> Duration {
    Duration::seconds(i64::try_from(secs).unwrap_or(i64::MAX))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::AccountRegistry;
    use crate::ledger::LedgerStore;
    use crate::movement::MovementTypeCatalog;
    use rust_decimal_macros::dec;
    use wallet_shared::WalletSettings;

    struct Fixture {
        ledger: Arc<LedgerService>,
        service: AuthorizationService,
    }

    fn fixture() -> Fixture {
        fixture_with(&AuthorizationSettings::default())
    }

    fn fixture_with(settings: &AuthorizationSettings) -> Fixture {
        let store = Arc::new(LedgerStore::new());
        let registry = Arc::new(AccountRegistry::new(
            Arc::clone(&store),
            WalletSettings::default(),
        ));
        let catalog = Arc::new(MovementTypeCatalog::with_defaults());
        let ledger = Arc::new(LedgerService::new(store, registry, catalog));
        let service = AuthorizationService::new(Arc::clone(&ledger), settings, Arc::new(LogNotifier));
        Fixture { ledger, service }
    }

    fn key() -> AccountKey {
        AccountKey {
            customer_id: 9,
            channel_id: 1,
        }
    }

    fn ctx() -> OperationContext {
        OperationContext::system("TEST")
    }

    fn fund(fixture: &Fixture, amount: Decimal) {
        fixture
            .ledger
            .credit(
                EntryRequest {
                    account: key(),
                    type_code: codes::CREDIT.to_string(),
                    amount,
                    description: "top up".to_string(),
                    external_reference: None,
                },
                &ctx(),
            )
            .unwrap();
    }

    fn spend(fixture: &Fixture, amount: Decimal) {
        fixture
            .ledger
            .debit(
                EntryRequest {
                    account: key(),
                    type_code: codes::DEBIT.to_string(),
                    amount,
                    description: "spend".to_string(),
                    external_reference: None,
                },
                &ctx(),
            )
            .unwrap();
    }

    #[test]
    fn test_create_pending_authorization() {
        let fixture = fixture();
        fund(&fixture, dec!(100));
        let authorization = fixture.service.create(key(), dec!(60), "TERM-01", &ctx()).unwrap();
        assert_eq!(authorization.status, AuthorizationStatus::Pending);
        assert!(authorization.expires_at > authorization.created_at);
        // Creation does not reserve anything yet.
        assert_eq!(
            fixture.ledger.balance_snapshot(key()).unwrap().blocked_balance,
            dec!(0)
        );
    }

    #[test]
    fn test_create_records_terminal() {
        let fixture = fixture();
        fund(&fixture, dec!(100));
        let authorization = fixture
            .service
            .create(key(), dec!(60), "TERM-07", &ctx())
            .unwrap();
        assert_eq!(authorization.terminal, "TERM-07");
    }

    #[test]
    fn test_create_counts_available_cashback() {
        let fixture = fixture();
        fund(&fixture, dec!(30));
        {
            let entry = fixture.ledger.registry().get(key()).unwrap();
            entry.lock().account.cashback_available = dec!(20);
        }
        // 30 cash + 20 cashback covers the request.
        let authorization = fixture
            .service
            .create(key(), dec!(50), "TERM-01", &ctx())
            .unwrap();
        assert_eq!(authorization.status, AuthorizationStatus::Pending);

        let err = fixture
            .service
            .create(key(), dec!(51), "TERM-01", &ctx())
            .unwrap_err();
        assert_eq!(err.error_code(), "INSUFFICIENT_BALANCE");
    }

    #[test]
    fn test_create_rejects_insufficient_balance() {
        let fixture = fixture();
        fund(&fixture, dec!(10));
        let err = fixture.service.create(key(), dec!(60), "TERM-01", &ctx()).unwrap_err();
        assert_eq!(err.error_code(), "INSUFFICIENT_BALANCE");
    }

    #[test]
    fn test_create_rejects_non_positive_amount() {
        let fixture = fixture();
        fund(&fixture, dec!(10));
        let err = fixture.service.create(key(), dec!(0), "TERM-01", &ctx()).unwrap_err();
        assert_eq!(err.error_code(), "INVALID_AMOUNT");
    }

    #[test]
    fn test_create_rejects_blocked_account() {
        let fixture = fixture();
        fund(&fixture, dec!(100));
        fixture.ledger.registry().block(key(), "fraud review").unwrap();
        let err = fixture.service.create(key(), dec!(10), "TERM-01", &ctx()).unwrap_err();
        assert_eq!(err.error_code(), "ACCOUNT_BLOCKED");
    }

    #[test]
    fn test_approve_reserves_funds_and_resets_window() {
        let fixture = fixture();
        fund(&fixture, dec!(100));
        let created = fixture.service.create(key(), dec!(60), "TERM-01", &ctx()).unwrap();
        let approved = fixture.service.approve(created.id, &ctx()).unwrap();

        assert_eq!(approved.status, AuthorizationStatus::Approved);
        assert!(approved.block_movement_id.is_some());
        assert!(approved.expires_at > created.expires_at || approved.expires_at > approved.created_at);

        let snapshot = fixture.ledger.balance_snapshot(key()).unwrap();
        assert_eq!(snapshot.blocked_balance, dec!(60));
        assert_eq!(snapshot.available, dec!(40));
    }

    #[test]
    fn test_approve_revalidates_balance() {
        let fixture = fixture();
        fund(&fixture, dec!(100));
        let created = fixture.service.create(key(), dec!(60), "TERM-01", &ctx()).unwrap();
        spend(&fixture, dec!(70));

        let err = fixture.service.approve(created.id, &ctx()).unwrap_err();
        assert_eq!(err.error_code(), "INSUFFICIENT_BALANCE");
        // Still pending; the customer may retry after a top-up.
        assert_eq!(
            fixture.service.get(created.id).unwrap().status,
            AuthorizationStatus::Pending
        );
    }

    #[test]
    fn test_approve_after_window_expires() {
        let fixture = fixture_with(&AuthorizationSettings {
            pending_ttl_secs: 0,
            ..AuthorizationSettings::default()
        });
        fund(&fixture, dec!(100));
        let created = fixture.service.create(key(), dec!(60), "TERM-01", &ctx()).unwrap();
        let err = fixture.service.approve(created.id, &ctx()).unwrap_err();
        assert_eq!(err.error_code(), "AUTHORIZATION_EXPIRED");
        assert_eq!(
            fixture.service.get(created.id).unwrap().status,
            AuthorizationStatus::Expired
        );
    }

    #[test]
    fn test_approve_twice_rejected() {
        let fixture = fixture();
        fund(&fixture, dec!(100));
        let created = fixture.service.create(key(), dec!(60), "TERM-01", &ctx()).unwrap();
        fixture.service.approve(created.id, &ctx()).unwrap();
        let err = fixture.service.approve(created.id, &ctx()).unwrap_err();
        assert_eq!(err.error_code(), "INVALID_STATE");
    }

    #[test]
    fn test_deny_pending() {
        let fixture = fixture();
        fund(&fixture, dec!(100));
        let created = fixture.service.create(key(), dec!(60), "TERM-01", &ctx()).unwrap();
        let denied = fixture
            .service
            .deny(created.id, "customer declined", &ctx())
            .unwrap();
        assert_eq!(denied.status, AuthorizationStatus::Denied);
        assert_eq!(denied.denial_reason.as_deref(), Some("customer declined"));
    }

    #[test]
    fn test_deny_approved_releases_reservation() {
        let fixture = fixture();
        fund(&fixture, dec!(100));
        let created = fixture.service.create(key(), dec!(60), "TERM-01", &ctx()).unwrap();
        fixture.service.approve(created.id, &ctx()).unwrap();
        fixture.service.deny(created.id, "changed mind", &ctx()).unwrap();

        let snapshot = fixture.ledger.balance_snapshot(key()).unwrap();
        assert_eq!(snapshot.blocked_balance, dec!(0));
        assert_eq!(snapshot.available, dec!(100));
    }

    #[test]
    fn test_deny_is_idempotent() {
        let fixture = fixture();
        fund(&fixture, dec!(100));
        let created = fixture.service.create(key(), dec!(60), "TERM-01", &ctx()).unwrap();
        fixture.service.deny(created.id, "no", &ctx()).unwrap();
        let again = fixture.service.deny(created.id, "still no", &ctx()).unwrap();
        assert_eq!(again.status, AuthorizationStatus::Denied);
        // First reason wins.
        assert_eq!(again.denial_reason.as_deref(), Some("no"));
    }

    #[test]
    fn test_deny_expired_is_noop() {
        let fixture = fixture_with(&AuthorizationSettings {
            pending_ttl_secs: 0,
            ..AuthorizationSettings::default()
        });
        fund(&fixture, dec!(100));
        let created = fixture.service.create(key(), dec!(60), "TERM-01", &ctx()).unwrap();
        // Poll flips the timed-out authorization to expired.
        assert_eq!(
            fixture.service.get(created.id).unwrap().status,
            AuthorizationStatus::Expired
        );
        let denied = fixture.service.deny(created.id, "late", &ctx()).unwrap();
        assert_eq!(denied.status, AuthorizationStatus::Expired);
        assert!(denied.denial_reason.is_none());
    }

    #[test]
    fn test_deny_timed_out_pending_expires_instead() {
        let fixture = fixture_with(&AuthorizationSettings {
            pending_ttl_secs: 0,
            ..AuthorizationSettings::default()
        });
        fund(&fixture, dec!(100));
        let created = fixture.service.create(key(), dec!(60), "TERM-01", &ctx()).unwrap();
        // The deny arrives after the window closed: the timeout wins.
        let denied = fixture.service.deny(created.id, "too slow", &ctx()).unwrap();
        assert_eq!(denied.status, AuthorizationStatus::Expired);
    }

    #[test]
    fn test_deny_completed_rejected() {
        let fixture = fixture();
        fund(&fixture, dec!(100));
        let created = fixture.service.create(key(), dec!(60), "TERM-01", &ctx()).unwrap();
        fixture.service.approve(created.id, &ctx()).unwrap();
        fixture.service.debit(created.id, "NSU-1", &ctx()).unwrap();
        let err = fixture.service.deny(created.id, "late", &ctx()).unwrap_err();
        assert_eq!(err.error_code(), "INVALID_STATE");
    }

    #[test]
    fn test_poll_self_heals_expired_approval() {
        let fixture = fixture_with(&AuthorizationSettings {
            approved_ttl_secs: 0,
            ..AuthorizationSettings::default()
        });
        fund(&fixture, dec!(100));
        let created = fixture.service.create(key(), dec!(60), "TERM-01", &ctx()).unwrap();
        fixture.service.approve(created.id, &ctx()).unwrap();

        let polled = fixture.service.get(created.id).unwrap();
        assert_eq!(polled.status, AuthorizationStatus::Expired);
        // Reservation was released on the way out.
        assert_eq!(
            fixture.ledger.balance_snapshot(key()).unwrap().blocked_balance,
            dec!(0)
        );
    }

    #[test]
    fn test_debit_settles_and_records_nsu() {
        let fixture = fixture();
        fund(&fixture, dec!(100));
        let created = fixture.service.create(key(), dec!(60), "TERM-01", &ctx()).unwrap();
        fixture.service.approve(created.id, &ctx()).unwrap();
        let completed = fixture.service.debit(created.id, "NSU-42", &ctx()).unwrap();

        assert_eq!(completed.status, AuthorizationStatus::Completed);
        assert_eq!(completed.nsu.as_deref(), Some("NSU-42"));
        assert!(completed.debit_movement_id.is_some());

        let snapshot = fixture.ledger.balance_snapshot(key()).unwrap();
        assert_eq!(snapshot.balance, dec!(40));
        assert_eq!(snapshot.blocked_balance, dec!(0));
    }

    #[test]
    fn test_debit_requires_approval() {
        let fixture = fixture();
        fund(&fixture, dec!(100));
        let created = fixture.service.create(key(), dec!(60), "TERM-01", &ctx()).unwrap();
        let err = fixture.service.debit(created.id, "NSU-1", &ctx()).unwrap_err();
        assert_eq!(err.error_code(), "INVALID_STATE");
    }

    #[test]
    fn test_debit_after_settlement_window_expires() {
        let fixture = fixture_with(&AuthorizationSettings {
            approved_ttl_secs: 0,
            ..AuthorizationSettings::default()
        });
        fund(&fixture, dec!(100));
        let created = fixture.service.create(key(), dec!(60), "TERM-01", &ctx()).unwrap();
        fixture.service.approve(created.id, &ctx()).unwrap();
        let err = fixture.service.debit(created.id, "NSU-1", &ctx()).unwrap_err();
        assert_eq!(err.error_code(), "AUTHORIZATION_EXPIRED");
        assert_eq!(
            fixture.ledger.balance_snapshot(key()).unwrap().blocked_balance,
            dec!(0)
        );
    }

    #[test]
    fn test_duplicate_nsu_rejected() {
        let fixture = fixture();
        fund(&fixture, dec!(100));
        let first = fixture.service.create(key(), dec!(30), "TERM-01", &ctx()).unwrap();
        fixture.service.approve(first.id, &ctx()).unwrap();
        fixture.service.debit(first.id, "NSU-7", &ctx()).unwrap();

        let second = fixture.service.create(key(), dec!(30), "TERM-01", &ctx()).unwrap();
        fixture.service.approve(second.id, &ctx()).unwrap();
        let err = fixture.service.debit(second.id, "NSU-7", &ctx()).unwrap_err();
        assert_eq!(err.error_code(), "INVALID_STATE");
        // The second authorization stays approved and can settle under
        // its own NSU.
        let completed = fixture.service.debit(second.id, "NSU-8", &ctx()).unwrap();
        assert_eq!(completed.status, AuthorizationStatus::Completed);
    }

    #[test]
    fn test_reverse_by_nsu_restores_funds() {
        let fixture = fixture();
        fund(&fixture, dec!(100));
        let created = fixture.service.create(key(), dec!(60), "TERM-01", &ctx()).unwrap();
        fixture.service.approve(created.id, &ctx()).unwrap();
        fixture.service.debit(created.id, "NSU-9", &ctx()).unwrap();

        let reversed = fixture.service.reverse("NSU-9", "customer return", &ctx()).unwrap();
        assert_eq!(reversed.status, AuthorizationStatus::Reversed);
        assert!(reversed.reversal_movement_id.is_some());
        assert_eq!(
            fixture.ledger.balance_snapshot(key()).unwrap().balance,
            dec!(100)
        );

        // The reason lands on the reversal movement.
        let reversal = fixture
            .ledger
            .movement(reversed.reversal_movement_id.unwrap())
            .unwrap();
        assert!(reversal.description.contains("customer return"));
    }

    #[test]
    fn test_reverse_is_idempotent() {
        let fixture = fixture();
        fund(&fixture, dec!(100));
        let created = fixture.service.create(key(), dec!(60), "TERM-01", &ctx()).unwrap();
        fixture.service.approve(created.id, &ctx()).unwrap();
        fixture.service.debit(created.id, "NSU-9", &ctx()).unwrap();

        fixture.service.reverse("NSU-9", "customer return", &ctx()).unwrap();
        let again = fixture.service.reverse("NSU-9", "customer return", &ctx()).unwrap();
        assert_eq!(again.status, AuthorizationStatus::Reversed);
        // Funds returned exactly once.
        assert_eq!(
            fixture.ledger.balance_snapshot(key()).unwrap().balance,
            dec!(100)
        );
    }

    #[test]
    fn test_reverse_unknown_nsu() {
        let fixture = fixture();
        let err = fixture.service.reverse("NSU-404", "ghost", &ctx()).unwrap_err();
        assert_eq!(err.error_code(), "AUTHORIZATION_NOT_FOUND");
    }

    #[test]
    fn test_expire_due_sweeps_pending_and_approved() {
        let fixture = fixture_with(&AuthorizationSettings {
            pending_ttl_secs: 0,
            approved_ttl_secs: 3600,
            ..AuthorizationSettings::default()
        });
        fund(&fixture, dec!(100));
        let pending = fixture.service.create(key(), dec!(10), "TERM-01", &ctx()).unwrap();
        let other = fixture.service.create(key(), dec!(20), "TERM-01", &ctx()).unwrap();
        let _ = other;

        let expired = fixture.service.expire_due(Utc::now());
        assert_eq!(expired, 2);
        assert_eq!(
            fixture.service.get(pending.id).unwrap().status,
            AuthorizationStatus::Expired
        );
        // Nothing left on the next pass.
        assert_eq!(fixture.service.expire_due(Utc::now()), 0);
    }

    #[test]
    fn test_expire_due_releases_approved_reservations() {
        let fixture = fixture_with(&AuthorizationSettings {
            pending_ttl_secs: 3600,
            approved_ttl_secs: 0,
            ..AuthorizationSettings::default()
        });
        fund(&fixture, dec!(100));
        let created = fixture.service.create(key(), dec!(60), "TERM-01", &ctx()).unwrap();
        fixture.service.approve(created.id, &ctx()).unwrap();
        assert_eq!(
            fixture.ledger.balance_snapshot(key()).unwrap().blocked_balance,
            dec!(60)
        );

        assert_eq!(fixture.service.expire_due(Utc::now()), 1);
        assert_eq!(
            fixture.ledger.balance_snapshot(key()).unwrap().blocked_balance,
            dec!(0)
        );
    }

    #[test]
    fn test_find_by_nsu() {
        let fixture = fixture();
        fund(&fixture, dec!(100));
        let created = fixture.service.create(key(), dec!(60), "TERM-01", &ctx()).unwrap();
        fixture.service.approve(created.id, &ctx()).unwrap();
        fixture.service.debit(created.id, "NSU-77", &ctx()).unwrap();

        let found = fixture.service.find_by_nsu("NSU-77").unwrap();
        assert_eq!(found.id, created.id);
    }
}
