// Copyright (c) 2026 Hypermesh Foundation. All rights reserved.
// Licensed under the Business Source License 1.1.
// See the LICENSE file in the repository root for full license text.

//! Withdrawal saga: reserve locally, pay externally, resolve or compensate.
//!
//! ```text
//!   reserve (atomic)          external phase            resolution
//!   ---------------           --------------            ----------
//!   validate bounds/address   rail.send(addr, ton)  ok  -> Completed(tx)
//!   debit + insert Pending    at most once          err -> Failed + re-credit
//!                                                          (atomic)
//!                                      re-credit fails -> FatalReconciliation
//! ```
//!
//! A reserved request is moved into exactly one resolution task, so the rail
//! is called at most once per record. The task runs to a terminal state even
//! if the initiating caller goes away.

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::sync::Arc;
use tokio::task::JoinHandle;

use crate::core_types::{AccountId, Timestamp};
use crate::error::{GameError, StoreError};
use crate::settings::WithdrawalBounds;
use crate::store::{AccountStore, WithdrawalDraft, WithdrawalRequest};

/// Memo attached to every outbound payment.
pub const PAYMENT_MEMO: &str = "Withdrawal";

/// Log target for states that need manual reconciliation.
pub const RECONCILIATION_TARGET: &str = "coinup::reconciliation";

// ---------------------------------------------------------------------------
// Ports
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RailError {
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("payment rejected: {0}")]
    Rejected(String),
}

impl From<RailError> for GameError {
    fn from(err: RailError) -> Self {
        GameError::ExternalTransport(err.to_string())
    }
}

/// Handle returned by the rail for a broadcast payment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxHandle(pub String);

/// Outbound payment rail.
#[async_trait]
pub trait PaymentRail: Send + Sync + 'static {
    /// Pure syntax check on a destination address.
    fn validate_address(&self, address: &str) -> bool {
        is_plausible_ton_address(address)
    }

    async fn send(&self, destination: &str, amount: Decimal, memo: &str) -> Result<TxHandle, RailError>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("notification failed: {0}")]
pub struct NotifyError(pub String);

/// Best-effort user notification channel.
#[async_trait]
pub trait Notifier: Send + Sync + 'static {
    async fn notify(&self, account: AccountId, message: &str) -> Result<(), NotifyError>;
}

/// Notifier that drops every message.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn notify(&self, _account: AccountId, _message: &str) -> Result<(), NotifyError> {
        Ok(())
    }
}

/// TON address syntax: 48-char user-friendly form (base64 or base64url) or
/// raw `workchain:hex64` form.
pub fn is_plausible_ton_address(address: &str) -> bool {
    if let Some((workchain, hash)) = address.split_once(':') {
        return workchain.parse::<i32>().is_ok()
            && hash.len() == 64
            && hash.bytes().all(|b| b.is_ascii_hexdigit());
    }
    address.len() == 48
        && address
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'+' | b'/'))
}

// ---------------------------------------------------------------------------
// Saga
// ---------------------------------------------------------------------------

pub struct WithdrawalSaga<S, R, N> {
    store: Arc<S>,
    rail: Arc<R>,
    notifier: Arc<N>,
}

impl<S, R, N> Clone for WithdrawalSaga<S, R, N> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            rail: Arc::clone(&self.rail),
            notifier: Arc::clone(&self.notifier),
        }
    }
}

impl<S, R, N> WithdrawalSaga<S, R, N>
where
    S: AccountStore,
    R: PaymentRail,
    N: Notifier,
{
    pub fn new(store: Arc<S>, rail: Arc<R>, notifier: Arc<N>) -> Self {
        Self { store, rail, notifier }
    }

    /// Validate and reserve. On any error nothing has been written.
    pub fn reserve(
        &self,
        account_id: AccountId,
        amount: Decimal,
        address: &str,
        bounds: &WithdrawalBounds,
        now: Timestamp,
    ) -> Result<WithdrawalRequest, GameError> {
        if amount <= Decimal::ZERO {
            return Err(GameError::NonPositiveAmount(amount));
        }
        if amount < bounds.minimum {
            return Err(GameError::AmountBelowMinimum {
                minimum: bounds.minimum,
                requested: amount,
            });
        }
        if amount > bounds.maximum {
            return Err(GameError::AmountAboveMaximum {
                maximum: bounds.maximum,
                requested: amount,
            });
        }
        let address = address.trim();
        if !self.rail.validate_address(address) {
            return Err(GameError::InvalidAddress(address.to_string()));
        }

        let request = self.store.reserve_withdrawal(WithdrawalDraft {
            account_id,
            amount_coins: amount,
            amount_ton: bounds.to_ton(amount),
            target_address: address.to_string(),
            created_at: now,
        })?;
        tracing::info!(
            account = %account_id,
            withdrawal = %request.id,
            coins = %request.amount_coins,
            ton = %request.amount_ton,
            "withdrawal reserved"
        );
        Ok(request)
    }

    /// Reserve, then run the external phase on a detached task.
    ///
    /// Must be called from within a tokio runtime.
    pub fn initiate(
        &self,
        account_id: AccountId,
        amount: Decimal,
        address: &str,
        bounds: &WithdrawalBounds,
        now: Timestamp,
    ) -> Result<(WithdrawalRequest, JoinHandle<Result<WithdrawalRequest, GameError>>), GameError> {
        let pending = self.reserve(account_id, amount, address, bounds, now)?;
        let saga = self.clone();
        let task = pending.clone();
        let handle = tokio::spawn(async move { saga.resolve(task).await });
        Ok((pending, handle))
    }

    /// Reserve and run the external phase inline. Returns the terminal record.
    pub async fn execute(
        &self,
        account_id: AccountId,
        amount: Decimal,
        address: &str,
        bounds: &WithdrawalBounds,
        now: Timestamp,
    ) -> Result<WithdrawalRequest, GameError> {
        let pending = self.reserve(account_id, amount, address, bounds, now)?;
        self.resolve(pending).await
    }

    /// External phase and resolution. Consumes the only handle to a freshly
    /// reserved request.
    async fn resolve(&self, request: WithdrawalRequest) -> Result<WithdrawalRequest, GameError> {
        let sent = self
            .rail
            .send(&request.target_address, request.amount_ton, PAYMENT_MEMO)
            .await;

        match sent {
            Ok(TxHandle(tx_hash)) => {
                let done = match self.store.complete_withdrawal(request.id, tx_hash.clone(), Timestamp::now()) {
                    Ok(done) => done,
                    Err(err) => {
                        // Funds left through the rail but the record is stuck.
                        tracing::error!(
                            target: RECONCILIATION_TARGET,
                            account = %request.account_id,
                            withdrawal = %request.id,
                            coins = %request.amount_coins,
                            tx_hash = %tx_hash,
                            error = %err,
                            "payment sent but completion could not be recorded"
                        );
                        return Err(err);
                    }
                };
                tracing::info!(
                    account = %done.account_id,
                    withdrawal = %done.id,
                    tx_hash = %tx_hash,
                    "withdrawal completed"
                );
                self.notify(
                    done.account_id,
                    &format!(
                        "Withdrawal of {} coins ({} TON) completed.",
                        done.amount_coins, done.amount_ton
                    ),
                )
                .await;
                Ok(done)
            }
            Err(rail_err) => {
                let transport = GameError::from(rail_err);
                tracing::warn!(
                    account = %request.account_id,
                    withdrawal = %request.id,
                    code = transport.code(),
                    error = %transport,
                    "payment rail failed, compensating"
                );
                let failed = self
                    .store
                    .fail_withdrawal(request.id, transport.to_string(), Timestamp::now())
                    .map_err(|err| self.escalate(&request, err))?;
                self.notify(
                    failed.account_id,
                    &format!(
                        "Withdrawal of {} coins failed; the coins were returned to your balance.",
                        failed.amount_coins
                    ),
                )
                .await;
                Ok(failed)
            }
        }
    }

    fn escalate(&self, request: &WithdrawalRequest, err: GameError) -> GameError {
        let source = match err {
            GameError::Store(store_err) => store_err,
            other => StoreError::WriteRejected(other.to_string()),
        };
        tracing::error!(
            target: RECONCILIATION_TARGET,
            account = %request.account_id,
            withdrawal = %request.id,
            coins = %request.amount_coins,
            error = %source,
            "compensation failed; balance needs manual reconciliation"
        );
        GameError::FatalReconciliation {
            account: request.account_id,
            withdrawal: request.id,
            amount: request.amount_coins,
            source,
        }
    }

    async fn notify(&self, account: AccountId, message: &str) {
        if let Err(err) = self.notifier.notify(account, message).await {
            tracing::warn!(account = %account, error = %err, "notification dropped");
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::{Account, ExternalIdentity};
    use crate::core_types::{WithdrawalId, WithdrawalStatus};
    use crate::settings::Settings;
    use crate::store::InMemoryStore;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    const ADDRESS: &str = "UQBvW8Z5huBkMJYdnfAEM5JqTNkuWX3diqYENkWsIL0XggGG";

    struct MockRail {
        fail: bool,
        sends: AtomicUsize,
    }

    impl MockRail {
        fn new(fail: bool) -> Self {
            Self {
                fail,
                sends: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl PaymentRail for MockRail {
        async fn send(&self, _destination: &str, _amount: Decimal, _memo: &str) -> Result<TxHandle, RailError> {
            let n = self.sends.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(RailError::Transport("timeout".into()))
            } else {
                Ok(TxHandle(format!("tx-{n}")))
            }
        }
    }

    /// Rail that reaches the network but has every transfer refused.
    struct RejectingRail;

    #[async_trait]
    impl PaymentRail for RejectingRail {
        async fn send(&self, _destination: &str, amount: Decimal, _memo: &str) -> Result<TxHandle, RailError> {
            Err(RailError::Rejected(format!("insufficient hot wallet balance for {amount} TON")))
        }
    }

    #[derive(Default)]
    struct RecordingNotifier {
        messages: Mutex<Vec<(AccountId, String)>>,
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn notify(&self, account: AccountId, message: &str) -> Result<(), NotifyError> {
            self.messages
                .lock()
                .expect("test: notifier lock")
                .push((account, message.to_string()));
            Err(NotifyError("chat closed".into()))
        }
    }

    /// Store whose compensation write always fails.
    struct BrokenCompensation(InMemoryStore);

    impl AccountStore for BrokenCompensation {
        fn insert_account<F>(&self, build: F) -> Result<Account, GameError>
        where
            F: FnOnce(AccountId) -> Result<Account, GameError>,
        {
            self.0.insert_account(build)
        }
        fn account(&self, id: AccountId) -> Result<Account, GameError> {
            self.0.account(id)
        }
        fn find_by_external_id(&self, external_id: &str) -> Result<Option<Account>, GameError> {
            self.0.find_by_external_id(external_id)
        }
        fn transact<T, F>(&self, id: AccountId, f: F) -> Result<T, GameError>
        where
            F: FnOnce(&mut Account, Option<&mut Account>) -> Result<T, GameError>,
        {
            self.0.transact(id, f)
        }
        fn reserve_withdrawal(&self, draft: WithdrawalDraft) -> Result<WithdrawalRequest, GameError> {
            self.0.reserve_withdrawal(draft)
        }
        fn complete_withdrawal(
            &self,
            id: WithdrawalId,
            tx_hash: String,
            now: Timestamp,
        ) -> Result<WithdrawalRequest, GameError> {
            self.0.complete_withdrawal(id, tx_hash, now)
        }
        fn fail_withdrawal(&self, _: WithdrawalId, _: String, _: Timestamp) -> Result<WithdrawalRequest, GameError> {
            Err(StoreError::WriteRejected("row locked".into()).into())
        }
        fn withdrawal(&self, id: WithdrawalId) -> Result<WithdrawalRequest, GameError> {
            self.0.withdrawal(id)
        }
        fn withdrawals(&self, account: AccountId) -> Result<Vec<WithdrawalRequest>, GameError> {
            self.0.withdrawals(account)
        }
    }

    fn funded<S: AccountStore>(store: &S, coins: Decimal) -> AccountId {
        store
            .insert_account(|id| {
                let mut a = Account::new(id, ExternalIdentity::new("tg-1"), None, &Settings::default(), Timestamp(0))?;
                a.coins = coins;
                Ok(a)
            })
            .expect("test: insert")
            .id
    }

    fn bounds() -> WithdrawalBounds {
        WithdrawalBounds {
            minimum: dec!(500),
            maximum: dec!(135000),
            coin_to_ton_rate: dec!(135000),
        }
    }

    #[test]
    fn address_predicate() {
        assert!(is_plausible_ton_address(ADDRESS));
        assert!(is_plausible_ton_address(
            "0:83dfd552e63729b472fcbcc8c45ebcc6691702558b68ec7527e1ba403a0f31a8"
        ));
        assert!(is_plausible_ton_address(
            "-1:83dfd552e63729b472fcbcc8c45ebcc6691702558b68ec7527e1ba403a0f31a8"
        ));
        assert!(!is_plausible_ton_address(""));
        assert!(!is_plausible_ton_address("not-an-address"));
        assert!(!is_plausible_ton_address("x:83dfd552e63729b472fcbcc8c45ebcc6691702558b68ec7527e1ba403a0f31a8"));
        assert!(!is_plausible_ton_address(&ADDRESS.replace('U', "!")));
    }

    #[tokio::test]
    async fn transport_failure_restores_balance() {
        let store = Arc::new(InMemoryStore::new());
        let id = funded(store.as_ref(), dec!(1000));
        let rail = Arc::new(MockRail::new(true));
        let saga = WithdrawalSaga::new(Arc::clone(&store), Arc::clone(&rail), Arc::new(NoopNotifier));

        let done = saga
            .execute(id, dec!(500), ADDRESS, &bounds(), Timestamp(1))
            .await
            .expect("test: saga resolves");

        assert_eq!(done.status, WithdrawalStatus::Failed);
        assert_eq!(done.error_message.as_deref(), Some("payment rail error: transport failure: timeout"));
        assert_eq!(store.account(id).expect("test: load").coins, dec!(1000));
        assert_eq!(rail.sends.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn rejected_transfer_is_compensated() {
        let store = Arc::new(InMemoryStore::new());
        let id = funded(store.as_ref(), dec!(1000));
        let notifier = Arc::new(RecordingNotifier::default());
        let saga = WithdrawalSaga::new(Arc::clone(&store), Arc::new(RejectingRail), Arc::clone(&notifier));

        let done = saga
            .execute(id, dec!(675), ADDRESS, &bounds(), Timestamp(1))
            .await
            .expect("test: saga resolves");

        assert_eq!(done.status, WithdrawalStatus::Failed);
        let message = done.error_message.as_deref().unwrap_or_default();
        assert!(message.starts_with("payment rail error: payment rejected"));
        assert_eq!(store.account(id).expect("test: load").coins, dec!(1000));
        let messages = notifier.messages.lock().expect("test: lock");
        assert!(messages[0].1.contains("returned to your balance"));
    }

    #[test]
    fn rail_errors_classify_as_external_transport() {
        let err = GameError::from(RailError::Rejected("bounced".into()));
        assert_eq!(err.kind(), crate::error::ErrorKind::ExternalTransport);
        assert_eq!(err.code(), "external_transport");
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn success_keeps_debit_and_records_hash() {
        let store = Arc::new(InMemoryStore::new());
        let id = funded(store.as_ref(), dec!(1000));
        let notifier = Arc::new(RecordingNotifier::default());
        let saga = WithdrawalSaga::new(Arc::clone(&store), Arc::new(MockRail::new(false)), Arc::clone(&notifier));

        let (pending, handle) = saga
            .initiate(id, dec!(675), ADDRESS, &bounds(), Timestamp(1))
            .expect("test: reserve");
        assert_eq!(pending.status, WithdrawalStatus::Pending);
        assert_eq!(pending.amount_ton, dec!(0.005));
        assert_eq!(store.account(id).expect("test: load").coins, dec!(325));

        let done = handle.await.expect("test: join").expect("test: resolve");
        assert_eq!(done.status, WithdrawalStatus::Completed);
        assert_eq!(done.tx_hash.as_deref(), Some("tx-0"));
        assert_eq!(store.account(id).expect("test: load").coins, dec!(325));
        // A failing notifier never changes the outcome.
        assert_eq!(notifier.messages.lock().expect("test: lock").len(), 1);
    }

    #[tokio::test]
    async fn validation_failures_leave_no_record() {
        let store = Arc::new(InMemoryStore::new());
        let id = funded(store.as_ref(), dec!(1000));
        let rail = Arc::new(MockRail::new(false));
        let saga = WithdrawalSaga::new(Arc::clone(&store), Arc::clone(&rail), Arc::new(NoopNotifier));
        let b = bounds();

        let cases = [
            (dec!(0), ADDRESS, "non_positive_amount"),
            (dec!(499), ADDRESS, "amount_below_minimum"),
            (dec!(135001), ADDRESS, "amount_above_maximum"),
            (dec!(600), "bogus", "invalid_address"),
            (dec!(1001), ADDRESS, "insufficient_funds"),
        ];
        for (amount, address, code) in cases {
            let err = saga
                .execute(id, amount, address, &b, Timestamp(1))
                .await
                .expect_err("test: rejected");
            assert_eq!(err.code(), code);
        }
        assert!(store.withdrawals(id).expect("test: list").is_empty());
        assert_eq!(store.account(id).expect("test: load").coins, dec!(1000));
        assert_eq!(rail.sends.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn failed_compensation_is_fatal() {
        let store = Arc::new(BrokenCompensation(InMemoryStore::new()));
        let id = funded(store.as_ref(), dec!(1000));
        let saga = WithdrawalSaga::new(Arc::clone(&store), Arc::new(MockRail::new(true)), Arc::new(NoopNotifier));

        let err = saga
            .execute(id, dec!(500), ADDRESS, &bounds(), Timestamp(1))
            .await
            .expect_err("test: fatal");
        assert!(matches!(
            err,
            GameError::FatalReconciliation { account, amount, .. } if account == id && amount == dec!(500)
        ));
        assert_eq!(err.code(), "fatal_reconciliation");
        let stuck = store.withdrawals(id).expect("test: list");
        assert_eq!(stuck[0].status, WithdrawalStatus::Pending);
    }
}
