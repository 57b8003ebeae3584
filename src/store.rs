// Copyright (c) 2026 Hypermesh Foundation. All rights reserved.
// Licensed under the Business Source License 1.1.
// See the LICENSE file in the repository root for full license text.

//! Persistence port and the in-memory reference store.
//!
//! The port is shaped around whole units of work rather than field updates:
//! [`AccountStore::transact`] hands a closure working copies of an account
//! and its referrer and commits both or neither, and the withdrawal
//! operations each couple a balance change with a record change. No caller
//! ever reads a value, computes elsewhere and writes it back.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use crate::account::Account;
use crate::core_types::{AccountId, Timestamp, WithdrawalId, WithdrawalStatus};
use crate::error::{GameError, StoreError};

// ---------------------------------------------------------------------------
// Withdrawal records
// ---------------------------------------------------------------------------

/// Persisted withdrawal request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WithdrawalRequest {
    pub id: WithdrawalId,
    pub account_id: AccountId,
    pub amount_coins: Decimal,
    pub amount_ton: Decimal,
    pub target_address: String,
    pub status: WithdrawalStatus,
    pub tx_hash: Option<String>,
    pub error_message: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// Validated request waiting to be reserved.
#[derive(Debug, Clone, PartialEq)]
pub struct WithdrawalDraft {
    pub account_id: AccountId,
    pub amount_coins: Decimal,
    pub amount_ton: Decimal,
    pub target_address: String,
    pub created_at: Timestamp,
}

// ---------------------------------------------------------------------------
// Port
// ---------------------------------------------------------------------------

/// Row-serialised account and withdrawal storage.
///
/// Every method is one atomic unit of work. Implementations must serialise
/// operations touching the same account so no two observe the same
/// pre-image.
pub trait AccountStore: Send + Sync + 'static {
    /// Allocate an id, build the account with it and insert it. Fails with
    /// [`GameError::AccountExists`] if the external id is already taken.
    fn insert_account<F>(&self, build: F) -> Result<Account, GameError>
    where
        F: FnOnce(AccountId) -> Result<Account, GameError>;

    fn account(&self, id: AccountId) -> Result<Account, GameError>;

    fn find_by_external_id(&self, external_id: &str) -> Result<Option<Account>, GameError>;

    /// Run `f` on working copies of the account and, if it has one, its
    /// referrer. Both copies are committed only if `f` succeeds and both
    /// still satisfy the row invariants.
    fn transact<T, F>(&self, id: AccountId, f: F) -> Result<T, GameError>
    where
        F: FnOnce(&mut Account, Option<&mut Account>) -> Result<T, GameError>;

    /// Debit the draft amount and insert a `Pending` request, together.
    fn reserve_withdrawal(&self, draft: WithdrawalDraft) -> Result<WithdrawalRequest, GameError>;

    /// `Pending -> Completed`, recording the payment handle. Balance untouched.
    fn complete_withdrawal(
        &self,
        id: WithdrawalId,
        tx_hash: String,
        now: Timestamp,
    ) -> Result<WithdrawalRequest, GameError>;

    /// `Pending -> Failed` and re-credit the reserved amount, together.
    fn fail_withdrawal(
        &self,
        id: WithdrawalId,
        error_message: String,
        now: Timestamp,
    ) -> Result<WithdrawalRequest, GameError>;

    fn withdrawal(&self, id: WithdrawalId) -> Result<WithdrawalRequest, GameError>;

    /// All requests of one account, newest first.
    fn withdrawals(&self, account: AccountId) -> Result<Vec<WithdrawalRequest>, GameError>;
}

// ---------------------------------------------------------------------------
// Shared primitives
// ---------------------------------------------------------------------------

/// The single balance mutation used by reservation and compensation alike.
pub(crate) fn apply_coin_delta(account: &mut Account, delta: Decimal) -> Result<(), GameError> {
    if delta.is_sign_negative() {
        account.debit(-delta)
    } else {
        account.credit(delta);
        Ok(())
    }
}

fn transition(
    request: &mut WithdrawalRequest,
    next: WithdrawalStatus,
    now: Timestamp,
) -> Result<(), GameError> {
    if !request.status.can_transition_to(next) {
        return Err(GameError::IllegalTransition {
            id: request.id,
            from: request.status,
            to: next,
        });
    }
    request.status = next;
    request.updated_at = now;
    Ok(())
}

// ---------------------------------------------------------------------------
// InMemoryStore
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct Tables {
    accounts: HashMap<AccountId, Account>,
    by_external: HashMap<String, AccountId>,
    withdrawals: BTreeMap<WithdrawalId, WithdrawalRequest>,
    next_account: u64,
    next_withdrawal: u64,
}

/// Process-local store. One mutex serialises every unit of work.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    tables: Mutex<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Tables>, StoreError> {
        self.tables.lock().map_err(|_| StoreError::Poisoned)
    }

    /// Number of stored accounts.
    pub fn len(&self) -> Result<usize, GameError> {
        Ok(self.lock()?.accounts.len())
    }

    pub fn is_empty(&self) -> Result<bool, GameError> {
        Ok(self.len()? == 0)
    }
}

impl AccountStore for InMemoryStore {
    fn insert_account<F>(&self, build: F) -> Result<Account, GameError>
    where
        F: FnOnce(AccountId) -> Result<Account, GameError>,
    {
        let mut tables = self.lock()?;
        let id = AccountId(tables.next_account + 1);
        let account = build(id)?;
        if account.id != id {
            return Err(StoreError::WriteRejected(format!("built account carries id {}, expected {id}", account.id)).into());
        }
        let external = account.identity.external_id.clone();
        if tables.by_external.contains_key(&external) {
            return Err(GameError::AccountExists(external));
        }
        if let Some(referrer) = account.referred_by {
            if !tables.accounts.contains_key(&referrer) {
                return Err(GameError::AccountNotFound(referrer));
            }
        }
        account.check_invariants()?;

        tables.next_account = id.0;
        tables.by_external.insert(external, id);
        tables.accounts.insert(id, account.clone());
        Ok(account)
    }

    fn account(&self, id: AccountId) -> Result<Account, GameError> {
        self.lock()?
            .accounts
            .get(&id)
            .cloned()
            .ok_or(GameError::AccountNotFound(id))
    }

    fn find_by_external_id(&self, external_id: &str) -> Result<Option<Account>, GameError> {
        let tables = self.lock()?;
        Ok(tables
            .by_external
            .get(external_id)
            .and_then(|id| tables.accounts.get(id))
            .cloned())
    }

    fn transact<T, F>(&self, id: AccountId, f: F) -> Result<T, GameError>
    where
        F: FnOnce(&mut Account, Option<&mut Account>) -> Result<T, GameError>,
    {
        let mut tables = self.lock()?;
        let mut account = tables
            .accounts
            .get(&id)
            .cloned()
            .ok_or(GameError::AccountNotFound(id))?;
        let mut referrer = account
            .referred_by
            .and_then(|r| tables.accounts.get(&r))
            .cloned();

        let out = f(&mut account, referrer.as_mut())?;

        account.check_invariants()?;
        if let Some(r) = &referrer {
            r.check_invariants()?;
        }
        if account.referred_by != tables.accounts.get(&id).and_then(|a| a.referred_by) {
            return Err(StoreError::WriteRejected("referred_by is immutable".into()).into());
        }

        if let Some(r) = referrer {
            tables.accounts.insert(r.id, r);
        }
        tables.accounts.insert(id, account);
        Ok(out)
    }

    fn reserve_withdrawal(&self, draft: WithdrawalDraft) -> Result<WithdrawalRequest, GameError> {
        let mut tables = self.lock()?;
        let mut account = tables
            .accounts
            .get(&draft.account_id)
            .cloned()
            .ok_or(GameError::AccountNotFound(draft.account_id))?;

        apply_coin_delta(&mut account, -draft.amount_coins)?;
        account.check_invariants()?;

        let id = WithdrawalId(tables.next_withdrawal + 1);
        let request = WithdrawalRequest {
            id,
            account_id: draft.account_id,
            amount_coins: draft.amount_coins,
            amount_ton: draft.amount_ton,
            target_address: draft.target_address,
            status: WithdrawalStatus::Pending,
            tx_hash: None,
            error_message: None,
            created_at: draft.created_at,
            updated_at: draft.created_at,
        };

        tables.next_withdrawal = id.0;
        tables.accounts.insert(account.id, account);
        tables.withdrawals.insert(id, request.clone());
        Ok(request)
    }

    fn complete_withdrawal(
        &self,
        id: WithdrawalId,
        tx_hash: String,
        now: Timestamp,
    ) -> Result<WithdrawalRequest, GameError> {
        let mut tables = self.lock()?;
        let request = tables
            .withdrawals
            .get_mut(&id)
            .ok_or(GameError::WithdrawalNotFound(id))?;
        transition(request, WithdrawalStatus::Completed, now)?;
        request.tx_hash = Some(tx_hash);
        Ok(request.clone())
    }

    fn fail_withdrawal(
        &self,
        id: WithdrawalId,
        error_message: String,
        now: Timestamp,
    ) -> Result<WithdrawalRequest, GameError> {
        let mut tables = self.lock()?;
        let mut request = tables
            .withdrawals
            .get(&id)
            .cloned()
            .ok_or(GameError::WithdrawalNotFound(id))?;
        transition(&mut request, WithdrawalStatus::Failed, now)?;
        request.error_message = Some(error_message);

        let mut account = tables
            .accounts
            .get(&request.account_id)
            .cloned()
            .ok_or_else(|| StoreError::WriteRejected(format!("account {} missing", request.account_id)))?;
        apply_coin_delta(&mut account, request.amount_coins)?;
        account.check_invariants()?;

        tables.accounts.insert(account.id, account);
        tables.withdrawals.insert(id, request.clone());
        Ok(request)
    }

    fn withdrawal(&self, id: WithdrawalId) -> Result<WithdrawalRequest, GameError> {
        self.lock()?
            .withdrawals
            .get(&id)
            .cloned()
            .ok_or(GameError::WithdrawalNotFound(id))
    }

    fn withdrawals(&self, account: AccountId) -> Result<Vec<WithdrawalRequest>, GameError> {
        Ok(self
            .lock()?
            .withdrawals
            .values()
            .rev()
            .filter(|w| w.account_id == account)
            .cloned()
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
