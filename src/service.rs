// Copyright (c) 2026 Hypermesh Foundation. All rights reserved.
// Licensed under the Business Source License 1.1.
// See the LICENSE file in the repository root for full license text.

//! Game service facade.
//!
//! Wires the store, the settings cache, the withdrawal saga and the wheel RNG
//! into the operations a client calls. Every operation that depends on
//! resource state reconciles the mining session first, inside the same store
//! transaction as the operation itself.

use rand_chacha::ChaCha8Rng;
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::account::{Account, ExternalIdentity};
use crate::core_types::{AccountId, MiningOutcome, Resource, Timestamp, Track};
use crate::error::GameError;
use crate::prize;
use crate::referral;
use crate::settings::{Settings, SettingsCache, SettingsError, SettingsSource, WithdrawalBounds};
use crate::simulator::{self, Reconciliation};
use crate::store::{AccountStore, WithdrawalRequest};
use crate::upgrades::{self, Purchase, UpgradeStatus};
use crate::withdrawal::{Notifier, PaymentRail, WithdrawalSaga};

/// Prefix of id-based referral codes.
pub const REFERRAL_CODE_PREFIX: &str = "ref_";

// ---------------------------------------------------------------------------
// Views
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SignIn {
    pub account: Account,
    pub created: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Collected {
    pub amount: Decimal,
    pub account: Account,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpgradeReceipt {
    pub purchase: Purchase,
    pub level: u32,
    /// Total paid to the referrer by this purchase's level-ups.
    pub referral_paid: Decimal,
}

/// Reconciled resource view for the mining screen.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResourceSnapshot {
    pub coins: Decimal,
    pub temp_coins: Decimal,
    pub vault_capacity: Decimal,
    pub mining_rate: Decimal,
    pub current_energy: Decimal,
    pub max_energy: Decimal,
    pub current_health: Decimal,
    pub max_health: Decimal,
    pub is_mining: bool,
    pub level: u32,
    /// Outcome of the reconciliation done for this read, if a session ran.
    pub outcome: Option<MiningOutcome>,
    /// Active time left before the session stops on its own.
    pub time_to_stop: Option<Duration>,
}

impl ResourceSnapshot {
    fn new(account: &Account, outcome: Option<MiningOutcome>) -> Self {
        Self {
            coins: account.coins,
            temp_coins: account.temp_coins,
            vault_capacity: account.vault_capacity,
            mining_rate: account.mining_rate,
            current_energy: account.current_energy,
            max_energy: account.max_energy,
            current_health: account.current_health,
            max_health: account.max_health,
            is_mining: account.is_mining,
            level: account.level,
            outcome,
            time_to_stop: simulator::time_to_stop(account),
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Reconcile if a session is running. Idle accounts are left alone.
fn settle(account: &mut Account, now: Timestamp) -> Result<Option<Reconciliation>, GameError> {
    match simulator::reconcile(account, now) {
        Ok(r) => Ok(Some(r)),
        Err(GameError::NotMining) => Ok(None),
        Err(err) => Err(err),
    }
}

/// Raise `account.level` to its derived level, paying the referrer once per
/// newly reached level.
fn promote(account: &mut Account, mut referrer: Option<&mut Account>, settings: &Settings) -> Decimal {
    let derived = account.derived_level();
    let mut paid = Decimal::ZERO;
    if derived <= account.level {
        return paid;
    }
    for level in account.level + 1..=derived {
        let reborrowed = referrer.as_deref_mut();
        if let Some(amount) = referral::on_level_up(account, reborrowed, level, &settings.referral_rewards) {
            paid += amount;
        }
    }
    tracing::info!(account = %account.id, from = account.level, to = derived, "level up");
    account.level = derived;
    paid
}

// ---------------------------------------------------------------------------
// GameService
// ---------------------------------------------------------------------------

pub struct GameService<S, Src, R, N>
where
    Src: SettingsSource,
{
    store: Arc<S>,
    settings: SettingsCache<Src>,
    saga: WithdrawalSaga<S, R, N>,
    rng: Mutex<ChaCha8Rng>,
}

impl<S, Src, R, N> GameService<S, Src, R, N>
where
    S: AccountStore,
    Src: SettingsSource,
    R: PaymentRail,
    N: Notifier,
{
    pub fn new(store: Arc<S>, settings: SettingsCache<Src>, rail: Arc<R>, notifier: Arc<N>, rng: ChaCha8Rng) -> Self {
        let saga = WithdrawalSaga::new(Arc::clone(&store), rail, notifier);
        Self {
            store,
            settings,
            saga,
            rng: Mutex::new(rng),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Current settings snapshot under the cache's refresh policy.
    pub fn settings(&self, now: Timestamp) -> Arc<Settings> {
        self.settings.snapshot(now)
    }

    pub fn refresh_settings(&self, now: Timestamp) -> Result<Arc<Settings>, SettingsError> {
        self.settings.refresh(now)
    }

    // -- identity -----------------------------------------------------------

    /// Find or create the account for a verified identity.
    ///
    /// The referral code is honoured only when the account is created. It is
    /// either `ref_<account id>` or the referrer's external id; unknown codes
    /// are ignored.
    pub fn sign_in(
        &self,
        identity: ExternalIdentity,
        referral_code: Option<&str>,
        now: Timestamp,
    ) -> Result<SignIn, GameError> {
        if let Some(existing) = self.store.find_by_external_id(&identity.external_id)? {
            let account = self.store.transact(existing.id, |account, _| {
                account.identity = identity;
                Ok(account.clone())
            })?;
            return Ok(SignIn {
                account,
                created: false,
            });
        }

        let referred_by = match referral_code {
            Some(code) => self.resolve_referrer(code)?,
            None => None,
        };
        let settings = self.settings(now);
        let external_id = identity.external_id.clone();
        match self
            .store
            .insert_account(|id| Account::new(id, identity, referred_by, &settings, now))
        {
            Ok(account) => {
                tracing::info!(account = %account.id, referred_by = ?account.referred_by, "account created");
                Ok(SignIn { account, created: true })
            }
            // Lost a race with a concurrent sign-in for the same identity.
            Err(GameError::AccountExists(_)) => {
                let account = self
                    .store
                    .find_by_external_id(&external_id)?
                    .ok_or(GameError::AccountExists(external_id))?;
                Ok(SignIn {
                    account,
                    created: false,
                })
            }
            Err(err) => Err(err),
        }
    }

    fn resolve_referrer(&self, code: &str) -> Result<Option<AccountId>, GameError> {
        let code = code.trim();
        if let Some(raw) = code.strip_prefix(REFERRAL_CODE_PREFIX) {
            let Ok(id) = raw.parse::<u64>() else {
                return Ok(None);
            };
            return match self.store.account(AccountId(id)) {
                Ok(account) => Ok(Some(account.id)),
                Err(GameError::AccountNotFound(_)) => Ok(None),
                Err(err) => Err(err),
            };
        }
        Ok(self.store.find_by_external_id(code)?.map(|a| a.id))
    }

    /// Code other players enter to be referred by `account`.
    pub fn referral_code(&self, account: AccountId) -> String {
        format!("{REFERRAL_CODE_PREFIX}{}", account.0)
    }

    // -- mining -------------------------------------------------------------

    pub fn start_mining(&self, id: AccountId, now: Timestamp) -> Result<ResourceSnapshot, GameError> {
        self.store.transact(id, |account, _| {
            settle(account, now)?;
            simulator::start_mining(account, now)?;
            tracing::info!(account = %account.id, "mining started");
            Ok(ResourceSnapshot::new(account, Some(MiningOutcome::InProgress)))
        })
    }

    /// Apply elapsed time to a running session.
    pub fn mine(&self, id: AccountId, now: Timestamp) -> Result<(ResourceSnapshot, Reconciliation), GameError> {
        self.store.transact(id, |account, _| {
            let result = simulator::reconcile(account, now)?;
            Ok((ResourceSnapshot::new(account, Some(result.outcome)), result))
        })
    }

    pub fn collect(&self, id: AccountId, now: Timestamp) -> Result<Collected, GameError> {
        self.store.transact(id, |account, _| {
            settle(account, now)?;
            let amount = simulator::collect(account, now)?;
            tracing::info!(account = %account.id, %amount, "vault collected");
            Ok(Collected {
                amount,
                account: account.clone(),
            })
        })
    }

    /// Reconciled resource view. The reconciliation is persisted.
    pub fn resource_state(&self, id: AccountId, now: Timestamp) -> Result<ResourceSnapshot, GameError> {
        self.store.transact(id, |account, _| {
            let outcome = settle(account, now)?.map(|r| r.outcome);
            Ok(ResourceSnapshot::new(account, outcome))
        })
    }

    // -- upgrades -----------------------------------------------------------

    /// Buy the next level of a track given by name (`wealth`, `vaultCapacity`, ...).
    pub fn purchase_upgrade(&self, id: AccountId, track: &str, now: Timestamp) -> Result<UpgradeReceipt, GameError> {
        let track: Track = track.parse()?;
        let settings = self.settings(now);
        self.store.transact(id, |account, referrer| {
            settle(account, now)?;
            let purchase = upgrades::purchase(account, track, &settings)?;
            let referral_paid = promote(account, referrer, &settings);
            Ok(UpgradeReceipt {
                purchase,
                level: account.level,
                referral_paid,
            })
        })
    }

    pub fn refill(&self, id: AccountId, resource: Resource, now: Timestamp) -> Result<ResourceSnapshot, GameError> {
        let settings = self.settings(now);
        self.store.transact(id, |account, _| {
            let outcome = settle(account, now)?.map(|r| r.outcome);
            upgrades::refill(account, resource, &settings)?;
            Ok(ResourceSnapshot::new(account, outcome))
        })
    }

    pub fn upgrade_status(&self, id: AccountId, now: Timestamp) -> Result<Vec<UpgradeStatus>, GameError> {
        let settings = self.settings(now);
        let account = self.store.account(id)?;
        upgrades::upgrade_status(&account, &settings)
    }

    // -- wheel --------------------------------------------------------------

    pub fn spin(&self, id: AccountId, now: Timestamp) -> Result<Decimal, GameError> {
        let settings = self.settings(now);
        self.store.transact(id, |account, _| {
            let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
            prize::spin(
                account,
                &settings.spin_wheel_probabilities,
                settings.spin_cooldown(),
                now,
                &mut *rng,
            )
        })
    }

    // -- withdrawals --------------------------------------------------------

    /// Reserve the withdrawal and resolve it on a detached task.
    ///
    /// Returns as soon as the funds are reserved. The task keeps running if
    /// the handle is dropped. Must be called from within a tokio runtime.
    pub fn withdraw(
        &self,
        id: AccountId,
        amount: Decimal,
        address: &str,
        now: Timestamp,
    ) -> Result<(WithdrawalRequest, JoinHandle<Result<WithdrawalRequest, GameError>>), GameError> {
        let bounds = self.withdrawal_limits(now);
        self.saga.initiate(id, amount, address, &bounds, now)
    }

    /// Reserve and resolve inline, returning the terminal record.
    pub async fn withdraw_and_wait(
        &self,
        id: AccountId,
        amount: Decimal,
        address: &str,
        now: Timestamp,
    ) -> Result<WithdrawalRequest, GameError> {
        let bounds = self.withdrawal_limits(now);
        self.saga.execute(id, amount, address, &bounds, now).await
    }

    pub fn withdrawal_history(&self, id: AccountId) -> Result<Vec<WithdrawalRequest>, GameError> {
        self.store.account(id)?;
        self.store.withdrawals(id)
    }

    pub fn withdrawal_limits(&self, now: Timestamp) -> WithdrawalBounds {
        self.settings(now).withdrawal_bounds()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
