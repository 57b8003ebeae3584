// Copyright (c) 2026 Hypermesh Foundation. All rights reserved.
// Licensed under the Business Source License 1.1.
// See the LICENSE file in the repository root for full license text.

//! Resource simulator -- lazy reconciliation of mining sessions.
//!
//! There is no background ticker. Whenever a request touches an account, the
//! wall-clock time since `last_mining_tick` is converted into bounded deltas:
//!
//! ```text
//! active = min(elapsed, t_vault_full, t_energy_zero, t_health_zero)
//! temp_coins     += active * mining_rate
//! current_energy -= active * energy_per_second
//! current_health -= active * health_per_second
//! ```
//!
//! Only the binding constraint's worth of time is active; anything past it
//! changes nothing. Health reaching zero burns all unsettled coins in the
//! same update.

use num_traits::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::account::Account;
use crate::core_types::{MiningOutcome, Timestamp};
use crate::error::GameError;

// ---------------------------------------------------------------------------
// Result types
// ---------------------------------------------------------------------------

/// What one reconciliation did to an account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reconciliation {
    pub outcome: MiningOutcome,
    /// Wall-clock time since the previous tick (zero on clock skew).
    pub elapsed: Duration,
    /// Seconds that actually produced resource change.
    pub active_seconds: Decimal,
    /// Coins added to the vault.
    pub mined: Decimal,
    /// Unsettled coins lost to a health burn.
    pub burned: Decimal,
    pub energy_spent: Decimal,
    pub health_spent: Decimal,
}

// ---------------------------------------------------------------------------
// Reconciliation
// ---------------------------------------------------------------------------

/// Seconds until `room` is used up at `rate` per second. `None` means never.
fn time_to_exhaustion(room: Decimal, rate: Decimal) -> Option<Decimal> {
    if rate <= Decimal::ZERO {
        return None;
    }
    Some(room.max(Decimal::ZERO) / rate)
}

/// Apply the time elapsed since the last tick to `account`.
///
/// `last_mining_tick` becomes `max(now, last_mining_tick)`: a `now` behind
/// the stored tick applies nothing and leaves the tick where it was.
///
/// Fails with [`GameError::NotMining`] when no session is running. The
/// account is only modified if the post-state passes the row invariants, so
/// callers never observe a partially applied tick.
pub fn reconcile(account: &mut Account, now: Timestamp) -> Result<Reconciliation, GameError> {
    let last_tick = match (account.is_mining, account.last_mining_tick) {
        (true, Some(tick)) => tick,
        _ => return Err(GameError::NotMining),
    };

    let mut next = account.clone();
    let elapsed_secs = now.seconds_since(last_tick);

    let to_vault = time_to_exhaustion(next.vault_capacity - next.temp_coins, next.mining_rate);
    let to_energy = time_to_exhaustion(next.current_energy, next.energy_per_second);
    let to_health = time_to_exhaustion(next.current_health, next.health_per_second);

    let active = [to_vault, to_energy, to_health]
        .into_iter()
        .flatten()
        .fold(elapsed_secs, Decimal::min);

    // A constraint whose exhaustion time fits inside the active window is
    // pinned to its exact bound instead of accumulating division dust.
    let binds = |limit: Option<Decimal>| limit.is_some_and(|t| t <= active);

    let before_temp = next.temp_coins;
    let before_energy = next.current_energy;
    let before_health = next.current_health;

    next.temp_coins = if binds(to_vault) {
        next.vault_capacity
    } else {
        (next.temp_coins + active * next.mining_rate).min(next.vault_capacity)
    };
    next.current_energy = if binds(to_energy) {
        Decimal::ZERO
    } else {
        (next.current_energy - active * next.energy_per_second).max(Decimal::ZERO)
    };
    next.current_health = if binds(to_health) {
        Decimal::ZERO
    } else {
        (next.current_health - active * next.health_per_second).max(Decimal::ZERO)
    };

    let mined = next.temp_coins - before_temp;
    let mut burned = Decimal::ZERO;

    let outcome = if next.current_health <= Decimal::ZERO {
        burned = next.temp_coins;
        next.temp_coins = Decimal::ZERO;
        MiningOutcome::HealthDepleted
    } else if next.current_energy <= Decimal::ZERO {
        MiningOutcome::EnergyDepleted
    } else if next.temp_coins >= next.vault_capacity {
        MiningOutcome::VaultFull
    } else {
        MiningOutcome::InProgress
    };

    if outcome.stops_mining() {
        next.is_mining = false;
    }
    // Never moves backwards, so a skewed clock cannot re-open counted time.
    next.last_mining_tick = Some(now.max(last_tick));

    if let Err(err) = next.check_invariants() {
        tracing::error!(account = %account.id, error = %err, "reconciliation produced an invalid state");
        return Err(err);
    }

    let result = Reconciliation {
        outcome,
        elapsed: now.saturating_since(last_tick),
        active_seconds: active,
        mined,
        burned,
        energy_spent: before_energy - next.current_energy,
        health_spent: before_health - next.current_health,
    };
    tracing::debug!(
        account = %account.id,
        outcome = ?result.outcome,
        active_seconds = %result.active_seconds,
        mined = %result.mined,
        burned = %result.burned,
        "reconciled mining session"
    );

    *account = next;
    Ok(result)
}

/// Reconcile a copy, leaving `account` untouched.
pub fn preview(account: &Account, now: Timestamp) -> Result<(Account, Reconciliation), GameError> {
    let mut copy = account.clone();
    let result = reconcile(&mut copy, now)?;
    Ok((copy, result))
}

// ---------------------------------------------------------------------------
// Session control
// ---------------------------------------------------------------------------

/// Begin a mining session.
///
/// Refuses while any constraint is already exhausted; the error carries the
/// numbers so the client can render them directly.
pub fn start_mining(account: &mut Account, now: Timestamp) -> Result<(), GameError> {
    if account.is_mining {
        return Err(GameError::AlreadyMining);
    }
    if account.current_health <= Decimal::ZERO {
        return Err(GameError::HealthDepleted {
            current: account.current_health,
            max: account.max_health,
        });
    }
    if account.current_energy <= Decimal::ZERO {
        return Err(GameError::EnergyDepleted {
            current: account.current_energy,
            max: account.max_energy,
        });
    }
    if account.temp_coins >= account.vault_capacity {
        return Err(GameError::VaultFull {
            temp_coins: account.temp_coins,
            capacity: account.vault_capacity,
        });
    }
    account.is_mining = true;
    account.last_mining_tick = Some(now);
    Ok(())
}

/// Settle a full vault into the spendable balance. Returns the amount moved.
pub fn collect(account: &mut Account, now: Timestamp) -> Result<Decimal, GameError> {
    if account.temp_coins < account.vault_capacity || account.temp_coins.is_zero() {
        return Err(GameError::VaultNotFull {
            temp_coins: account.temp_coins,
            capacity: account.vault_capacity,
        });
    }
    let collected = account.temp_coins;
    account.credit(collected);
    account.temp_coins = Decimal::ZERO;
    account.is_mining = false;
    account.last_mining_tick = Some(now);
    Ok(collected)
}

/// Remaining active time before the binding constraint stops the session.
///
/// `None` when not mining, or when no constraint can ever bind.
pub fn time_to_stop(account: &Account) -> Option<Duration> {
    if !account.is_mining {
        return None;
    }
    let secs = [
        time_to_exhaustion(account.vault_capacity - account.temp_coins, account.mining_rate),
        time_to_exhaustion(account.current_energy, account.energy_per_second),
        time_to_exhaustion(account.current_health, account.health_per_second),
    ]
    .into_iter()
    .flatten()
    .min()?;
    let millis = (secs * dec!(1000)).ceil().to_u64().unwrap_or(u64::MAX);
    Some(Duration::from_millis(millis))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
