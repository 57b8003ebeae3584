// Copyright (c) 2026 Hypermesh Foundation. All rights reserved.
// Licensed under the Business Source License 1.1.
// See the LICENSE file in the repository root for full license text.

//! Player account row.
//!
//! One [`Account`] per player. Every balance-affecting operation mutates a
//! working copy of this struct inside a store transaction; the copy is only
//! committed if the operation and [`Account::check_invariants`] both succeed.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::core_types::{AccountId, Resource, Timestamp, Track};
use crate::error::GameError;
use crate::settings::Settings;

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// Verified identity handed over by the identity provider at login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalIdentity {
    /// Stable external user id.
    pub external_id: String,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

impl ExternalIdentity {
    pub fn new(external_id: impl Into<String>) -> Self {
        Self {
            external_id: external_id.into(),
            username: None,
            first_name: None,
            last_name: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Account
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub identity: ExternalIdentity,

    /// Settled balance, spendable and withdrawable.
    pub coins: Decimal,
    /// Unsettled mined amount, bounded by `vault_capacity`.
    pub temp_coins: Decimal,

    pub vault_level: u32,
    pub vault_capacity: Decimal,
    pub mining_rate_level: u32,
    /// Coins per second of active mining.
    pub mining_rate: Decimal,

    pub energy_level: u32,
    pub current_energy: Decimal,
    pub max_energy: Decimal,
    pub health_level: u32,
    pub current_health: Decimal,
    pub max_health: Decimal,
    pub energy_per_second: Decimal,
    pub health_per_second: Decimal,

    pub is_mining: bool,
    pub last_mining_tick: Option<Timestamp>,

    pub level: u32,
    /// Levels already paid out to the referrer.
    pub rewarded_levels: BTreeSet<u32>,
    /// Set once at creation, never changed.
    pub referred_by: Option<AccountId>,
    /// Total coins earned from referees levelling up.
    pub referral_earnings: Decimal,

    pub last_spin: Option<Timestamp>,
    pub created_at: Timestamp,
}

impl Account {
    /// Fresh level-1 account with full energy and health.
    pub fn new(
        id: AccountId,
        identity: ExternalIdentity,
        referred_by: Option<AccountId>,
        settings: &Settings,
        now: Timestamp,
    ) -> Result<Self, GameError> {
        let vault_capacity = settings.schedule(Track::VaultCapacity)?.value_at(1)?;
        let mining_rate = settings.schedule(Track::MiningRate)?.value_at(1)?;
        let max_energy = settings.schedule(Track::MaxEnergy)?.value_at(1)?;
        let max_health = settings.schedule(Track::MaxHealth)?.value_at(1)?;

        Ok(Self {
            id,
            identity,
            coins: Decimal::ZERO,
            temp_coins: Decimal::ZERO,
            vault_level: 1,
            vault_capacity,
            mining_rate_level: 1,
            mining_rate,
            energy_level: 1,
            current_energy: max_energy,
            max_energy,
            health_level: 1,
            current_health: max_health,
            max_health,
            energy_per_second: settings.energy_per_second,
            health_per_second: settings.health_per_second,
            is_mining: false,
            last_mining_tick: None,
            level: 1,
            rewarded_levels: BTreeSet::new(),
            referred_by: referred_by.filter(|r| *r != id),
            referral_earnings: Decimal::ZERO,
            last_spin: None,
            created_at: now,
        })
    }

    pub fn track_level(&self, track: Track) -> u32 {
        match track {
            Track::VaultCapacity => self.vault_level,
            Track::MiningRate => self.mining_rate_level,
            Track::MaxEnergy => self.energy_level,
            Track::MaxHealth => self.health_level,
        }
    }

    pub fn track_value(&self, track: Track) -> Decimal {
        match track {
            Track::VaultCapacity => self.vault_capacity,
            Track::MiningRate => self.mining_rate,
            Track::MaxEnergy => self.max_energy,
            Track::MaxHealth => self.max_health,
        }
    }

    /// Set a track's level and its derived value together.
    pub(crate) fn set_track(&mut self, track: Track, level: u32, value: Decimal) {
        match track {
            Track::VaultCapacity => {
                self.vault_level = level;
                self.vault_capacity = value;
            }
            Track::MiningRate => {
                self.mining_rate_level = level;
                self.mining_rate = value;
            }
            Track::MaxEnergy => {
                self.energy_level = level;
                self.max_energy = value;
            }
            Track::MaxHealth => {
                self.health_level = level;
                self.max_health = value;
            }
        }
    }

    /// `(current, max)` of a decaying resource.
    pub fn resource(&self, resource: Resource) -> (Decimal, Decimal) {
        match resource {
            Resource::Energy => (self.current_energy, self.max_energy),
            Resource::Health => (self.current_health, self.max_health),
        }
    }

    pub(crate) fn fill(&mut self, resource: Resource) {
        match resource {
            Resource::Energy => self.current_energy = self.max_energy,
            Resource::Health => self.current_health = self.max_health,
        }
    }

    /// Player level: the lowest of the four track levels.
    pub fn derived_level(&self) -> u32 {
        Track::ALL
            .iter()
            .map(|t| self.track_level(*t))
            .min()
            .unwrap_or(1)
    }

    /// Debit the settled balance, failing without change if it is too low.
    pub(crate) fn debit(&mut self, amount: Decimal) -> Result<(), GameError> {
        if self.coins < amount {
            return Err(GameError::InsufficientFunds {
                required: amount,
                available: self.coins,
            });
        }
        self.coins -= amount;
        Ok(())
    }

    pub(crate) fn credit(&mut self, amount: Decimal) {
        self.coins += amount;
    }

    /// Verify the row invariants. Called before every commit.
    pub fn check_invariants(&self) -> Result<(), GameError> {
        let violation = |detail: String| GameError::InvariantViolated {
            account: self.id,
            detail,
        };

        let non_negative = [
            ("coins", self.coins),
            ("temp_coins", self.temp_coins),
            ("current_energy", self.current_energy),
            ("current_health", self.current_health),
            ("vault_capacity", self.vault_capacity),
            ("mining_rate", self.mining_rate),
            ("energy_per_second", self.energy_per_second),
            ("health_per_second", self.health_per_second),
            ("referral_earnings", self.referral_earnings),
        ];
        if let Some((field, value)) = non_negative.iter().find(|(_, v)| v.is_sign_negative() && !v.is_zero()) {
            return Err(violation(format!("{field} is negative ({value})")));
        }
        if self.temp_coins > self.vault_capacity {
            return Err(violation(format!(
                "temp_coins {} exceeds vault capacity {}",
                self.temp_coins, self.vault_capacity
            )));
        }
        if self.current_energy > self.max_energy {
            return Err(violation(format!(
                "energy {} exceeds max {}",
                self.current_energy, self.max_energy
            )));
        }
        if self.current_health > self.max_health {
            return Err(violation(format!(
                "health {} exceeds max {}",
                self.current_health, self.max_health
            )));
        }
        if self.is_mining && self.last_mining_tick.is_none() {
            return Err(violation("mining without a last tick".into()));
        }
        if let Some(level) = self.rewarded_levels.iter().find(|l| **l > self.level) {
            return Err(violation(format!(
                "rewarded level {level} above current level {}",
                self.level
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
