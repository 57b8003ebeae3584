// Copyright (c) 2026 Hypermesh Foundation. All rights reserved.
// Licensed under the Business Source License 1.1.
// See the LICENSE file in the repository root for full license text.

//! Upgrade ledger -- track levels, their prices and derived values.
//!
//! Each [`Track`] has a value schedule (level -> derived value) and a cost
//! schedule (level -> price to leave that level), both capped at
//! `upgradables_max_level`. Buying an energy or health upgrade refills that
//! resource to the new ceiling.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::account::Account;
use crate::core_types::{Resource, Track};
use crate::error::GameError;
use crate::settings::Settings;

// ---------------------------------------------------------------------------
// Result types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Purchase {
    pub track: Track,
    pub spent: Decimal,
    pub new_level: u32,
    pub new_value: Decimal,
}

/// Read model of one track for the upgrade screen.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpgradeStatus {
    pub track: Track,
    pub name: &'static str,
    pub description: &'static str,
    pub level: u32,
    pub max_level: u32,
    pub current_value: Decimal,
    /// `None` at max level.
    pub next_value: Option<Decimal>,
    /// `None` at max level.
    pub cost: Option<Decimal>,
    pub can_upgrade: bool,
}

// ---------------------------------------------------------------------------
// Operations
// ---------------------------------------------------------------------------

/// Buy the next level of `track`.
///
/// Charges the price to leave the current level, moves the track one tier up
/// and, for the ceiling tracks, refills the resource to the new maximum.
pub fn purchase(account: &mut Account, track: Track, settings: &Settings) -> Result<Purchase, GameError> {
    let schedule = settings.schedule(track)?;
    let current = account.track_level(track);
    if current >= schedule.max_level {
        return Err(GameError::MaxLevelReached {
            track,
            level: current,
        });
    }

    let next_level = current + 1;
    let cost = schedule.cost_to_leave(current)?;
    let new_value = schedule.value_at(next_level)?;

    account.debit(cost)?;
    account.set_track(track, next_level, new_value);
    if let Some(resource) = track.refills() {
        account.fill(resource);
    }

    tracing::info!(
        account = %account.id,
        %track,
        level = next_level,
        spent = %cost,
        value = %new_value,
        "upgrade purchased"
    );

    Ok(Purchase {
        track,
        spent: cost,
        new_level: next_level,
        new_value,
    })
}

/// Buy a full tank of `resource` at the configured price.
pub fn refill(account: &mut Account, resource: Resource, settings: &Settings) -> Result<Decimal, GameError> {
    let (current, max) = account.resource(resource);
    if current >= max {
        return Err(GameError::ResourceFull {
            resource,
            current,
            max,
        });
    }
    let price = settings.refill_price(resource);
    account.debit(price)?;
    account.fill(resource);
    tracing::info!(account = %account.id, %resource, spent = %price, "resource refilled");
    Ok(price)
}

/// Status of every track, in the fixed track order.
pub fn upgrade_status(account: &Account, settings: &Settings) -> Result<Vec<UpgradeStatus>, GameError> {
    Track::ALL
        .iter()
        .map(|&track| {
            let schedule = settings.schedule(track)?;
            let level = account.track_level(track);
            let can_upgrade = level < schedule.max_level;
            let (next_value, cost) = if can_upgrade {
                (
                    Some(schedule.value_at(level + 1)?),
                    Some(schedule.cost_to_leave(level)?),
                )
            } else {
                (None, None)
            };
            Ok(UpgradeStatus {
                track,
                name: track.public_name(),
                description: track.description(),
                level,
                max_level: schedule.max_level,
                current_value: account.track_value(track),
                next_value,
                cost,
                can_upgrade,
            })
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::ExternalIdentity;
    use crate::core_types::{AccountId, Timestamp};
    use rust_decimal_macros::dec;

    fn account_with(coins: Decimal) -> Account {
        let mut account = Account::new(
            AccountId(1),
            ExternalIdentity::new("tg-1"),
            None,
            &Settings::default(),
            Timestamp(0),
        )
        .expect("test: new account");
        account.coins = coins;
        account
    }

    #[test]
    fn purchase_charges_current_level_price() {
        let settings = Settings::default();
        let mut account = account_with(dec!(600));
        let p = purchase(&mut account, Track::VaultCapacity, &settings).expect("test: purchase");
        assert_eq!(p.spent, dec!(500));
        assert_eq!(p.new_level, 2);
        assert_eq!(p.new_value, dec!(200));
        assert_eq!(account.coins, dec!(100));
        assert_eq!(account.vault_capacity, dec!(200));
        assert_eq!(account.vault_level, 2);
    }

    #[test]
    fn insufficient_funds_changes_nothing() {
        let settings = Settings::default();
        let mut account = account_with(dec!(699));
        let before = account.clone();
        let err = purchase(&mut account, Track::MiningRate, &settings).expect_err("test: too poor");
        assert_eq!(
            err,
            GameError::InsufficientFunds {
                required: dec!(700),
                available: dec!(699)
            }
        );
        assert_eq!(account, before);
    }

    #[test]
    fn max_level_is_enforced() {
        let settings = Settings::default();
        let mut account = account_with(dec!(100000000));
        account.mining_rate_level = 13;
        let err = purchase(&mut account, Track::MiningRate, &settings).expect_err("test: capped");
        assert_eq!(
            err,
            GameError::MaxLevelReached {
                track: Track::MiningRate,
                level: 13
            }
        );
    }

    #[test]
    fn ceiling_upgrade_refills_resource() {
        let settings = Settings::default();
        let mut account = account_with(dec!(1000));
        account.current_energy = dec!(12);
        account.current_health = dec!(7);

        purchase(&mut account, Track::MaxEnergy, &settings).expect("test: energy");
        assert_eq!(account.max_energy, dec!(2700));
        assert_eq!(account.current_energy, dec!(2700));
        // Health is untouched by an energy upgrade.
        assert_eq!(account.current_health, dec!(7));

        purchase(&mut account, Track::MaxHealth, &settings).expect("test: health");
        assert_eq!(account.current_health, dec!(7200));
        assert_eq!(account.coins, dec!(200));
    }

    #[test]
    fn refill_costs_configured_price() {
        let settings = Settings::default();
        let mut account = account_with(dec!(30));
        assert!(matches!(
            refill(&mut account, Resource::Energy, &settings),
            Err(GameError::ResourceFull { .. })
        ));

        account.current_energy = dec!(1);
        let spent = refill(&mut account, Resource::Energy, &settings).expect("test: refill");
        assert_eq!(spent, dec!(25));
        assert_eq!(account.current_energy, account.max_energy);
        assert_eq!(account.coins, dec!(5));

        account.current_health = dec!(1);
        assert!(matches!(
            refill(&mut account, Resource::Health, &settings),
            Err(GameError::InsufficientFunds { .. })
        ));
    }

    #[test]
    fn status_lists_all_tracks() {
        let settings = Settings::default();
        let mut account = account_with(Decimal::ZERO);
        account.health_level = 13;
        let status = upgrade_status(&account, &settings).expect("test: status");
        assert_eq!(status.len(), 4);
        assert_eq!(status[0].name, "wealth");
        assert_eq!(status[0].cost, Some(dec!(500)));
        assert_eq!(status[0].next_value, Some(dec!(200)));
        assert!(status[0].can_upgrade);
        assert_eq!(status[3].name, "immune");
        assert!(!status[3].can_upgrade);
        assert_eq!(status[3].cost, None);
    }
}
