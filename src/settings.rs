// Copyright (c) 2026 Hypermesh Foundation. All rights reserved.
// Licensed under the Business Source License 1.1.
// See the LICENSE file in the repository root for full license text.

//! Game settings snapshot and its refresh policy.
//!
//! [`Settings`] is an immutable value: reward tables, upgrade schedules,
//! prices, wheel odds and withdrawal bounds. Components never reach for a
//! global; they receive a `&Settings` (or an `Arc<Settings>` from a
//! [`SettingsCache`]) for the duration of one operation.
//!
//! The JSON shape matches the settings row used by the game backend, so a
//! snapshot exported from there loads unchanged.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use crate::core_types::{Timestamp, Track};
use crate::error::GameError;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("failed to read settings: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse settings: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid settings: {0}")]
    Invalid(String),
}

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

/// Process-wide game configuration snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    /// Coins paid to the referrer when a referee reaches a level.
    pub referral_rewards: BTreeMap<u32, Decimal>,
    pub spin_wheel_cooldown_hours: u64,
    /// Prize (coins) -> relative weight, walked in ascending prize order.
    pub spin_wheel_probabilities: BTreeMap<u32, f64>,
    /// Price of a full energy refill.
    pub energy_price: Decimal,
    /// Price of a full health refill.
    pub health_price: Decimal,
    /// Track -> level -> derived value.
    pub upgradables: BTreeMap<Track, BTreeMap<u32, Decimal>>,
    /// Track -> cost to leave level `i`, indexed by level.
    pub upgrade_costs: BTreeMap<Track, Vec<Decimal>>,
    pub upgradables_max_level: u32,
    /// Coins per one TON.
    pub coin_to_ton_rate: Decimal,
    pub minimum_coin_withdrawal: Decimal,
    pub maximum_coin_withdrawal: Decimal,
    /// Energy drained per second of active mining.
    #[serde(default = "default_drain")]
    pub energy_per_second: Decimal,
    /// Health drained per second of active mining.
    #[serde(default = "default_drain")]
    pub health_per_second: Decimal,
}

fn default_drain() -> Decimal {
    dec!(1)
}

const VAULT_CAPACITY: [Decimal; 13] = [
    dec!(100), dec!(200), dec!(300), dec!(400), dec!(500), dec!(600), dec!(700),
    dec!(800), dec!(900), dec!(1000), dec!(1100), dec!(1200), dec!(1300),
];

const MINING_RATE: [Decimal; 13] = [
    dec!(0.01), dec!(0.02), dec!(0.03), dec!(0.04), dec!(0.05), dec!(0.06), dec!(0.07),
    dec!(0.08), dec!(0.09), dec!(0.1), dec!(0.11), dec!(0.12), dec!(0.13),
];

const MAX_ENERGY: [Decimal; 13] = [
    dec!(1800), dec!(2700), dec!(3600), dec!(4500), dec!(5400), dec!(6300), dec!(7200),
    dec!(8100), dec!(9000), dec!(9900), dec!(10800), dec!(11700), dec!(12600),
];

const MAX_HEALTH: [Decimal; 13] = [
    dec!(3600), dec!(7200), dec!(10800), dec!(14400), dec!(18000), dec!(21600), dec!(25200),
    dec!(28800), dec!(32400), dec!(36000), dec!(39600), dec!(43200), dec!(46800),
];

const VAULT_COSTS: [Decimal; 13] = [
    dec!(0), dec!(500), dec!(1200), dec!(3000), dec!(7000), dec!(17000), dec!(40000),
    dec!(100000), dec!(220000), dec!(450000), dec!(950000), dec!(2000000), dec!(5000000),
];

const MINING_RATE_COSTS: [Decimal; 13] = [
    dec!(0), dec!(700), dec!(1900), dec!(4500), dec!(10700), dec!(25000), dec!(65000),
    dec!(150000), dec!(350000), dec!(800000), dec!(1800000), dec!(4000000), dec!(10000000),
];

// Energy and health share one cost curve.
const CEILING_COSTS: [Decimal; 13] = [
    dec!(0), dec!(400), dec!(1000), dec!(2400), dec!(5500), dec!(13000), dec!(30000),
    dec!(70000), dec!(170000), dec!(390000), dec!(850000), dec!(1850000), dec!(4000000),
];

const REFERRAL_REWARDS: [(u32, Decimal); 12] = [
    (2, dec!(200)),
    (3, dec!(510)),
    (4, dec!(1230)),
    (5, dec!(2870)),
    (6, dec!(6800)),
    (7, dec!(16500)),
    (8, dec!(39000)),
    (9, dec!(91000)),
    (10, dec!(203000)),
    (11, dec!(445000)),
    (12, dec!(970000)),
    (13, dec!(2300000)),
];

const WHEEL: [(u32, f64); 8] = [
    (5, 90.0),
    (10, 2.91),
    (15, 1.94),
    (20, 1.46),
    (25, 1.16),
    (30, 0.97),
    (35, 0.83),
    (40, 0.73),
];

fn levels(values: &[Decimal]) -> BTreeMap<u32, Decimal> {
    values
        .iter()
        .enumerate()
        .map(|(i, v)| (i as u32 + 1, *v))
        .collect()
}

impl Default for Settings {
    fn default() -> Self {
        let upgradables = BTreeMap::from([
            (Track::VaultCapacity, levels(&VAULT_CAPACITY)),
            (Track::MiningRate, levels(&MINING_RATE)),
            (Track::MaxEnergy, levels(&MAX_ENERGY)),
            (Track::MaxHealth, levels(&MAX_HEALTH)),
        ]);
        let upgrade_costs = BTreeMap::from([
            (Track::VaultCapacity, VAULT_COSTS.to_vec()),
            (Track::MiningRate, MINING_RATE_COSTS.to_vec()),
            (Track::MaxEnergy, CEILING_COSTS.to_vec()),
            (Track::MaxHealth, CEILING_COSTS.to_vec()),
        ]);
        Self {
            referral_rewards: REFERRAL_REWARDS.into_iter().collect(),
            spin_wheel_cooldown_hours: 1,
            spin_wheel_probabilities: WHEEL.into_iter().collect(),
            energy_price: dec!(25),
            health_price: dec!(25),
            upgradables,
            upgrade_costs,
            upgradables_max_level: 13,
            coin_to_ton_rate: dec!(135000),
            minimum_coin_withdrawal: dec!(1000),
            maximum_coin_withdrawal: dec!(135000),
            energy_per_second: default_drain(),
            health_per_second: default_drain(),
        }
    }
}

impl Settings {
    /// Parse a JSON snapshot and validate it.
    pub fn from_json(raw: &str) -> Result<Self, SettingsError> {
        let settings: Settings = serde_json::from_str(raw)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Check that every schedule covers `1..=max_level`, never decreases,
    /// and that withdrawal bounds and drain rates make sense.
    pub fn validate(&self) -> Result<(), SettingsError> {
        let max = self.upgradables_max_level;
        if max == 0 {
            return Err(SettingsError::Invalid("max level must be at least 1".into()));
        }
        for track in Track::ALL {
            let values = self.upgradables.get(&track).ok_or_else(|| {
                SettingsError::Invalid(format!("missing value schedule for {}", track.schedule_key()))
            })?;
            let costs = self.upgrade_costs.get(&track).ok_or_else(|| {
                SettingsError::Invalid(format!("missing cost schedule for {}", track.schedule_key()))
            })?;

            let mut previous = Decimal::ZERO;
            for level in 1..=max {
                let value = values.get(&level).copied().ok_or_else(|| {
                    SettingsError::Invalid(format!("{} has no value for level {level}", track.schedule_key()))
                })?;
                if value < previous {
                    return Err(SettingsError::Invalid(format!(
                        "{} value decreases at level {level}",
                        track.schedule_key()
                    )));
                }
                previous = value;
            }

            // Costs are read at indices 1..max (the price to leave each level
            // below the cap).
            if costs.len() < max as usize {
                return Err(SettingsError::Invalid(format!(
                    "{} needs {max} cost entries, has {}",
                    track.schedule_key(),
                    costs.len()
                )));
            }
            if costs.iter().any(|c| c.is_sign_negative()) {
                return Err(SettingsError::Invalid(format!("{} has a negative cost", track.schedule_key())));
            }
            if costs.windows(2).any(|w| w[1] < w[0]) {
                return Err(SettingsError::Invalid(format!("{} cost decreases", track.schedule_key())));
            }
        }

        if self.coin_to_ton_rate <= Decimal::ZERO {
            return Err(SettingsError::Invalid("coin to TON rate must be positive".into()));
        }
        if self.minimum_coin_withdrawal <= Decimal::ZERO
            || self.minimum_coin_withdrawal > self.maximum_coin_withdrawal
        {
            return Err(SettingsError::Invalid("withdrawal bounds out of order".into()));
        }
        if self.energy_per_second.is_sign_negative() || self.health_per_second.is_sign_negative() {
            return Err(SettingsError::Invalid("drain rates must not be negative".into()));
        }
        if self.spin_wheel_probabilities.values().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(SettingsError::Invalid("wheel weights must be finite and non-negative".into()));
        }
        Ok(())
    }

    /// Schedule view for one track.
    pub fn schedule(&self, track: Track) -> Result<UpgradeSchedule<'_>, GameError> {
        let values = self.upgradables.get(&track);
        let costs = self.upgrade_costs.get(&track);
        match (values, costs) {
            (Some(values), Some(costs)) => Ok(UpgradeSchedule {
                track,
                values,
                costs,
                max_level: self.upgradables_max_level,
            }),
            _ => Err(GameError::Misconfigured(format!(
                "no schedule for {}",
                track.schedule_key()
            ))),
        }
    }

    pub fn spin_cooldown(&self) -> Duration {
        Duration::from_secs(self.spin_wheel_cooldown_hours.saturating_mul(3600))
    }

    pub fn withdrawal_bounds(&self) -> WithdrawalBounds {
        WithdrawalBounds {
            minimum: self.minimum_coin_withdrawal,
            maximum: self.maximum_coin_withdrawal,
            coin_to_ton_rate: self.coin_to_ton_rate,
        }
    }

    /// Price of a full refill of `resource`.
    pub fn refill_price(&self, resource: crate::core_types::Resource) -> Decimal {
        match resource {
            crate::core_types::Resource::Energy => self.energy_price,
            crate::core_types::Resource::Health => self.health_price,
        }
    }
}

// ---------------------------------------------------------------------------
// UpgradeSchedule
// ---------------------------------------------------------------------------

/// Borrowed cost/value schedule for a single track.
#[derive(Debug, Clone, Copy)]
pub struct UpgradeSchedule<'a> {
    pub track: Track,
    values: &'a BTreeMap<u32, Decimal>,
    costs: &'a [Decimal],
    pub max_level: u32,
}

impl<'a> UpgradeSchedule<'a> {
    /// Derived track value at `level`.
    pub fn value_at(&self, level: u32) -> Result<Decimal, GameError> {
        self.values.get(&level).copied().ok_or_else(|| {
            GameError::Misconfigured(format!(
                "{} has no value for level {level}",
                self.track.schedule_key()
            ))
        })
    }

    /// Price to move from `level` to `level + 1`.
    pub fn cost_to_leave(&self, level: u32) -> Result<Decimal, GameError> {
        self.costs.get(level as usize).copied().ok_or_else(|| {
            GameError::Misconfigured(format!(
                "{} has no cost for level {level}",
                self.track.schedule_key()
            ))
        })
    }
}

// ---------------------------------------------------------------------------
// WithdrawalBounds
// ---------------------------------------------------------------------------

/// Withdrawal limits exposed to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawalBounds {
    pub minimum: Decimal,
    pub maximum: Decimal,
    pub coin_to_ton_rate: Decimal,
}

impl WithdrawalBounds {
    /// TON amount for `coins`, rounded to nanoTON precision.
    pub fn to_ton(&self, coins: Decimal) -> Decimal {
        (coins / self.coin_to_ton_rate).round_dp(9)
    }
}

// ---------------------------------------------------------------------------
// Sources
// ---------------------------------------------------------------------------

/// Supplier of settings snapshots.
pub trait SettingsSource: Send + Sync {
    fn load(&self) -> Result<Settings, SettingsError>;
}

/// Fixed in-process snapshot.
#[derive(Debug, Clone, Default)]
pub struct StaticSettings(pub Settings);

impl SettingsSource for StaticSettings {
    fn load(&self) -> Result<Settings, SettingsError> {
        Ok(self.0.clone())
    }
}

/// JSON file re-read on every load.
#[derive(Debug, Clone)]
pub struct JsonFileSettings {
    pub path: PathBuf,
}

impl SettingsSource for JsonFileSettings {
    fn load(&self) -> Result<Settings, SettingsError> {
        let raw = std::fs::read_to_string(&self.path)?;
        Settings::from_json(&raw)
    }
}

// ---------------------------------------------------------------------------
// SettingsCache
// ---------------------------------------------------------------------------

/// When a cached snapshot is reloaded from its source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshPolicy {
    /// Only on an explicit [`SettingsCache::refresh`].
    Manual,
    /// Lazily on the first read after the snapshot is older than this.
    Ttl(Duration),
}

struct Cached {
    snapshot: Arc<Settings>,
    loaded_at: Timestamp,
}

/// Holds the current snapshot and reloads it under a [`RefreshPolicy`].
pub struct SettingsCache<S: SettingsSource> {
    source: S,
    policy: RefreshPolicy,
    cached: RwLock<Cached>,
}

impl<S: SettingsSource> SettingsCache<S> {
    /// Load the first snapshot. Fails if the source cannot produce one.
    pub fn new(source: S, policy: RefreshPolicy, now: Timestamp) -> Result<Self, SettingsError> {
        let settings = source.load()?;
        settings.validate()?;
        Ok(Self {
            source,
            policy,
            cached: RwLock::new(Cached {
                snapshot: Arc::new(settings),
                loaded_at: now,
            }),
        })
    }

    pub fn policy(&self) -> RefreshPolicy {
        self.policy
    }

    /// Current snapshot, reloading first if the TTL has expired.
    ///
    /// Only the reader that claims an expired window reloads. A failed reload
    /// keeps serving the previous snapshot until the next window.
    pub fn snapshot(&self, now: Timestamp) -> Arc<Settings> {
        if let RefreshPolicy::Ttl(ttl) = self.policy {
            let stale = {
                let cached = self.cached.read().unwrap_or_else(|e| e.into_inner());
                now.saturating_since(cached.loaded_at) >= ttl
            };
            if stale && self.claim_reload(now, ttl) {
                if let Err(err) = self.refresh(now) {
                    tracing::warn!(error = %err, "settings refresh failed, keeping previous snapshot");
                }
            }
        }
        self.cached
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .snapshot
            .clone()
    }

    /// Stamp the window as reloaded so concurrent readers keep the old snapshot.
    fn claim_reload(&self, now: Timestamp, ttl: Duration) -> bool {
        let mut cached = self.cached.write().unwrap_or_else(|e| e.into_inner());
        if now.saturating_since(cached.loaded_at) < ttl {
            return false;
        }
        cached.loaded_at = now;
        true
    }

    /// Reload from the source now, regardless of policy.
    pub fn refresh(&self, now: Timestamp) -> Result<Arc<Settings>, SettingsError> {
        let settings = self.source.load()?;
        settings.validate()?;
        let snapshot = Arc::new(settings);
        let mut cached = self.cached.write().unwrap_or_else(|e| e.into_inner());
        cached.snapshot = snapshot.clone();
        cached.loaded_at = now;
        tracing::debug!(at = %now, "settings snapshot refreshed");
        Ok(snapshot)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn default_settings_validate() {
        let settings = Settings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.spin_cooldown(), Duration::from_secs(3600));
    }

    #[test]
    fn schedule_lookup() {
        let settings = Settings::default();
        let vault = settings.schedule(Track::VaultCapacity).expect("test: vault schedule");
        assert_eq!(vault.value_at(1).expect("test: level 1"), dec!(100));
        assert_eq!(vault.value_at(13).expect("test: level 13"), dec!(1300));
        assert_eq!(vault.cost_to_leave(1).expect("test: cost"), dec!(500));
        assert!(vault.value_at(14).is_err());
    }

    #[test]
    fn json_round_trip_keeps_shape() {
        let settings = Settings::default();
        let raw = serde_json::to_string(&settings).expect("test: serialize");
        assert!(raw.contains("\"upgradablesMaxLevel\":13"));
        assert!(raw.contains("\"vaultCapacity\""));
        let parsed = Settings::from_json(&raw).expect("test: parse");
        assert_eq!(parsed, settings);
    }

    #[test]
    fn incomplete_schedule_is_rejected() {
        let mut settings = Settings::default();
        if let Some(values) = settings.upgradables.get_mut(&Track::MiningRate) {
            values.remove(&7);
        }
        let err = settings.validate().expect_err("test: missing level");
        assert!(err.to_string().contains("miningRate"));
    }

    #[test]
    fn decreasing_costs_are_rejected() {
        let mut settings = Settings::default();
        if let Some(costs) = settings.upgrade_costs.get_mut(&Track::MaxEnergy) {
            costs[3] = dec!(1);
        }
        assert!(settings.validate().is_err());
    }

    #[test]
    fn inverted_bounds_are_rejected() {
        let settings = Settings {
            minimum_coin_withdrawal: dec!(5000),
            maximum_coin_withdrawal: dec!(10),
            ..Settings::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn ton_conversion_rounds_to_nano() {
        let bounds = Settings::default().withdrawal_bounds();
        assert_eq!(bounds.to_ton(dec!(135000)), dec!(1));
        assert_eq!(bounds.to_ton(dec!(1000)), dec!(0.007407407));
    }

    struct CountingSource(AtomicU32);

    impl SettingsSource for CountingSource {
        fn load(&self) -> Result<Settings, SettingsError> {
            let n = self.0.fetch_add(1, Ordering::SeqCst);
            Ok(Settings {
                spin_wheel_cooldown_hours: u64::from(n) + 1,
                ..Settings::default()
            })
        }
    }

    #[test]
    fn manual_policy_never_reloads_on_read() {
        let cache = SettingsCache::new(CountingSource(AtomicU32::new(0)), RefreshPolicy::Manual, Timestamp(0))
            .expect("test: initial load");
        let later = Timestamp::from_secs(100_000);
        assert_eq!(cache.snapshot(later).spin_wheel_cooldown_hours, 1);
        let refreshed = cache.refresh(later).expect("test: refresh");
        assert_eq!(refreshed.spin_wheel_cooldown_hours, 2);
        assert_eq!(cache.snapshot(later).spin_wheel_cooldown_hours, 2);
    }

    #[test]
    fn ttl_policy_reloads_after_expiry() {
        let cache = SettingsCache::new(
            CountingSource(AtomicU32::new(0)),
            RefreshPolicy::Ttl(Duration::from_secs(60)),
            Timestamp(0),
        )
        .expect("test: initial load");
        assert_eq!(cache.snapshot(Timestamp::from_secs(59)).spin_wheel_cooldown_hours, 1);
        assert_eq!(cache.snapshot(Timestamp::from_secs(60)).spin_wheel_cooldown_hours, 2);
        assert_eq!(cache.snapshot(Timestamp::from_secs(61)).spin_wheel_cooldown_hours, 2);
    }

    struct BrokenAfterFirst(AtomicU32);

    impl SettingsSource for BrokenAfterFirst {
        fn load(&self) -> Result<Settings, SettingsError> {
            if self.0.fetch_add(1, Ordering::SeqCst) == 0 {
                Ok(Settings::default())
            } else {
                Err(SettingsError::Invalid("source offline".into()))
            }
        }
    }

    #[test]
    fn failed_refresh_keeps_previous_snapshot() {
        let cache = SettingsCache::new(
            BrokenAfterFirst(AtomicU32::new(0)),
            RefreshPolicy::Ttl(Duration::from_secs(1)),
            Timestamp(0),
        )
        .expect("test: initial load");
        let snapshot = cache.snapshot(Timestamp::from_secs(10));
        assert_eq!(*snapshot, Settings::default());
    }

    #[test]
    fn failed_refresh_waits_for_next_window() {
        let cache = SettingsCache::new(
            BrokenAfterFirst(AtomicU32::new(0)),
            RefreshPolicy::Ttl(Duration::from_secs(60)),
            Timestamp(0),
        )
        .expect("test: initial load");

        for _ in 0..100 {
            assert_eq!(*cache.snapshot(Timestamp::from_secs(61)), Settings::default());
        }
        // One initial load plus one failed reload.
        assert_eq!(cache.source.0.load(Ordering::SeqCst), 2);

        cache.snapshot(Timestamp::from_secs(120));
        assert_eq!(cache.source.0.load(Ordering::SeqCst), 2);
        cache.snapshot(Timestamp::from_secs(121));
        assert_eq!(cache.source.0.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn json_file_source_reads_and_rejects() {
        let dir = std::env::temp_dir().join(format!("coinup-settings-{}", std::process::id()));
        std::fs::create_dir_all(&dir).expect("test: temp dir");
        let path = dir.join("settings.json");
        let settings = Settings {
            spin_wheel_cooldown_hours: 6,
            ..Settings::default()
        };
        std::fs::write(&path, serde_json::to_string(&settings).expect("test: serialize")).expect("test: write");

        let source = JsonFileSettings { path: path.clone() };
        assert_eq!(source.load().expect("test: load").spin_wheel_cooldown_hours, 6);

        std::fs::write(&path, "{\"upgradablesMaxLevel\": ").expect("test: write");
        assert!(source.load().is_err());

        let missing = JsonFileSettings { path: dir.join("absent.json") };
        assert!(missing.load().is_err());
        std::fs::remove_dir_all(&dir).ok();
    }
}
