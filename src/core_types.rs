// Copyright (c) 2026 Hypermesh Foundation. All rights reserved.
// Licensed under the Business Source License 1.1.
// See the LICENSE file in the repository root for full license text.

//! Shared identifiers and small value types.
//!
//! Everything here is plain data: ids, wall-clock timestamps, the upgrade
//! track table, and the lifecycle enums of mining sessions and withdrawals.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::error::GameError;

// ---------------------------------------------------------------------------
// AccountId
// ---------------------------------------------------------------------------

/// Internal account identifier, assigned by the store on creation.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub struct AccountId(pub u64);

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "acct-{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// WithdrawalId
// ---------------------------------------------------------------------------

/// Withdrawal request identifier, assigned by the store on reservation.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub struct WithdrawalId(pub u64);

impl fmt::Display for WithdrawalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "wd-{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Timestamp
// ---------------------------------------------------------------------------

/// Wall-clock instant in milliseconds since the Unix epoch.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub struct Timestamp(pub u64);

impl Timestamp {
    /// Current wall-clock time. A clock set before the epoch reads as zero.
    pub fn now() -> Self {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        Self(millis)
    }

    pub fn from_secs(secs: u64) -> Self {
        Self(secs.saturating_mul(1000))
    }

    pub fn as_millis(&self) -> u64 {
        self.0
    }

    /// Time elapsed since `earlier`, clamped to zero on clock skew.
    pub fn saturating_since(&self, earlier: Timestamp) -> Duration {
        Duration::from_millis(self.0.saturating_sub(earlier.0))
    }

    /// Seconds elapsed since `earlier` as a decimal with millisecond precision.
    pub fn seconds_since(&self, earlier: Timestamp) -> Decimal {
        Decimal::new(self.0.saturating_sub(earlier.0) as i64, 3)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ms", self.0)
    }
}

// ---------------------------------------------------------------------------
// Track
// ---------------------------------------------------------------------------

/// Purchasable upgrade track.
///
/// The set is closed: every track maps to exactly one level field, one value
/// field and one schedule in [`crate::settings::Settings`].
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Track {
    /// Vault capacity (public name `wealth`).
    VaultCapacity,
    /// Mining rate in coins per second (public name `work`).
    MiningRate,
    /// Energy ceiling (public name `food`).
    MaxEnergy,
    /// Health ceiling (public name `immune`).
    MaxHealth,
}

impl Track {
    pub const ALL: [Track; 4] = [
        Track::VaultCapacity,
        Track::MiningRate,
        Track::MaxEnergy,
        Track::MaxHealth,
    ];

    /// Name shown to players.
    pub fn public_name(&self) -> &'static str {
        match self {
            Self::VaultCapacity => "wealth",
            Self::MiningRate => "work",
            Self::MaxEnergy => "food",
            Self::MaxHealth => "immune",
        }
    }

    /// Key of this track's schedule in the settings tables.
    pub fn schedule_key(&self) -> &'static str {
        match self {
            Self::VaultCapacity => "vaultCapacity",
            Self::MiningRate => "miningRate",
            Self::MaxEnergy => "maxEnergy",
            Self::MaxHealth => "maxHealth",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::VaultCapacity => "Coin capacity: store more before collecting",
            Self::MiningRate => "Coin mining: earn more per second",
            Self::MaxEnergy => "Energy tank: work longer before refill",
            Self::MaxHealth => "Immune strength: resist more damage",
        }
    }

    /// The resource refilled when this track is upgraded, if any.
    pub fn refills(&self) -> Option<Resource> {
        match self {
            Self::MaxEnergy => Some(Resource::Energy),
            Self::MaxHealth => Some(Resource::Health),
            Self::VaultCapacity | Self::MiningRate => None,
        }
    }
}

impl fmt::Display for Track {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.public_name())
    }
}

impl FromStr for Track {
    type Err = GameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Track::ALL
            .into_iter()
            .find(|t| t.public_name() == s || t.schedule_key() == s)
            .ok_or_else(|| GameError::InvalidTrack(s.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Resource
// ---------------------------------------------------------------------------

/// Decaying resource drained while mining.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Resource {
    Energy,
    Health,
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Energy => f.write_str("energy"),
            Self::Health => f.write_str("health"),
        }
    }
}

// ---------------------------------------------------------------------------
// MiningOutcome
// ---------------------------------------------------------------------------

/// Result classification of one reconciliation.
///
/// Precedence when several constraints bind at once:
/// `HealthDepleted` > `EnergyDepleted` > `VaultFull` > `InProgress`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MiningOutcome {
    /// Health hit zero; unsettled coins burned, mining stopped.
    HealthDepleted,
    /// Energy hit zero; mining stopped, no burn.
    EnergyDepleted,
    /// Vault reached capacity; mining stopped, no burn.
    VaultFull,
    /// No constraint bound; mining continues.
    InProgress,
}

impl MiningOutcome {
    /// Whether this outcome ends the mining session.
    pub fn stops_mining(&self) -> bool {
        !matches!(self, Self::InProgress)
    }
}

// ---------------------------------------------------------------------------
// WithdrawalStatus
// ---------------------------------------------------------------------------

/// Withdrawal lifecycle: `Pending -> Completed | Failed`, nothing else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WithdrawalStatus {
    /// Funds reserved, payment not yet resolved.
    Pending,
    /// TERMINAL: payment broadcast, debit stands.
    Completed,
    /// TERMINAL: payment failed, debit reversed.
    Failed,
}

impl WithdrawalStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Whether `self -> next` is a legal transition.
    pub fn can_transition_to(&self, next: WithdrawalStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Completed) | (Self::Pending, Self::Failed)
        )
    }
}

impl fmt::Display for WithdrawalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => f.write_str("PENDING"),
            Self::Completed => f.write_str("COMPLETED"),
            Self::Failed => f.write_str("FAILED"),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn track_parses_public_and_schedule_names() {
        assert_eq!("wealth".parse::<Track>().ok(), Some(Track::VaultCapacity));
        assert_eq!("miningRate".parse::<Track>().ok(), Some(Track::MiningRate));
        assert_eq!("food".parse::<Track>().ok(), Some(Track::MaxEnergy));
        assert_eq!("maxHealth".parse::<Track>().ok(), Some(Track::MaxHealth));
    }

    #[test]
    fn unknown_track_is_rejected() {
        let err = "speed".parse::<Track>().expect_err("test: unknown track");
        assert!(matches!(err, GameError::InvalidTrack(ref name) if name == "speed"));
    }

    #[test]
    fn only_ceiling_tracks_refill() {
        assert_eq!(Track::MaxEnergy.refills(), Some(Resource::Energy));
        assert_eq!(Track::MaxHealth.refills(), Some(Resource::Health));
        assert_eq!(Track::VaultCapacity.refills(), None);
        assert_eq!(Track::MiningRate.refills(), None);
    }

    #[test]
    fn seconds_since_clamps_skew() {
        let a = Timestamp(10_500);
        let b = Timestamp(12_000);
        assert_eq!(b.seconds_since(a), dec!(1.5));
        assert_eq!(a.seconds_since(b), Decimal::ZERO);
        assert_eq!(a.saturating_since(b), Duration::ZERO);
        assert_eq!(Timestamp::from_secs(12).as_millis(), 12_000);
    }

    #[test]
    fn withdrawal_transitions() {
        use WithdrawalStatus::*;
        assert!(Pending.can_transition_to(Completed));
        assert!(Pending.can_transition_to(Failed));
        assert!(!Completed.can_transition_to(Failed));
        assert!(!Failed.can_transition_to(Pending));
        assert!(!Completed.can_transition_to(Pending));
        assert!(!Pending.is_terminal());
        assert!(Completed.is_terminal() && Failed.is_terminal());
    }

    #[test]
    fn only_in_progress_keeps_mining() {
        assert!(!MiningOutcome::InProgress.stops_mining());
        assert!(MiningOutcome::VaultFull.stops_mining());
        assert!(MiningOutcome::EnergyDepleted.stops_mining());
        assert!(MiningOutcome::HealthDepleted.stops_mining());
    }
}
