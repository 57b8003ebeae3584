// Copyright (c) 2026 Hypermesh Foundation. All rights reserved.
// Licensed under the Business Source License 1.1.
// See the LICENSE file in the repository root for full license text.

//! Prize selection for the bonus wheel.
//!
//! [`select_weighted`] is pure: it only draws from the supplied RNG.
//! [`spin`] owns the wheel policy around it (cooldown, crediting the prize).

use rand::Rng;
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::time::Duration;

use crate::account::Account;
use crate::core_types::Timestamp;
use crate::error::GameError;

/// Pick one entry with probability `weight / total_weight`.
///
/// Entries are walked in iteration order; the first whose cumulative weight
/// meets or exceeds the draw wins. Entries with zero weight are never returned. The
/// last positive entry is the fallback for rounding at the upper boundary.
/// Returns `None` when no entry has positive weight.
pub fn select_weighted<'a, V, I, R>(weights: I, rng: &mut R) -> Option<&'a V>
where
    I: IntoIterator<Item = (&'a V, &'a f64)>,
    I::IntoIter: Clone,
    R: Rng + ?Sized,
    V: 'a,
{
    let entries = weights
        .into_iter()
        .filter(|(_, w)| w.is_finite() && **w > 0.0);
    let total: f64 = entries.clone().map(|(_, w)| *w).sum();
    if total <= 0.0 {
        return None;
    }

    let draw = rng.gen_range(0.0..total);
    let mut cumulative = 0.0;
    let mut last = None;
    for (value, weight) in entries {
        cumulative += *weight;
        if cumulative >= draw {
            return Some(value);
        }
        last = Some(value);
    }
    last
}

/// Time left before `account` may spin again.
pub fn cooldown_remaining(account: &Account, cooldown: Duration, now: Timestamp) -> Option<Duration> {
    let last = account.last_spin?;
    let since = now.saturating_since(last);
    (since < cooldown).then(|| cooldown - since)
}

/// Spin the wheel: enforce the cooldown, draw a prize, credit it.
pub fn spin<R: Rng + ?Sized>(
    account: &mut Account,
    wheel: &BTreeMap<u32, f64>,
    cooldown: Duration,
    now: Timestamp,
    rng: &mut R,
) -> Result<Decimal, GameError> {
    if let Some(remaining) = cooldown_remaining(account, cooldown, now) {
        return Err(GameError::SpinCooldown { remaining });
    }
    let prize = select_weighted(wheel, rng)
        .map(|p| Decimal::from(*p))
        .ok_or_else(|| GameError::Misconfigured("wheel has no positive weights".into()))?;

    account.credit(prize);
    account.last_spin = Some(now);
    tracing::info!(account = %account.id, %prize, "wheel spun");
    Ok(prize)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::ExternalIdentity;
    use crate::core_types::AccountId;
    use crate::settings::Settings;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use rust_decimal_macros::dec;

    #[test]
    fn converges_to_weights() {
        let wheel = BTreeMap::from([(5u32, 90.0), (10u32, 10.0)]);
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let n = 100_000;
        let fives = (0..n)
            .filter(|_| select_weighted(&wheel, &mut rng) == Some(&5))
            .count();
        let ratio = fives as f64 / n as f64;
        assert!((ratio - 0.9).abs() < 0.01, "ratio {ratio} too far from 0.9");
    }

    #[test]
    fn zero_weight_never_selected() {
        let wheel = BTreeMap::from([(1u32, 0.0), (2u32, 3.0), (3u32, 0.0), (4u32, 1.0), (5u32, 0.0)]);
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        for _ in 0..20_000 {
            let picked = select_weighted(&wheel, &mut rng).copied();
            assert!(matches!(picked, Some(2) | Some(4)), "picked {picked:?}");
        }
    }

    #[test]
    fn draw_on_boundary_selects_earlier_entry() {
        use rand::rngs::mock::StepRng;

        let wheel = BTreeMap::from([(1u32, 1.0), (2u32, 0.0), (3u32, 1.0)]);
        // A high-bit word maps to the exact midpoint of [0, 2), i.e. a draw of 1.0.
        let mut on_boundary = StepRng::new(1 << 63, 0);
        assert_eq!(select_weighted(&wheel, &mut on_boundary), Some(&1));
        let mut at_zero = StepRng::new(0, 0);
        assert_eq!(select_weighted(&wheel, &mut at_zero), Some(&1));
        let mut at_top = StepRng::new(u64::MAX, 0);
        assert_eq!(select_weighted(&wheel, &mut at_top), Some(&3));
    }

    #[test]
    fn empty_or_weightless_yields_none() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let empty: BTreeMap<u32, f64> = BTreeMap::new();
        assert_eq!(select_weighted(&empty, &mut rng), None);
        let zeros = BTreeMap::from([(1u32, 0.0)]);
        assert_eq!(select_weighted(&zeros, &mut rng), None);
    }

    #[test]
    fn spin_enforces_cooldown() {
        let settings = Settings::default();
        let mut account =
            Account::new(AccountId(1), ExternalIdentity::new("a"), None, &settings, Timestamp(0))
                .expect("test: account");
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let cooldown = settings.spin_cooldown();

        let prize = spin(&mut account, &settings.spin_wheel_probabilities, cooldown, Timestamp(0), &mut rng)
            .expect("test: first spin");
        assert!(prize >= dec!(5) && prize <= dec!(40), "prize {prize} off the wheel");
        assert_eq!(account.coins, prize);

        let err = spin(
            &mut account,
            &settings.spin_wheel_probabilities,
            cooldown,
            Timestamp::from_secs(600),
            &mut rng,
        )
        .expect_err("test: cooling down");
        assert_eq!(
            err,
            GameError::SpinCooldown {
                remaining: Duration::from_secs(3000)
            }
        );
        assert_eq!(account.coins, prize);

        spin(
            &mut account,
            &settings.spin_wheel_probabilities,
            cooldown,
            Timestamp::from_secs(3600),
            &mut rng,
        )
        .expect("test: cooldown over");
    }
}
