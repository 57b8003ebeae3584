// Copyright (c) 2026 Hypermesh Foundation. All rights reserved.
// Licensed under the Business Source License 1.1.
// See the LICENSE file in the repository root for full license text.

//! Referral rewards -- level-triggered, idempotent payouts to the referrer.
//!
//! When a referee reaches level `n >= 2`, the referrer is credited
//! `referral_rewards[n]` once. The referee's `rewarded_levels` set is the
//! idempotency guard; it is checked and extended on the same working copy
//! as the referrer's credit, so a store transaction commits both or neither.

use rust_decimal::Decimal;
use std::collections::BTreeMap;

use crate::account::Account;

/// Lowest level that pays a referral reward.
pub const FIRST_REWARDED_LEVEL: u32 = 2;

/// Pay the referrer for `referee` reaching `new_level`.
///
/// Returns the amount paid, or `None` when nothing is owed: level below 2,
/// no referrer, no schedule entry, or the level was already rewarded.
pub fn on_level_up(
    referee: &mut Account,
    referrer: Option<&mut Account>,
    new_level: u32,
    schedule: &BTreeMap<u32, Decimal>,
) -> Option<Decimal> {
    if new_level < FIRST_REWARDED_LEVEL || referee.rewarded_levels.contains(&new_level) {
        return None;
    }
    let referrer = referrer.filter(|r| Some(r.id) == referee.referred_by)?;
    let amount = schedule.get(&new_level).copied().filter(|a| *a > Decimal::ZERO)?;

    referrer.credit(amount);
    referrer.referral_earnings += amount;
    referee.rewarded_levels.insert(new_level);

    tracing::info!(
        referee = %referee.id,
        referrer = %referrer.id,
        level = new_level,
        %amount,
        "referral reward paid"
    );
    Some(amount)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::ExternalIdentity;
    use crate::core_types::{AccountId, Timestamp};
    use crate::settings::Settings;
    use rust_decimal_macros::dec;

    fn pair() -> (Account, Account) {
        let settings = Settings::default();
        let referrer = Account::new(AccountId(1), ExternalIdentity::new("a"), None, &settings, Timestamp(0))
            .expect("test: referrer");
        let mut referee = Account::new(
            AccountId(2),
            ExternalIdentity::new("b"),
            Some(AccountId(1)),
            &settings,
            Timestamp(0),
        )
        .expect("test: referee");
        referee.level = 3;
        (referee, referrer)
    }

    #[test]
    fn pays_once_per_level() {
        let schedule = Settings::default().referral_rewards;
        let (mut referee, mut referrer) = pair();

        assert_eq!(on_level_up(&mut referee, Some(&mut referrer), 2, &schedule), Some(dec!(200)));
        assert_eq!(on_level_up(&mut referee, Some(&mut referrer), 2, &schedule), None);
        assert_eq!(referrer.coins, dec!(200));
        assert_eq!(referrer.referral_earnings, dec!(200));
        assert!(referee.rewarded_levels.contains(&2));

        assert_eq!(on_level_up(&mut referee, Some(&mut referrer), 3, &schedule), Some(dec!(510)));
        assert_eq!(referrer.coins, dec!(710));
    }

    #[test]
    fn level_one_never_pays() {
        let schedule = Settings::default().referral_rewards;
        let (mut referee, mut referrer) = pair();
        assert_eq!(on_level_up(&mut referee, Some(&mut referrer), 1, &schedule), None);
        assert!(referee.rewarded_levels.is_empty());
    }

    #[test]
    fn missing_referrer_is_silent() {
        let schedule = Settings::default().referral_rewards;
        let (mut referee, _) = pair();
        assert_eq!(on_level_up(&mut referee, None, 2, &schedule), None);
        // Not marked, so a later call with the referrer loaded still pays.
        assert!(referee.rewarded_levels.is_empty());
    }

    #[test]
    fn unscheduled_level_is_silent() {
        let (mut referee, mut referrer) = pair();
        let schedule = BTreeMap::from([(5, dec!(10))]);
        assert_eq!(on_level_up(&mut referee, Some(&mut referrer), 2, &schedule), None);
        assert_eq!(referrer.coins, Decimal::ZERO);
    }

    #[test]
    fn wrong_referrer_is_ignored() {
        let schedule = Settings::default().referral_rewards;
        let (mut referee, mut referrer) = pair();
        referrer.id = AccountId(99);
        assert_eq!(on_level_up(&mut referee, Some(&mut referrer), 2, &schedule), None);
        assert_eq!(referrer.coins, Decimal::ZERO);
    }
}
