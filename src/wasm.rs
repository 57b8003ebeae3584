// Copyright (c) 2026 Hypermesh Foundation. All rights reserved.
// Licensed under the Business Source License 1.1.
// See the LICENSE file in the repository root for full license text.

//! Browser preview of a mining session.
//!
//! The client holds the last account row it received and calls
//! [`preview_reconcile`] every animation frame to render the vault, energy
//! and health between server polls. Nothing is persisted.

use serde::Serialize;
use wasm_bindgen::prelude::*;

use crate::account::Account;
use crate::core_types::{MiningOutcome, Timestamp};
use crate::error::GameError;
use crate::simulator;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Preview {
    pub account: Account,
    /// `None` when the account is not mining.
    pub outcome: Option<MiningOutcome>,
    pub time_to_stop_ms: Option<u64>,
}

/// Reconciled copy of `account` at `now`.
pub fn preview_at(account: &Account, now: Timestamp) -> Result<Preview, GameError> {
    let (account, outcome) = match simulator::preview(account, now) {
        Ok((next, r)) => (next, Some(r.outcome)),
        Err(GameError::NotMining) => (account.clone(), None),
        Err(err) => return Err(err),
    };
    let time_to_stop_ms = simulator::time_to_stop(&account).map(|d| d.as_millis() as u64);
    Ok(Preview {
        account,
        outcome,
        time_to_stop_ms,
    })
}

// ─── WASM Interface ──────────────────────────────────────────────────────────

#[wasm_bindgen]
pub fn preview_reconcile(account: JsValue, now_ms: f64) -> Result<JsValue, JsValue> {
    #[cfg(target_arch = "wasm32")]
    std::panic::set_hook(Box::new(console_error_panic_hook::hook));

    let account: Account = serde_wasm_bindgen::from_value(account)?;
    let now = Timestamp(now_ms.max(0.0) as u64);
    let preview = preview_at(&account, now).map_err(|e| JsValue::from_str(&e.to_string()))?;
    Ok(serde_wasm_bindgen::to_value(&preview)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::ExternalIdentity;
    use crate::core_types::AccountId;
    use crate::settings::Settings;
    use rust_decimal_macros::dec;

    fn account() -> Account {
        Account::new(AccountId(1), ExternalIdentity::new("tg-1"), None, &Settings::default(), Timestamp(0))
            .expect("test: account")
    }

    #[test]
    fn idle_account_passes_through() {
        let a = account();
        let p = preview_at(&a, Timestamp::from_secs(60)).expect("test: preview");
        assert_eq!(p.outcome, None);
        assert_eq!(p.account, a);
        assert_eq!(p.time_to_stop_ms, None);
    }

    #[test]
    fn running_session_is_projected() {
        let mut a = account();
        simulator::start_mining(&mut a, Timestamp(0)).expect("test: start");
        let p = preview_at(&a, Timestamp::from_secs(100)).expect("test: preview");
        assert_eq!(p.outcome, Some(MiningOutcome::InProgress));
        assert_eq!(p.account.temp_coins, dec!(1));
        // Energy (1800 at 1/s) binds first: 1700s left.
        assert_eq!(p.time_to_stop_ms, Some(1_700_000));
        // Source row untouched.
        assert_eq!(a.temp_coins, dec!(0));
    }
}
