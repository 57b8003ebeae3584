// Copyright (c) 2026 Hypermesh Foundation. All rights reserved.
// Licensed under the Business Source License 1.1.
// See the LICENSE file in the repository root for full license text.

//! CoinUp economy engine.
//!
//! Lazily reconciled mining sessions, the upgrade ledger, referral rewards,
//! the bonus wheel and the withdrawal saga, behind a store port so every
//! balance change commits atomically per account.

pub mod core_types;
pub mod error;
pub mod settings;
pub mod account;

pub mod simulator;
pub mod upgrades;
pub mod referral;
pub mod prize;

pub mod store;
pub mod withdrawal;
pub mod service;
pub mod wasm;

pub use account::{Account, ExternalIdentity};
pub use core_types::{AccountId, MiningOutcome, Resource, Timestamp, Track, WithdrawalId, WithdrawalStatus};
pub use error::{ErrorKind, GameError, StoreError};
pub use service::GameService;
pub use settings::{RefreshPolicy, Settings, SettingsCache};
pub use store::{AccountStore, InMemoryStore, WithdrawalRequest};
pub use withdrawal::{Notifier, PaymentRail, WithdrawalSaga};
