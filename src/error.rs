// Copyright (c) 2026 Hypermesh Foundation. All rights reserved.
// Licensed under the Business Source License 1.1.
// See the LICENSE file in the repository root for full license text.

//! Error taxonomy.
//!
//! Every failure carries a stable machine-readable code ([`GameError::code`])
//! and a coarse [`ErrorKind`] that tells the caller how to react. The
//! `Display` output is the human-readable reason.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::core_types::{AccountId, Track, WithdrawalId, WithdrawalStatus};

// ---------------------------------------------------------------------------
// ErrorKind
// ---------------------------------------------------------------------------

/// How a failure should be treated by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Bad input shape or bounds. Never retried automatically.
    Validation,
    /// The account is not in a state that allows the operation.
    StateConflict,
    /// Settled balance too low.
    InsufficientFunds,
    /// Referenced account or withdrawal does not exist.
    NotFound,
    /// Payment rail unreachable or rejected the transfer.
    ExternalTransport,
    /// A compensation write failed; needs operator intervention.
    FatalReconciliation,
    /// The persistence layer failed.
    Storage,
    /// The settings snapshot is incomplete or inconsistent.
    Configuration,
}

// ---------------------------------------------------------------------------
// StoreError
// ---------------------------------------------------------------------------

/// Failures raised by an [`crate::store::AccountStore`] implementation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("store lock poisoned")]
    Poisoned,

    #[error("write rejected: {0}")]
    WriteRejected(String),
}

// ---------------------------------------------------------------------------
// GameError
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GameError {
    // -- validation ---------------------------------------------------------
    #[error("minimum withdrawal is {minimum} coins, requested {requested}")]
    AmountBelowMinimum { minimum: Decimal, requested: Decimal },

    #[error("maximum withdrawal is {maximum} coins, requested {requested}")]
    AmountAboveMaximum { maximum: Decimal, requested: Decimal },

    #[error("amount must be positive, got {0}")]
    NonPositiveAmount(Decimal),

    #[error("invalid destination address: {0}")]
    InvalidAddress(String),

    #[error("invalid upgrade track: {0}")]
    InvalidTrack(String),

    // -- state conflicts ----------------------------------------------------
    #[error("account is not mining")]
    NotMining,

    #[error("account is already mining")]
    AlreadyMining,

    #[error("{track} is already at max level {level}")]
    MaxLevelReached { track: Track, level: u32 },

    #[error("vault is full ({temp_coins}/{capacity}); collect to continue mining")]
    VaultFull { temp_coins: Decimal, capacity: Decimal },

    #[error("vault not full yet ({temp_coins}/{capacity}); nothing to collect")]
    VaultNotFull { temp_coins: Decimal, capacity: Decimal },

    #[error("energy depleted ({current}/{max})")]
    EnergyDepleted { current: Decimal, max: Decimal },

    #[error("health depleted ({current}/{max})")]
    HealthDepleted { current: Decimal, max: Decimal },

    #[error("{resource} is already full ({current}/{max})")]
    ResourceFull {
        resource: crate::core_types::Resource,
        current: Decimal,
        max: Decimal,
    },

    #[error("wheel is cooling down, next spin in {}s", .remaining.as_secs())]
    SpinCooldown { remaining: Duration },

    #[error("withdrawal {id} cannot move from {from} to {to}")]
    IllegalTransition {
        id: WithdrawalId,
        from: WithdrawalStatus,
        to: WithdrawalStatus,
    },

    // -- funds --------------------------------------------------------------
    #[error("insufficient funds: need {required}, have {available}")]
    InsufficientFunds { required: Decimal, available: Decimal },

    // -- lookups ------------------------------------------------------------
    #[error("account {0} not found")]
    AccountNotFound(AccountId),

    #[error("account for external id {0} already exists")]
    AccountExists(String),

    #[error("withdrawal {0} not found")]
    WithdrawalNotFound(WithdrawalId),

    // -- external / fatal ---------------------------------------------------
    #[error("payment rail error: {0}")]
    ExternalTransport(String),

    #[error(
        "compensation failed for withdrawal {withdrawal} of {amount} coins on account {account}: {source}"
    )]
    FatalReconciliation {
        account: AccountId,
        withdrawal: WithdrawalId,
        amount: Decimal,
        #[source]
        source: StoreError,
    },

    #[error("settings misconfigured: {0}")]
    Misconfigured(String),

    #[error("account {account} invariant violated: {detail}")]
    InvariantViolated { account: AccountId, detail: String },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl GameError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::AmountBelowMinimum { .. }
            | Self::AmountAboveMaximum { .. }
            | Self::NonPositiveAmount(_)
            | Self::InvalidAddress(_)
            | Self::InvalidTrack(_) => ErrorKind::Validation,
            Self::NotMining
            | Self::AlreadyMining
            | Self::MaxLevelReached { .. }
            | Self::VaultFull { .. }
            | Self::VaultNotFull { .. }
            | Self::EnergyDepleted { .. }
            | Self::HealthDepleted { .. }
            | Self::ResourceFull { .. }
            | Self::SpinCooldown { .. }
            | Self::IllegalTransition { .. }
            | Self::AccountExists(_) => ErrorKind::StateConflict,
            Self::InsufficientFunds { .. } => ErrorKind::InsufficientFunds,
            Self::AccountNotFound(_) | Self::WithdrawalNotFound(_) => ErrorKind::NotFound,
            Self::ExternalTransport(_) => ErrorKind::ExternalTransport,
            Self::FatalReconciliation { .. } | Self::InvariantViolated { .. } => {
                ErrorKind::FatalReconciliation
            }
            Self::Store(_) => ErrorKind::Storage,
            Self::Misconfigured(_) => ErrorKind::Configuration,
        }
    }

    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::AmountBelowMinimum { .. } => "amount_below_minimum",
            Self::AmountAboveMaximum { .. } => "amount_above_maximum",
            Self::NonPositiveAmount(_) => "non_positive_amount",
            Self::InvalidAddress(_) => "invalid_address",
            Self::InvalidTrack(_) => "invalid_track",
            Self::NotMining => "not_mining",
            Self::AlreadyMining => "already_mining",
            Self::MaxLevelReached { .. } => "max_level_reached",
            Self::VaultFull { .. } => "vault_full",
            Self::VaultNotFull { .. } => "vault_not_full",
            Self::EnergyDepleted { .. } => "energy_depleted",
            Self::HealthDepleted { .. } => "health_depleted",
            Self::ResourceFull { .. } => "resource_full",
            Self::SpinCooldown { .. } => "spin_cooldown",
            Self::IllegalTransition { .. } => "illegal_transition",
            Self::InsufficientFunds { .. } => "insufficient_funds",
            Self::AccountNotFound(_) => "account_not_found",
            Self::AccountExists(_) => "account_exists",
            Self::WithdrawalNotFound(_) => "withdrawal_not_found",
            Self::ExternalTransport(_) => "external_transport",
            Self::FatalReconciliation { .. } => "fatal_reconciliation",
            Self::InvariantViolated { .. } => "invariant_violated",
            Self::Store(_) => "storage",
            Self::Misconfigured(_) => "misconfigured",
        }
    }

    /// Whether the caller may retry the same request unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Storage)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
