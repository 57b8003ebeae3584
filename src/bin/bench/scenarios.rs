// Copyright (c) 2026 Hypermesh Foundation. All rights reserved.
// Licensed under the Business Source License 1.1.
// See the LICENSE file in the repository root for full license text.

// Scenario definitions. Each scenario picks a workload and the bound its
// headline metric must stay under for a run to pass.

// ─── Scenario Configuration ─────────────────────────────────────────────────

pub enum Workload {
    /// Draw from the default wheel and compare frequencies to weights.
    WheelConvergence { spins: u32 },
    /// Many miners polled at random intervals versus one reconcile at the end.
    MiningPolls { accounts: u32, polls: u32, horizon_secs: u64 },
    /// Concurrent withdrawals through a rail failing with `failure_rate`.
    WithdrawalStress { accounts: u32, requests: u32, failure_rate: f64 },
    /// Referees levelling through random upgrades; referrer earnings audited.
    ReferralLadder { referees: u32, purchases: u32 },
}

pub struct Scenario {
    pub name: &'static str,
    pub label: &'static str,
    pub category: &'static str,
    pub workload: Workload,
    /// A run passes when its metric is at or below this bound.
    pub max_metric: f64,
}

pub fn scenarios() -> Vec<Scenario> {
    vec![
        Scenario {
            name: "WHEEL_CONVERGENCE",
            label: "Wheel frequencies vs weights",
            category: "prize",
            workload: Workload::WheelConvergence { spins: 50_000 },
            max_metric: 0.01,
        },
        Scenario {
            name: "MINING_POLL_INVARIANCE",
            label: "Lazy reconcile, poll-independent",
            category: "mining",
            workload: Workload::MiningPolls {
                accounts: 200,
                polls: 25,
                horizon_secs: 4 * 3600,
            },
            // Exhaustion times divide by the drain rate; allow division dust.
            max_metric: 1e-12,
        },
        Scenario {
            name: "WITHDRAWAL_CONSERVATION",
            label: "Saga balance conservation (30% fail)",
            category: "withdrawal",
            workload: Workload::WithdrawalStress {
                accounts: 20,
                requests: 400,
                failure_rate: 0.3,
            },
            max_metric: 0.0,
        },
        Scenario {
            name: "WITHDRAWAL_RAIL_OUTAGE",
            label: "Saga balance conservation (rail down)",
            category: "withdrawal",
            workload: Workload::WithdrawalStress {
                accounts: 5,
                requests: 100,
                failure_rate: 1.0,
            },
            max_metric: 0.0,
        },
        Scenario {
            name: "REFERRAL_LADDER",
            label: "Referral payouts once per level",
            category: "referral",
            workload: Workload::ReferralLadder {
                referees: 10,
                purchases: 60,
            },
            max_metric: 0.0,
        },
    ]
}
