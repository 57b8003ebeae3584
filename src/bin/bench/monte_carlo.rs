// Copyright (c) 2026 Hypermesh Foundation. All rights reserved.
// Licensed under the Business Source License 1.1.
// See the LICENSE file in the repository root for full license text.

// Monte Carlo infrastructure: N seeded runs per scenario, aggregated with
// mean and 95% CI.

use async_trait::async_trait;
use num_traits::{FromPrimitive, ToPrimitive};
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::runtime::Runtime;

use coinup_engine::prize;
use coinup_engine::settings::StaticSettings;
use coinup_engine::simulator;
use coinup_engine::withdrawal::{NoopNotifier, RailError, TxHandle};
use coinup_engine::*;

use crate::report::*;
use crate::scenarios::{Scenario, Workload};

const BENCH_ADDRESS: &str = "UQBvW8Z5huBkMJYdnfAEM5JqTNkuWX3diqYENkWsIL0XggGG";

// ─── Bench rail ─────────────────────────────────────────────────────────────

/// Payment rail failing with a fixed probability.
pub struct FlakyRail {
    rng: Mutex<ChaCha8Rng>,
    failure_rate: f64,
}

impl FlakyRail {
    pub fn new(seed: u64, failure_rate: f64) -> Self {
        Self {
            rng: Mutex::new(ChaCha8Rng::seed_from_u64(seed ^ 0x5a5a)),
            failure_rate: failure_rate.clamp(0.0, 1.0),
        }
    }
}

#[async_trait]
impl PaymentRail for FlakyRail {
    async fn send(&self, _destination: &str, amount: Decimal, _memo: &str) -> Result<TxHandle, RailError> {
        let (fail, nonce) = {
            let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
            (rng.gen_bool(self.failure_rate), rng.gen::<u64>())
        };
        if fail {
            Err(RailError::Transport("simulated outage".into()))
        } else {
            Ok(TxHandle(format!("bench-{nonce:016x}-{amount}")))
        }
    }
}

// ─── Workloads ──────────────────────────────────────────────────────────────

fn to_f64(d: Decimal) -> f64 {
    d.to_f64().unwrap_or(f64::MAX)
}

fn run_wheel(spins: u32, rng: &mut ChaCha8Rng) -> BenchResult {
    let settings = Settings::default();
    let wheel = &settings.spin_wheel_probabilities;
    let total: f64 = wheel.values().sum();

    let mut counts: BTreeMap<u32, u32> = BTreeMap::new();
    for _ in 0..spins {
        if let Some(prize) = prize::select_weighted(wheel, &mut *rng) {
            *counts.entry(*prize).or_default() += 1;
        }
    }
    let deviation = wheel
        .iter()
        .map(|(prize, weight)| {
            let observed = counts.get(prize).copied().unwrap_or(0) as f64 / spins.max(1) as f64;
            (observed - weight / total).abs()
        })
        .fold(0.0_f64, f64::max);

    BenchResult {
        metric: deviation,
        operations: spins,
        ..Default::default()
    }
}

/// Random share of a resource left at session start.
fn fraction(rng: &mut ChaCha8Rng) -> Decimal {
    Decimal::from_f64(rng.gen_range(0.05..1.0))
        .unwrap_or(Decimal::ONE)
        .round_dp(2)
}

fn outcome_slot(outcome: MiningOutcome) -> usize {
    match outcome {
        MiningOutcome::HealthDepleted => 0,
        MiningOutcome::EnergyDepleted => 1,
        MiningOutcome::VaultFull => 2,
        MiningOutcome::InProgress => 3,
    }
}

fn run_mining(accounts: u32, polls: u32, horizon_secs: u64, rng: &mut ChaCha8Rng) -> Result<BenchResult, GameError> {
    let settings = Settings::default();
    let horizon = Timestamp::from_secs(horizon_secs);
    let mut result = BenchResult::default();
    let mut worst = Decimal::ZERO;

    for i in 0..accounts {
        let mut account = Account::new(
            AccountId(u64::from(i) + 1),
            ExternalIdentity::new(format!("bench-{i}")),
            None,
            &settings,
            Timestamp(0),
        )?;
        for track in Track::ALL {
            let schedule = settings.schedule(track)?;
            let level = rng.gen_range(1..=schedule.max_level);
            match track {
                Track::VaultCapacity => account.vault_capacity = schedule.value_at(level)?,
                Track::MiningRate => account.mining_rate = schedule.value_at(level)?,
                Track::MaxEnergy => account.max_energy = schedule.value_at(level)?,
                Track::MaxHealth => account.max_health = schedule.value_at(level)?,
            }
        }
        account.current_energy = (account.max_energy * fraction(rng)).round_dp(2);
        account.current_health = (account.max_health * fraction(rng)).round_dp(2);
        simulator::start_mining(&mut account, Timestamp(0))?;

        let mut once = account.clone();
        let outcome = simulator::reconcile(&mut once, horizon)?.outcome;
        result.outcomes[outcome_slot(outcome)] += 1;

        let mut times: Vec<u64> = (0..polls).map(|_| rng.gen_range(0..horizon.as_millis())).collect();
        times.sort_unstable();
        times.push(horizon.as_millis());

        let mut polled = account;
        for t in times {
            result.operations += 1;
            match simulator::reconcile(&mut polled, Timestamp(t)) {
                Ok(r) if r.outcome.stops_mining() => break,
                Ok(_) => {}
                Err(GameError::NotMining) => break,
                Err(err) => {
                    tracing::warn!(account = %polled.id, error = %err, "poll failed");
                    result.failures += 1;
                }
            }
        }

        let drift = (once.temp_coins - polled.temp_coins).abs()
            + (once.current_energy - polled.current_energy).abs()
            + (once.current_health - polled.current_health).abs();
        worst = worst.max(drift);
    }

    result.metric = to_f64(worst);
    Ok(result)
}

fn run_withdrawals(
    accounts: u32,
    requests: u32,
    failure_rate: f64,
    seed: u64,
    rng: &mut ChaCha8Rng,
    runtime: &Runtime,
) -> Result<BenchResult, GameError> {
    let settings = Settings::default();
    let bounds = settings.withdrawal_bounds();
    let store = Arc::new(InMemoryStore::new());

    let mut ids = Vec::new();
    let mut initial = Decimal::ZERO;
    for i in 0..accounts {
        let coins = Decimal::from(rng.gen_range(1_000u32..=50_000));
        let account = store.insert_account(|id| {
            let mut a = Account::new(id, ExternalIdentity::new(format!("bench-{i}")), None, &settings, Timestamp(0))?;
            a.coins = coins;
            Ok(a)
        })?;
        initial += coins;
        ids.push(account.id);
    }

    let saga = WithdrawalSaga::new(
        Arc::clone(&store),
        Arc::new(FlakyRail::new(seed, failure_rate)),
        Arc::new(NoopNotifier),
    );

    let mut result = BenchResult {
        operations: requests,
        ..Default::default()
    };
    let paid_out = runtime.block_on(async {
        let mut handles = Vec::new();
        for _ in 0..requests {
            let Some(&id) = ids.choose(&mut *rng) else { break };
            let amount = Decimal::from(rng.gen_range(1_000u32..=5_000));
            match saga.initiate(id, amount, BENCH_ADDRESS, &bounds, Timestamp(1)) {
                Ok((_, handle)) => handles.push(handle),
                Err(GameError::InsufficientFunds { .. }) => {}
                Err(err) => {
                    tracing::warn!(account = %id, error = %err, "reservation failed");
                    result.failures += 1;
                }
            }
        }

        let mut paid = Decimal::ZERO;
        for handle in handles {
            match handle.await {
                Ok(Ok(done)) if done.status == WithdrawalStatus::Completed => paid += done.amount_coins,
                Ok(Ok(_)) => {}
                Ok(Err(err)) => {
                    tracing::error!(error = %err, "saga did not resolve");
                    result.failures += 1;
                }
                Err(err) => {
                    tracing::error!(error = %err, "saga task panicked");
                    result.failures += 1;
                }
            }
        }
        paid
    });

    let mut remaining = Decimal::ZERO;
    for id in &ids {
        remaining += store.account(*id)?.coins;
        if store.withdrawals(*id)?.iter().any(|w| w.status == WithdrawalStatus::Pending) {
            result.failures += 1;
        }
    }
    let error = (initial - remaining - paid_out).abs();
    result.conservation_error = to_f64(error);
    result.metric = to_f64(error);
    Ok(result)
}

fn run_referrals(referees: u32, purchases: u32, seed: u64, rng: &mut ChaCha8Rng) -> Result<BenchResult, GameError> {
    let settings = Settings::default();
    let cache = SettingsCache::new(StaticSettings(settings.clone()), RefreshPolicy::Manual, Timestamp(0))
        .map_err(|e| GameError::Misconfigured(e.to_string()))?;
    let service = GameService::new(
        Arc::new(InMemoryStore::new()),
        cache,
        Arc::new(FlakyRail::new(seed, 0.0)),
        Arc::new(NoopNotifier),
        ChaCha8Rng::seed_from_u64(seed),
    );

    let now = Timestamp(0);
    let referrer = service.sign_in(ExternalIdentity::new("referrer"), None, now)?.account;
    let code = service.referral_code(referrer.id);

    let mut result = BenchResult::default();
    let mut expected = Decimal::ZERO;
    for i in 0..referees {
        let referee = service
            .sign_in(ExternalIdentity::new(format!("referee-{i}")), Some(&code), now)?
            .account;
        service.store().transact(referee.id, |a, _| {
            a.coins = Decimal::from(100_000_000u64);
            Ok(())
        })?;

        for _ in 0..purchases {
            let track = Track::ALL[rng.gen_range(0..Track::ALL.len())];
            result.operations += 1;
            match service.purchase_upgrade(referee.id, track.public_name(), now) {
                Ok(_) | Err(GameError::MaxLevelReached { .. }) => {}
                Err(err) => {
                    tracing::warn!(account = %referee.id, error = %err, "purchase failed");
                    result.failures += 1;
                }
            }
        }

        let level = service.store().account(referee.id)?.level;
        expected += (2..=level)
            .filter_map(|l| settings.referral_rewards.get(&l))
            .copied()
            .sum::<Decimal>();
    }

    let referrer = service.store().account(referrer.id)?;
    let error = (referrer.referral_earnings - expected).abs() + (referrer.coins - expected).abs();
    result.metric = to_f64(error);
    result.conservation_error = to_f64(error);
    Ok(result)
}

// ─── Runner ─────────────────────────────────────────────────────────────────

/// Run a single scenario iteration with a specific seed.
pub fn run_single(scenario: &Scenario, seed: u64, runtime: &Runtime) -> BenchResult {
    let start = Instant::now();
    let mut rng = ChaCha8Rng::seed_from_u64(seed);

    let outcome = match scenario.workload {
        Workload::WheelConvergence { spins } => Ok(run_wheel(spins, &mut rng)),
        Workload::MiningPolls {
            accounts,
            polls,
            horizon_secs,
        } => run_mining(accounts, polls, horizon_secs, &mut rng),
        Workload::WithdrawalStress {
            accounts,
            requests,
            failure_rate,
        } => run_withdrawals(accounts, requests, failure_rate, seed, &mut rng, runtime),
        Workload::ReferralLadder { referees, purchases } => run_referrals(referees, purchases, seed, &mut rng),
    };

    let mut result = outcome.unwrap_or_else(|err| {
        tracing::error!(scenario = scenario.name, seed, error = %err, "run aborted");
        BenchResult {
            metric: f64::INFINITY,
            failures: 1,
            ..Default::default()
        }
    });
    result.scenario = scenario.name.to_string();
    result.seed = seed;
    result.elapsed_ms = start.elapsed().as_millis();
    result.pass = result.metric <= scenario.max_metric && result.failures == 0;
    result
}

/// Run `n` iterations with seeds `base_seed..base_seed + n`.
pub fn run_monte_carlo(scenario: &Scenario, n: usize, base_seed: u64, runtime: &Runtime) -> MonteCarloReport {
    let runs: Vec<BenchResult> = (0..n as u64)
        .map(|i| run_single(scenario, base_seed.wrapping_add(i), runtime))
        .collect();

    let collect = |f: fn(&BenchResult) -> f64| runs.iter().map(f).collect::<Vec<f64>>();
    let passes = runs.iter().filter(|r| r.pass).count();

    let mut outcome_mix = [0.0; 4];
    let outcome_total: u32 = runs.iter().flat_map(|r| r.outcomes).sum();
    if outcome_total > 0 {
        for r in &runs {
            for (slot, count) in r.outcomes.iter().enumerate() {
                outcome_mix[slot] += f64::from(*count) / f64::from(outcome_total);
            }
        }
    }

    MonteCarloReport {
        scenario_name: scenario.name.to_string(),
        label: scenario.label.to_string(),
        category: scenario.category.to_string(),
        n_runs: n,
        pass_rate: if n == 0 { 0.0 } else { passes as f64 / n as f64 },
        metric: Stats::from_samples(&collect(|r| r.metric)),
        conservation_error: Stats::from_samples(&collect(|r| r.conservation_error)),
        failure_rate: Stats::from_samples(&collect(|r| f64::from(r.failures) / f64::from(r.operations.max(1)))),
        elapsed_ms: Stats::from_samples(&collect(|r| r.elapsed_ms as f64)),
        outcome_mix,
        individual_runs: runs,
    }
}
