// Copyright (c) 2026 Hypermesh Foundation. All rights reserved.
// Licensed under the Business Source License 1.1.
// See the LICENSE file in the repository root for full license text.

// Economy bench runner: seeded Monte Carlo over the game engine.
//
// Usage:
//   cargo run --release --bin bench                      # All scenarios, 30 runs each
//   cargo run --release --bin bench -- --runs 5          # Quick mode
//   cargo run --release --bin bench -- withdrawal        # Filter by name or category
//   cargo run --release --bin bench -- --seed 42         # Custom base seed
//   RUST_LOG=coinup_engine=debug cargo run --bin bench   # Engine logs

mod monte_carlo;
mod report;
mod scenarios;

use report::*;
use scenarios::*;
use std::time::{Instant, SystemTime, UNIX_EPOCH};
use tracing_subscriber::EnvFilter;

// ─── CLI Parsing ────────────────────────────────────────────────────────────

struct CliArgs {
    runs: usize,
    seed: u64,
    filter: Option<String>,
    no_write: bool,
}

fn parse_args() -> CliArgs {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let mut cli = CliArgs {
        runs: 30,
        seed: 0,
        filter: None,
        no_write: false,
    };

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--runs" => {
                i += 1;
                if i < args.len() {
                    cli.runs = args[i].parse().unwrap_or(30);
                }
            }
            "--seed" => {
                i += 1;
                if i < args.len() {
                    cli.seed = args[i].parse().unwrap_or(0);
                }
            }
            "--no-write" => {
                cli.no_write = true;
            }
            arg if !arg.starts_with('-') => {
                cli.filter = Some(arg.to_string());
            }
            _ => {
                eprintln!("Unknown argument: {}", args[i]);
            }
        }
        i += 1;
    }

    cli
}

// ─── Main ───────────────────────────────────────────────────────────────────

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_target(true)
        .init();

    let cli = parse_args();
    let all_scenarios = scenarios();

    let to_run: Vec<&Scenario> = match &cli.filter {
        Some(f) => {
            let f_lower = f.to_lowercase();
            all_scenarios
                .iter()
                .filter(|s| {
                    s.name.to_lowercase().contains(&f_lower)
                        || s.label.to_lowercase().contains(&f_lower)
                        || s.category.to_lowercase().contains(&f_lower)
                })
                .collect()
        }
        None => all_scenarios.iter().collect(),
    };

    if to_run.is_empty() {
        eprintln!("No scenarios match filter: {:?}", cli.filter);
        std::process::exit(1);
    }

    let runtime = tokio::runtime::Builder::new_current_thread().build()?;

    println!("\n  CoinUp Economy Bench v{}", env!("CARGO_PKG_VERSION"));
    println!("  PRNG: ChaCha8Rng | Runs/scenario: {} | Base seed: {}", cli.runs, cli.seed);
    println!("  Running {} scenario(s)...\n", to_run.len());
    println!(
        "  {:<40} {:>5} {:>12} {:>12} {:>8} {:>7}",
        "Scenario", "Pass%", "Metric", "Conserv", "Fail%", "Time"
    );
    println!("  {}", "-".repeat(90));

    let suite_start = Instant::now();
    let mut mc_reports = Vec::new();

    for scenario in &to_run {
        let report = monte_carlo::run_monte_carlo(scenario, cli.runs, cli.seed, &runtime);

        let pass_pct = report.pass_rate * 100.0;
        let status = if report.pass_rate >= 1.0 { "PASS" } else { "FAIL" };

        println!(
            "  {:<40} {:>4}% {:>12.2e} {:>12.2e} {:>7.2}% {:>5.0}ms  {}",
            report.label,
            pass_pct as u32,
            report.metric.mean,
            report.conservation_error.max,
            report.failure_rate.mean * 100.0,
            report.elapsed_ms.mean,
            status,
        );
        if report.outcome_mix.iter().any(|share| *share > 0.0) {
            let [health, energy, vault, running] = report.outcome_mix;
            println!(
                "  {:<40} health {:.1}% | energy {:.1}% | vault {:.1}% | running {:.1}%",
                "",
                health * 100.0,
                energy * 100.0,
                vault * 100.0,
                running * 100.0,
            );
        }

        mc_reports.push(report);
    }

    let suite_elapsed = suite_start.elapsed();

    // ─── Summary ────────────────────────────────────────────────────────

    let total = mc_reports.len();
    let passed = mc_reports.iter().filter(|r| r.pass_rate >= 1.0).count();
    let failed = total - passed;

    println!("  {}", "-".repeat(90));
    println!(
        "  Total: {}  Passed: {}  Failed: {}  Suite time: {:.1}s\n",
        total,
        passed,
        failed,
        suite_elapsed.as_secs_f64()
    );

    // ─── Write JSON Report ──────────────────────────────────────────────

    if !cli.no_write {
        let generated_at_ms = SystemTime::now().duration_since(UNIX_EPOCH)?.as_millis() as u64;
        let report = BenchReport {
            generated_at_ms,
            version: env!("CARGO_PKG_VERSION"),
            prng: "ChaCha8Rng",
            n_runs_per_scenario: cli.runs,
            summary: Summary {
                total,
                passed,
                failed,
                pass_rate: passed as f64 / total as f64,
            },
            scenarios: mc_reports,
        };

        let dir = std::path::Path::new("benchmark-results");
        std::fs::create_dir_all(dir)?;
        let path = dir.join(format!("bench-{generated_at_ms}.json"));
        std::fs::write(&path, serde_json::to_string_pretty(&report)?)?;
        println!("  Results saved to: {}\n", path.display());
    }

    if failed > 0 {
        std::process::exit(1);
    }
    Ok(())
}
