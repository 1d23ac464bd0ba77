//         _                      _
//  ___ (_) ___  __ _  ___  ___(_)_ __ ___
// / __|| |/ _ \/ _` |/ _ \/ __| | '_ ` _ \
// \__ \| |  __/ (_| |  __/\__ \ | | | | | |
// |___/|_|\___|\__, |\___||___/_|_| |_| |_|
//              |___/

// A small lab for watching floods and interceptions play out against a handful of servers.
// Everything runs on a simulated clock, so results are reproducible given a seed.

// Copyright 2025 Servus Altissimi (Pseudonym)

// Permission is hereby granted, free of charge, to any person obtaining a copy of this software and associated documentation files (the "Software"), to deal in the Software without restriction, including without limitation the rights to use, copy, modify, merge, publish, distribute, sublicense, and/or sell copies of the Software, and to permit persons to whom the Software is furnished to do so, subject to the following conditions:
// The above copyright notice and this permission notice shall be included in all copies or substantial portions of the Software.
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY, FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM, OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE SOFTWARE.

use siegesim::metrics::report::{self, AnalysisReport};
use siegesim::prelude::*;
use siegesim::simulation::driver::{self, RunOptions};

use anyhow::Result;
use clap::{Parser, Subcommand};
use rayon::prelude::*;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    Run {
        #[arg(short, long, default_value = "ddos")]
        scenario: String,
        /// JSON config file, replaces the scenario preset
        #[arg(short, long)]
        config: Option<PathBuf>,
        #[arg(short, long)]
        duration: Option<u64>,
        #[arg(long)]
        seed: Option<u64>,
        #[arg(short, long)]
        targets: Option<usize>,
        #[arg(long)]
        capacity: Option<u32>,
        /// Enable rate limiting at this many requests per second per source
        #[arg(long)]
        rate_limit: Option<f64>,
        #[arg(long)]
        load_balancing: bool,
        /// passive, active or sslstrip
        #[arg(long)]
        intercept: Option<String>,
        #[arg(long)]
        encryption: bool,
        #[arg(long)]
        vpn: bool,
        #[arg(long)]
        realtime: bool,
        #[arg(long)]
        no_save: bool,
    },

    Compare {
        #[arg(short, long, default_value = "ddos,ddos-defended,ddos-scaled")]
        scenarios: String,
        #[arg(short, long, default_value_t = 30)]
        duration: u64,
        #[arg(short, long, default_value_t = 3)]
        repetitions: u32,
        #[arg(long, default_value_t = 1)]
        seed: u64,
    },

    Analyze {
        #[arg(default_value = "results")]
        path: String,
    },

    List,
}

#[tokio::main]
async fn main() -> Result<()> {
    let program_start = Instant::now();

    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    match cli.command {
        Commands::Run {
            scenario,
            config,
            duration,
            seed,
            targets,
            capacity,
            rate_limit,
            load_balancing,
            intercept,
            encryption,
            vpn,
            realtime,
            no_save,
        } => {
            let mut config = match config {
                Some(path) => SimConfig::from_file(path)?,
                None => ScenarioRegistry::global()
                    .create(&scenario)
                    .ok_or_else(|| anyhow::anyhow!("Unknown scenario: {}", scenario))?,
            };

            if let Some(secs) = duration {
                config.duration = Duration::from_secs(secs);
            }
            if let Some(seed) = seed {
                config.seed = Some(seed);
            }
            if let Some(count) = targets {
                config.num_targets = count.max(1);
            }
            if let Some(capacity) = capacity {
                config.target_capacity = capacity;
            }
            if let Some(threshold) = rate_limit {
                config = config.with_rate_limit(threshold);
            }
            if load_balancing {
                config = config.with_load_balancing();
            }
            if let Some(kind) = intercept {
                config = config.with_interception(kind.parse()?);
            }
            if encryption {
                config = config.with_encryption();
            }
            if vpn {
                config = config.with_vpn();
            }
            config.validate()?;

            let options = RunOptions {
                realtime,
                progress: true,
                results_dir: (!no_save).then(|| PathBuf::from("results")),
            };
            run_single_simulation(config, &options).await?;
        }

        Commands::Compare {
            scenarios,
            duration,
            repetitions,
            seed,
        } => {
            compare_scenarios(&scenarios, duration, repetitions, seed)?;
        }

        Commands::Analyze { path } => {
            analyze_results(&path)?;
        }

        Commands::List => {
            println!("\nAvailable Scenarios");

            for name in ScenarioRegistry::global().list() {
                println!("  - {}", name);
            }

            println!("\nUsage: cargo run -- run --scenario <name>");
            println!("Example: cargo run -- run --scenario mitm-active --realtime\n");
        }
    }

    info!("Total runtime: {:.2}s", program_start.elapsed().as_secs_f64());

    Ok(())
}

async fn run_single_simulation(config: SimConfig, options: &RunOptions) -> Result<()> {
    info!("siegesim: Single Run");

    let mut sim = Simulation::new(config);
    let metrics = driver::run(&mut sim, options).await?;

    let snapshots = metrics.get_snapshots();
    comparison_table(&[report::analyze(&snapshots, &sim.config().name)]);
    Ok(())
}

fn compare_scenarios(scenarios: &str, duration: u64, repetitions: u32, seed: u64) -> Result<()> {
    let names: Vec<&str> = scenarios.split(',').map(|s| s.trim()).filter(|s| !s.is_empty()).collect();

    let mut jobs = Vec::new();
    for name in &names {
        let config = ScenarioRegistry::global()
            .create(name)
            .ok_or_else(|| anyhow::anyhow!("Unknown scenario: {}", name))?;
        for rep in 0..repetitions.max(1) {
            jobs.push(
                config
                    .clone()
                    .with_seed(seed + rep as u64)
                    .with_duration(Duration::from_secs(duration)),
            );
        }
    }

    info!("siegesim: Comparison");
    info!("Scenarios: {}", names.join(", "));
    info!("Repetitions: {}, duration per run: {}s", repetitions, duration);

    let results: Vec<AnalysisReport> = jobs
        .into_par_iter()
        .map(|config| {
            let name = config.name.clone();
            let metrics = Simulation::new(config).run_headless();
            report::analyze(&metrics.get_snapshots(), &name)
        })
        .collect();

    let averaged: Vec<AnalysisReport> = results
        .chunks(repetitions.max(1) as usize)
        .map(average_reports)
        .collect();

    comparison_table(&averaged);

    std::fs::create_dir_all("results")?;
    let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    let comparison_path = format!("results/comparison_{}.json", timestamp);
    std::fs::write(&comparison_path, serde_json::to_string_pretty(&averaged)?)?;
    info!("Comparison saved to: {}", comparison_path);

    Ok(())
}

fn analyze_results(path: &str) -> Result<()> {
    use std::fs;

    info!("Analyzing results in: {}", path);

    let mut reports = Vec::new();
    for entry in fs::read_dir(path)? {
        let path = entry?.path();

        if path.extension().and_then(|s| s.to_str()) == Some("json")
            && path.to_string_lossy().contains("analysis")
        {
            let content = fs::read_to_string(&path)?;
            let report: AnalysisReport = serde_json::from_str(&content)?;
            reports.push(report);
        }
    }

    if reports.is_empty() {
        info!("No analysis files found.");
        return Ok(());
    }

    comparison_table(&reports);
    Ok(())
}

fn average_reports(reports: &[AnalysisReport]) -> AnalysisReport {
    let n = reports.len().max(1) as f64;
    let mean = |f: fn(&AnalysisReport) -> f64| reports.iter().map(f).sum::<f64>() / n;

    let criticals: Vec<f64> = reports.iter().filter_map(|r| r.time_to_critical_s).collect();
    let time_to_critical_s = (!criticals.is_empty())
        .then(|| criticals.iter().sum::<f64>() / criticals.len() as f64);

    AnalysisReport {
        scenario_name: reports.first().map(|r| r.scenario_name.clone()).unwrap_or_default(),
        duration_s: mean(|r| r.duration_s),
        requests_emitted: mean(|r| r.requests_emitted as f64).round() as u64,
        attack_share: mean(|r| r.attack_share),
        block_rate: mean(|r| r.block_rate),
        response_rate: mean(|r| r.response_rate),
        suppressed_responses: mean(|r| r.suppressed_responses as f64).round() as u64,
        avg_transit_ms: mean(|r| r.avg_transit_ms),
        final_health: mean(|r| r.final_health),
        lowest_health: reports.iter().map(|r| r.lowest_health).fold(1.0_f64, f64::min),
        time_to_critical_s,
        intercept_rate: mean(|r| r.intercept_rate),
        modified: mean(|r| r.modified as f64).round() as u64,
    }
}

fn comparison_table(reports: &[AnalysisReport]) {
    println!("\n╔═════════════════╦══════════╦══════════╦══════════╦══════════╦══════════╦════════════╗");
    println!("║ Scenario        ║ Requests ║ Blocked  ║ Answered ║ Health   ║ Critical ║ Intercepted║");
    println!("║                 ║          ║ (%)      ║ (%)      ║ (final)  ║ (s)      ║ (%)        ║");
    println!("╠═════════════════╬══════════╬══════════╬══════════╬══════════╬══════════╬════════════╣");

    for report in reports {
        let critical = report
            .time_to_critical_s
            .map(|s| format!("{:.1}", s))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "║ {:<15} ║ {:>8} ║ {:>7.1}% ║ {:>7.1}% ║ {:>8.2} ║ {:>8} ║ {:>9.1}% ║",
            report.scenario_name,
            report.requests_emitted,
            report.block_rate * 100.0,
            report.response_rate * 100.0,
            report.final_health,
            critical,
            report.intercept_rate * 100.0,
        );
    }

    println!("╚═════════════════╩══════════╩══════════╩══════════╩══════════╩══════════╩════════════╝\n");

    if let Some(healthiest) = reports.iter().max_by(|a, b| a.final_health.total_cmp(&b.final_health)) {
        println!("Healthiest: {} ({:.2})", healthiest.scenario_name, healthiest.final_health);
    }

    if let Some(most_blocked) = reports
        .iter()
        .filter(|r| r.block_rate > 0.0)
        .max_by(|a, b| a.block_rate.total_cmp(&b.block_rate))
    {
        println!("Most Blocked: {} ({:.1}%)", most_blocked.scenario_name, most_blocked.block_rate * 100.0);
    }

    println!();
}
