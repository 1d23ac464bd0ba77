use super::Simulation;
use crate::metrics::MetricsCollector;
use crate::metrics::logger::MetricsLogger;
use crate::metrics::report;
use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::info;

// Fast-forward runs hand control back to the runtime this often
const YIELD_EVERY_FRAMES: u64 = 256;

#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Pace frames against the wall clock instead of running flat out.
    pub realtime: bool,
    pub progress: bool,
    pub results_dir: Option<PathBuf>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            realtime: false,
            progress: true,
            results_dir: Some(PathBuf::from("results")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SavedResults {
    pub csv_path: PathBuf,
    pub report_path: PathBuf,
}

/// Drives `sim` for its configured duration. Ctrl-C ends the run early and still saves results.
pub async fn run(sim: &mut Simulation, options: &RunOptions) -> Result<MetricsCollector> {
    let config = sim.config().clone();
    info!("Starting simulation: {}", config.name);
    info!("Lab: {:?}, duration: {:?}, seed: {:?}", config.lab, config.duration, config.seed);

    let cancel_token = CancellationToken::new();
    let ctrl_c = {
        let cancel = cancel_token.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Interrupted, wrapping up");
                cancel.cancel();
            }
        })
    };

    let pb = if options.progress {
        let pb = ProgressBar::new(config.duration.as_secs());
        pb.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] {bar:40.red/yellow} {pos}/{len}s {msg}")?
                .progress_chars("█▓░"),
        );
        pb
    } else {
        ProgressBar::hidden()
    };

    let frame_ms = config.frame_ms;
    let end_ms = sim.now_ms() + config.duration.as_secs_f64() * 1000.0;
    let mut ticker = interval(Duration::from_secs_f64(frame_ms / 1000.0));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    sim.start();
    let mut frames: u64 = 0;
    let mut shown_second = 0;
    while sim.now_ms() < end_ms {
        if options.realtime {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = cancel_token.cancelled() => break,
            }
        } else if cancel_token.is_cancelled() {
            break;
        } else if frames % YIELD_EVERY_FRAMES == 0 {
            tokio::task::yield_now().await;
        }

        sim.tick(frame_ms.min(end_ms - sim.now_ms()));
        frames += 1;

        let second = (sim.now_ms() / 1000.0) as u64;
        if second > shown_second {
            shown_second = second;
            pb.set_position(second);
            let snap = sim.snapshot();
            let health = snap.targets.iter().map(|t| t.health).fold(1.0_f64, f64::min);
            pb.set_message(format!(
                "Health: {:.2} | Blocked: {} | Intercepted: {}",
                health, snap.blocked_count, snap.intercepted_count
            ));
        }
    }

    pb.finish_with_message("Simulation complete");
    sim.stop();
    ctrl_c.abort();
    info!("Simulated {:.1}s in {} frames", sim.now_ms() / 1000.0, frames);

    if let Some(dir) = &options.results_dir {
        save_results(&sim.metrics, &config.name, dir)?;
    }
    Ok(sim.metrics.clone())
}

pub fn save_results(metrics: &MetricsCollector, name: &str, dir: &Path) -> Result<SavedResults> {
    let snapshots = metrics.get_snapshots();
    let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");

    std::fs::create_dir_all(dir)?;

    let csv_path = dir.join(format!("{}_{}.csv", name, timestamp));
    let mut logger = MetricsLogger::new(&csv_path)?;
    logger.log_batch(&snapshots)?;
    info!("Results saved to: {}", csv_path.display());

    let analysis = report::analyze(&snapshots, name);
    let report_path = dir.join(format!("{}_{}_analysis.json", name, timestamp));
    std::fs::write(&report_path, serde_json::to_string_pretty(&analysis)?)?;
    info!("Analysis saved to: {}", report_path.display());

    Ok(SavedResults { csv_path, report_path })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::SimConfig;

    #[tokio::test]
    async fn fast_forward_run_covers_duration() {
        let config = SimConfig::default().with_seed(5).with_duration(Duration::from_secs(4));
        let mut sim = Simulation::new(config);
        let options = RunOptions { realtime: false, progress: false, results_dir: None };

        let metrics = run(&mut sim, &options).await.unwrap();
        assert!(!sim.is_running());
        assert!((sim.now_ms() - 4000.0).abs() < 1e-6);
        assert_eq!(metrics.get_snapshots().len(), 4);
        assert!(metrics.snapshot(sim.now_ms()).attack_requests > 0);
    }

    #[test]
    fn saves_csv_and_report() {
        let dir = std::env::temp_dir().join(format!("siegesim_results_{}", std::process::id()));
        let mut sim = Simulation::new(SimConfig::default().with_seed(2).with_duration(Duration::from_secs(2)));
        let metrics = sim.run_headless();

        let saved = save_results(&metrics, "ddos", &dir).unwrap();
        let csv = std::fs::read_to_string(&saved.csv_path).unwrap();
        assert_eq!(csv.lines().count(), 3);
        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&saved.report_path).unwrap()).unwrap();
        assert_eq!(json["scenario_name"], "ddos");
        let _ = std::fs::remove_dir_all(&dir);
    }
}
