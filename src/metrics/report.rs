use super::MetricsSnapshot;
use serde::{Deserialize, Serialize};

const CRITICAL_HEALTH: f64 = 0.3;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub scenario_name: String,
    pub duration_s: f64,
    pub requests_emitted: u64,
    pub attack_share: f64,
    pub block_rate: f64,
    pub response_rate: f64,
    pub suppressed_responses: u64,
    pub avg_transit_ms: f64,
    pub final_health: f64,
    pub lowest_health: f64,
    pub time_to_critical_s: Option<f64>,
    pub intercept_rate: f64,
    pub modified: u64,
}

pub fn analyze(snapshots: &[MetricsSnapshot], scenario_name: &str) -> AnalysisReport {
    let Some(last) = snapshots.last() else {
        return AnalysisReport {
            scenario_name: scenario_name.to_string(),
            duration_s: 0.0,
            requests_emitted: 0,
            attack_share: 0.0,
            block_rate: 0.0,
            response_rate: 0.0,
            suppressed_responses: 0,
            avg_transit_ms: 0.0,
            final_health: 1.0,
            lowest_health: 1.0,
            time_to_critical_s: None,
            intercept_rate: 0.0,
            modified: 0,
        };
    };

    let ratio = |num: u64, den: u64| if den > 0 { num as f64 / den as f64 } else { 0.0 };

    let lowest_health = snapshots
        .iter()
        .map(|s| s.min_health)
        .fold(1.0_f64, f64::min);

    let time_to_critical_s = snapshots
        .iter()
        .find(|s| s.min_health <= CRITICAL_HEALTH)
        .map(|s| s.timestamp);

    AnalysisReport {
        scenario_name: scenario_name.to_string(),
        duration_s: last.timestamp,
        requests_emitted: last.requests_emitted,
        attack_share: ratio(last.attack_requests, last.requests_emitted),
        block_rate: last.block_rate,
        response_rate: ratio(last.responses_sent, last.requests_delivered),
        suppressed_responses: last.responses_suppressed,
        avg_transit_ms: last.avg_transit_ms,
        final_health: last.min_health,
        lowest_health,
        time_to_critical_s,
        intercept_rate: last.intercept_rate,
        modified: last.modified,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{FrameGauges, MetricsCollector};

    #[test]
    fn empty_run_reports_healthy() {
        let report = analyze(&[], "idle");
        assert_eq!(report.final_health, 1.0);
        assert!(report.time_to_critical_s.is_none());
    }

    #[test]
    fn finds_first_critical_second() {
        let metrics = MetricsCollector::new();
        for (second, health) in [(1, 0.9), (2, 0.5), (3, 0.25), (4, 0.4)] {
            metrics.record_frame(FrameGauges { in_flight: 0, avg_health: health, min_health: health, balanced_requests: 0 });
            metrics.save_snapshot(second as f64 * 1000.0);
        }
        let report = analyze(&metrics.get_snapshots(), "ddos");
        assert_eq!(report.time_to_critical_s, Some(3.0));
        assert_eq!(report.lowest_health, 0.25);
        assert_eq!(report.final_health, 0.4);
        assert_eq!(report.duration_s, 4.0);
    }
}
