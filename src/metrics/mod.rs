pub mod logger;
pub mod report;

use crate::agent::AgentId;
use crate::network::{Direction, Request, Response, ResponseKind};
use crate::observer::SimObserver;
use crate::strategies::SourceKey;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use parking_lot::RwLock;
use tracing::warn;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub timestamp: f64,
    pub requests_emitted: u64,
    pub attack_requests: u64,
    pub requests_blocked: u64,
    pub requests_delivered: u64,
    pub responses_sent: u64,
    pub responses_failed: u64,
    pub responses_suppressed: u64,
    pub balanced_requests: u64,
    pub intercepted: u64,
    pub modified: u64,
    pub in_flight: usize,
    pub avg_transit_ms: f64,
    pub avg_health: f64,
    pub min_health: f64,
    pub block_rate: f64,
    pub intercept_rate: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameGauges {
    pub in_flight: usize,
    pub avg_health: f64,
    pub min_health: f64,
    pub balanced_requests: u64,
}

#[derive(Debug, Clone)]
pub struct MetricsCollector {
    inner: Arc<RwLock<MetricsInner>>,
}

#[derive(Debug, Default)]
struct MetricsInner {
    requests_emitted: u64,
    attack_requests: u64,
    requests_blocked: u64,
    requests_delivered: u64,
    responses_sent: u64,
    responses_failed: u64,
    responses_suppressed: u64,
    balanced_requests: u64,
    intercepted: u64,
    modified: u64,
    total_transit_ms: f64,
    transit_samples: u64,
    in_flight: usize,
    avg_health: f64,
    min_health: f64,
    snapshots: Vec<MetricsSnapshot>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(MetricsInner {
                avg_health: 1.0,
                min_health: 1.0,
                ..MetricsInner::default()
            })),
        }
    }

    pub fn request_emitted(&self, is_attack: bool) {
        let mut inner = self.inner.write();
        inner.requests_emitted += 1;
        if is_attack {
            inner.attack_requests += 1;
        }
    }

    pub fn request_blocked(&self) {
        self.inner.write().requests_blocked += 1;
    }

    pub fn request_delivered(&self, transit_ms: f64) {
        let mut inner = self.inner.write();
        inner.requests_delivered += 1;

        // Transit is bounded by the lab geometry, anything this large is a clock bug
        if !(0.0..=60_000.0).contains(&transit_ms) {
            warn!("Ignoring impossible transit time: {:.2}ms", transit_ms);
            return;
        }
        inner.total_transit_ms += transit_ms;
        inner.transit_samples += 1;
    }

    pub fn response_sent(&self, kind: ResponseKind) {
        let mut inner = self.inner.write();
        inner.responses_sent += 1;
        if kind == ResponseKind::Failed {
            inner.responses_failed += 1;
        }
    }

    pub fn response_suppressed(&self) {
        self.inner.write().responses_suppressed += 1;
    }

    pub fn packet_intercepted(&self) {
        self.inner.write().intercepted += 1;
    }

    pub fn packet_modified(&self) {
        self.inner.write().modified += 1;
    }

    pub fn record_frame(&self, gauges: FrameGauges) {
        let mut inner = self.inner.write();
        inner.in_flight = gauges.in_flight;
        inner.avg_health = gauges.avg_health;
        inner.min_health = gauges.min_health;
        inner.balanced_requests = gauges.balanced_requests;
    }

    pub fn snapshot(&self, now_ms: f64) -> MetricsSnapshot {
        let inner = self.inner.read();

        let avg_transit_ms = if inner.transit_samples > 0 {
            inner.total_transit_ms / inner.transit_samples as f64
        } else {
            0.0
        };

        let attempts = inner.requests_emitted + inner.requests_blocked;
        let block_rate = if attempts > 0 {
            inner.requests_blocked as f64 / attempts as f64
        } else {
            0.0
        };

        let intercept_rate = if inner.requests_emitted > 0 {
            inner.intercepted as f64 / inner.requests_emitted as f64
        } else {
            0.0
        };

        MetricsSnapshot {
            timestamp: now_ms / 1000.0,
            requests_emitted: inner.requests_emitted,
            attack_requests: inner.attack_requests,
            requests_blocked: inner.requests_blocked,
            requests_delivered: inner.requests_delivered,
            responses_sent: inner.responses_sent,
            responses_failed: inner.responses_failed,
            responses_suppressed: inner.responses_suppressed,
            balanced_requests: inner.balanced_requests,
            intercepted: inner.intercepted,
            modified: inner.modified,
            in_flight: inner.in_flight,
            avg_transit_ms,
            avg_health: inner.avg_health,
            min_health: inner.min_health,
            block_rate,
            intercept_rate,
        }
    }

    pub fn save_snapshot(&self, now_ms: f64) {
        let snapshot = self.snapshot(now_ms);
        self.inner.write().snapshots.push(snapshot);
    }

    pub fn get_snapshots(&self) -> Vec<MetricsSnapshot> {
        self.inner.read().snapshots.clone()
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl SimObserver for MetricsCollector {
    fn on_request_created(&mut self, _now_ms: f64, request: &Request) {
        self.request_emitted(request.is_attack);
    }

    fn on_request_blocked(&mut self, _now_ms: f64, _source: AgentId, _key: SourceKey) {
        self.request_blocked();
    }

    // Server-to-user packets are never answered, so they stay out of the response ratio
    fn on_request_delivered(&mut self, now_ms: f64, request: &Request) {
        if request.direction == Direction::ToTarget {
            self.request_delivered(now_ms - request.created_at_ms);
        }
    }

    fn on_response_created(&mut self, _now_ms: f64, response: &Response) {
        self.response_sent(response.kind);
    }

    fn on_response_suppressed(&mut self, _now_ms: f64, _request: &Request) {
        self.response_suppressed();
    }

    fn on_packet_intercepted(&mut self, _now_ms: f64, _request: &Request) {
        self.packet_intercepted();
    }

    fn on_packet_modified(&mut self, _now_ms: f64, _request: &Request) {
        self.packet_modified();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rates_are_zero_before_traffic() {
        let metrics = MetricsCollector::new();
        let snap = metrics.snapshot(0.0);
        assert_eq!(snap.block_rate, 0.0);
        assert_eq!(snap.intercept_rate, 0.0);
        assert_eq!(snap.avg_health, 1.0);
    }

    #[test]
    fn block_rate_counts_attempts() {
        let metrics = MetricsCollector::new();
        metrics.request_emitted(true);
        metrics.request_blocked();
        metrics.request_blocked();
        metrics.request_blocked();
        let snap = metrics.snapshot(2500.0);
        assert_eq!(snap.block_rate, 0.75);
        assert_eq!(snap.timestamp, 2.5);
        assert_eq!(snap.attack_requests, 1);
    }

    #[test]
    fn impossible_transit_is_not_averaged() {
        let metrics = MetricsCollector::new();
        metrics.request_delivered(100.0);
        metrics.request_delivered(-5.0);
        let snap = metrics.snapshot(0.0);
        assert_eq!(snap.requests_delivered, 2);
        assert_eq!(snap.avg_transit_ms, 100.0);
    }

    #[test]
    fn clones_share_counters() {
        let metrics = MetricsCollector::new();
        let reader = metrics.clone();
        metrics.packet_intercepted();
        metrics.save_snapshot(1000.0);
        assert_eq!(reader.get_snapshots().len(), 1);
        assert_eq!(reader.snapshot(1000.0).intercepted, 1);
    }
}
