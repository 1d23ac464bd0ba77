use super::Action;
use crate::network::Position;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceKey(i64, i64, i64);

impl SourceKey {
    pub fn from_position(position: &Position) -> Self {
        let q = |v: f64| (v * 1000.0).round() as i64;
        Self(q(position.x), q(position.y), q(position.z))
    }
}

impl std::fmt::Display for SourceKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.3},{:.3},{:.3}", self.0 as f64 / 1000.0, self.1 as f64 / 1000.0, self.2 as f64 / 1000.0)
    }
}

/// Fixed minimum spacing per source key. Rejected requests are counted, never queued.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    enabled: bool,
    threshold: f64,
    last_accept_ms: HashMap<SourceKey, f64>,
    blocked: u64,
    admitted: u64,
}

impl RateLimiter {
    pub fn new(threshold: f64) -> Self {
        Self {
            enabled: false,
            threshold,
            last_accept_ms: HashMap::new(),
            blocked: 0,
            admitted: 0,
        }
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn configure(&mut self, enabled: bool, threshold: f64) -> bool {
        if !threshold.is_finite() || threshold <= 0.0 {
            return false;
        }
        self.enabled = enabled;
        self.threshold = threshold;
        true
    }

    pub fn min_interval_ms(&self) -> f64 {
        1000.0 / self.threshold
    }

    pub fn admit(&mut self, key: SourceKey, now_ms: f64) -> Action {
        if !self.enabled {
            return Action::Accept;
        }

        if let Some(last) = self.last_accept_ms.get(&key) {
            if now_ms - last < self.min_interval_ms() {
                self.blocked += 1;
                debug!("Rate limited {} ({:.1}ms since last accept)", key, now_ms - last);
                return Action::Drop;
            }
        }

        self.last_accept_ms.insert(key, now_ms);
        self.admitted += 1;
        Action::Accept
    }

    pub fn blocked(&self) -> u64 {
        self.blocked
    }

    pub fn admitted(&self) -> u64 {
        self.admitted
    }

    pub fn reset(&mut self) {
        self.last_accept_ms.clear();
        self.blocked = 0;
        self.admitted = 0;
    }
}
