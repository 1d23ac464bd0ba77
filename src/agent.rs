// Traffic sources. Emission used to be a self-rescheduling timer per source,
// here every source just carries its next fire time and the clock polls it.

use crate::network::Position;
use crate::server::TargetId;
use crate::strategies::rate_limit::SourceKey;
use anyhow::{Result, bail};
use rand::Rng;
use rand_distr::{Distribution, Exp};
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AgentId(u32);

impl AgentId {
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    pub fn value(&self) -> u32 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AgentKind {
    LegitimateUser,
    Attacker,
}

// Smallest gap between two fires of one source
const MIN_GAP_MS: f64 = 1.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TrafficPattern {
    Constant { interval_ms: f64 },
    Jittered { min_ms: f64, max_ms: f64 },
    Bursty { burst_size: u32, spacing_ms: f64, period_ms: f64 },
    Poisson { rate_per_sec: f64 },
}

impl TrafficPattern {
    pub fn nominal_rate(&self) -> f64 {
        match self {
            Self::Constant { interval_ms } => 1000.0 / interval_ms.max(1.0),
            Self::Jittered { min_ms, max_ms } => 2000.0 / (min_ms + max_ms).max(1.0),
            Self::Bursty { burst_size, period_ms, .. } => *burst_size as f64 * 1000.0 / period_ms.max(1.0),
            Self::Poisson { rate_per_sec } => *rate_per_sec,
        }
    }

    pub fn validate(&self) -> Result<()> {
        let positive = |v: f64| v.is_finite() && v > 0.0;
        match *self {
            Self::Constant { interval_ms } if !positive(interval_ms) => {
                bail!("constant interval must be positive, got {}", interval_ms)
            }
            Self::Jittered { min_ms, max_ms }
                if !(min_ms.is_finite() && min_ms >= 0.0) || !positive(max_ms) || max_ms < min_ms =>
            {
                bail!("invalid jitter range {}..{}", min_ms, max_ms)
            }
            Self::Bursty { burst_size, spacing_ms, period_ms }
                if burst_size == 0 || !(spacing_ms.is_finite() && spacing_ms >= 0.0) || !positive(period_ms) =>
            {
                bail!("invalid burst of {} every {} ms spaced {} ms", burst_size, period_ms, spacing_ms)
            }
            Self::Poisson { rate_per_sec } if !positive(rate_per_sec) => {
                bail!("poisson rate must be positive, got {}", rate_per_sec)
            }
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Agent {
    id: AgentId,
    kind: AgentKind,
    position: Position,
    pattern: TrafficPattern,
    assigned_target: Option<TargetId>,
    next_fire_ms: Option<f64>,
    burst_start_ms: f64,
    burst_index: u32,
    emitted: u64,
}

impl Agent {
    pub fn new(id: AgentId, kind: AgentKind, position: Position, pattern: TrafficPattern) -> Self {
        Self {
            id,
            kind,
            position,
            pattern,
            assigned_target: None,
            next_fire_ms: None,
            burst_start_ms: 0.0,
            burst_index: 0,
            emitted: 0,
        }
    }

    pub fn id(&self) -> AgentId {
        self.id
    }

    pub fn kind(&self) -> AgentKind {
        self.kind
    }

    pub fn is_attacker(&self) -> bool {
        self.kind == AgentKind::Attacker
    }

    pub fn position(&self) -> Position {
        self.position
    }

    pub fn source_key(&self) -> SourceKey {
        SourceKey::from_position(&self.position)
    }

    pub fn assigned_target(&self) -> Option<TargetId> {
        self.assigned_target
    }

    pub fn assign(&mut self, target: TargetId) {
        self.assigned_target = Some(target);
    }

    pub fn is_active(&self) -> bool {
        self.next_fire_ms.is_some()
    }

    pub fn next_fire_ms(&self) -> Option<f64> {
        self.next_fire_ms
    }

    pub fn emitted(&self) -> u64 {
        self.emitted
    }

    /// Starts emitting, first request at `now_ms`. No-op when already active.
    pub fn activate(&mut self, now_ms: f64) {
        if self.next_fire_ms.is_some() {
            return;
        }
        self.next_fire_ms = Some(now_ms);
        self.burst_start_ms = now_ms;
        self.burst_index = 0;
        debug!("Agent {} ({:?}) active with {:?}", self.id.value(), self.kind, self.pattern);
    }

    pub fn deactivate(&mut self) {
        self.next_fire_ms = None;
        self.burst_index = 0;
    }

    /// Consumes the pending fire and schedules the next one. Never schedules
    /// into the past, whatever the pattern holds.
    pub fn fire<R: Rng + ?Sized>(&mut self, now_ms: f64, rng: &mut R) {
        if self.next_fire_ms.is_none() {
            return;
        }
        self.emitted += 1;

        let next = match &self.pattern {
            TrafficPattern::Constant { interval_ms } => now_ms + interval_ms.max(MIN_GAP_MS),
            TrafficPattern::Jittered { min_ms, max_ms } => {
                let gap = if min_ms.is_finite() && max_ms.is_finite() && max_ms > min_ms {
                    rng.gen_range(*min_ms..*max_ms)
                } else {
                    *min_ms
                };
                now_ms + gap.max(MIN_GAP_MS)
            }
            TrafficPattern::Bursty { burst_size, spacing_ms, period_ms } => {
                self.burst_index += 1;
                if self.burst_index < *burst_size {
                    now_ms + spacing_ms.max(0.0)
                } else {
                    self.burst_index = 0;
                    self.burst_start_ms = (self.burst_start_ms + period_ms.max(1.0)).max(now_ms);
                    self.burst_start_ms
                }
            }
            TrafficPattern::Poisson { rate_per_sec } => {
                let wait_secs = match Exp::new(*rate_per_sec) {
                    Ok(dist) => dist.sample(rng),
                    Err(_) => 1.0,
                };
                now_ms + (wait_secs * 1000.0).max(MIN_GAP_MS)
            }
        };
        self.next_fire_ms = Some(next);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn agent(pattern: TrafficPattern) -> Agent {
        Agent::new(AgentId::new(1), AgentKind::Attacker, Position::new(5.0, 0.0, 0.0), pattern)
    }

    #[test]
    fn inactive_agents_never_fire() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut a = agent(TrafficPattern::Constant { interval_ms: 100.0 });
        assert_eq!(a.next_fire_ms(), None);
        a.fire(0.0, &mut rng);
        assert_eq!(a.emitted(), 0);
    }

    #[test]
    fn burst_follows_flood_cadence() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut a = agent(TrafficPattern::Bursty { burst_size: 5, spacing_ms: 50.0, period_ms: 200.0 });
        a.activate(0.0);

        let mut fires = Vec::new();
        while let Some(t) = a.next_fire_ms() {
            if t > 400.0 {
                break;
            }
            fires.push(t);
            a.fire(t, &mut rng);
        }
        assert_eq!(fires, vec![0.0, 50.0, 100.0, 150.0, 200.0, 200.0, 250.0, 300.0, 350.0, 400.0, 400.0]);
    }

    #[test]
    fn jitter_stays_in_range() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut a = agent(TrafficPattern::Jittered { min_ms: 1000.0, max_ms: 3000.0 });
        a.activate(0.0);
        let mut now = 0.0;
        for _ in 0..50 {
            a.fire(now, &mut rng);
            let next = a.next_fire_ms().unwrap();
            assert!(next - now >= 1000.0 && next - now < 3000.0);
            now = next;
        }
    }

    #[test]
    fn negative_jitter_still_moves_forward() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut a = agent(TrafficPattern::Jittered { min_ms: -50.0, max_ms: -10.0 });
        a.activate(100.0);
        let mut now = 100.0;
        for _ in 0..20 {
            a.fire(now, &mut rng);
            let next = a.next_fire_ms().unwrap();
            assert!(next >= now + 1.0);
            now = next;
        }
    }

    #[test]
    fn broken_patterns_fail_validation() {
        let broken = [
            TrafficPattern::Constant { interval_ms: 0.0 },
            TrafficPattern::Jittered { min_ms: -50.0, max_ms: -10.0 },
            TrafficPattern::Jittered { min_ms: 300.0, max_ms: 100.0 },
            TrafficPattern::Jittered { min_ms: 0.0, max_ms: f64::NAN },
            TrafficPattern::Bursty { burst_size: 0, spacing_ms: 50.0, period_ms: 200.0 },
            TrafficPattern::Bursty { burst_size: 5, spacing_ms: -1.0, period_ms: 200.0 },
            TrafficPattern::Poisson { rate_per_sec: f64::INFINITY },
        ];
        for pattern in broken {
            assert!(pattern.validate().is_err(), "{:?}", pattern);
        }
        assert!(TrafficPattern::Jittered { min_ms: 0.0, max_ms: 10.0 }.validate().is_ok());
        assert!(TrafficPattern::Bursty { burst_size: 5, spacing_ms: 0.0, period_ms: 200.0 }.validate().is_ok());
    }

    #[test]
    fn activate_twice_keeps_schedule() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut a = agent(TrafficPattern::Constant { interval_ms: 100.0 });
        a.activate(0.0);
        a.fire(0.0, &mut rng);
        a.activate(50.0);
        assert_eq!(a.next_fire_ms(), Some(100.0));
        a.deactivate();
        assert!(!a.is_active());
    }
}
