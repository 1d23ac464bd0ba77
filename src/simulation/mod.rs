pub mod config;
pub mod driver;
pub mod scenarios;

pub use config::{LabKind, SimConfig};
pub use scenarios::ScenarioRegistry;

use crate::agent::{Agent, AgentId, AgentKind};
use crate::lifecycle::{Emission, Lifecycle};
use crate::metrics::{FrameGauges, MetricsCollector};
use crate::network::Position;
use crate::observer::{ObserverSet, SimObserver, TracingObserver};
use crate::server::{TargetId, TargetPool, TargetSnapshot};
use crate::strategies::{AttackType, Interceptor, LoadBalancer, PolicySet, RateLimiter};
use rand::{Rng, SeedableRng};
use rand::rngs::StdRng;
use serde::Serialize;
use tracing::{debug, info, warn};

const SNAPSHOT_INTERVAL_MS: f64 = 1000.0;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Due {
    Agent(usize),
    Responses,
    AttackStart,
}

#[derive(Debug, Clone, Serialize)]
pub struct RateLimitState {
    pub enabled: bool,
    pub threshold: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct InterceptionState {
    pub active: bool,
    pub attack_type: AttackType,
    pub encryption: bool,
    pub vpn: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SimSnapshot {
    pub now_ms: f64,
    pub running: bool,
    pub attack_traffic: bool,
    pub targets: Vec<TargetSnapshot>,
    pub active_requests: usize,
    pub active_responses: usize,
    pub pending_responses: usize,
    pub total_requests: u64,
    pub admitted_count: u64,
    pub blocked_count: u64,
    pub balanced_count: u64,
    pub intercepted_count: u64,
    pub modified_count: u64,
    /// Intercepted share of all packets, as a whole percentage.
    pub attack_success_rate: u32,
    pub rate_limit: RateLimitState,
    pub load_balancing: bool,
    pub interception: InterceptionState,
}

pub struct Simulation {
    config: SimConfig,
    now_ms: f64,
    running: bool,
    attack_traffic: bool,
    attack_start_at: Option<f64>,
    agents: Vec<Agent>,
    pool: TargetPool,
    policies: PolicySet,
    lifecycle: Lifecycle,
    observers: ObserverSet,
    rng: StdRng,
    next_snapshot_ms: f64,
    pub metrics: MetricsCollector,
}

impl Simulation {
    pub fn new(config: SimConfig) -> Self {
        let layout = config.lab.layout();
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let pool = TargetPool::with_origin(config.num_targets, config.target_capacity, layout.targets);

        let mut agents = Vec::new();
        for i in 0..config.num_users {
            agents.push(Agent::new(
                AgentId::new(agents.len() as u32),
                AgentKind::LegitimateUser,
                spread(layout.users, layout.user_spread, i, config.num_users),
                config.user_traffic.clone(),
            ));
        }
        for i in 0..config.num_attackers {
            agents.push(Agent::new(
                AgentId::new(agents.len() as u32),
                AgentKind::Attacker,
                spread(layout.attackers, layout.attacker_spread, i, config.num_attackers),
                config.attack_traffic.clone(),
            ));
        }

        let mut interceptor = Interceptor::new(layout.interceptor);
        interceptor.set_active(config.mitm.active);
        interceptor.set_attack_type(config.mitm.attack_type);
        interceptor.set_encryption(config.mitm.encryption);
        interceptor.set_vpn(config.mitm.vpn);

        let policies = PolicySet::new(
            RateLimiter::new(config.defenses.rate_limit_threshold).with_enabled(config.defenses.rate_limit),
            LoadBalancer::new(config.defenses.load_balancing),
            interceptor,
        );

        let metrics = MetricsCollector::new();
        let mut observers = ObserverSet::new();
        observers.add(Box::new(metrics.clone()));
        observers.add(Box::new(TracingObserver));

        let lifecycle = Lifecycle::new(config.network.clone(), config.response_delay_ms);

        let mut sim = Self {
            config,
            now_ms: 0.0,
            running: false,
            attack_traffic: false,
            attack_start_at: None,
            agents,
            pool,
            policies,
            lifecycle,
            observers,
            rng,
            next_snapshot_ms: SNAPSHOT_INTERVAL_MS,
            metrics,
        };
        sim.reassign_sources();
        sim
    }

    pub fn add_observer(&mut self, observer: impl SimObserver + 'static) {
        self.observers.add(Box::new(observer));
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn now_ms(&self) -> f64 {
        self.now_ms
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn is_attack_active(&self) -> bool {
        self.attack_traffic
    }

    pub fn agents(&self) -> &[Agent] {
        &self.agents
    }

    pub fn pool(&self) -> &TargetPool {
        &self.pool
    }

    pub fn policies(&self) -> &PolicySet {
        &self.policies
    }

    pub fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    // Round robin at setup and whenever the pool changes size
    fn reassign_sources(&mut self) {
        let ids: Vec<TargetId> = self.pool.iter().map(|t| t.lock().id()).collect();
        for (i, agent) in self.agents.iter_mut().enumerate() {
            agent.assign(ids[i % ids.len()]);
        }
    }

    // ---- control surface ----

    pub fn start(&mut self) {
        if self.running {
            return;
        }
        self.running = true;
        let now = self.now_ms;
        for agent in self.agents.iter_mut().filter(|a| !a.is_attacker()) {
            agent.activate(now);
        }
        if let Some(delay) = self.config.attack_start_ms {
            self.attack_start_at = Some(now + delay);
        }
        info!(
            "Simulation '{}' started: {} agents, {} targets, defenses [{}]",
            self.config.name,
            self.agents.len(),
            self.pool.len(),
            self.policies.enabled_defenses().join(", ")
        );
    }

    /// Halts the clock. Every schedule is cancelled, so nothing fires until `start` again.
    pub fn stop(&mut self) {
        if !self.running {
            return;
        }
        self.running = false;
        self.attack_traffic = false;
        self.attack_start_at = None;
        for agent in &mut self.agents {
            agent.deactivate();
        }
        info!("Simulation '{}' stopped at {:.1}s", self.config.name, self.now_ms / 1000.0);
    }

    /// Stops, discards everything still in flight and zeroes the policy counters.
    pub fn close(&mut self) {
        self.stop();
        self.lifecycle.clear();
        self.policies.reset();
    }

    /// Only takes effect while running. Cancels any pending automatic start either way.
    pub fn start_attack_traffic(&mut self) {
        self.attack_start_at = None;
        if !self.running {
            debug!("Ignoring attack start while stopped");
            return;
        }
        if self.attack_traffic {
            return;
        }
        self.attack_traffic = true;
        let now = self.now_ms;
        let mut started = 0;
        for agent in self.agents.iter_mut().filter(|a| a.is_attacker()) {
            agent.activate(now);
            started += 1;
        }
        info!("Attack traffic started from {} sources at {:.1}s", started, now / 1000.0);
    }

    pub fn stop_attack_traffic(&mut self) {
        self.attack_start_at = None;
        if !self.attack_traffic {
            return;
        }
        self.attack_traffic = false;
        for agent in self.agents.iter_mut().filter(|a| a.is_attacker()) {
            agent.deactivate();
        }
        info!("Attack traffic stopped at {:.1}s", self.now_ms / 1000.0);
    }

    pub fn set_rate_limit(&mut self, enabled: bool, threshold_per_sec: f64) {
        if !self.policies.rate_limiter.configure(enabled, threshold_per_sec) {
            warn!("Ignoring rate limit threshold {}", threshold_per_sec);
            return;
        }
        info!("Rate limiting {} at {}/s", on_off(enabled), threshold_per_sec);
    }

    pub fn set_load_balancing(&mut self, enabled: bool) {
        self.policies.load_balancer.set_enabled(enabled);
        info!("Load balancing {}", on_off(enabled));
    }

    pub fn add_target(&mut self) -> TargetId {
        let id = self.pool.add_target();
        self.reassign_sources();
        id
    }

    /// No-op when only the primary is left. In-flight requests keep their target.
    pub fn remove_target(&mut self) {
        if self.pool.remove_target().is_some() {
            self.reassign_sources();
        }
    }

    pub fn set_target_capacity(&mut self, capacity: u32) {
        if capacity == 0 {
            warn!("Ignoring zero target capacity");
            return;
        }
        self.pool.set_capacity(capacity);
        info!("Target capacity set to {}/s", capacity);
    }

    pub fn set_encryption(&mut self, enabled: bool) {
        self.policies.interceptor.set_encryption(enabled);
        info!("HTTPS encryption {}", on_off(enabled));
    }

    pub fn set_vpn(&mut self, enabled: bool) {
        self.policies.interceptor.set_vpn(enabled);
        info!("VPN {}", on_off(enabled));
    }

    pub fn set_attack_type(&mut self, attack_type: AttackType) {
        self.policies.interceptor.set_attack_type(attack_type);
        info!("Interception mode set to {:?}", attack_type);
    }

    pub fn start_interception(&mut self) {
        if self.policies.interceptor.is_active() {
            return;
        }
        self.policies.interceptor.set_active(true);
        info!("Interception started ({:?})", self.policies.interceptor.attack_type());
    }

    pub fn stop_interception(&mut self) {
        if !self.policies.interceptor.is_active() {
            return;
        }
        self.policies.interceptor.set_active(false);
        info!("Interception stopped");
    }

    // ---- clock ----

    pub fn emit(&mut self, source: AgentId) -> Option<Emission> {
        let index = self.agents.iter().position(|a| a.id() == source)?;
        Some(self.emit_at(index, self.now_ms))
    }

    fn emit_at(&mut self, index: usize, at_ms: f64) -> Emission {
        let agent = &self.agents[index];
        self.lifecycle.emit(
            agent,
            agent.is_attacker(),
            at_ms,
            &mut self.policies,
            &self.pool,
            &mut self.observers,
        )
    }

    // Server-initiated chatter toward `index`, from the server it talks to
    fn emit_downstream_at(&mut self, index: usize, at_ms: f64) -> Emission {
        let agent = &self.agents[index];
        let target = agent
            .assigned_target()
            .and_then(|id| self.pool.find(id))
            .unwrap_or_else(|| self.pool.primary())
            .clone();
        self.lifecycle
            .emit_downstream(agent, target, at_ms, &mut self.policies, &mut self.observers)
    }

    fn next_due(&self) -> Option<(f64, Due)> {
        let mut best: Option<(f64, Due)> = None;
        let mut consider = |at: f64, due: Due| {
            if best.is_none_or(|(t, _)| at < t) {
                best = Some((at, due));
            }
        };

        if let Some(at) = self.lifecycle.next_response_due() {
            consider(at, Due::Responses);
        }
        if let Some(at) = self.attack_start_at {
            consider(at, Due::AttackStart);
        }
        for (i, agent) in self.agents.iter().enumerate() {
            if let Some(at) = agent.next_fire_ms() {
                consider(at, Due::Agent(i));
            }
        }
        best
    }

    /// Advances one frame. Timers that fall inside the frame fire in time order at
    /// their exact instant, then everything in flight moves by the whole frame.
    pub fn tick(&mut self, dt_ms: f64) {
        if !self.running || !dt_ms.is_finite() || dt_ms <= 0.0 {
            return;
        }
        let frame_end = self.now_ms + dt_ms;

        while let Some((at, due)) = self.next_due() {
            if at > frame_end || !self.running {
                break;
            }
            self.now_ms = self.now_ms.max(at);
            match due {
                Due::Agent(index) => {
                    let now = self.now_ms;
                    let downstream = self.config.mitm.bidirectional
                        && !self.agents[index].is_attacker()
                        && self.rng.gen_bool(0.5);
                    let emission = if downstream {
                        self.emit_downstream_at(index, now)
                    } else {
                        self.emit_at(index, now)
                    };
                    if let Emission::Blocked = emission {
                        debug!("Agent {} was rate limited", self.agents[index].id().value());
                    }
                    self.agents[index].fire(now, &mut self.rng);
                }
                Due::Responses => self.lifecycle.release_due(self.now_ms, &mut self.observers),
                Due::AttackStart => self.start_attack_traffic(),
            }
        }

        self.now_ms = frame_end;
        self.lifecycle.advance(
            dt_ms / 1000.0,
            self.now_ms,
            &mut self.policies,
            &mut self.observers,
            &mut self.rng,
        );

        self.metrics.record_frame(self.gauges());
        while self.now_ms >= self.next_snapshot_ms {
            self.metrics.save_snapshot(self.next_snapshot_ms);
            self.next_snapshot_ms += SNAPSHOT_INTERVAL_MS;
        }
    }

    pub fn run_headless(&mut self) -> MetricsCollector {
        let frame_ms = self.config.frame_ms;
        let end_ms = self.now_ms + self.config.duration.as_secs_f64() * 1000.0;
        self.start();
        while self.now_ms < end_ms {
            self.tick(frame_ms.min(end_ms - self.now_ms));
        }
        self.stop();
        self.metrics.clone()
    }

    fn gauges(&self) -> FrameGauges {
        let healths: Vec<f64> = self.pool.iter().map(|t| t.lock().health()).collect();
        let avg_health = healths.iter().sum::<f64>() / healths.len().max(1) as f64;
        let min_health = healths.iter().copied().fold(1.0_f64, f64::min);
        FrameGauges {
            in_flight: self.lifecycle.in_flight(),
            avg_health,
            min_health,
            balanced_requests: self.policies.load_balancer.balanced(),
        }
    }

    pub fn snapshot(&self) -> SimSnapshot {
        let interceptor = &self.policies.interceptor;
        let total_requests = self.metrics.snapshot(self.now_ms).requests_emitted;
        let attack_success_rate = if total_requests > 0 {
            ((interceptor.intercepted() as f64 / total_requests as f64) * 100.0).round() as u32
        } else {
            0
        };

        SimSnapshot {
            now_ms: self.now_ms,
            running: self.running,
            attack_traffic: self.attack_traffic,
            targets: self.pool.iter().map(|t| t.lock().snapshot(self.now_ms)).collect(),
            active_requests: self.lifecycle.requests().len(),
            active_responses: self.lifecycle.responses().len(),
            pending_responses: self.lifecycle.pending_responses(),
            total_requests,
            admitted_count: self.policies.rate_limiter.admitted(),
            blocked_count: self.policies.rate_limiter.blocked(),
            balanced_count: self.policies.load_balancer.balanced(),
            intercepted_count: interceptor.intercepted(),
            modified_count: interceptor.modified(),
            attack_success_rate,
            rate_limit: RateLimitState {
                enabled: self.policies.rate_limiter.is_enabled(),
                threshold: self.policies.rate_limiter.threshold(),
            },
            load_balancing: self.policies.load_balancer.is_enabled(),
            interception: InterceptionState {
                active: interceptor.is_active(),
                attack_type: interceptor.attack_type(),
                encryption: interceptor.encryption(),
                vpn: interceptor.vpn(),
            },
        }
    }
}

impl std::fmt::Debug for Simulation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Simulation")
            .field("name", &self.config.name)
            .field("now_ms", &self.now_ms)
            .field("running", &self.running)
            .field("agents", &self.agents.len())
            .field("targets", &self.pool.len())
            .finish()
    }
}

fn on_off(enabled: bool) -> &'static str {
    if enabled { "enabled" } else { "disabled" }
}

// Spreads `count` entities evenly along z around `anchor`
fn spread(anchor: Position, width: f64, index: u32, count: u32) -> Position {
    if count <= 1 {
        return anchor;
    }
    let step = width / (count - 1) as f64;
    let z = anchor.z - width / 2.0 + step * index as f64;
    Position::new(anchor.x, anchor.y, z)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::TrafficPattern;
    use std::time::Duration;

    #[test]
    fn spread_matches_lab_layout() {
        let users = Position::new(-5.0, 0.0, 0.0);
        assert_eq!(spread(users, 6.0, 0, 2), Position::new(-5.0, 0.0, -3.0));
        assert_eq!(spread(users, 6.0, 1, 2), Position::new(-5.0, 0.0, 3.0));
        assert_eq!(spread(users, 6.0, 0, 1), users);
    }

    #[test]
    fn stopped_simulation_does_not_move() {
        let mut sim = Simulation::new(SimConfig::default().with_seed(1));
        sim.tick(16.0);
        assert_eq!(sim.now_ms(), 0.0);
        assert_eq!(sim.lifecycle().in_flight(), 0);
    }

    #[test]
    fn attack_starts_after_delay() {
        let mut sim = Simulation::new(SimConfig::default().with_seed(1));
        sim.start();
        while sim.now_ms() < 2990.0 {
            sim.tick(16.0);
        }
        assert!(!sim.is_attack_active());
        while sim.now_ms() < 3100.0 {
            sim.tick(16.0);
        }
        assert!(sim.is_attack_active());
        assert!(sim.lifecycle().requests().iter().any(|r| r.is_attack));
    }

    #[test]
    fn sources_are_reassigned_when_pool_grows() {
        let config = SimConfig { num_users: 4, num_attackers: 0, ..SimConfig::default() };
        let mut sim = Simulation::new(config);
        assert!(sim.agents().iter().all(|a| a.assigned_target() == Some(TargetId::new(0))));

        sim.add_target();
        let assigned: Vec<u32> = sim.agents().iter().filter_map(|a| a.assigned_target()).map(|t| t.value()).collect();
        assert_eq!(assigned, vec![0, 1, 0, 1]);

        sim.remove_target();
        sim.remove_target();
        assert_eq!(sim.pool().len(), 1);
    }

    #[test]
    fn invalid_controls_are_ignored() {
        let mut sim = Simulation::new(SimConfig::default());
        sim.set_target_capacity(0);
        assert_eq!(sim.pool().capacity(), 10);
        sim.set_rate_limit(true, -3.0);
        assert!(!sim.policies().rate_limiter.is_enabled());
        sim.remove_target();
        assert_eq!(sim.pool().len(), 1);
        assert!(sim.emit(AgentId::new(99)).is_none());
    }

    #[test]
    fn negative_jitter_cannot_stall_a_frame() {
        let config = SimConfig {
            user_traffic: TrafficPattern::Jittered { min_ms: -50.0, max_ms: -10.0 },
            attack_start_ms: None,
            seed: Some(5),
            ..SimConfig::default()
        };
        let mut sim = Simulation::new(config);
        sim.start();
        sim.tick(16.0);
        assert_eq!(sim.now_ms(), 16.0);
        // At most one fire per millisecond per user
        assert!(sim.agents().iter().all(|a| a.emitted() <= 17));
    }

    #[test]
    fn attack_start_waits_for_a_running_clock() {
        let mut sim = Simulation::new(SimConfig::default().with_seed(2));
        sim.start_attack_traffic();
        assert!(!sim.is_attack_active());
        assert!(sim.agents().iter().all(|a| a.next_fire_ms().is_none()));

        sim.start();
        sim.stop();
        sim.start_attack_traffic();
        assert!(!sim.is_attack_active());
        assert!(sim.agents().iter().filter(|a| a.is_attacker()).all(|a| a.next_fire_ms().is_none()));

        sim.start();
        sim.start_attack_traffic();
        assert!(sim.is_attack_active());
        assert!(sim.agents().iter().filter(|a| a.is_attacker()).all(|a| a.is_active()));
    }

    #[test]
    fn snapshots_once_per_second() {
        let config = SimConfig {
            duration: Duration::from_secs(5),
            user_traffic: TrafficPattern::Constant { interval_ms: 250.0 },
            attack_start_ms: None,
            seed: Some(3),
            ..SimConfig::default()
        };
        let mut sim = Simulation::new(config);
        let metrics = sim.run_headless();
        let snapshots = metrics.get_snapshots();
        assert_eq!(snapshots.len(), 5);
        assert_eq!(snapshots[0].timestamp, 1.0);
        assert!(!sim.is_running());
        // Two users at 4/s each
        assert!(snapshots[4].requests_emitted >= 38);
    }
}
