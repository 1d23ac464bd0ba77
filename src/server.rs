// Targets only track load and health, all motion lives in the lifecycle manager

use crate::network::Position;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

/// Load counts reset after this long rather than decaying.
pub const LOAD_WINDOW_MS: f64 = 1000.0;

/// Below this a target is too overloaded to answer at all.
pub const RESPONSE_HEALTH_FLOOR: f64 = 0.1;

const HEAL_STEP: f64 = 0.01;
const STRAIN_STEP: f64 = 0.02;
const STRAIN_FLOOR: f64 = 0.3;
const OVERLOAD_STEP: f64 = 0.05;

pub type SharedTarget = Arc<Mutex<Target>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TargetId(u32);

impl TargetId {
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    pub fn value(&self) -> u32 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthBand {
    Healthy,
    Warning,
    Critical,
}

impl HealthBand {
    pub fn classify(health: f64, load_ratio: f64) -> Self {
        if load_ratio <= 1.0 && health > 0.7 {
            Self::Healthy
        } else if load_ratio <= 1.5 && health > 0.3 {
            Self::Warning
        } else {
            Self::Critical
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoadReport {
    pub previous_health: f64,
    pub health: f64,
    pub load_ratio: f64,
    pub band: HealthBand,
}

impl LoadReport {
    pub fn health_changed(&self) -> bool {
        self.previous_health != self.health
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetSnapshot {
    pub id: TargetId,
    pub position: Position,
    pub capacity: u32,
    pub current_load: u32,
    pub load_percentage: f64,
    pub health: f64,
    pub band: HealthBand,
    pub total_hits: u64,
    pub attack_hits: u64,
}

#[derive(Debug, Clone)]
pub struct Target {
    id: TargetId,
    position: Position,
    capacity: u32,
    current_load: u32,
    health: f64,
    // Opened by the first request, not by the clock
    load_window_start_ms: Option<f64>,
    total_hits: u64,
    attack_hits: u64,
}

impl Target {
    pub fn new(id: TargetId, position: Position, capacity: u32) -> Self {
        Self {
            id,
            position,
            capacity: capacity.max(1),
            current_load: 0,
            health: 1.0,
            load_window_start_ms: None,
            total_hits: 0,
            attack_hits: 0,
        }
    }

    pub fn into_shared(self) -> SharedTarget {
        Arc::new(Mutex::new(self))
    }

    pub fn id(&self) -> TargetId {
        self.id
    }

    pub fn position(&self) -> Position {
        self.position
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn set_capacity(&mut self, capacity: u32) {
        self.capacity = capacity.max(1);
    }

    pub fn health(&self) -> f64 {
        self.health
    }

    pub fn current_load(&self) -> u32 {
        self.current_load
    }

    pub fn observed_load(&self, now_ms: f64) -> u32 {
        match self.load_window_start_ms {
            Some(start) if now_ms - start < LOAD_WINDOW_MS => self.current_load,
            _ => 0,
        }
    }

    pub fn load_ratio(&self) -> f64 {
        self.current_load as f64 / self.capacity as f64
    }

    pub fn load_percentage(&self) -> f64 {
        self.load_ratio() * 100.0
    }

    pub fn band(&self) -> HealthBand {
        HealthBand::classify(self.health, self.load_ratio())
    }

    pub fn snapshot(&self, now_ms: f64) -> TargetSnapshot {
        let current_load = self.observed_load(now_ms);
        let load_ratio = current_load as f64 / self.capacity as f64;
        TargetSnapshot {
            id: self.id,
            position: self.position,
            capacity: self.capacity,
            current_load,
            load_percentage: load_ratio * 100.0,
            health: self.health,
            band: HealthBand::classify(self.health, load_ratio),
            total_hits: self.total_hits,
            attack_hits: self.attack_hits,
        }
    }

    pub fn can_respond(&self) -> bool {
        self.health > RESPONSE_HEALTH_FLOOR
    }

    /// Charges one request. Health recovers under sustainable load and degrades
    /// with the overload ratio otherwise, staying within [0, 1].
    pub fn apply_load(&mut self, is_attack: bool, now_ms: f64) -> LoadReport {
        if self.load_window_start_ms.is_none_or(|start| now_ms - start >= LOAD_WINDOW_MS) {
            self.current_load = 0;
            self.load_window_start_ms = Some(now_ms);
        }

        self.current_load += 1;
        self.total_hits += 1;
        if is_attack {
            self.attack_hits += 1;
        }

        let previous_health = self.health;
        let load_ratio = self.load_ratio();

        self.health = if load_ratio <= 1.0 {
            (self.health + HEAL_STEP).min(1.0)
        } else if load_ratio <= 1.5 {
            // The floor never lifts a target that is already below it
            (self.health - STRAIN_STEP).max(STRAIN_FLOOR.min(self.health))
        } else {
            (self.health - OVERLOAD_STEP).max(0.0)
        };

        LoadReport {
            previous_health,
            health: self.health,
            load_ratio,
            band: HealthBand::classify(self.health, load_ratio),
        }
    }
}

#[derive(Debug)]
pub struct TargetPool {
    targets: Vec<SharedTarget>,
    next_id: u32,
    capacity: u32,
    origin: Position,
}

impl TargetPool {
    pub fn new(count: usize, capacity: u32) -> Self {
        Self::with_origin(count, capacity, Position::default())
    }

    pub fn with_origin(count: usize, capacity: u32, origin: Position) -> Self {
        let mut pool = Self {
            targets: Vec::new(),
            next_id: 0,
            capacity: capacity.max(1),
            origin,
        };
        for _ in 0..count.max(1) {
            pool.add_target();
        }
        pool
    }

    // Servers stack along z, alternating sides of the origin
    fn slot_position(&self, slot: usize) -> Position {
        let offset = ((slot + 1) / 2) as f64 * 2.5;
        let z = if slot % 2 == 0 { -offset } else { offset };
        Position::new(self.origin.x, self.origin.y, self.origin.z + z)
    }

    pub fn add_target(&mut self) -> TargetId {
        let id = TargetId::new(self.next_id);
        self.next_id += 1;
        let position = self.slot_position(self.targets.len());
        self.targets.push(Target::new(id, position, self.capacity).into_shared());
        info!("Target {} added at {:?}, pool size {}", id.value(), position, self.targets.len());
        id
    }

    pub fn find(&self, id: TargetId) -> Option<&SharedTarget> {
        self.targets.iter().find(|t| t.lock().id() == id)
    }

    pub fn remove_target(&mut self) -> Option<SharedTarget> {
        if self.targets.len() <= 1 {
            debug!("Refusing to remove the last target");
            return None;
        }
        let removed = self.targets.pop();
        if let Some(target) = &removed {
            info!("Target {} removed, pool size {}", target.lock().id().value(), self.targets.len());
        }
        removed
    }

    pub fn set_capacity(&mut self, capacity: u32) {
        self.capacity = capacity.max(1);
        for target in &self.targets {
            target.lock().set_capacity(self.capacity);
        }
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn primary(&self) -> &SharedTarget {
        // new() always seeds one target and remove_target keeps it
        &self.targets[0]
    }

    pub fn get(&self, index: usize) -> Option<&SharedTarget> {
        self.targets.get(index)
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SharedTarget> {
        self.targets.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn target(capacity: u32) -> Target {
        Target::new(TargetId::new(0), Position::default(), capacity)
    }

    #[test]
    fn overload_by_half_costs_two_points_per_request() {
        let mut t = target(10);
        for _ in 0..10 {
            t.apply_load(false, 0.0);
        }
        assert_eq!(t.health(), 1.0);

        let mut last = t.health();
        for _ in 0..5 {
            let report = t.apply_load(true, 10.0);
            assert!((last - report.health - 0.02).abs() < 1e-9);
            last = report.health;
        }
        assert!((t.health() - 0.9).abs() < 1e-9);
        assert!((t.load_ratio() - 1.5).abs() < 1e-9);
        assert_eq!(t.band(), HealthBand::Warning);
    }

    #[test]
    fn window_resets_instead_of_rolling() {
        let mut t = target(2);
        for _ in 0..3 {
            t.apply_load(false, 100.0);
        }
        assert_eq!(t.current_load(), 3);
        assert_eq!(t.observed_load(1099.0), 3);
        assert_eq!(t.observed_load(1100.0), 0);

        t.apply_load(false, 1100.0);
        assert_eq!(t.current_load(), 1);
    }

    #[test]
    fn late_target_gets_a_full_first_window() {
        let mut t = target(10);
        assert_eq!(t.observed_load(0.0), 0);
        t.apply_load(true, 600.0);
        t.apply_load(false, 1500.0);
        assert_eq!(t.observed_load(1599.0), 2);
        assert_eq!(t.observed_load(1600.0), 0);

        let snap = t.snapshot(1000.0);
        assert_eq!((snap.total_hits, snap.attack_hits), (2, 1));
    }

    #[test]
    fn strain_floor_does_not_heal() {
        let mut t = target(1);
        // Drive health down hard first
        for _ in 0..40 {
            t.apply_load(true, 0.0);
        }
        assert_eq!(t.health(), 0.0);

        // Fresh window: the first request heals a point, the second overloads again
        t.apply_load(true, 2000.0);
        t.apply_load(true, 2000.0);
        assert_eq!(t.health(), 0.0);

        let mut t = target(2);
        t.health = 0.1;
        t.load_window_start_ms = Some(0.0);
        t.current_load = 2;
        let report = t.apply_load(false, 0.0);
        assert!((report.load_ratio - 1.5).abs() < 1e-9);
        assert_eq!(report.health, 0.1);
    }

    #[test]
    fn capacity_change_is_not_retroactive() {
        let mut t = target(1);
        t.apply_load(false, 0.0);
        t.apply_load(false, 0.0);
        let before = t.health();
        t.set_capacity(100);
        assert_eq!(t.health(), before);
        assert_eq!(t.current_load(), 2);
    }

    #[test]
    fn pool_keeps_primary() {
        let mut pool = TargetPool::new(1, 10);
        assert!(pool.remove_target().is_none());
        pool.add_target();
        pool.add_target();
        assert_eq!(pool.len(), 3);
        let removed = pool.remove_target().map(|t| t.lock().id());
        assert_eq!(removed, Some(TargetId::new(2)));
        assert_eq!(pool.primary().lock().id(), TargetId::new(0));
    }

    #[test]
    fn band_thresholds() {
        assert_eq!(HealthBand::classify(0.8, 1.0), HealthBand::Healthy);
        assert_eq!(HealthBand::classify(0.7, 0.5), HealthBand::Warning);
        assert_eq!(HealthBand::classify(0.9, 1.2), HealthBand::Warning);
        assert_eq!(HealthBand::classify(0.9, 1.6), HealthBand::Critical);
        assert_eq!(HealthBand::classify(0.3, 0.5), HealthBand::Critical);
    }

    proptest! {
        #[test]
        fn health_stays_in_unit_interval(
            capacity in 1u32..50,
            steps in proptest::collection::vec((any::<bool>(), 0u32..400), 1..300),
        ) {
            let mut t = target(capacity);
            let mut now = 0.0;
            for (is_attack, gap) in steps {
                now += gap as f64;
                let report = t.apply_load(is_attack, now);
                prop_assert!((0.0..=1.0).contains(&report.health));
                if report.health > report.previous_health {
                    prop_assert!(report.load_ratio <= 1.0);
                }
            }
        }
    }
}
