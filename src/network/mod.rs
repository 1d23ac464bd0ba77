pub mod packet;

pub use packet::{Direction, PacketKind, Request, RequestId, RequestState, Response, ResponseId, ResponseKind, Transit};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Position {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn distance_to(&self, other: &Position) -> f64 {
        let (dx, dy, dz) = (other.x - self.x, other.y - self.y, other.z - self.z);
        (dx * dx + dy * dy + dz * dz).sqrt()
    }

    pub fn step_toward(&self, target: &Position, step: f64) -> Position {
        let dist = self.distance_to(target);
        if dist <= step || dist == 0.0 {
            return *target;
        }
        let k = step / dist;
        Position {
            x: self.x + (target.x - self.x) * k,
            y: self.y + (target.y - self.y) * k,
            z: self.z + (target.z - self.z) * k,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub speed: f64,
    pub arrival_epsilon: f64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            speed: 2.0,
            arrival_epsilon: 0.2,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_never_overshoots() {
        let a = Position::new(0.0, 0.0, 0.0);
        let b = Position::new(1.0, 0.0, 0.0);
        assert_eq!(a.step_toward(&b, 5.0), b);

        let mid = a.step_toward(&b, 0.25);
        assert!((mid.x - 0.25).abs() < 1e-9);
        assert!((mid.distance_to(&b) - 0.75).abs() < 1e-9);
    }
}
