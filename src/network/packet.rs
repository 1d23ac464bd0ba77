use super::Position;
use crate::agent::AgentId;
use crate::server::{SharedTarget, TargetId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RequestId(u64);

impl RequestId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResponseId(u64);

impl ResponseId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PacketKind {
    #[default]
    Normal,
    Encrypted,
    Intercepted,
    Malicious,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestState {
    /// `leg` is 1 on the way to an intercepting hop (or straight to the far end), 2 after it.
    InFlight { leg: u8 },
    Delivered,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    #[default]
    ToTarget,
    /// Server-initiated chatter. Charges no load and gets no answer.
    FromTarget,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseKind {
    Normal,
    Delayed,
    Failed,
}

impl ResponseKind {
    pub fn from_outcome(is_attack: bool, health: f64) -> Self {
        if is_attack {
            Self::Failed
        } else if health > 0.5 {
            Self::Normal
        } else {
            Self::Delayed
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transit {
    pub position: Position,
    pub leg_start: Position,
    pub destination: Position,
    pub speed: f64,
}

impl Transit {
    pub fn new(from: Position, to: Position, speed: f64) -> Self {
        Self {
            position: from,
            leg_start: from,
            destination: to,
            speed,
        }
    }

    pub fn advance(&mut self, dt_secs: f64, epsilon: f64) -> bool {
        self.position = self.position.step_toward(&self.destination, self.speed * dt_secs);
        self.has_arrived(epsilon)
    }

    pub fn has_arrived(&self, epsilon: f64) -> bool {
        self.position.distance_to(&self.destination) < epsilon
    }

    pub fn retarget(&mut self, destination: Position) {
        self.leg_start = self.position;
        self.destination = destination;
    }

    pub fn progress(&self) -> f64 {
        let total = self.leg_start.distance_to(&self.destination);
        if total == 0.0 {
            return 1.0;
        }
        (self.leg_start.distance_to(&self.position) / total).clamp(0.0, 1.0)
    }
}

#[derive(Debug, Clone)]
pub struct Request {
    pub id: RequestId,
    pub source: AgentId,
    pub origin: Position,
    pub is_attack: bool,
    pub target_id: TargetId,
    // Bound at emission; removing the target from the pool later does not affect this request.
    pub(crate) target: SharedTarget,
    pub created_at_ms: f64,
    pub transit: Transit,
    /// Set while the request is still heading to an intercepting hop.
    pub via: Option<Position>,
    pub final_destination: Position,
    pub kind: PacketKind,
    pub state: RequestState,
    pub direction: Direction,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub id: ResponseId,
    pub origin_target: TargetId,
    pub request: RequestId,
    pub destination: Position,
    pub kind: ResponseKind,
    pub created_at_ms: f64,
    pub transit: Transit,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_kind_by_health() {
        assert_eq!(ResponseKind::from_outcome(true, 1.0), ResponseKind::Failed);
        assert_eq!(ResponseKind::from_outcome(false, 0.9), ResponseKind::Normal);
        assert_eq!(ResponseKind::from_outcome(false, 0.5), ResponseKind::Delayed);
    }

    #[test]
    fn transit_arrives_within_epsilon() {
        let mut t = Transit::new(Position::new(0.0, 0.0, 0.0), Position::new(1.1, 0.0, 0.0), 2.0);
        // 0.032 units per frame
        let mut frames = 0;
        while !t.advance(0.016, 0.2) {
            frames += 1;
            assert!(frames < 100);
        }
        assert!(t.progress() > 0.79);
        assert_eq!(frames, 28);
    }
}
