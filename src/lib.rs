pub mod agent;
pub mod server;
pub mod network;
pub mod strategies;
pub mod lifecycle;
pub mod observer;
pub mod metrics;
pub mod simulation;

pub use agent::Agent;
pub use server::{Target, TargetPool};
pub use strategies::PolicySet;
pub use simulation::{Simulation, SimConfig};
pub use metrics::MetricsCollector;

pub mod prelude {
    pub use crate::agent::{Agent, AgentId, AgentKind, TrafficPattern};
    pub use crate::server::{HealthBand, Target, TargetId, TargetPool, TargetSnapshot};
    pub use crate::strategies::{AttackType, PolicySet};
    pub use crate::simulation::{ScenarioRegistry, SimConfig, SimSnapshot, Simulation};
    pub use crate::network::{Direction, PacketKind, Position, Request, Response, ResponseKind};
    pub use crate::observer::{EventRecorder, SimEvent, SimObserver};
    pub use crate::metrics::MetricsSnapshot;
}
