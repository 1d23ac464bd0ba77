use crate::agent::AgentId;
use crate::network::{Direction, Request, RequestId, Response, ResponseId, ResponseKind};
use crate::server::{HealthBand, TargetId, TargetSnapshot};
use crate::strategies::SourceKey;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

pub trait SimObserver: Send {
    fn on_request_created(&mut self, _now_ms: f64, _request: &Request) {}
    fn on_request_blocked(&mut self, _now_ms: f64, _source: AgentId, _key: SourceKey) {}
    fn on_request_delivered(&mut self, _now_ms: f64, _request: &Request) {}
    fn on_response_created(&mut self, _now_ms: f64, _response: &Response) {}
    /// The target was too unhealthy to answer.
    fn on_response_suppressed(&mut self, _now_ms: f64, _request: &Request) {}
    fn on_target_health_changed(&mut self, _now_ms: f64, _target: &TargetSnapshot) {}
    fn on_packet_intercepted(&mut self, _now_ms: f64, _request: &Request) {}
    fn on_packet_modified(&mut self, _now_ms: f64, _request: &Request) {}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SimEvent {
    RequestCreated {
        at_ms: f64,
        id: RequestId,
        source: AgentId,
        target: TargetId,
        is_attack: bool,
        spliced: bool,
        direction: Direction,
    },
    RequestBlocked { at_ms: f64, source: AgentId, key: SourceKey },
    RequestDelivered { at_ms: f64, id: RequestId, target: TargetId },
    ResponseCreated { at_ms: f64, id: ResponseId, request: RequestId, kind: ResponseKind },
    ResponseSuppressed { at_ms: f64, request: RequestId },
    TargetHealthChanged { at_ms: f64, target: TargetId, health: f64, band: HealthBand },
    PacketIntercepted { at_ms: f64, id: RequestId },
    PacketModified { at_ms: f64, id: RequestId },
}

/// Keeps every event in a shared buffer. Clone the recorder before handing it
/// to the simulation to keep a reading handle.
#[derive(Debug, Clone, Default)]
pub struct EventRecorder {
    events: Arc<Mutex<Vec<SimEvent>>>,
}

impl EventRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<SimEvent> {
        self.events.lock().clone()
    }

    pub fn drain(&self) -> Vec<SimEvent> {
        std::mem::take(&mut *self.events.lock())
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    fn push(&self, event: SimEvent) {
        self.events.lock().push(event);
    }
}

impl SimObserver for EventRecorder {
    fn on_request_created(&mut self, now_ms: f64, request: &Request) {
        self.push(SimEvent::RequestCreated {
            at_ms: now_ms,
            id: request.id,
            source: request.source,
            target: request.target_id,
            is_attack: request.is_attack,
            spliced: request.via.is_some(),
            direction: request.direction,
        });
    }

    fn on_request_blocked(&mut self, now_ms: f64, source: AgentId, key: SourceKey) {
        self.push(SimEvent::RequestBlocked { at_ms: now_ms, source, key });
    }

    fn on_request_delivered(&mut self, now_ms: f64, request: &Request) {
        self.push(SimEvent::RequestDelivered { at_ms: now_ms, id: request.id, target: request.target_id });
    }

    fn on_response_created(&mut self, now_ms: f64, response: &Response) {
        self.push(SimEvent::ResponseCreated {
            at_ms: now_ms,
            id: response.id,
            request: response.request,
            kind: response.kind,
        });
    }

    fn on_response_suppressed(&mut self, now_ms: f64, request: &Request) {
        self.push(SimEvent::ResponseSuppressed { at_ms: now_ms, request: request.id });
    }

    fn on_target_health_changed(&mut self, now_ms: f64, target: &TargetSnapshot) {
        self.push(SimEvent::TargetHealthChanged {
            at_ms: now_ms,
            target: target.id,
            health: target.health,
            band: target.band,
        });
    }

    fn on_packet_intercepted(&mut self, now_ms: f64, request: &Request) {
        self.push(SimEvent::PacketIntercepted { at_ms: now_ms, id: request.id });
    }

    fn on_packet_modified(&mut self, now_ms: f64, request: &Request) {
        self.push(SimEvent::PacketModified { at_ms: now_ms, id: request.id });
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl SimObserver for TracingObserver {
    fn on_request_created(&mut self, now_ms: f64, request: &Request) {
        debug!(
            "[{:>8.1}ms] request {} from agent {} -> target {}{}",
            now_ms,
            request.id.value(),
            request.source.value(),
            request.target_id.value(),
            if request.via.is_some() { " (spliced)" } else { "" }
        );
    }

    fn on_request_blocked(&mut self, now_ms: f64, source: AgentId, key: SourceKey) {
        debug!("[{:>8.1}ms] agent {} blocked, bucket {}", now_ms, source.value(), key);
    }

    fn on_response_suppressed(&mut self, now_ms: f64, request: &Request) {
        debug!("[{:>8.1}ms] target {} too overloaded to answer request {}", now_ms, request.target_id.value(), request.id.value());
    }

    fn on_target_health_changed(&mut self, now_ms: f64, target: &TargetSnapshot) {
        debug!(
            "[{:>8.1}ms] target {} health {:.2} load {:.0}% ({:?})",
            now_ms,
            target.id.value(),
            target.health,
            target.load_percentage,
            target.band
        );
    }

    fn on_packet_modified(&mut self, now_ms: f64, request: &Request) {
        debug!("[{:>8.1}ms] packet {} tampered at the attacker", now_ms, request.id.value());
    }
}

#[derive(Default)]
pub struct ObserverSet {
    observers: Vec<Box<dyn SimObserver>>,
}

impl ObserverSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, observer: Box<dyn SimObserver>) {
        self.observers.push(observer);
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }

    pub fn notify(&mut self, mut f: impl FnMut(&mut dyn SimObserver)) {
        for observer in &mut self.observers {
            f(observer.as_mut());
        }
    }
}

impl std::fmt::Debug for ObserverSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObserverSet").field("observers", &self.observers.len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::Position;

    #[test]
    fn every_observer_sees_each_event() {
        let first = EventRecorder::new();
        let second = EventRecorder::new();
        let mut set = ObserverSet::new();
        set.add(Box::new(first.clone()));
        set.add(Box::new(TracingObserver));
        set.add(Box::new(second.clone()));
        assert_eq!(set.len(), 3);

        let key = SourceKey::from_position(&Position::new(5.0, 0.0, 0.0));
        set.notify(|o| o.on_request_blocked(120.0, AgentId::new(2), key));

        let expected = SimEvent::RequestBlocked { at_ms: 120.0, source: AgentId::new(2), key };
        assert_eq!(first.events(), vec![expected.clone()]);
        assert_eq!(second.drain(), vec![expected]);
        assert!(second.is_empty());
        assert_eq!(first.len(), 1);
    }
}
