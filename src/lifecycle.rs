// Request/response lifecycle. Owns every in-flight entity from emission to arrival.

use crate::agent::Agent;
use crate::network::{Direction, NetworkConfig, Position, Request, RequestId, RequestState, Response, ResponseId, ResponseKind, Transit};
use crate::observer::ObserverSet;
use crate::server::{SharedTarget, TargetId, TargetPool};
use crate::strategies::PolicySet;
use rand::Rng;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Emission {
    Created(RequestId),
    Blocked,
}

#[derive(Debug, Clone)]
struct PendingResponse {
    due_ms: f64,
    request: RequestId,
    target: TargetId,
    from: Position,
    to: Position,
    kind: ResponseKind,
}

#[derive(Debug)]
pub struct Lifecycle {
    network: NetworkConfig,
    response_delay_ms: (f64, f64),
    requests: Vec<Request>,
    responses: Vec<Response>,
    pending: Vec<PendingResponse>,
    next_request_id: u64,
    next_response_id: u64,
}

impl Lifecycle {
    pub fn new(network: NetworkConfig, response_delay_ms: (f64, f64)) -> Self {
        Self {
            network,
            response_delay_ms,
            requests: Vec::new(),
            responses: Vec::new(),
            pending: Vec::new(),
            next_request_id: 0,
            next_response_id: 0,
        }
    }

    pub fn requests(&self) -> &[Request] {
        &self.requests
    }

    pub fn responses(&self) -> &[Response] {
        &self.responses
    }

    pub fn pending_responses(&self) -> usize {
        self.pending.len()
    }

    pub fn in_flight(&self) -> usize {
        self.requests.len() + self.responses.len()
    }

    pub fn request(&self, id: RequestId) -> Option<&Request> {
        self.requests.iter().find(|r| r.id == id)
    }

    pub fn next_response_due(&self) -> Option<f64> {
        self.pending.iter().map(|p| p.due_ms).min_by(f64::total_cmp)
    }

    /// Rate limiting first, then routing and splicing, then the target is charged.
    pub fn emit(
        &mut self,
        source: &Agent,
        is_attack: bool,
        now_ms: f64,
        policies: &mut PolicySet,
        pool: &TargetPool,
        observers: &mut ObserverSet,
    ) -> Emission {
        let key = source.source_key();
        let Some(route) = policies.resolve(key, now_ms, pool) else {
            observers.notify(|o| o.on_request_blocked(now_ms, source.id(), key));
            return Emission::Blocked;
        };

        let (target_id, final_destination, report, target_snapshot) = {
            let mut target = route.target.lock();
            let report = target.apply_load(is_attack, now_ms);
            (target.id(), target.position(), report, target.snapshot(now_ms))
        };

        let id = RequestId::new(self.next_request_id);
        self.next_request_id += 1;

        let spliced = route.via.is_some();
        let first_hop = route.via.unwrap_or(final_destination);
        let request = Request {
            id,
            source: source.id(),
            origin: source.position(),
            is_attack,
            target_id,
            target: route.target,
            created_at_ms: now_ms,
            transit: Transit::new(source.position(), first_hop, self.network.speed),
            via: route.via,
            final_destination,
            kind: policies.interceptor.initial_kind(spliced),
            state: RequestState::InFlight { leg: 1 },
            direction: Direction::ToTarget,
        };

        let emission = self.launch(request, now_ms, observers);
        if report.health_changed() {
            observers.notify(|o| o.on_target_health_changed(now_ms, &target_snapshot));
        }
        emission
    }

    /// Sends a packet from `target` back to `peer`. It goes through the
    /// interceptor like any other packet but skips the rate limiter and the
    /// target's load window.
    pub fn emit_downstream(
        &mut self,
        peer: &Agent,
        target: SharedTarget,
        now_ms: f64,
        policies: &mut PolicySet,
        observers: &mut ObserverSet,
    ) -> Emission {
        let (target_id, from) = {
            let target = target.lock();
            (target.id(), target.position())
        };

        let id = RequestId::new(self.next_request_id);
        self.next_request_id += 1;

        let via = policies.interceptor.splice();
        let request = Request {
            id,
            source: peer.id(),
            origin: from,
            is_attack: false,
            target_id,
            target,
            created_at_ms: now_ms,
            transit: Transit::new(from, via.unwrap_or(peer.position()), self.network.speed),
            via,
            final_destination: peer.position(),
            kind: policies.interceptor.initial_kind(via.is_some()),
            state: RequestState::InFlight { leg: 1 },
            direction: Direction::FromTarget,
        };
        self.launch(request, now_ms, observers)
    }

    fn launch(&mut self, request: Request, now_ms: f64, observers: &mut ObserverSet) -> Emission {
        observers.notify(|o| o.on_request_created(now_ms, &request));
        if request.via.is_some() {
            observers.notify(|o| o.on_packet_intercepted(now_ms, &request));
        }
        let id = request.id;
        self.requests.push(request);
        Emission::Created(id)
    }

    /// Moves everything in flight by one frame. `now_ms` is the clock at the end of the frame.
    pub fn advance<R: Rng + ?Sized>(
        &mut self,
        dt_secs: f64,
        now_ms: f64,
        policies: &mut PolicySet,
        observers: &mut ObserverSet,
        rng: &mut R,
    ) {
        let epsilon = self.network.arrival_epsilon;

        let requests = std::mem::take(&mut self.requests);
        for mut request in requests {
            if !request.transit.advance(dt_secs, epsilon) {
                self.requests.push(request);
                continue;
            }

            if request.via.take().is_some() {
                request.transit.retarget(request.final_destination);
                request.state = RequestState::InFlight { leg: 2 };
                if policies.interceptor.on_hop_reached(&mut request.kind) {
                    observers.notify(|o| o.on_packet_modified(now_ms, &request));
                }
                self.requests.push(request);
                continue;
            }

            request.state = RequestState::Delivered;
            observers.notify(|o| o.on_request_delivered(now_ms, &request));
            if request.direction == Direction::ToTarget {
                self.complete(&request, now_ms, observers, rng);
            }
        }

        self.responses.retain_mut(|response| !response.transit.advance(dt_secs, epsilon));
    }

    // Schedules the answer, unless the captured target is too far gone to send one.
    fn complete<R: Rng + ?Sized>(&mut self, request: &Request, now_ms: f64, observers: &mut ObserverSet, rng: &mut R) {
        let (health, can_respond, from) = {
            let target = request.target.lock();
            (target.health(), target.can_respond(), target.position())
        };

        if !can_respond {
            observers.notify(|o| o.on_response_suppressed(now_ms, request));
            return;
        }

        let (min, max) = self.response_delay_ms;
        let delay = if max > min { rng.gen_range(min..max) } else { min };
        self.pending.push(PendingResponse {
            due_ms: now_ms + delay,
            request: request.id,
            target: request.target_id,
            from,
            to: request.origin,
            kind: ResponseKind::from_outcome(request.is_attack, health),
        });
    }

    pub fn release_due(&mut self, now_ms: f64, observers: &mut ObserverSet) {
        let (due, waiting): (Vec<_>, Vec<_>) = std::mem::take(&mut self.pending)
            .into_iter()
            .partition(|p| p.due_ms <= now_ms);
        self.pending = waiting;

        for pending in due {
            let response = Response {
                id: ResponseId::new(self.next_response_id),
                origin_target: pending.target,
                request: pending.request,
                destination: pending.to,
                kind: pending.kind,
                created_at_ms: pending.due_ms,
                transit: Transit::new(pending.from, pending.to, self.network.speed),
            };
            self.next_response_id += 1;
            observers.notify(|o| o.on_response_created(now_ms, &response));
            self.responses.push(response);
        }
    }

    pub fn clear(&mut self) {
        self.requests.clear();
        self.responses.clear();
        self.pending.clear();
    }
}
