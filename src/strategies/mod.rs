pub mod rate_limit;
pub mod load_balance;
pub mod interception;

pub use interception::{AttackType, Interceptor};
pub use load_balance::LoadBalancer;
pub use rate_limit::{RateLimiter, SourceKey};

use crate::network::Position;
use crate::server::{SharedTarget, TargetPool};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Accept,
    Drop,
}

#[derive(Debug, Clone)]
pub struct Route {
    pub target: SharedTarget,
    pub via: Option<Position>,
}

#[derive(Debug, Clone)]
pub struct PolicySet {
    pub rate_limiter: RateLimiter,
    pub load_balancer: LoadBalancer,
    pub interceptor: Interceptor,
}

impl PolicySet {
    pub fn new(rate_limiter: RateLimiter, load_balancer: LoadBalancer, interceptor: Interceptor) -> Self {
        Self {
            rate_limiter,
            load_balancer,
            interceptor,
        }
    }

    /// Rate limiting runs first, so a blocked request never reaches the balancer
    /// or the interceptor counters.
    pub fn resolve(&mut self, key: SourceKey, now_ms: f64, pool: &TargetPool) -> Option<Route> {
        if self.rate_limiter.admit(key, now_ms) == Action::Drop {
            return None;
        }
        let target = self.load_balancer.route(pool);
        let via = self.interceptor.splice();
        Some(Route { target, via })
    }

    pub fn enabled_defenses(&self) -> Vec<&'static str> {
        let mut names = Vec::new();
        if self.rate_limiter.is_enabled() {
            names.push("rate-limit");
        }
        if self.load_balancer.is_enabled() {
            names.push("load-balance");
        }
        if self.interceptor.encryption() {
            names.push("https");
        }
        if self.interceptor.vpn() {
            names.push("vpn");
        }
        names
    }

    pub fn reset(&mut self) {
        self.rate_limiter.reset();
        self.load_balancer.reset();
        self.interceptor.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocked_requests_skip_routing() {
        let pool = TargetPool::new(2, 10);
        let mut interceptor = Interceptor::new(Position::new(1.0, 0.0, 0.0));
        interceptor.set_active(true);
        let mut policies = PolicySet::new(
            RateLimiter::new(1.0).with_enabled(true),
            LoadBalancer::new(true),
            interceptor,
        );
        let key = SourceKey::from_position(&Position::new(-5.0, 0.0, 0.0));

        assert!(policies.resolve(key, 0.0, &pool).is_some());
        assert!(policies.resolve(key, 10.0, &pool).is_none());

        assert_eq!(policies.rate_limiter.blocked(), 1);
        assert_eq!(policies.load_balancer.balanced(), 1);
        assert_eq!(policies.interceptor.intercepted(), 1);
        assert_eq!(policies.enabled_defenses(), vec!["rate-limit", "load-balance"]);
    }
}
