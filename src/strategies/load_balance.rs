use crate::server::{SharedTarget, TargetPool};

#[derive(Debug, Clone, Default)]
pub struct LoadBalancer {
    enabled: bool,
    current_index: usize,
    balanced: u64,
}

impl LoadBalancer {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            ..Self::default()
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn balanced(&self) -> u64 {
        self.balanced
    }

    pub fn route(&mut self, pool: &TargetPool) -> SharedTarget {
        if !self.enabled || pool.len() <= 1 {
            return pool.primary().clone();
        }

        // The pool may have shrunk since the last call
        let index = self.current_index % pool.len();
        self.current_index = (index + 1) % pool.len();
        self.balanced += 1;

        match pool.get(index) {
            Some(target) => target.clone(),
            None => pool.primary().clone(),
        }
    }

    pub fn reset(&mut self) {
        self.current_index = 0;
        self.balanced = 0;
    }
}
