use super::config::SimConfig;
use crate::strategies::AttackType;
use std::collections::HashMap;

type Factory = Box<dyn Fn() -> SimConfig + Send + Sync>;

pub struct ScenarioRegistry {
    scenarios: HashMap<String, Factory>,
}

impl ScenarioRegistry {
    pub fn new() -> Self {
        let mut registry = Self {
            scenarios: HashMap::new(),
        };
        registry.register_builtin();
        registry
    }

    fn register_builtin(&mut self) {
        self.register("ddos", SimConfig::default);
        self.register("ddos-defended", || {
            SimConfig::default()
                .with_name("ddos-defended")
                .with_targets(3, 10)
                .with_rate_limit(5.0)
                .with_load_balancing()
        });
        self.register("ddos-scaled", || SimConfig {
            num_attackers: 3,
            ..SimConfig::default()
                .with_name("ddos-scaled")
                .with_targets(4, 10)
                .with_load_balancing()
        });
        self.register("mitm-passive", || {
            SimConfig::mitm().with_name("mitm-passive").with_interception(AttackType::Passive)
        });
        self.register("mitm-active", || {
            SimConfig::mitm().with_name("mitm-active").with_interception(AttackType::Active)
        });
        self.register("mitm-sslstrip", || {
            SimConfig::mitm()
                .with_name("mitm-sslstrip")
                .with_encryption()
                .with_interception(AttackType::SslStrip)
        });
        self.register("mitm-vpn", || {
            SimConfig::mitm()
                .with_name("mitm-vpn")
                .with_encryption()
                .with_interception(AttackType::Active)
                .with_vpn()
        });
    }

    pub fn register<F>(&mut self, name: &str, factory: F)
    where
        F: Fn() -> SimConfig + Send + Sync + 'static,
    {
        self.scenarios.insert(name.to_lowercase(), Box::new(factory));
    }

    pub fn create(&self, name: &str) -> Option<SimConfig> {
        self.scenarios.get(&name.to_lowercase()).map(|factory| factory())
    }

    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.scenarios.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn global() -> &'static ScenarioRegistry {
        use std::sync::OnceLock;
        static REGISTRY: OnceLock<ScenarioRegistry> = OnceLock::new();
        REGISTRY.get_or_init(ScenarioRegistry::new)
    }
}

impl Default for ScenarioRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::LabKind;

    #[test]
    fn builtin_presets_are_valid() {
        let registry = ScenarioRegistry::global();
        assert_eq!(registry.list().len(), 7);
        for name in registry.list() {
            let config = registry.create(&name).unwrap();
            config.validate().unwrap();
            assert_eq!(config.name, name);
        }
    }

    #[test]
    fn lookup_ignores_case() {
        let config = ScenarioRegistry::global().create("MITM-VPN").unwrap();
        assert_eq!(config.lab, LabKind::Mitm);
        assert!(config.mitm.vpn && config.mitm.active);
        assert!(ScenarioRegistry::global().create("slowloris").is_none());
    }

    #[test]
    fn custom_scenarios_can_be_registered() {
        let mut registry = ScenarioRegistry::new();
        registry.register("Quiet", || SimConfig { num_attackers: 0, ..SimConfig::default() });
        assert_eq!(registry.create("quiet").unwrap().num_attackers, 0);
    }
}
