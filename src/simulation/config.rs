use crate::agent::TrafficPattern;
use crate::network::{NetworkConfig, Position};
use crate::strategies::AttackType;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LabKind {
    Ddos,
    Mitm,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Layout {
    pub users: Position,
    pub user_spread: f64,
    pub attackers: Position,
    pub attacker_spread: f64,
    pub targets: Position,
    pub interceptor: Position,
}

impl LabKind {
    pub fn layout(&self) -> Layout {
        match self {
            Self::Ddos => Layout {
                users: Position::new(-5.0, 0.0, 0.0),
                user_spread: 6.0,
                attackers: Position::new(5.0, 0.0, 0.0),
                attacker_spread: 1.5,
                targets: Position::new(0.0, 0.0, 0.0),
                interceptor: Position::new(0.0, 0.0, 2.0),
            },
            Self::Mitm => Layout {
                users: Position::new(-4.0, 0.0, 0.0),
                user_spread: 2.0,
                attackers: Position::new(0.0, 0.0, -2.0),
                attacker_spread: 1.5,
                targets: Position::new(4.0, 0.0, 0.0),
                interceptor: Position::new(0.0, 0.0, 2.0),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefenseConfig {
    pub rate_limit: bool,
    pub rate_limit_threshold: f64,
    pub load_balancing: bool,
}

impl Default for DefenseConfig {
    fn default() -> Self {
        Self {
            rate_limit: false,
            rate_limit_threshold: 10.0,
            load_balancing: false,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MitmConfig {
    pub active: bool,
    pub attack_type: AttackType,
    pub encryption: bool,
    pub vpn: bool,
    /// Users' fires go either way between user and server, picked by coin flip.
    #[serde(default)]
    pub bidirectional: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimConfig {
    pub name: String,
    pub lab: LabKind,
    pub seed: Option<u64>,
    pub duration: Duration,
    pub frame_ms: f64,
    pub num_targets: usize,
    pub target_capacity: u32,
    pub num_users: u32,
    pub num_attackers: u32,
    pub user_traffic: TrafficPattern,
    pub attack_traffic: TrafficPattern,
    /// Attack traffic switches itself on this long after start. `None` waits for a control call.
    pub attack_start_ms: Option<f64>,
    pub network: NetworkConfig,
    pub response_delay_ms: (f64, f64),
    pub defenses: DefenseConfig,
    pub mitm: MitmConfig,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            name: "ddos".to_string(),
            lab: LabKind::Ddos,
            seed: None,
            duration: Duration::from_secs(30),
            frame_ms: 16.0,
            num_targets: 1,
            target_capacity: 10,
            num_users: 2,
            num_attackers: 1,
            user_traffic: TrafficPattern::Jittered { min_ms: 1000.0, max_ms: 3000.0 },
            attack_traffic: TrafficPattern::Bursty { burst_size: 5, spacing_ms: 50.0, period_ms: 200.0 },
            attack_start_ms: Some(3000.0),
            network: NetworkConfig::default(),
            response_delay_ms: (500.0, 1500.0),
            defenses: DefenseConfig::default(),
            mitm: MitmConfig::default(),
        }
    }
}

impl SimConfig {
    pub fn mitm() -> Self {
        Self {
            name: "mitm".to_string(),
            lab: LabKind::Mitm,
            num_users: 1,
            num_attackers: 0,
            target_capacity: 100,
            user_traffic: TrafficPattern::Jittered { min_ms: 2000.0, max_ms: 5000.0 },
            attack_start_ms: None,
            network: NetworkConfig { speed: 3.0, ..NetworkConfig::default() },
            mitm: MitmConfig { bidirectional: true, ..MitmConfig::default() },
            ..Self::default()
        }
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("parsing config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let positive = |v: f64| v.is_finite() && v > 0.0;
        if !positive(self.frame_ms) {
            anyhow::bail!("frame_ms must be positive, got {}", self.frame_ms);
        }
        if !positive(self.network.speed) || !positive(self.network.arrival_epsilon) {
            anyhow::bail!("network speed and arrival epsilon must be positive");
        }
        if self.target_capacity == 0 {
            anyhow::bail!("target capacity must be at least 1");
        }
        let (min, max) = self.response_delay_ms;
        if min < 0.0 || max < min {
            anyhow::bail!("invalid response delay range {}..{}", min, max);
        }
        if !positive(self.defenses.rate_limit_threshold) {
            anyhow::bail!("rate limit threshold must be a positive rate");
        }
        self.user_traffic.validate().context("user traffic")?;
        self.attack_traffic.validate().context("attack traffic")?;
        Ok(())
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    pub fn with_targets(mut self, count: usize, capacity: u32) -> Self {
        self.num_targets = count.max(1);
        self.target_capacity = capacity;
        self
    }

    pub fn with_rate_limit(mut self, threshold: f64) -> Self {
        self.defenses.rate_limit = true;
        self.defenses.rate_limit_threshold = threshold;
        self
    }

    pub fn with_load_balancing(mut self) -> Self {
        self.defenses.load_balancing = true;
        self
    }

    pub fn with_interception(mut self, attack_type: AttackType) -> Self {
        self.mitm.active = true;
        self.mitm.attack_type = attack_type;
        self
    }

    pub fn with_vpn(mut self) -> Self {
        self.mitm.vpn = true;
        self
    }

    pub fn with_encryption(mut self) -> Self {
        self.mitm.encryption = true;
        self
    }
}
