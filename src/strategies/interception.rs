// Man-in-the-middle path splicing. The attacker is not an entity of its own,
// a spliced request just gets an extra leg through its position.

use crate::network::{PacketKind, Position};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttackType {
    #[default]
    Passive,
    Active,
    SslStrip,
}

impl AttackType {
    pub fn mutates_payload(&self) -> bool {
        matches!(self, Self::Active)
    }
}

impl FromStr for AttackType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "passive" => Ok(Self::Passive),
            "active" => Ok(Self::Active),
            "sslstrip" | "ssl-strip" => Ok(Self::SslStrip),
            _ => anyhow::bail!("Unknown attack type: {} (passive, active, sslstrip)", s),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Interceptor {
    active: bool,
    attack_type: AttackType,
    encryption: bool,
    vpn: bool,
    attacker_position: Position,
    intercepted: u64,
    modified: u64,
}

impl Interceptor {
    pub fn new(attacker_position: Position) -> Self {
        Self {
            active: false,
            attack_type: AttackType::default(),
            encryption: false,
            vpn: false,
            attacker_position,
            intercepted: 0,
            modified: 0,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn set_active(&mut self, active: bool) {
        self.active = active;
    }

    pub fn attack_type(&self) -> AttackType {
        self.attack_type
    }

    pub fn set_attack_type(&mut self, attack_type: AttackType) {
        self.attack_type = attack_type;
    }

    pub fn encryption(&self) -> bool {
        self.encryption
    }

    pub fn set_encryption(&mut self, enabled: bool) {
        self.encryption = enabled;
    }

    pub fn vpn(&self) -> bool {
        self.vpn
    }

    pub fn set_vpn(&mut self, enabled: bool) {
        self.vpn = enabled;
    }

    pub fn attacker_position(&self) -> Position {
        self.attacker_position
    }

    pub fn would_splice(&self) -> bool {
        self.active && !self.vpn
    }

    pub fn splice(&mut self) -> Option<Position> {
        if self.would_splice() {
            self.intercepted += 1;
            Some(self.attacker_position)
        } else {
            None
        }
    }

    pub fn initial_kind(&self, spliced: bool) -> PacketKind {
        if spliced {
            PacketKind::Intercepted
        } else if self.encryption && !self.vpn {
            PacketKind::Encrypted
        } else {
            PacketKind::Normal
        }
    }

    /// Runs when a spliced packet reaches the attacker. Returns true if it was tampered with.
    pub fn on_hop_reached(&mut self, kind: &mut PacketKind) -> bool {
        if !self.attack_type.mutates_payload() {
            return false;
        }
        *kind = PacketKind::Malicious;
        self.modified += 1;
        true
    }

    pub fn intercepted(&self) -> u64 {
        self.intercepted
    }

    pub fn modified(&self) -> u64 {
        self.modified
    }

    pub fn reset(&mut self) {
        self.intercepted = 0;
        self.modified = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn interceptor() -> Interceptor {
        Interceptor::new(Position::new(0.0, 0.0, 3.0))
    }

    #[test]
    fn vpn_wins() {
        let mut i = interceptor();
        i.set_active(true);
        i.set_vpn(true);
        assert_eq!(i.splice(), None);
        assert_eq!(i.intercepted(), 0);
        assert_eq!(i.initial_kind(false), PacketKind::Normal);
    }

    #[test]
    fn encryption_only_changes_the_look() {
        let mut i = interceptor();
        i.set_encryption(true);
        assert_eq!(i.initial_kind(false), PacketKind::Encrypted);
        i.set_active(true);
        assert!(i.splice().is_some());
        assert_eq!(i.initial_kind(true), PacketKind::Intercepted);
        assert_eq!(i.intercepted(), 1);
    }

    #[test]
    fn only_active_attacks_mutate() {
        let mut i = interceptor();
        for attack in [AttackType::Passive, AttackType::SslStrip] {
            i.set_attack_type(attack);
            let mut kind = PacketKind::Intercepted;
            assert!(!i.on_hop_reached(&mut kind));
            assert_eq!(kind, PacketKind::Intercepted);
        }
        i.set_attack_type(AttackType::Active);
        let mut kind = PacketKind::Intercepted;
        assert!(i.on_hop_reached(&mut kind));
        assert_eq!(kind, PacketKind::Malicious);
        assert_eq!(i.modified(), 1);
    }

    #[test]
    fn parses_attack_types() {
        assert_eq!("SSLStrip".parse::<AttackType>().unwrap(), AttackType::SslStrip);
        assert!("replay".parse::<AttackType>().is_err());
    }
}
