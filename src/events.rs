//! Inbound requests and outbound broadcasts.
//!
//! Payload shapes are the contract; transport is up to the host. Every family listens
//! on the same inbound channel and filters by key, so an unknown key is routine.

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::identity_key::{IdentityKey, RawId};
use crate::lifecycle::Variant;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum InboundEvent {
    RequestDamage {
        target_key: RawId,
        amount: f32,
        #[serde(default)]
        attacker_key: Option<RawId>,
    },
    BeginMeleeSwing {
        weapon_key: RawId,
        owner_key: RawId,
        damage: f32,
        reach: f32,
        #[serde(default)]
        window_ms: Option<u64>,
    },
    /// Weapon hitbox overlapped a target during a swing.
    MeleeHit {
        weapon_key: RawId,
        target_key: RawId,
    },
    RequestDestroy {
        target_key: RawId,
    },
    HarvestHit {
        target_key: RawId,
        remaining_health: f32,
        #[serde(default)]
        attacker_key: Option<RawId>,
    },
    HarvestDepleted {
        target_key: RawId,
        position: Vec3,
        #[serde(default)]
        attacker_key: Option<RawId>,
    },
    PlayerJoined {
        observer: String,
    },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum OutboundEvent {
    HealthUpdated {
        target_key: IdentityKey,
        current_health: f32,
        max_health: f32,
    },
    Depleted {
        target_key: IdentityKey,
        attacker_key: Option<IdentityKey>,
        family: String,
        variant: Variant,
        position: Option<Vec3>,
    },
    PickupSpawned {
        pickup_id: u64,
        item: String,
        quantity: u32,
        position: Vec3,
    },
    PickupDespawned {
        pickup_id: u64,
    },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Recipient {
    All,
    Observer(String),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub recipient: Recipient,
    pub event: OutboundEvent,
}

pub trait EventSink {
    fn broadcast(&mut self, event: OutboundEvent);

    fn send_to(&mut self, observer: &str, event: OutboundEvent);
}

/// Buffers everything it is given. The module host drains it into tables after each
/// reducer; tests inspect it directly.
#[derive(Debug, Default)]
pub struct RecordingSink {
    pub sent: Vec<Envelope>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn drain(&mut self) -> Vec<Envelope> {
        std::mem::take(&mut self.sent)
    }

    pub fn health_updates(&self) -> Vec<(IdentityKey, f32, f32)> {
        self.sent
            .iter()
            .filter_map(|envelope| match &envelope.event {
                OutboundEvent::HealthUpdated { target_key, current_health, max_health } => {
                    Some((target_key.clone(), *current_health, *max_health))
                }
                _ => None,
            })
            .collect()
    }

    pub fn depletions(&self) -> Vec<&OutboundEvent> {
        self.sent
            .iter()
            .map(|envelope| &envelope.event)
            .filter(|event| matches!(event, OutboundEvent::Depleted { .. }))
            .collect()
    }

    pub fn addressed_to(&self, observer: &str) -> Vec<&OutboundEvent> {
        self.sent
            .iter()
            .filter(|envelope| envelope.recipient == Recipient::Observer(observer.to_string()))
            .map(|envelope| &envelope.event)
            .collect()
    }
}

impl EventSink for RecordingSink {
    fn broadcast(&mut self, event: OutboundEvent) {
        self.sent.push(Envelope { recipient: Recipient::All, event });
    }

    fn send_to(&mut self, observer: &str, event: OutboundEvent) {
        self.sent.push(Envelope { recipient: Recipient::Observer(observer.to_string()), event });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inbound_damage_accepts_numeric_or_string_keys() {
        let a: InboundEvent =
            serde_json::from_str(r#"{"type":"RequestDamage","target_key":42,"amount":10.0}"#).unwrap();
        let b: InboundEvent = serde_json::from_str(
            r#"{"type":"RequestDamage","target_key":"42","amount":10.0,"attacker_key":"p1"}"#,
        )
        .unwrap();
        match (a, b) {
            (
                InboundEvent::RequestDamage { target_key: ka, attacker_key: None, .. },
                InboundEvent::RequestDamage { target_key: kb, attacker_key: Some(_), .. },
            ) => {
                assert_eq!(crate::identity_key::normalize(&ka), crate::identity_key::normalize(&kb));
            }
            other => panic!("unexpected parse: {:?}", other),
        }
    }

    #[test]
    fn recording_sink_separates_recipients() {
        let mut sink = RecordingSink::new();
        let update = OutboundEvent::HealthUpdated {
            target_key: IdentityKey::from(1i64),
            current_health: 5.0,
            max_health: 10.0,
        };
        sink.broadcast(update.clone());
        sink.send_to("late-joiner", update);
        assert_eq!(sink.health_updates().len(), 2);
        assert_eq!(sink.addressed_to("late-joiner").len(), 1);
        assert_eq!(sink.drain().len(), 2);
        assert!(sink.sent.is_empty());
    }
}
