//! # Dropped Pickups
//!
//! Loose items dropped into the world when a harvestable is depleted. Each pickup is
//! announced when it appears and despawns on its own timer.

use std::collections::BTreeMap;

use glam::Vec3;
use log;
use rand::Rng;
use serde::Serialize;

use crate::events::{EventSink, OutboundEvent};
use crate::timers::TimerTask;
use crate::world::TickContext;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DroppedPickup {
    pub id: u64,
    pub item: String,
    pub quantity: u32,
    pub position: Vec3,
    pub created_at_ms: u64,
}

#[derive(Debug, Default)]
pub struct PickupRegistry {
    next_id: u64,
    live: BTreeMap<u64, DroppedPickup>,
}

impl PickupRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, pickup_id: u64) -> Option<&DroppedPickup> {
        self.live.get(&pickup_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &DroppedPickup> {
        self.live.values()
    }

    pub fn len(&self) -> usize {
        self.live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    fn insert(&mut self, item: &str, quantity: u32, position: Vec3, now_ms: u64) -> u64 {
        self.next_id += 1;
        let id = self.next_id;
        self.live.insert(id, DroppedPickup { id, item: item.to_string(), quantity, position, created_at_ms: now_ms });
        id
    }

    fn remove(&mut self, pickup_id: u64) -> Option<DroppedPickup> {
        self.live.remove(&pickup_id)
    }
}

/// Random offset in the ground plane, within `radius` of the origin.
pub fn scatter_offset(rng: &mut impl Rng, radius: f32) -> Vec3 {
    if radius <= 0.0 {
        return Vec3::ZERO;
    }
    let angle = rng.gen_range(0.0..std::f32::consts::TAU);
    let distance = rng.gen_range(0.0..=radius);
    Vec3::new(angle.cos() * distance, 0.0, angle.sin() * distance)
}

/// Creates a pickup, broadcasts it and arms its despawn timer. Returns its id.
pub fn spawn_pickup(ctx: &mut TickContext, item: &str, quantity: u32, position: Vec3, despawn_after_ms: u64) -> u64 {
    let pickup_id = ctx.pickups.insert(item, quantity, position, ctx.now_ms);
    ctx.sink.broadcast(OutboundEvent::PickupSpawned {
        pickup_id,
        item: item.to_string(),
        quantity,
        position,
    });
    ctx.timers.schedule_in(ctx.now_ms, despawn_after_ms, TimerTask::PickupDespawn { pickup_id });
    log::info!(
        "[CreatePickup] Created pickup {} ({} x{}) at ({:.1}, {:.1}, {:.1})",
        pickup_id, item, quantity, position.x, position.y, position.z
    );
    pickup_id
}

/// Removes an expired pickup. Returns false if it was already gone.
pub fn despawn_pickup(pickups: &mut PickupRegistry, sink: &mut dyn EventSink, pickup_id: u64) -> bool {
    match pickups.remove(pickup_id) {
        Some(pickup) => {
            sink.broadcast(OutboundEvent::PickupDespawned { pickup_id });
            log::info!("[DespawnCheck] Despawned pickup {} ({} x{}).", pickup_id, pickup.item, pickup.quantity);
            true
        }
        None => {
            log::debug!("[DespawnCheck] Pickup {} already gone.", pickup_id);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn scatter_stays_within_radius_on_the_ground() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        for _ in 0..200 {
            let offset = scatter_offset(&mut rng, 1.5);
            assert_eq!(offset.y, 0.0);
            assert!(offset.length() <= 1.5 + 1e-4);
        }
        assert_eq!(scatter_offset(&mut rng, 0.0), Vec3::ZERO);
    }

    #[test]
    fn despawning_twice_only_announces_once() {
        let mut pickups = PickupRegistry::new();
        let id = pickups.insert("Wood", 1, Vec3::ZERO, 0);
        let mut sink = crate::events::RecordingSink::new();
        assert!(despawn_pickup(&mut pickups, &mut sink, id));
        assert!(!despawn_pickup(&mut pickups, &mut sink, id));
        assert_eq!(sink.sent.len(), 1);
        assert!(pickups.is_empty());
    }
}
