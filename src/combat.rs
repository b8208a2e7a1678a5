//! # Combat Arbitration
//!
//! Health is server-authoritative. Clients only ever ask: a damage request names a
//! target key and an amount, a harvest hit reports what the client thinks is left.
//! Requests against unknown keys, non-combat families or already depleted targets
//! are dropped quietly.

use glam::Vec3;
use log;
use rand::Rng;

use crate::config::LootTable;
use crate::dropped_pickup::{scatter_offset, spawn_pickup};
use crate::events::{EventSink, OutboundEvent};
use crate::family_policy::FamilyPolicy;
use crate::identity_key::IdentityKey;
use crate::respawn;
use crate::spawn_scheduler::SpawnScheduler;
use crate::world::TickContext;

#[derive(Clone, Debug, PartialEq)]
pub enum DamageOutcome {
    /// Nothing changed and nothing was broadcast.
    Dropped,
    Applied { current_health: f32, max_health: f32 },
    /// This request took the target to zero. Happens at most once per spawn.
    Depleted { target_key: IdentityKey },
}

/// Applies `amount` to the controller owning `key` and broadcasts the result.
///
/// `key` may be any entity of the spawned subtree; the broadcast always carries the
/// controller's canonical key.
pub fn apply_damage(
    family: &mut SpawnScheduler,
    key: &IdentityKey,
    amount: f32,
    attacker: Option<&IdentityKey>,
    ctx: &mut TickContext,
) -> DamageOutcome {
    if !family.policy().is_combat_bearing() {
        log::debug!("[Combat] {} is not combat-bearing; ignoring damage for {}.", family.label(), key);
        return DamageOutcome::Dropped;
    }

    let Some(controller) = family.controller_mut(key) else {
        log::debug!("[Combat] No live {} for key {}.", family.label(), key);
        return DamageOutcome::Dropped;
    };
    let Some(change) = controller.take_damage(amount) else {
        log::debug!("[Combat] {} already depleted or not spawned; ignoring hit.", key);
        return DamageOutcome::Dropped;
    };
    let canonical = controller.identity_key().cloned().unwrap_or_else(|| key.clone());
    let controller_id = controller.id();

    ctx.sink.broadcast(OutboundEvent::HealthUpdated {
        target_key: canonical.clone(),
        current_health: change.current,
        max_health: change.max,
    });
    log::debug!(
        "[Combat] {} {} took {:.1} damage ({:.1} -> {:.1}/{:.1}).",
        family.label(), canonical, change.previous - change.current, change.previous, change.current, change.max
    );

    if change.depleted {
        log::info!("[Combat] {} {} depleted by {:?}.", family.label(), canonical, attacker.map(IdentityKey::as_str));
        respawn::on_depleted(family, controller_id, attacker.cloned(), ctx);
        DamageOutcome::Depleted { target_key: canonical }
    } else {
        DamageOutcome::Applied { current_health: change.current, max_health: change.max }
    }
}

/// Turns a client-reported remaining health into a server-side delta.
///
/// A report can only lower health. Reports at or above the current value change
/// nothing. On depletion the family's loot table is rolled and pickups are dropped
/// around the spawn position.
pub fn apply_harvest_hit(
    family: &mut SpawnScheduler,
    key: &IdentityKey,
    remaining_health: f32,
    attacker: Option<&IdentityKey>,
    ctx: &mut TickContext,
) -> DamageOutcome {
    if !family.policy().is_harvestable() {
        log::debug!("[Harvest] {} is not harvestable; ignoring report for {}.", family.label(), key);
        return DamageOutcome::Dropped;
    }
    let Some(controller) = family.resolve(key) else {
        log::debug!("[Harvest] No live {} for key {}.", family.label(), key);
        return DamageOutcome::Dropped;
    };

    let current = controller.current_health();
    let reported = if remaining_health.is_nan() {
        current
    } else {
        remaining_health.clamp(0.0, controller.max_health())
    };
    if reported >= current {
        log::debug!("[Harvest] Report {:.1} for {} does not lower health {:.1}; ignored.", remaining_health, key, current);
        return DamageOutcome::Dropped;
    }
    let origin = controller.spawn_position();

    let outcome = apply_damage(family, key, current - reported, attacker, ctx);
    if matches!(outcome, DamageOutcome::Depleted { .. }) {
        if let (Some(loot), Some(origin)) = (family.config().loot.clone(), origin) {
            drop_loot(family, &loot, origin, ctx);
        }
    }
    outcome
}

/// Rolls how many pickups a depletion yields: one gate on `drop_chance`, then a
/// uniform count in `min_drops..=max_drops`.
pub fn roll_loot(table: &LootTable, rng: &mut impl Rng) -> u32 {
    if table.max_drops == 0 || rng.gen::<f32>() >= table.drop_chance {
        return 0;
    }
    rng.gen_range(table.min_drops..=table.max_drops)
}

fn drop_loot(family: &mut SpawnScheduler, loot: &LootTable, origin: Vec3, ctx: &mut TickContext) {
    let count = roll_loot(loot, family.rng_mut());
    for _ in 0..count {
        let offset = scatter_offset(family.rng_mut(), loot.scatter_radius);
        spawn_pickup(ctx, &loot.item, 1, origin + offset, loot.despawn_after_ms);
    }
    if count > 0 {
        log::info!("[Harvest] {} dropped {} x {}.", family.label(), count, loot.item);
    }
}

/// Sends the current health of every live combat-bearing instance to one observer.
/// Returns the number of updates sent.
pub fn sync_observer(family: &SpawnScheduler, observer: &str, sink: &mut dyn EventSink) -> usize {
    if !family.policy().is_combat_bearing() {
        return 0;
    }
    let mut sent = 0;
    for controller in family.active().iter().filter(|c| c.is_spawned()) {
        if let Some(key) = controller.identity_key() {
            sink.send_to(
                observer,
                OutboundEvent::HealthUpdated {
                    target_key: key.clone(),
                    current_health: controller.current_health(),
                    max_health: controller.max_health(),
                },
            );
            sent += 1;
        }
    }
    sent
}
