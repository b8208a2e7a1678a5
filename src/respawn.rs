//! Depletion teardown and respawn requests.
//!
//! Observers hear about a depletion before any shared state changes; after that the
//! instance leaves the index and the active set, is released (now or after the
//! family's grace period), and a new spawn attempt is queued.

use log;

use crate::events::OutboundEvent;
use crate::family_policy::FamilyPolicy;
use crate::identity_key::IdentityKey;
use crate::lifecycle::{AcquisitionSource, ControllerId};
use crate::spawn_scheduler::SpawnScheduler;
use crate::timers::TimerTask;
use crate::world::TickContext;

/// Runs once per spawn, on the hit that took health to zero.
pub fn on_depleted(
    family: &mut SpawnScheduler,
    controller_id: ControllerId,
    attacker: Option<IdentityKey>,
    ctx: &mut TickContext,
) {
    let Some(controller) = family.active_by_id(controller_id) else {
        log::warn!("[Respawn] Depleted controller {} is not active in {}.", controller_id, family.label());
        return;
    };
    let Some(target_key) = controller.identity_key().cloned() else {
        return;
    };

    ctx.sink.broadcast(OutboundEvent::Depleted {
        target_key,
        attacker_key: attacker,
        family: family.label().to_string(),
        variant: controller.variant(),
        position: controller.spawn_position(),
    });
    family.stats_mut().depletions += 1;

    let grace_ms = family.policy().grace_period_ms();
    retire(family, controller_id, grace_ms, ctx);
    schedule_respawn(family, ctx);
}

/// Tears down the instance owning `key` without a depletion broadcast.
///
/// Families that track cooldowns put the location on cooldown. Families that
/// backfill run a spawn cycle straight away; the rest queue a normal respawn.
pub fn request_destroy(family: &mut SpawnScheduler, key: &IdentityKey, ctx: &mut TickContext) -> bool {
    let Some(controller) = family.resolve(key) else {
        log::debug!("[Respawn] Destroy request for unknown {} key {}.", family.label(), key);
        return false;
    };
    let controller_id = controller.id();
    let position = controller.spawn_position();

    retire(family, controller_id, 0, ctx);
    family.stats_mut().destroyed += 1;

    if family.policy().tracks_cooldowns() {
        if let (Some(position), Some(cooldown_ms)) = (position, family.config().location_cooldown_ms) {
            family.cooldowns_mut().start(position, ctx.now_ms, cooldown_ms);
        }
    }
    log::info!("[Respawn] Destroyed {} {}.", family.label(), key);

    if family.policy().backfills_on_destroy() {
        let outcome = family.run_cycle(ctx);
        log::debug!("[Respawn] Backfill for {}: {:?}", family.label(), outcome);
    } else {
        schedule_respawn(family, ctx);
    }
    true
}

/// Releases a controller whose grace period has run out.
pub fn finish_deferred_release(
    family: &mut SpawnScheduler,
    controller_id: ControllerId,
    source: &mut dyn AcquisitionSource,
) -> bool {
    match family.take_retiring(controller_id) {
        Some(mut controller) => {
            controller.dispose(source);
            log::debug!("[Respawn] Released {} controller {} after grace period.", family.label(), controller_id);
            true
        }
        None => false,
    }
}

fn retire(family: &mut SpawnScheduler, controller_id: ControllerId, grace_ms: u64, ctx: &mut TickContext) {
    let Some(roots) = family.active_by_id(controller_id).map(|c| c.roots().to_vec()) else {
        return;
    };
    for root in &roots {
        family.registry_mut().unindex_subtree(root);
    }
    let Some(mut controller) = family.take_active(controller_id) else {
        return;
    };

    if grace_ms > 0 {
        family.push_retiring(controller);
        ctx.timers.schedule_in(
            ctx.now_ms,
            grace_ms,
            TimerTask::DeferredRelease { family: family.id(), controller: controller_id },
        );
    } else {
        controller.dispose(&mut *ctx.source);
    }
}

fn schedule_respawn(family: &SpawnScheduler, ctx: &mut TickContext) {
    let delay_ms = family.config().spawn_rate_ms.max(family.policy().respawn_floor_ms());
    ctx.timers.schedule_in(ctx.now_ms, delay_ms, TimerTask::RespawnAttempt { family: family.id() });
    log::debug!("[Respawn] {} respawn attempt in {}ms.", family.label(), delay_ms);
}
