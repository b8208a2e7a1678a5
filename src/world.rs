//! # World Tick
//!
//! Owns every family scheduler, the shared timer queue, live pickups and melee swing
//! state. The host drives it from a single thread: it calls [`World::advance`] with
//! the current time, and [`World::handle_event`] for each inbound request. Nothing
//! here blocks; every wait is a timer in the queue.

use std::collections::BTreeMap;

use glam::Vec3;
use log;

use crate::combat::{self, DamageOutcome};
use crate::config::{FamilyConfig, WorldConfig};
use crate::dropped_pickup::{self, PickupRegistry};
use crate::events::{EventSink, InboundEvent};
use crate::identity_key::{normalize, IdentityKey};
use crate::lifecycle::AcquisitionSource;
use crate::melee::{MeleeSwingValidator, SwingRecord};
use crate::respawn;
use crate::spawn_scheduler::{CycleOutcome, SpawnScheduler};
use crate::timers::{FamilyId, TimerQueue, TimerTask};

/// Everything a family operation may touch outside its own scheduler.
pub struct TickContext<'a> {
    pub now_ms: u64,
    pub source: &'a mut dyn AcquisitionSource,
    pub sink: &'a mut dyn EventSink,
    pub timers: &'a mut TimerQueue,
    pub pickups: &'a mut PickupRegistry,
}

/// Offsets per-family seeds so families built from one world seed do not share a
/// random sequence.
const FAMILY_SEED_STRIDE: u64 = 0x9E37_79B9_7F4A_7C15;

pub struct World {
    families: Vec<SpawnScheduler>,
    timers: TimerQueue,
    pickups: PickupRegistry,
    melee: BTreeMap<IdentityKey, MeleeSwingValidator>,
    swing_window_ms: u64,
    seed: u64,
    now_ms: u64,
    started: bool,
}

impl World {
    pub fn new(config: &WorldConfig, seed: u64) -> Self {
        let mut world = World {
            families: Vec::new(),
            timers: TimerQueue::new(),
            pickups: PickupRegistry::new(),
            melee: BTreeMap::new(),
            swing_window_ms: config.swing_window_ms,
            seed,
            now_ms: 0,
            started: false,
        };
        for family in &config.families {
            world.add_family(family.clone());
        }
        world
    }

    /// Registers a family. Families added after [`World::start`] are armed at once.
    pub fn add_family(&mut self, config: FamilyConfig) -> FamilyId {
        let id = FamilyId(self.families.len());
        let seed = self.seed.wrapping_add((id.0 as u64 + 1).wrapping_mul(FAMILY_SEED_STRIDE));
        let scheduler = SpawnScheduler::new(id, config, seed);
        log::info!("[World] Registered {} as {} (enabled: {}).", scheduler.label(), id, scheduler.is_enabled());
        if self.started && scheduler.is_enabled() {
            self.timers.schedule_at(self.now_ms, TimerTask::SpawnCycle { family: id });
        }
        self.families.push(scheduler);
        id
    }

    /// Arms the first spawn cycle of every enabled family at `now_ms`. Calling it
    /// again does nothing.
    pub fn start(&mut self, now_ms: u64) {
        if self.started {
            return;
        }
        self.started = true;
        self.now_ms = self.now_ms.max(now_ms);
        for family in self.families.iter().filter(|f| f.is_enabled()) {
            self.timers.schedule_at(self.now_ms, TimerTask::SpawnCycle { family: family.id() });
        }
        log::info!("[World] Started with {} families at {}ms.", self.families.len(), self.now_ms);
    }

    pub fn now_ms(&self) -> u64 {
        self.now_ms
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    pub fn families(&self) -> &[SpawnScheduler] {
        &self.families
    }

    pub fn family(&self, id: FamilyId) -> Option<&SpawnScheduler> {
        self.families.get(id.0)
    }

    pub fn family_mut(&mut self, id: FamilyId) -> Option<&mut SpawnScheduler> {
        self.families.get_mut(id.0)
    }

    pub fn family_by_label(&self, label: &str) -> Option<&SpawnScheduler> {
        self.families.iter().find(|f| f.label() == label)
    }

    pub fn timers(&self) -> &TimerQueue {
        &self.timers
    }

    pub fn pickups(&self) -> &PickupRegistry {
        &self.pickups
    }

    pub fn swing_validator(&self, owner: &IdentityKey) -> Option<&MeleeSwingValidator> {
        self.melee.get(owner)
    }

    /// Moves the clock forward to `now_ms` and runs every timer due by then, each at
    /// its own due time. Returns the number of timers fired.
    pub fn advance(&mut self, now_ms: u64, source: &mut dyn AcquisitionSource, sink: &mut dyn EventSink) -> usize {
        if now_ms > self.now_ms {
            self.now_ms = now_ms;
        }
        let mut fired = 0;
        while let Some((due_ms, task)) = self.timers.pop_due(self.now_ms) {
            fired += 1;
            self.run_task(due_ms, task, source, sink);
        }
        fired
    }

    fn run_task(&mut self, due_ms: u64, task: TimerTask, source: &mut dyn AcquisitionSource, sink: &mut dyn EventSink) {
        match task {
            TimerTask::SpawnCycle { family } => {
                let Some(scheduler) = self.families.get_mut(family.0) else {
                    return;
                };
                if !scheduler.is_enabled() {
                    return;
                }
                let mut ctx = TickContext {
                    now_ms: due_ms,
                    source,
                    sink,
                    timers: &mut self.timers,
                    pickups: &mut self.pickups,
                };
                let outcome = scheduler.run_cycle(&mut ctx);
                log::trace!("[SpawnCycle] {} cycle at {}ms: {:?}", scheduler.label(), due_ms, outcome);
                let rate_ms = scheduler.config().spawn_rate_ms;
                self.timers.schedule_in(due_ms, rate_ms, TimerTask::SpawnCycle { family });
            }
            TimerTask::RespawnAttempt { family } => {
                let Some(scheduler) = self.families.get_mut(family.0) else {
                    return;
                };
                let mut ctx = TickContext {
                    now_ms: due_ms,
                    source,
                    sink,
                    timers: &mut self.timers,
                    pickups: &mut self.pickups,
                };
                let outcome = scheduler.run_cycle(&mut ctx);
                log::debug!("[Respawn] {} respawn attempt: {:?}", scheduler.label(), outcome);
            }
            TimerTask::DeferredRelease { family, controller } => {
                if let Some(scheduler) = self.families.get_mut(family.0) {
                    respawn::finish_deferred_release(scheduler, controller, source);
                }
            }
            TimerTask::SwingExpiry { owner, swing_id } => {
                if let Some(validator) = self.melee.get_mut(&owner) {
                    validator.expire_swing(swing_id);
                    if !validator.has_active_swing() {
                        self.melee.remove(&owner);
                    }
                }
            }
            TimerTask::PickupDespawn { pickup_id } => {
                dropped_pickup::despawn_pickup(&mut self.pickups, sink, pickup_id);
            }
        }
    }

    /// Runs one spawn cycle for `family` right now, outside the regular schedule.
    pub fn run_spawn_cycle(
        &mut self,
        family: FamilyId,
        source: &mut dyn AcquisitionSource,
        sink: &mut dyn EventSink,
    ) -> Option<CycleOutcome> {
        let scheduler = self.families.get_mut(family.0)?;
        let mut ctx = TickContext {
            now_ms: self.now_ms,
            source,
            sink,
            timers: &mut self.timers,
            pickups: &mut self.pickups,
        };
        Some(scheduler.run_cycle(&mut ctx))
    }

    fn family_index_for(&self, key: &IdentityKey) -> Option<usize> {
        self.families.iter().position(|f| f.registry().contains(key))
    }

    /// Routes one inbound request. Malformed or unknown keys are dropped.
    pub fn handle_event(&mut self, event: InboundEvent, source: &mut dyn AcquisitionSource, sink: &mut dyn EventSink) {
        match event {
            InboundEvent::RequestDamage { target_key, amount, attacker_key } => {
                let Some(target) = normalize(&target_key) else {
                    log::debug!("[World] Damage request with unusable key {:?}.", target_key);
                    return;
                };
                let attacker = attacker_key.as_ref().and_then(normalize);
                self.apply_damage(&target, amount, attacker.as_ref(), source, sink);
            }
            InboundEvent::BeginMeleeSwing { weapon_key, owner_key, damage, reach, window_ms } => {
                match (normalize(&weapon_key), normalize(&owner_key)) {
                    (Some(weapon), Some(owner)) => {
                        self.begin_melee_swing(weapon, owner, damage, reach, window_ms);
                    }
                    _ => log::debug!("[World] Swing with unusable keys {:?}/{:?}.", weapon_key, owner_key),
                }
            }
            InboundEvent::MeleeHit { weapon_key, target_key } => {
                if let (Some(weapon), Some(target)) = (normalize(&weapon_key), normalize(&target_key)) {
                    self.report_melee_hit(&weapon, &target, source, sink);
                }
            }
            InboundEvent::RequestDestroy { target_key } => {
                if let Some(target) = normalize(&target_key) {
                    self.request_destroy(&target, source, sink);
                }
            }
            InboundEvent::HarvestHit { target_key, remaining_health, attacker_key } => {
                if let Some(target) = normalize(&target_key) {
                    let attacker = attacker_key.as_ref().and_then(normalize);
                    self.harvest_hit(&target, remaining_health, attacker.as_ref(), source, sink);
                }
            }
            InboundEvent::HarvestDepleted { target_key, position, attacker_key } => {
                if let Some(target) = normalize(&target_key) {
                    let attacker = attacker_key.as_ref().and_then(normalize);
                    self.harvest_depleted(&target, position, attacker.as_ref(), source, sink);
                }
            }
            InboundEvent::PlayerJoined { observer } => {
                self.sync_observer(&observer, sink);
            }
        }
    }

    /// Applies damage to whichever family owns `target`. Unknown keys are a no-op.
    pub fn apply_damage(
        &mut self,
        target: &IdentityKey,
        amount: f32,
        attacker: Option<&IdentityKey>,
        source: &mut dyn AcquisitionSource,
        sink: &mut dyn EventSink,
    ) -> DamageOutcome {
        let Some(index) = self.family_index_for(target) else {
            log::debug!("[World] No family owns key {}; damage dropped.", target);
            return DamageOutcome::Dropped;
        };
        let mut ctx = TickContext {
            now_ms: self.now_ms,
            source,
            sink,
            timers: &mut self.timers,
            pickups: &mut self.pickups,
        };
        combat::apply_damage(&mut self.families[index], target, amount, attacker, &mut ctx)
    }

    /// Records a swing for `owner` and arms its expiry. Returns the swing id.
    pub fn begin_melee_swing(
        &mut self,
        weapon: IdentityKey,
        owner: IdentityKey,
        damage: f32,
        reach: f32,
        window_ms: Option<u64>,
    ) -> u64 {
        let window_ms = window_ms.unwrap_or(self.swing_window_ms);
        let record = SwingRecord {
            weapon_key: weapon,
            owner_key: owner.clone(),
            damage,
            reach,
            timestamp_ms: self.now_ms,
            window_ms,
        };
        let swing_id = self.melee.entry(owner.clone()).or_default().begin_swing(record);
        self.timers.schedule_in(self.now_ms, window_ms, TimerTask::SwingExpiry { owner, swing_id });
        swing_id
    }

    /// Resolves a weapon overlap. The hit counts only if some owner's current swing
    /// used this weapon and is still inside its window; the damage comes from the
    /// swing, not from the report.
    ///
    /// When several owners have a live swing with the same weapon key, the most
    /// recent swing claims the hit; equal timestamps go to the greatest owner key.
    pub fn report_melee_hit(
        &mut self,
        weapon: &IdentityKey,
        target: &IdentityKey,
        source: &mut dyn AcquisitionSource,
        sink: &mut dyn EventSink,
    ) -> DamageOutcome {
        let now_ms = self.now_ms;
        let owner = self
            .melee
            .iter()
            .filter_map(|(owner, validator)| {
                let swing = validator.last_swing().filter(|_| validator.has_active_swing())?;
                (&swing.weapon_key == weapon).then_some((owner, swing.timestamp_ms))
            })
            .max_by_key(|(_, timestamp_ms)| *timestamp_ms)
            .map(|(owner, _)| owner.clone());
        let swing = owner.as_ref().and_then(|owner| {
            let swing = self.melee.get_mut(owner)?.try_validate_hit(weapon, now_ms)?;
            // A consumed swing leaves nothing worth keeping for this owner.
            self.melee.remove(owner);
            Some(swing)
        });
        match swing {
            Some(swing) => self.apply_damage(target, swing.damage, Some(&swing.owner_key), source, sink),
            None => {
                log::debug!("[Melee] Rejected hit from {} on {}: no matching swing.", weapon, target);
                DamageOutcome::Dropped
            }
        }
    }

    pub fn request_destroy(
        &mut self,
        target: &IdentityKey,
        source: &mut dyn AcquisitionSource,
        sink: &mut dyn EventSink,
    ) -> bool {
        let Some(index) = self.family_index_for(target) else {
            return false;
        };
        let mut ctx = TickContext {
            now_ms: self.now_ms,
            source,
            sink,
            timers: &mut self.timers,
            pickups: &mut self.pickups,
        };
        respawn::request_destroy(&mut self.families[index], target, &mut ctx)
    }

    pub fn harvest_hit(
        &mut self,
        target: &IdentityKey,
        remaining_health: f32,
        attacker: Option<&IdentityKey>,
        source: &mut dyn AcquisitionSource,
        sink: &mut dyn EventSink,
    ) -> DamageOutcome {
        let Some(index) = self.family_index_for(target) else {
            return DamageOutcome::Dropped;
        };
        let mut ctx = TickContext {
            now_ms: self.now_ms,
            source,
            sink,
            timers: &mut self.timers,
            pickups: &mut self.pickups,
        };
        combat::apply_harvest_hit(&mut self.families[index], target, remaining_health, attacker, &mut ctx)
    }

    /// A client saying a harvestable reached zero. Treated as a harvest hit that
    /// reports nothing left; the reported position is only used for logging.
    pub fn harvest_depleted(
        &mut self,
        target: &IdentityKey,
        position: Vec3,
        attacker: Option<&IdentityKey>,
        source: &mut dyn AcquisitionSource,
        sink: &mut dyn EventSink,
    ) -> DamageOutcome {
        log::debug!(
            "[Harvest] Client reports {} depleted at ({:.1}, {:.1}, {:.1}).",
            target, position.x, position.y, position.z
        );
        self.harvest_hit(target, 0.0, attacker, source, sink)
    }

    /// Sends current health of every live combat-bearing instance to a late joiner.
    pub fn sync_observer(&self, observer: &str, sink: &mut dyn EventSink) -> usize {
        let mut sent = 0;
        for family in &self.families {
            sent += combat::sync_observer(family, observer, &mut *sink);
        }
        log::info!("[World] Synced {} health states to {}.", sent, observer);
        sent
    }

    /// Disposes everything every family holds and despawns every loose pickup.
    pub fn shutdown(&mut self, source: &mut dyn AcquisitionSource, sink: &mut dyn EventSink) {
        for family in &mut self.families {
            family.shutdown(source);
        }
        let pickup_ids: Vec<u64> = self.pickups.iter().map(|pickup| pickup.id).collect();
        for pickup_id in pickup_ids {
            dropped_pickup::despawn_pickup(&mut self.pickups, &mut *sink, pickup_id);
        }
        self.timers = TimerQueue::new();
        self.melee.clear();
        self.started = false;
    }
}
