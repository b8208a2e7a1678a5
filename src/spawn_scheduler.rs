//! # Spawn Scheduler
//!
//! One scheduler per object family. Each cycle it cleans up its index, checks
//! capacity, rolls the spawn chance, picks a location, rolls the variant and drives a
//! fresh [`LifecycleController`] through acquisition.
//!
//! The scheduler owns everything about its family: the active controllers, the ones
//! waiting out their release grace period, the identity index, location cooldowns and
//! its RNG. Nothing is shared between families.

use glam::Vec3;
use log;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::Serialize;

use crate::config::FamilyConfig;
use crate::events::OutboundEvent;
use crate::family_policy::{FamilyPolicy, FamilyPolicyEnum};
use crate::identity_key::IdentityKey;
use crate::lifecycle::{AcquisitionSource, ControllerId, InitData, LifecycleController, Variant};
use crate::location::{CooldownMap, LocationSelector};
use crate::registry::IndexRegistry;
use crate::timers::FamilyId;
use crate::world::TickContext;

/// Counters kept per family for logging and inspection.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct FamilyStats {
    pub cycles: u64,
    pub spawned: u64,
    pub acquisition_failures: u64,
    pub skipped_capacity: u64,
    pub skipped_chance: u64,
    pub skipped_location: u64,
    pub depletions: u64,
    pub destroyed: u64,
    pub registry_pruned: u64,
    pub dead_controllers_dropped: u64,
}

#[derive(Clone, Debug, PartialEq)]
pub enum CycleOutcome {
    Disabled,
    AtCapacity,
    ChanceFailed,
    NoLocation,
    AcquireFailed,
    Spawned(IdentityKey),
}

pub struct SpawnScheduler {
    id: FamilyId,
    config: FamilyConfig,
    policy: FamilyPolicyEnum,
    selector: LocationSelector,
    registry: IndexRegistry,
    active: Vec<LifecycleController>,
    retiring: Vec<LifecycleController>,
    cooldowns: CooldownMap,
    rng: ChaCha8Rng,
    next_controller_id: ControllerId,
    enabled: bool,
    stats: FamilyStats,
}

impl SpawnScheduler {
    /// Builds the scheduler for one family. An invalid config yields a disabled
    /// scheduler whose cycles do nothing.
    pub fn new(id: FamilyId, config: FamilyConfig, seed: u64) -> Self {
        let policy = config.kind.get_policy();
        let radius = config.occupancy_radius.unwrap_or_else(|| policy.occupancy_radius());
        let selector = LocationSelector::new(radius, policy.falls_back_when_occupied());

        let enabled = match config.validate() {
            Ok(()) => true,
            Err(e) => {
                log::error!("[SpawnCycle] {} disabled: {}", config.label, e);
                false
            }
        };

        SpawnScheduler {
            id,
            config,
            policy,
            selector,
            registry: IndexRegistry::new(),
            active: Vec::new(),
            retiring: Vec::new(),
            cooldowns: CooldownMap::new(),
            rng: ChaCha8Rng::seed_from_u64(seed),
            next_controller_id: 1,
            enabled,
            stats: FamilyStats::default(),
        }
    }

    pub fn id(&self) -> FamilyId {
        self.id
    }

    pub fn label(&self) -> &str {
        &self.config.label
    }

    pub fn config(&self) -> &FamilyConfig {
        &self.config
    }

    pub fn policy(&self) -> &FamilyPolicyEnum {
        &self.policy
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn stats(&self) -> &FamilyStats {
        &self.stats
    }

    pub fn registry(&self) -> &IndexRegistry {
        &self.registry
    }

    pub fn active(&self) -> &[LifecycleController] {
        &self.active
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    pub fn retiring_count(&self) -> usize {
        self.retiring.len()
    }

    pub fn resolve(&self, key: &IdentityKey) -> Option<&LifecycleController> {
        let id = self.registry.resolve(key)?;
        self.active.iter().find(|c| c.id() == id)
    }

    /// Mutable access by key. Changing a controller's state from outside the
    /// scheduler skips the unindex step; the next cycle's reconcile cleans that up.
    pub fn controller_mut(&mut self, key: &IdentityKey) -> Option<&mut LifecycleController> {
        let id = self.registry.resolve(key)?;
        self.active.iter_mut().find(|c| c.id() == id)
    }

    pub(crate) fn active_by_id(&self, id: ControllerId) -> Option<&LifecycleController> {
        self.active.iter().find(|c| c.id() == id)
    }

    pub(crate) fn take_active(&mut self, id: ControllerId) -> Option<LifecycleController> {
        let index = self.active.iter().position(|c| c.id() == id)?;
        Some(self.active.remove(index))
    }

    pub(crate) fn push_retiring(&mut self, controller: LifecycleController) {
        self.retiring.push(controller);
    }

    pub(crate) fn take_retiring(&mut self, id: ControllerId) -> Option<LifecycleController> {
        let index = self.retiring.iter().position(|c| c.id() == id)?;
        Some(self.retiring.remove(index))
    }

    pub(crate) fn registry_mut(&mut self) -> &mut IndexRegistry {
        &mut self.registry
    }

    pub(crate) fn cooldowns_mut(&mut self) -> &mut CooldownMap {
        &mut self.cooldowns
    }

    pub(crate) fn rng_mut(&mut self) -> &mut ChaCha8Rng {
        &mut self.rng
    }

    pub(crate) fn stats_mut(&mut self) -> &mut FamilyStats {
        &mut self.stats
    }

    /// Drops controllers that left `Spawned` behind our back and prunes index entries
    /// that no longer point at a live controller.
    pub fn cleanup(&mut self, source: &mut dyn AcquisitionSource) {
        let mut dead = Vec::new();
        self.active.retain_mut(|controller| {
            if controller.is_spawned() {
                true
            } else {
                dead.push(controller.id());
                controller.dispose(&mut *source);
                false
            }
        });
        if !dead.is_empty() {
            log::warn!("[SpawnCycle] {}: dropped {} controller(s) no longer spawned: {:?}", self.config.label, dead.len(), dead);
            self.stats.dead_controllers_dropped += dead.len() as u64;
        }

        let pruned = self.registry.reconcile(self.active.iter());
        self.stats.registry_pruned += pruned.len() as u64;
    }

    /// Runs one spawn attempt. Never fails: every problem is logged and reported as
    /// "no spawn this cycle".
    pub fn run_cycle(&mut self, ctx: &mut TickContext) -> CycleOutcome {
        if !self.enabled {
            return CycleOutcome::Disabled;
        }
        self.stats.cycles += 1;
        self.cleanup(&mut *ctx.source);

        if self.active.len() >= self.config.max_active as usize {
            self.stats.skipped_capacity += 1;
            log::debug!("[SpawnCycle] {} at capacity ({}/{}).", self.config.label, self.active.len(), self.config.max_active);
            return CycleOutcome::AtCapacity;
        }

        let roll: f32 = self.rng.gen();
        if !(self.config.spawn_chance > 0.0 && roll <= self.config.spawn_chance) {
            self.stats.skipped_chance += 1;
            log::debug!("[SpawnCycle] {} chance roll failed ({:.3} > {:.3}).", self.config.label, roll, self.config.spawn_chance);
            return CycleOutcome::ChanceFailed;
        }

        let occupied: Vec<Vec3> = self.active.iter().filter_map(|c| c.spawn_position()).collect();
        let cooldowns = if self.policy.tracks_cooldowns() { Some(&mut self.cooldowns) } else { None };
        let position = match self.selector.pick(&self.config.spawn_points, &occupied, cooldowns, ctx.now_ms, &mut self.rng) {
            Some(position) => position,
            None => {
                self.stats.skipped_location += 1;
                log::debug!("[SpawnCycle] {} found no free location.", self.config.label);
                return CycleOutcome::NoLocation;
            }
        };

        let (asset, init) = self.roll_variant();
        let mut controller = LifecycleController::new(self.next_controller_id, asset);
        self.next_controller_id += 1;

        if let Err(e) = controller.acquire(&mut *ctx.source, position, &init) {
            controller.dispose(&mut *ctx.source);
            self.stats.acquisition_failures += 1;
            log::warn!("[SpawnCycle] {} spawn failed this cycle: {}", self.config.label, e);
            return CycleOutcome::AcquireFailed;
        }

        let key = match controller.identity_key().cloned() {
            Some(key) => key,
            None => {
                controller.dispose(&mut *ctx.source);
                self.stats.acquisition_failures += 1;
                return CycleOutcome::AcquireFailed;
            }
        };

        for root in controller.roots() {
            self.registry.index_subtree(root, controller.id());
        }

        if self.policy.is_combat_bearing() {
            ctx.sink.broadcast(OutboundEvent::HealthUpdated {
                target_key: key.clone(),
                current_health: controller.current_health(),
                max_health: controller.max_health(),
            });
        }

        log::info!(
            "[SpawnCycle] Spawned {} {:?} {} at ({:.1}, {:.1}, {:.1}) [active: {}/{}]",
            self.config.label, controller.variant(), key, position.x, position.y, position.z,
            self.active.len() + 1, self.config.max_active
        );
        self.active.push(controller);
        self.stats.spawned += 1;
        CycleOutcome::Spawned(key)
    }

    fn roll_variant(&mut self) -> (String, InitData) {
        let asset = self.config.asset.clone().unwrap_or_default();
        if let (Some(chance), Some(rare)) = (self.config.rare_chance, &self.config.rare) {
            let roll: f32 = self.rng.gen();
            if roll < chance {
                let asset = self.config.rare_asset.clone().unwrap_or(asset);
                return (asset, InitData { scale: rare.scale, max_health: rare.health, variant: Variant::Rare });
            }
        }
        let common = &self.config.common;
        (asset, InitData { scale: common.scale, max_health: common.health, variant: Variant::Common })
    }

    /// Disposes every controller this family still holds, active or retiring.
    pub fn shutdown(&mut self, source: &mut dyn AcquisitionSource) {
        for mut controller in self.active.drain(..).chain(self.retiring.drain(..)) {
            controller.dispose(source);
        }
        self.registry = IndexRegistry::new();
        log::info!("[SpawnCycle] {} shut down.", self.config.label);
    }
}
