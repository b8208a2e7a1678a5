//! Per-family behaviour knobs for the shared spawn engine.
//!
//! Monsters, trees and items all run through the same scheduler; only the choices
//! below differ between them.

use crate::config::{
    FamilyKind, ITEM_OCCUPANCY_RADIUS, ITEM_RESPAWN_FLOOR_MS, MONSTER_OCCUPANCY_RADIUS,
    MONSTER_RELEASE_GRACE_MS, MONSTER_RESPAWN_FLOOR_MS, TREE_OCCUPANCY_RADIUS, TREE_RELEASE_GRACE_MS,
    TREE_RESPAWN_FLOOR_MS,
};

pub trait FamilyPolicy {
    fn occupancy_radius(&self) -> f32;

    /// Place on a random candidate when every candidate is occupied.
    fn falls_back_when_occupied(&self) -> bool {
        false
    }

    /// Keep a cooldown on locations whose instance was just removed.
    fn tracks_cooldowns(&self) -> bool {
        false
    }

    /// Has health observers care about: initial broadcast, late-join sync, damage.
    fn is_combat_bearing(&self) -> bool;

    /// Accepts client-reported harvest hits.
    fn is_harvestable(&self) -> bool {
        false
    }

    /// How long a depleted instance stays in the world before it is released.
    fn grace_period_ms(&self) -> u64 {
        0
    }

    fn respawn_floor_ms(&self) -> u64;

    /// Ask for a spawn right after a destroy request to refill capacity.
    fn backfills_on_destroy(&self) -> bool {
        false
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct MonsterPolicy;

impl FamilyPolicy for MonsterPolicy {
    fn occupancy_radius(&self) -> f32 {
        MONSTER_OCCUPANCY_RADIUS
    }

    fn is_combat_bearing(&self) -> bool {
        true
    }

    fn grace_period_ms(&self) -> u64 {
        MONSTER_RELEASE_GRACE_MS
    }

    fn respawn_floor_ms(&self) -> u64 {
        MONSTER_RESPAWN_FLOOR_MS
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct TreePolicy;

impl FamilyPolicy for TreePolicy {
    fn occupancy_radius(&self) -> f32 {
        TREE_OCCUPANCY_RADIUS
    }

    // Regrowth should keep happening even when the grove is crowded.
    fn falls_back_when_occupied(&self) -> bool {
        true
    }

    fn is_combat_bearing(&self) -> bool {
        true
    }

    fn is_harvestable(&self) -> bool {
        true
    }

    fn grace_period_ms(&self) -> u64 {
        TREE_RELEASE_GRACE_MS
    }

    fn respawn_floor_ms(&self) -> u64 {
        TREE_RESPAWN_FLOOR_MS
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct ItemPolicy;

impl FamilyPolicy for ItemPolicy {
    fn occupancy_radius(&self) -> f32 {
        ITEM_OCCUPANCY_RADIUS
    }

    fn tracks_cooldowns(&self) -> bool {
        true
    }

    fn is_combat_bearing(&self) -> bool {
        false
    }

    fn respawn_floor_ms(&self) -> u64 {
        ITEM_RESPAWN_FLOOR_MS
    }

    fn backfills_on_destroy(&self) -> bool {
        true
    }
}

#[derive(Clone, Copy, Debug)]
pub enum FamilyPolicyEnum {
    Monster(MonsterPolicy),
    Tree(TreePolicy),
    Item(ItemPolicy),
}

impl FamilyKind {
    pub fn get_policy(&self) -> FamilyPolicyEnum {
        match self {
            FamilyKind::Monster => FamilyPolicyEnum::Monster(MonsterPolicy),
            FamilyKind::Tree => FamilyPolicyEnum::Tree(TreePolicy),
            FamilyKind::Item => FamilyPolicyEnum::Item(ItemPolicy),
        }
    }
}

macro_rules! delegate_policy {
    ($self:ident, $method:ident) => {
        match $self {
            FamilyPolicyEnum::Monster(p) => p.$method(),
            FamilyPolicyEnum::Tree(p) => p.$method(),
            FamilyPolicyEnum::Item(p) => p.$method(),
        }
    };
}

impl FamilyPolicy for FamilyPolicyEnum {
    fn occupancy_radius(&self) -> f32 {
        delegate_policy!(self, occupancy_radius)
    }

    fn falls_back_when_occupied(&self) -> bool {
        delegate_policy!(self, falls_back_when_occupied)
    }

    fn tracks_cooldowns(&self) -> bool {
        delegate_policy!(self, tracks_cooldowns)
    }

    fn is_combat_bearing(&self) -> bool {
        delegate_policy!(self, is_combat_bearing)
    }

    fn is_harvestable(&self) -> bool {
        delegate_policy!(self, is_harvestable)
    }

    fn grace_period_ms(&self) -> u64 {
        delegate_policy!(self, grace_period_ms)
    }

    fn respawn_floor_ms(&self) -> u64 {
        delegate_policy!(self, respawn_floor_ms)
    }

    fn backfills_on_destroy(&self) -> bool {
        delegate_policy!(self, backfills_on_destroy)
    }
}
