#![allow(dead_code)]

use std::collections::HashSet;

use glam::Vec3;
use spawn_arbiter::config::{FamilyConfig, FamilyKind, WorldConfig, DEFAULT_SWING_WINDOW_MS};
use spawn_arbiter::lifecycle::{AcquisitionSource, EntityNode, InitData, ResourceHandle};
use spawn_arbiter::SpawnError;

/// Scripted backend: every step can be told to fail, and every call is counted.
#[derive(Debug, Default)]
pub struct FakeSource {
    pub fail_load: bool,
    pub fail_instantiate: bool,
    pub fail_init: bool,
    pub fail_destroy: bool,
    pub hitboxes: u32,
    pub loads: u32,
    pub unloads: u32,
    pub instantiated: u32,
    pub destroyed: u32,
    pub live: HashSet<i64>,
    next_handle: u64,
    next_entity: i64,
}

impl FakeSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_hitboxes(hitboxes: u32) -> Self {
        FakeSource { hitboxes, ..Self::default() }
    }

    fn entity(&mut self) -> i64 {
        self.next_entity += 1;
        self.next_entity
    }
}

impl AcquisitionSource for FakeSource {
    fn load(&mut self, asset: &str) -> Result<ResourceHandle, SpawnError> {
        if self.fail_load {
            return Err(SpawnError::Load { asset: asset.to_string(), reason: "scripted".to_string() });
        }
        self.loads += 1;
        self.next_handle += 1;
        Ok(ResourceHandle(self.next_handle))
    }

    fn instantiate(&mut self, _handle: ResourceHandle, _position: Vec3) -> Result<Vec<EntityNode>, SpawnError> {
        if self.fail_instantiate {
            return Err(SpawnError::Instantiate { asset: "fake".to_string(), reason: "scripted".to_string() });
        }
        self.instantiated += 1;
        let root = self.entity();
        let children = (0..self.hitboxes).map(|_| EntityNode::leaf(self.entity())).collect();
        self.live.insert(root);
        Ok(vec![EntityNode::with_children(root, children)])
    }

    fn apply_init(&mut self, _root: &EntityNode, _init: &InitData) -> Result<(), SpawnError> {
        if self.fail_init {
            return Err(SpawnError::ApplyInit { asset: "fake".to_string(), reason: "scripted".to_string() });
        }
        Ok(())
    }

    fn destroy_instance(&mut self, roots: &[EntityNode]) -> Result<(), SpawnError> {
        self.destroyed += 1;
        if self.fail_destroy {
            return Err(SpawnError::Unload { asset: "fake".to_string(), reason: "scripted".to_string() });
        }
        for root in roots {
            if let Some(id) = root.key().and_then(|key| key.as_str().parse::<i64>().ok()) {
                self.live.remove(&id);
            }
        }
        Ok(())
    }

    fn unload(&mut self, _handle: ResourceHandle) -> Result<(), SpawnError> {
        self.unloads += 1;
        Ok(())
    }
}

/// A family built from the kind's template with deterministic spawning.
pub fn family(kind: FamilyKind, points: Vec<Vec3>, max_active: u32, health: f32) -> FamilyConfig {
    let mut config = FamilyConfig::template(kind).with_spawn_points(points);
    config.max_active = max_active;
    config.spawn_chance = 1.0;
    config.spawn_rate_ms = 1_000;
    config.rare_chance = None;
    config.rare = None;
    config.common.health = health;
    config
}

pub fn line_of_points(count: usize, spacing: f32) -> Vec<Vec3> {
    (0..count).map(|i| Vec3::new(i as f32 * spacing, 0.0, 0.0)).collect()
}

pub fn world_config(families: Vec<FamilyConfig>) -> WorldConfig {
    WorldConfig { families, prefabs: Default::default(), swing_window_ms: DEFAULT_SWING_WINDOW_MS }
}
