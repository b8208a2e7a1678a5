//! In-process [`AcquisitionSource`] backed by the prefab shapes in the world config.
//!
//! Used by the module host, where there is no external asset system: a prefab is a
//! root entity plus one child per hitbox, and entity ids are handed out sequentially.

use std::collections::{BTreeMap, HashMap};

use glam::Vec3;
use log;

use crate::config::PrefabShape;
use crate::errors::SpawnError;
use crate::lifecycle::{AcquisitionSource, EntityNode, InitData, ResourceHandle};

#[derive(Debug)]
pub struct PrefabSource {
    prefabs: BTreeMap<String, PrefabShape>,
    loaded: HashMap<ResourceHandle, String>,
    live_roots: HashMap<i64, Vec3>,
    next_handle: u64,
    next_entity_id: i64,
}

impl PrefabSource {
    pub fn new(prefabs: BTreeMap<String, PrefabShape>) -> Self {
        PrefabSource {
            prefabs,
            loaded: HashMap::new(),
            live_roots: HashMap::new(),
            next_handle: 1,
            next_entity_id: 1,
        }
    }

    pub fn loaded_count(&self) -> usize {
        self.loaded.len()
    }

    pub fn live_count(&self) -> usize {
        self.live_roots.len()
    }

    fn next_entity(&mut self) -> i64 {
        let id = self.next_entity_id;
        self.next_entity_id += 1;
        id
    }
}

impl AcquisitionSource for PrefabSource {
    fn load(&mut self, asset: &str) -> Result<ResourceHandle, SpawnError> {
        if !self.prefabs.contains_key(asset) {
            return Err(SpawnError::Load { asset: asset.to_string(), reason: "unknown prefab".to_string() });
        }
        let handle = ResourceHandle(self.next_handle);
        self.next_handle += 1;
        self.loaded.insert(handle, asset.to_string());
        Ok(handle)
    }

    fn instantiate(&mut self, handle: ResourceHandle, position: Vec3) -> Result<Vec<EntityNode>, SpawnError> {
        let asset = self.loaded.get(&handle).cloned().ok_or_else(|| SpawnError::Instantiate {
            asset: format!("{:?}", handle),
            reason: "handle not loaded".to_string(),
        })?;
        let hitboxes = self.prefabs.get(&asset).map(|shape| shape.hitboxes).unwrap_or(0);

        let root_id = self.next_entity();
        let children = (0..hitboxes).map(|_| EntityNode::leaf(self.next_entity())).collect();
        self.live_roots.insert(root_id, position);
        log::trace!("[PrefabSource] Instantiated '{}' as entity {} with {} hitboxes.", asset, root_id, hitboxes);
        Ok(vec![EntityNode::with_children(root_id, children)])
    }

    fn apply_init(&mut self, root: &EntityNode, init: &InitData) -> Result<(), SpawnError> {
        if !(init.scale > 0.0) {
            return Err(SpawnError::ApplyInit {
                asset: format!("{:?}", root.id),
                reason: format!("invalid scale {}", init.scale),
            });
        }
        Ok(())
    }

    fn destroy_instance(&mut self, roots: &[EntityNode]) -> Result<(), SpawnError> {
        for root in roots {
            if let Some(id) = root.key().and_then(|key| key.as_str().parse::<i64>().ok()) {
                self.live_roots.remove(&id);
            }
        }
        Ok(())
    }

    fn unload(&mut self, handle: ResourceHandle) -> Result<(), SpawnError> {
        match self.loaded.remove(&handle) {
            Some(_) => Ok(()),
            None => Err(SpawnError::Unload { asset: format!("{:?}", handle), reason: "not loaded".to_string() }),
        }
    }
}
