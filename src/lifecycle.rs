//! # Lifecycle Controller
//!
//! Wraps one spawnable instance through `Unloaded -> Loading -> Spawned -> Unloading`.
//! The controller owns the spawned entity subtree and the server-only combat fields
//! (health, variant, spawn position). Clients only ever see the identity key.
//!
//! All state changes go through [`LifecycleController::transition`], so the acquire
//! and release paths can be driven and tested without a real asset backend: the
//! backend is an [`AcquisitionSource`], and tests hand in a fake one.

use glam::Vec3;
use log;
use serde::{Deserialize, Serialize};

use crate::errors::SpawnError;
use crate::identity_key::{normalize, IdentityKey, RawId};

pub type ControllerId = u64;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LifecycleState {
    Unloaded,
    Loading,
    Spawned,
    Unloading,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LifecycleEvent {
    BeginLoad,
    Loaded,
    Instantiated,
    Failed,
    BeginRelease,
    Released,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Variant {
    Common,
    Rare,
}

/// Opaque handle to a loaded prefab, owned by the [`AcquisitionSource`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ResourceHandle(pub u64);

/// One spawned entity and its descendants (hitboxes, weapon mounts, ...).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EntityNode {
    pub id: RawId,
    #[serde(default)]
    pub children: Vec<EntityNode>,
}

impl EntityNode {
    pub fn leaf(id: impl Into<RawId>) -> Self {
        EntityNode { id: id.into(), children: Vec::new() }
    }

    pub fn with_children(id: impl Into<RawId>, children: Vec<EntityNode>) -> Self {
        EntityNode { id: id.into(), children }
    }

    pub fn key(&self) -> Option<IdentityKey> {
        normalize(&self.id)
    }
}

/// Stats applied to the root right after instantiation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InitData {
    pub scale: f32,
    pub max_health: f32,
    pub variant: Variant,
}

/// Backend that turns an asset reference into live entities.
///
/// `load`, `instantiate` and `destroy_instance` are the suspension points of the
/// acquisition; any of them may fail.
pub trait AcquisitionSource {
    fn load(&mut self, asset: &str) -> Result<ResourceHandle, SpawnError>;

    fn instantiate(
        &mut self,
        handle: ResourceHandle,
        position: Vec3,
    ) -> Result<Vec<EntityNode>, SpawnError>;

    fn apply_init(&mut self, root: &EntityNode, init: &InitData) -> Result<(), SpawnError>;

    fn destroy_instance(&mut self, roots: &[EntityNode]) -> Result<(), SpawnError>;

    fn unload(&mut self, handle: ResourceHandle) -> Result<(), SpawnError>;
}

/// Result of applying damage to a spawned controller.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct HealthChange {
    pub previous: f32,
    pub current: f32,
    pub max: f32,
    /// True only on the hit that took health from above zero to zero.
    pub depleted: bool,
}

#[derive(Debug)]
pub struct LifecycleController {
    id: ControllerId,
    asset: String,
    state: LifecycleState,
    roots: Vec<EntityNode>,
    spawn_position: Option<Vec3>,
    identity_key: Option<IdentityKey>,
    handle: Option<ResourceHandle>,
    max_health: f32,
    current_health: f32,
    variant: Variant,
    scale: f32,
}

impl LifecycleController {
    pub fn new(id: ControllerId, asset: impl Into<String>) -> Self {
        LifecycleController {
            id,
            asset: asset.into(),
            state: LifecycleState::Unloaded,
            roots: Vec::new(),
            spawn_position: None,
            identity_key: None,
            handle: None,
            max_health: 0.0,
            current_health: 0.0,
            variant: Variant::Common,
            scale: 1.0,
        }
    }

    pub fn id(&self) -> ControllerId {
        self.id
    }

    pub fn asset(&self) -> &str {
        &self.asset
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn is_spawned(&self) -> bool {
        self.state == LifecycleState::Spawned
    }

    pub fn roots(&self) -> &[EntityNode] {
        &self.roots
    }

    /// The canonical root, first of the spawned roots.
    pub fn root(&self) -> Option<&EntityNode> {
        self.roots.first()
    }

    pub fn spawn_position(&self) -> Option<Vec3> {
        self.spawn_position
    }

    pub fn identity_key(&self) -> Option<&IdentityKey> {
        self.identity_key.as_ref()
    }

    pub fn max_health(&self) -> f32 {
        self.max_health
    }

    pub fn current_health(&self) -> f32 {
        self.current_health
    }

    pub fn variant(&self) -> Variant {
        self.variant
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    /// Applies one lifecycle event. Invalid pairs leave the state untouched.
    pub fn transition(&mut self, event: LifecycleEvent) -> Result<LifecycleState, SpawnError> {
        use LifecycleEvent as E;
        use LifecycleState as S;

        let next = match (self.state, event) {
            (S::Unloaded, E::BeginLoad) => S::Loading,
            (S::Loading, E::Loaded) => S::Loading,
            (S::Loading, E::Instantiated) => S::Spawned,
            (S::Loading, E::Failed) => S::Unloaded,
            (S::Spawned, E::BeginRelease) => S::Unloading,
            (S::Unloading, E::Released) => S::Unloaded,
            (S::Unloading, E::Failed) => S::Unloaded,
            (from, event) => return Err(SpawnError::InvalidTransition { from, event }),
        };
        log::trace!("[Lifecycle] Controller {} {:?} --{:?}--> {:?}", self.id, self.state, event, next);
        self.state = next;
        Ok(next)
    }

    /// Loads, instantiates and initialises the instance at `position`.
    ///
    /// Returns `Ok(false)` without doing anything when the controller is already
    /// `Loading` or `Spawned`. On failure every partially acquired resource is
    /// released, the controller is back in `Unloaded`, and the error is returned.
    pub fn acquire(
        &mut self,
        source: &mut dyn AcquisitionSource,
        position: Vec3,
        init: &InitData,
    ) -> Result<bool, SpawnError> {
        if matches!(self.state, LifecycleState::Loading | LifecycleState::Spawned) {
            log::debug!("[Lifecycle] Controller {} already {:?}; ignoring acquire.", self.id, self.state);
            return Ok(false);
        }
        self.transition(LifecycleEvent::BeginLoad)?;

        let handle = match source.load(&self.asset) {
            Ok(handle) => handle,
            Err(e) => return Err(self.abort_acquire(source, Vec::new(), e)),
        };
        self.handle = Some(handle);
        self.transition(LifecycleEvent::Loaded)?;

        let roots = match source.instantiate(handle, position) {
            Ok(roots) => roots,
            Err(e) => return Err(self.abort_acquire(source, Vec::new(), e)),
        };

        let root_key = roots.first().and_then(EntityNode::key);
        let key = match root_key {
            Some(key) => key,
            None => {
                let e = SpawnError::RootUnresolved { asset: self.asset.clone() };
                return Err(self.abort_acquire(source, roots, e));
            }
        };

        if let Err(e) = source.apply_init(&roots[0], init) {
            return Err(self.abort_acquire(source, roots, e));
        }

        self.roots = roots;
        self.spawn_position = Some(position);
        self.identity_key = Some(key);
        self.max_health = init.max_health.max(0.0);
        self.current_health = self.max_health;
        self.variant = init.variant;
        self.scale = init.scale;
        self.transition(LifecycleEvent::Instantiated)?;
        Ok(true)
    }

    fn abort_acquire(
        &mut self,
        source: &mut dyn AcquisitionSource,
        partial_roots: Vec<EntityNode>,
        error: SpawnError,
    ) -> SpawnError {
        log::warn!("[Lifecycle] Acquisition of '{}' (controller {}) failed: {}", self.asset, self.id, error);
        if !partial_roots.is_empty() {
            if let Err(e) = source.destroy_instance(&partial_roots) {
                log::error!("[Lifecycle] Failed to destroy partial instance of '{}': {}", self.asset, e);
            }
        }
        if let Some(handle) = self.handle.take() {
            if let Err(e) = source.unload(handle) {
                log::error!("[Lifecycle] Failed to unload '{}' after aborted acquire: {}", self.asset, e);
            }
        }
        if let Err(e) = self.transition(LifecycleEvent::Failed) {
            log::error!("[Lifecycle] {}", e);
        }
        self.clear_instance_fields();
        error
    }

    /// Destroys the spawned instance. A no-op unless the controller is `Spawned`.
    ///
    /// The controller ends in `Unloaded` even when the backend fails; the error is
    /// still reported so callers can log it.
    pub fn release(&mut self, source: &mut dyn AcquisitionSource) -> Result<bool, SpawnError> {
        if self.state != LifecycleState::Spawned {
            return Ok(false);
        }
        self.transition(LifecycleEvent::BeginRelease)?;
        let result = source.destroy_instance(&self.roots);
        self.clear_instance_fields();
        match result {
            Ok(()) => {
                self.transition(LifecycleEvent::Released)?;
                Ok(true)
            }
            Err(e) => {
                self.transition(LifecycleEvent::Failed)?;
                Err(e)
            }
        }
    }

    /// Tears everything down from any state and never fails.
    pub fn dispose(&mut self, source: &mut dyn AcquisitionSource) {
        match self.state {
            LifecycleState::Spawned => {
                if let Err(e) = self.release(source) {
                    log::error!("[Lifecycle] Release during dispose of controller {} failed: {}", self.id, e);
                }
            }
            LifecycleState::Loading => {
                // Abandoned mid-acquisition; whatever completes later is not ours anymore.
                log::warn!("[Lifecycle] Disposing controller {} while still loading '{}'.", self.id, self.asset);
                let _ = self.transition(LifecycleEvent::Failed);
                self.clear_instance_fields();
            }
            LifecycleState::Unloading => {
                let _ = self.transition(LifecycleEvent::Failed);
                self.clear_instance_fields();
            }
            LifecycleState::Unloaded => {}
        }

        if let Some(handle) = self.handle.take() {
            if let Err(e) = source.unload(handle) {
                log::error!("[Lifecycle] Failed to unload '{}' during dispose: {}", self.asset, e);
            }
        }
    }

    /// Subtracts `amount` from current health, clamped at zero. Negative or
    /// non-finite amounts count as zero.
    ///
    /// Returns `None` when the controller is not a live target (not spawned or
    /// already at zero), which callers treat as a dropped request.
    pub fn take_damage(&mut self, amount: f32) -> Option<HealthChange> {
        if self.state != LifecycleState::Spawned || self.current_health <= 0.0 {
            return None;
        }
        let amount = if amount.is_finite() { amount.max(0.0) } else { 0.0 };
        let previous = self.current_health;
        self.current_health = (previous - amount).max(0.0);
        Some(HealthChange {
            previous,
            current: self.current_health,
            max: self.max_health,
            depleted: previous > 0.0 && self.current_health <= 0.0,
        })
    }

    fn clear_instance_fields(&mut self) {
        self.roots.clear();
        self.spawn_position = None;
        self.identity_key = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct StepSource {
        fail_load: bool,
        fail_instantiate: bool,
        fail_init: bool,
        fail_destroy: bool,
        unresolvable_root: bool,
        loads: u32,
        unloads: u32,
        destroyed: u32,
    }

    impl AcquisitionSource for StepSource {
        fn load(&mut self, asset: &str) -> Result<ResourceHandle, SpawnError> {
            if self.fail_load {
                return Err(SpawnError::Load { asset: asset.into(), reason: "missing".into() });
            }
            self.loads += 1;
            Ok(ResourceHandle(self.loads as u64))
        }

        fn instantiate(&mut self, _: ResourceHandle, _: Vec3) -> Result<Vec<EntityNode>, SpawnError> {
            if self.fail_instantiate {
                return Err(SpawnError::Instantiate { asset: "a".into(), reason: "boom".into() });
            }
            if self.unresolvable_root {
                return Ok(vec![EntityNode::leaf(RawId::Unknown)]);
            }
            Ok(vec![EntityNode::with_children(10i64, vec![EntityNode::leaf(11i64)])])
        }

        fn apply_init(&mut self, _: &EntityNode, _: &InitData) -> Result<(), SpawnError> {
            if self.fail_init {
                return Err(SpawnError::ApplyInit { asset: "a".into(), reason: "bad scale".into() });
            }
            Ok(())
        }

        fn destroy_instance(&mut self, _: &[EntityNode]) -> Result<(), SpawnError> {
            self.destroyed += 1;
            if self.fail_destroy {
                return Err(SpawnError::Unload { asset: "a".into(), reason: "gone".into() });
            }
            Ok(())
        }

        fn unload(&mut self, _: ResourceHandle) -> Result<(), SpawnError> {
            self.unloads += 1;
            Ok(())
        }
    }

    fn init() -> InitData {
        InitData { scale: 1.0, max_health: 50.0, variant: Variant::Common }
    }

    #[test]
    fn acquire_reaches_spawned_and_captures_instance() {
        let mut source = StepSource::default();
        let mut c = LifecycleController::new(1, "prefabs/goblin");
        assert_eq!(c.acquire(&mut source, Vec3::new(1.0, 0.0, 2.0), &init()), Ok(true));
        assert_eq!(c.state(), LifecycleState::Spawned);
        assert_eq!(c.identity_key().unwrap().as_str(), "10");
        assert_eq!(c.spawn_position(), Some(Vec3::new(1.0, 0.0, 2.0)));
        assert_eq!(c.current_health(), 50.0);
    }

    #[test]
    fn second_acquire_is_a_noop() {
        let mut source = StepSource::default();
        let mut c = LifecycleController::new(1, "prefabs/goblin");
        c.acquire(&mut source, Vec3::ZERO, &init()).unwrap();
        assert_eq!(c.acquire(&mut source, Vec3::ONE, &init()), Ok(false));
        assert_eq!(source.loads, 1);
        assert_eq!(c.spawn_position(), Some(Vec3::ZERO));
    }

    #[test]
    fn acquire_while_loading_does_not_start_again() {
        let mut source = StepSource::default();
        let mut c = LifecycleController::new(1, "prefabs/goblin");
        c.transition(LifecycleEvent::BeginLoad).unwrap();
        assert_eq!(c.acquire(&mut source, Vec3::ZERO, &init()), Ok(false));
        assert_eq!(source.loads, 0);
        assert_eq!(c.state(), LifecycleState::Loading);
    }

    #[test]
    fn load_failure_aborts_to_unloaded() {
        let mut source = StepSource { fail_load: true, ..Default::default() };
        let mut c = LifecycleController::new(1, "prefabs/goblin");
        assert!(matches!(c.acquire(&mut source, Vec3::ZERO, &init()), Err(SpawnError::Load { .. })));
        assert_eq!(c.state(), LifecycleState::Unloaded);
        assert_eq!(source.unloads, 0);
    }

    #[test]
    fn instantiate_failure_unloads_the_handle() {
        let mut source = StepSource { fail_instantiate: true, ..Default::default() };
        let mut c = LifecycleController::new(1, "prefabs/goblin");
        assert!(c.acquire(&mut source, Vec3::ZERO, &init()).is_err());
        assert_eq!(c.state(), LifecycleState::Unloaded);
        assert_eq!(source.unloads, 1);
    }

    #[test]
    fn unresolvable_root_tears_down_immediately() {
        let mut source = StepSource { unresolvable_root: true, ..Default::default() };
        let mut c = LifecycleController::new(1, "prefabs/goblin");
        let err = c.acquire(&mut source, Vec3::ZERO, &init()).unwrap_err();
        assert!(matches!(err, SpawnError::RootUnresolved { .. }));
        assert_eq!(c.state(), LifecycleState::Unloaded);
        assert_eq!(source.destroyed, 1);
        assert_eq!(source.unloads, 1);
        assert!(c.roots().is_empty());
    }

    #[test]
    fn init_failure_destroys_partial_instance() {
        let mut source = StepSource { fail_init: true, ..Default::default() };
        let mut c = LifecycleController::new(1, "prefabs/goblin");
        assert!(matches!(c.acquire(&mut source, Vec3::ZERO, &init()), Err(SpawnError::ApplyInit { .. })));
        assert_eq!(source.destroyed, 1);
        assert_eq!(c.identity_key(), None);
    }

    #[test]
    fn release_and_dispose_are_idempotent() {
        let mut source = StepSource::default();
        let mut c = LifecycleController::new(1, "prefabs/goblin");
        c.acquire(&mut source, Vec3::ZERO, &init()).unwrap();
        assert_eq!(c.release(&mut source), Ok(true));
        assert_eq!(c.release(&mut source), Ok(false));
        c.dispose(&mut source);
        c.dispose(&mut source);
        assert_eq!(c.state(), LifecycleState::Unloaded);
        assert_eq!(source.destroyed, 1);
        assert_eq!(source.unloads, 1);
        assert!(c.roots().is_empty());
        assert_eq!(c.spawn_position(), None);
    }

    #[test]
    fn failed_release_still_ends_unloaded() {
        let mut source = StepSource::default();
        let mut c = LifecycleController::new(1, "prefabs/goblin");
        c.acquire(&mut source, Vec3::ZERO, &init()).unwrap();
        source.fail_destroy = true;
        assert!(c.release(&mut source).is_err());
        assert_eq!(c.state(), LifecycleState::Unloaded);
        c.dispose(&mut source);
        assert_eq!(source.unloads, 1);
    }

    #[test]
    fn dispose_swallows_release_errors() {
        let mut source = StepSource::default();
        let mut c = LifecycleController::new(1, "prefabs/goblin");
        c.acquire(&mut source, Vec3::ZERO, &init()).unwrap();
        source.fail_destroy = true;
        c.dispose(&mut source);
        assert_eq!(c.state(), LifecycleState::Unloaded);
    }

    #[test]
    fn invalid_transitions_leave_state_untouched() {
        let mut c = LifecycleController::new(1, "prefabs/goblin");
        let err = c.transition(LifecycleEvent::Instantiated).unwrap_err();
        assert_eq!(
            err,
            SpawnError::InvalidTransition { from: LifecycleState::Unloaded, event: LifecycleEvent::Instantiated }
        );
        assert_eq!(c.state(), LifecycleState::Unloaded);
    }

    #[test]
    fn damage_is_clamped_and_edge_triggered() {
        let mut source = StepSource::default();
        let mut c = LifecycleController::new(1, "prefabs/goblin");
        c.acquire(&mut source, Vec3::ZERO, &InitData { max_health: 5.0, ..init() }).unwrap();
        let first = c.take_damage(5.0).unwrap();
        assert!(first.depleted);
        assert_eq!(first.current, 0.0);
        assert_eq!(c.take_damage(5.0), None);
    }

    #[test]
    fn negative_and_non_finite_damage_count_as_zero() {
        let mut source = StepSource::default();
        let mut c = LifecycleController::new(1, "prefabs/goblin");
        c.acquire(&mut source, Vec3::ZERO, &init()).unwrap();
        assert_eq!(c.take_damage(-20.0).unwrap().current, 50.0);
        assert_eq!(c.take_damage(f32::NAN).unwrap().current, 50.0);
        let change = c.take_damage(f32::INFINITY).unwrap();
        assert_eq!(change.current, 50.0);
        assert!(!change.depleted);
        assert_eq!(c.take_damage(f32::NEG_INFINITY).unwrap().current, 50.0);
    }

    #[test]
    fn dispose_while_loading_abandons_without_unloading() {
        let mut source = StepSource::default();
        let mut c = LifecycleController::new(1, "prefabs/goblin");
        c.transition(LifecycleEvent::BeginLoad).unwrap();
        c.dispose(&mut source);
        assert_eq!(c.state(), LifecycleState::Unloaded);
        assert_eq!(source.unloads, 0);
        assert_eq!(source.destroyed, 0);
        assert_eq!(c.identity_key(), None);
        assert!(c.roots().is_empty());
    }
}
