use thiserror::Error;

use crate::lifecycle::{LifecycleEvent, LifecycleState};

/// Failures surfaced by the spawn engine.
///
/// Acquisition failures (`Load`, `Instantiate`, `RootUnresolved`, `ApplyInit`) are
/// transient: the controller aborts back to `Unloaded` and the next scheduled cycle
/// tries again. Nothing in here is ever shown to players.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SpawnError {
    #[error("failed to load asset '{asset}': {reason}")]
    Load { asset: String, reason: String },

    #[error("failed to instantiate asset '{asset}': {reason}")]
    Instantiate { asset: String, reason: String },

    #[error("instantiated asset '{asset}' has no resolvable root entity")]
    RootUnresolved { asset: String },

    #[error("failed to apply init data to '{asset}': {reason}")]
    ApplyInit { asset: String, reason: String },

    #[error("failed to unload '{asset}': {reason}")]
    Unload { asset: String, reason: String },

    #[error("invalid lifecycle transition: {event:?} while {from:?}")]
    InvalidTransition {
        from: LifecycleState,
        event: LifecycleEvent,
    },

    #[error("invalid family config '{label}': {reason}")]
    Config { label: String, reason: String },
}
