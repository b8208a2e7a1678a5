//! Server-authoritative spawn, lifecycle and combat arbitration.
//!
//! Families of spawnable objects (monsters, trees, items) are kept populated by a
//! per-family [`SpawnScheduler`]. Clients only ever send requests keyed by entity id;
//! health, depletion and respawn are decided here and broadcast back out.
//!
//! The engine is host-agnostic: [`World`] is driven by a clock and a stream of
//! [`InboundEvent`]s, acquires instances through an [`AcquisitionSource`] and reports
//! through an [`EventSink`]. With the `module` feature the crate also builds as a
//! SpacetimeDB module that hosts the world itself.

// ============================================================================
// SCHEDULE INITIALIZATION MACRO
// ============================================================================
// Inserts a schedule row and logs the outcome. A failed insert disables that
// system until the next restart but never aborts module init.
#[cfg(feature = "module")]
#[macro_export]
macro_rules! try_insert_schedule {
    ($table:expr, $schedule:expr, $system_name:expr) => {{
        match $table.try_insert($schedule) {
            Ok(_) => {
                log::info!("{} schedule initialized successfully", $system_name);
            }
            Err(e) => {
                log::error!("CRITICAL: Failed to initialize {} schedule: {}", $system_name, e);
                log::error!("Continuing startup with {} system DISABLED", $system_name);
            }
        }
    }};
}

pub mod combat;
pub mod config;
pub mod dropped_pickup;
pub mod errors;
pub mod events;
pub mod family_policy;
pub mod identity_key;
pub mod lifecycle;
pub mod location;
pub mod melee;
pub mod prefab_source;
pub mod registry;
pub mod respawn;
pub mod spawn_scheduler;
pub mod timers;
pub mod world;

#[cfg(feature = "module")]
mod module;

pub use combat::DamageOutcome;
pub use config::{FamilyConfig, FamilyKind, WorldConfig};
pub use errors::SpawnError;
pub use events::{EventSink, InboundEvent, OutboundEvent, RecordingSink};
pub use identity_key::{normalize, IdentityKey, RawId};
pub use lifecycle::{AcquisitionSource, LifecycleController, LifecycleState};
pub use spawn_scheduler::{CycleOutcome, SpawnScheduler};
pub use world::{TickContext, World};
