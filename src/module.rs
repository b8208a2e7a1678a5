//! # SpacetimeDB Module Surface
//!
//! Hosts the [`World`] inside a SpacetimeDB module. Reducers feed inbound requests
//! in, a scheduled reducer drives the tick, and everything the engine broadcasts is
//! written to public event tables that clients subscribe to. Event rows are short
//! lived; a cleanup schedule removes them after a few seconds.
//!
//! Engine state lives in module memory and is rebuilt from `world_config.json` on
//! first use after a restart.

use std::cell::RefCell;
use std::time::Duration;

use glam::Vec3;
use log;
use spacetimedb::{ReducerContext, ScheduleAt, Table, TimeDuration, Timestamp};

use crate::config::WorldConfig;
use crate::events::{Envelope, InboundEvent, OutboundEvent, Recipient, RecordingSink};
use crate::identity_key::IdentityKey;
use crate::lifecycle::Variant;
use crate::prefab_source::PrefabSource;
use crate::world::World;

const WORLD_CONFIG_JSON: &str = include_str!("../world_config.json");

pub(crate) const WORLD_TICK_INTERVAL_MS: u64 = 250;
const EVENT_CLEANUP_INTERVAL_SECS: u64 = 10;
const EVENT_MAX_AGE_MICROS: i64 = 5_000_000;

// --- Tables ---

#[spacetimedb::table(name = world_tick_schedule, scheduled(process_world_tick))]
#[derive(Clone)]
pub struct WorldTickSchedule {
    #[primary_key]
    #[auto_inc]
    pub id: u64,
    pub scheduled_at: ScheduleAt,
}

/// Authoritative health of one spawned instance. `recipient` is set for late-join
/// sync rows meant for a single client.
#[spacetimedb::table(name = health_update, public)]
#[derive(Clone, Debug)]
pub struct HealthUpdate {
    #[primary_key]
    #[auto_inc]
    pub id: u64,
    pub target_key: String,
    pub current_health: f32,
    pub max_health: f32,
    pub recipient: Option<String>,
    pub timestamp: Timestamp,
}

#[spacetimedb::table(name = depletion_event, public)]
#[derive(Clone, Debug)]
pub struct DepletionEvent {
    #[primary_key]
    #[auto_inc]
    pub id: u64,
    pub target_key: String,
    pub attacker_key: Option<String>,
    pub family: String,
    pub is_rare: bool,
    pub pos_x: f32,
    pub pos_y: f32,
    pub pos_z: f32,
    pub timestamp: Timestamp,
}

#[spacetimedb::table(name = pickup_event, public)]
#[derive(Clone, Debug)]
pub struct PickupEvent {
    #[primary_key]
    #[auto_inc]
    pub id: u64,
    pub pickup_id: u64,
    pub item: String,
    pub quantity: u32,
    pub pos_x: f32,
    pub pos_y: f32,
    pub pos_z: f32,
    pub despawned: bool,
    pub timestamp: Timestamp,
}

#[spacetimedb::table(name = world_event_cleanup_schedule, scheduled(cleanup_old_world_events))]
#[derive(Clone, Debug)]
pub struct WorldEventCleanupSchedule {
    #[primary_key]
    #[auto_inc]
    pub schedule_id: u64,
    pub scheduled_at: ScheduleAt,
}

// --- Engine state ---

struct ModuleState {
    world: World,
    source: PrefabSource,
}

thread_local! {
    static STATE: RefCell<Option<ModuleState>> = RefCell::new(None);
}

fn now_ms(ctx: &ReducerContext) -> u64 {
    (ctx.timestamp.to_micros_since_unix_epoch() / 1_000).max(0) as u64
}

fn sender_key(ctx: &ReducerContext) -> IdentityKey {
    IdentityKey::from_text(&ctx.sender.to_hex().to_string())
        .unwrap_or_else(|| IdentityKey::from(0i64))
}

fn build_state(ctx: &ReducerContext) -> Result<ModuleState, String> {
    let config = WorldConfig::from_json(WORLD_CONFIG_JSON)?;
    let seed = ctx.timestamp.to_micros_since_unix_epoch() as u64;
    let mut world = World::new(&config, seed);
    world.start(now_ms(ctx));
    log::info!("[WorldModule] Built world with {} families (seed {}).", world.families().len(), seed);
    Ok(ModuleState { world, source: PrefabSource::new(config.prefabs) })
}

/// Runs `f` against the world after bringing its clock up to the reducer's
/// timestamp, then writes whatever was broadcast to the event tables.
fn with_world<R>(
    ctx: &ReducerContext,
    f: impl FnOnce(&mut World, &mut PrefabSource, &mut RecordingSink) -> R,
) -> Result<R, String> {
    let mut sink = RecordingSink::new();
    let result = STATE.with(|cell| -> Result<R, String> {
        let mut slot = cell.borrow_mut();
        if slot.is_none() {
            *slot = Some(build_state(ctx)?);
        }
        let state = slot.as_mut().ok_or_else(|| "World state unavailable".to_string())?;
        state.world.advance(now_ms(ctx), &mut state.source, &mut sink);
        Ok(f(&mut state.world, &mut state.source, &mut sink))
    })?;
    publish_events(ctx, sink.drain());
    Ok(result)
}

fn publish_events(ctx: &ReducerContext, envelopes: Vec<Envelope>) {
    for Envelope { recipient, event } in envelopes {
        let recipient = match recipient {
            Recipient::All => None,
            Recipient::Observer(observer) => Some(observer),
        };
        match event {
            OutboundEvent::HealthUpdated { target_key, current_health, max_health } => {
                if let Err(e) = ctx.db.health_update().try_insert(HealthUpdate {
                    id: 0,
                    target_key: target_key.to_string(),
                    current_health,
                    max_health,
                    recipient,
                    timestamp: ctx.timestamp,
                }) {
                    log::error!("[WorldModule] Failed to publish health update: {}", e);
                }
            }
            OutboundEvent::Depleted { target_key, attacker_key, family, variant, position } => {
                let position = position.unwrap_or(Vec3::ZERO);
                if let Err(e) = ctx.db.depletion_event().try_insert(DepletionEvent {
                    id: 0,
                    target_key: target_key.to_string(),
                    attacker_key: attacker_key.map(|key| key.to_string()),
                    family,
                    is_rare: variant == Variant::Rare,
                    pos_x: position.x,
                    pos_y: position.y,
                    pos_z: position.z,
                    timestamp: ctx.timestamp,
                }) {
                    log::error!("[WorldModule] Failed to publish depletion: {}", e);
                }
            }
            OutboundEvent::PickupSpawned { pickup_id, item, quantity, position } => {
                insert_pickup_event(ctx, pickup_id, item, quantity, position, false);
            }
            OutboundEvent::PickupDespawned { pickup_id } => {
                insert_pickup_event(ctx, pickup_id, String::new(), 0, Vec3::ZERO, true);
            }
        }
    }
}

fn insert_pickup_event(ctx: &ReducerContext, pickup_id: u64, item: String, quantity: u32, position: Vec3, despawned: bool) {
    if let Err(e) = ctx.db.pickup_event().try_insert(PickupEvent {
        id: 0,
        pickup_id,
        item,
        quantity,
        pos_x: position.x,
        pos_y: position.y,
        pos_z: position.z,
        despawned,
        timestamp: ctx.timestamp,
    }) {
        log::error!("[WorldModule] Failed to publish pickup event {}: {}", pickup_id, e);
    }
}

// --- Lifecycle Reducers ---

#[spacetimedb::reducer(init)]
pub fn init_module(ctx: &ReducerContext) -> Result<(), String> {
    log::info!("Initializing spawn arbiter module...");

    let state = build_state(ctx)?;
    STATE.with(|cell| *cell.borrow_mut() = Some(state));

    let tick_table = ctx.db.world_tick_schedule();
    if tick_table.iter().count() == 0 {
        log::info!("Starting world tick schedule (every {}ms).", WORLD_TICK_INTERVAL_MS);
        crate::try_insert_schedule!(
            tick_table,
            WorldTickSchedule {
                id: 0,
                scheduled_at: ScheduleAt::Interval(TimeDuration::from(Duration::from_millis(WORLD_TICK_INTERVAL_MS))),
            },
            "World tick"
        );
    }

    let cleanup_table = ctx.db.world_event_cleanup_schedule();
    if cleanup_table.iter().count() == 0 {
        crate::try_insert_schedule!(
            cleanup_table,
            WorldEventCleanupSchedule {
                schedule_id: 0,
                scheduled_at: ScheduleAt::Interval(TimeDuration::from(Duration::from_secs(EVENT_CLEANUP_INTERVAL_SECS))),
            },
            "World event cleanup"
        );
    }

    log::info!("Module initialization complete.");
    Ok(())
}

/// Late joiners get the current health of everything alive, addressed to them only.
#[spacetimedb::reducer(client_connected)]
pub fn identity_connected(ctx: &ReducerContext) -> Result<(), String> {
    let observer = ctx.sender.to_hex().to_string();
    let sent = with_world(ctx, |world, _, sink| world.sync_observer(&observer, sink))?;
    log::info!("[Connect] Sent {} health states to {:?}.", sent, ctx.sender);
    Ok(())
}

#[spacetimedb::reducer]
pub fn process_world_tick(ctx: &ReducerContext, _schedule: WorldTickSchedule) -> Result<(), String> {
    if ctx.sender != ctx.identity() {
        return Err("process_world_tick may only be called by the scheduler.".to_string());
    }
    with_world(ctx, |_, _, _| ())
}

#[spacetimedb::reducer]
pub fn cleanup_old_world_events(ctx: &ReducerContext, _args: WorldEventCleanupSchedule) -> Result<(), String> {
    if ctx.sender != ctx.identity() {
        return Err("World event cleanup can only be run by scheduler".to_string());
    }
    let cutoff = ctx.timestamp - TimeDuration::from_micros(EVENT_MAX_AGE_MICROS);

    let stale_health: Vec<u64> =
        ctx.db.health_update().iter().filter(|row| row.timestamp < cutoff).map(|row| row.id).collect();
    let stale_depletions: Vec<u64> =
        ctx.db.depletion_event().iter().filter(|row| row.timestamp < cutoff).map(|row| row.id).collect();
    let stale_pickups: Vec<u64> =
        ctx.db.pickup_event().iter().filter(|row| row.timestamp < cutoff).map(|row| row.id).collect();

    let removed = stale_health.len() + stale_depletions.len() + stale_pickups.len();
    for id in stale_health {
        ctx.db.health_update().id().delete(id);
    }
    for id in stale_depletions {
        ctx.db.depletion_event().id().delete(id);
    }
    for id in stale_pickups {
        ctx.db.pickup_event().id().delete(id);
    }
    if removed > 0 {
        log::info!("Cleaned up {} old world events", removed);
    }
    Ok(())
}

// --- Client Requests ---

#[spacetimedb::reducer]
pub fn request_damage(ctx: &ReducerContext, target_key: String, amount: f32) -> Result<(), String> {
    let attacker = sender_key(ctx);
    with_world(ctx, |world, source, sink| {
        world.handle_event(
            InboundEvent::RequestDamage {
                target_key: target_key.into(),
                amount,
                attacker_key: Some(attacker.as_str().into()),
            },
            source,
            sink,
        )
    })
}

#[spacetimedb::reducer]
pub fn begin_melee_swing(ctx: &ReducerContext, weapon_key: String, damage: f32, reach: f32) -> Result<(), String> {
    let owner = sender_key(ctx);
    with_world(ctx, |world, source, sink| {
        world.handle_event(
            InboundEvent::BeginMeleeSwing {
                weapon_key: weapon_key.into(),
                owner_key: owner.as_str().into(),
                damage,
                reach,
                window_ms: None,
            },
            source,
            sink,
        )
    })
}

#[spacetimedb::reducer]
pub fn report_melee_hit(ctx: &ReducerContext, weapon_key: String, target_key: String) -> Result<(), String> {
    with_world(ctx, |world, source, sink| {
        world.handle_event(
            InboundEvent::MeleeHit { weapon_key: weapon_key.into(), target_key: target_key.into() },
            source,
            sink,
        )
    })
}

#[spacetimedb::reducer]
pub fn request_destroy(ctx: &ReducerContext, target_key: String) -> Result<(), String> {
    with_world(ctx, |world, source, sink| {
        world.handle_event(InboundEvent::RequestDestroy { target_key: target_key.into() }, source, sink)
    })
}

#[spacetimedb::reducer]
pub fn harvest_hit(ctx: &ReducerContext, target_key: String, remaining_health: f32) -> Result<(), String> {
    let attacker = sender_key(ctx);
    with_world(ctx, |world, source, sink| {
        world.handle_event(
            InboundEvent::HarvestHit {
                target_key: target_key.into(),
                remaining_health,
                attacker_key: Some(attacker.as_str().into()),
            },
            source,
            sink,
        )
    })
}

#[spacetimedb::reducer]
pub fn harvest_depleted(ctx: &ReducerContext, target_key: String, pos_x: f32, pos_y: f32, pos_z: f32) -> Result<(), String> {
    let attacker = sender_key(ctx);
    with_world(ctx, |world, source, sink| {
        world.handle_event(
            InboundEvent::HarvestDepleted {
                target_key: target_key.into(),
                position: Vec3::new(pos_x, pos_y, pos_z),
                attacker_key: Some(attacker.as_str().into()),
            },
            source,
            sink,
        )
    })
}

/// Accepts any inbound request as JSON, for hosts that relay a raw event stream.
#[spacetimedb::reducer]
pub fn submit_world_event(ctx: &ReducerContext, payload_json: String) -> Result<(), String> {
    let event: InboundEvent =
        serde_json::from_str(&payload_json).map_err(|e| format!("Invalid world event: {}", e))?;
    with_world(ctx, |world, source, sink| world.handle_event(event, source, sink))
}
