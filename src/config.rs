//! Per-family tuning and the built-in defaults.

use std::collections::{BTreeMap, HashMap};

use glam::Vec3;
use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};

use crate::errors::SpawnError;

// --- Observed constants ---

/// Melee hit window after a swing begins.
pub const DEFAULT_SWING_WINDOW_MS: u64 = 250;

pub const ITEM_OCCUPANCY_RADIUS: f32 = 1.0;
pub const MONSTER_OCCUPANCY_RADIUS: f32 = 2.0;
pub const TREE_OCCUPANCY_RADIUS: f32 = 2.0;

/// Delay between depletion and the actual release, so clients can play death effects.
pub const MONSTER_RELEASE_GRACE_MS: u64 = 2_000;
pub const TREE_RELEASE_GRACE_MS: u64 = 1_000;

/// Lower bound on the delay before a depleted family asks for a new spawn.
pub const MONSTER_RESPAWN_FLOOR_MS: u64 = 2_000;
pub const TREE_RESPAWN_FLOOR_MS: u64 = 1_000;
pub const ITEM_RESPAWN_FLOOR_MS: u64 = 1_000;

pub const DEFAULT_PICKUP_DESPAWN_MS: u64 = 60_000;
pub const DEFAULT_PICKUP_SCATTER_RADIUS: f32 = 1.5;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FamilyKind {
    Monster,
    Tree,
    Item,
}

/// Health and scale applied to a freshly spawned instance.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StatBlock {
    pub health: f32,
    #[serde(default = "default_scale")]
    pub scale: f32,
}

fn default_scale() -> f32 {
    1.0
}

/// What a depleted harvestable drops. Rolled once per depletion.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LootTable {
    pub item: String,
    pub min_drops: u32,
    pub max_drops: u32,
    pub drop_chance: f32,
    #[serde(default = "default_scatter_radius")]
    pub scatter_radius: f32,
    #[serde(default = "default_pickup_despawn_ms")]
    pub despawn_after_ms: u64,
}

fn default_scatter_radius() -> f32 {
    DEFAULT_PICKUP_SCATTER_RADIUS
}

fn default_pickup_despawn_ms() -> u64 {
    DEFAULT_PICKUP_DESPAWN_MS
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FamilyConfig {
    pub label: String,
    pub kind: FamilyKind,
    /// Prefab to load. A family without one is disabled.
    #[serde(default)]
    pub asset: Option<String>,
    /// Optional distinct prefab for the rare variant.
    #[serde(default)]
    pub rare_asset: Option<String>,
    pub max_active: u32,
    pub spawn_chance: f32,
    pub spawn_rate_ms: u64,
    #[serde(default)]
    pub rare_chance: Option<f32>,
    pub common: StatBlock,
    #[serde(default)]
    pub rare: Option<StatBlock>,
    #[serde(default)]
    pub spawn_points: Vec<Vec3>,
    /// Overrides the family kind's occupancy radius.
    #[serde(default)]
    pub occupancy_radius: Option<f32>,
    #[serde(default)]
    pub loot: Option<LootTable>,
    /// How long a location stays unusable after its item was taken (item families).
    #[serde(default)]
    pub location_cooldown_ms: Option<u64>,
}

impl FamilyConfig {
    /// Returns the built-in template for a family kind, without spawn points.
    pub fn template(kind: FamilyKind) -> FamilyConfig {
        match DEFAULT_FAMILY_CONFIGS.get(&kind) {
            Some(config) => config.clone(),
            // Every kind has an entry; this arm only keeps the lookup total.
            None => FamilyConfig {
                label: format!("{:?}", kind).to_lowercase(),
                kind,
                asset: None,
                rare_asset: None,
                max_active: 0,
                spawn_chance: 0.0,
                spawn_rate_ms: 1_000,
                rare_chance: None,
                common: StatBlock { health: 1.0, scale: 1.0 },
                rare: None,
                spawn_points: Vec::new(),
                occupancy_radius: None,
                loot: None,
                location_cooldown_ms: None,
            },
        }
    }

    pub fn with_spawn_points(mut self, points: Vec<Vec3>) -> Self {
        self.spawn_points = points;
        self
    }

    /// Checks the invariants a scheduler relies on. A failing config disables its
    /// scheduler instead of bringing the server down.
    pub fn validate(&self) -> Result<(), SpawnError> {
        let fail = |reason: &str| {
            Err(SpawnError::Config {
                label: self.label.clone(),
                reason: reason.to_string(),
            })
        };

        match &self.asset {
            Some(asset) if !asset.trim().is_empty() => {}
            _ => return fail("missing asset reference"),
        }
        if !(0.0..=1.0).contains(&self.spawn_chance) {
            return fail("spawn_chance must be within [0, 1]");
        }
        if let Some(rare_chance) = self.rare_chance {
            if !(0.0..=1.0).contains(&rare_chance) {
                return fail("rare_chance must be within [0, 1]");
            }
        }
        if self.spawn_rate_ms == 0 {
            return fail("spawn_rate_ms must be positive");
        }
        if !(self.common.health > 0.0) {
            return fail("common health must be positive");
        }
        if let Some(rare) = &self.rare {
            if !(rare.health > 0.0) {
                return fail("rare health must be positive");
            }
        }
        if self.spawn_points.is_empty() {
            return fail("no spawn points");
        }
        if let Some(loot) = &self.loot {
            if loot.min_drops > loot.max_drops {
                return fail("loot min_drops exceeds max_drops");
            }
            if !(0.0..=1.0).contains(&loot.drop_chance) {
                return fail("loot drop_chance must be within [0, 1]");
            }
        }
        Ok(())
    }
}

/// Hitbox layout of a prefab the in-process source can instantiate.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PrefabShape {
    /// Child entities under the root, each hittable on its own.
    #[serde(default)]
    pub hitboxes: u32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WorldConfig {
    pub families: Vec<FamilyConfig>,
    #[serde(default)]
    pub prefabs: BTreeMap<String, PrefabShape>,
    #[serde(default = "default_swing_window_ms")]
    pub swing_window_ms: u64,
}

fn default_swing_window_ms() -> u64 {
    DEFAULT_SWING_WINDOW_MS
}

impl WorldConfig {
    pub fn from_json(json: &str) -> Result<WorldConfig, String> {
        serde_json::from_str(json).map_err(|e| format!("Failed to parse world config: {}", e))
    }
}

lazy_static! {
    pub static ref DEFAULT_FAMILY_CONFIGS: HashMap<FamilyKind, FamilyConfig> = {
        let mut configs = HashMap::new();

        configs.insert(FamilyKind::Monster, FamilyConfig {
            label: "monster".to_string(),
            kind: FamilyKind::Monster,
            asset: Some("prefabs/goblin".to_string()),
            rare_asset: Some("prefabs/goblin_chief".to_string()),
            max_active: 6,
            spawn_chance: 0.6,
            spawn_rate_ms: 5_000,
            rare_chance: Some(0.1),
            common: StatBlock { health: 100.0, scale: 1.0 },
            rare: Some(StatBlock { health: 250.0, scale: 1.4 }),
            spawn_points: Vec::new(),
            occupancy_radius: None,
            loot: None,
            location_cooldown_ms: None,
        });

        configs.insert(FamilyKind::Tree, FamilyConfig {
            label: "tree".to_string(),
            kind: FamilyKind::Tree,
            asset: Some("prefabs/pine".to_string()),
            rare_asset: None,
            max_active: 12,
            spawn_chance: 1.0,
            spawn_rate_ms: 10_000,
            rare_chance: None,
            common: StatBlock { health: 60.0, scale: 1.0 },
            rare: None,
            spawn_points: Vec::new(),
            occupancy_radius: None,
            loot: Some(LootTable {
                item: "Wood".to_string(),
                min_drops: 2,
                max_drops: 4,
                drop_chance: 0.9,
                scatter_radius: DEFAULT_PICKUP_SCATTER_RADIUS,
                despawn_after_ms: DEFAULT_PICKUP_DESPAWN_MS,
            }),
            location_cooldown_ms: None,
        });

        configs.insert(FamilyKind::Item, FamilyConfig {
            label: "item".to_string(),
            kind: FamilyKind::Item,
            asset: Some("prefabs/supply_crate".to_string()),
            rare_asset: None,
            max_active: 8,
            spawn_chance: 0.8,
            spawn_rate_ms: 3_000,
            rare_chance: None,
            common: StatBlock { health: 1.0, scale: 1.0 },
            rare: None,
            spawn_points: Vec::new(),
            occupancy_radius: None,
            loot: None,
            location_cooldown_ms: Some(15_000),
        });

        configs
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn templates_need_spawn_points_to_validate() {
        let template = FamilyConfig::template(FamilyKind::Monster);
        assert!(template.validate().is_err());
        let ready = template.with_spawn_points(vec![Vec3::ZERO]);
        assert!(ready.validate().is_ok());
    }

    #[test]
    fn missing_asset_is_a_config_error() {
        let mut config = FamilyConfig::template(FamilyKind::Item).with_spawn_points(vec![Vec3::ZERO]);
        config.asset = None;
        match config.validate() {
            Err(SpawnError::Config { label, reason }) => {
                assert_eq!(label, "item");
                assert!(reason.contains("asset"));
            }
            other => panic!("expected config error, got {:?}", other),
        }
    }

    #[test]
    fn out_of_range_chances_are_rejected() {
        let mut config = FamilyConfig::template(FamilyKind::Tree).with_spawn_points(vec![Vec3::ZERO]);
        config.spawn_chance = 1.5;
        assert!(config.validate().is_err());
        config.spawn_chance = 0.5;
        config.rare_chance = Some(-0.1);
        assert!(config.validate().is_err());
    }

    #[test]
    fn world_config_parses_with_defaults() {
        let json = r#"{
            "families": [{
                "label": "wolves",
                "kind": "Monster",
                "asset": "prefabs/wolf",
                "max_active": 2,
                "spawn_chance": 1.0,
                "spawn_rate_ms": 1000,
                "common": { "health": 40.0 },
                "spawn_points": [[0.0, 0.0, 0.0], [5.0, 0.0, 0.0]]
            }],
            "prefabs": { "prefabs/wolf": { "hitboxes": 2 } }
        }"#;
        let config = WorldConfig::from_json(json).unwrap();
        assert_eq!(config.swing_window_ms, DEFAULT_SWING_WINDOW_MS);
        let wolves = &config.families[0];
        assert_eq!(wolves.common.scale, 1.0);
        assert_eq!(wolves.spawn_points.len(), 2);
        assert!(wolves.validate().is_ok());
        assert_eq!(config.prefabs["prefabs/wolf"].hitboxes, 2);
    }

    #[test]
    fn malformed_world_config_reports_error() {
        let err = WorldConfig::from_json("{ not json").unwrap_err();
        assert!(err.starts_with("Failed to parse world config"));
    }
}
