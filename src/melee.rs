//! # Melee Swing Validation
//!
//! A weapon hitbox overlap only counts while its owner has an active swing with that
//! same weapon, and only inside the swing's time window. The first accepted hit
//! consumes the swing, so one swing never lands twice.

use std::collections::HashSet;

use log;
use serde::Serialize;

use crate::identity_key::IdentityKey;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SwingRecord {
    pub weapon_key: IdentityKey,
    pub owner_key: IdentityKey,
    pub damage: f32,
    pub reach: f32,
    pub timestamp_ms: u64,
    pub window_ms: u64,
}

/// Swing state for one owner.
#[derive(Debug, Default)]
pub struct MeleeSwingValidator {
    last_swing: Option<SwingRecord>,
    active_swings: HashSet<u64>,
    next_swing_id: u64,
}

impl MeleeSwingValidator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a new swing and returns its id. The caller arms an expiry for it.
    pub fn begin_swing(&mut self, record: SwingRecord) -> u64 {
        self.next_swing_id += 1;
        let swing_id = self.next_swing_id;
        log::debug!(
            "[Melee] {} swings {} (swing {}, {:.1} dmg, {}ms window).",
            record.owner_key, record.weapon_key, swing_id, record.damage, record.window_ms
        );
        self.active_swings.insert(swing_id);
        self.last_swing = Some(record);
        swing_id
    }

    pub fn expire_swing(&mut self, swing_id: u64) -> bool {
        self.active_swings.remove(&swing_id)
    }

    pub fn has_active_swing(&self) -> bool {
        !self.active_swings.is_empty()
    }

    pub fn last_swing(&self) -> Option<&SwingRecord> {
        self.last_swing.as_ref()
    }

    /// Accepts a hit from `weapon_key` at `now_ms` if it belongs to the current swing.
    /// An accepted hit clears the swing state and returns the swing it consumed.
    pub fn try_validate_hit(&mut self, weapon_key: &IdentityKey, now_ms: u64) -> Option<SwingRecord> {
        if self.active_swings.is_empty() {
            return None;
        }
        let swing = self.last_swing.as_ref()?;
        if &swing.weapon_key != weapon_key {
            return None;
        }
        if now_ms.saturating_sub(swing.timestamp_ms) >= swing.window_ms {
            log::debug!("[Melee] Hit from {} arrived after the swing window.", weapon_key);
            return None;
        }
        self.active_swings.clear();
        self.last_swing.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn swing(at_ms: u64) -> SwingRecord {
        SwingRecord {
            weapon_key: IdentityKey::from_text("sword").unwrap(),
            owner_key: IdentityKey::from_text("player-1").unwrap(),
            damage: 25.0,
            reach: 2.0,
            timestamp_ms: at_ms,
            window_ms: 250,
        }
    }

    #[test]
    fn one_swing_lands_once() {
        let mut validator = MeleeSwingValidator::new();
        let sword = IdentityKey::from_text("sword").unwrap();
        validator.begin_swing(swing(1_000));
        assert!(validator.try_validate_hit(&sword, 1_100).is_some());
        assert!(validator.try_validate_hit(&sword, 1_120).is_none());
    }

    #[test]
    fn hit_outside_window_is_rejected() {
        let mut validator = MeleeSwingValidator::new();
        let sword = IdentityKey::from_text("sword").unwrap();
        validator.begin_swing(swing(1_000));
        assert!(validator.try_validate_hit(&sword, 1_250).is_none());
    }

    #[test]
    fn other_weapon_or_expired_swing_is_rejected() {
        let mut validator = MeleeSwingValidator::new();
        let axe = IdentityKey::from_text("axe").unwrap();
        let sword = IdentityKey::from_text("sword").unwrap();
        let id = validator.begin_swing(swing(0));
        assert!(validator.try_validate_hit(&axe, 10).is_none());
        assert!(validator.expire_swing(id));
        assert!(validator.try_validate_hit(&sword, 20).is_none());
    }
}
