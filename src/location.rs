//! Spawn location selection: cooldown filter, shuffle, radius-based occupancy test.

use std::collections::HashMap;

use glam::Vec3;
use rand::seq::SliceRandom;
use rand::Rng;

/// Positions are quantized to centimetres so float noise cannot split a location.
const LOCATION_KEY_SCALE: f32 = 100.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct LocationKey(i64, i64, i64);

impl LocationKey {
    pub fn of(position: Vec3) -> Self {
        LocationKey(
            (position.x * LOCATION_KEY_SCALE).round() as i64,
            (position.y * LOCATION_KEY_SCALE).round() as i64,
            (position.z * LOCATION_KEY_SCALE).round() as i64,
        )
    }
}

/// Locations that may not be reused until their expiry. Expired entries are
/// dropped whenever they are read.
#[derive(Debug, Default)]
pub struct CooldownMap {
    expiries: HashMap<LocationKey, u64>,
}

impl CooldownMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&mut self, position: Vec3, now_ms: u64, duration_ms: u64) {
        self.expiries.insert(LocationKey::of(position), now_ms.saturating_add(duration_ms));
    }

    pub fn is_cooling(&mut self, position: Vec3, now_ms: u64) -> bool {
        let key = LocationKey::of(position);
        match self.expiries.get(&key) {
            Some(&expiry) if expiry > now_ms => true,
            Some(_) => {
                self.expiries.remove(&key);
                false
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.expiries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.expiries.is_empty()
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LocationSelector {
    pub occupancy_radius: f32,
    /// Pick a random (possibly occupied) candidate instead of giving up.
    pub falls_back_when_occupied: bool,
}

impl LocationSelector {
    pub fn new(occupancy_radius: f32, falls_back_when_occupied: bool) -> Self {
        LocationSelector { occupancy_radius, falls_back_when_occupied }
    }

    /// Picks a free candidate, or `None` when every candidate is cooling down or
    /// sits within the occupancy radius of an active spawn position.
    pub fn pick(
        &self,
        candidates: &[Vec3],
        occupied: &[Vec3],
        mut cooldowns: Option<&mut CooldownMap>,
        now_ms: u64,
        rng: &mut impl Rng,
    ) -> Option<Vec3> {
        let mut pool: Vec<Vec3> = candidates
            .iter()
            .copied()
            .filter(|candidate| match cooldowns.as_deref_mut() {
                Some(map) => !map.is_cooling(*candidate, now_ms),
                None => true,
            })
            .collect();
        if pool.is_empty() {
            return None;
        }

        pool.shuffle(rng);

        let radius_sq = self.occupancy_radius * self.occupancy_radius;
        let free = pool
            .iter()
            .copied()
            .find(|candidate| occupied.iter().all(|taken| candidate.distance_squared(*taken) >= radius_sq));

        match free {
            Some(position) => Some(position),
            None if self.falls_back_when_occupied => {
                let fallback = pool[rng.gen_range(0..pool.len())];
                log::debug!(
                    "[Location] All {} candidates occupied; falling back to ({:.1}, {:.1}, {:.1}).",
                    pool.len(), fallback.x, fallback.y, fallback.z
                );
                Some(fallback)
            }
            None => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn ring() -> Vec<Vec3> {
        vec![
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(10.0, 0.0, 0.0),
            Vec3::new(20.0, 0.0, 0.0),
            Vec3::new(30.0, 0.0, 0.0),
        ]
    }

    #[test]
    fn never_picks_inside_occupancy_radius() {
        let selector = LocationSelector::new(2.0, false);
        let occupied = vec![Vec3::new(0.5, 0.0, 0.0), Vec3::new(11.0, 0.0, 0.0), Vec3::new(29.0, 0.0, 0.5)];
        for seed in 0..64 {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            let picked = selector.pick(&ring(), &occupied, None, 0, &mut rng);
            assert_eq!(picked, Some(Vec3::new(20.0, 0.0, 0.0)));
        }
    }

    #[test]
    fn fully_occupied_pool_skips_without_fallback() {
        let selector = LocationSelector::new(2.0, false);
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        assert_eq!(selector.pick(&ring(), &ring(), None, 0, &mut rng), None);
    }

    #[test]
    fn fully_occupied_pool_falls_back_for_regrowth() {
        let selector = LocationSelector::new(2.0, true);
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let picked = selector.pick(&ring(), &ring(), None, 0, &mut rng).unwrap();
        assert!(ring().contains(&picked));
    }

    #[test]
    fn exact_radius_distance_counts_as_free() {
        let selector = LocationSelector::new(1.0, false);
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let candidates = [Vec3::new(1.0, 0.0, 0.0)];
        assert!(selector.pick(&candidates, &[Vec3::ZERO], None, 0, &mut rng).is_some());
    }

    #[test]
    fn cooling_locations_are_filtered_and_expire() {
        let selector = LocationSelector::new(1.0, true);
        let mut cooldowns = CooldownMap::new();
        let only = [Vec3::new(3.0, 0.0, 3.0)];
        cooldowns.start(only[0], 1_000, 500);
        let mut rng = ChaCha8Rng::seed_from_u64(9);

        assert_eq!(selector.pick(&only, &[], Some(&mut cooldowns), 1_200, &mut rng), None);
        assert_eq!(cooldowns.len(), 1);
        assert_eq!(selector.pick(&only, &[], Some(&mut cooldowns), 1_500, &mut rng), Some(only[0]));
        assert!(cooldowns.is_empty());
    }

    #[test]
    fn shuffle_spreads_picks_across_candidates() {
        let selector = LocationSelector::new(1.0, false);
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let mut seen = std::collections::HashSet::new();
        for _ in 0..64 {
            if let Some(p) = selector.pick(&ring(), &[], None, 0, &mut rng) {
                seen.insert(LocationKey::of(p));
            }
        }
        assert!(seen.len() > 1);
    }
}
