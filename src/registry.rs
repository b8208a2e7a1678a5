//! Identity key -> controller index for one family.
//!
//! Every entity of a spawned subtree gets an entry, so a hit reported against any
//! hitbox resolves to the controller that owns it.

use std::collections::{HashMap, HashSet};

use log;

use crate::identity_key::IdentityKey;
use crate::lifecycle::{ControllerId, EntityNode, LifecycleController};

#[derive(Debug, Default)]
pub struct IndexRegistry {
    entries: HashMap<IdentityKey, ControllerId>,
}

impl IndexRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Indexes `root` and all of its descendants. Returns the number of keys added.
    pub fn index_subtree(&mut self, root: &EntityNode, controller: ControllerId) -> usize {
        let mut added = 0;
        if let Some(key) = root.key() {
            if let Some(previous) = self.entries.insert(key.clone(), controller) {
                if previous != controller {
                    log::warn!("[Registry] Key {} moved from controller {} to {}.", key, previous, controller);
                }
            }
            added += 1;
        }
        for child in &root.children {
            added += self.index_subtree(child, controller);
        }
        added
    }

    /// Removes `root` and all of its descendants. Returns the number of keys removed.
    pub fn unindex_subtree(&mut self, root: &EntityNode) -> usize {
        let mut removed = 0;
        if let Some(key) = root.key() {
            if self.entries.remove(&key).is_some() {
                removed += 1;
            }
        }
        for child in &root.children {
            removed += self.unindex_subtree(child);
        }
        removed
    }

    pub fn resolve(&self, key: &IdentityKey) -> Option<ControllerId> {
        self.entries.get(key).copied()
    }

    pub fn contains(&self, key: &IdentityKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drops every entry not owned by a `Spawned` controller in `active`.
    ///
    /// Anything pruned here means some teardown path skipped the unindex step, so each
    /// one is logged as a leak. Returns the pruned keys.
    pub fn reconcile<'a>(
        &mut self,
        active: impl IntoIterator<Item = &'a LifecycleController>,
    ) -> Vec<IdentityKey> {
        let mut expected: HashSet<(IdentityKey, ControllerId)> = HashSet::new();
        for controller in active.into_iter().filter(|c| c.is_spawned()) {
            for root in controller.roots() {
                collect_keys(root, controller.id(), &mut expected);
            }
        }

        let stale: Vec<IdentityKey> = self
            .entries
            .iter()
            .filter(|(key, id)| !expected.contains(&((*key).clone(), **id)))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &stale {
            if let Some(id) = self.entries.remove(key) {
                log::warn!("[Registry] Pruned leaked controller reference: key {} -> controller {}.", key, id);
            }
        }
        stale
    }
}

fn collect_keys(node: &EntityNode, controller: ControllerId, out: &mut HashSet<(IdentityKey, ControllerId)>) {
    if let Some(key) = node.key() {
        out.insert((key, controller));
    }
    for child in &node.children {
        collect_keys(child, controller, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity_key::RawId;

    fn goblin() -> EntityNode {
        EntityNode::with_children(
            100i64,
            vec![
                EntityNode::with_children(101i64, vec![EntityNode::leaf("101-blade")]),
                EntityNode::leaf(102i64),
                EntityNode::leaf(RawId::Unknown),
            ],
        )
    }

    #[test]
    fn descendants_resolve_to_the_owner() {
        let mut registry = IndexRegistry::new();
        assert_eq!(registry.index_subtree(&goblin(), 7), 4);
        for raw in ["100", "101", "101-blade", "102"] {
            assert_eq!(registry.resolve(&IdentityKey::from_text(raw).unwrap()), Some(7));
        }
    }

    #[test]
    fn unindex_mirrors_index() {
        let mut registry = IndexRegistry::new();
        registry.index_subtree(&goblin(), 7);
        assert_eq!(registry.unindex_subtree(&goblin()), 4);
        assert!(registry.is_empty());
        assert_eq!(registry.unindex_subtree(&goblin()), 0);
    }

    #[test]
    fn reconcile_prunes_entries_without_a_spawned_owner() {
        let mut registry = IndexRegistry::new();
        registry.index_subtree(&goblin(), 7);
        registry.index_subtree(&EntityNode::leaf(555i64), 8);

        let pruned = registry.reconcile(std::iter::empty());
        assert_eq!(pruned.len(), 5);
        assert!(registry.is_empty());
    }
}
