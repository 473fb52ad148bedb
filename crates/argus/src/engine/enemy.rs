//! Enemy attribute cache.
//!
//! The live maps churn constantly as entities stream in and out of range.
//! Entities big enough to be bosses (`max_hp > PERSISTENT_ENEMY_MIN_HP`) are
//! spilled to a persistent shadow before any flush so boss identity survives
//! scene transitions.

use rustc_hash::FxHashMap;
use serde::Serialize;

/// Entities above this max HP keep their identity across cache flushes.
pub const PERSISTENT_ENEMY_MIN_HP: u64 = 10_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PersistentEnemy {
    pub name: Option<String>,
    pub max_hp: u64,
    pub attr_id: Option<u64>,
}

#[derive(Debug, Default)]
pub struct EnemyCache {
    names: FxHashMap<u64, String>,
    hp: FxHashMap<u64, u64>,
    max_hp: FxHashMap<u64, u64>,
    attr_ids: FxHashMap<u64, u64>,
    persistent: FxHashMap<u64, PersistentEnemy>,
}

impl EnemyCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_name(&mut self, id: u64, name: impl Into<String>) {
        self.names.insert(id, name.into());
    }

    pub fn set_hp(&mut self, id: u64, hp: u64) {
        self.hp.insert(id, hp);
    }

    pub fn set_max_hp(&mut self, id: u64, max_hp: u64) {
        self.max_hp.insert(id, max_hp);
    }

    pub fn set_attr_id(&mut self, id: u64, attr_id: u64) {
        self.attr_ids.insert(id, attr_id);
    }

    /// Name from the live cache, falling back to the persistent shadow.
    #[must_use]
    pub fn name(&self, id: u64) -> Option<&str> {
        self.names.get(&id).map(String::as_str).or_else(|| {
            self.persistent
                .get(&id)
                .and_then(|p| p.name.as_deref())
        })
    }

    #[must_use]
    pub fn hp(&self, id: u64) -> Option<u64> {
        self.hp.get(&id).copied()
    }

    #[must_use]
    pub fn max_hp(&self, id: u64) -> Option<u64> {
        self.max_hp
            .get(&id)
            .copied()
            .or_else(|| self.persistent.get(&id).map(|p| p.max_hp))
    }

    #[must_use]
    pub fn attr_id(&self, id: u64) -> Option<u64> {
        self.attr_ids
            .get(&id)
            .copied()
            .or_else(|| self.persistent.get(&id).and_then(|p| p.attr_id))
    }

    fn spill(&mut self, id: u64) {
        let Some(&max_hp) = self.max_hp.get(&id) else {
            return;
        };
        if max_hp > PERSISTENT_ENEMY_MIN_HP {
            self.persistent.insert(id, PersistentEnemy {
                name: self.names.get(&id).cloned(),
                max_hp,
                attr_id: self.attr_ids.get(&id).copied(),
            });
        }
    }

    /// Drop the live maps, preserving boss-sized entities in the shadow.
    pub fn flush(&mut self) {
        let ids: Vec<u64> = self.max_hp.keys().copied().collect();
        for id in ids {
            self.spill(id);
        }
        self.names.clear();
        self.hp.clear();
        self.max_hp.clear();
        self.attr_ids.clear();
    }

    /// Remove one entity, spilling it first when boss-sized.
    pub fn delete(&mut self, id: u64) {
        self.spill(id);
        self.names.remove(&id);
        self.hp.remove(&id);
        self.max_hp.remove(&id);
        self.attr_ids.remove(&id);
    }

    #[must_use]
    pub fn live_len(&self) -> usize {
        self.max_hp.len().max(self.names.len())
    }
}
