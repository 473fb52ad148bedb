//! Death context: a bounded ring of recent incoming damage per player,
//! materialized into a report when the death packet lands.

use std::collections::VecDeque;

use rustc_hash::FxHashMap;
use serde::Serialize;

/// How many incoming hits a death report keeps.
pub const RECENT_DAMAGE_CAP: usize = 5;

/// One incoming hit, as remembered for a death report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DamageRecord {
    pub ts: u64,
    pub attacker_id: u64,
    pub attacker_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attacker_attr_id: Option<u64>,
    pub skill_id: u64,
    pub damage: u64,
}

/// `death_events.json` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeathEvent {
    pub ts: u64,
    pub player_id: u64,
    pub player_name: String,
    pub killer_name: String,
    pub killed_by_player: bool,
    /// Oldest first, at most [`RECENT_DAMAGE_CAP`].
    pub recent_damage: Vec<DamageRecord>,
}

/// Per-player rings of the most recent incoming damage.
#[derive(Debug, Default)]
pub struct RecentDamage {
    rings: FxHashMap<u64, VecDeque<DamageRecord>>,
}

impl RecentDamage {
    pub fn push(&mut self, target: u64, record: DamageRecord) {
        let ring = self.rings.entry(target).or_default();
        if ring.len() == RECENT_DAMAGE_CAP {
            ring.pop_front();
        }
        ring.push_back(record);
    }

    /// Snapshot and clear the ring for `target` (death materialization).
    #[must_use]
    pub fn take(&mut self, target: u64) -> Vec<DamageRecord> {
        self.rings
            .remove(&target)
            .map(Vec::from)
            .unwrap_or_default()
    }

    #[must_use]
    pub fn len(&self, target: u64) -> usize {
        self.rings.get(&target).map_or(0, VecDeque::len)
    }

    pub fn clear(&mut self) {
        self.rings.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(ts: u64, damage: u64) -> DamageRecord {
        DamageRecord {
            ts,
            attacker_id: 100,
            attacker_name: "Drake".to_owned(),
            attacker_attr_id: Some(1234),
            skill_id: 9,
            damage,
        }
    }

    #[test]
    fn ring_is_bounded_and_ordered() {
        let mut recent = RecentDamage::default();
        for i in 0..7u64 {
            recent.push(9, hit(i, i * 100));
        }
        assert_eq!(recent.len(9), RECENT_DAMAGE_CAP);

        let taken = recent.take(9);
        assert_eq!(taken.len(), RECENT_DAMAGE_CAP);
        // Oldest two were evicted; arrival order preserved.
        assert_eq!(taken.first().unwrap().ts, 2);
        assert_eq!(taken.last().unwrap().ts, 6);
        // Taking clears.
        assert_eq!(recent.len(9), 0);
        assert!(recent.take(9).is_empty());
    }

    #[test]
    fn rings_are_per_player() {
        let mut recent = RecentDamage::default();
        recent.push(1, hit(0, 10));
        recent.push(2, hit(0, 20));
        assert_eq!(recent.len(1), 1);
        assert_eq!(recent.len(2), 1);
        recent.clear();
        assert_eq!(recent.len(1), 0);
    }
}
