//! Boss identification tables and spawn/wipe bookkeeping types.
//!
//! An entity is a boss iff its attr id is in the table or its name matches a
//! known boss name, exactly or by substring in either direction. The
//! substring rule can confuse siblings with overlapping names; the attr-id
//! table is checked first to keep that to entities the catalogue has not
//! caught up with.

use serde::Serialize;

/// Attr ids of known bosses. Game data.
pub const BOSS_ATTR_IDS: &[u64] = &[1234, 2750, 2751, 3804, 4120, 5230];

/// Known boss display names. Game data.
pub const BOSS_NAMES: &[&str] = &[
    "Drake",
    "Abyss Warden",
    "Tempest Serpent",
    "Hollow King",
    "Marrow Tyrant",
];

#[must_use]
pub fn is_boss(attr_id: Option<u64>, name: Option<&str>) -> bool {
    if let Some(attr_id) = attr_id
        && BOSS_ATTR_IDS.contains(&attr_id)
    {
        return true;
    }
    let Some(name) = name else {
        return false;
    };
    if name.is_empty() {
        return false;
    }
    BOSS_NAMES
        .iter()
        .any(|boss| name == *boss || name.contains(boss) || boss.contains(name))
}

/// Canonical table name when the match came through a substring, otherwise
/// the entity's own name.
#[must_use]
pub fn display_name(name: &str) -> String {
    BOSS_NAMES
        .iter()
        .find(|boss| name.contains(*boss) || boss.contains(name))
        .map_or_else(|| name.to_owned(), |boss| (*boss).to_owned())
}

/// The single boss currently shown on the overlay. Cleared at `hp == 0`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActiveBoss {
    pub entity_id: u64,
    pub name: String,
    pub hp: u64,
    pub max_hp: u64,
    pub attr_id: Option<u64>,
}

/// Last boss-shaped entity observed, for spawn/wipe transitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LastSeenBoss {
    pub entity_id: u64,
    pub name: String,
    pub max_hp: u64,
    pub last_seen_hp: u64,
    pub attr_id: Option<u64>,
}

/// `encountered_boss.json` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EncounteredBoss {
    pub id: u64,
    pub name: String,
    pub display_name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attr_id_table_wins_without_a_name() {
        assert!(is_boss(Some(1234), None));
        assert!(!is_boss(Some(999), None));
    }

    #[test]
    fn name_matches_exact_and_substring_both_ways() {
        assert!(is_boss(None, Some("Drake")));
        assert!(is_boss(None, Some("Elder Drake of the Peak")));
        // Entity name shorter than the table name.
        assert!(is_boss(None, Some("Warden")));
        assert!(!is_boss(None, Some("Cave Rat")));
        assert!(!is_boss(None, Some("")));
    }

    #[test]
    fn display_name_prefers_the_table() {
        assert_eq!(display_name("Elder Drake of the Peak"), "Drake");
        assert_eq!(display_name("Warden"), "Abyss Warden");
        assert_eq!(display_name("Cave Rat"), "Cave Rat");
    }
}
