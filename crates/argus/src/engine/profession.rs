//! Skill → sub-profession table. Pure game data; extend as the catalogue
//! grows.

const TABLE: &[(u64, &str)] = &[
    (1700, "Frostweaver"),
    (1701, "Frostweaver"),
    (1702, "Frostweaver"),
    (1850, "Stormcaller"),
    (1851, "Stormcaller"),
    (2030, "Emberblade"),
    (2031, "Emberblade"),
    (2032, "Emberblade"),
    (2310, "Wardkeeper"),
    (2311, "Wardkeeper"),
    (2440, "Lifebinder"),
    (2441, "Lifebinder"),
    (2442, "Lifebinder"),
    (2580, "Shadowstep"),
    (2581, "Shadowstep"),
];

/// Look up the sub-profession a skill pins its user to, if any.
#[must_use]
pub fn sub_profession_for_skill(skill_id: u64) -> Option<&'static str> {
    TABLE
        .iter()
        .find(|(id, _)| *id == skill_id)
        .map(|(_, sub)| *sub)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_and_unknown_skills() {
        assert_eq!(sub_profession_for_skill(1700), Some("Frostweaver"));
        assert_eq!(sub_profession_for_skill(2442), Some("Lifebinder"));
        assert_eq!(sub_profession_for_skill(321), None);
    }
}
