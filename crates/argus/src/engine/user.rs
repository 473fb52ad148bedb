//! Per-player aggregates and identity.

use argus_stats::{HitKind, StatisticData};
use rustc_hash::FxHashMap;
use serde::Serialize;

use crate::{
    bus::UserSummary,
    engine::profession::sub_profession_for_skill,
};

/// Healing skills are keyed at `skill_id + HEAL_SKILL_OFFSET` so a damage
/// skill and a healing skill with the same numeric id stay distinct.
pub const HEAL_SKILL_OFFSET: u64 = 1_000_000_000;

#[derive(Debug, Default)]
pub struct UserData {
    pub uid: u64,
    pub name: String,
    pub profession: String,
    pub sub_profession: String,
    pub fight_point: u64,
    /// Free-form numeric attributes (`hp`, `max_hp`, ...).
    pub attrs: FxHashMap<String, u64>,
    pub damage_stats: StatisticData,
    pub healing_stats: StatisticData,
    pub skill_usage: FxHashMap<u64, StatisticData>,
    pub skill_usage_by_target: FxHashMap<u64, FxHashMap<u64, StatisticData>>,
    pub taken_damage: u64,
    pub dead_count: u64,
    pub last_update_ms: u64,
    pub last_fight_id: u64,
}

/// `users/<uid>.json`: the skill-level detail behind a summary row.
#[derive(Debug, Serialize)]
pub struct UserDetail<'a> {
    pub uid: u64,
    pub name: &'a str,
    pub profession: &'a str,
    pub sub_profession: &'a str,
    pub damage: &'a StatisticData,
    pub healing: &'a StatisticData,
    pub skills: &'a FxHashMap<u64, StatisticData>,
    pub skills_by_target: &'a FxHashMap<u64, FxHashMap<u64, StatisticData>>,
}

impl UserData {
    #[must_use]
    pub fn new(uid: u64) -> Self {
        Self {
            uid,
            ..Self::default()
        }
    }

    pub fn add_damage(
        &mut self,
        skill_id: u64,
        value: u64,
        kind: HitKind,
        hp_lessen: u64,
        target: Option<u64>,
        now: u64,
    ) {
        self.damage_stats.add_record(value, kind, hp_lessen, now);
        self.skill_usage
            .entry(skill_id)
            .or_default()
            .add_record(value, kind, hp_lessen, now);
        if let Some(target) = target {
            self.skill_usage_by_target
                .entry(skill_id)
                .or_default()
                .entry(target)
                .or_default()
                .add_record(value, kind, hp_lessen, now);
        }
        if let Some(sub) = sub_profession_for_skill(skill_id) {
            self.sub_profession = sub.to_owned();
        }
        self.last_update_ms = now;
    }

    /// Healing mirrors damage, except the skill maps are keyed with the
    /// offset id while the sub-profession lookup uses the original one.
    pub fn add_healing(
        &mut self,
        skill_id: u64,
        value: u64,
        kind: HitKind,
        target: Option<u64>,
        now: u64,
    ) {
        let keyed = skill_id + HEAL_SKILL_OFFSET;
        self.healing_stats.add_record(value, kind, 0, now);
        self.skill_usage
            .entry(keyed)
            .or_default()
            .add_record(value, kind, 0, now);
        if let Some(target) = target {
            self.skill_usage_by_target
                .entry(keyed)
                .or_default()
                .entry(target)
                .or_default()
                .add_record(value, kind, 0, now);
        }
        if let Some(sub) = sub_profession_for_skill(skill_id) {
            self.sub_profession = sub.to_owned();
        }
        self.last_update_ms = now;
    }

    pub fn add_taken(&mut self, value: u64, lethal: bool, now: u64) {
        self.taken_damage += value;
        if lethal {
            self.dead_count += 1;
        }
        self.last_update_ms = now;
    }

    /// Trim every realtime window and recompute window sums.
    pub fn update_realtime(&mut self, now: u64) {
        self.damage_stats.update_realtime(now);
        self.healing_stats.update_realtime(now);
        for stat in self.skill_usage.values_mut() {
            stat.update_realtime(now);
        }
    }

    /// Profession as displayed: `"<base> (<sub>)"` once a sub is known.
    #[must_use]
    pub fn display_profession(&self) -> String {
        if self.sub_profession.is_empty() {
            self.profession.clone()
        } else {
            format!("{} ({})", self.profession, self.sub_profession)
        }
    }

    #[must_use]
    pub fn summary(&self) -> UserSummary {
        UserSummary {
            realtime_dps: self.damage_stats.realtime.value,
            realtime_dps_max: self.damage_stats.realtime.max,
            total_dps: self.damage_stats.total_per_second(),
            total_damage: self.damage_stats.stats.into(),
            total_count: self.damage_stats.count.into(),
            realtime_hps: self.healing_stats.realtime.value,
            realtime_hps_max: self.healing_stats.realtime.max,
            total_hps: self.healing_stats.total_per_second(),
            total_healing: self.healing_stats.stats.into(),
            total_healing_count: self.healing_stats.count.into(),
            taken_damage: self.taken_damage,
            profession: self.display_profession(),
            name: self.name.clone(),
            fight_point: self.fight_point,
            hp: self.attrs.get("hp").copied().unwrap_or(0),
            max_hp: self.attrs.get("max_hp").copied().unwrap_or(0),
            dead_count: self.dead_count,
        }
    }

    #[must_use]
    pub fn detail(&self) -> UserDetail<'_> {
        UserDetail {
            uid: self.uid,
            name: &self.name,
            profession: &self.profession,
            sub_profession: &self.sub_profession,
            damage: &self.damage_stats,
            healing: &self.healing_stats,
            skills: &self.skill_usage,
            skills_by_target: &self.skill_usage_by_target,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn damage_lands_in_all_three_maps() {
        let mut user = UserData::new(7);
        user.add_damage(321, 5000, HitKind::Critical, 0, Some(100), 10);
        user.add_damage(321, 10_000, HitKind::Critical, 0, Some(100), 20);

        assert_eq!(user.damage_stats.stats.critical, 15_000);
        assert_eq!(user.damage_stats.stats.total, 15_000);
        assert_eq!(user.damage_stats.count.critical, 2);
        assert_eq!(user.skill_usage[&321].stats.critical, 15_000);
        assert_eq!(user.skill_usage_by_target[&321][&100].count.total(), 2);
        assert_eq!(user.last_update_ms, 20);
    }

    #[test]
    fn healing_is_keyed_with_the_offset() {
        let mut user = UserData::new(7);
        user.add_damage(2440, 100, HitKind::Normal, 0, None, 0);
        user.add_healing(2440, 900, HitKind::Normal, Some(7), 0);

        assert!(user.skill_usage.contains_key(&2440));
        assert!(user.skill_usage.contains_key(&(2440 + HEAL_SKILL_OFFSET)));
        assert_eq!(user.skill_usage[&2440].stats.total, 100);
        assert_eq!(user.skill_usage[&(2440 + HEAL_SKILL_OFFSET)].stats.total, 900);
        // Sub-profession derived from the original id.
        assert_eq!(user.sub_profession, "Lifebinder");
    }

    #[test]
    fn taken_damage_counts_deaths_on_lethal() {
        let mut user = UserData::new(9);
        user.add_taken(4000, false, 0);
        user.add_taken(6000, true, 1);
        assert_eq!(user.taken_damage, 10_000);
        assert_eq!(user.dead_count, 1);
    }

    #[test]
    fn display_profession_appends_sub() {
        let mut user = UserData::new(1);
        user.profession = "Sorcerer".to_owned();
        assert_eq!(user.display_profession(), "Sorcerer");
        user.add_damage(1700, 1, HitKind::Normal, 0, None, 0);
        assert_eq!(user.display_profession(), "Sorcerer (Frostweaver)");
    }

    #[test]
    fn summary_reflects_attrs_and_totals() {
        let mut user = UserData::new(7);
        user.name = "Riven".to_owned();
        user.attrs.insert("hp".to_owned(), 41_000);
        user.attrs.insert("max_hp".to_owned(), 52_000);
        user.add_damage(1, 500, HitKind::Lucky, 0, None, 1000);
        user.add_damage(1, 500, HitKind::Normal, 0, None, 3000);

        let summary = user.summary();
        assert_eq!(summary.name, "Riven");
        assert_eq!(summary.hp, 41_000);
        assert_eq!(summary.max_hp, 52_000);
        assert_eq!(summary.total_damage.total, 1000);
        assert_eq!(summary.total_count.total, 2);
        // 1000 damage over 2 s.
        assert!((summary.total_dps - 500.0).abs() < f64::EPSILON);
    }
}
