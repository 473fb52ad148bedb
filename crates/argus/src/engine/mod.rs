//! The combat state engine.
//!
//! One task owns a `CombatEngine` and feeds it decoded [`GameEvent`]s plus
//! periodic ticks; everything downstream (bus subscribers, fight files, the
//! user cache) observes the engine, never the packet stream.

use std::{
    collections::BTreeMap,
    sync::Arc,
};

use argus_proto::{AttrKey, AttrValue, Element, EntityKind, GameEvent};
use argus_stats::HitKind;
use rustc_hash::FxHashMap;
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};

use crate::{
    bus::{BossHp, BusEvent, EventBus, UserSummary},
    config::Settings,
    persist::{FightStore, FightSummary, LogKind, LogRecord},
    usercache::SharedUserCache,
};

pub mod boss;
pub mod death;
pub mod enemy;
pub mod profession;
pub mod user;

use boss::{ActiveBoss, EncounteredBoss, LastSeenBoss, display_name, is_boss};
use death::{DamageRecord, DeathEvent, RecentDamage};
use enemy::EnemyCache;
use user::UserData;

/// Values at or above 2^53 are treated as corrupt and dropped.
pub const MAX_SAFE_VALUE: u64 = 1 << 53;

/// The fight currently being recorded. Its id doubles as the directory name
/// and equals its start timestamp.
#[derive(Debug, Clone, Copy)]
struct ActiveFight {
    id: u64,
    start_ms: u64,
}

pub struct CombatEngine {
    settings: Settings,
    users: FxHashMap<u64, UserData>,
    enemies: EnemyCache,
    recent: RecentDamage,
    active_boss: Option<ActiveBoss>,
    last_seen_boss: Option<LastSeenBoss>,
    fight: Option<ActiveFight>,
    encountered: Vec<EncounteredBoss>,
    deaths: Vec<DeathEvent>,
    max_hp_monster: u64,
    last_log_ms: u64,
    paused: bool,
    bus: EventBus,
    store: FightStore,
    user_cache: SharedUserCache,
    cache_dirty: Arc<Notify>,
}

impl CombatEngine {
    #[must_use]
    pub fn new(
        settings: Settings,
        bus: EventBus,
        store: FightStore,
        user_cache: SharedUserCache,
        cache_dirty: Arc<Notify>,
    ) -> Self {
        Self {
            settings,
            users: FxHashMap::default(),
            enemies: EnemyCache::new(),
            recent: RecentDamage::default(),
            active_boss: None,
            last_seen_boss: None,
            fight: None,
            encountered: Vec::new(),
            deaths: Vec::new(),
            max_hp_monster: 0,
            last_log_ms: 0,
            paused: false,
            bus,
            store,
            user_cache,
            cache_dirty,
        }
    }

    /// Dispatch one decoded event.
    pub fn handle_event(&mut self, event: GameEvent, now: u64) {
        match event {
            GameEvent::Damage {
                attacker,
                target,
                target_kind,
                skill_id,
                element,
                value,
                is_crit,
                is_lucky,
                is_cause_lucky,
                hp_lessen,
                lethal,
            } => {
                if self.paused {
                    return;
                }
                self.on_damage(
                    attacker,
                    target,
                    target_kind,
                    skill_id,
                    element,
                    value,
                    is_crit,
                    is_lucky,
                    is_cause_lucky,
                    hp_lessen,
                    lethal,
                    now,
                );
            }
            GameEvent::Healing {
                healer,
                target,
                skill_id,
                element,
                value,
                is_crit,
                is_lucky,
                is_cause_lucky,
            } => {
                if self.paused {
                    return;
                }
                self.on_healing(
                    healer,
                    target,
                    skill_id,
                    element,
                    value,
                    is_crit,
                    is_lucky,
                    is_cause_lucky,
                    now,
                );
            }
            // Attribute updates flow even while paused so identity stays
            // fresh for the next fight.
            GameEvent::Attr {
                entity,
                kind,
                key,
                value,
            } => self.on_attr(entity, kind, &key, &value, now),
            GameEvent::Death { victim, killer } => {
                if self.paused {
                    return;
                }
                self.on_death(victim, killer, now);
            }
        }
    }

    #[expect(clippy::too_many_arguments, reason = "mirrors the wire event")]
    fn on_damage(
        &mut self,
        attacker: u64,
        target: u64,
        target_kind: EntityKind,
        skill_id: u64,
        element: Element,
        value: u64,
        is_crit: bool,
        is_lucky: bool,
        is_cause_lucky: bool,
        hp_lessen: u64,
        lethal: bool,
        now: u64,
    ) {
        if !is_safe(value) || !is_safe(hp_lessen) {
            warn!(attacker, value, hp_lessen, "damage outside safe range; dropped");
            return;
        }
        let attacker_name = self.entity_name(attacker);
        let target_name = self.entity_name(target);
        let attacker_attr_id = self.enemies.attr_id(attacker);
        let kind = HitKind::from_flags(is_crit, is_lucky);

        self.users
            .entry(attacker)
            .or_insert_with(|| UserData::new(attacker))
            .add_damage(skill_id, value, kind, hp_lessen, Some(target), now);

        if target_kind == EntityKind::Player {
            self.users
                .entry(target)
                .or_insert_with(|| UserData::new(target))
                .add_taken(value, lethal, now);
            self.recent.push(target, DamageRecord {
                ts: now,
                attacker_id: attacker,
                attacker_name: attacker_name.clone(),
                attacker_attr_id,
                skill_id,
                damage: value,
            });
        }

        let fight_id = self.write_log(LogRecord {
            ts_ms: now,
            kind: LogKind::Damage,
            dataset: element.name().to_owned(),
            src_name: attacker_name,
            src_uid: attacker,
            tgt_name: target_name,
            tgt_uid: target,
            tgt_is_player: target_kind == EntityKind::Player,
            skill_id,
            value,
            ext: crate::persist::hit_ext(is_crit, is_lucky, is_cause_lucky),
        });
        if let Some(user) = self.users.get_mut(&attacker) {
            user.last_fight_id = fight_id;
        }
    }

    #[expect(clippy::too_many_arguments, reason = "mirrors the wire event")]
    fn on_healing(
        &mut self,
        healer: u64,
        target: u64,
        skill_id: u64,
        element: Element,
        value: u64,
        is_crit: bool,
        is_lucky: bool,
        is_cause_lucky: bool,
        now: u64,
    ) {
        if healer == 0 {
            debug!("healing with no source entity; skipped");
            return;
        }
        if !is_safe(value) {
            warn!(healer, value, "healing outside safe range; dropped");
            return;
        }
        let healer_name = self.entity_name(healer);
        let target_name = self.entity_name(target);
        let kind = HitKind::from_flags(is_crit, is_lucky);

        self.users
            .entry(healer)
            .or_insert_with(|| UserData::new(healer))
            .add_healing(skill_id, value, kind, Some(target), now);

        let fight_id = self.write_log(LogRecord {
            ts_ms: now,
            kind: LogKind::Heal,
            dataset: element.name().to_owned(),
            src_name: healer_name,
            src_uid: healer,
            tgt_name: target_name,
            tgt_uid: target,
            tgt_is_player: true,
            skill_id,
            value,
            ext: crate::persist::hit_ext(is_crit, is_lucky, is_cause_lucky),
        });
        if let Some(user) = self.users.get_mut(&healer) {
            user.last_fight_id = fight_id;
        }
    }

    fn on_attr(&mut self, entity: u64, kind: EntityKind, key: &AttrKey, value: &AttrValue, now: u64) {
        match kind {
            EntityKind::Player => self.on_player_attr(entity, key, value, now),
            EntityKind::Enemy => self.on_enemy_attr(entity, key, value, now),
        }
    }

    fn on_player_attr(&mut self, uid: u64, key: &AttrKey, value: &AttrValue, now: u64) {
        let user = self
            .users
            .entry(uid)
            .or_insert_with(|| UserData::new(uid));
        user.last_update_ms = now;
        match key {
            AttrKey::Name => {
                if let Some(name) = value.as_text() {
                    user.name = name.to_owned();
                    let name = name.to_owned();
                    self.cache_user(uid, move |u| u.name = name);
                }
            }
            AttrKey::Profession => {
                if let Some(profession) = value.as_text() {
                    user.profession = profession.to_owned();
                    let profession = profession.to_owned();
                    self.cache_user(uid, move |u| u.profession = profession);
                }
            }
            AttrKey::FightPoint => {
                if let Some(points) = value.as_int() {
                    user.fight_point = points;
                    self.cache_user(uid, move |u| u.fight_point = points);
                }
            }
            AttrKey::Hp => {
                if let Some(hp) = value.as_int() {
                    user.attrs.insert("hp".to_owned(), hp);
                }
            }
            AttrKey::MaxHp => {
                if let Some(max_hp) = value.as_int() {
                    user.attrs.insert("max_hp".to_owned(), max_hp);
                    self.cache_user(uid, move |u| u.max_hp = max_hp);
                }
            }
            AttrKey::AttrId => {
                if let Some(attr_id) = value.as_int() {
                    user.attrs.insert("attr_id".to_owned(), attr_id);
                }
            }
            AttrKey::Other(name) => {
                if let Some(v) = value.as_int() {
                    user.attrs.insert(name.clone(), v);
                }
            }
        }
    }

    fn on_enemy_attr(&mut self, entity: u64, key: &AttrKey, value: &AttrValue, now: u64) {
        match key {
            AttrKey::Name => {
                if let Some(name) = value.as_text() {
                    self.enemies.set_name(entity, name);
                }
            }
            AttrKey::Hp => {
                if let Some(hp) = value.as_int() {
                    self.enemies.set_hp(entity, hp);
                    self.update_active_boss(entity, now);
                }
            }
            AttrKey::MaxHp => {
                if let Some(max_hp) = value.as_int() {
                    self.enemies.set_max_hp(entity, max_hp);
                    self.max_hp_monster = self.max_hp_monster.max(max_hp);
                    self.update_active_boss(entity, now);
                }
            }
            AttrKey::AttrId => {
                if let Some(attr_id) = value.as_int() {
                    self.enemies.set_attr_id(entity, attr_id);
                }
            }
            AttrKey::Profession | AttrKey::FightPoint | AttrKey::Other(_) => {}
        }
    }

    /// An id counts as a player when we track it as a user and the enemy
    /// cache has never claimed it.
    fn is_player(&self, id: u64) -> bool {
        self.users.contains_key(&id)
            && self.enemies.name(id).is_none()
            && self.enemies.attr_id(id).is_none()
    }

    fn on_death(&mut self, victim: u64, killer: Option<u64>, now: u64) {
        if self.is_player(victim) {
            let player_name = self.entity_name(victim);
            let killer_name = killer.map(|k| self.entity_name(k)).unwrap_or_default();
            let killed_by_player = killer.is_some_and(|k| self.is_player(k));
            let recent_damage = self.recent.take(victim);
            info!(victim, ?killer, hits = recent_damage.len(), "player death");
            self.deaths.push(DeathEvent {
                ts: now,
                player_id: victim,
                player_name,
                killer_name,
                killed_by_player,
                recent_damage,
            });
            return;
        }

        // Enemy death. If it was the active boss, zero it out on the overlay
        // before the cache forgets it.
        if self
            .active_boss
            .as_ref()
            .is_some_and(|b| b.entity_id == victim)
        {
            if let Some(active) = self.active_boss.as_mut() {
                active.hp = 0;
            }
            self.emit_boss_update();
            self.active_boss = None;
        }
        self.enemies.delete(victim);
    }

    /// Boss spawn/wipe bookkeeping; runs on every enemy hp/max-hp change.
    fn update_active_boss(&mut self, entity: u64, now: u64) {
        let name = self.enemies.name(entity).map(str::to_owned);
        let attr_id = self.enemies.attr_id(entity);
        if !is_boss(attr_id, name.as_deref()) {
            return;
        }
        let (Some(hp), Some(max_hp)) = (self.enemies.hp(entity), self.enemies.max_hp(entity))
        else {
            return;
        };
        let name = name.unwrap_or_else(|| format!("Boss {entity}"));

        let full = hp == max_hp && max_hp > 0;
        let spawn_like = match &self.last_seen_boss {
            // First boss sighting at full health: a spawn. Below full: we
            // walked in mid-fight.
            None => full,
            Some(prev) if prev.entity_id == entity => {
                // Back to full from a dent: the raid wiped.
                prev.last_seen_hp < prev.max_hp && full
            }
            // A different boss at full health spawned.
            Some(_) => full,
        };
        // Only a spawn (or wipe) re-seeds the encounter list; sightings
        // below full health merely track the entity.
        if spawn_like {
            if self.settings.auto_clear_on_boss_spawn {
                self.clear_all(now);
                // The spawning boss belongs to the fight that starts now.
                self.max_hp_monster = self.max_hp_monster.max(max_hp);
            }
            self.record_encounter(entity, &name);
        }

        self.last_seen_boss = Some(LastSeenBoss {
            entity_id: entity,
            name: name.clone(),
            max_hp,
            last_seen_hp: hp,
            attr_id,
        });

        self.active_boss = Some(ActiveBoss {
            entity_id: entity,
            name,
            hp,
            max_hp,
            attr_id,
        });
        self.emit_boss_update();
        if hp == 0 {
            self.active_boss = None;
        }
    }

    fn emit_boss_update(&self) {
        let boss = self.active_boss.as_ref().map(|b| BossHp {
            name: b.name.clone(),
            hp: b.hp,
            max_hp: b.max_hp,
        });
        self.bus.emit(BusEvent::BossHpUpdate { boss });
    }

    fn record_encounter(&mut self, entity: u64, name: &str) {
        if !self.encountered.iter().any(|b| b.id == entity) {
            self.encountered.push(EncounteredBoss {
                id: entity,
                name: name.to_owned(),
                display_name: display_name(name),
            });
        }
    }

    /// Append one log line, implicitly starting a fight if none is active.
    /// Returns the fight id the line belongs to.
    fn write_log(&mut self, record: LogRecord) -> u64 {
        let started = self.fight.is_none();
        if started {
            let id = record.ts_ms;
            if let Err(err) = self.store.begin_fight(id) {
                error!(%err, fight_id = id, "failed to create fight directory");
            }
            self.fight = Some(ActiveFight {
                id,
                start_ms: record.ts_ms,
            });
        }
        let fight = self.fight.expect("fight just ensured");
        if let Err(err) = self.store.append(&record) {
            error!(%err, "failed to append fight log");
        }
        self.last_log_ms = record.ts_ms;
        if started {
            info!(fight_id = fight.id, "fight started");
            self.bus.emit(BusEvent::NewFightStarted { fight_id: fight.id });
        }
        fight.id
    }

    /// Snapshot, persist, and reset the fight. Emits `data_cleared` (and its
    /// alias) only when there was something to clear.
    pub fn clear_all(&mut self, _now: u64) {
        let had_anything = self.fight.is_some()
            || !self.users.is_empty()
            || !self.deaths.is_empty()
            || !self.encountered.is_empty()
            || self.active_boss.is_some();

        if let Some(fight) = self.fight.take() {
            self.persist_fight(fight);
        }

        self.users.clear();
        self.recent.clear();
        self.deaths.clear();
        self.encountered.clear();
        self.max_hp_monster = 0;
        self.active_boss = None;

        if had_anything {
            self.bus.emit(BusEvent::DataCleared);
            self.bus.emit(BusEvent::FightEnded);
            self.bus.emit(BusEvent::BossHpUpdate { boss: None });
        }
    }

    fn persist_fight(&mut self, fight: ActiveFight) {
        let summaries: BTreeMap<u64, UserSummary> =
            self.users.iter().map(|(&uid, u)| (uid, u.summary())).collect();
        let details: BTreeMap<u64, _> =
            self.users.iter().map(|(&uid, u)| (uid, u.detail())).collect();
        if let Err(err) = self.store.write_snapshots(&summaries, &details) {
            error!(%err, "failed to write user snapshots");
        }

        let end_ts = self.last_log_ms.max(fight.start_ms);
        let summary = FightSummary {
            start_ts: fight.start_ms,
            end_ts,
            duration: end_ts - fight.start_ms,
            user_count: self.users.len(),
            version: env!("CARGO_PKG_VERSION").to_owned(),
            max_hp_monster: self.max_hp_monster,
        };
        if let Err(err) = self.store.finalize(&summary, &self.encountered, &self.deaths) {
            error!(%err, fight_id = fight.id, "failed to finalize fight");
        }
        info!(
            fight_id = fight.id,
            duration_ms = summary.duration,
            users = summary.user_count,
            "fight persisted"
        );
    }

    /// 100 ms cadence: trim realtime windows and broadcast the snapshot.
    pub fn tick_snapshot(&mut self, now: u64) {
        let mut user = BTreeMap::new();
        for (&uid, data) in &mut self.users {
            data.update_realtime(now);
            user.insert(uid, data.summary());
        }
        self.bus.emit(BusEvent::Data { code: 0, user });
    }

    /// 5 s cadence: inactivity fight boundary.
    pub fn tick_timeout(&mut self, now: u64) {
        if !self.settings.auto_clear_on_timeout || self.users.is_empty() || self.last_log_ms == 0 {
            return;
        }
        if now.saturating_sub(self.last_log_ms) > self.settings.fight_timeout {
            info!(
                idle_ms = now - self.last_log_ms,
                "fight timed out; clearing"
            );
            self.clear_all(now);
        }
    }

    /// 10 s cadence: keep the on-disk snapshot of the running fight fresh.
    pub fn autosave(&mut self, _now: u64) {
        if self.fight.is_none() {
            return;
        }
        let summaries: BTreeMap<u64, UserSummary> =
            self.users.iter().map(|(&uid, u)| (uid, u.summary())).collect();
        let details: BTreeMap<u64, _> =
            self.users.iter().map(|(&uid, u)| (uid, u.detail())).collect();
        if let Err(err) = self.store.write_snapshots(&summaries, &details) {
            error!(%err, "autosave failed");
        }
        if let Err(err) = self.store.flush() {
            error!(%err, "log flush failed");
        }
    }

    /// The scene server changed (or was re-identified).
    pub fn on_server_change(&mut self, now: u64) {
        info!("scene server changed");
        if self.settings.auto_clear_on_server_change {
            self.clear_all(now);
        }
        self.enemies.flush();
        self.last_seen_boss = None;
    }

    pub fn pause(&mut self, paused: bool) {
        info!(paused, "pause toggled");
        self.paused = paused;
    }

    pub fn set_fight_timeout(&mut self, timeout_ms: u64) {
        self.settings.fight_timeout = timeout_ms;
    }

    pub fn delete_user(&mut self, uid: u64) {
        if self.users.remove(&uid).is_some() {
            self.bus.emit(BusEvent::UserDeleted { uid });
        }
    }

    pub fn refresh_enemy_cache(&mut self) {
        self.enemies.flush();
    }

    /// Shutdown path: persist what we have without ending the fight.
    pub fn save_all(&mut self, now: u64) {
        self.autosave(now);
        let mut cache = self.user_cache.lock().expect("user cache poisoned");
        if let Err(err) = cache.flush() {
            error!(%err, "user cache flush failed");
        }
    }

    fn cache_user(&self, uid: u64, mutate: impl FnOnce(&mut crate::usercache::CachedUser)) {
        let mut cache = self.user_cache.lock().expect("user cache poisoned");
        if cache.update(uid, mutate) {
            self.cache_dirty.notify_one();
        }
    }

    /// Best name we have for an entity: player name, enemy name, then a
    /// placeholder (`#` is reserved by the log format).
    fn entity_name(&self, id: u64) -> String {
        if let Some(user) = self.users.get(&id)
            && !user.name.is_empty()
        {
            return user.name.clone();
        }
        self.enemies
            .name(id)
            .map_or_else(|| "Unknown".to_owned(), str::to_owned)
    }

    // Read accessors, primarily for the control surface and tests.

    #[must_use]
    pub fn users(&self) -> &FxHashMap<u64, UserData> {
        &self.users
    }

    #[must_use]
    pub const fn active_boss(&self) -> Option<&ActiveBoss> {
        self.active_boss.as_ref()
    }

    #[must_use]
    pub const fn last_seen_boss(&self) -> Option<&LastSeenBoss> {
        self.last_seen_boss.as_ref()
    }

    #[must_use]
    pub fn encountered_bosses(&self) -> &[EncounteredBoss] {
        &self.encountered
    }

    #[must_use]
    pub fn death_events(&self) -> &[DeathEvent] {
        &self.deaths
    }

    #[must_use]
    pub fn recent_damage_len(&self, uid: u64) -> usize {
        self.recent.len(uid)
    }

    #[must_use]
    pub fn fight_id(&self) -> Option<u64> {
        self.fight.map(|f| f.id)
    }

    #[must_use]
    pub const fn is_paused(&self) -> bool {
        self.paused
    }

    #[must_use]
    pub fn store(&self) -> &FightStore {
        &self.store
    }
}

const fn is_safe(value: u64) -> bool {
    value < MAX_SAFE_VALUE
}
