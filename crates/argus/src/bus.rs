//! In-process event fan-out.
//!
//! The engine task is the only producer, which is what gives subscribers the
//! ordering guarantees (`new_fight_started` before the first `data` of its
//! fight, `data_cleared` before the next `new_fight_started`). Delivery to
//! slow subscribers is lossy by design; the next 100 ms snapshot supersedes
//! a missed one.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::trace;

const BUS_CAPACITY: usize = 256;

/// Monotonic value sums as exposed on the wire.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DamageBuckets {
    pub normal: u64,
    pub critical: u64,
    pub lucky: u64,
    pub crit_lucky: u64,
    pub hp_lessen: u64,
    pub total: u64,
}

impl From<argus_stats::ValueBuckets> for DamageBuckets {
    fn from(v: argus_stats::ValueBuckets) -> Self {
        Self {
            normal: v.normal,
            critical: v.critical,
            lucky: v.lucky,
            crit_lucky: v.crit_lucky,
            hp_lessen: v.hp_lessen,
            total: v.total,
        }
    }
}

/// Hit counts as exposed on the wire (`total` included).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountBuckets {
    pub normal: u64,
    pub critical: u64,
    pub lucky: u64,
    pub total: u64,
}

impl From<argus_stats::HitCounts> for CountBuckets {
    fn from(c: argus_stats::HitCounts) -> Self {
        Self {
            normal: c.normal,
            critical: c.critical,
            lucky: c.lucky,
            total: c.total(),
        }
    }
}

/// One player's row in the periodic snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserSummary {
    pub realtime_dps: u64,
    pub realtime_dps_max: u64,
    pub total_dps: f64,
    pub total_damage: DamageBuckets,
    pub total_count: CountBuckets,
    pub realtime_hps: u64,
    pub realtime_hps_max: u64,
    pub total_hps: f64,
    pub total_healing: DamageBuckets,
    pub total_healing_count: CountBuckets,
    pub taken_damage: u64,
    /// Base profession, suffixed " (<sub>)" once a sub-profession is known.
    pub profession: String,
    pub name: String,
    pub fight_point: u64,
    pub hp: u64,
    pub max_hp: u64,
    pub dead_count: u64,
}

/// Current boss HP as shown on the overlay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BossHp {
    pub name: String,
    pub hp: u64,
    pub max_hp: u64,
}

/// Everything subscribers can observe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BusEvent {
    /// Periodic aggregate snapshot, 10 Hz.
    Data {
        code: i32,
        user: BTreeMap<u64, UserSummary>,
    },
    NewFightStarted { fight_id: u64 },
    DataCleared,
    /// No-op alias of [`BusEvent::DataCleared`], emitted right after it for
    /// subscribers listening on this name.
    FightEnded,
    BossHpUpdate { boss: Option<BossHp> },
    UserDeleted { uid: u64 },
}

/// Cloneable handle to the broadcast channel.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<BusEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    #[must_use]
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(BUS_CAPACITY);
        Self { tx }
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<BusEvent> {
        self.tx.subscribe()
    }

    /// Fire-and-forget; a bus with no subscribers swallows events.
    pub fn emit(&self, event: BusEvent) {
        trace!(?event, "bus emit");
        if self.tx.send(event).is_err() {
            trace!("no bus subscribers");
        }
    }
}
