//! Per-source combat aggregates: monotonic damage/healing sums, hit counts,
//! per-bucket extremes, and a one-second sliding window for instantaneous
//! throughput.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

/// Window length for instantaneous (realtime) throughput.
pub const REALTIME_WINDOW_MS: u64 = 1000;

/// Classification of a single hit. Crit and lucky are not exclusive; a hit
/// that is both lands in [`HitKind::CritLucky`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HitKind {
    Normal,
    Critical,
    Lucky,
    CritLucky,
}

impl HitKind {
    #[must_use]
    pub const fn from_flags(is_crit: bool, is_lucky: bool) -> Self {
        match (is_crit, is_lucky) {
            (false, false) => Self::Normal,
            (true, false) => Self::Critical,
            (false, true) => Self::Lucky,
            (true, true) => Self::CritLucky,
        }
    }

    const fn index(self) -> usize {
        match self {
            Self::Normal => 0,
            Self::Critical => 1,
            Self::Lucky => 2,
            Self::CritLucky => 3,
        }
    }
}

/// Monotonic value sums, one bucket per [`HitKind`] plus the shield-absorbed
/// portion (`hp_lessen`) and the grand total.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueBuckets {
    pub normal: u64,
    pub critical: u64,
    pub lucky: u64,
    pub crit_lucky: u64,
    pub hp_lessen: u64,
    pub total: u64,
}

/// Hit counts. A crit+lucky hit increments both `critical` and `lucky`, so
/// `total()` counts it twice; callers that want distinct events should track
/// them separately.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HitCounts {
    pub normal: u64,
    pub critical: u64,
    pub lucky: u64,
}

impl HitCounts {
    #[must_use]
    pub const fn total(&self) -> u64 {
        self.normal + self.critical + self.lucky
    }
}

/// Smallest and largest single hit observed for one bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MinMax {
    pub min: u64,
    pub max: u64,
}

impl Default for MinMax {
    fn default() -> Self {
        Self {
            min: u64::MAX,
            max: 0,
        }
    }
}

impl MinMax {
    fn observe(&mut self, value: u64) {
        self.min = self.min.min(value);
        self.max = self.max.max(value);
    }
}

/// Sliding-window throughput: sum of the last second and the running peak of
/// that sum.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RealtimeStats {
    pub value: u64,
    pub max: u64,
}

/// Aggregate statistics for one stream of values (a player's damage, a
/// player's healing, one skill, one skill against one target, ...).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatisticData {
    pub stats: ValueBuckets,
    pub count: HitCounts,
    pub min_max: [MinMax; 4],
    #[serde(skip)]
    realtime_window: VecDeque<(u64, u64)>,
    pub realtime: RealtimeStats,
    /// First and last record timestamps, for lifetime throughput.
    pub time_range: Option<(u64, u64)>,
}

impl StatisticData {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one hit at `now` (milliseconds).
    pub fn add_record(&mut self, value: u64, kind: HitKind, hp_lessen: u64, now: u64) {
        match kind {
            HitKind::Normal => {
                self.stats.normal += value;
                self.count.normal += 1;
            }
            HitKind::Critical => {
                self.stats.critical += value;
                self.count.critical += 1;
            }
            HitKind::Lucky => {
                self.stats.lucky += value;
                self.count.lucky += 1;
            }
            HitKind::CritLucky => {
                // The value lands in its own bucket while the hit counts
                // toward both crit and lucky rates.
                self.stats.crit_lucky += value;
                self.count.critical += 1;
                self.count.lucky += 1;
            }
        }
        self.stats.hp_lessen += hp_lessen;
        self.stats.total += value;
        self.min_max[kind.index()].observe(value);

        self.realtime_window.push_back((now, value));

        self.time_range = match self.time_range {
            None => Some((now, now)),
            Some((first, last)) => Some((first, last.max(now))),
        };
    }

    /// Drop window entries older than one second and recompute the window
    /// sum. Call on a fixed cadence; also bumps the running window peak.
    pub fn update_realtime(&mut self, now: u64) {
        let cutoff = now.saturating_sub(REALTIME_WINDOW_MS);
        while let Some(&(ts, _)) = self.realtime_window.front() {
            if ts < cutoff {
                self.realtime_window.pop_front();
            } else {
                break;
            }
        }
        self.realtime.value = self.realtime_window.iter().map(|&(_, v)| v).sum();
        self.realtime.max = self.realtime.max.max(self.realtime.value);
    }

    /// Lifetime mean throughput in value units per second. Zero until two
    /// distinct timestamps exist; non-finite intermediate results clamp to
    /// zero.
    #[must_use]
    pub fn total_per_second(&self) -> f64 {
        let Some((first, last)) = self.time_range else {
            return 0.0;
        };
        let elapsed = last.saturating_sub(first).max(1);
        let rate = self.stats.total as f64 * 1000.0 / elapsed as f64;
        if rate.is_finite() { rate } else { 0.0 }
    }

    #[must_use]
    pub fn window_len(&self) -> usize {
        self.realtime_window.len()
    }

    /// Oldest timestamp still inside the realtime window.
    #[must_use]
    pub fn window_front_ts(&self) -> Option<u64> {
        self.realtime_window.front().map(|&(ts, _)| ts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn totals_are_sum_of_buckets() {
        let mut data = StatisticData::new();
        data.add_record(100, HitKind::Normal, 0, 0);
        data.add_record(250, HitKind::Critical, 0, 10);
        data.add_record(50, HitKind::Lucky, 5, 20);
        data.add_record(400, HitKind::CritLucky, 0, 30);

        let s = &data.stats;
        assert_eq!(s.total, s.normal + s.critical + s.lucky + s.crit_lucky);
        assert_eq!(s.total, 800);
        assert_eq!(s.hp_lessen, 5);
    }

    #[test]
    fn crit_lucky_counts_toward_both_rates() {
        let mut data = StatisticData::new();
        data.add_record(400, HitKind::CritLucky, 0, 0);

        assert_eq!(data.count.normal, 0);
        assert_eq!(data.count.critical, 1);
        assert_eq!(data.count.lucky, 1);
        assert_eq!(data.count.total(), data.count.normal + data.count.critical + data.count.lucky);
        // The value only lands in the combined bucket.
        assert_eq!(data.stats.critical, 0);
        assert_eq!(data.stats.lucky, 0);
        assert_eq!(data.stats.crit_lucky, 400);
    }

    #[test]
    fn min_max_tracks_per_bucket() {
        let mut data = StatisticData::new();
        data.add_record(100, HitKind::Critical, 0, 0);
        data.add_record(300, HitKind::Critical, 0, 0);

        let crit = data.min_max[HitKind::Critical.index()];
        assert_eq!(crit.min, 100);
        assert_eq!(crit.max, 300);

        // Untouched buckets keep their defaults.
        let normal = data.min_max[HitKind::Normal.index()];
        assert_eq!(normal.min, u64::MAX);
        assert_eq!(normal.max, 0);
    }

    #[test]
    fn realtime_window_trims_to_one_second() {
        let mut data = StatisticData::new();
        data.add_record(10, HitKind::Normal, 0, 0);
        data.add_record(20, HitKind::Normal, 0, 500);
        data.add_record(30, HitKind::Normal, 0, 1200);

        data.update_realtime(1300);
        // The entry at t=0 is older than 1300 - 1000.
        assert_eq!(data.window_len(), 2);
        assert_eq!(data.realtime.value, 50);
        assert!(data.window_front_ts().unwrap() >= 300);

        data.update_realtime(5000);
        assert_eq!(data.realtime.value, 0);
        // Peak is sticky.
        assert_eq!(data.realtime.max, 50);
    }

    #[test]
    fn throughput_uses_lifetime_range() {
        let mut data = StatisticData::new();
        assert_eq!(data.total_per_second(), 0.0);

        data.add_record(500, HitKind::Normal, 0, 1000);
        data.add_record(500, HitKind::Normal, 0, 3000);
        // 1000 total over 2 seconds.
        assert!((data.total_per_second() - 500.0).abs() < f64::EPSILON);
    }

    #[test]
    fn throughput_with_single_timestamp_clamps_elapsed() {
        let mut data = StatisticData::new();
        data.add_record(42, HitKind::Normal, 0, 777);
        // first == last, elapsed clamps to 1 ms.
        assert!((data.total_per_second() - 42_000.0).abs() < f64::EPSILON);
    }

    #[test]
    fn serialized_form_skips_window() {
        let mut data = StatisticData::new();
        data.add_record(10, HitKind::Normal, 0, 0);
        let json = serde_json::to_value(&data).unwrap();
        assert!(json.get("realtime_window").is_none());
        assert_eq!(json["stats"]["total"], 10);
    }
}
