//! Fight persistence: the append-only event log, its JSON siblings, and the
//! consumer-side helpers (line parsing, time-series bucketing).
//!
//! Directory layout per fight: `logs/<fight_id>/fight.log`,
//! `allUserData.json`, `users/<uid>.json`, `summary.json`,
//! `encountered_boss.json`, `death_events.json`.

use std::{
    collections::BTreeMap,
    fs::{File, OpenOptions},
    io::{self, BufWriter, Write},
    path::{Path, PathBuf},
    sync::Mutex,
    time::{Duration, SystemTime},
};

use serde::{Deserialize, Serialize};

use crate::bus::UserSummary;

pub const LOG_FILE: &str = "fight.log";
pub const ALL_USER_DATA_FILE: &str = "allUserData.json";
pub const SUMMARY_FILE: &str = "summary.json";
pub const ENCOUNTERED_BOSS_FILE: &str = "encountered_boss.json";
pub const DEATH_EVENTS_FILE: &str = "death_events.json";
pub const USERS_DIR: &str = "users";

/// Interval for historical time-series bucketing.
pub const BUCKET_MS: u64 = 1000;

/// `summary.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FightSummary {
    pub start_ts: u64,
    pub end_ts: u64,
    pub duration: u64,
    pub user_count: usize,
    pub version: String,
    pub max_hp_monster: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogKind {
    Damage,
    Heal,
}

impl LogKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Damage => "DMG",
            Self::Heal => "HEAL",
        }
    }
}

/// One `fight.log` line, structured.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub ts_ms: u64,
    pub kind: LogKind,
    /// Damage school / dataset tag.
    pub dataset: String,
    pub src_name: String,
    pub src_uid: u64,
    pub tgt_name: String,
    pub tgt_uid: u64,
    pub tgt_is_player: bool,
    pub skill_id: u64,
    pub value: u64,
    pub ext: &'static str,
}

/// The EXT column. Crit+lucky hits get the combined tag; `CauseLucky` only
/// shows when neither flag fired on the hit itself.
#[must_use]
pub const fn hit_ext(is_crit: bool, is_lucky: bool, is_cause_lucky: bool) -> &'static str {
    match (is_crit, is_lucky) {
        (true, true) => "Crit+Lucky",
        (true, false) => "Crit",
        (false, true) => "Lucky",
        (false, false) => {
            if is_cause_lucky {
                "CauseLucky"
            } else {
                "Normal"
            }
        }
    }
}

fn rfc3339(ts_ms: u64) -> String {
    let time = SystemTime::UNIX_EPOCH + Duration::from_millis(ts_ms);
    humantime::format_rfc3339_millis(time).to_string()
}

/// Render one line, without the trailing newline. The format is consumed by
/// external tooling; treat it as a wire format.
#[must_use]
pub fn format_log_line(record: &LogRecord) -> String {
    format!(
        "[{}] [{}] DS: {} SRC: {}#{}(player) TGT: {}#{}({}) ID: {} VAL: {} EXT: {}",
        rfc3339(record.ts_ms),
        record.kind.as_str(),
        record.dataset,
        record.src_name,
        record.src_uid,
        record.tgt_name,
        record.tgt_uid,
        if record.tgt_is_player { "player" } else { "enemy" },
        record.skill_id,
        record.value,
        record.ext,
    )
}

/// Parse a line produced by [`format_log_line`]. `None` for anything that
/// does not match; consumers skip unknown lines.
#[must_use]
pub fn parse_log_line(line: &str) -> Option<LogRecord> {
    let rest = line.strip_prefix('[')?;
    let (ts_str, rest) = rest.split_once("] [")?;
    let ts = humantime::parse_rfc3339(ts_str).ok()?;
    let ts_ms = ts.duration_since(SystemTime::UNIX_EPOCH).ok()?.as_millis() as u64;

    let (kind_str, rest) = rest.split_once("] DS: ")?;
    let kind = match kind_str {
        "DMG" => LogKind::Damage,
        "HEAL" => LogKind::Heal,
        _ => return None,
    };

    let (dataset, rest) = rest.split_once(" SRC: ")?;
    let (src, rest) = rest.split_once(" TGT: ")?;
    let (src_name, src_uid) = parse_actor(src, "(player)")?;
    let (tgt, rest) = rest.split_once(" ID: ")?;
    let (tgt_name, tgt_uid, tgt_is_player) = if let Some((name, uid)) = parse_actor(tgt, "(player)")
    {
        (name, uid, true)
    } else {
        let (name, uid) = parse_actor(tgt, "(enemy)")?;
        (name, uid, false)
    };

    let (skill_str, rest) = rest.split_once(" VAL: ")?;
    let (value_str, ext) = rest.split_once(" EXT: ")?;

    Some(LogRecord {
        ts_ms,
        kind,
        dataset: dataset.to_owned(),
        src_name: src_name.to_owned(),
        src_uid,
        tgt_name: tgt_name.to_owned(),
        tgt_uid,
        tgt_is_player,
        skill_id: skill_str.parse().ok()?,
        value: value_str.parse().ok()?,
        ext: match ext.trim_end() {
            "Normal" => "Normal",
            "Crit" => "Crit",
            "Lucky" => "Lucky",
            "CauseLucky" => "CauseLucky",
            "Crit+Lucky" => "Crit+Lucky",
            _ => return None,
        },
    })
}

/// `<name>#<uid><suffix>` → `(name, uid)`. Names cannot contain `#`.
fn parse_actor<'a>(chunk: &'a str, suffix: &str) -> Option<(&'a str, u64)> {
    let chunk = chunk.strip_suffix(suffix)?;
    let (name, uid) = chunk.split_once('#')?;
    Some((name, uid.parse().ok()?))
}

/// One non-empty 1000 ms bucket, offset relative to the first event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimeBucket {
    pub offset_ms: u64,
    pub total: u64,
}

/// Bucket `(ts_ms, value)` events into [`BUCKET_MS`] intervals relative to
/// the first event. Empty buckets are omitted.
pub fn bucket_values(events: impl IntoIterator<Item = (u64, u64)>) -> Vec<TimeBucket> {
    let mut events = events.into_iter();
    let Some((first_ts, first_value)) = events.next() else {
        return Vec::new();
    };
    let mut buckets = BTreeMap::new();
    buckets.insert(0u64, first_value);
    for (ts, value) in events {
        let offset = ts.saturating_sub(first_ts) / BUCKET_MS * BUCKET_MS;
        *buckets.entry(offset).or_insert(0) += value;
    }
    buckets
        .into_iter()
        .map(|(offset_ms, total)| TimeBucket { offset_ms, total })
        .collect()
}

#[derive(Default)]
struct LogState {
    dir: Option<PathBuf>,
    writer: Option<BufWriter<File>>,
}

/// Writes one fight directory at a time. All file operations run under one
/// mutex so the log flush in `finalize` cannot interleave with appends, and
/// JSON siblings are only written while the log is quiescent.
pub struct FightStore {
    root: PathBuf,
    state: Mutex<LogState>,
}

impl FightStore {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            state: Mutex::new(LogState::default()),
        }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn fight_dir(&self, fight_id: u64) -> PathBuf {
        self.root.join(fight_id.to_string())
    }

    /// Create `logs/<fight_id>/` (and `users/`) and open the event log.
    pub fn begin_fight(&self, fight_id: u64) -> io::Result<()> {
        let dir = self.fight_dir(fight_id);
        std::fs::create_dir_all(dir.join(USERS_DIR))?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(dir.join(LOG_FILE))?;

        let mut state = self.state.lock().expect("log mutex poisoned");
        state.dir = Some(dir);
        state.writer = Some(BufWriter::new(file));
        Ok(())
    }

    #[must_use]
    pub fn has_open_fight(&self) -> bool {
        self.state.lock().expect("log mutex poisoned").dir.is_some()
    }

    pub fn append(&self, record: &LogRecord) -> io::Result<()> {
        let mut state = self.state.lock().expect("log mutex poisoned");
        let Some(writer) = state.writer.as_mut() else {
            return Err(io::Error::new(io::ErrorKind::NotFound, "no open fight"));
        };
        writeln!(writer, "{}", format_log_line(record))
    }

    pub fn flush(&self) -> io::Result<()> {
        let mut state = self.state.lock().expect("log mutex poisoned");
        if let Some(writer) = state.writer.as_mut() {
            writer.flush()?;
        }
        Ok(())
    }

    /// Rewrite `allUserData.json` and every `users/<uid>.json` for the open
    /// fight. Used by the autosave tick and by `finalize`.
    pub fn write_snapshots<D: Serialize>(
        &self,
        summaries: &BTreeMap<u64, UserSummary>,
        details: &BTreeMap<u64, D>,
    ) -> io::Result<()> {
        let state = self.state.lock().expect("log mutex poisoned");
        let Some(dir) = state.dir.as_ref() else {
            return Err(io::Error::new(io::ErrorKind::NotFound, "no open fight"));
        };
        write_json(&dir.join(ALL_USER_DATA_FILE), summaries)?;
        for (uid, detail) in details {
            write_json(&dir.join(USERS_DIR).join(format!("{uid}.json")), detail)?;
        }
        Ok(())
    }

    /// Close out the open fight: flush the log (creating it empty if it went
    /// missing), then write the JSON siblings. A call with no open fight is
    /// a no-op, which makes back-to-back clears idempotent on disk.
    pub fn finalize<B: Serialize, D: Serialize>(
        &self,
        summary: &FightSummary,
        bosses: &[B],
        deaths: &[D],
    ) -> io::Result<()> {
        let mut state = self.state.lock().expect("log mutex poisoned");
        let Some(dir) = state.dir.take() else {
            return Ok(());
        };
        if let Some(mut writer) = state.writer.take() {
            writer.flush()?;
        }
        // Downstream readers key off the log's presence to skip empty
        // fights; guarantee it exists.
        if !dir.join(LOG_FILE).exists() {
            File::create(dir.join(LOG_FILE))?;
        }

        write_json(&dir.join(SUMMARY_FILE), summary)?;
        write_json(&dir.join(ENCOUNTERED_BOSS_FILE), &bosses)?;
        if !deaths.is_empty() {
            write_json(&dir.join(DEATH_EVENTS_FILE), &deaths)?;
        }
        Ok(())
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> io::Result<()> {
    let raw = serde_json::to_vec_pretty(value)?;
    std::fs::write(path, raw)
}
