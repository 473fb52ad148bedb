//! `users.json`: identity fields that should survive fights and restarts.
//!
//! Writes are debounced by the runtime (a dirty notification re-arms a 2 s
//! timer); shutdown flushes synchronously.

use std::{
    collections::BTreeMap,
    io,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

pub const USER_CACHE_FILE: &str = "users.json";

pub const USER_CACHE_DEBOUNCE_MS: u64 = 2000;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedUser {
    pub name: String,
    pub profession: String,
    pub fight_point: u64,
    pub max_hp: u64,
}

#[derive(Debug)]
pub struct UserCache {
    path: PathBuf,
    entries: BTreeMap<u64, CachedUser>,
    dirty: bool,
}

/// The engine and the debounce task share the cache.
pub type SharedUserCache = Arc<Mutex<UserCache>>;

impl UserCache {
    /// Load from `dir/users.json`; a missing or corrupt file starts empty.
    #[must_use]
    pub fn load(dir: &Path) -> Self {
        let path = dir.join(USER_CACHE_FILE);
        let entries = match std::fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str(&raw) {
                Ok(entries) => entries,
                Err(err) => {
                    warn!(%err, "corrupt user cache; starting empty");
                    BTreeMap::new()
                }
            },
            Err(_) => BTreeMap::new(),
        };
        Self {
            path,
            entries,
            dirty: false,
        }
    }

    #[must_use]
    pub fn get(&self, uid: u64) -> Option<&CachedUser> {
        self.entries.get(&uid)
    }

    /// Apply `mutate` to the entry for `uid`; marks the cache dirty only
    /// when something actually changed. Returns that dirtiness.
    pub fn update(&mut self, uid: u64, mutate: impl FnOnce(&mut CachedUser)) -> bool {
        let entry = self.entries.entry(uid).or_default();
        let before = entry.clone();
        mutate(entry);
        if *entry != before {
            self.dirty = true;
        }
        self.dirty
    }

    #[must_use]
    pub const fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Serialize if dirty. The cache is held locked during serialization so
    /// a flush never observes a half-applied update.
    pub fn flush(&mut self) -> io::Result<()> {
        if !self.dirty {
            return Ok(());
        }
        let raw = serde_json::to_vec_pretty(&self.entries)?;
        std::fs::write(&self.path, raw)?;
        self.dirty = false;
        debug!(users = self.entries.len(), "user cache flushed");
        Ok(())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
