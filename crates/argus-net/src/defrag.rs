//! IPv4 datagram reassembly.
//!
//! Fragments are held per `(id, src, dst, proto)` until the final fragment
//! (MF clear) arrives, then copied into place by offset. Unfragmented
//! datagrams never touch the cache; the caller routes them straight through.

use std::net::Ipv4Addr;

use rustc_hash::FxHashMap;
use tracing::warn;

use crate::{FRAGMENT_TIMEOUT_MS, wire::Ipv4Datagram};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct FragKey {
    id: u16,
    src: Ipv4Addr,
    dst: Ipv4Addr,
    proto: u8,
}

impl FragKey {
    fn of(dgram: &Ipv4Datagram<'_>) -> Self {
        Self {
            id: dgram.id,
            src: dgram.src,
            dst: dgram.dst,
            proto: dgram.protocol,
        }
    }
}

#[derive(Debug, Default)]
struct FragmentEntry {
    /// `(byte_offset, payload)`, arrival order.
    parts: Vec<(usize, Vec<u8>)>,
    last_seen_ms: u64,
}

/// Reassembles fragmented IPv4 datagrams with timeout-based eviction.
#[derive(Debug, Default)]
pub struct IpDefragmenter {
    entries: FxHashMap<FragKey, FragmentEntry>,
}

impl IpDefragmenter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one fragment. Returns the reassembled transport payload when
    /// `dgram` completes its datagram. Callers must not pass unfragmented
    /// datagrams (`!dgram.is_fragment()`).
    pub fn push(&mut self, dgram: &Ipv4Datagram<'_>, now: u64) -> Option<Vec<u8>> {
        debug_assert!(dgram.is_fragment());

        let key = FragKey::of(dgram);
        let entry = self.entries.entry(key).or_default();
        entry.last_seen_ms = now;
        entry
            .parts
            .push((usize::from(dgram.fragment_offset) * 8, dgram.payload.to_vec()));

        if dgram.more_fragments {
            return None;
        }

        // Final fragment: the datagram is as complete as it will get.
        let entry = self.entries.remove(&key)?;
        let total = entry
            .parts
            .iter()
            .map(|(offset, payload)| offset + payload.len())
            .max()?;
        let mut out = vec![0u8; total];
        for (offset, payload) in &entry.parts {
            out[*offset..*offset + payload.len()].copy_from_slice(payload);
        }
        Some(out)
    }

    /// Drop entries not touched within [`FRAGMENT_TIMEOUT_MS`]. Run from the
    /// janitor tick; returns how many were evicted.
    pub fn evict_expired(&mut self, now: u64) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| now.saturating_sub(entry.last_seen_ms) <= FRAGMENT_TIMEOUT_MS);
        let evicted = before - self.entries.len();
        if evicted > 0 {
            warn!(evicted, "dropped stale ip fragments");
        }
        evicted
    }

    #[must_use]
    pub fn pending(&self) -> usize {
        self.entries.len()
    }
}
