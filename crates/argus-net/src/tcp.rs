//! Sequence-ordered TCP stream reassembly for the single identified flow.
//!
//! Sequence arithmetic wraps mod 2^32; comparisons go through the signed
//! difference so the frontier survives wraparound. Out-of-order segments
//! wait in an insertion-ordered cache bounded by [`TCP_CACHE_MAX`].

use std::collections::VecDeque;

use bytes::BytesMut;
use rustc_hash::FxHashMap;
use tracing::{debug, warn};

use crate::{FRAGMENT_TIMEOUT_MS, TCP_CACHE_EVICT, TCP_CACHE_MAX};

/// `true` iff `a >= b` in 32-bit modular sequence space.
#[must_use]
pub const fn seq_ge(a: u32, b: u32) -> bool {
    a.wrapping_sub(b) as i32 >= 0
}

/// Outcome of offering one segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Admitted; zero or more bytes may have drained into `assembled`.
    Accepted,
    /// Behind the contiguous frontier; dropped.
    Stale,
    /// Reassembler not yet seeded by server identification; dropped.
    Unseeded,
}

#[derive(Debug, Default)]
pub struct TcpReassembler {
    next_seq: Option<u32>,
    cache: FxHashMap<u32, Vec<u8>>,
    /// Insertion order of cache keys, for oldest-first eviction. May hold
    /// keys already drained; eviction skips those.
    cache_order: VecDeque<u32>,
    assembled: BytesMut,
    last_activity_ms: u64,
}

impl TcpReassembler {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the contiguous frontier. Called once per identified flow.
    pub fn seed(&mut self, next_seq: u32, now: u64) {
        self.reset();
        self.next_seq = Some(next_seq);
        self.last_activity_ms = now;
    }

    #[must_use]
    pub const fn is_seeded(&self) -> bool {
        self.next_seq.is_some()
    }

    #[must_use]
    pub const fn next_seq(&self) -> Option<u32> {
        self.next_seq
    }

    /// Offer one segment. Empty payloads (pure control segments) are
    /// discarded before cache admission.
    pub fn push(&mut self, seq: u32, payload: &[u8], now: u64) -> Admission {
        let Some(next) = self.next_seq else {
            return Admission::Unseeded;
        };
        self.last_activity_ms = now;

        if payload.is_empty() {
            return Admission::Accepted;
        }
        if !seq_ge(seq, next) {
            debug!(seq, frontier = next, "dropping stale tcp segment");
            return Admission::Stale;
        }

        if self.cache.len() >= TCP_CACHE_MAX {
            self.evict_oldest();
        }
        if self.cache.insert(seq, payload.to_vec()).is_none() {
            self.cache_order.push_back(seq);
        }
        self.drain();
        Admission::Accepted
    }

    /// Append every contiguous cached segment at the frontier.
    fn drain(&mut self) {
        let Some(mut next) = self.next_seq else {
            return;
        };
        while let Some(payload) = self.cache.remove(&next) {
            self.assembled.extend_from_slice(&payload);
            next = next.wrapping_add(payload.len() as u32);
        }
        self.next_seq = Some(next);
    }

    /// Drop the oldest 30% of cached segments by insertion order.
    fn evict_oldest(&mut self) {
        warn!(
            cached = self.cache.len(),
            evicting = TCP_CACHE_EVICT,
            "tcp out-of-order cache overflow"
        );
        let mut evicted = 0;
        while evicted < TCP_CACHE_EVICT {
            let Some(seq) = self.cache_order.pop_front() else {
                break;
            };
            if self.cache.remove(&seq).is_some() {
                evicted += 1;
            }
        }
    }

    /// The contiguous byte stream assembled so far. The frame splitter
    /// consumes from the front of this buffer.
    pub fn assembled_mut(&mut self) -> &mut BytesMut {
        &mut self.assembled
    }

    /// No bytes for [`FRAGMENT_TIMEOUT_MS`] on a seeded flow.
    #[must_use]
    pub fn is_idle(&self, now: u64) -> bool {
        self.is_seeded() && now.saturating_sub(self.last_activity_ms) > FRAGMENT_TIMEOUT_MS
    }

    /// Forget everything: frontier, cache, assembled bytes. The flow must be
    /// re-identified afterwards.
    pub fn reset(&mut self) {
        self.next_seq = None;
        self.cache.clear();
        self.cache_order.clear();
        self.assembled.clear();
    }

    #[must_use]
    pub fn cached_segments(&self) -> usize {
        self.cache.len()
    }
}
