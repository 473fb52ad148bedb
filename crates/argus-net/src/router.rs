//! Composition of the stream layer: datagram in, application frames out.

use bytes::Bytes;
use tracing::{debug, info, warn};

use crate::{
    FlowKey, IpDefragmenter, ServerIdentifier, TcpReassembler,
    frame::drain_frames,
    wire::{IP_PROTO_TCP, parse_ipv4, parse_tcp},
};

/// What one datagram produced.
#[derive(Debug, Default)]
pub struct RouterOutput {
    /// A (new) scene server was identified; combat state should clear.
    pub server_changed: bool,
    /// The identified flow went idle and was forgotten.
    pub identity_lost: bool,
    /// Complete application frames, oldest first.
    pub frames: Vec<Bytes>,
}

/// Owns the defragmenter, the server identity, and the one active
/// reassembler. Single-threaded by design; the engine task is its only
/// caller, which is the exclusive section the reassembler needs.
#[derive(Debug, Default)]
pub struct FlowRouter {
    defrag: IpDefragmenter,
    identifier: ServerIdentifier,
    reassembler: TcpReassembler,
}

impl FlowRouter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn server(&self) -> Option<FlowKey> {
        self.identifier.current()
    }

    /// Feed one raw IPv4 datagram (link header already stripped).
    pub fn push_ipv4(&mut self, raw: &[u8], now: u64) -> RouterOutput {
        let mut out = RouterOutput::default();
        let Some(dgram) = parse_ipv4(raw) else {
            debug!("unparseable ipv4 datagram");
            return out;
        };
        if dgram.protocol != IP_PROTO_TCP {
            return out;
        }

        if dgram.is_fragment() {
            let (src, dst) = (dgram.src, dgram.dst);
            if let Some(whole) = self.defrag.push(&dgram, now) {
                self.handle_tcp(src, dst, &whole, now, &mut out);
            }
            return out;
        }
        let (src, dst, payload) = (dgram.src, dgram.dst, dgram.payload);
        self.handle_tcp(src, dst, payload, now, &mut out);
        out
    }

    fn handle_tcp(
        &mut self,
        src: std::net::Ipv4Addr,
        dst: std::net::Ipv4Addr,
        transport: &[u8],
        now: u64,
        out: &mut RouterOutput,
    ) {
        let Some(segment) = parse_tcp(transport) else {
            debug!("unparseable tcp segment");
            return;
        };
        let key = FlowKey::new(src, segment.src_port, dst, segment.dst_port);

        if self.reassembler.is_idle(now) {
            self.forget_identity();
            out.identity_lost = true;
        }

        if self.identifier.current() == Some(key) {
            self.reassembler.push(segment.seq, segment.payload, now);
            let (frames, err) = drain_frames(self.reassembler.assembled_mut());
            if let Some(err) = err {
                warn!(%err, flow = %key, "corrupt frame stream");
            }
            out.frames = frames;
            return;
        }

        if let Some(id) = self.identifier.try_identify(key, &segment) {
            info!(flow = %id.flow, signature = ?id.signature, "scene server identified");
            self.identifier.set_current(id.flow);
            self.reassembler.seed(id.next_seq, now);
            out.server_changed = true;
        }
    }

    /// Periodic idle check; returns `true` when the identity was dropped.
    pub fn check_idle(&mut self, now: u64) -> bool {
        if self.reassembler.is_idle(now) {
            self.forget_identity();
            return true;
        }
        false
    }

    fn forget_identity(&mut self) {
        warn!("scene-server flow idle; resetting stream state");
        self.reassembler.reset();
        self.identifier.invalidate();
    }

    /// Janitor for the fragment cache.
    pub fn evict_fragments(&mut self, now: u64) -> usize {
        self.defrag.evict_expired(now)
    }
}
