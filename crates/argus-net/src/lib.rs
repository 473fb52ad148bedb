//! Passive stream layer: raw IPv4 datagrams in, application frames out.
//!
//! The pipeline is [`wire`] parsing → [`defrag`] → server identification in
//! [`flow`] → [`tcp`] reassembly → [`frame`] splitting, composed by
//! [`router::FlowRouter`]. Everything here is synchronous and allocation
//! -bounded; timestamps come in as caller-provided milliseconds so the layer
//! can be driven with virtual time.

use std::net::Ipv4Addr;

pub mod defrag;
pub mod flow;
pub mod frame;
pub mod router;
pub mod tcp;
pub mod wire;

pub use defrag::IpDefragmenter;
pub use flow::{Identification, ServerIdentifier};
pub use frame::{FrameError, next_frame};
pub use router::{FlowRouter, RouterOutput};
pub use tcp::TcpReassembler;
pub use wire::{Ipv4Datagram, TcpSegment, parse_ipv4, parse_tcp};

/// Fragment entries and idle TCP flows are dropped after this long.
pub const FRAGMENT_TIMEOUT_MS: u64 = 30_000;

/// Upper bound on the out-of-order segment cache.
pub const TCP_CACHE_MAX: usize = 1000;

/// How many cache entries (oldest first) go on overflow: 30% of the cap.
pub const TCP_CACHE_EVICT: usize = 300;

/// Largest admissible application frame, length prefix included.
pub const MAX_FRAME_LEN: usize = 0x000F_FFFF;

/// Payloads longer than this are never scanned for server signatures.
pub const SERVER_IDENTIFICATION_MAX_LEN: usize = 0x0010_0000;

/// One direction of a TCP conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FlowKey {
    pub src: Ipv4Addr,
    pub src_port: u16,
    pub dst: Ipv4Addr,
    pub dst_port: u16,
}

impl FlowKey {
    #[must_use]
    pub const fn new(src: Ipv4Addr, src_port: u16, dst: Ipv4Addr, dst_port: u16) -> Self {
        Self {
            src,
            src_port,
            dst,
            dst_port,
        }
    }

    /// The opposite direction of the same conversation.
    #[must_use]
    pub const fn reversed(self) -> Self {
        Self {
            src: self.dst,
            src_port: self.dst_port,
            dst: self.src,
            dst_port: self.src_port,
        }
    }
}

impl std::fmt::Display for FlowKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}:{} -> {}:{}",
            self.src, self.src_port, self.dst, self.dst_port
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reversed_swaps_endpoints() {
        let key = FlowKey::new(
            Ipv4Addr::new(10, 0, 0, 1),
            4000,
            Ipv4Addr::new(10, 0, 0, 2),
            5000,
        );
        let rev = key.reversed();
        assert_eq!(rev.src, key.dst);
        assert_eq!(rev.src_port, key.dst_port);
        assert_eq!(rev.reversed(), key);
    }
}
