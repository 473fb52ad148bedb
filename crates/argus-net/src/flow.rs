//! Scene-server identification.
//!
//! Until a flow is confirmed as the game's scene server, every captured
//! segment is checked against three signature shapes. The byte tables are
//! game-owned data; the logic only cares about where they sit.
//!
//! Wire layout shared by the signatures: records are `[len: u32 BE]` prefixed
//! with the length including the prefix itself. A framed notify carries a
//! 2-byte type after the outer prefix, with inner records following it.

use byteorder::{BigEndian, ByteOrder};

use crate::{FlowKey, SERVER_IDENTIFICATION_MAX_LEN, frame::FRAME_HEADER_LEN, wire::TcpSegment};

/// `"\0c3SB\0"` at offset 5 of the first record marks a scene-server push.
const SCENE_MAGIC: [u8; 6] = [0x00, 0x63, 0x33, 0x53, 0x42, 0x00];

/// Magic at offset 5 of the first inner record of a framed notify.
const NOTIFY_MAGIC: [u8; 6] = [0x00, 0x06, 0x26, 0xAD, 0x66, 0x00];

/// Login-return packets have this exact payload length...
const LOGIN_RETURN_LEN: usize = 0x62;
/// ...this head (a single record of length 0x62, module 3, command 1)...
const LOGIN_RETURN_HEAD: [u8; 10] = [0x00, 0x00, 0x00, 0x62, 0x00, 0x03, 0x00, 0x00, 0x00, 0x01];
/// ...and this marker at offset 14.
const LOGIN_RETURN_BODY: [u8; 6] = [0x00, 0x00, 0x00, 0x4A, 0x00, 0x02];

/// Type tag of a framed notify in the reverse direction.
const NOTIFY_TYPE: [u8; 2] = [0x00, 0x05];

/// Which signature matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signature {
    /// Forward scene-server push (sig A).
    Scene,
    /// Forward login return (sig B).
    LoginReturn,
    /// Reverse framed notify (sig C); the server is the *destination*.
    FramedNotify,
}

/// A confirmed scene-server flow and where its byte stream starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Identification {
    /// Server→client direction to reassemble.
    pub flow: FlowKey,
    /// Frontier seed for the reassembler.
    pub next_seq: u32,
    pub signature: Signature,
}

/// Tracks which flow, if any, is currently the scene server.
#[derive(Debug, Default)]
pub struct ServerIdentifier {
    current: Option<FlowKey>,
}

impl ServerIdentifier {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn current(&self) -> Option<FlowKey> {
        self.current
    }

    pub fn set_current(&mut self, flow: FlowKey) {
        self.current = Some(flow);
    }

    /// Drop the identity; used when the flow goes idle or resets.
    pub fn invalidate(&mut self) {
        self.current = None;
    }

    /// Check one segment against the signature tables. `key` is the
    /// direction the segment traveled. Packets that do not parse as any
    /// signature are silently ignored.
    #[must_use]
    pub fn try_identify(&self, key: FlowKey, segment: &TcpSegment<'_>) -> Option<Identification> {
        let payload = segment.payload;
        if payload.is_empty() || payload.len() > SERVER_IDENTIFICATION_MAX_LEN {
            return None;
        }

        if matches_scene(payload) {
            return Some(Identification {
                flow: key,
                next_seq: segment.seq.wrapping_add(payload.len() as u32),
                signature: Signature::Scene,
            });
        }
        if matches_login_return(payload) {
            return Some(Identification {
                flow: key,
                next_seq: segment.seq.wrapping_add(payload.len() as u32),
                signature: Signature::LoginReturn,
            });
        }
        if matches_framed_notify(payload) {
            return Some(Identification {
                flow: key.reversed(),
                next_seq: segment.ack,
                signature: Signature::FramedNotify,
            });
        }
        None
    }
}

/// Sig A: byte 4 zero and [`SCENE_MAGIC`] at offset 5 of the first record.
fn matches_scene(payload: &[u8]) -> bool {
    if payload.len() <= FRAME_HEADER_LEN || payload[4] != 0x00 {
        return false;
    }
    let record_len = BigEndian::read_u32(&payload[..FRAME_HEADER_LEN]) as usize;
    if record_len < 11 || record_len > payload.len() {
        return false;
    }
    payload[5..11] == SCENE_MAGIC
}

/// Sig B: exact length plus two fixed byte runs.
fn matches_login_return(payload: &[u8]) -> bool {
    payload.len() == LOGIN_RETURN_LEN
        && payload[..10] == LOGIN_RETURN_HEAD
        && payload[14..20] == LOGIN_RETURN_BODY
}

/// Sig C: notify type tag, then [`NOTIFY_MAGIC`] at offset 5 of the first
/// inner record (payload offset 11).
fn matches_framed_notify(payload: &[u8]) -> bool {
    if payload.len() < 17 || payload[4..6] != NOTIFY_TYPE {
        return false;
    }
    let inner_len = BigEndian::read_u32(&payload[6..10]) as usize;
    if inner_len < 11 || inner_len > payload.len() - 6 {
        return false;
    }
    payload[11..17] == NOTIFY_MAGIC
}

#[cfg(test)]
pub(crate) mod testutil {
    use super::*;

    /// A minimal payload matching sig A.
    pub fn scene_signature_payload() -> Vec<u8> {
        let mut payload = vec![0u8; 32];
        BigEndian::write_u32(&mut payload[..4], 32);
        payload[4] = 0x00;
        payload[5..11].copy_from_slice(&SCENE_MAGIC);
        payload
    }

    /// A minimal payload matching sig B.
    pub fn login_return_payload() -> Vec<u8> {
        let mut payload = vec![0u8; LOGIN_RETURN_LEN];
        payload[..10].copy_from_slice(&LOGIN_RETURN_HEAD);
        payload[14..20].copy_from_slice(&LOGIN_RETURN_BODY);
        payload
    }

    /// A minimal payload matching sig C.
    pub fn framed_notify_payload() -> Vec<u8> {
        let mut payload = vec![0u8; 40];
        BigEndian::write_u32(&mut payload[..4], 40);
        payload[4..6].copy_from_slice(&NOTIFY_TYPE);
        BigEndian::write_u32(&mut payload[6..10], 34);
        payload[11..17].copy_from_slice(&NOTIFY_MAGIC);
        payload
    }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use super::{testutil::*, *};

    fn key() -> FlowKey {
        FlowKey::new(
            Ipv4Addr::new(203, 0, 113, 7),
            7777,
            Ipv4Addr::new(192, 168, 1, 2),
            52000,
        )
    }

    fn segment(payload: &[u8]) -> TcpSegment<'_> {
        TcpSegment {
            src_port: 7777,
            dst_port: 52000,
            seq: 5000,
            ack: 9000,
            payload,
        }
    }

    #[test]
    fn scene_signature_fixes_forward_flow() {
        let identifier = ServerIdentifier::new();
        let payload = scene_signature_payload();
        let id = identifier.try_identify(key(), &segment(&payload)).unwrap();
        assert_eq!(id.signature, Signature::Scene);
        assert_eq!(id.flow, key());
        // The signature packet itself is skipped.
        assert_eq!(id.next_seq, 5000 + payload.len() as u32);
    }

    #[test]
    fn login_return_fixes_forward_flow() {
        let identifier = ServerIdentifier::new();
        let payload = login_return_payload();
        let id = identifier.try_identify(key(), &segment(&payload)).unwrap();
        assert_eq!(id.signature, Signature::LoginReturn);
        assert_eq!(id.flow, key());
    }

    #[test]
    fn framed_notify_fixes_reverse_flow() {
        let identifier = ServerIdentifier::new();
        let payload = framed_notify_payload();
        let id = identifier.try_identify(key(), &segment(&payload)).unwrap();
        assert_eq!(id.signature, Signature::FramedNotify);
        assert_eq!(id.flow, key().reversed());
        assert_eq!(id.next_seq, 9000);
    }

    #[test]
    fn garbage_is_silently_ignored() {
        let identifier = ServerIdentifier::new();
        assert!(identifier.try_identify(key(), &segment(b"")).is_none());
        assert!(identifier.try_identify(key(), &segment(&[0xFF; 64])).is_none());
        // Right length for sig B, wrong bytes.
        assert!(identifier.try_identify(key(), &segment(&[0u8; 0x62])).is_none());
        // Truncated record length for sig A.
        let mut short = scene_signature_payload();
        BigEndian::write_u32(&mut short[..4], 2);
        assert!(identifier.try_identify(key(), &segment(&short)).is_none());
    }

    #[test]
    fn identity_lifecycle() {
        let mut identifier = ServerIdentifier::new();
        assert_eq!(identifier.current(), None);
        identifier.set_current(key());
        assert_eq!(identifier.current(), Some(key()));
        identifier.invalidate();
        assert_eq!(identifier.current(), None);
    }
}
