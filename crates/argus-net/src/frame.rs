//! Length-prefixed record framing.
//!
//! Every application frame starts with a 4-byte big-endian total length that
//! includes the length field itself. A length outside `4..=MAX_FRAME_LEN`
//! means the stream is corrupt beyond recovery at this point, so the whole
//! assembly buffer is flushed and the flow keeps going from fresh bytes.

use byteorder::{BigEndian, ByteOrder};
use bytes::{Bytes, BytesMut};
use thiserror::Error;

use crate::MAX_FRAME_LEN;

/// Size of the length prefix, and the smallest legal frame.
pub const FRAME_HEADER_LEN: usize = 4;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("frame length {len:#x} outside {FRAME_HEADER_LEN}..={MAX_FRAME_LEN:#x}; buffer flushed")]
pub struct FrameError {
    pub len: usize,
}

/// Pop the next complete frame off the front of `buf`.
///
/// `Ok(None)` means more bytes are needed. On `Err` the buffer has been
/// flushed; callers log and keep feeding the flow.
pub fn next_frame(buf: &mut BytesMut) -> Result<Option<Bytes>, FrameError> {
    if buf.len() < FRAME_HEADER_LEN {
        return Ok(None);
    }
    let len = BigEndian::read_u32(&buf[..FRAME_HEADER_LEN]) as usize;
    if !(FRAME_HEADER_LEN..=MAX_FRAME_LEN).contains(&len) {
        buf.clear();
        return Err(FrameError { len });
    }
    if buf.len() < len {
        return Ok(None);
    }
    Ok(Some(buf.split_to(len).freeze()))
}

/// Drain every complete frame currently in `buf`.
pub fn drain_frames(buf: &mut BytesMut) -> (Vec<Bytes>, Option<FrameError>) {
    let mut frames = Vec::new();
    loop {
        match next_frame(buf) {
            Ok(Some(frame)) => frames.push(frame),
            Ok(None) => return (frames, None),
            Err(err) => return (frames, Some(err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn framed(body: &[u8]) -> Vec<u8> {
        let mut out = vec![0u8; FRAME_HEADER_LEN];
        BigEndian::write_u32(&mut out, (body.len() + FRAME_HEADER_LEN) as u32);
        out.extend_from_slice(body);
        out
    }

    #[test]
    fn splits_back_to_back_frames() {
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&framed(b"first"));
        buf.extend_from_slice(&framed(b"second"));

        let (frames, err) = drain_frames(&mut buf);
        assert!(err.is_none());
        assert_eq!(frames.len(), 2);
        assert_eq!(&frames[0][FRAME_HEADER_LEN..], b"first");
        assert_eq!(&frames[1][FRAME_HEADER_LEN..], b"second");
        assert!(buf.is_empty());
    }

    #[test]
    fn waits_for_partial_frame() {
        let mut buf = BytesMut::new();
        let whole = framed(b"payload");
        buf.extend_from_slice(&whole[..6]);

        assert_eq!(next_frame(&mut buf), Ok(None));
        buf.extend_from_slice(&whole[6..]);
        let frame = next_frame(&mut buf).unwrap().unwrap();
        assert_eq!(&frame[FRAME_HEADER_LEN..], b"payload");
    }

    #[test]
    fn waits_below_four_bytes() {
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&[0, 0]);
        assert_eq!(next_frame(&mut buf), Ok(None));
        assert_eq!(buf.len(), 2);
    }

    #[test]
    fn length_four_is_an_empty_body() {
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&framed(b""));
        let frame = next_frame(&mut buf).unwrap().unwrap();
        assert_eq!(frame.len(), FRAME_HEADER_LEN);
        assert!(frame[FRAME_HEADER_LEN..].is_empty());
    }

    #[test]
    fn undersized_length_flushes() {
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&[0, 0, 0, 3, 9, 9, 9]);
        let err = next_frame(&mut buf).unwrap_err();
        assert_eq!(err.len, 3);
        assert!(buf.is_empty());
    }

    #[test]
    fn oversized_length_flushes() {
        let mut buf = BytesMut::new();
        // 0x100000 is one past MAX_FRAME_LEN.
        buf.extend_from_slice(&[0x00, 0x10, 0x00, 0x00]);
        buf.extend_from_slice(&[0u8; 64]);
        let err = next_frame(&mut buf).unwrap_err();
        assert_eq!(err.len, 0x0010_0000);
        assert!(buf.is_empty());
    }

    #[test]
    fn frames_before_corruption_are_delivered() {
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&framed(b"good"));
        buf.extend_from_slice(&[0, 0, 0, 1]);

        let (frames, err) = drain_frames(&mut buf);
        assert_eq!(frames.len(), 1);
        assert_eq!(err, Some(FrameError { len: 1 }));
        assert!(buf.is_empty());
    }
}
