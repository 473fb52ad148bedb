//! Reference codec for the scene-server frame body.
//!
//! Frame layout (after the 4-byte big-endian length prefix):
//!
//! ```text
//! [flags: u8] [body]
//! ```
//!
//! Bit 0 of `flags` marks a zstd-compressed body. The (plain) body is a
//! sequence of records, each `[opcode: u16 BE]` followed by fixed-width
//! fields; strings are `[len: u16 BE][utf8]`. Records the catalogue does not
//! know stop the frame — partial understanding of a frame is normal while
//! the catalogue trails the game.

use crate::{AttrKey, AttrValue, Element, EntityKind, GameEvent, PacketDecoder};

const FLAG_COMPRESSED: u8 = 0b0000_0001;

const OP_DAMAGE: u16 = 0x0001;
const OP_HEALING: u16 = 0x0002;
const OP_ATTR: u16 = 0x0003;
const OP_DEATH: u16 = 0x0004;

const ATTR_HP: u8 = 0;
const ATTR_MAX_HP: u8 = 1;
const ATTR_NAME: u8 = 2;
const ATTR_PROFESSION: u8 = 3;
const ATTR_FIGHT_POINT: u8 = 4;
const ATTR_ATTR_ID: u8 = 5;

const DMG_CRIT: u8 = 0b0000_0001;
const DMG_LUCKY: u8 = 0b0000_0010;
const DMG_CAUSE_LUCKY: u8 = 0b0000_0100;
const DMG_LETHAL: u8 = 0b0000_1000;

/// Stateless decoder for the reference wire layout.
#[derive(Debug, Default, Clone, Copy)]
pub struct WireDecoder;

impl PacketDecoder for WireDecoder {
    fn decode(&mut self, frame: &[u8]) -> Vec<GameEvent> {
        let Some(body) = frame.get(4..) else {
            return Vec::new();
        };
        let Some((&flags, body)) = body.split_first() else {
            return Vec::new();
        };

        if flags & FLAG_COMPRESSED != 0 {
            match zstd::decode_all(body) {
                Ok(plain) => decode_records(&plain),
                Err(_) => Vec::new(),
            }
        } else {
            decode_records(body)
        }
    }
}

fn decode_records(mut body: &[u8]) -> Vec<GameEvent> {
    let mut events = Vec::new();
    while let Some((event, rest)) = decode_record(body) {
        events.push(event);
        body = rest;
    }
    events
}

fn decode_record(body: &[u8]) -> Option<(GameEvent, &[u8])> {
    let mut r = Reader(body);
    let event = match r.u16()? {
        OP_DAMAGE => {
            let attacker = r.u64()?;
            let target = r.u64()?;
            let target_kind = entity_kind(r.u8()?);
            let skill_id = u64::from(r.u32()?);
            let element = Element::from_wire(u32::from(r.u8()?));
            let value = r.u64()?;
            let flags = r.u8()?;
            let hp_lessen = r.u64()?;
            GameEvent::Damage {
                attacker,
                target,
                target_kind,
                skill_id,
                element,
                value,
                is_crit: flags & DMG_CRIT != 0,
                is_lucky: flags & DMG_LUCKY != 0,
                is_cause_lucky: flags & DMG_CAUSE_LUCKY != 0,
                hp_lessen,
                lethal: flags & DMG_LETHAL != 0,
            }
        }
        OP_HEALING => {
            let healer = r.u64()?;
            let target = r.u64()?;
            let skill_id = u64::from(r.u32()?);
            let element = Element::from_wire(u32::from(r.u8()?));
            let value = r.u64()?;
            let flags = r.u8()?;
            GameEvent::Healing {
                healer,
                target,
                skill_id,
                element,
                value,
                is_crit: flags & DMG_CRIT != 0,
                is_lucky: flags & DMG_LUCKY != 0,
                is_cause_lucky: flags & DMG_CAUSE_LUCKY != 0,
            }
        }
        OP_ATTR => {
            let entity = r.u64()?;
            let kind = entity_kind(r.u8()?);
            let (key, value) = match r.u8()? {
                ATTR_HP => (AttrKey::Hp, AttrValue::Int(r.u64()?)),
                ATTR_MAX_HP => (AttrKey::MaxHp, AttrValue::Int(r.u64()?)),
                ATTR_NAME => (AttrKey::Name, AttrValue::Text(r.string()?)),
                ATTR_PROFESSION => (AttrKey::Profession, AttrValue::Text(r.string()?)),
                ATTR_FIGHT_POINT => (AttrKey::FightPoint, AttrValue::Int(r.u64()?)),
                ATTR_ATTR_ID => (AttrKey::AttrId, AttrValue::Int(r.u64()?)),
                _ => return None,
            };
            GameEvent::Attr {
                entity,
                kind,
                key,
                value,
            }
        }
        OP_DEATH => {
            let victim = r.u64()?;
            let killer = match r.u64()? {
                0 => None,
                id => Some(id),
            };
            GameEvent::Death { victim, killer }
        }
        _ => return None,
    };
    Some((event, r.0))
}

const fn entity_kind(raw: u8) -> EntityKind {
    if raw == 0 {
        EntityKind::Player
    } else {
        EntityKind::Enemy
    }
}

struct Reader<'a>(&'a [u8]);

impl Reader<'_> {
    fn u8(&mut self) -> Option<u8> {
        let (&v, rest) = self.0.split_first()?;
        self.0 = rest;
        Some(v)
    }

    fn u16(&mut self) -> Option<u16> {
        let (head, rest) = self.0.split_at_checked(2)?;
        self.0 = rest;
        Some(u16::from_be_bytes([head[0], head[1]]))
    }

    fn u32(&mut self) -> Option<u32> {
        let (head, rest) = self.0.split_at_checked(4)?;
        self.0 = rest;
        Some(u32::from_be_bytes([head[0], head[1], head[2], head[3]]))
    }

    fn u64(&mut self) -> Option<u64> {
        let (head, rest) = self.0.split_at_checked(8)?;
        self.0 = rest;
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(head);
        Some(u64::from_be_bytes(bytes))
    }

    fn string(&mut self) -> Option<String> {
        let len = usize::from(self.u16()?);
        let (head, rest) = self.0.split_at_checked(len)?;
        self.0 = rest;
        String::from_utf8(head.to_vec()).ok()
    }
}

#[cfg(test)]
pub(crate) mod testutil {
    //! Encoders mirroring the decoder, for pipeline tests.

    use super::*;

    pub fn encode_damage(
        attacker: u64,
        target: u64,
        target_kind: EntityKind,
        skill_id: u32,
        value: u64,
        is_crit: bool,
        is_lucky: bool,
        lethal: bool,
    ) -> Vec<u8> {
        let mut out = OP_DAMAGE.to_be_bytes().to_vec();
        out.extend_from_slice(&attacker.to_be_bytes());
        out.extend_from_slice(&target.to_be_bytes());
        out.push(u8::from(target_kind == EntityKind::Enemy));
        out.extend_from_slice(&skill_id.to_be_bytes());
        out.push(0);
        out.extend_from_slice(&value.to_be_bytes());
        let mut flags = 0;
        if is_crit {
            flags |= DMG_CRIT;
        }
        if is_lucky {
            flags |= DMG_LUCKY;
        }
        if lethal {
            flags |= DMG_LETHAL;
        }
        out.push(flags);
        out.extend_from_slice(&0u64.to_be_bytes());
        out
    }

    pub fn encode_death(victim: u64, killer: Option<u64>) -> Vec<u8> {
        let mut out = OP_DEATH.to_be_bytes().to_vec();
        out.extend_from_slice(&victim.to_be_bytes());
        out.extend_from_slice(&killer.unwrap_or(0).to_be_bytes());
        out
    }

    /// Wrap records into a full frame (length prefix + flags), optionally
    /// zstd-compressing the body.
    pub fn frame(records: &[u8], compressed: bool) -> Vec<u8> {
        let body = if compressed {
            zstd::encode_all(records, 0).unwrap()
        } else {
            records.to_vec()
        };
        let total = 4 + 1 + body.len();
        let mut out = (total as u32).to_be_bytes().to_vec();
        out.push(if compressed { FLAG_COMPRESSED } else { 0 });
        out.extend_from_slice(&body);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::{testutil::*, *};

    #[test]
    fn decodes_plain_damage_record() {
        let records = encode_damage(7, 100, EntityKind::Enemy, 321, 5000, true, false, false);
        let frame = frame(&records, false);

        let events = WireDecoder.decode(&frame);
        assert_eq!(events.len(), 1);
        let GameEvent::Damage {
            attacker,
            target,
            skill_id,
            value,
            is_crit,
            is_lucky,
            ..
        } = &events[0]
        else {
            panic!("expected damage event");
        };
        assert_eq!((*attacker, *target), (7, 100));
        assert_eq!(*skill_id, 321);
        assert_eq!(*value, 5000);
        assert!(is_crit);
        assert!(!is_lucky);
    }

    #[test]
    fn decodes_compressed_body() {
        let mut records = encode_damage(1, 2, EntityKind::Enemy, 10, 99, false, true, false);
        records.extend_from_slice(&encode_death(9, Some(100)));
        let frame = frame(&records, true);

        let events = WireDecoder.decode(&frame);
        assert_eq!(events.len(), 2);
        assert!(matches!(
            events[1],
            GameEvent::Death {
                victim: 9,
                killer: Some(100)
            }
        ));
    }

    #[test]
    fn unknown_opcode_stops_the_frame() {
        let mut records = encode_death(5, None);
        records.extend_from_slice(&0xBEEFu16.to_be_bytes());
        records.extend_from_slice(&[1, 2, 3]);
        let frame = frame(&records, false);

        let events = WireDecoder.decode(&frame);
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn truncated_and_garbage_frames_yield_nothing() {
        assert!(WireDecoder.decode(&[]).is_empty());
        assert!(WireDecoder.decode(&[0, 0, 0, 4]).is_empty());
        // Compressed flag with a body that is not zstd.
        let mut bad = vec![0, 0, 0, 9, FLAG_COMPRESSED];
        bad.extend_from_slice(b"nope");
        assert!(WireDecoder.decode(&bad).is_empty());
    }
}
