//! Typed events decoded from scene-server frames, and the decoder contract
//! the combat engine consumes them through.
//!
//! The opcode catalogue of the game protocol is data owned by the game and
//! lives behind the [`PacketDecoder`] trait; everything downstream of the
//! frame splitter dispatches on [`GameEvent`] alone.

use serde::{Deserialize, Serialize};

mod capability;
pub mod wire;

pub use capability::{CapabilityError, verify_decompression};
pub use wire::WireDecoder;

/// Entity ids as carried on the wire.
pub type EntityId = u64;

/// Whether an entity is a player character or an NPC/monster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Player,
    Enemy,
}

/// Damage school of a hit. The wire carries a small integer; unknown values
/// map to [`Element::General`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Element {
    General,
    Fire,
    Ice,
    Thunder,
    Wind,
    Earth,
    Light,
    Dark,
}

impl Element {
    #[must_use]
    pub const fn from_wire(raw: u32) -> Self {
        match raw {
            1 => Self::Fire,
            2 => Self::Ice,
            3 => Self::Thunder,
            4 => Self::Wind,
            5 => Self::Earth,
            6 => Self::Light,
            7 => Self::Dark,
            _ => Self::General,
        }
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::General => "general",
            Self::Fire => "fire",
            Self::Ice => "ice",
            Self::Thunder => "thunder",
            Self::Wind => "wind",
            Self::Earth => "earth",
            Self::Light => "light",
            Self::Dark => "dark",
        }
    }
}

/// Attribute keys the engine reacts to. Anything else a decoder surfaces is
/// carried as [`AttrKey::Other`] and stored verbatim in the user attribute
/// map.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttrKey {
    Hp,
    MaxHp,
    Name,
    Profession,
    FightPoint,
    AttrId,
    Other(String),
}

/// Attribute values are either numeric or text on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    Int(u64),
    Text(String),
}

impl AttrValue {
    #[must_use]
    pub fn as_int(&self) -> Option<u64> {
        match self {
            Self::Int(v) => Some(*v),
            Self::Text(_) => None,
        }
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Int(_) => None,
            Self::Text(s) => Some(s),
        }
    }
}

/// One decoded game event. Replaces the upstream class hierarchy with a
/// tagged variant carried on a channel from decoder to engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GameEvent {
    Damage {
        attacker: EntityId,
        target: EntityId,
        target_kind: EntityKind,
        skill_id: u64,
        element: Element,
        value: u64,
        is_crit: bool,
        is_lucky: bool,
        is_cause_lucky: bool,
        hp_lessen: u64,
        /// The hit killed its target.
        lethal: bool,
    },
    Healing {
        healer: EntityId,
        target: EntityId,
        skill_id: u64,
        element: Element,
        value: u64,
        is_crit: bool,
        is_lucky: bool,
        is_cause_lucky: bool,
    },
    Attr {
        entity: EntityId,
        kind: EntityKind,
        key: AttrKey,
        value: AttrValue,
    },
    Death {
        victim: EntityId,
        killer: Option<EntityId>,
    },
}

/// Decodes one protocol frame (length prefix included) into game events.
///
/// Implementations own any per-frame decryption/decompression; frames that
/// fail to parse must return an empty vec rather than an error, since
/// unidentified traffic routinely reaches the decoder during server
/// identification.
pub trait PacketDecoder: Send {
    fn decode(&mut self, frame: &[u8]) -> Vec<GameEvent>;
}

/// A decoder that ignores every frame. Used where a pipeline is exercised
/// without the game-owned opcode catalogue.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullDecoder;

impl PacketDecoder for NullDecoder {
    fn decode(&mut self, _frame: &[u8]) -> Vec<GameEvent> {
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn element_wire_mapping_is_total() {
        assert_eq!(Element::from_wire(1), Element::Fire);
        assert_eq!(Element::from_wire(7), Element::Dark);
        assert_eq!(Element::from_wire(0), Element::General);
        assert_eq!(Element::from_wire(999), Element::General);
    }

    #[test]
    fn game_event_json_is_tagged() {
        let event = GameEvent::Death {
            victim: 9,
            killer: Some(100),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "death");
        assert_eq!(json["victim"], 9);
    }

    #[test]
    fn attr_value_accessors() {
        let v = AttrValue::Int(12);
        assert_eq!(v.as_int(), Some(12));
        assert_eq!(v.as_text(), None);

        let v = AttrValue::Text("Drake".into());
        assert_eq!(v.as_text(), Some("Drake"));
        assert_eq!(v.as_int(), None);
    }

    #[test]
    fn null_decoder_swallows_frames() {
        let mut decoder = NullDecoder;
        assert!(decoder.decode(&[0, 0, 0, 4]).is_empty());
    }
}
