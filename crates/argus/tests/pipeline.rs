//! Wire-to-engine pipeline: raw IPv4 datagrams in, user aggregates out.
//!
//! Packet fixtures are built by hand here; the byte layouts are wire
//! contracts, so the duplication against the parsers is the point.

use std::{
    path::Path,
    sync::{Arc, Mutex},
};

use argus::{CombatEngine, FightStore, Settings, bus::EventBus, usercache::UserCache};
use argus_net::FlowRouter;
use argus_proto::{PacketDecoder, WireDecoder};
use tokio::sync::Notify;

const SERVER: [u8; 4] = [203, 0, 113, 7];
const CLIENT: [u8; 4] = [192, 168, 1, 2];
const SPORT: u16 = 7777;
const CPORT: u16 = 52000;

fn ipv4_tcp(src: [u8; 4], src_port: u16, dst: [u8; 4], dst_port: u16, seq: u32, payload: &[u8]) -> Vec<u8> {
    let mut tcp = vec![0u8; 20 + payload.len()];
    tcp[0..2].copy_from_slice(&src_port.to_be_bytes());
    tcp[2..4].copy_from_slice(&dst_port.to_be_bytes());
    tcp[4..8].copy_from_slice(&seq.to_be_bytes());
    tcp[12] = 0x50;
    tcp[20..].copy_from_slice(payload);

    let total = 20 + tcp.len();
    let mut ip = vec![0u8; total];
    ip[0] = 0x45;
    ip[2..4].copy_from_slice(&(total as u16).to_be_bytes());
    ip[8] = 64;
    ip[9] = 6;
    ip[12..16].copy_from_slice(&src);
    ip[16..20].copy_from_slice(&dst);
    ip[20..].copy_from_slice(&tcp);
    ip
}

fn from_server(seq: u32, payload: &[u8]) -> Vec<u8> {
    ipv4_tcp(SERVER, SPORT, CLIENT, CPORT, seq, payload)
}

/// A scene-server signature packet: zero at offset 4, `"\0c3SB\0"` at 5.
fn scene_signature() -> Vec<u8> {
    let mut payload = vec![0u8; 32];
    payload[0..4].copy_from_slice(&32u32.to_be_bytes());
    payload[5..11].copy_from_slice(&[0x00, 0x63, 0x33, 0x53, 0x42, 0x00]);
    payload
}

/// One damage record in the reference wire codec.
fn damage_record(attacker: u64, target: u64, skill: u32, value: u64, flags: u8) -> Vec<u8> {
    let mut out = 0x0001u16.to_be_bytes().to_vec();
    out.extend_from_slice(&attacker.to_be_bytes());
    out.extend_from_slice(&target.to_be_bytes());
    out.push(1); // enemy target
    out.extend_from_slice(&skill.to_be_bytes());
    out.push(0); // element
    out.extend_from_slice(&value.to_be_bytes());
    out.push(flags);
    out.extend_from_slice(&0u64.to_be_bytes());
    out
}

/// Wrap records in the frame layout: length prefix, flags byte, body.
fn frame(records: &[u8]) -> Vec<u8> {
    let total = (4 + 1 + records.len()) as u32;
    let mut out = total.to_be_bytes().to_vec();
    out.push(0);
    out.extend_from_slice(records);
    out
}

fn new_engine(dir: &Path) -> CombatEngine {
    CombatEngine::new(
        Settings::default(),
        EventBus::new(),
        FightStore::new(dir.join("logs")),
        Arc::new(Mutex::new(UserCache::load(dir))),
        Arc::new(Notify::new()),
    )
}

#[test]
fn datagrams_become_user_aggregates() {
    let dir = tempfile::tempdir().unwrap();
    let mut engine = new_engine(dir.path());
    let mut router = FlowRouter::new();
    let mut decoder = WireDecoder;

    // Identify the flow.
    let sig = scene_signature();
    let out = router.push_ipv4(&from_server(1000, &sig), 0);
    assert!(out.server_changed);
    let mut seq = 1000 + sig.len() as u32;

    // Two crit hits, delivered out of order at the segment level.
    let mut stream = frame(&damage_record(7, 100, 321, 5000, 0b0001));
    stream.extend_from_slice(&frame(&damage_record(7, 100, 321, 10_000, 0b0001)));
    let (first, second) = stream.split_at(stream.len() / 2);

    let out = router.push_ipv4(
        &from_server(seq + first.len() as u32, second),
        10,
    );
    assert!(out.frames.is_empty());
    let out = router.push_ipv4(&from_server(seq, first), 20);
    assert_eq!(out.frames.len(), 2);
    seq += stream.len() as u32;

    for (i, framed) in out.frames.iter().enumerate() {
        for event in decoder.decode(framed) {
            engine.handle_event(event, 100 + i as u64);
        }
    }

    let user = &engine.users()[&7];
    assert_eq!(user.damage_stats.stats.critical, 15_000);
    assert_eq!(user.damage_stats.count.critical, 2);
    assert!(engine.fight_id().is_some());

    // Stream continues: a lethal hit on a player.
    let mut record = damage_record(100, 9, 50, 4000, 0b1000);
    record[18] = 0; // player target
    let framed = frame(&record);
    let out = router.push_ipv4(&from_server(seq, &framed), 30);
    assert_eq!(out.frames.len(), 1);
    for event in decoder.decode(&out.frames[0]) {
        engine.handle_event(event, 300);
    }
    assert_eq!(engine.users()[&9].taken_damage, 4000);
    assert_eq!(engine.users()[&9].dead_count, 1);
    assert_eq!(engine.recent_damage_len(9), 1);
}
