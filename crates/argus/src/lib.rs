//! Argus: passive combat telemetry.
//!
//! Pipeline: pcap capture (`argus-capture`) → stream reassembly
//! (`argus-net`) → protocol decode (`argus-proto`) → [`engine`] → bus,
//! fight files, and the WebSocket adapter. The daemon binary wires it all
//! together; everything here is usable as a library with a custom
//! [`argus_proto::PacketDecoder`].

pub mod bus;
pub mod config;
pub mod engine;
pub mod persist;
pub mod runtime;
pub mod usercache;
pub mod ws;

pub use bus::{BusEvent, EventBus, UserSummary};
pub use config::{NetworkSettings, Settings};
pub use engine::CombatEngine;
pub use persist::FightStore;
pub use runtime::{Control, EngineConfig, control_channel, run_engine};
