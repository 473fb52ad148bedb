//! Packet capture: device selection, the blocking pcap read loop, and
//! link-layer demultiplexing down to raw IPv4 datagrams.

use thiserror::Error;

pub mod device;
pub mod link;
mod source;

pub use device::{DeviceInfo, DeviceSelection, list_devices, resolve_device};
pub use link::{LinkType, ipv4_payload};
pub use source::{CaptureHandle, spawn_capture};

/// BPF filter installed on every capture handle.
pub const CAPTURE_FILTER: &str = "ip and tcp";

/// Kernel buffer for the capture handle.
pub const CAPTURE_BUFFER_BYTES: i32 = 10 * 1024 * 1024;

pub const CAPTURE_SNAPLEN: i32 = 65535;

/// Capacity of the capture→engine frame queue.
pub const FRAME_QUEUE_CAP: usize = 8192;

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error(transparent)]
    Pcap(#[from] pcap::Error),
    #[error("link type {0} is not supported on this device")]
    UnsupportedLinkType(i32),
    #[error("no capture device available")]
    NoDevice,
    #[error("adapter index {0} does not exist")]
    BadIndex(usize),
}
