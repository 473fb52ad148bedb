//! The blocking capture loop.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread::JoinHandle,
    time::{Duration, Instant},
};

use tracing::{error, info, warn};

use crate::{
    CAPTURE_BUFFER_BYTES, CAPTURE_FILTER, CAPTURE_SNAPLEN, CaptureError, LinkType, ipv4_payload,
};

/// Minimum spacing of drop warnings when the frame queue saturates.
const DROP_LOG_PERIOD: Duration = Duration::from_secs(5);

/// Read timeout so the loop observes the shutdown flag.
const READ_TIMEOUT_MS: i32 = 1000;

/// Running capture thread. `stop` flips the flag and joins.
pub struct CaptureHandle {
    shutdown: Arc<AtomicBool>,
    join: JoinHandle<()>,
}

impl CaptureHandle {
    pub fn stop(self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if self.join.join().is_err() {
            error!("capture thread panicked");
        }
    }
}

/// Open `device`, install the TCP filter, and start the read loop on a
/// dedicated thread. Raw IPv4 datagrams land in `frames`; when the queue is
/// full the frame is dropped so capture never applies backpressure upstream.
pub fn spawn_capture(
    device: pcap::Device,
    frames: kanal::Sender<Vec<u8>>,
) -> Result<CaptureHandle, CaptureError> {
    let name = device.name.clone();
    let mut capture = pcap::Capture::from_device(device)?
        .snaplen(CAPTURE_SNAPLEN)
        .buffer_size(CAPTURE_BUFFER_BYTES)
        .timeout(READ_TIMEOUT_MS)
        .immediate_mode(true)
        .open()?;
    capture.filter(CAPTURE_FILTER, true)?;
    let link = LinkType::from_pcap(capture.get_datalink())?;
    info!(device = %name, ?link, "capture started");

    let shutdown = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&shutdown);
    let join = std::thread::Builder::new()
        .name("argus-capture".into())
        .spawn(move || read_loop(capture, link, &frames, &flag))
        .expect("spawn capture thread");

    Ok(CaptureHandle { shutdown, join })
}

fn read_loop(
    mut capture: pcap::Capture<pcap::Active>,
    link: LinkType,
    frames: &kanal::Sender<Vec<u8>>,
    shutdown: &AtomicBool,
) {
    let mut dropped: u64 = 0;
    let mut last_drop_log: Option<Instant> = None;

    while !shutdown.load(Ordering::Relaxed) {
        let packet = match capture.next_packet() {
            Ok(packet) => packet,
            Err(pcap::Error::TimeoutExpired) => continue,
            Err(err) => {
                warn!(%err, "capture read error");
                continue;
            }
        };
        let Some(datagram) = ipv4_payload(link, packet.data) else {
            continue;
        };
        match frames.try_send(datagram.to_vec()) {
            Ok(true) => {}
            Ok(false) => {
                dropped += 1;
                if last_drop_log.is_none_or(|at| at.elapsed() >= DROP_LOG_PERIOD) {
                    warn!(dropped, "frame queue full; dropping capture frames");
                    last_drop_log = Some(Instant::now());
                }
            }
            Err(_) => break,
        }
    }
    info!("capture loop stopped");
}
