use std::{net::SocketAddr, path::PathBuf};

use anyhow::Context;
use argus::{
    EngineConfig,
    config::{self, NETWORK_SETTINGS_FILE, NetworkSettings, SETTINGS_FILE, Settings},
    control_channel, run_engine,
};
use argus_capture::{DeviceSelection, FRAME_QUEUE_CAP, list_devices, resolve_device, spawn_capture};
use argus_proto::WireDecoder;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, Registry, layer::SubscriberExt};

/// Passive combat telemetry daemon.
#[derive(Parser)]
struct Args {
    /// Capture adapter index, or "auto". Overrides networkSettings.json.
    #[clap(short, long)]
    device: Option<String>,

    /// Directory for fight logs.
    #[clap(long, default_value = "./logs")]
    logs_dir: PathBuf,

    /// Directory for settings.json, networkSettings.json, and users.json.
    #[clap(long, default_value = ".")]
    data_dir: PathBuf,

    /// WebSocket listen address for the event fan-out.
    #[clap(short, long, default_value = "127.0.0.1:8989")]
    listen: SocketAddr,

    /// Print capture devices and exit.
    #[clap(long)]
    list_devices: bool,
}

fn setup_logging() {
    tracing::subscriber::set_global_default(
        Registry::default()
            .with(EnvFilter::from_default_env())
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_file(true)
                    .with_line_number(true),
            ),
    )
    .expect("setup tracing subscribers");
}

#[expect(
    clippy::print_stdout,
    reason = "--list-devices output is the command's product"
)]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    setup_logging();
    let args = Args::parse();

    // Decoders assume zstd; refuse to start without it.
    argus_proto::verify_decompression().context("decompression self-check failed")?;

    if args.list_devices {
        for device in list_devices()? {
            println!(
                "{:>3}  {}  {}",
                device.index,
                device.name,
                device.description.unwrap_or_default()
            );
        }
        return Ok(());
    }

    let settings: Settings = config::load_or_default(&args.data_dir.join(SETTINGS_FILE));
    let network: NetworkSettings =
        config::load_or_default(&args.data_dir.join(NETWORK_SETTINGS_FILE));
    let selection = match &args.device {
        Some(raw) => raw
            .parse::<DeviceSelection>()
            .context("--device must be an index or \"auto\"")?,
        None => network.selected_adapter.to_selection(),
    };
    let device = resolve_device(selection)?;
    info!(device = %device.name, "selected capture adapter");

    let (frame_tx, frame_rx) = kanal::bounded(FRAME_QUEUE_CAP);
    let capture = spawn_capture(device, frame_tx)?;

    let bus = argus::EventBus::new();
    let (control, commands) = control_channel();
    let shutdown = CancellationToken::new();

    tokio::spawn({
        let bus = bus.clone();
        let shutdown = shutdown.clone();
        async move {
            if let Err(err) = argus::ws::serve(args.listen, bus, shutdown).await {
                error!(%err, "websocket endpoint failed");
            }
        }
    });

    let mut engine = tokio::spawn(run_engine(
        EngineConfig {
            settings,
            logs_dir: args.logs_dir,
            data_dir: args.data_dir,
        },
        frame_rx,
        Box::new(WireDecoder),
        bus,
        commands,
        shutdown.clone(),
    ));

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received");
            if control.stop().await.is_err() {
                info!("engine already stopped");
            }
            report_engine_exit((&mut engine).await);
        }
        result = &mut engine => report_engine_exit(result),
    }

    shutdown.cancel();
    capture.stop();
    info!("bye");
    Ok(())
}

fn report_engine_exit(result: Result<anyhow::Result<()>, tokio::task::JoinError>) {
    match result {
        Ok(Ok(())) => info!("engine finished"),
        Ok(Err(err)) => error!(%err, "engine failed"),
        Err(err) => error!(%err, "engine task panicked"),
    }
}
