//! Task composition: the engine loop, its periodic ticks, the debounced
//! user-cache writer, and the external command surface.
//!
//! All combat state lives inside the engine task; the capture thread only
//! touches the frame queue, and everything else talks to the engine through
//! [`Control`] or observes it through the bus.

use std::{
    path::PathBuf,
    sync::{Arc, Mutex},
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use anyhow::Context;
use argus_net::FlowRouter;
use argus_proto::PacketDecoder;
use tokio::{sync::Notify, time::MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::{
    bus::EventBus,
    config::Settings,
    engine::CombatEngine,
    persist::FightStore,
    usercache::{SharedUserCache, USER_CACHE_DEBOUNCE_MS, UserCache},
};

/// Snapshot broadcast cadence (10 Hz).
pub const SNAPSHOT_PERIOD_MS: u64 = 100;

/// Fight-timeout scan cadence.
pub const TIMEOUT_TICK_MS: u64 = 5000;

/// Fragment janitor and fight autosave cadence.
pub const AUTOSAVE_TICK_MS: u64 = 10_000;

/// Milliseconds since the Unix epoch.
#[must_use]
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Commands the outside world may send the engine task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Pause(bool),
    Clear,
    SetFightTimeout(u64),
    DeleteUser(u64),
    RefreshEnemies,
    Stop,
}

/// Cloneable handle for sending [`Command`]s.
#[derive(Debug, Clone)]
pub struct Control {
    tx: kanal::AsyncSender<Command>,
}

impl Control {
    pub async fn pause(&self, paused: bool) -> anyhow::Result<()> {
        self.send(Command::Pause(paused)).await
    }

    pub async fn clear(&self) -> anyhow::Result<()> {
        self.send(Command::Clear).await
    }

    pub async fn set_fight_timeout(&self, timeout_ms: u64) -> anyhow::Result<()> {
        self.send(Command::SetFightTimeout(timeout_ms)).await
    }

    pub async fn delete_user(&self, uid: u64) -> anyhow::Result<()> {
        self.send(Command::DeleteUser(uid)).await
    }

    pub async fn refresh_enemies(&self) -> anyhow::Result<()> {
        self.send(Command::RefreshEnemies).await
    }

    pub async fn stop(&self) -> anyhow::Result<()> {
        self.send(Command::Stop).await
    }

    async fn send(&self, command: Command) -> anyhow::Result<()> {
        self.tx
            .send(command)
            .await
            .context("engine task is gone")
    }
}

/// Build the command channel shared by [`Control`] and the engine loop.
#[must_use]
pub fn control_channel() -> (Control, kanal::AsyncReceiver<Command>) {
    let (tx, rx) = kanal::bounded_async(64);
    (Control { tx }, rx)
}

/// Filesystem roots and behavior switches for one engine instance.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub settings: Settings,
    /// Fight directories land here.
    pub logs_dir: PathBuf,
    /// `users.json` lives here.
    pub data_dir: PathBuf,
}

/// Drive the engine until the capture channel closes, a `Stop` command
/// arrives, or `shutdown` fires. Owns the full ingest pipeline from raw
/// IPv4 datagrams to bus events and fight files.
pub async fn run_engine(
    config: EngineConfig,
    frames: kanal::Receiver<Vec<u8>>,
    mut decoder: Box<dyn PacketDecoder>,
    bus: EventBus,
    commands: kanal::AsyncReceiver<Command>,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let store = FightStore::new(&config.logs_dir);
    let user_cache: SharedUserCache = Arc::new(Mutex::new(UserCache::load(&config.data_dir)));
    let dirty = Arc::new(Notify::new());
    let mut engine = CombatEngine::new(
        config.settings,
        bus,
        store,
        Arc::clone(&user_cache),
        Arc::clone(&dirty),
    );
    let mut router = FlowRouter::new();

    let cache_task = tokio::spawn(debounce_user_cache(
        Arc::clone(&user_cache),
        Arc::clone(&dirty),
        shutdown.clone(),
    ));

    let frames = frames.to_async();
    let mut snapshot = tokio::time::interval(Duration::from_millis(SNAPSHOT_PERIOD_MS));
    snapshot.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut timeout_tick = tokio::time::interval(Duration::from_millis(TIMEOUT_TICK_MS));
    timeout_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut janitor = tokio::time::interval(Duration::from_millis(AUTOSAVE_TICK_MS));
    janitor.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            datagram = frames.recv() => {
                let Ok(datagram) = datagram else {
                    info!("capture channel closed");
                    break;
                };
                let now = now_ms();
                let output = router.push_ipv4(&datagram, now);
                if output.identity_lost || output.server_changed {
                    engine.on_server_change(now);
                }
                for frame in &output.frames {
                    for event in decoder.decode(frame) {
                        engine.handle_event(event, now);
                    }
                }
            }
            command = commands.recv() => {
                match command {
                    Ok(Command::Stop) | Err(_) => break,
                    Ok(command) => apply_command(&mut engine, command, now_ms()),
                }
            }
            _ = snapshot.tick() => engine.tick_snapshot(now_ms()),
            _ = timeout_tick.tick() => {
                let now = now_ms();
                engine.tick_timeout(now);
                if router.check_idle(now) {
                    engine.on_server_change(now);
                }
            }
            _ = janitor.tick() => {
                let now = now_ms();
                router.evict_fragments(now);
                engine.autosave(now);
            }
            () = shutdown.cancelled() => break,
        }
    }

    info!("engine stopping");
    engine.save_all(now_ms());
    shutdown.cancel();
    if cache_task.await.is_err() {
        error!("user cache task panicked");
    }
    Ok(())
}

fn apply_command(engine: &mut CombatEngine, command: Command, now: u64) {
    match command {
        Command::Pause(paused) => engine.pause(paused),
        Command::Clear => engine.clear_all(now),
        Command::SetFightTimeout(timeout_ms) => engine.set_fight_timeout(timeout_ms),
        Command::DeleteUser(uid) => engine.delete_user(uid),
        Command::RefreshEnemies => engine.refresh_enemy_cache(),
        Command::Stop => {}
    }
}

/// Re-armable debounce: every dirty notification restarts a 2 s window; the
/// cache flushes when the window closes quietly, and once more on shutdown.
async fn debounce_user_cache(
    cache: SharedUserCache,
    dirty: Arc<Notify>,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            () = dirty.notified() => {}
            () = shutdown.cancelled() => break,
        }
        loop {
            tokio::select! {
                () = tokio::time::sleep(Duration::from_millis(USER_CACHE_DEBOUNCE_MS)) => break,
                () = dirty.notified() => {}
                () = shutdown.cancelled() => break,
            }
        }
        flush_cache(&cache);
    }
    flush_cache(&cache);
}

fn flush_cache(cache: &SharedUserCache) {
    let mut cache = cache.lock().expect("user cache poisoned");
    if let Err(err) = cache.flush() {
        error!(%err, "user cache flush failed");
    }
}
