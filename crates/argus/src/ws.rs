//! WebSocket fan-out: a thin adapter that serializes bus events to JSON
//! text frames. Delivery is best-effort; a subscriber that falls behind the
//! broadcast buffer just misses snapshots.

use axum::{
    Router,
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
    routing::get,
};
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::bus::EventBus;

#[must_use]
pub fn router(bus: EventBus) -> Router {
    Router::new().route("/ws", get(upgrade)).with_state(bus)
}

async fn upgrade(ws: WebSocketUpgrade, State(bus): State<EventBus>) -> Response {
    ws.on_upgrade(move |socket| stream_events(socket, bus))
}

async fn stream_events(mut socket: WebSocket, bus: EventBus) {
    let mut events = bus.subscribe();
    debug!("ws subscriber connected");
    loop {
        match events.recv().await {
            Ok(event) => {
                let payload = match serde_json::to_string(&event) {
                    Ok(payload) => payload,
                    Err(err) => {
                        warn!(%err, "unserializable bus event");
                        continue;
                    }
                };
                if socket.send(Message::Text(payload)).await.is_err() {
                    break;
                }
            }
            // Missed snapshots are superseded by the next one.
            Err(RecvError::Lagged(skipped)) => {
                debug!(skipped, "ws subscriber lagged");
            }
            Err(RecvError::Closed) => break,
        }
    }
    debug!("ws subscriber disconnected");
}

/// Bind and serve until `shutdown` fires.
pub async fn serve(
    addr: std::net::SocketAddr,
    bus: EventBus,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "websocket endpoint listening");
    axum::serve(listener, router(bus))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::BusEvent;

    #[tokio::test]
    async fn bus_events_serialize_for_the_wire() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        bus.emit(BusEvent::NewFightStarted { fight_id: 99 });
        let event = rx.recv().await.unwrap();
        let payload = serde_json::to_string(&event).unwrap();
        assert!(payload.contains("\"type\":\"new_fight_started\""));
        assert!(payload.contains("\"fight_id\":99"));
    }
}
