//! WebSocket stream of raffle events
//!
//! Every connected client receives each `RaffleEvent` as a JSON text frame,
//! plus a periodic heartbeat. Slow clients that fall behind the broadcast
//! buffer are told how many events they missed.

use super::handlers::AppState;
use crate::lottery::events::RaffleEvent;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use std::{sync::Arc, time::Duration};
use tokio::{sync::broadcast, time::interval};
use tracing::{debug, warn};

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Frames that are not raffle events
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum WsControl {
    #[serde(rename = "connected")]
    Connected { network: String, timestamp: i64 },

    #[serde(rename = "heartbeat")]
    Heartbeat { timestamp: i64 },

    #[serde(rename = "lagged")]
    Lagged { missed: u64 },
}

/// GET /ws
pub async fn websocket_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    // Subscribe before the upgrade so no event between request and upgrade is lost
    let events = state.handle.subscribe();
    let network = state.node_info.network.clone();
    ws.on_upgrade(move |socket| handle_socket(socket, events, network))
}

async fn handle_socket(socket: WebSocket, mut events: broadcast::Receiver<RaffleEvent>, network: String) {
    let (mut sender, mut receiver) = socket.split();
    debug!("WebSocket client connected");

    let hello = WsControl::Connected {
        network,
        timestamp: Utc::now().timestamp(),
    };
    if send_json(&mut sender, &hello).await.is_err() {
        return;
    }

    let mut heartbeat = interval(HEARTBEAT_INTERVAL);
    heartbeat.tick().await;

    loop {
        tokio::select! {
            event = events.recv() => {
                let sent = match event {
                    Ok(event) => send_json(&mut sender, &event).await,
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        warn!("WebSocket client lagged, {} events dropped", missed);
                        send_json(&mut sender, &WsControl::Lagged { missed }).await
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                };
                if sent.is_err() {
                    break;
                }
            }
            _ = heartbeat.tick() => {
                let beat = WsControl::Heartbeat { timestamp: Utc::now().timestamp() };
                if send_json(&mut sender, &beat).await.is_err() {
                    break;
                }
            }
            incoming = receiver.next() => {
                match incoming {
                    Some(Ok(Message::Ping(payload))) => {
                        if sender.send(Message::Pong(payload)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    debug!("WebSocket client disconnected");
}

async fn send_json<S, T>(sender: &mut S, value: &T) -> Result<(), ()>
where
    S: SinkExt<Message> + Unpin,
    T: Serialize,
{
    let text = serde_json::to_string(value).map_err(|_| ())?;
    sender.send(Message::Text(text)).await.map_err(|_| ())
}
