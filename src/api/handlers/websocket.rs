//! `GET /websocket`: pushes the server time every two seconds until the
//! client goes away.

use axum::{
    extract::ws::{Message, WebSocket, WebSocketUpgrade},
    response::IntoResponse,
};
use chrono::Utc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tracing::debug;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(2);

pub async fn websocket(ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(heartbeat)
}

async fn heartbeat(mut socket: WebSocket) {
    let mut ticker = interval(HEARTBEAT_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let nanos = Utc::now().timestamp_nanos_opt().unwrap_or_default();
                if let Err(err) = socket.send(Message::Text(heartbeat_message(nanos))).await {
                    debug!("websocket send failed: {err}");
                    break;
                }
            }
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Close(_)) | Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }

    debug!("websocket closed");
}

fn heartbeat_message(nanos: i64) -> String {
    format!("server timestamp: {nanos}")
}
