//! WebSocket upgrade and per-connection poller. Each client gets its own
//! interval timer; it goes away with the connection.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures_util::{stream::SplitSink, SinkExt, StreamExt};
use std::sync::atomic::Ordering;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

use crate::metrics::collect_snapshot;
use crate::state::AppState;

// Auth is enforced by the router's middleware before we get here.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn push_snapshot(socket: &mut SplitSink<WebSocket, Message>, state: &AppState) -> bool {
    let snap = collect_snapshot(state).await;
    match serde_json::to_string(&snap) {
        Ok(js) => socket.send(Message::Text(js)).await.is_ok(),
        Err(e) => {
            debug!("snapshot serialization failed: {e}");
            true
        }
    }
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let clients = state.client_count.fetch_add(1, Ordering::Relaxed) + 1;
    info!(clients, "ws client connected");

    // Decrement on disconnect (drop).
    struct ClientGuard(AppState);
    impl Drop for ClientGuard {
        fn drop(&mut self) {
            let left = self.0.client_count.fetch_sub(1, Ordering::Relaxed) - 1;
            info!(clients = left, "ws client disconnected");
        }
    }
    let _guard = ClientGuard(state.clone());

    let (mut tx, mut rx) = socket.split();
    let mut ticker = interval(state.poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if !push_snapshot(&mut tx, &state).await {
                    break;
                }
            }
            msg = rx.next() => match msg {
                Some(Ok(Message::Text(text))) if text == "refresh" => {
                    if !push_snapshot(&mut tx, &state).await {
                        break;
                    }
                }
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                Some(Ok(_)) => {}
            },
        }
    }
}
