use std::sync::Arc;
use std::sync::atomic::Ordering;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use agentdeck_core::Subscription;

use crate::state::{AppState, ConnectionGuard};

/// GET /ws: live channel. The first frame is the `init` snapshot, then one
/// text frame per event.
pub async fn ws_handler(
    State(state): State<AppState>,
    ws: WebSocketUpgrade,
) -> Result<Response, StatusCode> {
    let max_ws = state.config.limits.max_ws_connections;
    let current = state.ws_connection_count.load(Ordering::Relaxed);
    if current >= max_ws {
        tracing::warn!(current, max = max_ws, "WS connection limit reached");
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    }

    Ok(ws
        .on_upgrade(move |socket| handle_socket(socket, state))
        .into_response())
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let _guard = ConnectionGuard::new(Arc::clone(&state.ws_connection_count));
    let Subscription { id, rx } = state.dashboard.write().await.subscribe();
    let (ws_sender, mut ws_receiver) = socket.split();
    let writer = spawn_writer(ws_sender, rx);

    // The channel is push-only; inbound frames are read only to notice the close.
    while let Some(Ok(msg)) = ws_receiver.next().await {
        if let Message::Close(_) = msg {
            break;
        }
    }

    writer.abort();
    state.dashboard.write().await.unsubscribe(id);
}

fn spawn_writer(
    mut ws_sender: SplitSink<WebSocket, Message>,
    mut rx: mpsc::Receiver<Arc<str>>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(payload) = rx.recv().await {
            if ws_sender
                .send(Message::Text(payload.as_ref().into()))
                .await
                .is_err()
            {
                break;
            }
        }
    })
}
