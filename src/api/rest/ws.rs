use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::{Sink, SinkExt, StreamExt};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use crate::models::tracking::TrackingEvent;
use crate::state::AppState;

/// Streams every [`TrackingEvent`] as JSON text frames.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (sender, mut receiver) = socket.split();
    let rx = state.tracking_events_tx.subscribe();

    info!("tracking client connected");

    let send_task = tokio::spawn(forward_events(rx, sender));

    let recv_task = tokio::spawn(async move {
        while let Some(Ok(_msg)) = receiver.next().await {}
    });

    tokio::select! {
        _ = send_task => {},
        _ = recv_task => {},
    }

    info!("tracking client disconnected");
}

/// Forwards events to `sink` until the channel closes or the client goes away.
/// A lagging client skips the events it missed and keeps receiving.
async fn forward_events<S>(mut rx: broadcast::Receiver<TrackingEvent>, mut sink: S)
where
    S: Sink<Message> + Unpin,
{
    loop {
        let event = match rx.recv().await {
            Ok(event) => event,
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "tracking client lagging; events dropped");
                continue;
            }
            Err(RecvError::Closed) => break,
        };

        let json = match serde_json::to_string(&event) {
            Ok(json) => json,
            Err(err) => {
                warn!(error = %err, "failed to serialize tracking event for ws");
                continue;
            }
        };

        if sink.send(Message::Text(json)).await.is_err() {
            break;
        }
    }
}
