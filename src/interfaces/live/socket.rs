use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::warn;

use super::messages::OutboundEvent;
use super::session::{ClientFrame, run_client_session};
use crate::interfaces::web::AppState;

/// Outbound events queued per client before producers wait on the writer.
const OUTBOUND_BUFFER: usize = 64;

/// How long the writer may keep flushing after the session has ended.
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

pub async fn live_socket_endpoint(
    ws: WebSocketUpgrade,
    Path(client_id): Path<String>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| serve_socket(socket, client_id, state))
}

async fn serve_socket(socket: WebSocket, client_id: String, state: AppState) {
    let (mut sink, stream) = socket.split();
    let (tx, mut rx) = mpsc::channel::<OutboundEvent>(OUTBOUND_BUFFER);

    // Sole owner of the sink: events leave in the order they were queued.
    let mut writer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let text = match serde_json::to_string(&event) {
                Ok(text) => text,
                Err(e) => {
                    warn!("Dropping unserializable live event: {}", e);
                    continue;
                }
            };
            if sink.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    let inbound = Box::pin(stream.filter_map(|frame| async move {
        match frame {
            Ok(Message::Text(text)) => Some(ClientFrame::Text(text.to_string())),
            Ok(Message::Binary(bytes)) => Some(ClientFrame::Text(
                String::from_utf8_lossy(&bytes).into_owned(),
            )),
            Ok(Message::Close(_)) | Err(_) => Some(ClientFrame::Closed),
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => None,
        }
    }));

    run_client_session(
        state.fleet.clone(),
        state.clients.clone(),
        client_id.clone(),
        inbound,
        tx,
        state.settings.metrics_interval,
    )
    .await;

    // A peer that stopped reading leaves the writer parked in `sink.send`.
    if tokio::time::timeout(WRITER_DRAIN_TIMEOUT, &mut writer)
        .await
        .is_err()
    {
        warn!(client_id = %client_id, "Live writer stalled on teardown; dropping socket");
        writer.abort();
    }
}
