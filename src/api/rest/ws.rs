use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use futures::SinkExt;
use futures::StreamExt;
use serde::Deserialize;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{info, warn};
use uuid::Uuid;

use crate::state::AppState;

#[derive(Deserialize)]
pub struct WsQuery {
    pub party_id: Uuid,
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, query.party_id))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>, party_id: Uuid) {
    let (mut sender, mut receiver) = socket.split();
    let mut events = Box::pin(
        BroadcastStream::new(state.events_tx.subscribe()).filter_map(move |event| {
            let addressed = match event {
                Ok(event) if event.recipient == party_id => Some(event),
                Ok(_) => None,
                Err(err) => {
                    warn!(%party_id, error = %err, "realtime subscriber lagged");
                    None
                }
            };
            futures::future::ready(addressed)
        }),
    );

    info!(%party_id, "websocket client connected");

    let send_task = tokio::spawn(async move {
        while let Some(event) = events.next().await {
            let json = match serde_json::to_string(&event) {
                Ok(json) => json,
                Err(err) => {
                    warn!(error = %err, "failed to serialize ride event for ws");
                    continue;
                }
            };

            if sender.send(Message::Text(json)).await.is_err() {
                break;
            }
        }
    });

    let recv_task = tokio::spawn(async move {
        while let Some(Ok(_msg)) = receiver.next().await {}
    });

    tokio::select! {
        _ = send_task => {},
        _ = recv_task => {},
    }

    info!(%party_id, "websocket client disconnected");
}
