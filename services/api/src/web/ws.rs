//! services/api/src/web/ws.rs
//!
//! The live notification stream. One WebSocket connection per tab; events
//! queue through an unbounded channel registered with the presence
//! registry and drain into the socket as JSON text frames.

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    response::Response,
};
use futures::{sink::SinkExt, stream::StreamExt};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::ApiError;
use crate::web::state::AppState;

#[derive(Deserialize)]
pub struct WsAuthQuery {
    pub token: Option<String>,
}

/// GET /ws?token=<access token> - upgrade to the notification stream.
///
/// Browsers cannot attach headers to WebSocket requests, so the access
/// token rides in the query string and is verified BEFORE the upgrade;
/// presence is always tied to a verified identity, never a claimed one.
pub async fn ws_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<WsAuthQuery>,
    ws: WebSocketUpgrade,
) -> Result<Response, ApiError> {
    let token = query.token.ok_or(ApiError::Unauthenticated)?;
    let ctx = state.tokens.verify_access(&token)?;
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, ctx.user_id)))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>, user_id: Uuid) {
    let connection_id = Uuid::new_v4();
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel();

    state.presence.register(user_id, connection_id, tx).await;
    debug!("user {} connected ({})", user_id, connection_id);

    // Pump queued events into the socket.
    let mut send_task = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let payload = match serde_json::to_string(&event) {
                Ok(payload) => payload,
                Err(e) => {
                    warn!("failed to serialize server event: {}", e);
                    continue;
                }
            };
            if ws_tx.send(Message::Text(payload.into())).await.is_err() {
                break;
            }
        }
    });

    // Drain the client side until it closes. Clients send no structured
    // frames; pings are answered by the protocol layer.
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(message)) = ws_rx.next().await {
            if let Message::Close(_) = message {
                break;
            }
        }
    });

    // Whichever half finishes first tears down the other.
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    state.presence.unregister(user_id, connection_id).await;
    debug!("user {} disconnected ({})", user_id, connection_id);
}
