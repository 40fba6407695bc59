//! services/api/src/web/protocol.rs
//!
//! The WebSocket wire protocol between the server and connected clients.
//! Clients only listen; there are no structured inbound frames.

use serde::Serialize;

use crate::web::notifications::NotificationBody;

/// Events pushed from the server to a connected client, serialized as
/// `{"event": "...", "payload": ...}` text frames.
#[derive(Serialize, Debug, Clone)]
#[serde(tag = "event", content = "payload", rename_all = "snake_case")]
pub enum ServerEvent {
    /// A notification was just persisted for this user.
    Notification(NotificationBody),
}
