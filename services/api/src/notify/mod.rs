//! services/api/src/notify/mod.rs
//!
//! Real-time notification delivery: the presence registry tracks who holds
//! live connections, the dispatcher persists notifications and pushes them
//! to those connections.

pub mod dispatcher;
pub mod presence;

pub use dispatcher::NotificationDispatcher;
pub use presence::{ConnectionId, PresenceRegistry};
