//! services/api/src/web/state.rs
//!
//! Defines the application's shared state.

use std::sync::Arc;

use quill_core::ports::{ContentStore, Mailer};

use crate::auth::session::SessionManager;
use crate::auth::tokens::TokenCodec;
use crate::config::Config;
use crate::notify::{NotificationDispatcher, PresenceRegistry};

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ContentStore>,
    pub mailer: Arc<dyn Mailer>,
    pub config: Arc<Config>,
    pub tokens: TokenCodec,
    pub sessions: SessionManager,
    pub presence: Arc<PresenceRegistry>,
    pub dispatcher: NotificationDispatcher,
}
