pub mod articles;
pub mod comments;
pub mod notifications;
pub mod pagination;
pub mod protocol;
pub mod state;
pub mod ws;

// Re-export the WebSocket handler to make it easily accessible
// to the binary that builds the web server router.
pub use ws::ws_handler;
