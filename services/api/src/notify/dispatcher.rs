//! services/api/src/notify/dispatcher.rs
//!
//! Two-phase notification delivery: persist first, then push to whoever is
//! connected. The stored record is the source of truth; the push is a hint
//! that it exists.

use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use quill_core::domain::{NewNotification, Notification};
use quill_core::ports::ContentStore;

use crate::error::ApiError;
use crate::notify::presence::PresenceRegistry;
use crate::web::notifications::NotificationBody;
use crate::web::protocol::ServerEvent;

#[derive(Clone)]
pub struct NotificationDispatcher {
    store: Arc<dyn ContentStore>,
    presence: Arc<PresenceRegistry>,
}

impl NotificationDispatcher {
    pub fn new(store: Arc<dyn ContentStore>, presence: Arc<PresenceRegistry>) -> Self {
        Self { store, presence }
    }

    /// Stores the notification, then pushes it to every live connection of
    /// the recipient. A closed connection is skipped. Push failures never
    /// undo or delay persistence.
    pub async fn dispatch(&self, new: NewNotification) -> Result<Notification, ApiError> {
        let notification = self.store.insert_notification(new).await?;

        let recipient_id = notification.recipient_id;
        for (connection_id, sender) in self.presence.connections_for(recipient_id).await {
            let event = ServerEvent::Notification(NotificationBody::from(notification.clone()));
            if sender.send(event).is_err() {
                debug!(
                    "connection {} of user {} is gone, skipping push",
                    connection_id, recipient_id
                );
            }
        }

        Ok(notification)
    }

    /// Marks one of the recipient's notifications as read. A notification
    /// belonging to someone else is reported as plain `NotFound`.
    pub async fn mark_read(
        &self,
        notification_id: Uuid,
        recipient_id: Uuid,
    ) -> Result<Notification, ApiError> {
        Ok(self
            .store
            .mark_notification_read(notification_id, recipient_id)
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::MemoryStore;
    use quill_core::domain::NotificationKind;
    use quill_core::ports::PortError;
    use serde_json::json;
    use tokio::sync::mpsc;

    fn dispatcher() -> (NotificationDispatcher, Arc<MemoryStore>, Arc<PresenceRegistry>) {
        let store = Arc::new(MemoryStore::new());
        let presence = Arc::new(PresenceRegistry::new());
        let dispatcher = NotificationDispatcher::new(store.clone(), presence.clone());
        (dispatcher, store, presence)
    }

    fn comment_notification(recipient_id: Uuid, actor_id: Uuid) -> NewNotification {
        NewNotification {
            recipient_id,
            actor_id: Some(actor_id),
            kind: NotificationKind::Comment,
            title: Some("Ada commented on your article".to_string()),
            body: Some("Great point about borrowing!".to_string()),
            url: Some("/articles/abc#comment-def".to_string()),
            meta: Some(json!({ "articleId": "abc" })),
        }
    }

    #[tokio::test]
    async fn dispatch_persists_and_reaches_every_open_connection() {
        let (dispatcher, store, presence) = dispatcher();
        let author = Uuid::new_v4();
        let commenter = Uuid::new_v4();

        let (tx_a, mut rx_a) = mpsc::unbounded_channel();
        let (tx_b, mut rx_b) = mpsc::unbounded_channel();
        presence.register(author, Uuid::new_v4(), tx_a).await;
        presence.register(author, Uuid::new_v4(), tx_b).await;

        let stored = dispatcher
            .dispatch(comment_notification(author, commenter))
            .await
            .unwrap();
        assert!(!stored.read);
        assert_eq!(stored.kind, NotificationKind::Comment);
        assert_eq!(store.count_notifications(author).await.unwrap(), 1);

        for rx in [&mut rx_a, &mut rx_b] {
            let ServerEvent::Notification(body) = rx.try_recv().unwrap();
            assert_eq!(body.id, stored.id);
            assert_eq!(body.kind, "comment");
            assert_eq!(body.body.as_deref(), Some("Great point about borrowing!"));
            assert!(!body.read);
        }
    }

    #[tokio::test]
    async fn a_dead_connection_does_not_stop_persistence_or_other_pushes() {
        let (dispatcher, store, presence) = dispatcher();
        let author = Uuid::new_v4();

        let (tx_dead, rx_dead) = mpsc::unbounded_channel();
        drop(rx_dead);
        let (tx_live, mut rx_live) = mpsc::unbounded_channel();
        presence.register(author, Uuid::new_v4(), tx_dead).await;
        presence.register(author, Uuid::new_v4(), tx_live).await;

        dispatcher
            .dispatch(comment_notification(author, Uuid::new_v4()))
            .await
            .unwrap();

        assert_eq!(store.count_notifications(author).await.unwrap(), 1);
        let ServerEvent::Notification(body) = rx_live.try_recv().unwrap();
        assert_eq!(body.recipient_id, author);
    }

    #[tokio::test]
    async fn offline_recipients_still_get_the_stored_record() {
        let (dispatcher, store, _) = dispatcher();
        let author = Uuid::new_v4();

        dispatcher
            .dispatch(comment_notification(author, Uuid::new_v4()))
            .await
            .unwrap();

        assert_eq!(store.count_notifications(author).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn mark_read_is_scoped_to_the_recipient() {
        let (dispatcher, _, _) = dispatcher();
        let author = Uuid::new_v4();
        let stranger = Uuid::new_v4();

        let stored = dispatcher
            .dispatch(comment_notification(author, Uuid::new_v4()))
            .await
            .unwrap();

        // Someone else's notification reads as missing, never as forbidden.
        let err = dispatcher.mark_read(stored.id, stranger).await.unwrap_err();
        assert!(matches!(err, ApiError::Port(PortError::NotFound(_))));

        let marked = dispatcher.mark_read(stored.id, author).await.unwrap();
        assert!(marked.read);
    }
}
