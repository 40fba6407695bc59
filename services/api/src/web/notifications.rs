//! services/api/src/web/notifications.rs
//!
//! Notification endpoints: the caller's feed, marking entries read, and
//! manual sends. Creation triggered by likes and comments lives with those
//! handlers; everything funnels through the dispatcher.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use uuid::Uuid;

use quill_core::domain::{NewNotification, Notification, NotificationKind};
use quill_core::ports::PortError;

use crate::auth::tokens::AuthContext;
use crate::error::ApiError;
use crate::web::pagination::{PageEnvelope, PageQuery};
use crate::web::state::AppState;

//=========================================================================================
// Request/Response Types
//=========================================================================================

/// Wire form of a notification, shared by the REST endpoints and the
/// WebSocket push.
#[derive(Serialize, Debug, Clone)]
pub struct NotificationBody {
    pub id: Uuid,
    pub recipient_id: Uuid,
    pub actor_id: Option<Uuid>,
    pub kind: &'static str,
    pub title: Option<String>,
    pub body: Option<String>,
    pub url: Option<String>,
    pub read: bool,
    pub meta: Option<Value>,
    pub created_at: DateTime<Utc>,
}

impl From<Notification> for NotificationBody {
    fn from(n: Notification) -> Self {
        Self {
            id: n.id,
            recipient_id: n.recipient_id,
            actor_id: n.actor_id,
            kind: n.kind.as_str(),
            title: n.title,
            body: n.body,
            url: n.url,
            read: n.read,
            meta: n.meta,
            created_at: n.created_at,
        }
    }
}

#[derive(Deserialize)]
pub struct NotificationListQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Deserialize)]
pub struct SendNotificationRequest {
    pub recipient_id: Uuid,
    pub kind: String,
    pub title: Option<String>,
    pub body: Option<String>,
    pub url: Option<String>,
    pub meta: Option<Value>,
}

//=========================================================================================
// Handlers
//=========================================================================================

/// GET /api/notifications - the caller's notifications, newest first
pub async fn list_notifications_handler(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<AuthContext>,
    Query(query): Query<NotificationListQuery>,
) -> Result<Json<PageEnvelope<NotificationBody>>, ApiError> {
    let page = PageQuery {
        page: query.page,
        limit: query.limit,
    }
    .resolve(20);

    let total = state.store.count_notifications(ctx.user_id).await?;
    let items = state
        .store
        .list_notifications(ctx.user_id, page.offset(), page.limit)
        .await?
        .into_iter()
        .map(NotificationBody::from)
        .collect();

    Ok(Json(PageEnvelope::new(total, page, items)))
}

/// PUT /api/notifications/{id}/read - mark one of the caller's notifications read
pub async fn mark_notification_read_handler(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<AuthContext>,
    Path(notification_id): Path<Uuid>,
) -> Result<Json<NotificationBody>, ApiError> {
    // Scoping by the caller's id makes someone else's notification look
    // exactly like a missing one.
    let notification = state.dispatcher.mark_read(notification_id, ctx.user_id).await?;
    Ok(Json(NotificationBody::from(notification)))
}

/// POST /api/notifications - manually send a notification to another user
pub async fn send_notification_handler(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<AuthContext>,
    Json(req): Json<SendNotificationRequest>,
) -> Result<impl IntoResponse, ApiError> {
    // 1. Validate the request shape
    let kind = NotificationKind::parse(&req.kind).ok_or_else(|| {
        ApiError::Validation(format!("Unknown notification kind '{}'", req.kind))
    })?;
    let body = match req.body {
        Some(body) if !body.trim().is_empty() => body,
        _ => {
            return Err(ApiError::Validation(
                "Notification body is required".to_string(),
            ))
        }
    };

    // 2. The recipient must exist
    state
        .store
        .find_user_by_id(req.recipient_id)
        .await
        .map_err(|e| match e {
            PortError::NotFound(_) => ApiError::NotFound("Recipient".to_string()),
            other => other.into(),
        })?;

    // 3. Persist and push
    let notification = state
        .dispatcher
        .dispatch(NewNotification {
            recipient_id: req.recipient_id,
            actor_id: Some(ctx.user_id),
            kind,
            title: req.title,
            body: Some(body),
            url: req.url,
            meta: req.meta,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(NotificationBody::from(notification))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{LogMailer, MemoryStore};
    use crate::auth::session::SessionManager;
    use crate::auth::tokens::TokenCodec;
    use crate::config::Config;
    use crate::notify::{NotificationDispatcher, PresenceRegistry};
    use crate::web::protocol::ServerEvent;
    use axum::body::to_bytes;
    use quill_core::domain::{NewUser, Role, User};
    use tokio::sync::mpsc;

    const ACCESS_SECRET: &str = "an access secret comfortably over 32 bytes";
    const REFRESH_SECRET: &str = "a refresh secret comfortably over 32 bytes";

    fn test_state() -> Arc<AppState> {
        let store = Arc::new(MemoryStore::new());
        let mailer = Arc::new(LogMailer);
        let tokens = TokenCodec::new(ACCESS_SECRET, REFRESH_SECRET, 15, 30);
        let config = Arc::new(Config {
            bind_address: "127.0.0.1:0".parse().unwrap(),
            database_url: "postgres://unused".to_string(),
            log_level: tracing::Level::INFO,
            jwt_access_secret: ACCESS_SECRET.to_string(),
            jwt_refresh_secret: REFRESH_SECRET.to_string(),
            access_token_minutes: 15,
            refresh_token_days: 30,
            cookie_domain: None,
            cookie_secure: false,
            frontend_url: "http://localhost:3000".to_string(),
        });
        let sessions = SessionManager::new(
            store.clone(),
            mailer.clone(),
            tokens.clone(),
            config.frontend_url.clone(),
        );
        let presence = Arc::new(PresenceRegistry::new());
        let dispatcher = NotificationDispatcher::new(store.clone(), presence.clone());
        Arc::new(AppState {
            store,
            mailer,
            config,
            tokens,
            sessions,
            presence,
            dispatcher,
        })
    }

    async fn seed_user(state: &Arc<AppState>, name: &str, email: &str) -> User {
        state
            .store
            .insert_user(NewUser {
                name: name.to_string(),
                email: email.to_string(),
                password_hash: "irrelevant".to_string(),
                role: Role::User,
            })
            .await
            .unwrap()
    }

    fn ctx(user: &User) -> AuthContext {
        AuthContext {
            user_id: user.id,
            role: user.role,
        }
    }

    async fn seed_notification(state: &Arc<AppState>, recipient_id: Uuid, body: &str) -> Notification {
        state
            .store
            .insert_notification(NewNotification {
                recipient_id,
                actor_id: None,
                kind: NotificationKind::Mention,
                title: None,
                body: Some(body.to_string()),
                url: None,
                meta: None,
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn the_feed_is_newest_first_and_paginated() {
        let state = test_state();
        let reader = seed_user(&state, "Ada", "ada@example.com").await;

        for i in 0..3 {
            seed_notification(&state, reader.id, &format!("update {}", i)).await;
            // Distinct timestamps keep the ordering unambiguous.
            tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        }

        let envelope = list_notifications_handler(
            State(state.clone()),
            Extension(ctx(&reader)),
            Query(NotificationListQuery {
                page: Some(1),
                limit: Some(2),
            }),
        )
        .await
        .unwrap();

        assert_eq!(envelope.0.total, 3);
        assert_eq!(envelope.0.total_pages, 2);
        assert_eq!(envelope.0.items.len(), 2);
        assert_eq!(envelope.0.items[0].body.as_deref(), Some("update 2"));
        assert_eq!(envelope.0.items[1].body.as_deref(), Some("update 1"));
    }

    #[tokio::test]
    async fn marking_read_is_scoped_to_the_caller() {
        let state = test_state();
        let reader = seed_user(&state, "Ada", "ada@example.com").await;
        let stranger = seed_user(&state, "Eve", "eve@example.com").await;
        let stored = seed_notification(&state, reader.id, "for Ada only").await;

        let err = mark_notification_read_handler(
            State(state.clone()),
            Extension(ctx(&stranger)),
            Path(stored.id),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ApiError::Port(PortError::NotFound(_))));

        let marked = mark_notification_read_handler(
            State(state.clone()),
            Extension(ctx(&reader)),
            Path(stored.id),
        )
        .await
        .unwrap();
        assert!(marked.0.read);
    }

    #[tokio::test]
    async fn manual_sends_validate_kind_and_body() {
        let state = test_state();
        let sender = seed_user(&state, "Ada", "ada@example.com").await;
        let recipient = seed_user(&state, "Grace", "grace@example.com").await;

        let outcome = send_notification_handler(
            State(state.clone()),
            Extension(ctx(&sender)),
            Json(SendNotificationRequest {
                recipient_id: recipient.id,
                kind: "carrier-pigeon".to_string(),
                title: None,
                body: Some("hello".to_string()),
                url: None,
                meta: None,
            }),
        )
        .await;
        let err = match outcome {
            Ok(_) => panic!("expected an unknown-kind error"),
            Err(e) => e,
        };
        assert!(matches!(err, ApiError::Validation(_)));

        let outcome = send_notification_handler(
            State(state.clone()),
            Extension(ctx(&sender)),
            Json(SendNotificationRequest {
                recipient_id: recipient.id,
                kind: "mention".to_string(),
                title: None,
                body: Some("   ".to_string()),
                url: None,
                meta: None,
            }),
        )
        .await;
        let err = match outcome {
            Ok(_) => panic!("expected a missing-body error"),
            Err(e) => e,
        };
        assert!(matches!(err, ApiError::Validation(_)));
    }

    #[tokio::test]
    async fn manual_sends_require_a_real_recipient() {
        let state = test_state();
        let sender = seed_user(&state, "Ada", "ada@example.com").await;

        let outcome = send_notification_handler(
            State(state.clone()),
            Extension(ctx(&sender)),
            Json(SendNotificationRequest {
                recipient_id: Uuid::new_v4(),
                kind: "mention".to_string(),
                title: None,
                body: Some("hello".to_string()),
                url: None,
                meta: None,
            }),
        )
        .await;
        let err = match outcome {
            Ok(_) => panic!("expected a missing-recipient error"),
            Err(e) => e,
        };
        assert!(matches!(err, ApiError::NotFound(what) if what == "Recipient"));
    }

    #[tokio::test]
    async fn a_manual_send_lands_in_the_feed_and_on_open_connections() {
        let state = test_state();
        let sender = seed_user(&state, "Ada", "ada@example.com").await;
        let recipient = seed_user(&state, "Grace", "grace@example.com").await;

        let (tx, mut rx) = mpsc::unbounded_channel();
        state.presence.register(recipient.id, Uuid::new_v4(), tx).await;

        let response = send_notification_handler(
            State(state.clone()),
            Extension(ctx(&sender)),
            Json(SendNotificationRequest {
                recipient_id: recipient.id,
                kind: "mention".to_string(),
                title: Some("You were mentioned".to_string()),
                body: Some("See the thread".to_string()),
                url: Some("/articles/abc".to_string()),
                meta: None,
            }),
        )
        .await
        .unwrap_or_else(|e| panic!("send failed: {}", e))
        .into_response();
        assert_eq!(response.status(), StatusCode::CREATED);

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["kind"], "mention");
        assert_eq!(body["read"], false);
        assert_eq!(body["actor_id"], serde_json::to_value(sender.id).unwrap());

        let ServerEvent::Notification(event) = rx.try_recv().unwrap();
        assert_eq!(event.recipient_id, recipient.id);
        assert_eq!(event.body.as_deref(), Some("See the thread"));

        assert_eq!(state.store.count_notifications(recipient.id).await.unwrap(), 1);
    }
}
