//! services/api/src/web/comments.rs
//!
//! Comment endpoints, nested under their article. Creating a comment on
//! someone else's article notifies the author in-app and by email.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

use quill_core::domain::{Article, Comment, NewComment, NewNotification, NotificationKind};

use crate::auth::tokens::AuthContext;
use crate::error::ApiError;
use crate::web::pagination::{PageEnvelope, PageQuery};
use crate::web::state::AppState;

//=========================================================================================
// Request/Response Types
//=========================================================================================

#[derive(Serialize, Debug, Clone)]
pub struct CommentBody {
    pub id: Uuid,
    pub article_id: Uuid,
    pub author_id: Uuid,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl From<Comment> for CommentBody {
    fn from(c: Comment) -> Self {
        Self {
            id: c.id,
            article_id: c.article_id,
            author_id: c.author_id,
            content: c.content,
            created_at: c.created_at,
        }
    }
}

#[derive(Deserialize)]
pub struct CommentListQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub content: Option<String>,
}

#[derive(Deserialize)]
pub struct CommentRequest {
    pub content: String,
}

//=========================================================================================
// Handlers
//=========================================================================================

/// GET /api/articles/{article_id}/comments - oldest first, optional content filter
pub async fn list_comments_handler(
    State(state): State<Arc<AppState>>,
    Path(article_id): Path<Uuid>,
    Query(query): Query<CommentListQuery>,
) -> Result<Json<PageEnvelope<CommentBody>>, ApiError> {
    let page = PageQuery {
        page: query.page,
        limit: query.limit,
    }
    .resolve(10);
    let content = query.content.as_deref();

    let total = state.store.count_comments(article_id, content).await?;
    let items = state
        .store
        .list_comments(article_id, content, page.offset(), page.limit)
        .await?
        .into_iter()
        .map(CommentBody::from)
        .collect();

    Ok(Json(PageEnvelope::new(total, page, items)))
}

/// POST /api/articles/{article_id}/comments - comment as the caller
pub async fn create_comment_handler(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<AuthContext>,
    Path(article_id): Path<Uuid>,
    Json(req): Json<CommentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    // 1. Validate the request shape
    if req.content.trim().is_empty() {
        return Err(ApiError::Validation("Comment content is required".to_string()));
    }

    // 2. The article must exist
    let article = state.store.find_article(article_id).await?;

    // 3. Persist the comment
    let comment = state
        .store
        .insert_comment(NewComment {
            article_id,
            author_id: ctx.user_id,
            content: req.content,
        })
        .await?;

    // 4. Tell the author, unless they are talking to themselves
    notify_comment(&state, ctx, &article, &comment).await;

    Ok((StatusCode::CREATED, Json(CommentBody::from(comment))))
}

/// PUT /api/articles/{article_id}/comments/{comment_id} - edit by owner or admin
pub async fn update_comment_handler(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<AuthContext>,
    Path((article_id, comment_id)): Path<(Uuid, Uuid)>,
    Json(req): Json<CommentRequest>,
) -> Result<Json<CommentBody>, ApiError> {
    if req.content.trim().is_empty() {
        return Err(ApiError::Validation("Comment content is required".to_string()));
    }

    let comment = state.store.find_comment(comment_id).await?;
    if comment.article_id != article_id {
        return Err(ApiError::NotFound("Comment".to_string()));
    }
    if !ctx.can_modify(comment.author_id) {
        return Err(ApiError::Forbidden);
    }

    let updated = state.store.update_comment(comment_id, &req.content).await?;
    Ok(Json(CommentBody::from(updated)))
}

/// DELETE /api/articles/{article_id}/comments/{comment_id} - remove by owner or admin
pub async fn delete_comment_handler(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<AuthContext>,
    Path((article_id, comment_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let comment = state.store.find_comment(comment_id).await?;
    if comment.article_id != article_id {
        return Err(ApiError::NotFound("Comment".to_string()));
    }
    if !ctx.can_modify(comment.author_id) {
        return Err(ApiError::Forbidden);
    }

    state.store.delete_comment(comment_id).await?;
    Ok(Json(json!({ "message": "Comment deleted" })))
}

/// Best-effort author notification for a new comment: an in-app push plus
/// an email in the background. The comment itself already succeeded, so
/// failures here are logged and swallowed.
async fn notify_comment(state: &AppState, ctx: AuthContext, article: &Article, comment: &Comment) {
    // Commenting on your own article is not news.
    if article.author_id == ctx.user_id {
        return;
    }

    let actor_name = match state.store.find_user_by_id(ctx.user_id).await {
        Ok(actor) => actor.name,
        Err(e) => {
            warn!("could not load actor for comment notification: {}", e);
            return;
        }
    };

    let outcome = state
        .dispatcher
        .dispatch(NewNotification {
            recipient_id: article.author_id,
            actor_id: Some(ctx.user_id),
            kind: NotificationKind::Comment,
            title: Some(format!("{} commented on your article", actor_name)),
            body: Some(comment.content.clone()),
            url: Some(format!("/articles/{}#comment-{}", article.id, comment.id)),
            meta: Some(json!({ "articleId": article.id, "commentId": comment.id })),
        })
        .await;
    if let Err(e) = outcome {
        warn!("failed to dispatch comment notification: {}", e);
    }

    // The email leaves the request path entirely.
    match state.store.find_user_by_id(article.author_id).await {
        Ok(author) => {
            let mailer = state.mailer.clone();
            let subject = format!("New comment on \"{}\"", article.title);
            let html_body = format!(
                "<p>{} commented:</p><blockquote>{}</blockquote>\
                 <p><a href=\"{}/articles/{}#comment-{}\">View the conversation</a></p>",
                actor_name, comment.content, state.config.frontend_url, article.id, comment.id
            );
            tokio::spawn(async move {
                if let Err(e) = mailer.send(&author.email, &subject, &html_body).await {
                    warn!("failed to send comment email: {}", e);
                }
            });
        }
        Err(e) => warn!("could not load author for comment email: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::MemoryStore;
    use crate::auth::session::SessionManager;
    use crate::auth::tokens::TokenCodec;
    use crate::config::Config;
    use crate::notify::{NotificationDispatcher, PresenceRegistry};
    use crate::web::protocol::ServerEvent;
    use async_trait::async_trait;
    use axum::body::to_bytes;
    use quill_core::domain::{DeviceInfo, NewArticle, Role};
    use quill_core::ports::{Mailer, PortResult};
    use tokio::sync::{mpsc, Mutex};

    const ACCESS_SECRET: &str = "an access secret comfortably over 32 bytes";
    const REFRESH_SECRET: &str = "a refresh secret comfortably over 32 bytes";

    #[derive(Default)]
    struct RecordingMailer {
        sent: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl Mailer for RecordingMailer {
        async fn send(&self, to: &str, subject: &str, _html_body: &str) -> PortResult<()> {
            self.sent.lock().await.push((to.to_string(), subject.to_string()));
            Ok(())
        }
    }

    fn test_state() -> (Arc<AppState>, Arc<RecordingMailer>) {
        let store = Arc::new(MemoryStore::new());
        let mailer = Arc::new(RecordingMailer::default());
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
        let state = Arc::new(AppState {
            store,
            mailer: mailer.clone(),
            config,
            tokens,
            sessions,
            presence,
            dispatcher,
        });
        (state, mailer)
    }

    async fn ctx_for(state: &Arc<AppState>, name: &str, email: &str) -> AuthContext {
        state
            .sessions
            .register(name, email, "hunter2hunter2")
            .await
            .unwrap();
        let session = state
            .sessions
            .login(email, "hunter2hunter2", DeviceInfo::default())
            .await
            .unwrap();
        state.tokens.verify_access(&session.access_token).unwrap()
    }

    async fn seed_article(state: &Arc<AppState>, author_id: Uuid) -> Article {
        state
            .store
            .insert_article(NewArticle {
                author_id,
                title: "Ownership in practice".to_string(),
                content: "Moves, borrows, and when to clone.".to_string(),
                tags: vec!["rust".to_string()],
            })
            .await
            .unwrap()
    }

    /// Lets spawned mailer tasks run to completion.
    async fn settle() {
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }

    #[tokio::test]
    async fn commenting_notifies_every_open_tab_of_the_author() {
        let (state, mailer) = test_state();
        let author = ctx_for(&state, "Ada", "ada@example.com").await;
        let commenter = ctx_for(&state, "Grace", "grace@example.com").await;
        let article = seed_article(&state, author.user_id).await;

        // The author has two tabs open.
        let (tx_a, mut rx_a) = mpsc::unbounded_channel();
        let (tx_b, mut rx_b) = mpsc::unbounded_channel();
        state.presence.register(author.user_id, Uuid::new_v4(), tx_a).await;
        state.presence.register(author.user_id, Uuid::new_v4(), tx_b).await;

        let response = create_comment_handler(
            State(state.clone()),
            Extension(commenter),
            Path(article.id),
            Json(CommentRequest {
                content: "Great point about borrowing!".to_string(),
            }),
        )
        .await
        .unwrap()
        .into_response();
        assert_eq!(response.status(), StatusCode::CREATED);

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["article_id"], serde_json::to_value(article.id).unwrap());

        for rx in [&mut rx_a, &mut rx_b] {
            let ServerEvent::Notification(event) = rx.try_recv().unwrap();
            assert_eq!(event.recipient_id, author.user_id);
            assert_eq!(event.kind, "comment");
            assert_eq!(event.body.as_deref(), Some("Great point about borrowing!"));
            assert!(!event.read);
        }
        assert_eq!(
            state.store.count_notifications(author.user_id).await.unwrap(),
            1
        );

        settle().await;
        let sent = mailer.sent.lock().await;
        assert!(sent.iter().any(|(to, subject)| {
            to == "ada@example.com" && subject == "New comment on \"Ownership in practice\""
        }));
    }

    #[tokio::test]
    async fn commenting_on_your_own_article_is_not_news() {
        let (state, mailer) = test_state();
        let author = ctx_for(&state, "Ada", "ada@example.com").await;
        let article = seed_article(&state, author.user_id).await;

        create_comment_handler(
            State(state.clone()),
            Extension(author),
            Path(article.id),
            Json(CommentRequest {
                content: "Replying to myself.".to_string(),
            }),
        )
        .await
        .unwrap();

        assert_eq!(
            state.store.count_notifications(author.user_id).await.unwrap(),
            0
        );
        settle().await;
        let sent = mailer.sent.lock().await;
        assert!(!sent.iter().any(|(_, subject)| subject.starts_with("New comment")));
    }

    #[tokio::test]
    async fn a_comment_is_only_reachable_under_its_own_article() {
        let (state, _) = test_state();
        let author = ctx_for(&state, "Ada", "ada@example.com").await;
        let article = seed_article(&state, author.user_id).await;
        let other = seed_article(&state, author.user_id).await;

        let comment = state
            .store
            .insert_comment(NewComment {
                article_id: article.id,
                author_id: author.user_id,
                content: "First!".to_string(),
            })
            .await
            .unwrap();

        let err = update_comment_handler(
            State(state.clone()),
            Extension(author),
            Path((other.id, comment.id)),
            Json(CommentRequest {
                content: "Edited".to_string(),
            }),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ApiError::NotFound(what) if what == "Comment"));
    }

    #[tokio::test]
    async fn only_the_comment_author_or_an_admin_may_edit() {
        let (state, _) = test_state();
        let author = ctx_for(&state, "Ada", "ada@example.com").await;
        let stranger = ctx_for(&state, "Eve", "eve@example.com").await;
        let article = seed_article(&state, author.user_id).await;

        let comment = state
            .store
            .insert_comment(NewComment {
                article_id: article.id,
                author_id: author.user_id,
                content: "First!".to_string(),
            })
            .await
            .unwrap();

        let err = update_comment_handler(
            State(state.clone()),
            Extension(stranger),
            Path((article.id, comment.id)),
            Json(CommentRequest {
                content: "Hijacked".to_string(),
            }),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ApiError::Forbidden));

        let admin = AuthContext {
            user_id: Uuid::new_v4(),
            role: Role::Admin,
        };
        let updated = update_comment_handler(
            State(state.clone()),
            Extension(admin),
            Path((article.id, comment.id)),
            Json(CommentRequest {
                content: "Moderated".to_string(),
            }),
        )
        .await
        .unwrap();
        assert_eq!(updated.0.content, "Moderated");
    }

    #[tokio::test]
    async fn deleting_a_comment_requires_ownership() {
        let (state, _) = test_state();
        let author = ctx_for(&state, "Ada", "ada@example.com").await;
        let commenter = ctx_for(&state, "Grace", "grace@example.com").await;
        let article = seed_article(&state, author.user_id).await;

        let comment = state
            .store
            .insert_comment(NewComment {
                article_id: article.id,
                author_id: commenter.user_id,
                content: "Hot take.".to_string(),
            })
            .await
            .unwrap();

        // The article's author does not own the comment.
        let err = delete_comment_handler(
            State(state.clone()),
            Extension(author),
            Path((article.id, comment.id)),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ApiError::Forbidden));

        delete_comment_handler(
            State(state.clone()),
            Extension(commenter),
            Path((article.id, comment.id)),
        )
        .await
        .unwrap();
        assert!(state.store.find_comment(comment.id).await.is_err());
    }
}
