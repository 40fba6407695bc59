//! services/api/src/web/articles.rs
//!
//! Article endpoints: listing with filters, full-text search, CRUD with
//! the owner-or-admin rule, like toggling (which notifies the author), and
//! the view counter.

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

use quill_core::domain::{
    Article, ArticleFilter, ArticleUpdate, NewArticle, NewNotification, NotificationKind,
};

use crate::auth::tokens::AuthContext;
use crate::error::ApiError;
use crate::web::comments::CommentBody;
use crate::web::pagination::{PageEnvelope, PageQuery};
use crate::web::state::AppState;

//=========================================================================================
// Request/Response Types
//=========================================================================================

#[derive(Serialize, Debug, Clone)]
pub struct ArticleBody {
    pub id: Uuid,
    pub author_id: Uuid,
    pub title: String,
    pub content: String,
    pub tags: Vec<String>,
    pub likes: Vec<Uuid>,
    pub views: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Article> for ArticleBody {
    fn from(a: Article) -> Self {
        Self {
            id: a.id,
            author_id: a.author_id,
            title: a.title,
            content: a.content,
            tags: a.tags,
            likes: a.likes,
            views: a.views,
            created_at: a.created_at,
            updated_at: a.updated_at,
        }
    }
}

#[derive(Deserialize)]
pub struct ArticleListQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub tag: Option<String>,
    pub title: Option<String>,
    pub content: Option<String>,
}

#[derive(Deserialize)]
pub struct ArticleSearchQuery {
    pub q: Option<String>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

/// Pagination for the comments embedded in a single-article response.
#[derive(Deserialize)]
pub struct ArticleGetQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Deserialize)]
pub struct CreateArticleRequest {
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Deserialize, Default)]
pub struct UpdateArticleRequest {
    pub title: Option<String>,
    pub content: Option<String>,
    pub tags: Option<Vec<String>>,
}

//=========================================================================================
// Handlers
//=========================================================================================

/// GET /api/articles - list with optional tag/title/content filters
pub async fn list_articles_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ArticleListQuery>,
) -> Result<Json<PageEnvelope<ArticleBody>>, ApiError> {
    let page = PageQuery {
        page: query.page,
        limit: query.limit,
    }
    .resolve(10);
    let filter = ArticleFilter {
        tag: query.tag,
        title: query.title,
        content: query.content,
    };

    let total = state.store.count_articles(filter.clone()).await?;
    let items = state
        .store
        .list_articles(filter, page.offset(), page.limit)
        .await?
        .into_iter()
        .map(ArticleBody::from)
        .collect();

    Ok(Json(PageEnvelope::new(total, page, items)))
}

/// GET /api/articles/search?q= - full-text search over title and content
pub async fn search_articles_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ArticleSearchQuery>,
) -> Result<Json<PageEnvelope<ArticleBody>>, ApiError> {
    let page = PageQuery {
        page: query.page,
        limit: query.limit,
    }
    .resolve(10);

    // No query means no results, not an error.
    let q = match query.q.as_deref().map(str::trim) {
        Some(q) if !q.is_empty() => q.to_string(),
        _ => return Ok(Json(PageEnvelope::new(0, page, Vec::new()))),
    };

    let total = state.store.count_search_articles(&q).await?;
    let items = state
        .store
        .search_articles(&q, page.offset(), page.limit)
        .await?
        .into_iter()
        .map(ArticleBody::from)
        .collect();

    Ok(Json(PageEnvelope::new(total, page, items)))
}

/// GET /api/articles/{id} - one article plus a page of its comments
pub async fn get_article_handler(
    State(state): State<Arc<AppState>>,
    Path(article_id): Path<Uuid>,
    Query(query): Query<ArticleGetQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let article = state.store.find_article(article_id).await?;

    let page = PageQuery {
        page: query.page,
        limit: query.limit,
    }
    .resolve(10);
    let total = state.store.count_comments(article_id, None).await?;
    let comments: Vec<CommentBody> = state
        .store
        .list_comments(article_id, None, page.offset(), page.limit)
        .await?
        .into_iter()
        .map(CommentBody::from)
        .collect();

    Ok(Json(json!({
        "article": ArticleBody::from(article),
        "comments": PageEnvelope::new(total, page, comments),
    })))
}

/// POST /api/articles - create an article owned by the caller
pub async fn create_article_handler(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<AuthContext>,
    Json(req): Json<CreateArticleRequest>,
) -> Result<impl IntoResponse, ApiError> {
    // 1. Validate the request shape
    if req.title.trim().is_empty() {
        return Err(ApiError::Validation("Title is required".to_string()));
    }
    if req.content.trim().is_empty() {
        return Err(ApiError::Validation("Content is required".to_string()));
    }

    // 2. Persist, owned by the verified caller
    let article = state
        .store
        .insert_article(NewArticle {
            author_id: ctx.user_id,
            title: req.title.trim().to_string(),
            content: req.content,
            tags: req.tags,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(ArticleBody::from(article))))
}

/// PUT /api/articles/{id} - partial update by the owner or an admin
pub async fn update_article_handler(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<AuthContext>,
    Path(article_id): Path<Uuid>,
    Json(req): Json<UpdateArticleRequest>,
) -> Result<Json<ArticleBody>, ApiError> {
    // 1. The article must exist and the caller must be allowed to touch it
    let article = state.store.find_article(article_id).await?;
    if !ctx.can_modify(article.author_id) {
        return Err(ApiError::Forbidden);
    }

    // 2. Apply the provided fields only
    let updated = state
        .store
        .update_article(
            article_id,
            ArticleUpdate {
                title: req.title,
                content: req.content,
                tags: req.tags,
            },
        )
        .await?;

    Ok(Json(ArticleBody::from(updated)))
}

/// DELETE /api/articles/{id} - delete by the owner or an admin
pub async fn delete_article_handler(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<AuthContext>,
    Path(article_id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let article = state.store.find_article(article_id).await?;
    if !ctx.can_modify(article.author_id) {
        return Err(ApiError::Forbidden);
    }

    state.store.delete_article(article_id).await?;
    Ok(Json(json!({ "message": "Article deleted" })))
}

/// DELETE /api/admin/articles/{id} - unconditional delete, role-gated at
/// the router
pub async fn admin_delete_article_handler(
    State(state): State<Arc<AppState>>,
    Path(article_id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    // Existence check first so a bad id is 404, not a silent success.
    state.store.find_article(article_id).await?;
    state.store.delete_article(article_id).await?;
    Ok(Json(json!({ "message": "Article deleted" })))
}

/// PUT /api/articles/{id}/like - toggle the caller's like
pub async fn toggle_like_handler(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<AuthContext>,
    Path(article_id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    // 1. Flip the caller's membership in the like set
    let (article, liked) = state.store.toggle_article_like(article_id, ctx.user_id).await?;

    // 2. A fresh like on someone else's article notifies the author
    if liked {
        notify_like(&state, ctx, &article).await;
    }

    Ok(Json(json!({ "likes": article.likes.len(), "liked": liked })))
}

/// POST /api/articles/{id}/view - bump the view counter
pub async fn record_view_handler(
    State(state): State<Arc<AppState>>,
    Path(article_id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let views = state.store.record_article_view(article_id).await?;
    Ok(Json(json!({ "views": views })))
}

/// Best-effort like notification. The like itself already succeeded, so
/// failures here are logged and swallowed.
async fn notify_like(state: &AppState, ctx: AuthContext, article: &Article) {
    // Liking your own article is not news.
    if article.author_id == ctx.user_id {
        return;
    }

    let actor_name = match state.store.find_user_by_id(ctx.user_id).await {
        Ok(actor) => actor.name,
        Err(e) => {
            warn!("could not load actor for like notification: {}", e);
            return;
        }
    };

    let outcome = state
        .dispatcher
        .dispatch(NewNotification {
            recipient_id: article.author_id,
            actor_id: Some(ctx.user_id),
            kind: NotificationKind::Like,
            title: Some(format!("{} liked your article", actor_name)),
            body: Some(article.title.clone()),
            url: Some(format!("/articles/{}", article.id)),
            meta: Some(json!({ "articleId": article.id })),
        })
        .await;
    if let Err(e) = outcome {
        warn!("failed to dispatch like notification: {}", e);
    }
}
