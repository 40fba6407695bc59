//! crates/quill_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the application's core logic.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of specific external implementations like databases or mailers.

use async_trait::async_trait;
use uuid::Uuid;
use crate::domain::{
    Article, ArticleFilter, ArticleUpdate, Comment, NewArticle, NewComment, NewNotification,
    NewUser, Notification, RefreshTokenRecord, User,
};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database, network).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

#[async_trait]
pub trait ContentStore: Send + Sync {
    // --- Users ---
    /// Fails with `Conflict` when the email is already taken.
    async fn insert_user(&self, user: NewUser) -> PortResult<User>;

    async fn find_user_by_email(&self, email: &str) -> PortResult<User>;

    async fn find_user_by_id(&self, user_id: Uuid) -> PortResult<User>;

    // --- Refresh Tokens ---
    async fn insert_refresh_token(&self, record: RefreshTokenRecord) -> PortResult<()>;

    /// Exact-match lookup by token string.
    async fn find_refresh_token(&self, token: &str) -> PortResult<RefreshTokenRecord>;

    /// Returns `true` only when a record was actually removed, so that
    /// concurrent redeemers of the same token see exactly one winner.
    async fn delete_refresh_token(&self, token: &str) -> PortResult<bool>;

    // --- Articles ---
    async fn insert_article(&self, article: NewArticle) -> PortResult<Article>;

    async fn find_article(&self, article_id: Uuid) -> PortResult<Article>;

    async fn update_article(
        &self,
        article_id: Uuid,
        update: ArticleUpdate,
    ) -> PortResult<Article>;

    async fn delete_article(&self, article_id: Uuid) -> PortResult<()>;

    /// Newest first.
    async fn list_articles(
        &self,
        filter: ArticleFilter,
        offset: i64,
        limit: i64,
    ) -> PortResult<Vec<Article>>;

    async fn count_articles(&self, filter: ArticleFilter) -> PortResult<i64>;

    /// Full-text search over title and content.
    async fn search_articles(&self, query: &str, offset: i64, limit: i64)
        -> PortResult<Vec<Article>>;

    async fn count_search_articles(&self, query: &str) -> PortResult<i64>;

    /// Adds the user to the like set when absent, removes them when present.
    /// The boolean reports whether the article is liked by the user afterwards.
    async fn toggle_article_like(
        &self,
        article_id: Uuid,
        user_id: Uuid,
    ) -> PortResult<(Article, bool)>;

    /// Increments the view counter and returns the new total.
    async fn record_article_view(&self, article_id: Uuid) -> PortResult<i64>;

    // --- Comments ---
    async fn insert_comment(&self, comment: NewComment) -> PortResult<Comment>;

    async fn find_comment(&self, comment_id: Uuid) -> PortResult<Comment>;

    async fn update_comment(&self, comment_id: Uuid, content: &str) -> PortResult<Comment>;

    async fn delete_comment(&self, comment_id: Uuid) -> PortResult<()>;

    /// Oldest first, optionally filtered by a case-insensitive content substring.
    async fn list_comments(
        &self,
        article_id: Uuid,
        content: Option<&str>,
        offset: i64,
        limit: i64,
    ) -> PortResult<Vec<Comment>>;

    async fn count_comments(&self, article_id: Uuid, content: Option<&str>) -> PortResult<i64>;

    // --- Notifications ---
    async fn insert_notification(&self, notification: NewNotification)
        -> PortResult<Notification>;

    /// Newest first, scoped to one recipient.
    async fn list_notifications(
        &self,
        recipient_id: Uuid,
        offset: i64,
        limit: i64,
    ) -> PortResult<Vec<Notification>>;

    async fn count_notifications(&self, recipient_id: Uuid) -> PortResult<i64>;

    /// Flips the read flag. A notification belonging to someone else is
    /// indistinguishable from one that does not exist: both are `NotFound`.
    async fn mark_notification_read(
        &self,
        notification_id: Uuid,
        recipient_id: Uuid,
    ) -> PortResult<Notification>;
}

#[async_trait]
pub trait Mailer: Send + Sync {
    /// Delivers one message. Callers treat delivery as best-effort and
    /// spawn it off the request path.
    async fn send(&self, to: &str, subject: &str, html_body: &str) -> PortResult<()>;
}
