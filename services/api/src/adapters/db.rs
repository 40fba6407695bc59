//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, which is the concrete implementation
//! of the `ContentStore` port from the `core` crate. It handles all interactions
//! with the PostgreSQL database using `sqlx`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use quill_core::domain::{
    Article, ArticleFilter, ArticleUpdate, Comment, DeviceInfo, NewArticle, NewComment,
    NewNotification, NewUser, Notification, NotificationKind, RefreshTokenRecord, Role, User,
};
use quill_core::ports::{ContentStore, PortError, PortResult};

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the `ContentStore` port.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::Error> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

/// Maps a fetch error, turning `RowNotFound` into a domain-friendly message.
fn fetch_err(e: sqlx::Error, what: impl FnOnce() -> String) -> PortError {
    match e {
        sqlx::Error::RowNotFound => PortError::NotFound(what()),
        other => PortError::Unexpected(other.to_string()),
    }
}

fn db_err(e: sqlx::Error) -> PortError {
    PortError::Unexpected(e.to_string())
}

/// Maps an insert error, turning a unique violation into `Conflict`.
fn insert_err(e: sqlx::Error, conflict: &str) -> PortError {
    match &e {
        sqlx::Error::Database(db) if db.code().as_deref() == Some("23505") => {
            PortError::Conflict(conflict.to_string())
        }
        _ => PortError::Unexpected(e.to_string()),
    }
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct UserRow {
    id: Uuid,
    name: String,
    email: String,
    password_hash: String,
    role: String,
    created_at: DateTime<Utc>,
}
impl UserRow {
    fn to_domain(self) -> PortResult<User> {
        let role = Role::parse(&self.role).ok_or_else(|| {
            PortError::Unexpected(format!("unknown role '{}' for user {}", self.role, self.id))
        })?;
        Ok(User {
            id: self.id,
            name: self.name,
            email: self.email,
            password_hash: self.password_hash,
            role,
            created_at: self.created_at,
        })
    }
}

const USER_COLUMNS: &str = "id, name, email, password_hash, role, created_at";

#[derive(FromRow)]
struct RefreshTokenRow {
    token: String,
    user_id: Uuid,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    device_ip: Option<String>,
    device_user_agent: Option<String>,
    device_name: Option<String>,
}
impl RefreshTokenRow {
    fn to_domain(self) -> RefreshTokenRecord {
        let device = if self.device_ip.is_none()
            && self.device_user_agent.is_none()
            && self.device_name.is_none()
        {
            None
        } else {
            Some(DeviceInfo {
                ip: self.device_ip,
                user_agent: self.device_user_agent,
                device_name: self.device_name,
            })
        };
        RefreshTokenRecord {
            token: self.token,
            user_id: self.user_id,
            created_at: self.created_at,
            expires_at: self.expires_at,
            device,
        }
    }
}

const REFRESH_TOKEN_COLUMNS: &str =
    "token, user_id, created_at, expires_at, device_ip, device_user_agent, device_name";

#[derive(FromRow)]
struct ArticleRow {
    id: Uuid,
    author_id: Uuid,
    title: String,
    content: String,
    tags: Vec<String>,
    likes: Vec<Uuid>,
    views: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}
impl ArticleRow {
    fn to_domain(self) -> Article {
        Article {
            id: self.id,
            author_id: self.author_id,
            title: self.title,
            content: self.content,
            tags: self.tags,
            likes: self.likes,
            views: self.views,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

const ARTICLE_COLUMNS: &str =
    "id, author_id, title, content, tags, likes, views, created_at, updated_at";

#[derive(FromRow)]
struct CommentRow {
    id: Uuid,
    article_id: Uuid,
    author_id: Uuid,
    content: String,
    created_at: DateTime<Utc>,
}
impl CommentRow {
    fn to_domain(self) -> Comment {
        Comment {
            id: self.id,
            article_id: self.article_id,
            author_id: self.author_id,
            content: self.content,
            created_at: self.created_at,
        }
    }
}

const COMMENT_COLUMNS: &str = "id, article_id, author_id, content, created_at";

#[derive(FromRow)]
struct NotificationRow {
    id: Uuid,
    recipient_id: Uuid,
    actor_id: Option<Uuid>,
    kind: String,
    title: Option<String>,
    body: Option<String>,
    url: Option<String>,
    read: bool,
    meta: Option<serde_json::Value>,
    created_at: DateTime<Utc>,
}
impl NotificationRow {
    fn to_domain(self) -> PortResult<Notification> {
        let kind = NotificationKind::parse(&self.kind).ok_or_else(|| {
            PortError::Unexpected(format!(
                "unknown notification kind '{}' for {}",
                self.kind, self.id
            ))
        })?;
        Ok(Notification {
            id: self.id,
            recipient_id: self.recipient_id,
            actor_id: self.actor_id,
            kind,
            title: self.title,
            body: self.body,
            url: self.url,
            read: self.read,
            meta: self.meta,
            created_at: self.created_at,
        })
    }
}

const NOTIFICATION_COLUMNS: &str =
    "id, recipient_id, actor_id, kind, title, body, url, read, meta, created_at";

//=========================================================================================
// `ContentStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl ContentStore for DbAdapter {
    async fn insert_user(&self, user: NewUser) -> PortResult<User> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "INSERT INTO users (id, name, email, password_hash, role)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING {USER_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.role.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| insert_err(e, "Email already in use"))?;
        row.to_domain()
    }

    async fn find_user_by_email(&self, email: &str) -> PortResult<User> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| fetch_err(e, || format!("User with email {} not found", email)))?;
        row.to_domain()
    }

    async fn find_user_by_id(&self, user_id: Uuid) -> PortResult<User> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| fetch_err(e, || format!("User {} not found", user_id)))?;
        row.to_domain()
    }

    async fn insert_refresh_token(&self, record: RefreshTokenRecord) -> PortResult<()> {
        let device = record.device.unwrap_or_default();
        sqlx::query(
            "INSERT INTO refresh_tokens
                 (token, user_id, created_at, expires_at,
                  device_ip, device_user_agent, device_name)
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(&record.token)
        .bind(record.user_id)
        .bind(record.created_at)
        .bind(record.expires_at)
        .bind(&device.ip)
        .bind(&device.user_agent)
        .bind(&device.device_name)
        .execute(&self.pool)
        .await
        .map_err(|e| insert_err(e, "Refresh token already recorded"))?;
        Ok(())
    }

    async fn find_refresh_token(&self, token: &str) -> PortResult<RefreshTokenRecord> {
        let row = sqlx::query_as::<_, RefreshTokenRow>(&format!(
            "SELECT {REFRESH_TOKEN_COLUMNS} FROM refresh_tokens WHERE token = $1"
        ))
        .bind(token)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| fetch_err(e, || "Refresh token not found".to_string()))?;
        Ok(row.to_domain())
    }

    async fn delete_refresh_token(&self, token: &str) -> PortResult<bool> {
        let result = sqlx::query("DELETE FROM refresh_tokens WHERE token = $1")
            .bind(token)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        // rows_affected arbitrates between concurrent redeemers.
        Ok(result.rows_affected() > 0)
    }

    async fn insert_article(&self, article: NewArticle) -> PortResult<Article> {
        let row = sqlx::query_as::<_, ArticleRow>(&format!(
            "INSERT INTO articles (id, author_id, title, content, tags)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING {ARTICLE_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(article.author_id)
        .bind(&article.title)
        .bind(&article.content)
        .bind(&article.tags)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(row.to_domain())
    }

    async fn find_article(&self, article_id: Uuid) -> PortResult<Article> {
        let row = sqlx::query_as::<_, ArticleRow>(&format!(
            "SELECT {ARTICLE_COLUMNS} FROM articles WHERE id = $1"
        ))
        .bind(article_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| fetch_err(e, || format!("Article {} not found", article_id)))?;
        Ok(row.to_domain())
    }

    async fn update_article(
        &self,
        article_id: Uuid,
        update: ArticleUpdate,
    ) -> PortResult<Article> {
        let row = sqlx::query_as::<_, ArticleRow>(&format!(
            "UPDATE articles
             SET title = COALESCE($2, title),
                 content = COALESCE($3, content),
                 tags = COALESCE($4, tags),
                 updated_at = now()
             WHERE id = $1
             RETURNING {ARTICLE_COLUMNS}"
        ))
        .bind(article_id)
        .bind(&update.title)
        .bind(&update.content)
        .bind(&update.tags)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| fetch_err(e, || format!("Article {} not found", article_id)))?;
        Ok(row.to_domain())
    }

    async fn delete_article(&self, article_id: Uuid) -> PortResult<()> {
        // Comments ride along via ON DELETE CASCADE.
        sqlx::query("DELETE FROM articles WHERE id = $1")
            .bind(article_id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn list_articles(
        &self,
        filter: ArticleFilter,
        offset: i64,
        limit: i64,
    ) -> PortResult<Vec<Article>> {
        let rows = sqlx::query_as::<_, ArticleRow>(&format!(
            "SELECT {ARTICLE_COLUMNS} FROM articles
             WHERE ($1::text IS NULL OR $1 = ANY(tags))
               AND ($2::text IS NULL OR title ILIKE '%' || $2 || '%')
               AND ($3::text IS NULL OR content ILIKE '%' || $3 || '%')
             ORDER BY created_at DESC
             LIMIT $4 OFFSET $5"
        ))
        .bind(&filter.tag)
        .bind(&filter.title)
        .bind(&filter.content)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(rows.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn count_articles(&self, filter: ArticleFilter) -> PortResult<i64> {
        sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM articles
             WHERE ($1::text IS NULL OR $1 = ANY(tags))
               AND ($2::text IS NULL OR title ILIKE '%' || $2 || '%')
               AND ($3::text IS NULL OR content ILIKE '%' || $3 || '%')",
        )
        .bind(&filter.tag)
        .bind(&filter.title)
        .bind(&filter.content)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)
    }

    async fn search_articles(
        &self,
        query: &str,
        offset: i64,
        limit: i64,
    ) -> PortResult<Vec<Article>> {
        let rows = sqlx::query_as::<_, ArticleRow>(&format!(
            "SELECT {ARTICLE_COLUMNS} FROM articles
             WHERE to_tsvector('english', title || ' ' || content)
                   @@ plainto_tsquery('english', $1)
             ORDER BY created_at DESC
             LIMIT $2 OFFSET $3"
        ))
        .bind(query)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(rows.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn count_search_articles(&self, query: &str) -> PortResult<i64> {
        sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM articles
             WHERE to_tsvector('english', title || ' ' || content)
                   @@ plainto_tsquery('english', $1)",
        )
        .bind(query)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)
    }

    async fn toggle_article_like(
        &self,
        article_id: Uuid,
        user_id: Uuid,
    ) -> PortResult<(Article, bool)> {
        // One statement so concurrent toggles cannot double-apply; the
        // RETURNING clause sees the new row, so `liked` reports the state
        // after the flip.
        let row = sqlx::query_as::<_, ToggledArticleRow>(&format!(
            "UPDATE articles
             SET likes = CASE WHEN $2 = ANY(likes)
                              THEN array_remove(likes, $2)
                              ELSE array_append(likes, $2)
                         END,
                 updated_at = now()
             WHERE id = $1
             RETURNING {ARTICLE_COLUMNS}, $2 = ANY(likes) AS liked"
        ))
        .bind(article_id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| fetch_err(e, || format!("Article {} not found", article_id)))?;
        Ok((row.article.to_domain(), row.liked))
    }

    async fn record_article_view(&self, article_id: Uuid) -> PortResult<i64> {
        sqlx::query_scalar::<_, i64>(
            "UPDATE articles SET views = views + 1 WHERE id = $1 RETURNING views",
        )
        .bind(article_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| fetch_err(e, || format!("Article {} not found", article_id)))
    }

    async fn insert_comment(&self, comment: NewComment) -> PortResult<Comment> {
        let row = sqlx::query_as::<_, CommentRow>(&format!(
            "INSERT INTO comments (id, article_id, author_id, content)
             VALUES ($1, $2, $3, $4)
             RETURNING {COMMENT_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(comment.article_id)
        .bind(comment.author_id)
        .bind(&comment.content)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(row.to_domain())
    }

    async fn find_comment(&self, comment_id: Uuid) -> PortResult<Comment> {
        let row = sqlx::query_as::<_, CommentRow>(&format!(
            "SELECT {COMMENT_COLUMNS} FROM comments WHERE id = $1"
        ))
        .bind(comment_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| fetch_err(e, || format!("Comment {} not found", comment_id)))?;
        Ok(row.to_domain())
    }

    async fn update_comment(&self, comment_id: Uuid, content: &str) -> PortResult<Comment> {
        let row = sqlx::query_as::<_, CommentRow>(&format!(
            "UPDATE comments SET content = $2 WHERE id = $1
             RETURNING {COMMENT_COLUMNS}"
        ))
        .bind(comment_id)
        .bind(content)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| fetch_err(e, || format!("Comment {} not found", comment_id)))?;
        Ok(row.to_domain())
    }

    async fn delete_comment(&self, comment_id: Uuid) -> PortResult<()> {
        sqlx::query("DELETE FROM comments WHERE id = $1")
            .bind(comment_id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn list_comments(
        &self,
        article_id: Uuid,
        content: Option<&str>,
        offset: i64,
        limit: i64,
    ) -> PortResult<Vec<Comment>> {
        let rows = sqlx::query_as::<_, CommentRow>(&format!(
            "SELECT {COMMENT_COLUMNS} FROM comments
             WHERE article_id = $1
               AND ($2::text IS NULL OR content ILIKE '%' || $2 || '%')
             ORDER BY created_at ASC
             LIMIT $3 OFFSET $4"
        ))
        .bind(article_id)
        .bind(content)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(rows.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn count_comments(&self, article_id: Uuid, content: Option<&str>) -> PortResult<i64> {
        sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM comments
             WHERE article_id = $1
               AND ($2::text IS NULL OR content ILIKE '%' || $2 || '%')",
        )
        .bind(article_id)
        .bind(content)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)
    }

    async fn insert_notification(
        &self,
        notification: NewNotification,
    ) -> PortResult<Notification> {
        let row = sqlx::query_as::<_, NotificationRow>(&format!(
            "INSERT INTO notifications
                 (id, recipient_id, actor_id, kind, title, body, url, meta)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
             RETURNING {NOTIFICATION_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(notification.recipient_id)
        .bind(notification.actor_id)
        .bind(notification.kind.as_str())
        .bind(&notification.title)
        .bind(&notification.body)
        .bind(&notification.url)
        .bind(&notification.meta)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;
        row.to_domain()
    }

    async fn list_notifications(
        &self,
        recipient_id: Uuid,
        offset: i64,
        limit: i64,
    ) -> PortResult<Vec<Notification>> {
        let rows = sqlx::query_as::<_, NotificationRow>(&format!(
            "SELECT {NOTIFICATION_COLUMNS} FROM notifications
             WHERE recipient_id = $1
             ORDER BY created_at DESC
             LIMIT $2 OFFSET $3"
        ))
        .bind(recipient_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.into_iter().map(|r| r.to_domain()).collect()
    }

    async fn count_notifications(&self, recipient_id: Uuid) -> PortResult<i64> {
        sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM notifications WHERE recipient_id = $1",
        )
        .bind(recipient_id)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)
    }

    async fn mark_notification_read(
        &self,
        notification_id: Uuid,
        recipient_id: Uuid,
    ) -> PortResult<Notification> {
        // Scoping the WHERE by recipient makes someone else's notification
        // indistinguishable from a missing one.
        let row = sqlx::query_as::<_, NotificationRow>(&format!(
            "UPDATE notifications SET read = TRUE
             WHERE id = $1 AND recipient_id = $2
             RETURNING {NOTIFICATION_COLUMNS}"
        ))
        .bind(notification_id)
        .bind(recipient_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| fetch_err(e, || format!("Notification {} not found", notification_id)))?;
        row.to_domain()
    }
}

/// Article row plus the post-toggle like state, for `toggle_article_like`.
#[derive(FromRow)]
struct ToggledArticleRow {
    #[sqlx(flatten)]
    article: ArticleRow,
    liked: bool,
}
