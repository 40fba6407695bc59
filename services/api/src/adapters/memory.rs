//! services/api/src/adapters/memory.rs
//!
//! An in-memory implementation of the `ContentStore` port. It backs the unit
//! tests and doubles as a zero-dependency store for local experiments. The
//! behavior mirrors the Postgres adapter: same conflict rules, same not-found
//! messages, same ordering.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use quill_core::domain::{
    Article, ArticleFilter, ArticleUpdate, Comment, NewArticle, NewComment, NewNotification,
    NewUser, Notification, RefreshTokenRecord, User,
};
use quill_core::ports::{ContentStore, PortError, PortResult};

#[derive(Default)]
pub struct MemoryStore {
    users: RwLock<HashMap<Uuid, User>>,
    refresh_tokens: RwLock<HashMap<String, RefreshTokenRecord>>,
    articles: RwLock<HashMap<Uuid, Article>>,
    comments: RwLock<HashMap<Uuid, Comment>>,
    notifications: RwLock<HashMap<Uuid, Notification>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn page<T>(mut items: Vec<T>, offset: i64, limit: i64) -> Vec<T> {
    let offset = offset.max(0) as usize;
    let limit = limit.max(0) as usize;
    if offset >= items.len() {
        return Vec::new();
    }
    items.drain(..offset);
    items.truncate(limit);
    items
}

fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

fn matches_filter(article: &Article, filter: &ArticleFilter) -> bool {
    if let Some(tag) = &filter.tag {
        if !article.tags.iter().any(|t| t == tag) {
            return false;
        }
    }
    if let Some(title) = &filter.title {
        if !contains_ci(&article.title, title) {
            return false;
        }
    }
    if let Some(content) = &filter.content {
        if !contains_ci(&article.content, content) {
            return false;
        }
    }
    true
}

#[async_trait]
impl ContentStore for MemoryStore {
    async fn insert_user(&self, user: NewUser) -> PortResult<User> {
        let mut users = self.users.write().await;
        if users.values().any(|u| u.email == user.email) {
            return Err(PortError::Conflict("Email already in use".to_string()));
        }
        let stored = User {
            id: Uuid::new_v4(),
            name: user.name,
            email: user.email,
            password_hash: user.password_hash,
            role: user.role,
            created_at: Utc::now(),
        };
        users.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn find_user_by_email(&self, email: &str) -> PortResult<User> {
        self.users
            .read()
            .await
            .values()
            .find(|u| u.email == email)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("User with email {} not found", email)))
    }

    async fn find_user_by_id(&self, user_id: Uuid) -> PortResult<User> {
        self.users
            .read()
            .await
            .get(&user_id)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("User {} not found", user_id)))
    }

    async fn insert_refresh_token(&self, record: RefreshTokenRecord) -> PortResult<()> {
        self.refresh_tokens
            .write()
            .await
            .insert(record.token.clone(), record);
        Ok(())
    }

    async fn find_refresh_token(&self, token: &str) -> PortResult<RefreshTokenRecord> {
        self.refresh_tokens
            .read()
            .await
            .get(token)
            .cloned()
            .ok_or_else(|| PortError::NotFound("Refresh token not found".to_string()))
    }

    async fn delete_refresh_token(&self, token: &str) -> PortResult<bool> {
        Ok(self.refresh_tokens.write().await.remove(token).is_some())
    }

    async fn insert_article(&self, article: NewArticle) -> PortResult<Article> {
        let now = Utc::now();
        let stored = Article {
            id: Uuid::new_v4(),
            author_id: article.author_id,
            title: article.title,
            content: article.content,
            tags: article.tags,
            likes: Vec::new(),
            views: 0,
            created_at: now,
            updated_at: now,
        };
        self.articles.write().await.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn find_article(&self, article_id: Uuid) -> PortResult<Article> {
        self.articles
            .read()
            .await
            .get(&article_id)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("Article {} not found", article_id)))
    }

    async fn update_article(
        &self,
        article_id: Uuid,
        update: ArticleUpdate,
    ) -> PortResult<Article> {
        let mut articles = self.articles.write().await;
        let article = articles
            .get_mut(&article_id)
            .ok_or_else(|| PortError::NotFound(format!("Article {} not found", article_id)))?;
        if let Some(title) = update.title {
            article.title = title;
        }
        if let Some(content) = update.content {
            article.content = content;
        }
        if let Some(tags) = update.tags {
            article.tags = tags;
        }
        article.updated_at = Utc::now();
        Ok(article.clone())
    }

    async fn delete_article(&self, article_id: Uuid) -> PortResult<()> {
        self.articles.write().await.remove(&article_id);
        // Comments go with their article, like the FK cascade.
        self.comments
            .write()
            .await
            .retain(|_, c| c.article_id != article_id);
        Ok(())
    }

    async fn list_articles(
        &self,
        filter: ArticleFilter,
        offset: i64,
        limit: i64,
    ) -> PortResult<Vec<Article>> {
        let mut matched: Vec<Article> = self
            .articles
            .read()
            .await
            .values()
            .filter(|a| matches_filter(a, &filter))
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(page(matched, offset, limit))
    }

    async fn count_articles(&self, filter: ArticleFilter) -> PortResult<i64> {
        let count = self
            .articles
            .read()
            .await
            .values()
            .filter(|a| matches_filter(a, &filter))
            .count();
        Ok(count as i64)
    }

    async fn search_articles(
        &self,
        query: &str,
        offset: i64,
        limit: i64,
    ) -> PortResult<Vec<Article>> {
        // Substring match stands in for the Postgres text-search index.
        let mut matched: Vec<Article> = self
            .articles
            .read()
            .await
            .values()
            .filter(|a| contains_ci(&a.title, query) || contains_ci(&a.content, query))
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(page(matched, offset, limit))
    }

    async fn count_search_articles(&self, query: &str) -> PortResult<i64> {
        let count = self
            .articles
            .read()
            .await
            .values()
            .filter(|a| contains_ci(&a.title, query) || contains_ci(&a.content, query))
            .count();
        Ok(count as i64)
    }

    async fn toggle_article_like(
        &self,
        article_id: Uuid,
        user_id: Uuid,
    ) -> PortResult<(Article, bool)> {
        let mut articles = self.articles.write().await;
        let article = articles
            .get_mut(&article_id)
            .ok_or_else(|| PortError::NotFound(format!("Article {} not found", article_id)))?;
        let liked = if article.likes.contains(&user_id) {
            article.likes.retain(|id| *id != user_id);
            false
        } else {
            article.likes.push(user_id);
            true
        };
        article.updated_at = Utc::now();
        Ok((article.clone(), liked))
    }

    async fn record_article_view(&self, article_id: Uuid) -> PortResult<i64> {
        let mut articles = self.articles.write().await;
        let article = articles
            .get_mut(&article_id)
            .ok_or_else(|| PortError::NotFound(format!("Article {} not found", article_id)))?;
        article.views += 1;
        Ok(article.views)
    }

    async fn insert_comment(&self, comment: NewComment) -> PortResult<Comment> {
        let stored = Comment {
            id: Uuid::new_v4(),
            article_id: comment.article_id,
            author_id: comment.author_id,
            content: comment.content,
            created_at: Utc::now(),
        };
        self.comments.write().await.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn find_comment(&self, comment_id: Uuid) -> PortResult<Comment> {
        self.comments
            .read()
            .await
            .get(&comment_id)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("Comment {} not found", comment_id)))
    }

    async fn update_comment(&self, comment_id: Uuid, content: &str) -> PortResult<Comment> {
        let mut comments = self.comments.write().await;
        let comment = comments
            .get_mut(&comment_id)
            .ok_or_else(|| PortError::NotFound(format!("Comment {} not found", comment_id)))?;
        comment.content = content.to_string();
        Ok(comment.clone())
    }

    async fn delete_comment(&self, comment_id: Uuid) -> PortResult<()> {
        self.comments.write().await.remove(&comment_id);
        Ok(())
    }

    async fn list_comments(
        &self,
        article_id: Uuid,
        content: Option<&str>,
        offset: i64,
        limit: i64,
    ) -> PortResult<Vec<Comment>> {
        let mut matched: Vec<Comment> = self
            .comments
            .read()
            .await
            .values()
            .filter(|c| c.article_id == article_id)
            .filter(|c| content.map_or(true, |needle| contains_ci(&c.content, needle)))
            .cloned()
            .collect();
        matched.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(page(matched, offset, limit))
    }

    async fn count_comments(&self, article_id: Uuid, content: Option<&str>) -> PortResult<i64> {
        let count = self
            .comments
            .read()
            .await
            .values()
            .filter(|c| c.article_id == article_id)
            .filter(|c| content.map_or(true, |needle| contains_ci(&c.content, needle)))
            .count();
        Ok(count as i64)
    }

    async fn insert_notification(
        &self,
        notification: NewNotification,
    ) -> PortResult<Notification> {
        let stored = Notification {
            id: Uuid::new_v4(),
            recipient_id: notification.recipient_id,
            actor_id: notification.actor_id,
            kind: notification.kind,
            title: notification.title,
            body: notification.body,
            url: notification.url,
            read: false,
            meta: notification.meta,
            created_at: Utc::now(),
        };
        self.notifications
            .write()
            .await
            .insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn list_notifications(
        &self,
        recipient_id: Uuid,
        offset: i64,
        limit: i64,
    ) -> PortResult<Vec<Notification>> {
        let mut matched: Vec<Notification> = self
            .notifications
            .read()
            .await
            .values()
            .filter(|n| n.recipient_id == recipient_id)
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(page(matched, offset, limit))
    }

    async fn count_notifications(&self, recipient_id: Uuid) -> PortResult<i64> {
        let count = self
            .notifications
            .read()
            .await
            .values()
            .filter(|n| n.recipient_id == recipient_id)
            .count();
        Ok(count as i64)
    }

    async fn mark_notification_read(
        &self,
        notification_id: Uuid,
        recipient_id: Uuid,
    ) -> PortResult<Notification> {
        let mut notifications = self.notifications.write().await;
        // A wrong-recipient hit reads exactly like a missing row.
        let notification = notifications
            .get_mut(&notification_id)
            .filter(|n| n.recipient_id == recipient_id)
            .ok_or_else(|| {
                PortError::NotFound(format!("Notification {} not found", notification_id))
            })?;
        notification.read = true;
        Ok(notification.clone())
    }
}
