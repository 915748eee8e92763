use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;

use crate::error::StoreError;
use crate::models::{Article, ArticleRequest, Comment, NewUser, Subscription, Theme, User};
use crate::repository::{Repository, SubscriptionStore};

#[derive(Default)]
struct Tables {
    users: Vec<User>,
    themes: Vec<Theme>,
    articles: Vec<Article>,
    comments: Vec<Comment>,
    subscriptions: Vec<Subscription>,
    next_id: i64,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

/// InMemoryRepository
///
/// Process-local implementation of `Repository` and `SubscriptionStore`, used by the
/// test suites. It enforces the same unique keys as the Postgres schema: usernames,
/// emails, and `(user_id, theme_id)` subscription pairs.
///
/// Each trait call takes the lock once and never holds it across an await, so a
/// find-then-create sequence is as racy here as it is against a real database.
#[derive(Default)]
pub struct InMemoryRepository {
    tables: Mutex<Tables>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> Result<MutexGuard<'_, Tables>, StoreError> {
        self.tables
            .lock()
            .map_err(|_| StoreError::Other("in-memory store lock poisoned".to_string()))
    }
}

#[async_trait]
impl Repository for InMemoryRepository {
    async fn get_user(&self, id: i64) -> Result<Option<User>, StoreError> {
        Ok(self.tables()?.users.iter().find(|u| u.id == id).cloned())
    }

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        Ok(self.tables()?.users.iter().find(|u| u.email == email).cloned())
    }

    async fn get_user_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        Ok(self
            .tables()?
            .users
            .iter()
            .find(|u| u.username == username)
            .cloned())
    }

    async fn create_user(&self, user: NewUser) -> Result<User, StoreError> {
        let mut tables = self.tables()?;
        if tables.users.iter().any(|u| u.username == user.username) {
            return Err(StoreError::UniqueViolation("users_username_key".into()));
        }
        if tables.users.iter().any(|u| u.email == user.email) {
            return Err(StoreError::UniqueViolation("users_email_key".into()));
        }
        let now = Utc::now();
        let created = User {
            id: tables.next_id(),
            username: user.username,
            email: user.email,
            password_digest: user.password_digest,
            created_at: now,
            updated_at: now,
            password_changed_at: None,
        };
        tables.users.push(created.clone());
        Ok(created)
    }

    async fn update_user(&self, user: User) -> Result<User, StoreError> {
        let mut tables = self.tables()?;
        let clashes = |other: &User| {
            other.id != user.id && (other.username == user.username || other.email == user.email)
        };
        if tables.users.iter().any(clashes) {
            return Err(StoreError::UniqueViolation("users_username_or_email_key".into()));
        }
        let stored = tables
            .users
            .iter_mut()
            .find(|u| u.id == user.id)
            .ok_or_else(|| StoreError::Other(format!("user {} does not exist", user.id)))?;
        stored.username = user.username;
        stored.email = user.email;
        stored.password_digest = user.password_digest;
        stored.password_changed_at = user.password_changed_at;
        stored.updated_at = Utc::now();
        Ok(stored.clone())
    }

    async fn get_themes(&self) -> Result<Vec<Theme>, StoreError> {
        Ok(self.tables()?.themes.clone())
    }

    async fn get_theme(&self, id: i64) -> Result<Option<Theme>, StoreError> {
        Ok(self.tables()?.themes.iter().find(|t| t.id == id).cloned())
    }

    async fn create_theme(
        &self,
        title: &str,
        description: Option<&str>,
    ) -> Result<Theme, StoreError> {
        let mut tables = self.tables()?;
        let now = Utc::now();
        let theme = Theme {
            id: tables.next_id(),
            title: title.to_string(),
            description: description.map(str::to_string),
            created_at: now,
            updated_at: now,
        };
        tables.themes.push(theme.clone());
        Ok(theme)
    }

    async fn get_articles(&self) -> Result<Vec<Article>, StoreError> {
        Ok(self.tables()?.articles.clone())
    }

    async fn get_article(&self, id: i64) -> Result<Option<Article>, StoreError> {
        Ok(self.tables()?.articles.iter().find(|a| a.id == id).cloned())
    }

    async fn create_article(
        &self,
        user_id: i64,
        theme_id: i64,
        req: ArticleRequest,
    ) -> Result<Article, StoreError> {
        let mut tables = self.tables()?;
        let now = Utc::now();
        let article = Article {
            id: tables.next_id(),
            user_id,
            theme_id,
            title: req.title,
            description: req.description,
            created_at: now,
            updated_at: now,
        };
        tables.articles.push(article.clone());
        Ok(article)
    }

    async fn get_comments(&self, article_id: i64) -> Result<Vec<Comment>, StoreError> {
        Ok(self
            .tables()?
            .comments
            .iter()
            .filter(|c| c.article_id == article_id)
            .cloned()
            .collect())
    }

    async fn create_comment(
        &self,
        user_id: i64,
        article_id: i64,
        text: String,
    ) -> Result<Comment, StoreError> {
        let mut tables = self.tables()?;
        let now = Utc::now();
        let comment = Comment {
            id: tables.next_id(),
            user_id,
            article_id,
            comment: text,
            created_at: now,
            updated_at: now,
        };
        tables.comments.push(comment.clone());
        Ok(comment)
    }
}

#[async_trait]
impl SubscriptionStore for InMemoryRepository {
    async fn find(&self, user_id: i64, theme_id: i64) -> Result<Option<Subscription>, StoreError> {
        Ok(self
            .tables()?
            .subscriptions
            .iter()
            .find(|s| s.user_id == user_id && s.theme_id == theme_id)
            .cloned())
    }

    async fn list_for_user(&self, user_id: i64) -> Result<Vec<Subscription>, StoreError> {
        Ok(self
            .tables()?
            .subscriptions
            .iter()
            .filter(|s| s.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn create(
        &self,
        user_id: i64,
        theme_id: i64,
        subscribed: bool,
    ) -> Result<Subscription, StoreError> {
        let mut tables = self.tables()?;
        if tables
            .subscriptions
            .iter()
            .any(|s| s.user_id == user_id && s.theme_id == theme_id)
        {
            return Err(StoreError::UniqueViolation(
                "subscriptions_user_theme_key".into(),
            ));
        }
        let now = Utc::now();
        let subscription = Subscription {
            id: tables.next_id(),
            user_id,
            theme_id,
            is_subscribed: subscribed,
            created_at: now,
            updated_at: now,
        };
        tables.subscriptions.push(subscription.clone());
        Ok(subscription)
    }

    async fn set_subscribed(
        &self,
        subscription_id: i64,
        subscribed: bool,
    ) -> Result<bool, StoreError> {
        let mut tables = self.tables()?;
        match tables
            .subscriptions
            .iter_mut()
            .find(|s| s.id == subscription_id && s.is_subscribed != subscribed)
        {
            Some(row) => {
                row.is_subscribed = subscribed;
                row.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
