use crate::error::StoreError;
use crate::models::{Article, ArticleRequest, Comment, NewUser, Subscription, Theme, User};
use async_trait::async_trait;
use sqlx::PgPool;
use std::sync::Arc;

/// Repository Trait
///
/// Persistence contract for users and theme-scoped content. Handlers and the
/// authorization gate only see this trait, so the Postgres and in-memory
/// implementations are interchangeable.
///
/// **Send + Sync + async_trait** keep `Arc<dyn Repository>` usable across Axum tasks.
#[async_trait]
pub trait Repository: Send + Sync {
    // --- Users ---
    async fn get_user(&self, id: i64) -> Result<Option<User>, StoreError>;
    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;
    async fn get_user_by_username(&self, username: &str) -> Result<Option<User>, StoreError>;
    // Unique username/email conflicts surface as `StoreError::UniqueViolation`.
    async fn create_user(&self, user: NewUser) -> Result<User, StoreError>;
    // Persists username, email, digest and password_changed_at; bumps updated_at.
    async fn update_user(&self, user: User) -> Result<User, StoreError>;

    // --- Themes ---
    async fn get_themes(&self) -> Result<Vec<Theme>, StoreError>;
    async fn get_theme(&self, id: i64) -> Result<Option<Theme>, StoreError>;
    async fn create_theme(&self, title: &str, description: Option<&str>)
    -> Result<Theme, StoreError>;

    // --- Articles ---
    // Creation order: the source order the visibility filter preserves.
    async fn get_articles(&self) -> Result<Vec<Article>, StoreError>;
    async fn get_article(&self, id: i64) -> Result<Option<Article>, StoreError>;
    async fn create_article(
        &self,
        user_id: i64,
        theme_id: i64,
        req: ArticleRequest,
    ) -> Result<Article, StoreError>;

    // --- Comments ---
    async fn get_comments(&self, article_id: i64) -> Result<Vec<Comment>, StoreError>;
    async fn create_comment(
        &self,
        user_id: i64,
        article_id: i64,
        text: String,
    ) -> Result<Comment, StoreError>;
}

/// SubscriptionStore Trait
///
/// Owner of the subscription rows. Implementations must guarantee at most one row
/// per `(user_id, theme_id)`: `create` on an existing pair fails with
/// `StoreError::UniqueViolation` instead of inserting a duplicate.
#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    async fn find(&self, user_id: i64, theme_id: i64) -> Result<Option<Subscription>, StoreError>;
    async fn list_for_user(&self, user_id: i64) -> Result<Vec<Subscription>, StoreError>;
    async fn create(
        &self,
        user_id: i64,
        theme_id: i64,
        subscribed: bool,
    ) -> Result<Subscription, StoreError>;
    /// Sets the flag only if it differs. Returns false when the row already held
    /// `subscribed` (or does not exist), so concurrent toggles have one winner.
    async fn set_subscribed(&self, subscription_id: i64, subscribed: bool)
    -> Result<bool, StoreError>;
}

pub type RepositoryState = Arc<dyn Repository>;
pub type SubscriptionState = Arc<dyn SubscriptionStore>;

/// PostgresRepository
///
/// Postgres-backed implementation of both collaborator traits over one pool.
/// Queries are runtime-checked (`query_as` + `bind`) against the schema in `migrations/`.
#[derive(Clone)]
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const USER_COLUMNS: &str =
    "id, username, email, password_digest, created_at, updated_at, password_changed_at";
const THEME_COLUMNS: &str = "id, title, description, created_at, updated_at";
const ARTICLE_COLUMNS: &str = "id, user_id, theme_id, title, description, created_at, updated_at";
const COMMENT_COLUMNS: &str = "id, user_id, article_id, comment, created_at, updated_at";
const SUBSCRIPTION_COLUMNS: &str =
    "id, user_id, theme_id, is_subscribed, created_at, updated_at";

#[async_trait]
impl Repository for PostgresRepository {
    async fn get_user(&self, id: i64) -> Result<Option<User>, StoreError> {
        sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(StoreError::from_sqlx)
    }

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1"))
            .bind(email)
            .fetch_optional(&self.pool)
            .await
            .map_err(StoreError::from_sqlx)
    }

    async fn get_user_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE username = $1"
        ))
        .bind(username)
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::from_sqlx)
    }

    /// create_user
    ///
    /// Relies on the unique indexes on `username` and `email`; a concurrent duplicate
    /// registration is reported as `UniqueViolation` rather than a fault.
    async fn create_user(&self, user: NewUser) -> Result<User, StoreError> {
        sqlx::query_as::<_, User>(&format!(
            "INSERT INTO users (username, email, password_digest, created_at, updated_at) \
             VALUES ($1, $2, $3, NOW(), NOW()) RETURNING {USER_COLUMNS}"
        ))
        .bind(user.username)
        .bind(user.email)
        .bind(user.password_digest)
        .fetch_one(&self.pool)
        .await
        .map_err(StoreError::from_sqlx)
    }

    async fn update_user(&self, user: User) -> Result<User, StoreError> {
        sqlx::query_as::<_, User>(&format!(
            "UPDATE users SET username = $2, email = $3, password_digest = $4, \
             password_changed_at = $5, updated_at = NOW() \
             WHERE id = $1 RETURNING {USER_COLUMNS}"
        ))
        .bind(user.id)
        .bind(user.username)
        .bind(user.email)
        .bind(user.password_digest)
        .bind(user.password_changed_at)
        .fetch_one(&self.pool)
        .await
        .map_err(StoreError::from_sqlx)
    }

    async fn get_themes(&self) -> Result<Vec<Theme>, StoreError> {
        sqlx::query_as::<_, Theme>(&format!("SELECT {THEME_COLUMNS} FROM themes ORDER BY id"))
            .fetch_all(&self.pool)
            .await
            .map_err(StoreError::from_sqlx)
    }

    async fn get_theme(&self, id: i64) -> Result<Option<Theme>, StoreError> {
        sqlx::query_as::<_, Theme>(&format!("SELECT {THEME_COLUMNS} FROM themes WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(StoreError::from_sqlx)
    }

    async fn create_theme(
        &self,
        title: &str,
        description: Option<&str>,
    ) -> Result<Theme, StoreError> {
        sqlx::query_as::<_, Theme>(&format!(
            "INSERT INTO themes (title, description, created_at, updated_at) \
             VALUES ($1, $2, NOW(), NOW()) RETURNING {THEME_COLUMNS}"
        ))
        .bind(title)
        .bind(description)
        .fetch_one(&self.pool)
        .await
        .map_err(StoreError::from_sqlx)
    }

    async fn get_articles(&self) -> Result<Vec<Article>, StoreError> {
        sqlx::query_as::<_, Article>(&format!(
            "SELECT {ARTICLE_COLUMNS} FROM articles ORDER BY created_at ASC, id ASC"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::from_sqlx)
    }

    async fn get_article(&self, id: i64) -> Result<Option<Article>, StoreError> {
        sqlx::query_as::<_, Article>(&format!(
            "SELECT {ARTICLE_COLUMNS} FROM articles WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::from_sqlx)
    }

    async fn create_article(
        &self,
        user_id: i64,
        theme_id: i64,
        req: ArticleRequest,
    ) -> Result<Article, StoreError> {
        sqlx::query_as::<_, Article>(&format!(
            "INSERT INTO articles (user_id, theme_id, title, description, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, NOW(), NOW()) RETURNING {ARTICLE_COLUMNS}"
        ))
        .bind(user_id)
        .bind(theme_id)
        .bind(req.title)
        .bind(req.description)
        .fetch_one(&self.pool)
        .await
        .map_err(StoreError::from_sqlx)
    }

    async fn get_comments(&self, article_id: i64) -> Result<Vec<Comment>, StoreError> {
        sqlx::query_as::<_, Comment>(&format!(
            "SELECT {COMMENT_COLUMNS} FROM comments WHERE article_id = $1 \
             ORDER BY created_at ASC, id ASC"
        ))
        .bind(article_id)
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::from_sqlx)
    }

    async fn create_comment(
        &self,
        user_id: i64,
        article_id: i64,
        text: String,
    ) -> Result<Comment, StoreError> {
        sqlx::query_as::<_, Comment>(&format!(
            "INSERT INTO comments (user_id, article_id, comment, created_at, updated_at) \
             VALUES ($1, $2, $3, NOW(), NOW()) RETURNING {COMMENT_COLUMNS}"
        ))
        .bind(user_id)
        .bind(article_id)
        .bind(text)
        .fetch_one(&self.pool)
        .await
        .map_err(StoreError::from_sqlx)
    }
}

#[async_trait]
impl SubscriptionStore for PostgresRepository {
    async fn find(&self, user_id: i64, theme_id: i64) -> Result<Option<Subscription>, StoreError> {
        sqlx::query_as::<_, Subscription>(&format!(
            "SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions WHERE user_id = $1 AND theme_id = $2"
        ))
        .bind(user_id)
        .bind(theme_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::from_sqlx)
    }

    async fn list_for_user(&self, user_id: i64) -> Result<Vec<Subscription>, StoreError> {
        sqlx::query_as::<_, Subscription>(&format!(
            "SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions WHERE user_id = $1 ORDER BY id"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::from_sqlx)
    }

    /// create
    ///
    /// Conditional insert against the `(user_id, theme_id)` unique index. When a
    /// concurrent request has already inserted the pair, no row comes back and the
    /// call reports `UniqueViolation`.
    async fn create(
        &self,
        user_id: i64,
        theme_id: i64,
        subscribed: bool,
    ) -> Result<Subscription, StoreError> {
        let inserted = sqlx::query_as::<_, Subscription>(&format!(
            "INSERT INTO subscriptions (user_id, theme_id, is_subscribed, created_at, updated_at) \
             VALUES ($1, $2, $3, NOW(), NOW()) \
             ON CONFLICT (user_id, theme_id) DO NOTHING \
             RETURNING {SUBSCRIPTION_COLUMNS}"
        ))
        .bind(user_id)
        .bind(theme_id)
        .bind(subscribed)
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::from_sqlx)?;

        inserted.ok_or_else(|| StoreError::UniqueViolation("subscriptions_user_theme_key".into()))
    }

    async fn set_subscribed(
        &self,
        subscription_id: i64,
        subscribed: bool,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE subscriptions SET is_subscribed = $2, updated_at = NOW() \
             WHERE id = $1 AND is_subscribed <> $2",
        )
        .bind(subscription_id)
        .bind(subscribed)
        .execute(&self.pool)
        .await
        .map_err(StoreError::from_sqlx)?;

        Ok(result.rows_affected() > 0)
    }
}
