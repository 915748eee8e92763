use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use ts_rs::TS;
use utoipa::ToSchema;

// --- Stored Rows ---

/// User
///
/// A registered account from the `users` table. `password_digest` never leaves the
/// server: it is skipped on serialization and absent from every response payload.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, Default)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_digest: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub password_changed_at: Option<DateTime<Utc>>,
}

/// NewUser
///
/// Insert payload for a user whose password has already been hashed.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_digest: String,
}

/// Theme
///
/// A topic that scopes articles; users subscribe to themes individually.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, Default)]
pub struct Theme {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Article
///
/// Theme-scoped content. `theme_id` is the key the subscription gate checks.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, Default, PartialEq)]
pub struct Article {
    pub id: i64,
    pub user_id: i64,
    pub theme_id: i64,
    pub title: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, Default)]
pub struct Comment {
    pub id: i64,
    pub user_id: i64,
    pub article_id: i64,
    pub comment: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Subscription
///
/// At most one row per `(user_id, theme_id)`. Rows are never deleted; access is
/// granted only while `is_subscribed` is true.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, Default, PartialEq)]
pub struct Subscription {
    pub id: i64,
    pub user_id: i64,
    pub theme_id: i64,
    pub is_subscribed: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// --- Request Payloads ---

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

/// LoginRequest
///
/// `identifier` is matched against the email first, then the username.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct LoginRequest {
    pub identifier: String,
    pub password: String,
}

/// UpdateUserRequest
///
/// Partial profile update; `None` or empty strings leave the field unchanged.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct UpdateUserRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct ArticleRequest {
    pub title: String,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct CommentRequest {
    pub comment: String,
}

// --- Response Payloads ---

/// AuthResponse
///
/// Returned by register and login: the bearer token plus the public user fields.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct AuthResponse {
    pub token: String,
    pub id: i64,
    pub username: String,
    pub email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct UserInfoResponse {
    pub id: i64,
    pub username: String,
    pub email: String,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,
}

impl From<User> for UserInfoResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct ThemeResponse {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
}

impl From<Theme> for ThemeResponse {
    fn from(theme: Theme) -> Self {
        Self {
            id: theme.id,
            title: theme.title,
            description: theme.description,
        }
    }
}

/// ThemeSubscriptionResponse
///
/// One subscription row joined (by explicit lookup) with its theme's title and description.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct ThemeSubscriptionResponse {
    pub id: i64,
    pub theme_id: i64,
    pub title: String,
    pub description: Option<String>,
    pub is_subscribed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct ArticleSummaryResponse {
    pub id: i64,
    pub theme_id: i64,
    pub user_id: i64,
    pub username: String,
    pub title: String,
    pub description: String,
    #[ts(type = "string")]
    pub publication_date: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct MultipleArticlesResponse {
    pub articles: Vec<ArticleSummaryResponse>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct CommentResponse {
    pub id: i64,
    pub username: String,
    pub comment: String,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
}

/// SingleArticleResponse
///
/// Article detail view. Author and theme names come from explicit collaborator lookups.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct SingleArticleResponse {
    pub id: i64,
    pub author: String,
    #[ts(type = "string")]
    pub publication_date: DateTime<Utc>,
    pub theme: String,
    pub title: String,
    pub description: String,
    pub comments: Vec<CommentResponse>,
}
