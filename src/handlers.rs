use std::collections::HashMap;

use crate::{
    AppState,
    auth::AuthUser,
    error::{AppError, StoreError},
    gate::{AuthorizationGate, SubscribeOutcome},
    models::{
        Article, ArticleRequest, ArticleSummaryResponse, AuthResponse, Comment, CommentRequest,
        CommentResponse, LoginRequest, MessageResponse, MultipleArticlesResponse, NewUser,
        RegisterRequest, SingleArticleResponse, ThemeResponse, ThemeSubscriptionResponse,
        UpdateUserRequest, User, UserInfoResponse,
    },
    password::{hash_password, verify_password},
    repository::{RepositoryState, SubscriptionState},
    validation::Validate,
};
use axum::{
    Json,
    extract::{
        Path, Query, State,
        rejection::{JsonRejection, QueryRejection},
    },
    http::StatusCode,
};
use chrono::Utc;
use serde::Deserialize;

// --- Query Structs ---

/// ThemeParams
///
/// `?themeId=` selector for the subscribe/unsubscribe and article creation endpoints.
#[derive(Debug, Deserialize, utoipa::IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query, rename_all = "camelCase")]
pub struct ThemeParams {
    pub theme_id: i64,
}

/// ArticleParams
///
/// `?articleId=` selector for the comment endpoints.
#[derive(Debug, Deserialize, utoipa::IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query, rename_all = "camelCase")]
pub struct ArticleParams {
    pub article_id: i64,
}

// --- Helpers ---

fn check<T: Validate>(payload: &T) -> Result<(), AppError> {
    payload
        .validate()
        .map_err(|errors| AppError::validation("Bad request", errors))
}

/// Argon2 is CPU-bound, so hashing and verification run off the async workers.
async fn digest_password(password: String) -> Result<String, AppError> {
    tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| AppError::Internal(format!("password hashing task failed: {e}")))?
        .map_err(|e| {
            tracing::error!(error = %e, "password hashing failed");
            AppError::Internal("Internal server error".to_string())
        })
}

async fn password_matches(password: String, digest: String) -> Result<bool, AppError> {
    tokio::task::spawn_blocking(move || verify_password(&password, &digest))
        .await
        .map_err(|e| AppError::Internal(format!("password verification task failed: {e}")))
}

fn auth_response(state: &AppState, user: &User) -> Result<AuthResponse, AppError> {
    let token = state.tokens.issue(user.id).map_err(|e| {
        tracing::error!(error = %e, "token issuance failed");
        AppError::Internal("Internal server error".to_string())
    })?;
    Ok(AuthResponse {
        token,
        id: user.id,
        username: user.username.clone(),
        email: user.email.clone(),
    })
}

/// Resolves author usernames with one lookup per distinct user id.
async fn usernames(
    repo: &RepositoryState,
    user_ids: impl IntoIterator<Item = i64>,
) -> Result<HashMap<i64, String>, AppError> {
    let mut names = HashMap::new();
    for id in user_ids {
        if names.contains_key(&id) {
            continue;
        }
        let username = repo
            .get_user(id)
            .await?
            .map(|u| u.username)
            .unwrap_or_else(|| "unknown".to_string());
        names.insert(id, username);
    }
    Ok(names)
}

async fn comment_responses(
    repo: &RepositoryState,
    comments: Vec<Comment>,
) -> Result<Vec<CommentResponse>, AppError> {
    let names = usernames(repo, comments.iter().map(|c| c.user_id).collect::<Vec<_>>()).await?;
    Ok(comments
        .into_iter()
        .map(|c| CommentResponse {
            id: c.id,
            username: names.get(&c.user_id).cloned().unwrap_or_default(),
            comment: c.comment,
            created_at: c.created_at,
        })
        .collect())
}

async fn article_summaries(
    repo: &RepositoryState,
    articles: Vec<Article>,
) -> Result<Vec<ArticleSummaryResponse>, AppError> {
    let names = usernames(repo, articles.iter().map(|a| a.user_id).collect::<Vec<_>>()).await?;
    Ok(articles
        .into_iter()
        .map(|a| ArticleSummaryResponse {
            id: a.id,
            theme_id: a.theme_id,
            user_id: a.user_id,
            username: names.get(&a.user_id).cloned().unwrap_or_default(),
            title: a.title,
            description: a.description,
            publication_date: a.created_at,
        })
        .collect())
}

// --- Auth Handlers ---

/// register
///
/// [Public Route] Creates an account and returns a bearer token for it.
/// Duplicate usernames or emails are rejected with 409, including a duplicate
/// that slips past the pre-checks and is caught by the unique index.
#[utoipa::path(
    post,
    path = "/api/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Registered", body = AuthResponse),
        (status = 400, description = "Invalid payload", body = crate::error::ErrorResponse),
        (status = 409, description = "Username or email in use", body = crate::error::ErrorResponse)
    )
)]
pub async fn register(
    State(state): State<AppState>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<AuthResponse>), AppError> {
    let Json(payload) = payload?;
    check(&payload)?;

    if state.repo.get_user_by_username(&payload.username).await?.is_some() {
        return Err(AppError::Conflict("Username is already in use".to_string()));
    }
    if state.repo.get_user_by_email(&payload.email).await?.is_some() {
        return Err(AppError::Conflict("Email is already in use".to_string()));
    }

    let password_digest = digest_password(payload.password).await?;
    let user = state
        .repo
        .create_user(NewUser {
            username: payload.username,
            email: payload.email,
            password_digest,
        })
        .await
        .map_err(|e| match e {
            StoreError::UniqueViolation(_) => {
                AppError::Conflict("Username or email is already in use".to_string())
            }
            other => other.into(),
        })?;

    tracing::info!(user_id = user.id, "user registered");
    Ok((StatusCode::CREATED, Json(auth_response(&state, &user)?)))
}

/// login
///
/// [Public Route] Exchanges an email-or-username and password for a bearer token.
#[utoipa::path(
    post,
    path = "/api/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Logged in", body = AuthResponse),
        (status = 401, description = "Bad credentials", body = crate::error::ErrorResponse)
    )
)]
pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<AuthResponse>, AppError> {
    let Json(payload) = payload?;
    check(&payload)?;

    let user = match state.repo.get_user_by_email(&payload.identifier).await? {
        Some(user) => Some(user),
        None => state.repo.get_user_by_username(&payload.identifier).await?,
    }
    .ok_or_else(|| AppError::Authentication("Invalid username/email".to_string()))?;

    if !password_matches(payload.password, user.password_digest.clone()).await? {
        return Err(AppError::Authentication("Password is incorrect".to_string()));
    }

    Ok(Json(auth_response(&state, &user)?))
}

// --- User Handlers ---

/// get_me
///
/// [Authenticated Route] Profile of the requesting user.
#[utoipa::path(
    get,
    path = "/api/users",
    responses(
        (status = 200, description = "Profile", body = UserInfoResponse),
        (status = 404, description = "User not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn get_me(
    AuthUser(principal): AuthUser,
    State(repo): State<RepositoryState>,
) -> Result<Json<UserInfoResponse>, AppError> {
    let user = repo
        .get_user(principal.user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;
    Ok(Json(user.into()))
}

/// update_me
///
/// [Authenticated Route] Partial update of username, email and password.
/// A new password is re-hashed and stamps `password_changed_at`.
#[utoipa::path(
    put,
    path = "/api/users",
    request_body = UpdateUserRequest,
    responses(
        (status = 200, description = "Updated", body = MessageResponse),
        (status = 409, description = "Email or username taken", body = crate::error::ErrorResponse)
    )
)]
pub async fn update_me(
    AuthUser(principal): AuthUser,
    State(repo): State<RepositoryState>,
    payload: Result<Json<UpdateUserRequest>, JsonRejection>,
) -> Result<Json<MessageResponse>, AppError> {
    let Json(payload) = payload?;
    check(&payload)?;

    let mut user = repo
        .get_user(principal.user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    if let Some(email) = payload.email.filter(|s| !s.is_empty()) {
        if let Some(owner) = repo.get_user_by_email(&email).await? {
            if owner.id != user.id {
                return Err(AppError::Conflict("The new email is already taken!".to_string()));
            }
        }
        user.email = email;
    }

    if let Some(username) = payload.username.filter(|s| !s.is_empty()) {
        if let Some(owner) = repo.get_user_by_username(&username).await? {
            if owner.id != user.id {
                return Err(AppError::Conflict("The new username is already taken!".to_string()));
            }
        }
        user.username = username;
    }

    if let Some(password) = payload.password.filter(|s| !s.is_empty()) {
        user.password_digest = digest_password(password).await?;
        user.password_changed_at = Some(Utc::now());
    }

    repo.update_user(user).await.map_err(|e| match e {
        StoreError::UniqueViolation(_) => {
            AppError::Conflict("Username or email is already in use".to_string())
        }
        other => other.into(),
    })?;

    Ok(Json(MessageResponse::new(
        "Successfully changed the user credentials!",
    )))
}

// --- Theme Handlers ---

#[utoipa::path(
    get,
    path = "/api/themes",
    responses((status = 200, description = "All themes", body = [ThemeResponse]))
)]
pub async fn get_themes(
    AuthUser(principal): AuthUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<ThemeResponse>>, AppError> {
    state.gate.require_user(principal).await?;
    let themes = state.repo.get_themes().await?;
    Ok(Json(themes.into_iter().map(ThemeResponse::from).collect()))
}

/// get_subscribed_themes
///
/// [Authenticated Route] The user's subscription rows, active or not, each with its
/// theme's title and description resolved by explicit lookup.
#[utoipa::path(
    get,
    path = "/api/themes/subscribed",
    responses((status = 200, description = "My subscriptions", body = [ThemeSubscriptionResponse]))
)]
pub async fn get_subscribed_themes(
    AuthUser(principal): AuthUser,
    State(gate): State<AuthorizationGate>,
    State(subscriptions): State<SubscriptionState>,
    State(repo): State<RepositoryState>,
) -> Result<Json<Vec<ThemeSubscriptionResponse>>, AppError> {
    gate.require_user(principal).await?;
    let rows = subscriptions.list_for_user(principal.user_id).await?;

    let mut response = Vec::with_capacity(rows.len());
    for subscription in rows {
        let Some(theme) = repo.get_theme(subscription.theme_id).await? else {
            continue;
        };
        response.push(ThemeSubscriptionResponse {
            id: subscription.id,
            theme_id: theme.id,
            title: theme.title,
            description: theme.description,
            is_subscribed: subscription.is_subscribed,
        });
    }
    Ok(Json(response))
}

/// subscribe
///
/// [Authenticated Route] 201 when the subscription row is created, 200 when an
/// existing row is re-enabled, 400 when already subscribed.
#[utoipa::path(
    post,
    path = "/api/themes/subscribe",
    params(ThemeParams),
    responses(
        (status = 201, description = "Subscribed (new)", body = MessageResponse),
        (status = 200, description = "Subscribed (re-enabled)", body = MessageResponse),
        (status = 400, description = "Already subscribed", body = crate::error::ErrorResponse),
        (status = 404, description = "Theme not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn subscribe(
    AuthUser(principal): AuthUser,
    State(gate): State<AuthorizationGate>,
    params: Result<Query<ThemeParams>, QueryRejection>,
) -> Result<(StatusCode, Json<MessageResponse>), AppError> {
    let Query(params) = params?;
    gate.require_user(principal).await?;

    let status = match gate.subscribe(principal.user_id, params.theme_id).await? {
        SubscribeOutcome::Created(_) => StatusCode::CREATED,
        SubscribeOutcome::Resubscribed(_) => StatusCode::OK,
    };
    Ok((
        status,
        Json(MessageResponse::new("Successfully subscribed to the theme!")),
    ))
}

#[utoipa::path(
    post,
    path = "/api/themes/unsubscribe",
    params(ThemeParams),
    responses(
        (status = 200, description = "Unsubscribed", body = MessageResponse),
        (status = 400, description = "Not subscribed", body = crate::error::ErrorResponse),
        (status = 404, description = "Theme or subscription not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn unsubscribe(
    AuthUser(principal): AuthUser,
    State(gate): State<AuthorizationGate>,
    params: Result<Query<ThemeParams>, QueryRejection>,
) -> Result<Json<MessageResponse>, AppError> {
    let Query(params) = params?;
    gate.require_user(principal).await?;
    gate.unsubscribe(principal.user_id, params.theme_id).await?;
    Ok(Json(MessageResponse::new(
        "Successfully unsubscribed from the theme!",
    )))
}

// --- Article Handlers ---

/// get_articles
///
/// [Authenticated Route] The feed: only articles from themes the user is
/// currently subscribed to, in creation order.
#[utoipa::path(
    get,
    path = "/api/articles",
    responses((status = 200, description = "Visible articles", body = MultipleArticlesResponse))
)]
pub async fn get_articles(
    AuthUser(principal): AuthUser,
    State(state): State<AppState>,
) -> Result<Json<MultipleArticlesResponse>, AppError> {
    state.gate.require_user(principal).await?;
    let articles = state.gate.visible_articles(principal).await?;
    Ok(Json(MultipleArticlesResponse {
        articles: article_summaries(&state.repo, articles).await?,
    }))
}

#[utoipa::path(
    get,
    path = "/api/articles/{id}",
    params(("id" = i64, Path, description = "Article ID")),
    responses(
        (status = 200, description = "Article", body = SingleArticleResponse),
        (status = 403, description = "Not subscribed to the theme", body = crate::error::ErrorResponse),
        (status = 404, description = "Article not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn get_article(
    AuthUser(principal): AuthUser,
    State(state): State<AppState>,
    Path(article_id): Path<i64>,
) -> Result<Json<SingleArticleResponse>, AppError> {
    state.gate.require_user(principal).await?;
    let article = state.gate.authorize_article(principal, article_id).await?;

    let author = state
        .repo
        .get_user(article.user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Author not found".to_string()))?;
    let theme = state.gate.require_theme(article.theme_id).await?;
    let comments = state.repo.get_comments(article.id).await?;

    Ok(Json(SingleArticleResponse {
        id: article.id,
        author: author.username,
        publication_date: article.created_at,
        theme: theme.title,
        title: article.title,
        description: article.description,
        comments: comment_responses(&state.repo, comments).await?,
    }))
}

/// post_article
///
/// [Authenticated Route] Publishes into a theme the author is subscribed to.
#[utoipa::path(
    post,
    path = "/api/articles",
    params(ThemeParams),
    request_body = ArticleRequest,
    responses(
        (status = 201, description = "Published", body = MessageResponse),
        (status = 403, description = "Not subscribed to the theme", body = crate::error::ErrorResponse),
        (status = 404, description = "Theme not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn post_article(
    AuthUser(principal): AuthUser,
    State(state): State<AppState>,
    params: Result<Query<ThemeParams>, QueryRejection>,
    payload: Result<Json<ArticleRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<MessageResponse>), AppError> {
    let Query(params) = params?;
    let Json(payload) = payload?;
    state.gate.require_user(principal).await?;
    check(&payload)?;

    let theme = state.gate.require_theme(params.theme_id).await?;
    state.gate.authorize_theme(principal, theme.id).await?;
    let article = state
        .repo
        .create_article(principal.user_id, theme.id, payload)
        .await?;

    tracing::info!(article_id = article.id, theme_id = theme.id, "article published");
    Ok((
        StatusCode::CREATED,
        Json(MessageResponse::new(
            "Article has been successfully published !",
        )),
    ))
}

// --- Comment Handlers ---

#[utoipa::path(
    post,
    path = "/api/articles/comment",
    params(ArticleParams),
    request_body = CommentRequest,
    responses(
        (status = 201, description = "Comment published", body = MessageResponse),
        (status = 403, description = "Not subscribed to the theme", body = crate::error::ErrorResponse),
        (status = 404, description = "Article not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn post_comment(
    AuthUser(principal): AuthUser,
    State(state): State<AppState>,
    params: Result<Query<ArticleParams>, QueryRejection>,
    payload: Result<Json<CommentRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<MessageResponse>), AppError> {
    let Query(params) = params?;
    let Json(payload) = payload?;
    state.gate.require_user(principal).await?;
    check(&payload)?;

    let article = state
        .gate
        .authorize_article(principal, params.article_id)
        .await?;
    state
        .repo
        .create_comment(principal.user_id, article.id, payload.comment)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(MessageResponse::new(
            "Comment has been successfully published !",
        )),
    ))
}

#[utoipa::path(
    get,
    path = "/api/comments",
    params(ArticleParams),
    responses(
        (status = 200, description = "Comments of the article", body = [CommentResponse]),
        (status = 403, description = "Not subscribed to the theme", body = crate::error::ErrorResponse)
    )
)]
pub async fn get_comments(
    AuthUser(principal): AuthUser,
    State(state): State<AppState>,
    params: Result<Query<ArticleParams>, QueryRejection>,
) -> Result<Json<Vec<CommentResponse>>, AppError> {
    let Query(params) = params?;
    state.gate.require_user(principal).await?;
    let article = state
        .gate
        .authorize_article(principal, params.article_id)
        .await?;
    let comments = state.repo.get_comments(article.id).await?;
    Ok(Json(comment_responses(&state.repo, comments).await?))
}
