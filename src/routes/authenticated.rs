use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post},
};

/// Authenticated Router Module
///
/// Every handler here receives a principal through the `AuthUser` extractor and
/// confirms the user still exists. Article and comment handlers then ask the
/// `AuthorizationGate` whether the principal is subscribed to the content's theme.
pub fn authenticated_routes() -> Router<AppState> {
    Router::<AppState>::new()
        // GET/PUT /api/users
        // Profile of the requesting user and partial credential updates.
        .route("/api/users", get(handlers::get_me).put(handlers::update_me))
        // --- Themes & Subscriptions ---
        // GET /api/themes
        .route("/api/themes", get(handlers::get_themes))
        // GET /api/themes/subscribed
        // Subscription rows of the user, including disabled ones.
        .route("/api/themes/subscribed", get(handlers::get_subscribed_themes))
        // POST /api/themes/subscribe?themeId=
        // Creates (201) or re-enables (200) the subscription; 400 if already active.
        .route("/api/themes/subscribe", post(handlers::subscribe))
        // POST /api/themes/unsubscribe?themeId=
        .route("/api/themes/unsubscribe", post(handlers::unsubscribe))
        // --- Articles ---
        // GET /api/articles lists subscribed themes only.
        // POST /api/articles?themeId= publishes into a subscribed theme.
        .route(
            "/api/articles",
            get(handlers::get_articles).post(handlers::post_article),
        )
        // GET /api/articles/{id}
        // Gated on the article's theme; carries author, theme title and comments.
        .route("/api/articles/{id}", get(handlers::get_article))
        // POST /api/articles/comment?articleId=
        .route("/api/articles/comment", post(handlers::post_comment))
        // --- Comments ---
        // GET /api/comments?articleId=
        .route("/api/comments", get(handlers::get_comments))
}
