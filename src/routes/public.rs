use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post},
};

/// Public Router Module
///
/// Endpoints that do not require a bearer token. Registration and login are the
/// only places tokens are issued.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // GET /health
        // Liveness probe for load balancers and monitoring.
        .route("/health", get(|| async { "ok" }))
        // POST /api/auth/register
        // Creates the account (argon2 digest) and returns a token for it.
        .route("/api/auth/register", post(handlers::register))
        // POST /api/auth/login
        // Identifier may be the email or the username.
        .route("/api/auth/login", post(handlers::login))
}
