use axum::{
    extract::{FromRequestParts, Request, State},
    http::{HeaderMap, header, request::Parts},
    middleware::Next,
    response::Response,
};

use crate::{error::AppError, token::TokenService};

/// Capability
///
/// The single capability an authenticated request can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    AuthenticatedUser,
}

/// Principal
///
/// The identity resolved from a verified bearer token. Built once per request and
/// carried in that request's extensions; never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Principal {
    pub user_id: i64,
    pub capability: Capability,
}

impl Principal {
    pub fn new(user_id: i64) -> Self {
        Self {
            user_id,
            capability: Capability::AuthenticatedUser,
        }
    }
}

/// RequestIdentity
///
/// Per-request authentication state. `Unauthenticated` is not an error: handlers
/// that need a principal reject it themselves through the `AuthUser` extractor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestIdentity {
    Unauthenticated,
    Authenticated(Principal),
}

impl RequestIdentity {
    pub fn principal(&self) -> Option<Principal> {
        match self {
            RequestIdentity::Authenticated(principal) => Some(*principal),
            RequestIdentity::Unauthenticated => None,
        }
    }
}

/// Returns the token from an `Authorization: Bearer <token>` header, if any.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let token = value.strip_prefix("Bearer ")?;
    if token.is_empty() { None } else { Some(token) }
}

/// resolve_identity
///
/// Header → token → verify → subject → principal. Any failure along the way leaves
/// the request unauthenticated.
pub fn resolve_identity(headers: &HeaderMap, tokens: &TokenService) -> RequestIdentity {
    let Some(token) = bearer_token(headers) else {
        return RequestIdentity::Unauthenticated;
    };

    if !tokens.verify(token) {
        tracing::debug!("bearer token failed verification");
        return RequestIdentity::Unauthenticated;
    }

    match tokens.extract_subject(token) {
        Some(user_id) => RequestIdentity::Authenticated(Principal::new(user_id)),
        None => {
            tracing::debug!("bearer token carries no usable subject");
            RequestIdentity::Unauthenticated
        }
    }
}

/// authenticate
///
/// Middleware of shape `(request, next) -> response`. Attaches a `RequestIdentity`
/// to the request extensions and always forwards the request. A request that already
/// carries an identity is passed through untouched, so stacking the layer twice
/// still resolves the token only once.
pub async fn authenticate(
    State(tokens): State<TokenService>,
    mut request: Request,
    next: Next,
) -> Response {
    if request.extensions().get::<RequestIdentity>().is_none() {
        let identity = resolve_identity(request.headers(), &tokens);
        if let Some(principal) = identity.principal() {
            tracing::debug!(user_id = principal.user_id, "request authenticated");
        }
        request.extensions_mut().insert(identity);
    }
    next.run(request).await
}

/// AuthUser
///
/// Extractor for handlers that require a principal. Reads the identity left by
/// `authenticate`; a missing or unauthenticated identity is rejected with 401.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthUser(pub Principal);

impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<RequestIdentity>()
            .and_then(RequestIdentity::principal)
            .map(AuthUser)
            .ok_or_else(|| {
                AppError::Authentication("Authorization header is missing or invalid".to_string())
            })
    }
}
