use axum::{
    Extension, Router,
    body::{Body, to_bytes},
    extract::FromRequestParts,
    http::{HeaderMap, HeaderValue, Request, StatusCode, header},
    middleware,
    routing::get,
};
use mdd_api::{
    AppState, InMemoryRepository, RepositoryState, SubscriptionState, TokenService,
    auth::{self, AuthUser, Principal, RequestIdentity, bearer_token, resolve_identity},
    create_router,
    error::ErrorResponse,
    models::{NewUser, UserInfoResponse},
    repository::Repository,
};
use std::sync::Arc;
use tower::ServiceExt;

// --- Helper Functions ---

const SECRET_A: &[u8] =
    b"auth-tests-primary-secret-long-enough-for-hs512-signing-abcdefghijklmnop";
const SECRET_B: &[u8] =
    b"auth-tests-secondary-secret-long-enough-for-hs512-signing-qrstuvwxyz0123";

fn tokens(secret: &[u8]) -> TokenService {
    TokenService::new(secret).unwrap()
}

fn headers_with(value: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(header::AUTHORIZATION, HeaderValue::from_str(value).unwrap());
    headers
}

/// Echoes the identity the middleware attached, so tests can observe it.
async fn whoami(Extension(identity): Extension<RequestIdentity>) -> String {
    match identity {
        RequestIdentity::Authenticated(principal) => format!("user:{}", principal.user_id),
        RequestIdentity::Unauthenticated => "anonymous".to_string(),
    }
}

fn identity_router(service: TokenService) -> Router {
    Router::new()
        .route("/whoami", get(whoami))
        .layer(middleware::from_fn_with_state(service, auth::authenticate))
}

async fn call(router: Router, authorization: Option<&str>) -> (StatusCode, String) {
    let mut builder = Request::builder().uri("/whoami");
    if let Some(value) = authorization {
        builder = builder.header(header::AUTHORIZATION, value);
    }
    let response = router
        .oneshot(builder.body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, String::from_utf8(body.to_vec()).unwrap())
}

// --- Header Parsing ---

#[test]
fn test_bearer_token_requires_bearer_scheme() {
    assert_eq!(bearer_token(&headers_with("Bearer abc.def.ghi")), Some("abc.def.ghi"));

    assert_eq!(bearer_token(&HeaderMap::new()), None);
    assert_eq!(bearer_token(&headers_with("Basic dXNlcjpwYXNz")), None);
    assert_eq!(bearer_token(&headers_with("bearer abc.def.ghi")), None);
    assert_eq!(bearer_token(&headers_with("Bearer ")), None);
    assert_eq!(bearer_token(&headers_with("abc.def.ghi")), None);
}

// --- Identity Resolution ---

#[test]
fn test_resolve_identity_valid_token() {
    let service = tokens(SECRET_A);
    let token = service.issue(7).unwrap();

    let identity = resolve_identity(&headers_with(&format!("Bearer {token}")), &service);

    assert_eq!(identity, RequestIdentity::Authenticated(Principal::new(7)));
    assert_eq!(identity.principal().map(|p| p.user_id), Some(7));
}

#[test]
fn test_resolve_identity_failures_are_unauthenticated() {
    let service = tokens(SECRET_A);
    let foreign = tokens(SECRET_B).issue(7).unwrap();

    let cases = [
        HeaderMap::new(),
        headers_with("Token abc"),
        headers_with("Bearer "),
        headers_with("Bearer not-a-jwt"),
        headers_with(&format!("Bearer {foreign}")),
    ];

    for headers in cases {
        assert_eq!(
            resolve_identity(&headers, &service),
            RequestIdentity::Unauthenticated
        );
    }
}

// --- Middleware ---

#[tokio::test]
async fn test_middleware_attaches_identity_and_never_rejects() {
    let service = tokens(SECRET_A);
    let token = service.issue(11).unwrap();
    let router = identity_router(service);

    let (status, body) = call(router.clone(), Some(format!("Bearer {token}").as_str())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "user:11");

    // Missing and malformed credentials still reach the handler.
    for header_value in [None, Some("Basic abc"), Some("Bearer "), Some("Bearer x.y.z")] {
        let (status, body) = call(router.clone(), header_value).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "anonymous");
    }
}

#[tokio::test]
async fn test_stacked_middleware_resolves_once() {
    // Outer layer uses key B; inner layer uses key A. A token signed with B only
    // stays authenticated if the inner layer leaves the existing identity alone.
    let token = tokens(SECRET_B).issue(21).unwrap();

    let router = Router::new()
        .route("/whoami", get(whoami))
        .layer(middleware::from_fn_with_state(tokens(SECRET_A), auth::authenticate))
        .layer(middleware::from_fn_with_state(tokens(SECRET_B), auth::authenticate));

    let (status, body) = call(router, Some(format!("Bearer {token}").as_str())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "user:21");
}

#[tokio::test]
async fn test_concurrent_requests_keep_their_own_identity() {
    let service = tokens(SECRET_A);
    let router = identity_router(service.clone());

    let mut handles = Vec::new();
    for user_id in 1..=16_i64 {
        let router = router.clone();
        let token = service.issue(user_id).unwrap();
        handles.push(tokio::spawn(async move {
            let (_, body) = call(router, Some(format!("Bearer {token}").as_str())).await;
            (user_id, body)
        }));
    }

    for handle in handles {
        let (user_id, body) = handle.await.unwrap();
        assert_eq!(body, format!("user:{user_id}"));
    }
}

// --- Extractor ---

#[tokio::test]
async fn test_auth_user_extractor() {
    let (mut parts, _) = Request::builder()
        .uri("/")
        .body(())
        .unwrap()
        .into_parts();

    // No identity attached at all.
    let missing = AuthUser::from_request_parts(&mut parts, &()).await;
    assert_eq!(missing.unwrap_err().status(), StatusCode::UNAUTHORIZED);

    parts.extensions.insert(RequestIdentity::Unauthenticated);
    let anonymous = AuthUser::from_request_parts(&mut parts, &()).await;
    assert_eq!(anonymous.unwrap_err().status(), StatusCode::UNAUTHORIZED);

    parts
        .extensions
        .insert(RequestIdentity::Authenticated(Principal::new(3)));
    let AuthUser(principal) = AuthUser::from_request_parts(&mut parts, &()).await.unwrap();
    assert_eq!(principal, Principal::new(3));
}

// --- Full Router ---

fn app(service: TokenService) -> Router {
    let repo = Arc::new(InMemoryRepository::new());
    let state = AppState::new(
        repo.clone() as RepositoryState,
        repo as SubscriptionState,
        service,
    );
    create_router(state)
}

#[tokio::test]
async fn test_protected_route_rejects_anonymous_with_error_payload() {
    let router = app(tokens(SECRET_A));

    let response = router
        .oneshot(
            Request::builder()
                .uri("/api/themes")
                .header(header::AUTHORIZATION, "Bearer forged.token.value")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let error: ErrorResponse = serde_json::from_slice(&body).unwrap();
    assert_eq!(error.status, 401);
    assert_eq!(error.message, "Authorization header is missing or invalid");
}

#[tokio::test]
async fn test_public_route_ignores_bad_credentials() {
    let router = app(tokens(SECRET_A));

    let response = router
        .oneshot(
            Request::builder()
                .uri("/health")
                .header(header::AUTHORIZATION, "Bearer garbage")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));
}

#[tokio::test]
async fn test_token_for_deleted_user_is_unauthorized() {
    // Valid signature, but no such user in the store.
    let service = tokens(SECRET_A);
    let token = service.issue(404).unwrap();
    let router = app(service);

    let response = router
        .oneshot(
            Request::builder()
                .uri("/api/themes")
                .header(header::AUTHORIZATION, format!("Bearer {token}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_router_verifies_tokens_with_the_app_state_key() {
    // The router's identity layer reads its TokenService out of AppState, so a
    // token issued by that same service reaches the profile handler.
    let repo = Arc::new(InMemoryRepository::new());
    let user = repo
        .create_user(NewUser {
            username: "frank".to_string(),
            email: "frank@example.com".to_string(),
            password_digest: "digest".to_string(),
        })
        .await
        .unwrap();
    let service = tokens(SECRET_A);
    let token = service.issue(user.id).unwrap();
    let router = create_router(AppState::new(
        repo.clone() as RepositoryState,
        repo as SubscriptionState,
        service,
    ));

    let response = router
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/users")
                .header(header::AUTHORIZATION, format!("Bearer {token}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let profile: UserInfoResponse = serde_json::from_slice(&body).unwrap();
    assert_eq!(profile.username, "frank");

    // Same subject, different key: rejected by the same router.
    let foreign = tokens(SECRET_B).issue(user.id).unwrap();
    let response = router
        .oneshot(
            Request::builder()
                .uri("/api/users")
                .header(header::AUTHORIZATION, format!("Bearer {foreign}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}
