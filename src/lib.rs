use axum::{
    Router,
    extract::{FromRef, Request},
    http::HeaderName,
    middleware::{self, Next},
    response::Response,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

pub mod auth;
pub mod config;
pub mod error;
pub mod gate;
pub mod handlers;
pub mod memory;
pub mod models;
pub mod password;
pub mod repository;
pub mod token;
pub mod validation;

// Public and authenticated route groups.
pub mod routes;
use auth::AuthUser;
use routes::{authenticated, public};

// --- Public Re-exports ---

pub use config::AppConfig;
pub use gate::AuthorizationGate;
pub use memory::InMemoryRepository;
pub use repository::{PostgresRepository, RepositoryState, SubscriptionState};
pub use token::TokenService;

/// ApiDoc
///
/// OpenAPI document aggregated from the `#[utoipa::path]` handlers and the
/// `ToSchema` payloads. Served at `/api-docs/openapi.json`.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::register, handlers::login, handlers::get_me, handlers::update_me,
        handlers::get_themes, handlers::get_subscribed_themes, handlers::subscribe,
        handlers::unsubscribe, handlers::get_articles, handlers::get_article,
        handlers::post_article, handlers::post_comment, handlers::get_comments
    ),
    components(
        schemas(
            models::RegisterRequest, models::LoginRequest, models::UpdateUserRequest,
            models::ArticleRequest, models::CommentRequest, models::AuthResponse,
            models::UserInfoResponse, models::MessageResponse, models::ThemeResponse,
            models::ThemeSubscriptionResponse, models::ArticleSummaryResponse,
            models::MultipleArticlesResponse, models::CommentResponse,
            models::SingleArticleResponse, error::ErrorResponse,
        )
    ),
    tags(
        (name = "mdd", description = "Theme subscription and article API")
    )
)]
struct ApiDoc;

/// AppState
///
/// The single shared container handed to every handler. All members are cheap
/// clones of immutable or internally synchronized services.
#[derive(Clone)]
pub struct AppState {
    /// Users, themes, articles and comments.
    pub repo: RepositoryState,
    /// Subscription rows; the only shared mutable state the gate depends on.
    pub subscriptions: SubscriptionState,
    /// Token issuance and verification with the process-lifetime key.
    pub tokens: TokenService,
    /// Subscription policy over `repo` and `subscriptions`.
    pub gate: AuthorizationGate,
}

impl AppState {
    /// Wires the gate to the same collaborators the handlers use.
    pub fn new(
        repo: RepositoryState,
        subscriptions: SubscriptionState,
        tokens: TokenService,
    ) -> Self {
        let gate = AuthorizationGate::new(repo.clone(), subscriptions.clone());
        Self {
            repo,
            subscriptions,
            tokens,
            gate,
        }
    }
}

// --- Axum FromRef Extractor Implementations ---

impl FromRef<AppState> for RepositoryState {
    fn from_ref(app_state: &AppState) -> RepositoryState {
        app_state.repo.clone()
    }
}

impl FromRef<AppState> for SubscriptionState {
    fn from_ref(app_state: &AppState) -> SubscriptionState {
        app_state.subscriptions.clone()
    }
}

impl FromRef<AppState> for TokenService {
    fn from_ref(app_state: &AppState) -> TokenService {
        app_state.tokens.clone()
    }
}

impl FromRef<AppState> for AuthorizationGate {
    fn from_ref(app_state: &AppState) -> AuthorizationGate {
        app_state.gate.clone()
    }
}

/// require_authenticated
///
/// Route layer for the authenticated group: the `AuthUser` extractor rejects
/// unauthenticated requests with 401 before any handler runs.
async fn require_authenticated(_auth_user: AuthUser, request: Request, next: Next) -> Response {
    next.run(request).await
}

/// create_router
///
/// Assembles routes, state and middleware. `auth::authenticate` wraps every route,
/// so each inbound request has its identity resolved exactly once before routing.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    let x_request_id = HeaderName::from_static("x-request-id");

    let base_router = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(public::public_routes())
        .merge(
            authenticated::authenticated_routes()
                .route_layer(middleware::from_fn(require_authenticated)),
        )
        .layer(middleware::from_fn_with_state(state.clone(), auth::authenticate))
        .with_state(state);

    // Observability and correlation (outermost).
    base_router
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                .layer(PropagateRequestIdLayer::new(x_request_id)),
        )
        .layer(cors)
}

/// trace_span_logger
///
/// Span per request carrying method, URI and the `x-request-id` assigned above.
/// The Authorization header is deliberately not recorded.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}
