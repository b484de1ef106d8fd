use axum::{
    Router,
    extract::FromRef,
    http::{HeaderName, HeaderValue, StatusCode, header},
    middleware,
};
use std::time::Duration;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    set_header::SetResponseHeaderLayer,
    timeout::TimeoutLayer,
    trace::{DefaultOnResponse, TraceLayer},
};
use tower_sessions::{Expiry, SessionManagerLayer, SessionStore};
use tracing::{Level, Span};

// --- Module Structure ---

// The authorization core.
pub mod approval;
pub mod credentials;
pub mod policy;
pub mod session;

// Stores, models and shared plumbing.
pub mod config;
pub mod error;
pub mod forms;
pub mod models;
pub mod repository;

// HTTP boundary: policy middleware, handlers and the segregated route tables.
pub mod auth;
pub mod handlers;
pub mod routes;
use routes::{admin, author, authenticated, public};

// --- Public Re-exports ---

pub use config::AppConfig;
pub use credentials::{Argon2Verifier, VerifierState};
pub use repository::{
    AccountStoreState, ArticleStoreState, MemoryAccountStore, MemoryArticleStore,
    PostgresAccountStore, PostgresArticleStore,
};

/// ApiDoc
///
/// OpenAPI document for every JSON endpoint, served at `/api-docs/openapi.json`.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::home, handlers::show_article, handlers::show_category,
        handlers::signup, handlers::login, handlers::logout,
        handlers::create_article_form, handlers::create_article,
        handlers::pending_approvals, handlers::approve, handlers::revoke
    ),
    components(
        schemas(
            models::Role, models::Article, models::AccountSummary, models::SignupRequest,
            models::LoginRequest, models::CreateArticleRequest, models::AccountIdsRequest,
            models::ApprovalReport, models::HomePage, models::ArticlePage, models::CategoryPage,
            models::ArticleForm, models::PendingApprovals,
        )
    ),
    tags(
        (name = "aitu-news", description = "AITU News publishing API")
    )
)]
struct ApiDoc;

/// AppState
///
/// The explicit dependency context: built once in `main`, cloned cheaply into
/// every request, never mutated. Dropping the last clone tears it down.
#[derive(Clone)]
pub struct AppState {
    /// Account Store: identities, roles and approval flags.
    pub accounts: AccountStoreState,
    /// Article Store: published content.
    pub articles: ArticleStoreState,
    /// One-way credential hashing.
    pub verifier: VerifierState,
    /// The loaded, immutable configuration.
    pub config: AppConfig,
}

// --- Axum FromRef Extractor Implementations ---

// Let handlers that only touch one store extract just that store.

impl FromRef<AppState> for AccountStoreState {
    fn from_ref(app_state: &AppState) -> AccountStoreState {
        app_state.accounts.clone()
    }
}

impl FromRef<AppState> for ArticleStoreState {
    fn from_ref(app_state: &AppState) -> ArticleStoreState {
        app_state.articles.clone()
    }
}

/// create_router
///
/// Assembles the routing table and the ordered interceptor stack around it.
///
/// Outermost first: CORS, request id, tracing, request id propagation, panic
/// containment, security headers, request timeout, session loading. The
/// per-route policy layers (`require_authentication`, `require_author`) run
/// inside all of these.
pub fn create_router<Store>(state: AppState, session_store: Store) -> Router
where
    Store: SessionStore + Clone,
{
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    // Header name constant for Request Correlation.
    let x_request_id = HeaderName::from_static("x-request-id");

    let sessions = SessionManagerLayer::new(session_store)
        .with_secure(state.config.secure_cookies())
        .with_expiry(Expiry::OnInactivity(time::Duration::minutes(
            state.config.session_idle_minutes,
        )));

    let request_timeout = Duration::from_secs(state.config.request_timeout_secs);

    let base_router = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        // Public: anyone, anonymous included.
        .merge(public::public_routes())
        // Authenticated: any live account.
        .merge(
            authenticated::authenticated_routes().route_layer(middleware::from_fn_with_state(
                state.clone(),
                auth::require_authentication,
            )),
        )
        // Authors: approved teachers and admins.
        .merge(author::author_routes().route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_author,
        )))
        // Admin: the approval workflow gates each call itself.
        .nest("/admin", admin::admin_routes())
        .with_state(state);

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
                .layer(PropagateRequestIdLayer::new(x_request_id))
                // A panicking handler becomes a 500 instead of a dropped connection.
                .layer(CatchPanicLayer::new())
                .layer(SetResponseHeaderLayer::overriding(
                    HeaderName::from_static("x-xss-protection"),
                    HeaderValue::from_static("1; mode=block"),
                ))
                .layer(SetResponseHeaderLayer::overriding(
                    header::X_FRAME_OPTIONS,
                    HeaderValue::from_static("deny"),
                ))
                .layer(TimeoutLayer::with_status_code(
                    StatusCode::REQUEST_TIMEOUT,
                    request_timeout,
                ))
                .layer(sessions),
        )
        .layer(cors)
}

/// trace_span_logger
///
/// Builds the per-request span so every log line of a request carries its
/// `x-request-id`.
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
