use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post},
};

/// Public Router Module
///
/// Endpoints reachable without a session: reading live articles and the
/// identity gateway (signup and login). Expired articles are filtered by the
/// Article Store, so no handler here has to check `expires_at` itself.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // GET /health
        // Liveness probe for load balancers. Touches neither store.
        .route("/health", get(|| async { "ok" }))
        // GET /
        // Latest live articles, the category list and any pending flash.
        .route("/", get(handlers::home))
        // GET /article/{id}
        .route("/article/{id}", get(handlers::show_article))
        // GET /category/{category}
        .route("/category/{category}", get(handlers::show_category))
        // POST /user/signup
        // Students are usable immediately; teachers wait for an admin.
        .route("/user/signup", post(handlers::signup))
        // POST /user/login
        // Rotates the session token before binding the account id.
        .route("/user/login", post(handlers::login))
}
