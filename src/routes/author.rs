use crate::{AppState, handlers};
use axum::{Router, routing::get};

/// Author Router Module
///
/// Article creation. Wrapped in `require_author`, which runs
/// `can_create_article` for the form and the submission alike: anonymous
/// visitors go to the login page, students and unapproved teachers go home.
pub fn author_routes() -> Router<AppState> {
    Router::<AppState>::new()
        // GET/POST /article/create
        .route(
            "/article/create",
            get(handlers::create_article_form).post(handlers::create_article),
        )
}
