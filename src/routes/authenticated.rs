use crate::{AppState, handlers};
use axum::{Router, routing::post};

/// Authenticated Router Module
///
/// Routes for any visitor whose session resolves to a live account. The
/// `require_authentication` route layer sends everyone else to the login page
/// and marks every allowed response `Cache-Control: no-store`.
pub fn authenticated_routes() -> Router<AppState> {
    Router::<AppState>::new()
        // POST /user/logout
        // Clears the identity and invalidates the session token.
        .route("/user/logout", post(handlers::logout))
}
