use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post},
};

/// Admin Router Module
///
/// The teacher approval workflow, nested under `/admin`.
///
/// Access Control:
/// No route layer here. Each handler goes through the approval workflow,
/// which runs `can_administer` before reading or mutating anything, so the
/// gate cannot be skipped by a caller that reaches the workflow directly.
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        // GET /admin/approve
        // Teacher accounts still waiting for approval, oldest first.
        // POST /admin/approve
        // Approves a batch of ids; the response reports each id's outcome.
        .route(
            "/approve",
            get(handlers::pending_approvals).post(handlers::approve),
        )
        // POST /admin/revoke
        // Sends approved teachers back to the pending list.
        .route("/revoke", post(handlers::revoke))
}
