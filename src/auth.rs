use axum::{
    Json,
    extract::{Request, State},
    http::{HeaderValue, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use tower_sessions::Session;

use crate::{
    AppState,
    error::{AppError, ErrorBody},
    policy::{self, Decision, Denial},
};

/// deny_response
///
/// Turns a policy denial into the HTTP answer: `303 See Other` to the target
/// for redirects, a bare `403` for Forbidden. Nothing about the reason leaks.
pub fn deny_response(denial: Denial) -> Response {
    match denial {
        Denial::Redirect(target) => Redirect::to(target).into_response(),
        Denial::Forbidden => (
            StatusCode::FORBIDDEN,
            Json(ErrorBody {
                error: "Forbidden".to_string(),
                fields: None,
            }),
        )
            .into_response(),
    }
}

/// Authenticated responses must not be replayable from the browser cache once
/// the visitor has logged out on a shared machine.
pub fn no_store(mut response: Response) -> Response {
    response
        .headers_mut()
        .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    response
}

/// require_authentication
///
/// Route layer for the authenticated area. Runs `can_access_authenticated_area`
/// against the visitor's session and only then lets the request reach the
/// handler.
pub async fn require_authentication(
    State(state): State<AppState>,
    session: Session,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    match policy::can_access_authenticated_area(&session, state.accounts.as_ref()).await? {
        Decision::Allow => Ok(no_store(next.run(request).await)),
        Decision::Deny(denial) => Ok(deny_response(denial)),
    }
}

/// require_author
///
/// Route layer for article creation. Applies `can_create_article` to the form
/// and to the submission alike.
pub async fn require_author(
    State(state): State<AppState>,
    session: Session,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    match policy::can_create_article(&session, state.accounts.as_ref()).await? {
        Decision::Allow => Ok(no_store(next.run(request).await)),
        Decision::Deny(denial) => {
            tracing::debug!(uri = %request.uri(), ?denial, "article creation denied");
            Ok(deny_response(denial))
        }
    }
}
