use std::collections::BTreeSet;

use crate::{
    AppState,
    approval::{self, Approval},
    auth::{deny_response, no_store},
    credentials,
    error::{AppError, StoreError},
    forms::{EMAIL_RX, Validator},
    models::{
        AccountIdsRequest, AccountSummary, ApprovalReport, ArticleForm, ArticlePage,
        CategoryPage, CreateArticleRequest, ExpiryOption, HomePage, LoginRequest, NewArticle,
        PendingApprovals, Role, SignupRequest,
    },
    policy::{HOME_PATH, LOGIN_PATH},
    repository::{AccountStoreState, ArticleStoreState},
    session,
};
use axum::{
    Json,
    extract::{Path, State},
    response::{IntoResponse, Redirect, Response},
};
use tower_sessions::Session;

/// Number of articles shown on the home page.
pub const LATEST_LIMIT: i64 = 10;

/// Where a successful login lands.
pub const AFTER_LOGIN_PATH: &str = "/article/create";

// --- Public Handlers ---

/// home
///
/// [Public Route] Latest live articles, all categories, and any pending flash.
#[utoipa::path(
    get,
    path = "/",
    responses((status = 200, description = "Home page data", body = HomePage))
)]
pub async fn home(
    State(state): State<AppState>,
    session: Session,
) -> Result<Json<HomePage>, AppError> {
    let articles = state.articles.latest(LATEST_LIMIT).await?;
    let categories = state.articles.categories().await?;
    let flash = session::pop_flash(&session).await?;

    Ok(Json(HomePage {
        flash,
        articles,
        categories,
    }))
}

/// show_article
///
/// [Public Route] A single article, only while it has not expired.
#[utoipa::path(
    get,
    path = "/article/{id}",
    params(("id" = i64, Path, description = "Article ID")),
    responses(
        (status = 200, description = "Found", body = ArticlePage),
        (status = 404, description = "Missing or expired")
    )
)]
pub async fn show_article(
    State(articles): State<ArticleStoreState>,
    session: Session,
    Path(id): Path<i64>,
) -> Result<Json<ArticlePage>, AppError> {
    if id < 1 {
        return Err(AppError::NotFound);
    }
    let article = articles.get(id).await?;
    let flash = session::pop_flash(&session).await?;
    Ok(Json(ArticlePage { flash, article }))
}

/// show_category
///
/// [Public Route] Live articles of one category, newest first.
#[utoipa::path(
    get,
    path = "/category/{category}",
    params(("category" = String, Path, description = "Category label")),
    responses((status = 200, description = "Category listing", body = CategoryPage))
)]
pub async fn show_category(
    State(articles): State<ArticleStoreState>,
    Path(category): Path<String>,
) -> Result<Json<CategoryPage>, AppError> {
    let articles = articles.by_category(&category).await?;
    Ok(Json(CategoryPage { category, articles }))
}

/// signup
///
/// [Public Route] Registers a student or (pending) teacher account.
///
/// A taken email answers `422` with a message on the `email` field, so the
/// form can show it next to the input.
#[utoipa::path(
    post,
    path = "/user/signup",
    request_body = SignupRequest,
    responses(
        (status = 303, description = "Registered, redirected to login"),
        (status = 422, description = "Validation failed or email in use")
    )
)]
pub async fn signup(
    State(state): State<AppState>,
    session: Session,
    Json(payload): Json<SignupRequest>,
) -> Result<Redirect, AppError> {
    Validator::new()
        .required("name", &payload.name)
        .required("email", &payload.email)
        .required("password", &payload.password)
        .required("role", &payload.role)
        .max_length("name", &payload.name, 255)
        .max_length("email", payload.email.trim(), 255)
        .matches_pattern("email", payload.email.trim(), &EMAIL_RX)
        .min_length("password", &payload.password, 4)
        .permitted_values(
            "role",
            &payload.role.to_ascii_lowercase(),
            &[Role::Student.as_str(), Role::Teacher.as_str()],
        )
        .finish()?;

    let role: Role = payload
        .role
        .parse()
        .map_err(|_| AppError::Internal("validated role failed to parse".to_string()))?;

    credentials::register_account(
        state.accounts.as_ref(),
        state.verifier.as_ref(),
        payload.name.trim(),
        payload.email.trim(),
        &payload.password,
        role,
    )
    .await?;

    session::put_flash(&session, "Your signup was successful. Please log in.").await?;
    Ok(Redirect::to(LOGIN_PATH))
}

/// login
///
/// [Public Route] Authenticates and binds the session to the account under a
/// fresh token. Every credential failure gets the same generic `401`.
#[utoipa::path(
    post,
    path = "/user/login",
    request_body = LoginRequest,
    responses(
        (status = 303, description = "Logged in"),
        (status = 401, description = "Email or Password is incorrect")
    )
)]
pub async fn login(
    State(state): State<AppState>,
    session: Session,
    Json(payload): Json<LoginRequest>,
) -> Result<Redirect, AppError> {
    let id = credentials::authenticate(
        state.accounts.as_ref(),
        state.verifier.as_ref(),
        payload.email.trim(),
        &payload.password,
    )
    .await
    .inspect_err(|err| {
        if err.is_system() {
            tracing::warn!(error = %err, "login could not be evaluated");
        }
    })?;

    // The account was just read by email; losing it now is a store fault.
    let role = match state.accounts.get_by_id(id).await {
        Ok(account) => account.role,
        Err(StoreError::NotFound) => return Err(AppError::ConsistencyFault(id)),
        Err(err) => return Err(err.into()),
    };
    session::log_in(&session, id, role).await?;

    tracing::info!(account_id = id, "login succeeded");
    Ok(Redirect::to(AFTER_LOGIN_PATH))
}

// --- Authenticated Handlers ---

/// logout
///
/// [Authenticated Route] Drops the identity and invalidates the session token.
#[utoipa::path(
    post,
    path = "/user/logout",
    responses((status = 303, description = "Logged out"))
)]
pub async fn logout(session: Session) -> Result<Redirect, AppError> {
    session::log_out(&session).await?;
    session::put_flash(&session, "You've been logged out successfully!").await?;
    Ok(Redirect::to(HOME_PATH))
}

/// create_article_form
///
/// [Author Route] The choices offered by the article form.
#[utoipa::path(
    get,
    path = "/article/create",
    responses((status = 200, description = "Form options", body = ArticleForm))
)]
pub async fn create_article_form() -> Json<ArticleForm> {
    Json(ArticleForm {
        expiry_days: ExpiryOption::ALL.iter().map(|e| e.days()).collect(),
    })
}

/// create_article
///
/// [Author Route] Publishes an article. Reached only through `require_author`.
#[utoipa::path(
    post,
    path = "/article/create",
    request_body = CreateArticleRequest,
    responses(
        (status = 303, description = "Created, redirected to the article"),
        (status = 422, description = "Validation failed")
    )
)]
pub async fn create_article(
    State(state): State<AppState>,
    session: Session,
    Json(payload): Json<CreateArticleRequest>,
) -> Result<Redirect, AppError> {
    Validator::new()
        .required("title", &payload.title)
        .required("content", &payload.content)
        .required("expires", &payload.expires)
        .required("category", &payload.category)
        .max_length("title", &payload.title, 100)
        .permitted_values("expires", payload.expires.trim(), &ExpiryOption::labels())
        .finish()?;

    let expiry: ExpiryOption = payload
        .expires
        .parse()
        .map_err(|_| AppError::Internal("validated expiry failed to parse".to_string()))?;

    let id = state
        .articles
        .insert(NewArticle {
            title: payload.title.trim().to_string(),
            content: payload.content,
            expiry,
            category: payload.category.trim().to_string(),
        })
        .await?;

    session::put_flash(&session, "Article successfully created!").await?;
    Ok(Redirect::to(&format!("/article/{id}")))
}

// --- Admin Handlers ---

/// pending_approvals
///
/// [Admin Route] Teacher accounts waiting for approval.
///
/// *Authorization*: gated by the approval workflow itself (`can_administer`).
#[utoipa::path(
    get,
    path = "/admin/approve",
    responses(
        (status = 200, description = "Pending teachers", body = PendingApprovals),
        (status = 303, description = "Not an admin")
    )
)]
pub async fn pending_approvals(
    State(accounts): State<AccountStoreState>,
    session: Session,
) -> Result<Response, AppError> {
    match approval::pending_teachers(&session, accounts.as_ref()).await? {
        Approval::Applied(pending) => {
            let flash = session::pop_flash(&session).await?;
            let pending = pending.iter().map(AccountSummary::from).collect();
            Ok(no_store(Json(PendingApprovals { flash, pending }).into_response()))
        }
        Approval::Denied(denial) => Ok(deny_response(denial)),
    }
}

/// approve
///
/// [Admin Route] Batch approval. Partial success is normal: the body lists
/// which ids were approved and which were not.
#[utoipa::path(
    post,
    path = "/admin/approve",
    request_body = AccountIdsRequest,
    responses(
        (status = 200, description = "Per-id outcome", body = ApprovalReport),
        (status = 303, description = "Not an admin")
    )
)]
pub async fn approve(
    State(accounts): State<AccountStoreState>,
    session: Session,
    Json(payload): Json<AccountIdsRequest>,
) -> Result<Response, AppError> {
    let ids: BTreeSet<i64> = payload.ids.into_iter().collect();
    match approval::approve_accounts(&session, accounts.as_ref(), &ids).await? {
        Approval::Applied(report) => Ok(no_store(Json(report).into_response())),
        Approval::Denied(denial) => Ok(deny_response(denial)),
    }
}

/// revoke
///
/// [Admin Route] Batch revocation, returning teachers to the pending list.
#[utoipa::path(
    post,
    path = "/admin/revoke",
    request_body = AccountIdsRequest,
    responses(
        (status = 200, description = "Per-id outcome", body = ApprovalReport),
        (status = 303, description = "Not an admin")
    )
)]
pub async fn revoke(
    State(accounts): State<AccountStoreState>,
    session: Session,
    Json(payload): Json<AccountIdsRequest>,
) -> Result<Response, AppError> {
    let ids: BTreeSet<i64> = payload.ids.into_iter().collect();
    match approval::revoke_approvals(&session, accounts.as_ref(), &ids).await? {
        Approval::Applied(report) => Ok(no_store(Json(report).into_response())),
        Approval::Denied(denial) => Ok(deny_response(denial)),
    }
}
