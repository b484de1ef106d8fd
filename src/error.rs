use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::forms::FieldErrors;

/// StoreError
///
/// Failure signal returned by every `AccountStore` / `ArticleStore` operation.
/// `NotFound` is kept apart from `Database` so callers can tell "no such row"
/// from "the store is broken" without inspecting driver errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,
    /// The unique constraint on `accounts.email` rejected an insert.
    #[error("email address is already registered")]
    DuplicateEmail,
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// CredentialError
///
/// Outcome of the credential flows (`authenticate`, `register_account`).
/// `InvalidCredentials` deliberately covers unknown, inactive and wrong-secret
/// cases alike.
#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("email address is already registered")]
    DuplicateEmail,
    #[error("credential hashing failed: {0}")]
    Hashing(String),
    #[error(transparent)]
    Store(StoreError),
}

impl CredentialError {
    /// True for faults the caller should treat as operational failures
    /// rather than user errors.
    pub fn is_system(&self) -> bool {
        matches!(self, Self::Hashing(_) | Self::Store(_))
    }
}

impl From<StoreError> for CredentialError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::DuplicateEmail => Self::DuplicateEmail,
            other => Self::Store(other),
        }
    }
}

/// SessionError
///
/// Wraps failures of the backing session store so the core does not leak the
/// session crate's error type through its public API.
#[derive(Debug, Error)]
#[error("session store failure: {0}")]
pub struct SessionError(pub String);

impl From<tower_sessions::session::Error> for SessionError {
    fn from(err: tower_sessions::session::Error) -> Self {
        Self(err.to_string())
    }
}

/// AppError
///
/// The error type surfaced at the HTTP boundary. Authorization denials are NOT
/// represented here: they are ordinary `Decision` values.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("form validation failed")]
    Validation(FieldErrors),
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("resource not found")]
    NotFound,
    /// An authenticated session references an account the store no longer has.
    #[error("session references missing account {0}")]
    ConsistencyFault(i64),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<CredentialError> for AppError {
    fn from(err: CredentialError) -> Self {
        match err {
            CredentialError::InvalidCredentials => Self::InvalidCredentials,
            CredentialError::DuplicateEmail => {
                let mut errors = FieldErrors::default();
                errors.add("email", "Address is already in use");
                Self::Validation(errors)
            }
            CredentialError::Hashing(msg) => Self::Internal(msg),
            CredentialError::Store(store) => Self::Store(store),
        }
    }
}

/// ErrorBody
///
/// JSON payload for every non-2xx response produced by `AppError`.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fields: Option<FieldErrors>,
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::InvalidCredentials => StatusCode::UNAUTHORIZED,
            Self::NotFound | Self::Store(StoreError::NotFound) => StatusCode::NOT_FOUND,
            Self::ConsistencyFault(_)
            | Self::Store(_)
            | Self::Session(_)
            | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match self {
            AppError::Validation(fields) => ErrorBody {
                error: "Please correct the highlighted fields".to_string(),
                fields: Some(fields),
            },
            AppError::InvalidCredentials => ErrorBody {
                error: "Email or Password is incorrect".to_string(),
                fields: None,
            },
            AppError::NotFound | AppError::Store(StoreError::NotFound) => ErrorBody {
                error: "Not Found".to_string(),
                fields: None,
            },
            other => {
                // Operational failures are logged in full but answered opaquely.
                tracing::error!(error = %other, "request failed with a system error");
                ErrorBody {
                    error: "Internal Server Error".to_string(),
                    fields: None,
                }
            }
        };
        (status, Json(body)).into_response()
    }
}
