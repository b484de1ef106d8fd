use std::{collections::BTreeSet, fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use ts_rs::TS;
use utoipa::ToSchema;

// --- Accounts ---

/// Role
///
/// The closed set of account roles. Persisted as the lower-case label
/// (`student`, `teacher`, `admin`). Fixed at signup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum Role {
    Student,
    Teacher,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Teacher => "teacher",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a role label is not one of the three known roles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownRole(pub String);

impl FromStr for Role {
    type Err = UnknownRole;

    /// Accepts labels case-insensitively; older rows were written capitalised.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "student" => Ok(Role::Student),
            "teacher" => Ok(Role::Teacher),
            "admin" => Ok(Role::Admin),
            _ => Err(UnknownRole(s.to_string())),
        }
    }
}

/// Account
///
/// A registered identity as the Account Store returns it.
///
/// `role` is `None` when the stored label is not a role this build knows about;
/// the authorization policy answers such accounts with Forbidden.
/// `approved` is only meaningful for teachers.
#[derive(Debug, Clone)]
pub struct Account {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub credential_hash: String,
    pub role: Option<Role>,
    pub approved: bool,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

/// AccountSummary
///
/// Public projection of an account used by the admin approval listing.
/// Never carries the credential hash.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct AccountSummary {
    pub id: i64,
    pub name: String,
    pub email: String,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
}

impl From<&Account> for AccountSummary {
    fn from(account: &Account) -> Self {
        Self {
            id: account.id,
            name: account.name.clone(),
            email: account.email.clone(),
            created_at: account.created_at,
        }
    }
}

/// NewAccount
///
/// Everything the store needs to persist a signup. The secret is already hashed.
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub name: String,
    pub email: String,
    pub credential_hash: String,
    pub role: Role,
}

// --- Articles ---

/// Article
///
/// A published article. Readers only ever see rows where `now < expires_at`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, FromRow)]
#[ts(export)]
pub struct Article {
    pub id: i64,
    pub title: String,
    pub content: String,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "string")]
    pub expires_at: DateTime<Utc>,
    pub category: String,
}

/// ExpiryOption
///
/// The lifetimes an author may pick for a new article, in days.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpiryOption {
    OneDay,
    OneWeek,
    OneYear,
}

impl ExpiryOption {
    pub const ALL: [ExpiryOption; 3] = [
        ExpiryOption::OneYear,
        ExpiryOption::OneWeek,
        ExpiryOption::OneDay,
    ];

    pub fn days(self) -> i64 {
        match self {
            ExpiryOption::OneDay => 1,
            ExpiryOption::OneWeek => 7,
            ExpiryOption::OneYear => 365,
        }
    }

    pub fn labels() -> [&'static str; 3] {
        ["365", "7", "1"]
    }
}

impl FromStr for ExpiryOption {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "1" => Ok(ExpiryOption::OneDay),
            "7" => Ok(ExpiryOption::OneWeek),
            "365" => Ok(ExpiryOption::OneYear),
            _ => Err(()),
        }
    }
}

/// NewArticle
///
/// Validated article submission handed to the Article Store.
#[derive(Debug, Clone)]
pub struct NewArticle {
    pub title: String,
    pub content: String,
    pub expiry: ExpiryOption,
    pub category: String,
}

// --- Request Payloads ---

/// SignupRequest
///
/// Input payload for POST /user/signup. The password is hashed before it
/// reaches the store and is never logged.
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct SignupRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    /// `student` or `teacher`. Admin accounts cannot be self-registered.
    #[serde(default)]
    pub role: String,
}

/// LoginRequest
///
/// Input payload for POST /user/login.
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

/// CreateArticleRequest
///
/// Input payload for POST /article/create. `expires` is one of "1", "7", "365".
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct CreateArticleRequest {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub expires: String,
    #[serde(default)]
    pub category: String,
}

/// AccountIdsRequest
///
/// Batch of account ids for POST /admin/approve and POST /admin/revoke.
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct AccountIdsRequest {
    #[serde(default)]
    pub ids: Vec<i64>,
}

// --- Response Payloads ---

/// ApprovalReport
///
/// Per-id outcome of a batch approval change. Every requested id lands in
/// exactly one of the two sets.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct ApprovalReport {
    pub succeeded: BTreeSet<i64>,
    pub failed: BTreeSet<i64>,
}

/// HomePage
///
/// Output for GET /: the ten most recent live articles and every known category.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct HomePage {
    pub flash: Option<String>,
    pub articles: Vec<Article>,
    pub categories: Vec<String>,
}

/// ArticlePage
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct ArticlePage {
    pub flash: Option<String>,
    pub article: Article,
}

/// CategoryPage
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct CategoryPage {
    pub category: String,
    pub articles: Vec<Article>,
}

/// ArticleForm
///
/// Output for GET /article/create: the choices the create form offers.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct ArticleForm {
    pub expiry_days: Vec<i64>,
}

/// PendingApprovals
///
/// Output for GET /admin/approve.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct PendingApprovals {
    pub flash: Option<String>,
    pub pending: Vec<AccountSummary>,
}
