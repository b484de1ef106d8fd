use crate::{
    error::StoreError,
    models::{Account, Article, NewAccount, NewArticle, Role},
};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use sqlx::{FromRow, PgPool};
use std::{collections::BTreeMap, sync::Arc};

/// Name of the unique constraint guarding `accounts.email`.
pub const EMAIL_UNIQUE_CONSTRAINT: &str = "accounts_uc_email";

/// AccountStore Trait
///
/// The narrow persistence contract the authorization core depends on.
/// Every lookup distinguishes `StoreError::NotFound` from a genuine store failure.
///
/// **Send + Sync + async_trait** make `Arc<dyn AccountStore>` shareable across
/// Axum's request tasks.
#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn get_by_id(&self, id: i64) -> Result<Account, StoreError>;
    /// Only active accounts are returned; an inactive one reads as `NotFound`.
    async fn get_by_email(&self, email: &str) -> Result<Account, StoreError>;
    /// Returns the new account id, or `DuplicateEmail` when the address is taken.
    async fn insert(&self, account: NewAccount) -> Result<i64, StoreError>;
    /// Sets the approval flag on a single teacher account in one atomic update.
    /// Missing ids and non-teacher accounts yield `NotFound`.
    async fn set_approved(&self, id: i64, approved: bool) -> Result<(), StoreError>;
    /// Active teacher accounts still waiting for approval, oldest first.
    async fn list_pending_approvals(&self) -> Result<Vec<Account>, StoreError>;
}

/// ArticleStore Trait
///
/// Article persistence. Every read hides articles whose `expires_at` has passed.
#[async_trait]
pub trait ArticleStore: Send + Sync {
    async fn insert(&self, article: NewArticle) -> Result<i64, StoreError>;
    async fn get(&self, id: i64) -> Result<Article, StoreError>;
    async fn latest(&self, limit: i64) -> Result<Vec<Article>, StoreError>;
    async fn by_category(&self, category: &str) -> Result<Vec<Article>, StoreError>;
    async fn categories(&self) -> Result<Vec<String>, StoreError>;
}

pub type AccountStoreState = Arc<dyn AccountStore>;
pub type ArticleStoreState = Arc<dyn ArticleStore>;

// --- Postgres ---

/// AccountRow
///
/// Raw `accounts` row. The role column is free text in the database and is
/// only narrowed to `Role` on the way out.
#[derive(Debug, FromRow)]
struct AccountRow {
    id: i64,
    name: String,
    email: String,
    credential_hash: String,
    role: String,
    approved: bool,
    active: bool,
    created_at: DateTime<Utc>,
}

impl From<AccountRow> for Account {
    fn from(row: AccountRow) -> Self {
        let role = match row.role.parse::<Role>() {
            Ok(role) => Some(role),
            Err(unknown) => {
                tracing::warn!(account_id = row.id, role = %unknown.0, "account has an unrecognized role label");
                None
            }
        };
        Account {
            id: row.id,
            name: row.name,
            email: row.email,
            credential_hash: row.credential_hash,
            role,
            approved: row.approved,
            active: row.active,
            created_at: row.created_at,
        }
    }
}

const ACCOUNT_COLUMNS: &str =
    "id, name, email, credential_hash, role, approved, active, created_at";
const ARTICLE_COLUMNS: &str = "id, title, content, created_at, expires_at, category";

/// PostgresAccountStore
///
/// `AccountStore` backed by the `accounts` table.
pub struct PostgresAccountStore {
    pool: PgPool,
}

impl PostgresAccountStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Maps a unique violation on the email constraint to `DuplicateEmail`.
fn map_insert_error(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.is_unique_violation() && db_err.constraint() == Some(EMAIL_UNIQUE_CONSTRAINT) {
            return StoreError::DuplicateEmail;
        }
    }
    StoreError::Database(err)
}

#[async_trait]
impl AccountStore for PostgresAccountStore {
    async fn get_by_id(&self, id: i64) -> Result<Account, StoreError> {
        let query = format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = $1");
        sqlx::query_as::<_, AccountRow>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(Account::from)
            .ok_or(StoreError::NotFound)
    }

    async fn get_by_email(&self, email: &str) -> Result<Account, StoreError> {
        let query =
            format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE email = $1 AND active = TRUE");
        sqlx::query_as::<_, AccountRow>(&query)
            .bind(email)
            .fetch_optional(&self.pool)
            .await?
            .map(Account::from)
            .ok_or(StoreError::NotFound)
    }

    async fn insert(&self, account: NewAccount) -> Result<i64, StoreError> {
        sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO accounts (name, email, credential_hash, role, approved, active, created_at)
            VALUES ($1, $2, $3, $4, FALSE, TRUE, NOW())
            RETURNING id
            "#,
        )
        .bind(&account.name)
        .bind(&account.email)
        .bind(&account.credential_hash)
        .bind(account.role.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(map_insert_error)
    }

    /// set_approved
    ///
    /// Role labels are matched case-insensitively, the same way `Role` parses
    /// them. Postgres reports matched rows, so re-approving an approved teacher still
    /// counts as one affected row and stays a success.
    async fn set_approved(&self, id: i64, approved: bool) -> Result<(), StoreError> {
        let result =
            sqlx::query("UPDATE accounts SET approved = $1 WHERE id = $2 AND LOWER(role) = 'teacher'")
                .bind(approved)
                .bind(id)
                .execute(&self.pool)
                .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn list_pending_approvals(&self) -> Result<Vec<Account>, StoreError> {
        let query = format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts \
             WHERE LOWER(role) = 'teacher' AND approved = FALSE AND active = TRUE \
             ORDER BY created_at ASC, id ASC"
        );
        let rows = sqlx::query_as::<_, AccountRow>(&query)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(Account::from).collect())
    }
}

/// PostgresArticleStore
///
/// `ArticleStore` backed by the `articles` table.
pub struct PostgresArticleStore {
    pool: PgPool,
}

impl PostgresArticleStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ArticleStore for PostgresArticleStore {
    async fn insert(&self, article: NewArticle) -> Result<i64, StoreError> {
        let created_at = Utc::now();
        let expires_at = created_at + Duration::days(article.expiry.days());
        let id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO articles (title, content, created_at, expires_at, category)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id
            "#,
        )
        .bind(&article.title)
        .bind(&article.content)
        .bind(created_at)
        .bind(expires_at)
        .bind(&article.category)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    async fn get(&self, id: i64) -> Result<Article, StoreError> {
        let query = format!(
            "SELECT {ARTICLE_COLUMNS} FROM articles WHERE id = $1 AND expires_at > NOW()"
        );
        sqlx::query_as::<_, Article>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::NotFound)
    }

    async fn latest(&self, limit: i64) -> Result<Vec<Article>, StoreError> {
        let query = format!(
            "SELECT {ARTICLE_COLUMNS} FROM articles WHERE expires_at > NOW() \
             ORDER BY created_at DESC LIMIT $1"
        );
        Ok(sqlx::query_as::<_, Article>(&query)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn by_category(&self, category: &str) -> Result<Vec<Article>, StoreError> {
        let query = format!(
            "SELECT {ARTICLE_COLUMNS} FROM articles WHERE expires_at > NOW() AND category = $1 \
             ORDER BY created_at DESC"
        );
        Ok(sqlx::query_as::<_, Article>(&query)
            .bind(category)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn categories(&self) -> Result<Vec<String>, StoreError> {
        Ok(sqlx::query_scalar::<_, String>(
            "SELECT DISTINCT category FROM articles WHERE expires_at > NOW() ORDER BY category",
        )
        .fetch_all(&self.pool)
        .await?)
    }
}

// --- In-memory ---

/// MemoryAccountStore
///
/// In-process `AccountStore` used by the test suite and for running the router
/// without Postgres. Ids listed via `fail_updates_for` make `set_approved`
/// report a database error, which lets tests exercise per-id failure isolation.
#[derive(Default)]
pub struct MemoryAccountStore {
    inner: RwLock<MemoryAccounts>,
}

#[derive(Default)]
struct MemoryAccounts {
    next_id: i64,
    rows: BTreeMap<i64, Account>,
    failing_updates: Vec<i64>,
}

impl MemoryAccountStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a fully-formed account, assigning it the next id.
    pub fn seed(&self, mut account: Account) -> i64 {
        let mut inner = self.inner.write();
        inner.next_id += 1;
        account.id = inner.next_id;
        inner.rows.insert(account.id, account);
        inner.next_id
    }

    pub fn get(&self, id: i64) -> Option<Account> {
        self.inner.read().rows.get(&id).cloned()
    }

    pub fn remove(&self, id: i64) -> Option<Account> {
        self.inner.write().rows.remove(&id)
    }

    pub fn set_active(&self, id: i64, active: bool) {
        if let Some(account) = self.inner.write().rows.get_mut(&id) {
            account.active = active;
        }
    }

    pub fn count_by_email(&self, email: &str) -> usize {
        self.inner
            .read()
            .rows
            .values()
            .filter(|a| a.email == email)
            .count()
    }

    pub fn fail_updates_for(&self, id: i64) {
        self.inner.write().failing_updates.push(id);
    }
}

#[async_trait]
impl AccountStore for MemoryAccountStore {
    async fn get_by_id(&self, id: i64) -> Result<Account, StoreError> {
        self.get(id).ok_or(StoreError::NotFound)
    }

    async fn get_by_email(&self, email: &str) -> Result<Account, StoreError> {
        self.inner
            .read()
            .rows
            .values()
            .find(|a| a.email == email && a.active)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn insert(&self, account: NewAccount) -> Result<i64, StoreError> {
        // Check and insert under one write lock, like the unique index would.
        let mut inner = self.inner.write();
        if inner.rows.values().any(|a| a.email == account.email) {
            return Err(StoreError::DuplicateEmail);
        }
        inner.next_id += 1;
        let id = inner.next_id;
        inner.rows.insert(
            id,
            Account {
                id,
                name: account.name,
                email: account.email,
                credential_hash: account.credential_hash,
                role: Some(account.role),
                approved: false,
                active: true,
                created_at: Utc::now(),
            },
        );
        Ok(id)
    }

    async fn set_approved(&self, id: i64, approved: bool) -> Result<(), StoreError> {
        let mut inner = self.inner.write();
        if inner.failing_updates.contains(&id) {
            return Err(StoreError::Database(sqlx::Error::PoolTimedOut));
        }
        match inner.rows.get_mut(&id) {
            Some(account) if account.role == Some(Role::Teacher) => {
                account.approved = approved;
                Ok(())
            }
            _ => Err(StoreError::NotFound),
        }
    }

    async fn list_pending_approvals(&self) -> Result<Vec<Account>, StoreError> {
        let mut pending: Vec<Account> = self
            .inner
            .read()
            .rows
            .values()
            .filter(|a| a.role == Some(Role::Teacher) && !a.approved && a.active)
            .cloned()
            .collect();
        pending.sort_by_key(|a| (a.created_at, a.id));
        Ok(pending)
    }
}

/// MemoryArticleStore
///
/// In-process `ArticleStore`; expiry is evaluated against the wall clock on
/// every read, matching the SQL implementation.
#[derive(Default)]
pub struct MemoryArticleStore {
    rows: RwLock<Vec<Article>>,
}

impl MemoryArticleStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores an article with caller-chosen timestamps and returns its new id.
    pub fn seed(&self, mut article: Article) -> i64 {
        let mut rows = self.rows.write();
        article.id = rows.len() as i64 + 1;
        let id = article.id;
        rows.push(article);
        id
    }

    fn live(&self) -> Vec<Article> {
        let now = Utc::now();
        let mut live: Vec<Article> = self
            .rows
            .read()
            .iter()
            .filter(|a| now < a.expires_at)
            .cloned()
            .collect();
        live.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        live
    }
}

#[async_trait]
impl ArticleStore for MemoryArticleStore {
    async fn insert(&self, article: NewArticle) -> Result<i64, StoreError> {
        let created_at = Utc::now();
        Ok(self.seed(Article {
            id: 0,
            title: article.title,
            content: article.content,
            created_at,
            expires_at: created_at + Duration::days(article.expiry.days()),
            category: article.category,
        }))
    }

    async fn get(&self, id: i64) -> Result<Article, StoreError> {
        self.live()
            .into_iter()
            .find(|a| a.id == id)
            .ok_or(StoreError::NotFound)
    }

    async fn latest(&self, limit: i64) -> Result<Vec<Article>, StoreError> {
        let limit = usize::try_from(limit).unwrap_or(0);
        Ok(self.live().into_iter().take(limit).collect())
    }

    async fn by_category(&self, category: &str) -> Result<Vec<Article>, StoreError> {
        Ok(self
            .live()
            .into_iter()
            .filter(|a| a.category == category)
            .collect())
    }

    async fn categories(&self) -> Result<Vec<String>, StoreError> {
        let mut categories: Vec<String> = self.live().into_iter().map(|a| a.category).collect();
        categories.sort();
        categories.dedup();
        Ok(categories)
    }
}
