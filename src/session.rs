use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;

use crate::{error::SessionError, models::Role};

// Session keys. The names are part of the persisted session format.
pub const AUTHENTICATED_USER_ID: &str = "authenticatedUserID";
pub const AUTHENTICATED_USER_ROLE: &str = "authenticatedUserRole";
pub const FLASH: &str = "flash";

/// SessionState Trait
///
/// The per-visitor key-value store the authorization core reads and writes.
/// An implementation is scoped to exactly one visitor's token; there is no way
/// to reach another visitor's values through it.
///
/// Production requests get a `tower_sessions::Session`; tests use `MemorySession`.
#[async_trait]
pub trait SessionState: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Value>, SessionError>;
    async fn put(&self, key: &str, value: Value) -> Result<(), SessionError>;
    /// Removes `key`, returning the value it held.
    async fn remove(&self, key: &str) -> Result<Option<Value>, SessionError>;
    /// Issues a new token for the same data (used on login against fixation).
    async fn renew(&self) -> Result<(), SessionError>;
    /// Drops every value and invalidates the current token.
    async fn destroy(&self) -> Result<(), SessionError>;
}

#[async_trait]
impl SessionState for tower_sessions::Session {
    async fn get(&self, key: &str) -> Result<Option<Value>, SessionError> {
        Ok(self.get_value(key).await?)
    }

    async fn put(&self, key: &str, value: Value) -> Result<(), SessionError> {
        self.insert_value(key, value).await?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<Option<Value>, SessionError> {
        Ok(self.remove_value(key).await?)
    }

    async fn renew(&self) -> Result<(), SessionError> {
        Ok(self.cycle_id().await?)
    }

    async fn destroy(&self) -> Result<(), SessionError> {
        Ok(self.flush().await?)
    }
}

// --- Typed helpers over the raw key-value interface ---

/// The authenticated account id, or `None` for an anonymous visitor.
///
/// A value that is not a positive integer is an error: it can only come from a
/// corrupted or hand-edited session row, and must not pass for a logged-out visitor.
pub async fn authenticated_user_id<S>(session: &S) -> Result<Option<i64>, SessionError>
where
    S: SessionState + ?Sized,
{
    let Some(value) = session.get(AUTHENTICATED_USER_ID).await? else {
        return Ok(None);
    };
    match value.as_i64() {
        Some(id) if id > 0 => Ok(Some(id)),
        _ => {
            tracing::error!(%value, "malformed authenticated user id in session");
            Err(SessionError(format!(
                "malformed {AUTHENTICATED_USER_ID} value: {value}"
            )))
        }
    }
}

/// Role cached at login. A hint for display only; never used for access decisions.
pub async fn cached_role<S>(session: &S) -> Result<Option<Role>, SessionError>
where
    S: SessionState + ?Sized,
{
    Ok(session
        .get(AUTHENTICATED_USER_ROLE)
        .await?
        .and_then(|value| value.as_str().and_then(|label| label.parse().ok())))
}

/// Binds the session to `account_id` under a fresh token.
pub async fn log_in<S>(session: &S, account_id: i64, role: Option<Role>) -> Result<(), SessionError>
where
    S: SessionState + ?Sized,
{
    session.renew().await?;
    session.put(AUTHENTICATED_USER_ID, Value::from(account_id)).await?;
    match role {
        Some(role) => {
            session
                .put(AUTHENTICATED_USER_ROLE, Value::from(role.as_str()))
                .await
        }
        None => session.remove(AUTHENTICATED_USER_ROLE).await.map(|_| ()),
    }
}

/// Removes the authenticated identity and invalidates the token.
pub async fn log_out<S>(session: &S) -> Result<(), SessionError>
where
    S: SessionState + ?Sized,
{
    session.remove(AUTHENTICATED_USER_ID).await?;
    session.remove(AUTHENTICATED_USER_ROLE).await?;
    session.destroy().await
}

pub async fn put_flash<S>(session: &S, message: &str) -> Result<(), SessionError>
where
    S: SessionState + ?Sized,
{
    session.put(FLASH, Value::from(message)).await
}

/// Reads and clears the one-shot flash message.
pub async fn pop_flash<S>(session: &S) -> Result<Option<String>, SessionError>
where
    S: SessionState + ?Sized,
{
    Ok(session
        .remove(FLASH)
        .await?
        .and_then(|value| value.as_str().map(str::to_string)))
}

/// MemorySession
///
/// Process-local `SessionState` for tests and tooling. `token()` changes on
/// every `renew`/`destroy` so tests can observe token rotation.
#[derive(Default)]
pub struct MemorySession {
    inner: Mutex<MemorySessionInner>,
}

#[derive(Default)]
struct MemorySessionInner {
    token: u64,
    values: HashMap<String, Value>,
    failing: bool,
}

impl MemorySession {
    pub fn new() -> Self {
        Self::default()
    }

    /// A session already carrying an authenticated identity.
    pub fn authenticated(account_id: i64) -> Self {
        let session = Self::default();
        session
            .inner
            .lock()
            .values
            .insert(AUTHENTICATED_USER_ID.to_string(), Value::from(account_id));
        session
    }

    pub fn token(&self) -> u64 {
        self.inner.lock().token
    }

    pub fn contains(&self, key: &str) -> bool {
        self.inner.lock().values.contains_key(key)
    }

    /// Makes every subsequent operation fail as if the backing store were down.
    pub fn fail_all(&self) {
        self.inner.lock().failing = true;
    }

    fn check(inner: &MemorySessionInner) -> Result<(), SessionError> {
        if inner.failing {
            return Err(SessionError("memory session marked as failing".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl SessionState for MemorySession {
    async fn get(&self, key: &str) -> Result<Option<Value>, SessionError> {
        let inner = self.inner.lock();
        Self::check(&inner)?;
        Ok(inner.values.get(key).cloned())
    }

    async fn put(&self, key: &str, value: Value) -> Result<(), SessionError> {
        let mut inner = self.inner.lock();
        Self::check(&inner)?;
        inner.values.insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<Option<Value>, SessionError> {
        let mut inner = self.inner.lock();
        Self::check(&inner)?;
        Ok(inner.values.remove(key))
    }

    async fn renew(&self) -> Result<(), SessionError> {
        let mut inner = self.inner.lock();
        Self::check(&inner)?;
        inner.token += 1;
        Ok(())
    }

    async fn destroy(&self) -> Result<(), SessionError> {
        let mut inner = self.inner.lock();
        Self::check(&inner)?;
        inner.values.clear();
        inner.token += 1;
        Ok(())
    }
}
