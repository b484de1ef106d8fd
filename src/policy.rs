//! Authorization policy.
//!
//! One decision function per protected action class. A denial is an ordinary
//! `Decision`, never an `Err`; `Err` is reserved for store and session faults,
//! including the consistency fault of a session pointing at a deleted account.
//!
//! The session is only trusted for *who* the visitor is. *What* they may do is
//! always read fresh from the Account Store, so an admin's change to a role or
//! approval flag applies on the visitor's next request.

use crate::{
    error::{AppError, StoreError},
    models::{Account, Role},
    repository::AccountStore,
    session::{self, SessionState},
};

pub const LOGIN_PATH: &str = "/user/login";
pub const HOME_PATH: &str = "/";

/// Why a request was turned away. Deliberately carries nothing beyond what the
/// caller needs to respond.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Denial {
    Redirect(&'static str),
    Forbidden,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny(Denial),
}

impl Decision {
    pub const fn redirect(target: &'static str) -> Self {
        Decision::Deny(Denial::Redirect(target))
    }

    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow)
    }
}

/// The visitor as far as the policy is concerned.
enum Visitor {
    Anonymous,
    Known(Account),
}

/// Loads the account behind the session identity.
///
/// A missing account is a consistency fault. A deactivated account has its
/// identity stripped from the session and is treated as anonymous.
async fn resolve_visitor(
    session: &dyn SessionState,
    accounts: &dyn AccountStore,
) -> Result<Visitor, AppError> {
    let Some(id) = session::authenticated_user_id(session).await? else {
        return Ok(Visitor::Anonymous);
    };

    let account = match accounts.get_by_id(id).await {
        Ok(account) => account,
        Err(StoreError::NotFound) => {
            tracing::error!(account_id = id, "authenticated session references a missing account");
            return Err(AppError::ConsistencyFault(id));
        }
        Err(err) => return Err(err.into()),
    };

    if !account.active {
        tracing::info!(account_id = id, "dropping session identity of deactivated account");
        session::log_out(session).await?;
        return Ok(Visitor::Anonymous);
    }

    Ok(Visitor::Known(account))
}

/// can_create_article
///
/// Gate for writing to the Article Store. The order of checks matters:
/// students and unapproved teachers are both sent home (the caller cannot
/// distinguish the two), while an unrecognized role is a hard Forbidden.
pub async fn can_create_article(
    session: &dyn SessionState,
    accounts: &dyn AccountStore,
) -> Result<Decision, AppError> {
    let account = match resolve_visitor(session, accounts).await? {
        Visitor::Anonymous => return Ok(Decision::redirect(LOGIN_PATH)),
        Visitor::Known(account) => account,
    };

    let decision = match account.role {
        Some(Role::Student) => Decision::redirect(HOME_PATH),
        Some(Role::Teacher) if !account.approved => Decision::redirect(HOME_PATH),
        Some(Role::Teacher) | Some(Role::Admin) => Decision::Allow,
        None => Decision::Deny(Denial::Forbidden),
    };

    tracing::debug!(account_id = account.id, ?decision, "create-article decision");
    Ok(decision)
}

/// can_access_authenticated_area
///
/// Allows any visitor whose session resolves to a live account. The pipeline
/// marks allowed responses `Cache-Control: no-store`.
pub async fn can_access_authenticated_area(
    session: &dyn SessionState,
    accounts: &dyn AccountStore,
) -> Result<Decision, AppError> {
    Ok(match resolve_visitor(session, accounts).await? {
        Visitor::Anonymous => Decision::redirect(LOGIN_PATH),
        Visitor::Known(_) => Decision::Allow,
    })
}

/// can_administer
///
/// Admin-only gate. The role comes from the store, not the session cache, so
/// a demoted admin loses access immediately. The approval flag is ignored.
pub async fn can_administer(
    session: &dyn SessionState,
    accounts: &dyn AccountStore,
) -> Result<Decision, AppError> {
    let account = match resolve_visitor(session, accounts).await? {
        Visitor::Anonymous => return Ok(Decision::redirect(LOGIN_PATH)),
        Visitor::Known(account) => account,
    };

    let decision = match account.role {
        Some(Role::Admin) => Decision::Allow,
        _ => Decision::redirect(HOME_PATH),
    };

    tracing::debug!(account_id = account.id, ?decision, "administer decision");
    Ok(decision)
}
