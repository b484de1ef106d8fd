use std::collections::BTreeSet;

use crate::{
    error::AppError,
    models::{Account, ApprovalReport},
    policy::{self, Decision, Denial},
    repository::AccountStore,
    session::SessionState,
};

/// Approval
///
/// Result of an admin-gated workflow call: either the gate refused the caller
/// before anything was touched, or the change was applied and reported per id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Approval<T> {
    Applied(T),
    Denied(Denial),
}

async fn gate(session: &dyn SessionState, accounts: &dyn AccountStore) -> Result<Option<Denial>, AppError> {
    Ok(match policy::can_administer(session, accounts).await? {
        Decision::Allow => None,
        Decision::Deny(denial) => Some(denial),
    })
}

/// Applies `approved` to each id independently. A failing id is recorded and
/// the loop moves on; there is no cross-account transaction.
async fn set_each(accounts: &dyn AccountStore, ids: &BTreeSet<i64>, approved: bool) -> ApprovalReport {
    let mut report = ApprovalReport::default();
    for &id in ids {
        match accounts.set_approved(id, approved).await {
            Ok(()) => {
                report.succeeded.insert(id);
            }
            Err(err) => {
                tracing::warn!(account_id = id, approved, error = %err, "approval update failed");
                report.failed.insert(id);
            }
        }
    }
    report
}

/// approve_accounts
///
/// Moves each named teacher account from Pending to Approved.
///
/// - The caller must pass `can_administer`; otherwise nothing is mutated.
/// - Each id is committed on its own; unknown ids, non-teacher accounts and
///   store errors land in `failed` without aborting the batch.
/// - Approving an already approved teacher succeeds again.
pub async fn approve_accounts(
    session: &dyn SessionState,
    accounts: &dyn AccountStore,
    ids: &BTreeSet<i64>,
) -> Result<Approval<ApprovalReport>, AppError> {
    if let Some(denial) = gate(session, accounts).await? {
        return Ok(Approval::Denied(denial));
    }

    let report = set_each(accounts, ids, true).await;
    tracing::info!(
        succeeded = report.succeeded.len(),
        failed = report.failed.len(),
        "teacher approvals applied"
    );
    Ok(Approval::Applied(report))
}

/// revoke_approvals
///
/// The explicit reverse transition, Approved back to Pending, with the same
/// gating and per-id isolation as `approve_accounts`. There is no separate
/// rejected state: a revoked teacher simply waits in the pending list again.
pub async fn revoke_approvals(
    session: &dyn SessionState,
    accounts: &dyn AccountStore,
    ids: &BTreeSet<i64>,
) -> Result<Approval<ApprovalReport>, AppError> {
    if let Some(denial) = gate(session, accounts).await? {
        return Ok(Approval::Denied(denial));
    }

    let report = set_each(accounts, ids, false).await;
    tracing::info!(
        succeeded = report.succeeded.len(),
        failed = report.failed.len(),
        "teacher approvals revoked"
    );
    Ok(Approval::Applied(report))
}

/// pending_teachers
///
/// Admin-gated listing of teacher accounts awaiting approval.
pub async fn pending_teachers(
    session: &dyn SessionState,
    accounts: &dyn AccountStore,
) -> Result<Approval<Vec<Account>>, AppError> {
    if let Some(denial) = gate(session, accounts).await? {
        return Ok(Approval::Denied(denial));
    }
    Ok(Approval::Applied(accounts.list_pending_approvals().await?))
}
