use aitu_news::{
    approval::{self, Approval},
    models::{Account, ApprovalReport, Role},
    policy::{Denial, HOME_PATH, LOGIN_PATH},
    repository::MemoryAccountStore,
    session::MemorySession,
};
use chrono::{Duration, Utc};
use std::collections::BTreeSet;
use tokio::test;

// --- Test Data Helpers ---

fn account(email: &str, role: Role, approved: bool) -> Account {
    Account {
        id: 0,
        name: email.to_string(),
        email: email.to_string(),
        credential_hash: "unused".to_string(),
        role: Some(role),
        approved,
        active: true,
        created_at: Utc::now(),
    }
}

struct Fixture {
    store: MemoryAccountStore,
    admin: MemorySession,
}

impl Fixture {
    fn new() -> Self {
        let store = MemoryAccountStore::new();
        let admin_id = store.seed(account("admin@astanait.edu.kz", Role::Admin, false));
        Fixture {
            store,
            admin: MemorySession::authenticated(admin_id),
        }
    }

    fn teacher(&self, email: &str) -> i64 {
        self.store.seed(account(email, Role::Teacher, false))
    }

    fn approved(&self, id: i64) -> bool {
        self.store.get(id).map(|a| a.approved).unwrap_or(false)
    }
}

fn applied(outcome: Approval<ApprovalReport>) -> ApprovalReport {
    match outcome {
        Approval::Applied(report) => report,
        Approval::Denied(denial) => panic!("expected the change to apply, got {denial:?}"),
    }
}

// --- approve_accounts ---

#[test]
async fn test_partial_batch_reports_each_id_and_is_idempotent() {
    let fx = Fixture::new();
    let teacher = fx.teacher("teacher@astanait.edu.kz");
    let missing = 9_999;

    let ids = BTreeSet::from([teacher, missing]);
    let report = applied(
        approval::approve_accounts(&fx.admin, &fx.store, &ids)
            .await
            .unwrap(),
    );

    assert_eq!(report.succeeded, BTreeSet::from([teacher]));
    assert_eq!(report.failed, BTreeSet::from([missing]));
    assert!(fx.approved(teacher));

    // Approving again is a no-op that still reports success.
    let again = applied(
        approval::approve_accounts(&fx.admin, &fx.store, &BTreeSet::from([teacher]))
            .await
            .unwrap(),
    );
    assert_eq!(again.succeeded, BTreeSet::from([teacher]));
    assert!(again.failed.is_empty());
    assert!(fx.approved(teacher));
}

#[test]
async fn test_store_failure_on_one_id_does_not_abort_the_batch() {
    let fx = Fixture::new();
    let first = fx.teacher("first@astanait.edu.kz");
    let broken = fx.teacher("broken@astanait.edu.kz");
    let last = fx.teacher("last@astanait.edu.kz");
    fx.store.fail_updates_for(broken);

    let report = applied(
        approval::approve_accounts(&fx.admin, &fx.store, &BTreeSet::from([first, broken, last]))
            .await
            .unwrap(),
    );

    assert_eq!(report.succeeded, BTreeSet::from([first, last]));
    assert_eq!(report.failed, BTreeSet::from([broken]));
    assert!(fx.approved(first));
    assert!(!fx.approved(broken));
    assert!(fx.approved(last));
}

#[test]
async fn test_only_teacher_accounts_can_be_approved() {
    let fx = Fixture::new();
    let student = fx
        .store
        .seed(account("student@astanait.edu.kz", Role::Student, false));

    let report = applied(
        approval::approve_accounts(&fx.admin, &fx.store, &BTreeSet::from([student]))
            .await
            .unwrap(),
    );

    assert!(report.succeeded.is_empty());
    assert_eq!(report.failed, BTreeSet::from([student]));
    assert!(!fx.approved(student));
}

#[test]
async fn test_non_admin_is_denied_before_any_mutation() {
    let fx = Fixture::new();
    let teacher = fx.teacher("teacher@astanait.edu.kz");
    let approved_teacher = fx
        .store
        .seed(account("colleague@astanait.edu.kz", Role::Teacher, true));
    let caller = MemorySession::authenticated(approved_teacher);

    let outcome = approval::approve_accounts(&caller, &fx.store, &BTreeSet::from([teacher]))
        .await
        .unwrap();

    assert_eq!(outcome, Approval::Denied(Denial::Redirect(HOME_PATH)));
    assert!(!fx.approved(teacher));
}

#[test]
async fn test_anonymous_caller_is_sent_to_login() {
    let fx = Fixture::new();
    let teacher = fx.teacher("teacher@astanait.edu.kz");

    let outcome =
        approval::approve_accounts(&MemorySession::new(), &fx.store, &BTreeSet::from([teacher]))
            .await
            .unwrap();

    assert_eq!(outcome, Approval::Denied(Denial::Redirect(LOGIN_PATH)));
    assert!(!fx.approved(teacher));
}

#[test]
async fn test_empty_batch_is_an_empty_report() {
    let fx = Fixture::new();

    let report = applied(
        approval::approve_accounts(&fx.admin, &fx.store, &BTreeSet::new())
            .await
            .unwrap(),
    );

    assert_eq!(report, ApprovalReport::default());
}

// --- revoke_approvals ---

#[test]
async fn test_revoke_returns_teacher_to_pending() {
    let fx = Fixture::new();
    let teacher = fx
        .store
        .seed(account("teacher@astanait.edu.kz", Role::Teacher, true));

    let report = applied(
        approval::revoke_approvals(&fx.admin, &fx.store, &BTreeSet::from([teacher]))
            .await
            .unwrap(),
    );

    assert_eq!(report.succeeded, BTreeSet::from([teacher]));
    assert!(!fx.approved(teacher));

    let pending = match approval::pending_teachers(&fx.admin, &fx.store).await.unwrap() {
        Approval::Applied(pending) => pending,
        Approval::Denied(denial) => panic!("admin was denied: {denial:?}"),
    };
    assert_eq!(pending.iter().map(|a| a.id).collect::<Vec<_>>(), vec![teacher]);
}

#[test]
async fn test_revoke_is_admin_gated() {
    let fx = Fixture::new();
    let teacher = fx
        .store
        .seed(account("teacher@astanait.edu.kz", Role::Teacher, true));
    let caller = MemorySession::authenticated(teacher);

    let outcome = approval::revoke_approvals(&caller, &fx.store, &BTreeSet::from([teacher]))
        .await
        .unwrap();

    assert_eq!(outcome, Approval::Denied(Denial::Redirect(HOME_PATH)));
    assert!(fx.approved(teacher));
}

// --- pending_teachers ---

#[test]
async fn test_pending_list_is_oldest_first_and_skips_others() {
    let fx = Fixture::new();
    let now = Utc::now();

    let mut newer = account("newer@astanait.edu.kz", Role::Teacher, false);
    newer.created_at = now;
    let mut older = account("older@astanait.edu.kz", Role::Teacher, false);
    older.created_at = now - Duration::days(3);
    let mut inactive = account("gone@astanait.edu.kz", Role::Teacher, false);
    inactive.active = false;

    let newer = fx.store.seed(newer);
    let older = fx.store.seed(older);
    fx.store.seed(inactive);
    fx.store
        .seed(account("done@astanait.edu.kz", Role::Teacher, true));
    fx.store
        .seed(account("student@astanait.edu.kz", Role::Student, false));

    let pending = match approval::pending_teachers(&fx.admin, &fx.store).await.unwrap() {
        Approval::Applied(pending) => pending,
        Approval::Denied(denial) => panic!("admin was denied: {denial:?}"),
    };

    assert_eq!(
        pending.iter().map(|a| a.id).collect::<Vec<_>>(),
        vec![older, newer]
    );
}
