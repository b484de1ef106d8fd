use aitu_news::{
    AppConfig, AppState, Argon2Verifier, create_router,
    credentials::CredentialVerifier,
    error::StoreError,
    models::{Account, Article, NewAccount, Role},
    repository::{AccountStore, MemoryAccountStore, MemoryArticleStore},
};
use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{HeaderMap, Request, StatusCode, header},
    response::Response,
};
use chrono::{Duration, Utc};
use serde_json::{Value, json};
use std::sync::Arc;
use tokio::test;
use tower::ServiceExt;
use tower_sessions::MemoryStore;

// --- Test Harness ---

/// The full router (interceptors and session layer included) over in-memory
/// stores. Nothing leaves the process.
struct TestApp {
    router: Router,
    accounts: Arc<MemoryAccountStore>,
    articles: Arc<MemoryArticleStore>,
    verifier: Arc<Argon2Verifier>,
}

impl TestApp {
    fn new() -> Self {
        let accounts = Arc::new(MemoryAccountStore::new());
        let articles = Arc::new(MemoryArticleStore::new());
        let verifier = Arc::new(Argon2Verifier::new(8, 1, 1).expect("valid test parameters"));

        let state = AppState {
            accounts: accounts.clone(),
            articles: articles.clone(),
            verifier: verifier.clone(),
            config: AppConfig::default(),
        };

        TestApp {
            router: create_router(state, MemoryStore::default()),
            accounts,
            articles,
            verifier,
        }
    }

    async fn send(&self, request: Request<Body>) -> Response {
        self.router.clone().oneshot(request).await.unwrap()
    }

    /// Seeds an account whose password is `password`.
    async fn seed_account(&self, email: &str, role: Option<Role>, approved: bool) -> i64 {
        let credential_hash = self.verifier.hash("password").await.unwrap();
        self.accounts.seed(Account {
            id: 0,
            name: email.to_string(),
            email: email.to_string(),
            credential_hash,
            role,
            approved,
            active: true,
            created_at: Utc::now(),
        })
    }

    fn seed_article(&self, title: &str, category: &str, expires_in: Duration) -> i64 {
        let now = Utc::now();
        self.articles.seed(Article {
            id: 0,
            title: title.to_string(),
            content: "Body".to_string(),
            created_at: now,
            expires_at: now + expires_in,
            category: category.to_string(),
        })
    }
}

/// A browser: remembers the session cookie between requests.
#[derive(Default)]
struct Visitor {
    cookie: Option<String>,
}

impl Visitor {
    fn request(&self, method: &str, uri: &str, body: Option<Value>) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(cookie) = &self.cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    async fn send(
        &mut self,
        app: &TestApp,
        method: &str,
        uri: &str,
        body: Option<Value>,
    ) -> Response {
        let response = app.send(self.request(method, uri, body)).await;
        self.absorb(response.headers());
        response
    }

    fn absorb(&mut self, headers: &HeaderMap) {
        if let Some(set_cookie) = headers.get(header::SET_COOKIE) {
            let set_cookie = set_cookie.to_str().unwrap();
            if set_cookie.contains("Max-Age=0") {
                self.cookie = None;
            } else {
                let pair = set_cookie.split(';').next().unwrap();
                self.cookie = Some(pair.to_string());
            }
        }
    }

    async fn log_in(&mut self, app: &TestApp, email: &str) {
        let response = self
            .send(
                app,
                "POST",
                "/user/login",
                Some(json!({ "email": email, "password": "password" })),
            )
            .await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER, "login of {email}");
    }
}

fn location(response: &Response) -> &str {
    response
        .headers()
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
}

async fn json_body(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn article_payload() -> Value {
    json!({
        "title": "Campus news",
        "content": "The library is open late this week.",
        "expires": "7",
        "category": "campus",
    })
}

// --- Interceptors ---

#[test]
async fn test_security_headers_and_request_id_on_every_response() {
    let app = TestApp::new();

    let response = app.send(Visitor::default().request("GET", "/health", None)).await;

    assert_eq!(response.status(), StatusCode::OK);
    let headers = response.headers();
    assert_eq!(headers.get(header::X_FRAME_OPTIONS).unwrap(), "deny");
    assert_eq!(headers.get("x-xss-protection").unwrap(), "1; mode=block");
    assert!(headers.get("x-request-id").is_some());
}

// --- Public Pages ---

#[test]
async fn test_home_lists_only_live_articles() {
    let app = TestApp::new();
    app.seed_article("Fresh", "campus", Duration::days(1));
    app.seed_article("Stale", "sports", Duration::seconds(-1));

    let response = app.send(Visitor::default().request("GET", "/", None)).await;

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    let titles: Vec<&str> = body["articles"]
        .as_array()
        .unwrap()
        .iter()
        .map(|a| a["title"].as_str().unwrap())
        .collect();
    assert_eq!(titles, vec!["Fresh"]);
    assert_eq!(body["categories"], json!(["campus"]));
}

#[test]
async fn test_expired_or_invalid_article_is_not_found() {
    let app = TestApp::new();
    let expired = app.seed_article("Old", "campus", Duration::seconds(-1));

    let expired = app
        .send(Visitor::default().request("GET", &format!("/article/{expired}"), None))
        .await;
    let zero = app.send(Visitor::default().request("GET", "/article/0", None)).await;

    assert_eq!(expired.status(), StatusCode::NOT_FOUND);
    assert_eq!(zero.status(), StatusCode::NOT_FOUND);
}

#[test]
async fn test_category_page_filters_by_category() {
    let app = TestApp::new();
    app.seed_article("Match", "sports", Duration::days(1));
    app.seed_article("Other", "campus", Duration::days(1));

    let response = app
        .send(Visitor::default().request("GET", "/category/sports", None))
        .await;

    let body = json_body(response).await;
    assert_eq!(body["category"], "sports");
    assert_eq!(body["articles"].as_array().unwrap().len(), 1);
    assert_eq!(body["articles"][0]["title"], "Match");
}

// --- Signup & Login ---

#[test]
async fn test_signup_then_login_flashes_and_redirects() {
    let app = TestApp::new();
    let mut visitor = Visitor::default();

    let response = visitor
        .send(
            &app,
            "POST",
            "/user/signup",
            Some(json!({
                "name": "Aruzhan",
                "email": "aruzhan@astanait.edu.kz",
                "password": "s3cret",
                "role": "Student",
            })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/user/login");

    let response = visitor.send(&app, "GET", "/", None).await;
    assert_eq!(
        json_body(response).await["flash"],
        "Your signup was successful. Please log in."
    );

    let response = visitor
        .send(
            &app,
            "POST",
            "/user/login",
            Some(json!({ "email": "aruzhan@astanait.edu.kz", "password": "s3cret" })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/article/create");
}

#[test]
async fn test_signup_with_taken_email_is_a_field_error() {
    let app = TestApp::new();
    app.seed_account("taken@astanait.edu.kz", Some(Role::Student), false)
        .await;

    let response = Visitor::default()
        .send(
            &app,
            "POST",
            "/user/signup",
            Some(json!({
                "name": "Someone",
                "email": "taken@astanait.edu.kz",
                "password": "s3cret",
                "role": "teacher",
            })),
        )
        .await;

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = json_body(response).await;
    assert_eq!(body["fields"]["email"], json!(["Address is already in use"]));
    assert_eq!(app.accounts.count_by_email("taken@astanait.edu.kz"), 1);
}

#[test]
async fn test_signup_rejects_admin_role_and_bad_fields() {
    let app = TestApp::new();

    let response = Visitor::default()
        .send(
            &app,
            "POST",
            "/user/signup",
            Some(json!({
                "name": "",
                "email": "not-an-email",
                "password": "abc",
                "role": "admin",
            })),
        )
        .await;

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let fields = &json_body(response).await["fields"];
    assert_eq!(fields["name"], json!(["This field cannot be blank"]));
    assert_eq!(fields["email"], json!(["This field is invalid"]));
    assert_eq!(
        fields["password"],
        json!(["This field is too short (minimum is 4 characters)"])
    );
    assert_eq!(fields["role"], json!(["This field is invalid"]));
    assert_eq!(app.accounts.count_by_email("not-an-email"), 0);
}

#[test]
async fn test_failed_login_is_generic() {
    let app = TestApp::new();
    app.seed_account("known@astanait.edu.kz", Some(Role::Student), false)
        .await;

    let wrong_secret = Visitor::default()
        .send(
            &app,
            "POST",
            "/user/login",
            Some(json!({ "email": "known@astanait.edu.kz", "password": "nope" })),
        )
        .await;
    let unknown_email = Visitor::default()
        .send(
            &app,
            "POST",
            "/user/login",
            Some(json!({ "email": "unknown@astanait.edu.kz", "password": "password" })),
        )
        .await;

    assert_eq!(wrong_secret.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(unknown_email.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(json_body(wrong_secret).await, json_body(unknown_email).await);
}

// --- Article Creation Gate ---

#[test]
async fn test_anonymous_author_is_sent_to_login() {
    let app = TestApp::new();

    for method in ["GET", "POST"] {
        let body = (method == "POST").then(article_payload);
        let response = app
            .send(Visitor::default().request(method, "/article/create", body))
            .await;

        assert_eq!(response.status(), StatusCode::SEE_OTHER, "{method}");
        assert_eq!(location(&response), "/user/login", "{method}");
    }
}

#[test]
async fn test_student_author_is_sent_home() {
    let app = TestApp::new();
    app.seed_account("student@astanait.edu.kz", Some(Role::Student), true)
        .await;
    let mut student = Visitor::default();
    student.log_in(&app, "student@astanait.edu.kz").await;

    let response = student
        .send(&app, "POST", "/article/create", Some(article_payload()))
        .await;

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/");
}

#[test]
async fn test_unknown_role_is_forbidden() {
    let app = TestApp::new();
    app.seed_account("ghost@astanait.edu.kz", None, true).await;
    let mut ghost = Visitor::default();
    ghost.log_in(&app, "ghost@astanait.edu.kz").await;

    let response = ghost.send(&app, "GET", "/article/create", None).await;

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[test]
async fn test_teacher_publishes_once_approved_without_relogin() {
    let app = TestApp::new();
    let teacher_id = app
        .seed_account("teacher@astanait.edu.kz", Some(Role::Teacher), false)
        .await;
    app.seed_account("admin@astanait.edu.kz", Some(Role::Admin), false)
        .await;

    let mut teacher = Visitor::default();
    teacher.log_in(&app, "teacher@astanait.edu.kz").await;
    let response = teacher.send(&app, "GET", "/article/create", None).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/");

    let mut admin = Visitor::default();
    admin.log_in(&app, "admin@astanait.edu.kz").await;
    let response = admin.send(&app, "GET", "/admin/approve", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let pending = json_body(response).await;
    assert_eq!(pending["pending"][0]["id"], teacher_id);
    assert!(pending["pending"][0].get("credential_hash").is_none());

    let response = admin
        .send(
            &app,
            "POST",
            "/admin/approve",
            Some(json!({ "ids": [teacher_id, 404] })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let report = json_body(response).await;
    assert_eq!(report["succeeded"], json!([teacher_id]));
    assert_eq!(report["failed"], json!([404]));

    // Same cookie as before the approval.
    let response = teacher.send(&app, "GET", "/article/create", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CACHE_CONTROL).unwrap(),
        "no-store"
    );
    assert_eq!(json_body(response).await["expiry_days"], json!([365, 7, 1]));

    let response = teacher
        .send(&app, "POST", "/article/create", Some(article_payload()))
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    let article_path = location(&response).to_string();
    assert!(article_path.starts_with("/article/"));

    let response = teacher.send(&app, "GET", &article_path, None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let page = json_body(response).await;
    assert_eq!(page["flash"], "Article successfully created!");
    assert_eq!(page["article"]["title"], "Campus news");
}

#[test]
async fn test_article_submission_is_validated() {
    let app = TestApp::new();
    app.seed_account("admin@astanait.edu.kz", Some(Role::Admin), false)
        .await;
    let mut admin = Visitor::default();
    admin.log_in(&app, "admin@astanait.edu.kz").await;

    let response = admin
        .send(
            &app,
            "POST",
            "/article/create",
            Some(json!({
                "title": "x".repeat(101),
                "content": "",
                "expires": "30",
                "category": "campus",
            })),
        )
        .await;

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let fields = &json_body(response).await["fields"];
    assert_eq!(
        fields["title"],
        json!(["This field is too long (maximum is 100 characters)"])
    );
    assert_eq!(fields["content"], json!(["This field cannot be blank"]));
    assert_eq!(fields["expires"], json!(["This field is invalid"]));
}

// --- Admin Area ---

#[test]
async fn test_admin_routes_turn_away_non_admins() {
    let app = TestApp::new();
    let teacher_id = app
        .seed_account("teacher@astanait.edu.kz", Some(Role::Teacher), false)
        .await;
    app.seed_account("student@astanait.edu.kz", Some(Role::Student), false)
        .await;

    let response = app
        .send(Visitor::default().request("GET", "/admin/approve", None))
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/user/login");

    let mut student = Visitor::default();
    student.log_in(&app, "student@astanait.edu.kz").await;
    let response = student
        .send(
            &app,
            "POST",
            "/admin/approve",
            Some(json!({ "ids": [teacher_id] })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/");
    assert!(!app.accounts.get(teacher_id).unwrap().approved);
}

#[test]
async fn test_revoke_puts_teacher_back_in_the_queue() {
    let app = TestApp::new();
    let teacher_id = app
        .seed_account("teacher@astanait.edu.kz", Some(Role::Teacher), true)
        .await;
    app.seed_account("admin@astanait.edu.kz", Some(Role::Admin), false)
        .await;
    let mut admin = Visitor::default();
    admin.log_in(&app, "admin@astanait.edu.kz").await;

    let response = admin
        .send(
            &app,
            "POST",
            "/admin/revoke",
            Some(json!({ "ids": [teacher_id] })),
        )
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert!(!app.accounts.get_by_id(teacher_id).await.unwrap().approved);
}

// --- Logout & Faults ---

#[test]
async fn test_logout_invalidates_the_old_token() {
    let app = TestApp::new();
    app.seed_account("student@astanait.edu.kz", Some(Role::Student), false)
        .await;
    let mut student = Visitor::default();
    student.log_in(&app, "student@astanait.edu.kz").await;
    let old_cookie = student.cookie.clone();

    let response = student.send(&app, "POST", "/user/logout", None).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/");
    assert_eq!(
        response.headers().get(header::CACHE_CONTROL).unwrap(),
        "no-store"
    );

    let response = student.send(&app, "GET", "/", None).await;
    assert_eq!(
        json_body(response).await["flash"],
        "You've been logged out successfully!"
    );

    // Replaying the pre-logout cookie gets an anonymous session.
    let replay = Visitor { cookie: old_cookie };
    let response = app
        .send(replay.request("POST", "/user/logout", None))
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/user/login");
}

#[test]
async fn test_deleted_account_behind_session_is_a_server_error() {
    let app = TestApp::new();
    let id = app
        .seed_account("teacher@astanait.edu.kz", Some(Role::Teacher), true)
        .await;
    let mut teacher = Visitor::default();
    teacher.log_in(&app, "teacher@astanait.edu.kz").await;
    app.accounts.remove(id);

    let response = teacher.send(&app, "GET", "/article/create", None).await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json_body(response).await["error"], "Internal Server Error");
}

#[test]
async fn test_padded_email_is_trimmed_before_validation() {
    let app = TestApp::new();

    let response = Visitor::default()
        .send(
            &app,
            "POST",
            "/user/signup",
            Some(json!({
                "name": "Padded",
                "email": "  padded@astanait.edu.kz ",
                "password": "s3cret",
                "role": "student",
            })),
        )
        .await;

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(app.accounts.count_by_email("padded@astanait.edu.kz"), 1);
}

#[test]
async fn test_admin_pages_are_not_cached() {
    let app = TestApp::new();
    let teacher_id = app
        .seed_account("teacher@astanait.edu.kz", Some(Role::Teacher), false)
        .await;
    app.seed_account("admin@astanait.edu.kz", Some(Role::Admin), false)
        .await;
    let mut admin = Visitor::default();
    admin.log_in(&app, "admin@astanait.edu.kz").await;

    let listing = admin.send(&app, "GET", "/admin/approve", None).await;
    let approve = admin
        .send(&app, "POST", "/admin/approve", Some(json!({ "ids": [teacher_id] })))
        .await;
    let revoke = admin
        .send(&app, "POST", "/admin/revoke", Some(json!({ "ids": [teacher_id] })))
        .await;

    for response in [listing, approve, revoke] {
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CACHE_CONTROL).unwrap(),
            "no-store"
        );
    }
}

/// Finds accounts by email but loses them by id, as if the row were deleted
/// between the two reads of a login.
struct VanishingAccounts(MemoryAccountStore);

#[async_trait]
impl AccountStore for VanishingAccounts {
    async fn get_by_id(&self, _id: i64) -> Result<Account, StoreError> {
        Err(StoreError::NotFound)
    }

    async fn get_by_email(&self, email: &str) -> Result<Account, StoreError> {
        self.0.get_by_email(email).await
    }

    async fn insert(&self, account: NewAccount) -> Result<i64, StoreError> {
        self.0.insert(account).await
    }

    async fn set_approved(&self, id: i64, approved: bool) -> Result<(), StoreError> {
        self.0.set_approved(id, approved).await
    }

    async fn list_pending_approvals(&self) -> Result<Vec<Account>, StoreError> {
        self.0.list_pending_approvals().await
    }
}

#[test]
async fn test_account_lost_during_login_is_a_server_error() {
    let verifier = Arc::new(Argon2Verifier::new(8, 1, 1).expect("valid test parameters"));
    let inner = MemoryAccountStore::new();
    inner.seed(Account {
        id: 0,
        name: "Vanishing".to_string(),
        email: "vanishing@astanait.edu.kz".to_string(),
        credential_hash: verifier.hash("password").await.unwrap(),
        role: Some(Role::Student),
        approved: false,
        active: true,
        created_at: Utc::now(),
    });
    let state = AppState {
        accounts: Arc::new(VanishingAccounts(inner)),
        articles: Arc::new(MemoryArticleStore::new()),
        verifier,
        config: AppConfig::default(),
    };
    let router = create_router(state, MemoryStore::default());

    let request = Visitor::default().request(
        "POST",
        "/user/login",
        Some(json!({ "email": "vanishing@astanait.edu.kz", "password": "password" })),
    );
    let response = router.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json_body(response).await["error"], "Internal Server Error");
}
