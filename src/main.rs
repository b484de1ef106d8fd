use aitu_news::{
    AppState, Argon2Verifier,
    config::{AppConfig, Env},
    create_router,
    repository::{
        AccountStoreState, ArticleStoreState, PostgresAccountStore, PostgresArticleStore,
    },
};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_sessions::session_store::ExpiredDeletion;
use tower_sessions_sqlx_store::PostgresStore;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// How often expired session rows are swept from the session table.
const SESSION_SWEEP_INTERVAL: tokio::time::Duration = tokio::time::Duration::from_secs(60);

/// main
///
/// Startup order: configuration, logging, database (plus migrations), session
/// store, credential hashing, then the HTTP server. Any failure before the
/// server is listening aborts the process.
#[tokio::main]
async fn main() {
    // 1. Configuration & Environment Loading (Fail-Fast)
    dotenv::dotenv().ok();
    let config = AppConfig::load();

    // 2. Logging Filter Setup
    // RUST_LOG wins; otherwise debug for this crate and request-level info.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "aitu_news=debug,tower_http=info,axum=info".into());

    // 3. Initialize Logging based on Environment
    match config.env {
        Env::Local => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
        Env::Production => {
            // JSON lines for the log aggregator.
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
    }

    tracing::info!("Application starting in {:?} mode", config.env);

    // 4. Database Initialization (Postgres)
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.db_url)
        .await
        .expect("FATAL: Failed to connect to Postgres. Check DATABASE_URL.");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("FATAL: Failed to run database migrations.");

    let accounts = Arc::new(PostgresAccountStore::new(pool.clone())) as AccountStoreState;
    let articles = Arc::new(PostgresArticleStore::new(pool.clone())) as ArticleStoreState;

    // 5. Session Store
    // Sessions live next to the accounts, in their own schema/table.
    let session_store = PostgresStore::new(pool);
    session_store
        .migrate()
        .await
        .expect("FATAL: Failed to create the session table.");

    let sweeper = tokio::task::spawn(
        session_store
            .clone()
            .continuously_delete_expired(SESSION_SWEEP_INTERVAL),
    );

    // 6. Credential Hashing
    let verifier = Argon2Verifier::new(
        config.argon2_memory_kib,
        config.argon2_iterations,
        config.argon2_parallelism,
    )
    .expect("FATAL: Invalid Argon2 parameters. Check ARGON2_* settings.");

    // 7. Unified State Assembly
    let bind_addr = config.bind_addr.clone();
    let app_state = AppState {
        accounts,
        articles,
        verifier: Arc::new(verifier),
        config,
    };

    // 8. Router and Server Startup
    let app = create_router(app_state, session_store);

    let listener = TcpListener::bind(&bind_addr)
        .await
        .unwrap_or_else(|e| panic!("FATAL: Failed to bind {bind_addr}: {e}"));

    tracing::info!("Listening on {bind_addr}");
    tracing::info!("API Documentation (Swagger UI) available at: http://{bind_addr}/swagger-ui");

    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!(error = %e, "HTTP server terminated");
    }

    sweeper.abort();
}
