//! api-server — HTTP transport for the user service.
//!
//! Wires handler → service → repository once at startup:
//! - Storage: in-memory (default), SQLite when the `sqlite` feature is
//!   enabled, Postgres with the `postgres` feature.
//! - Every request runs under a deadline; an expired or disconnected request
//!   drops its service future, which cancels the repository call.
//!
//! Run:
//! ```bash
//! # pretty logs (default); PORT optional
//! cargo run -p api-server
//!
//! # file-backed
//! STORAGE_PROVIDER=sqlite DB_PATH=./data/users.db cargo run -p api-server
//!
//! # Postgres
//! STORAGE_PROVIDER=postgres DATABASE_URL=postgres://localhost/users \
//!   cargo run -p api-server --features postgres
//! ```
//!
//! Configuration: See `config.rs` for all environment variables.

mod config;
mod handlers;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use domain::adapters::memory_repo::InMemoryUserRepo;
use domain::id::UuidV4Generator;
use domain::service::UserService;
use domain::{CoreError, UserRepository};
use tower_http::{
    catch_panic::CatchPanicLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::{Config, StorageProvider};
use crate::handlers::AppState;

/// Reasons the process refuses to start.
#[derive(Debug, thiserror::Error)]
enum StartupError {
    #[error("storage init failed: {0}")]
    Storage(#[from] CoreError),
    #[error("storage provider '{0}' is not compiled in; enable the `{0}` feature")]
    #[cfg_attr(all(feature = "sqlite", feature = "postgres"), allow(dead_code))]
    FeatureDisabled(&'static str),
    #[error("bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        source: std::io::Error,
    },
    #[error("server error: {0}")]
    Serve(std::io::Error),
}

#[tokio::main]
async fn main() {
    // Load and validate config first (fail fast on misconfiguration)
    let cfg = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    };

    init_tracing(&cfg);
    info!(app = %cfg.app_name, env = %cfg.app_env, storage = cfg.storage_provider.as_str(), "starting");

    if let Err(e) = run(cfg).await {
        error!(err = %e, "api-server exiting");
        std::process::exit(1);
    }
}

async fn run(cfg: Config) -> Result<(), StartupError> {
    let repo = build_repo(&cfg).await?;
    let state = AppState {
        users: Arc::new(UserService::new(repo, UuidV4Generator::new())),
        request_timeout: cfg.request_timeout,
    };
    let app = build_app(state);

    let addr: SocketAddr = ([0, 0, 0, 0], cfg.port).into();
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|source| StartupError::Bind { addr, source })?;
    info!(%addr, "api-server listening");
    axum::serve(listener, app)
        .await
        .map_err(StartupError::Serve)
}

fn init_tracing(cfg: &Config) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cfg.log_level.to_string()));

    let registry = tracing_subscriber::registry().with(env_filter);
    match cfg.log_format {
        config::LogFormat::Json => {
            registry
                .with(
                    fmt::layer()
                        .json()
                        .with_target(true)
                        .with_timer(fmt::time::SystemTime)
                        .with_writer(std::io::stdout),
                )
                .init();
        }
        config::LogFormat::Pretty => {
            registry
                .with(
                    fmt::layer()
                        .pretty()
                        .with_target(true)
                        .with_writer(std::io::stdout),
                )
                .init();
        }
    }
}

/// Router plus the middleware stack: request ids, a span per request, and
/// panic recovery into a 500.
fn build_app(state: AppState) -> Router {
    let x_request_id = axum::http::HeaderName::from_static("x-request-id");

    handlers::router(state)
        .layer(CatchPanicLayer::new())
        .layer(PropagateRequestIdLayer::new(x_request_id.clone()))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get("x-request-id")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("-");
                tracing::info_span!(
                    "http_request",
                    method = %request.method(),
                    uri = %request.uri(),
                    request_id = %request_id,
                )
            }),
        )
        .layer(SetRequestIdLayer::new(x_request_id, MakeRequestUuid))
}

// Construct the repository selected by config. Failures abort startup.
async fn build_repo(cfg: &Config) -> Result<Arc<dyn UserRepository>, StartupError> {
    match cfg.storage_provider {
        StorageProvider::Memory => Ok(Arc::new(InMemoryUserRepo::new())),
        StorageProvider::Sqlite => build_sqlite(cfg),
        StorageProvider::Postgres => build_postgres(cfg).await,
    }
}

#[cfg(feature = "sqlite")]
fn build_sqlite(cfg: &Config) -> Result<Arc<dyn UserRepository>, StartupError> {
    info!(path = %cfg.db_path.display(), "opening sqlite database");
    let repo = sqlite_adapter::SqliteUserRepo::open_creating_dirs(&cfg.db_path)?;
    Ok(Arc::new(repo))
}

#[cfg(not(feature = "sqlite"))]
fn build_sqlite(_cfg: &Config) -> Result<Arc<dyn UserRepository>, StartupError> {
    Err(StartupError::FeatureDisabled("sqlite"))
}

#[cfg(feature = "postgres")]
async fn build_postgres(cfg: &Config) -> Result<Arc<dyn UserRepository>, StartupError> {
    // Config::from_env guarantees the URL for this provider.
    let url = cfg.database_url.as_deref().unwrap_or_default();
    let repo = postgres_adapter::PostgresUserRepo::connect(url, cfg.db_max_connections).await?;
    Ok(Arc::new(repo))
}

#[cfg(not(feature = "postgres"))]
async fn build_postgres(_cfg: &Config) -> Result<Arc<dyn UserRepository>, StartupError> {
    Err(StartupError::FeatureDisabled("postgres"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use domain::User;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;
    use tower::util::ServiceExt;

    fn state_with(repo: Arc<dyn UserRepository>, timeout: Duration) -> AppState {
        AppState {
            users: Arc::new(UserService::new(repo, UuidV4Generator::new())),
            request_timeout: timeout,
        }
    }

    fn app() -> Router {
        build_app(state_with(
            Arc::new(InMemoryUserRepo::new()),
            Duration::from_secs(5),
        ))
    }

    fn post_user(body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/v1/users")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get_user(id: &str) -> Request<Body> {
        Request::builder()
            .uri(format!("/api/v1/users/{id}"))
            .body(Body::empty())
            .unwrap()
    }

    async fn json_body(resp: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    /// Sleeps before answering; records whether it ever got to finish.
    struct SlowRepo {
        delay: Duration,
        finished: Arc<AtomicBool>,
    }

    #[async_trait]
    impl UserRepository for SlowRepo {
        async fn get(&self, _id: &str) -> Result<User, CoreError> {
            tokio::time::sleep(self.delay).await;
            self.finished.store(true, Ordering::SeqCst);
            Err(CoreError::NotFound)
        }

        async fn save(&self, _user: &User) -> Result<(), CoreError> {
            tokio::time::sleep(self.delay).await;
            self.finished.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    struct FailingRepo;

    #[async_trait]
    impl UserRepository for FailingRepo {
        async fn get(&self, _id: &str) -> Result<User, CoreError> {
            Err(CoreError::Storage("connection refused".into()))
        }

        async fn save(&self, _user: &User) -> Result<(), CoreError> {
            Err(CoreError::Storage("connection refused".into()))
        }
    }

    struct PanickingRepo;

    #[async_trait]
    impl UserRepository for PanickingRepo {
        async fn get(&self, _id: &str) -> Result<User, CoreError> {
            panic!("boom");
        }

        async fn save(&self, _user: &User) -> Result<(), CoreError> {
            panic!("boom");
        }
    }

    #[tokio::test]
    async fn create_and_get_flow() {
        let router = app();

        let resp = router
            .clone()
            .oneshot(post_user(
                r#"{"name":"John","email":"john@example.com"}"#,
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED);
        assert!(resp.headers().get("x-request-id").is_some());
        let created = json_body(resp).await;
        let id = created["id"].as_str().unwrap().to_string();
        assert!(!id.is_empty());
        assert_eq!(created["name"], "John");
        assert_eq!(created["email"], "john@example.com");

        let resp = router.clone().oneshot(get_user(&id)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(json_body(resp).await, created);
    }

    #[tokio::test]
    async fn empty_name_is_bad_request() {
        let resp = app()
            .oneshot(post_user(r#"{"name":"","email":"x@y.com"}"#))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body = json_body(resp).await;
        assert_eq!(body["error"]["code"], "invalid_request");
        assert_eq!(body["error"]["message"], "name is required");
    }

    #[tokio::test]
    async fn missing_name_field_is_bad_request() {
        let resp = app()
            .oneshot(post_user(r#"{"email":"x@y.com"}"#))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn malformed_json_is_bad_request() {
        let resp = app().oneshot(post_user("{not json")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body = json_body(resp).await;
        assert_eq!(body["error"]["code"], "invalid_request");
    }

    #[tokio::test]
    async fn unknown_id_is_not_found() {
        let resp = app().oneshot(get_user("does-not-exist")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let body = json_body(resp).await;
        assert_eq!(body["error"]["code"], "not_found");
    }

    #[tokio::test]
    async fn storage_failure_is_internal_error() {
        let router = build_app(state_with(Arc::new(FailingRepo), Duration::from_secs(5)));
        let resp = router
            .clone()
            .oneshot(post_user(r#"{"name":"John","email":"j@e.com"}"#))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = json_body(resp).await;
        assert_eq!(body["error"]["code"], "internal");

        let resp = router.oneshot(get_user("any")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn deadline_cancels_repository_call() {
        let finished = Arc::new(AtomicBool::new(false));
        let repo = SlowRepo {
            delay: Duration::from_millis(300),
            finished: finished.clone(),
        };
        let router = build_app(state_with(Arc::new(repo), Duration::from_millis(20)));

        let resp = router
            .oneshot(post_user(r#"{"name":"John","email":"j@e.com"}"#))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::GATEWAY_TIMEOUT);
        let body = json_body(resp).await;
        assert_eq!(body["error"]["code"], "timeout");

        // The abandoned call must never complete.
        tokio::time::sleep(Duration::from_millis(400)).await;
        assert!(!finished.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn panic_in_request_path_becomes_500() {
        let router = build_app(state_with(Arc::new(PanickingRepo), Duration::from_secs(5)));
        let resp = router.oneshot(get_user("x")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn memory_provider_builds_without_features() {
        let cfg = Config::from_lookup(|_| None).unwrap();
        let repo = build_repo(&cfg).await.unwrap();
        assert!(matches!(repo.get("x").await, Err(CoreError::NotFound)));
    }

    #[cfg(feature = "sqlite")]
    #[tokio::test]
    async fn sqlite_provider_builds_from_config() {
        let dir = std::env::temp_dir().join(format!("api-server-test-{}", std::process::id()));
        let path = dir.join("users.db");
        let path_str = path.to_string_lossy().to_string();
        let cfg = Config::from_lookup(|k| match k {
            "STORAGE_PROVIDER" => Some("sqlite".into()),
            "DB_PATH" => Some(path_str.clone()),
            _ => None,
        })
        .unwrap();
        let repo = build_repo(&cfg).await.unwrap();
        let router = build_app(state_with(repo, Duration::from_secs(5)));
        let resp = router
            .oneshot(post_user(r#"{"name":"Ann","email":"ann@e.com"}"#))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED);
        let _ = std::fs::remove_dir_all(dir);
    }
}
