use anyhow::{Context, Result};
use axum::{
    body::Body,
    http::{HeaderName, HeaderValue, Method, Request},
    routing::{get, post},
    Extension, Router,
};
use sqlx::postgres::PgPoolOptions;
use std::{sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::PropagateRequestIdLayer,
    set_header::SetRequestHeaderLayer,
    trace::TraceLayer,
};
use tracing::{debug_span, info, Span};
use ulid::Ulid;

use crate::session::{store::RedisTokenStore, SessionConfig, SessionManager};
use crate::storage::{PgLoginAudit, PgUserRecords};

pub mod extract;
pub mod handlers;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

/// Build the application router around a session manager.
///
/// Split from `new` so the lifecycle tests can drive the full HTTP surface
/// with in-memory collaborators.
pub fn router(manager: Arc<SessionManager>) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE])
        // allow requests from any origin
        .allow_origin(Any);

    Router::new()
        .route("/api/v1/user", post(handlers::create_user))
        .route(
            "/api/v1/user/:id",
            get(handlers::user_info).patch(handlers::patch_user),
        )
        .route(
            "/api/v1/user/:id/login_history",
            get(handlers::login_history),
        )
        .route(
            "/api/v1/token",
            post(handlers::token_grant).delete(handlers::revoke_token),
        )
        .route(
            "/api/v1/refresh_token",
            post(handlers::refresh_token).delete(handlers::revoke_refresh_token),
        )
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestHeaderLayer::if_not_present(
                    HeaderName::from_static("x-request-id"),
                    |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
                ))
                .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                    "x-request-id",
                )))
                .layer(TraceLayer::new_for_http().make_span_with(make_span))
                .layer(cors)
                .layer(Extension(manager)),
        )
        .route("/health", get(handlers::health).options(handlers::health))
}

/// Connect the collaborators and serve.
/// # Errors
/// Returns an error if the server fails to start
pub async fn new(port: u16, dsn: String, store_url: String, config: SessionConfig) -> Result<()> {
    // Connect to database
    let pool = PgPoolOptions::new()
        .min_connections(1)
        .max_connections(5)
        .max_lifetime(Duration::from_secs(60 * 2))
        .test_before_acquire(true)
        .connect(&dsn)
        .await
        .context("Failed to connect to database")?;

    // Fail fast when the token store is unreachable; without it no
    // revocation decision can be made.
    let store = RedisTokenStore::connect(&store_url)
        .await
        .context("Failed to connect to token store")?;

    let manager = Arc::new(SessionManager::new(
        Arc::new(PgUserRecords::new(pool.clone())),
        Arc::new(PgLoginAudit::new(pool)),
        Arc::new(store),
        config,
    ));

    let app = router(manager);

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(listener, app.into_make_service()).await?;

    Ok(())
}

// span
fn make_span(request: &Request<Body>) -> Span {
    let headers = request.headers();
    let path = request.uri().path();
    let request_id = headers
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");

    debug_span!("http-request", path, ?headers, request_id)
}
