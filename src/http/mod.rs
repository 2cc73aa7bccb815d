//! REST surface. Routes mirror the classic `/api/...` layout; every failure leaves
//! as `{"error": {"code", "message"}}` with engine detail kept in the server log.

mod extract;
mod handlers;
mod session;

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::{Request, State};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use tracing::info;

use crate::config::Config;
use crate::db::Db;
use crate::drafts::DraftStore;
use crate::error::AppError;

pub use session::Caller;

/// Shared server state.
#[derive(Clone)]
pub struct AppState {
    pub db: Db,
    pub drafts: Arc<DraftStore>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(db: Db, config: Config) -> Self {
        Self {
            db,
            drafts: Arc::new(DraftStore::new()),
            config: Arc::new(config),
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    let timeout = state.config.request_timeout();

    let api = Router::new()
        .route("/health", get(handlers::core::health))
        .route(
            "/students",
            get(handlers::students::list).post(handlers::students::create),
        )
        .route("/students/{id}", get(handlers::students::get_one))
        .route("/attendance", post(handlers::attendance::record))
        .route("/attendance/batch", post(handlers::attendance::submit_batch))
        .route("/attendance/{student_id}", get(handlers::attendance::history))
        .route(
            "/attendance/{student_id}/summary",
            get(handlers::attendance::student_summary),
        )
        .route(
            "/analytics/attendance-summary",
            get(handlers::analytics::attendance_summary),
        )
        .route("/auth/register", post(handlers::auth::register))
        .route("/auth/login", post(handlers::auth::login))
        .route("/auth/logout", post(handlers::auth::logout))
        .route("/auth/me", get(handlers::auth::me))
        .route(
            "/drafts",
            get(handlers::drafts::get_one)
                .put(handlers::drafts::save)
                .delete(handlers::drafts::discard),
        )
        .route("/drafts/commit", post(handlers::drafts::commit))
        .route(
            "/appeals",
            get(handlers::appeals::list).post(handlers::appeals::create),
        )
        .route("/appeals/{id}/approve", post(handlers::appeals::approve))
        .route("/appeals/{id}/reject", post(handlers::appeals::reject))
        .route(
            "/notifications",
            get(handlers::notifications::list).post(handlers::notifications::send),
        )
        .route(
            "/notifications/{id}/read",
            post(handlers::notifications::mark_read),
        );

    Router::new()
        .route("/", get(handlers::core::banner))
        .nest("/api", api)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            session::session_middleware,
        ))
        .layer(middleware::from_fn_with_state(timeout, timeout_middleware))
        .layer(middleware::from_fn(trace_middleware))
        .with_state(state)
}

/// Bounds each request. Storage work already handed to the blocking pool still
/// finishes; only the response is abandoned.
async fn timeout_middleware(
    State(limit): State<Duration>,
    request: Request,
    next: Next,
) -> Response {
    match tokio::time::timeout(limit, next.run(request)).await {
        Ok(resp) => resp,
        Err(_) => {
            tracing::warn!(?limit, "request timed out");
            AppError::Timeout.into_response()
        }
    }
}

async fn trace_middleware(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let started = Instant::now();
    let resp = next.run(request).await;
    info!(
        %method,
        %path,
        status = resp.status().as_u16(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "request"
    );
    resp
}
