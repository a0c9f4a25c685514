//! HTTP server
//!
//! | Route | Purpose |
//! |-------|---------|
//! | `GET /health` | Liveness |
//! | `POST /webhook` | GitHub push deliveries |
//! | `GET/POST /api/repos` | List / connect repositories |
//! | `GET/DELETE /api/repos/:id` | Inspect / disconnect |
//! | `POST /api/repos/:id/regenerate` | Queue a full run (`?force=true`) |
//! | `GET /api/repos/:id/docs[/*path]` | Read generated docs |
//! | `GET /api/events` | Progress stream (SSE) |
//!
//! `/api/*` requires `Authorization: Bearer <server.api_token>` when a token
//! is configured.

pub mod api;
pub mod error;
pub mod sse;
pub mod webhook;

use std::future::Future;
use std::sync::Arc;

use axum::extract::{DefaultBodyLimit, Request, State};
use axum::http::header::AUTHORIZATION;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};

use crate::config::Config;
use crate::db::Database;
use crate::detect::PathFilter;
use crate::docgen::{CompletionClient, DocGenerator};
use crate::error::{Error, Result};
use crate::github::SourceHost;
use crate::pipeline::DocPipeline;
use crate::progress::{ProgressHub, DEFAULT_CAPACITY};

pub use error::ApiError;

/// GitHub caps webhook payloads at 25 MB
const WEBHOOK_BODY_LIMIT: usize = 25 * 1024 * 1024;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Database>,
    pub pipeline: Arc<DocPipeline>,
    pub hub: ProgressHub,
    pub config: Arc<Config>,
}

impl AppState {
    /// Wire a pipeline from its collaborators
    pub fn new(
        config: Config,
        db: Arc<Database>,
        host: Arc<dyn SourceHost>,
        client: Arc<dyn CompletionClient>,
    ) -> Result<Self> {
        let hub = ProgressHub::new(DEFAULT_CAPACITY);
        let filter = PathFilter::new(&config.generator)?;
        let generator = DocGenerator::new(client, &config.generator);
        let pipeline = Arc::new(DocPipeline::new(
            db.clone(),
            host,
            generator,
            hub.clone(),
            filter,
        ));

        Ok(Self {
            db,
            pipeline,
            hub,
            config: Arc::new(config),
        })
    }
}

/// Build the application router
pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/repos", get(api::list_repos).post(api::connect_repo))
        .route(
            "/repos/:id",
            get(api::get_repo).delete(api::disconnect_repo),
        )
        .route("/repos/:id/regenerate", post(api::regenerate))
        .route("/repos/:id/docs", get(api::list_docs))
        .route("/repos/:id/docs/*path", get(api::get_doc))
        .route("/events", get(sse::events))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_token,
        ));

    Router::new()
        .route("/health", get(health))
        .route(
            "/webhook",
            post(webhook::receive).layer(DefaultBodyLimit::max(WEBHOOK_BODY_LIMIT)),
        )
        .nest("/api", api)
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// Reject `/api` requests without the configured bearer token
async fn require_token(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> std::result::Result<Response, ApiError> {
    if let Some(expected) = state.config.server.api_token.as_deref() {
        let provided = request
            .headers()
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .unwrap_or_default();
        if ring::constant_time::verify_slices_are_equal(provided.as_bytes(), expected.as_bytes())
            .is_err()
        {
            return Err(Error::Unauthorized.into());
        }
    }
    Ok(next.run(request).await)
}

/// Serve until `shutdown` resolves
pub async fn serve(state: AppState, shutdown: impl Future<Output = ()> + Send + 'static) -> Result<()> {
    let bind = state.config.server.bind.clone();
    let listener = tokio::net::TcpListener::bind(&bind).await?;
    tracing::info!(addr = %listener.local_addr()?, "Listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}
