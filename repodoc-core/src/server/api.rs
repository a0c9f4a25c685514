//! `/api/repos` handlers

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::Error;
use crate::types::{RepoDocumentation, Repository};

use super::error::ApiError;
use super::AppState;

type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Deserialize)]
pub struct ConnectRequest {
    pub full_name: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct RegenerateQuery {
    #[serde(default)]
    pub force: bool,
}

/// Doc listing entry; content is fetched per path
#[derive(Debug, Serialize)]
pub struct DocSummary {
    pub file_path: String,
    pub version: i64,
    pub content_hash: String,
    pub model: Option<String>,
    pub source_commit: Option<String>,
    pub generated_at: DateTime<Utc>,
}

impl From<RepoDocumentation> for DocSummary {
    fn from(doc: RepoDocumentation) -> Self {
        Self {
            file_path: doc.file_path,
            version: doc.version,
            content_hash: doc.content_hash,
            model: doc.model,
            source_commit: doc.source_commit,
            generated_at: doc.generated_at,
        }
    }
}

fn load_repo(state: &AppState, id: i64) -> Result<Repository, Error> {
    state
        .db
        .get_repository(id)?
        .ok_or_else(|| Error::RepoNotFound(id.to_string()))
}

/// Queue a full regeneration on a background task
fn spawn_regeneration(state: &AppState, repo: Repository, force: bool) -> Result<(), Error> {
    let message = if force {
        "Queued forced regeneration"
    } else {
        "Queued regeneration"
    };
    state.pipeline.mark_pending(&repo, message)?;

    let pipeline = state.pipeline.clone();
    tokio::spawn(async move {
        if let Err(e) = pipeline.regenerate_all(&repo, force).await {
            tracing::error!(repo = %repo.full_name, error = %e, "Regeneration failed");
        }
    });
    Ok(())
}

pub async fn list_repos(State(state): State<AppState>) -> ApiResult<Json<Vec<Repository>>> {
    Ok(Json(state.db.list_repositories()?))
}

/// Start tracking a repository, register its webhook, and document it.
pub async fn connect_repo(
    State(state): State<AppState>,
    body: Bytes,
) -> ApiResult<(StatusCode, Json<Repository>)> {
    let request: ConnectRequest = serde_json::from_slice(&body).map_err(Error::from)?;
    let webhook_url = state.config.server.webhook_url();
    let webhook = webhook_url
        .as_deref()
        .zip(state.config.github.webhook_secret.as_deref());

    let repo = state
        .pipeline
        .connect(request.full_name.trim(), webhook)
        .await?;

    let id = repo.id;
    spawn_regeneration(&state, repo, false)?;

    Ok((StatusCode::CREATED, Json(load_repo(&state, id)?)))
}

pub async fn get_repo(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Repository>> {
    Ok(Json(load_repo(&state, id)?))
}

/// Stop tracking a repository. Webhook removal is best effort.
pub async fn disconnect_repo(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<StatusCode> {
    let repo = load_repo(&state, id)?;
    state.pipeline.disconnect(&repo).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn regenerate(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Query(query): Query<RegenerateQuery>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let force = query.force;
    let repo = load_repo(&state, id)?;
    spawn_regeneration(&state, repo, force)?;
    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "status": "accepted", "repo_id": id, "force": force })),
    ))
}

pub async fn list_docs(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Vec<DocSummary>>> {
    let repo = load_repo(&state, id)?;
    let docs = state.db.list_documentation(repo.id)?;
    Ok(Json(docs.into_iter().map(DocSummary::from).collect()))
}

pub async fn get_doc(
    State(state): State<AppState>,
    Path((id, path)): Path<(i64, String)>,
) -> ApiResult<Json<RepoDocumentation>> {
    let repo = load_repo(&state, id)?;
    let path = path.trim_start_matches('/');
    let doc = state
        .db
        .get_documentation(repo.id, path)?
        .ok_or_else(|| Error::DocNotFound(path.to_string()))?;
    Ok(Json(doc))
}
