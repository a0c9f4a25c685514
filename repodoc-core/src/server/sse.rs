//! `GET /api/events`: progress as Server-Sent Events

use std::convert::Infallible;

use axum::extract::{Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::Stream;
use serde::Deserialize;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;

use crate::progress::ProgressEvent;

use super::AppState;

/// SSE event name carrying a [`ProgressEvent`]
pub const PROGRESS_EVENT: &str = "progress";

#[derive(Debug, Default, Deserialize)]
pub struct EventsQuery {
    /// Only stream events for this repository
    pub repo_id: Option<i64>,
}

fn to_sse(event: &ProgressEvent) -> Option<Result<Event, Infallible>> {
    match Event::default().event(PROGRESS_EVENT).json_data(event) {
        Ok(sse) => Some(Ok(sse)),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to encode progress event");
            None
        }
    }
}

/// Current status of the selected repositories, sent when a client connects
fn snapshot(state: &AppState, repo_id: Option<i64>) -> Vec<ProgressEvent> {
    let repos = match state.db.list_repositories() {
        Ok(repos) => repos,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to load repositories for SSE snapshot");
            return Vec::new();
        }
    };
    repos
        .into_iter()
        .filter(|repo| repo_id.map_or(true, |id| id == repo.id))
        .map(|repo| ProgressEvent {
            repo_id: repo.id,
            full_name: repo.full_name,
            status: repo.docs_status,
            progress: repo.docs_progress,
            message: repo.docs_message,
            at: repo.updated_at,
        })
        .collect()
}

pub async fn events(
    State(state): State<AppState>,
    Query(query): Query<EventsQuery>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let repo_id = query.repo_id;
    // Subscribe before the snapshot so nothing published in between is lost
    let receiver = state.hub.subscribe();
    let initial = snapshot(&state, repo_id);
    tracing::debug!(
        repo_id,
        subscribers = state.hub.subscriber_count(),
        "SSE client connected"
    );

    let live = BroadcastStream::new(receiver).filter_map(move |item| match item {
        Ok(event) if repo_id.map_or(true, |id| id == event.repo_id) => to_sse(&event),
        Ok(_) => None,
        Err(BroadcastStreamRecvError::Lagged(missed)) => {
            tracing::debug!(missed, "SSE client lagged, skipping events");
            None
        }
    });

    let stream = tokio_stream::iter(initial)
        .filter_map(|event| to_sse(&event))
        .chain(live);

    Sse::new(stream).keep_alive(KeepAlive::default())
}
