//! `POST /webhook`

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde_json::{json, Value};

use crate::error::Error;
use crate::webhook::{
    verify_signature, PushEvent, WebhookEvent, DELIVERY_HEADER, EVENT_HEADER, SIGNATURE_HEADER,
};

use super::error::ApiError;
use super::AppState;

type WebhookResponse = Result<(StatusCode, Json<Value>), ApiError>;

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn reply(status: StatusCode, body: Value) -> WebhookResponse {
    Ok((status, Json(body)))
}

/// Verify, de-duplicate, and queue a documentation run for a push.
pub async fn receive(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> WebhookResponse {
    let secret = state
        .config
        .github
        .webhook_secret
        .as_deref()
        .ok_or_else(|| Error::Signature("no webhook secret configured".to_string()))?;
    verify_signature(secret, &body, header(&headers, SIGNATURE_HEADER))?;

    // Any event must at least be JSON
    serde_json::from_slice::<Value>(&body).map_err(Error::from)?;

    let event = WebhookEvent::from_header(header(&headers, EVENT_HEADER).unwrap_or_default());
    let delivery = header(&headers, DELIVERY_HEADER);

    match event {
        WebhookEvent::Ping => {
            tracing::info!(delivery, "Webhook ping");
            return reply(StatusCode::OK, json!({ "status": "pong" }));
        }
        WebhookEvent::Other(ref name) => {
            tracing::debug!(event = %name, delivery, "Ignoring webhook event");
            return reply(
                StatusCode::ACCEPTED,
                json!({ "status": "ignored", "reason": format!("event {} not handled", name) }),
            );
        }
        WebhookEvent::Push => {}
    }

    let push = PushEvent::from_slice(&body)?;
    let full_name = push.repository.full_name.clone();

    let repo = match state.db.get_repository_by_github_id(push.repository.id)? {
        Some(repo) => repo,
        None => state
            .db
            .get_repository_by_full_name(&full_name)?
            .ok_or_else(|| Error::RepoNotFound(full_name.clone()))?,
    };

    if push.deleted {
        return reply(
            StatusCode::ACCEPTED,
            json!({ "status": "ignored", "reason": "branch deleted" }),
        );
    }
    if !push.targets_branch(&repo.default_branch) {
        tracing::debug!(
            repo = %repo.full_name,
            git_ref = %push.git_ref,
            "Push to non-default branch"
        );
        return reply(
            StatusCode::ACCEPTED,
            json!({ "status": "ignored", "reason": "not the default branch" }),
        );
    }

    // Recorded only once accepted, so a rejected delivery can be redelivered
    if let Some(delivery_id) = delivery {
        let first_time = state
            .db
            .record_delivery(delivery_id, event.as_str(), Some(&full_name))?;
        if !first_time {
            tracing::info!(delivery = delivery_id, repo = %full_name, "Duplicate webhook delivery");
            return reply(StatusCode::OK, json!({ "status": "duplicate" }));
        }
    }

    if let Err(e) = state.pipeline.mark_pending(
        &repo,
        &format!("Queued push {}", short_sha(&push.after)),
    ) {
        if let Some(delivery_id) = delivery {
            if let Err(forget) = state.db.forget_delivery(delivery_id) {
                tracing::warn!(delivery = delivery_id, error = %forget, "Failed to forget delivery");
            }
        }
        return Err(e.into());
    }

    tracing::info!(
        repo = %repo.full_name,
        after = %push.after,
        commits = push.commits.len(),
        delivery,
        "Push accepted"
    );

    let repo_id = repo.id;
    let pipeline = state.pipeline.clone();
    tokio::spawn(async move {
        if let Err(e) = pipeline.process_push(&repo, &push).await {
            tracing::error!(repo = %repo.full_name, error = %e, "Push run failed");
        }
    });

    reply(
        StatusCode::ACCEPTED,
        json!({ "status": "accepted", "repo_id": repo_id }),
    )
}

fn short_sha(sha: &str) -> &str {
    sha.get(..7).unwrap_or(sha)
}
