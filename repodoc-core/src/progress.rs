//! Progress fan-out for Server-Sent Events.
//!
//! Pipeline runs publish [`ProgressEvent`]s to a [`ProgressHub`]; every open
//! `/api/events` connection holds a receiver. Subscribers that fall behind
//! the channel capacity skip the events they missed.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;

use crate::types::{DocsStatus, Repository};

/// Default number of buffered events per subscriber
pub const DEFAULT_CAPACITY: usize = 256;

/// One status update for a repository
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressEvent {
    pub repo_id: i64,
    pub full_name: String,
    pub status: DocsStatus,
    pub progress: u8,
    pub message: Option<String>,
    pub at: DateTime<Utc>,
}

impl ProgressEvent {
    pub fn new(repo: &Repository, status: DocsStatus, progress: u8, message: Option<String>) -> Self {
        Self {
            repo_id: repo.id,
            full_name: repo.full_name.clone(),
            status,
            progress: progress.min(100),
            message,
            at: Utc::now(),
        }
    }
}

/// Process-wide publish/subscribe point
#[derive(Debug, Clone)]
pub struct ProgressHub {
    sender: broadcast::Sender<ProgressEvent>,
}

impl ProgressHub {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Send to all current subscribers. Having none is fine.
    pub fn publish(&self, event: ProgressEvent) {
        match self.sender.send(event) {
            Ok(receivers) => tracing::trace!(receivers, "Published progress event"),
            Err(_) => tracing::trace!("No progress subscribers"),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for ProgressHub {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
