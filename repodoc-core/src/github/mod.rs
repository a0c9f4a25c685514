//! Source hosting access
//!
//! The pipeline talks to GitHub through the [`SourceHost`] trait so tests can
//! substitute an in-memory host. [`GitHubClient`] is the REST implementation.
//!
//! ## Usage
//!
//! Configure a token in `~/.config/repodoc/config.toml` (or `GITHUB_TOKEN`):
//!
//! ```toml
//! [github]
//! token = "ghp_xxxxxxxxxxxx"
//! webhook_secret = "a long random string"
//! ```

mod client;

pub use client::GitHubClient;

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::Result;

/// Repository metadata as reported by GitHub
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct RemoteRepository {
    pub id: i64,
    pub name: String,
    pub full_name: String,
    pub owner: RemoteOwner,
    pub default_branch: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct RemoteOwner {
    pub login: String,
}

/// How a commit touched a file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    Added,
    Modified,
    Removed,
    Renamed,
    Copied,
    Changed,
    Unchanged,
}

/// One entry of a commit's `files` list
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct CommitFile {
    pub filename: String,
    pub status: FileStatus,
    #[serde(default)]
    pub previous_filename: Option<String>,
}

impl CommitFile {
    pub fn new(filename: &str, status: FileStatus) -> Self {
        Self {
            filename: filename.to_string(),
            status,
            previous_filename: None,
        }
    }

    pub fn renamed(from: &str, to: &str) -> Self {
        Self {
            filename: to.to_string(),
            status: FileStatus::Renamed,
            previous_filename: Some(from.to_string()),
        }
    }
}

/// Decoded text content of a file at a ref
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteFile {
    pub path: String,
    /// Git blob SHA
    pub sha: String,
    pub size: u64,
    pub content: String,
}

/// A blob from a recursive tree listing
#[derive(Debug, Clone, PartialEq)]
pub struct TreeEntry {
    pub path: String,
    pub sha: String,
    pub size: u64,
}

/// Operations the documentation pipeline needs from a source host.
#[async_trait]
pub trait SourceHost: Send + Sync {
    /// Look up a repository by `owner/name`
    async fn repository(&self, full_name: &str) -> Result<RemoteRepository>;

    /// Files changed by one commit
    async fn commit_files(&self, full_name: &str, sha: &str) -> Result<Vec<CommitFile>>;

    /// File text at a ref.
    ///
    /// Returns `Ok(None)` when the file does not exist at that ref or is not UTF-8 text.
    async fn file_content(
        &self,
        full_name: &str,
        path: &str,
        git_ref: &str,
    ) -> Result<Option<RemoteFile>>;

    /// All blobs reachable from a ref
    async fn tree(&self, full_name: &str, git_ref: &str) -> Result<Vec<TreeEntry>>;

    /// Register a push webhook; returns the hook id
    async fn create_webhook(&self, full_name: &str, url: &str, secret: &str) -> Result<i64>;

    /// Remove a webhook. Missing hooks are not an error.
    async fn delete_webhook(&self, full_name: &str, hook_id: i64) -> Result<()>;
}
