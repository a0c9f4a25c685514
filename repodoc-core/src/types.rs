//! Core domain types for repodoc
//!
//! These types mirror the relational schema:
//!
//! | Term | Definition |
//! |------|------------|
//! | **Repository** | A GitHub repository tracked for documentation |
//! | **RepoDocumentation** | Generated Markdown for one source file of a repository |
//! | **RepoContent** | Raw snapshot of a source file as last fetched from GitHub |
//! | **DocsStatus** | Where a repository is in its regeneration lifecycle |

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================
// Repository
// ============================================

/// Documentation lifecycle state of a repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DocsStatus {
    /// Never generated
    #[default]
    Idle,
    /// Run queued (webhook accepted, waiting for the repository lock)
    Pending,
    /// Run executing
    InProgress,
    /// Last run finished
    Completed,
    /// Last run aborted
    Failed,
}

impl DocsStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocsStatus::Idle => "idle",
            DocsStatus::Pending => "pending",
            DocsStatus::InProgress => "in_progress",
            DocsStatus::Completed => "completed",
            DocsStatus::Failed => "failed",
        }
    }

    /// Whether a run is queued or executing
    pub fn is_active(&self) -> bool {
        matches!(self, DocsStatus::Pending | DocsStatus::InProgress)
    }
}

impl std::str::FromStr for DocsStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "idle" => Ok(DocsStatus::Idle),
            "pending" => Ok(DocsStatus::Pending),
            "in_progress" => Ok(DocsStatus::InProgress),
            "completed" => Ok(DocsStatus::Completed),
            "failed" => Ok(DocsStatus::Failed),
            _ => Err(format!("unknown docs status: {}", s)),
        }
    }
}

impl std::fmt::Display for DocsStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A tracked GitHub repository.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Repository {
    /// Local identifier
    pub id: i64,
    /// GitHub's numeric repository id
    pub github_id: Option<i64>,
    /// Owner login
    pub owner: String,
    /// Repository name
    pub name: String,
    /// `owner/name`
    pub full_name: String,
    /// Branch whose pushes trigger regeneration
    pub default_branch: String,
    /// Webhook registered by us, if any
    pub webhook_id: Option<i64>,
    /// Current lifecycle state
    pub docs_status: DocsStatus,
    /// Run progress, 0..=100
    pub docs_progress: u8,
    /// Last human-readable status message
    pub docs_message: Option<String>,
    /// Merkle root over the documentation set
    pub merkle_root: Option<String>,
    /// Head commit of the last completed run
    pub last_commit_sha: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields needed to start tracking a repository.
#[derive(Debug, Clone)]
pub struct NewRepository {
    pub github_id: Option<i64>,
    pub owner: String,
    pub name: String,
    pub default_branch: String,
}

impl NewRepository {
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}

/// Split `owner/name` into its parts.
///
/// Returns `None` unless there is exactly one slash with text on both sides.
pub fn split_full_name(full_name: &str) -> Option<(&str, &str)> {
    let (owner, name) = full_name.split_once('/')?;
    if owner.is_empty() || name.is_empty() || name.contains('/') {
        return None;
    }
    Some((owner, name))
}

// ============================================
// Documentation and content snapshots
// ============================================

/// Generated documentation for one file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RepoDocumentation {
    pub id: i64,
    pub repo_id: i64,
    /// Source path within the repository
    pub file_path: String,
    /// Markdown body
    pub content: String,
    /// SHA-256 hex of the source text the doc was generated from
    pub content_hash: String,
    /// SHA-256 hex of each source chunk, in order
    pub chunk_hashes: Vec<String>,
    /// Starts at 1, incremented on every regeneration
    pub version: i64,
    /// Model that produced the doc
    pub model: Option<String>,
    /// Commit the source was read at
    pub source_commit: Option<String>,
    pub generated_at: DateTime<Utc>,
}

/// Documentation ready to be written; the database assigns id and version.
#[derive(Debug, Clone)]
pub struct NewDocumentation<'a> {
    pub repo_id: i64,
    pub file_path: &'a str,
    pub content: &'a str,
    pub content_hash: &'a str,
    pub chunk_hashes: &'a [String],
    pub model: Option<&'a str>,
    pub source_commit: Option<&'a str>,
}

/// Raw file snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RepoContent {
    pub id: i64,
    pub repo_id: i64,
    pub file_path: String,
    pub commit_sha: String,
    /// Git blob SHA reported by GitHub
    pub blob_sha: Option<String>,
    pub content: String,
    pub content_hash: String,
    pub size_bytes: i64,
    pub fetched_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn docs_status_round_trips_through_str() {
        for status in [
            DocsStatus::Idle,
            DocsStatus::Pending,
            DocsStatus::InProgress,
            DocsStatus::Completed,
            DocsStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<DocsStatus>(), Ok(status));
        }
        assert!("running".parse::<DocsStatus>().is_err());
    }

    #[test]
    fn docs_status_serializes_snake_case() {
        let json = serde_json::to_string(&DocsStatus::InProgress).unwrap();
        assert_eq!(json, "\"in_progress\"");
    }

    #[test]
    fn split_full_name_requires_owner_and_name() {
        assert_eq!(split_full_name("octo/repo"), Some(("octo", "repo")));
        assert_eq!(split_full_name("octo"), None);
        assert_eq!(split_full_name("/repo"), None);
        assert_eq!(split_full_name("octo/"), None);
        assert_eq!(split_full_name("a/b/c"), None);
    }
}
