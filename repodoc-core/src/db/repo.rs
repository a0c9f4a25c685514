//! Database repository layer
//!
//! Provides query and insert operations for all entity types.

use crate::error::{Error, Result};
use crate::types::*;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// Database handle with connection pooling (single connection for now)
pub struct Database {
    conn: Mutex<Connection>,
}

fn parse_ts(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation
    )
}

const REPOSITORY_COLUMNS: &str = "id, github_id, owner, name, full_name, default_branch, \
     webhook_id, docs_status, docs_progress, docs_message, merkle_root, last_commit_sha, \
     created_at, updated_at";

const DOCUMENTATION_COLUMNS: &str = "id, repo_id, file_path, content, content_hash, \
     chunk_hashes, version, model, source_commit, generated_at";

impl Database {
    /// Open or create a database at the given path
    pub fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;

        // Enable foreign keys and WAL mode for better concurrency
        conn.execute_batch(
            "
            PRAGMA foreign_keys = ON;
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA busy_timeout = 5000;
            ",
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute("PRAGMA foreign_keys = ON", [])?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Run migrations on this database
    pub fn migrate(&self) -> Result<()> {
        let conn = self.connection();
        super::schema::run_migrations(&conn)
    }

    /// Get the underlying connection (for advanced use)
    ///
    /// A panic while holding the lock leaves the connection usable, so poisoning is ignored.
    pub fn connection(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // ============================================
    // Repository operations
    // ============================================

    /// Start tracking a repository.
    ///
    /// Returns [`Error::Conflict`] if the repository is already tracked.
    pub fn insert_repository(&self, repo: &NewRepository) -> Result<Repository> {
        let full_name = repo.full_name();
        let now = Utc::now().to_rfc3339();
        let id = {
            let conn = self.connection();
            conn.execute(
                r#"
                INSERT INTO repositories
                    (github_id, owner, name, full_name, default_branch, created_at, updated_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
                "#,
                params![
                    repo.github_id,
                    repo.owner,
                    repo.name,
                    full_name,
                    repo.default_branch,
                    now,
                ],
            )
            .map_err(|e| {
                if is_constraint_violation(&e) {
                    Error::Conflict(format!("repository {} is already tracked", full_name))
                } else {
                    Error::from(e)
                }
            })?;
            conn.last_insert_rowid()
        };

        self.get_repository(id)?
            .ok_or_else(|| Error::RepoNotFound(full_name))
    }

    /// Get a repository by local ID
    pub fn get_repository(&self, id: i64) -> Result<Option<Repository>> {
        let conn = self.connection();
        conn.query_row(
            &format!("SELECT {REPOSITORY_COLUMNS} FROM repositories WHERE id = ?"),
            [id],
            Self::row_to_repository,
        )
        .optional()
        .map_err(Error::from)
    }

    /// Get a repository by `owner/name` (case-insensitive, as on GitHub)
    pub fn get_repository_by_full_name(&self, full_name: &str) -> Result<Option<Repository>> {
        let conn = self.connection();
        conn.query_row(
            &format!(
                "SELECT {REPOSITORY_COLUMNS} FROM repositories WHERE full_name = ? COLLATE NOCASE"
            ),
            [full_name],
            Self::row_to_repository,
        )
        .optional()
        .map_err(Error::from)
    }

    /// Get a repository by GitHub's numeric id (survives renames)
    pub fn get_repository_by_github_id(&self, github_id: i64) -> Result<Option<Repository>> {
        let conn = self.connection();
        conn.query_row(
            &format!("SELECT {REPOSITORY_COLUMNS} FROM repositories WHERE github_id = ?"),
            [github_id],
            Self::row_to_repository,
        )
        .optional()
        .map_err(Error::from)
    }

    /// List all tracked repositories ordered by name
    pub fn list_repositories(&self) -> Result<Vec<Repository>> {
        let conn = self.connection();
        let mut stmt = conn.prepare(&format!(
            "SELECT {REPOSITORY_COLUMNS} FROM repositories ORDER BY full_name COLLATE NOCASE"
        ))?;
        let repos = stmt
            .query_map([], Self::row_to_repository)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(repos)
    }

    /// Stop tracking a repository; its docs and snapshots are removed with it.
    ///
    /// Returns false if no such repository existed.
    pub fn delete_repository(&self, id: i64) -> Result<bool> {
        let conn = self.connection();
        let deleted = conn.execute("DELETE FROM repositories WHERE id = ?", [id])?;
        Ok(deleted > 0)
    }

    /// Record (or clear) the webhook registered for a repository
    pub fn set_webhook_id(&self, id: i64, webhook_id: Option<i64>) -> Result<()> {
        let conn = self.connection();
        conn.execute(
            "UPDATE repositories SET webhook_id = ?1, updated_at = ?2 WHERE id = ?3",
            params![webhook_id, Utc::now().to_rfc3339(), id],
        )?;
        Ok(())
    }

    /// Update the documentation status triple shown on the dashboard
    pub fn update_docs_status(
        &self,
        id: i64,
        status: DocsStatus,
        progress: u8,
        message: Option<&str>,
    ) -> Result<()> {
        let conn = self.connection();
        conn.execute(
            r#"
            UPDATE repositories
            SET docs_status = ?1, docs_progress = ?2, docs_message = ?3, updated_at = ?4
            WHERE id = ?5
            "#,
            params![
                status.as_str(),
                progress.min(100),
                message,
                Utc::now().to_rfc3339(),
                id
            ],
        )?;
        Ok(())
    }

    /// Store the Merkle root and, when known, the head commit of a finished run
    pub fn finish_run(
        &self,
        id: i64,
        merkle_root: Option<&str>,
        commit_sha: Option<&str>,
    ) -> Result<()> {
        let conn = self.connection();
        conn.execute(
            r#"
            UPDATE repositories
            SET merkle_root = ?1,
                last_commit_sha = COALESCE(?2, last_commit_sha),
                updated_at = ?3
            WHERE id = ?4
            "#,
            params![merkle_root, commit_sha, Utc::now().to_rfc3339(), id],
        )?;
        Ok(())
    }

    /// Mark runs interrupted by a crash or restart as failed.
    ///
    /// Returns the number of repositories reset.
    pub fn reset_stuck_repositories(&self) -> Result<usize> {
        let conn = self.connection();
        let reset = conn.execute(
            r#"
            UPDATE repositories
            SET docs_status = 'failed',
                docs_message = 'run interrupted before completion',
                updated_at = ?1
            WHERE docs_status IN ('pending', 'in_progress')
            "#,
            [Utc::now().to_rfc3339()],
        )?;
        Ok(reset)
    }

    fn row_to_repository(row: &Row) -> rusqlite::Result<Repository> {
        let status_str: String = row.get("docs_status")?;
        let progress: i64 = row.get("docs_progress")?;
        let created_at: String = row.get("created_at")?;
        let updated_at: String = row.get("updated_at")?;

        Ok(Repository {
            id: row.get("id")?,
            github_id: row.get("github_id")?,
            owner: row.get("owner")?,
            name: row.get("name")?,
            full_name: row.get("full_name")?,
            default_branch: row.get("default_branch")?,
            webhook_id: row.get("webhook_id")?,
            docs_status: status_str.parse().unwrap_or_default(),
            docs_progress: progress.clamp(0, 100) as u8,
            docs_message: row.get("docs_message")?,
            merkle_root: row.get("merkle_root")?,
            last_commit_sha: row.get("last_commit_sha")?,
            created_at: parse_ts(&created_at),
            updated_at: parse_ts(&updated_at),
        })
    }

    // ============================================
    // Documentation operations
    // ============================================

    /// Insert documentation for a file, or replace it and bump its version
    pub fn upsert_documentation(&self, doc: &NewDocumentation<'_>) -> Result<RepoDocumentation> {
        {
            let conn = self.connection();
            conn.execute(
                r#"
                INSERT INTO repo_documentation
                    (repo_id, file_path, content, content_hash, chunk_hashes, version,
                     model, source_commit, generated_at)
                VALUES (?1, ?2, ?3, ?4, ?5, 1, ?6, ?7, ?8)
                ON CONFLICT(repo_id, file_path) DO UPDATE SET
                    content = excluded.content,
                    content_hash = excluded.content_hash,
                    chunk_hashes = excluded.chunk_hashes,
                    version = repo_documentation.version + 1,
                    model = excluded.model,
                    source_commit = excluded.source_commit,
                    generated_at = excluded.generated_at
                "#,
                params![
                    doc.repo_id,
                    doc.file_path,
                    doc.content,
                    doc.content_hash,
                    serde_json::to_string(doc.chunk_hashes)?,
                    doc.model,
                    doc.source_commit,
                    Utc::now().to_rfc3339(),
                ],
            )?;
        }

        self.get_documentation(doc.repo_id, doc.file_path)?
            .ok_or_else(|| Error::DocNotFound(doc.file_path.to_string()))
    }

    /// Get documentation for one file
    pub fn get_documentation(
        &self,
        repo_id: i64,
        file_path: &str,
    ) -> Result<Option<RepoDocumentation>> {
        let conn = self.connection();
        conn.query_row(
            &format!(
                "SELECT {DOCUMENTATION_COLUMNS} FROM repo_documentation \
                 WHERE repo_id = ?1 AND file_path = ?2"
            ),
            params![repo_id, file_path],
            Self::row_to_documentation,
        )
        .optional()
        .map_err(Error::from)
    }

    /// List documentation for a repository ordered by path
    pub fn list_documentation(&self, repo_id: i64) -> Result<Vec<RepoDocumentation>> {
        let conn = self.connection();
        let mut stmt = conn.prepare(&format!(
            "SELECT {DOCUMENTATION_COLUMNS} FROM repo_documentation \
             WHERE repo_id = ? ORDER BY file_path"
        ))?;
        let docs = stmt
            .query_map([repo_id], Self::row_to_documentation)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(docs)
    }

    /// Delete documentation for one file. Returns false if none existed.
    pub fn delete_documentation(&self, repo_id: i64, file_path: &str) -> Result<bool> {
        let conn = self.connection();
        let deleted = conn.execute(
            "DELETE FROM repo_documentation WHERE repo_id = ?1 AND file_path = ?2",
            params![repo_id, file_path],
        )?;
        Ok(deleted > 0)
    }

    /// `(file_path, content_hash)` pairs used as Merkle leaves
    pub fn documentation_leaves(&self, repo_id: i64) -> Result<Vec<(String, String)>> {
        let conn = self.connection();
        let mut stmt = conn.prepare(
            "SELECT file_path, content_hash FROM repo_documentation \
             WHERE repo_id = ? ORDER BY file_path",
        )?;
        let leaves = stmt
            .query_map([repo_id], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(leaves)
    }

    fn row_to_documentation(row: &Row) -> rusqlite::Result<RepoDocumentation> {
        let chunk_hashes: String = row.get("chunk_hashes")?;
        let generated_at: String = row.get("generated_at")?;

        Ok(RepoDocumentation {
            id: row.get("id")?,
            repo_id: row.get("repo_id")?,
            file_path: row.get("file_path")?,
            content: row.get("content")?,
            content_hash: row.get("content_hash")?,
            chunk_hashes: serde_json::from_str(&chunk_hashes).unwrap_or_default(),
            version: row.get("version")?,
            model: row.get("model")?,
            source_commit: row.get("source_commit")?,
            generated_at: parse_ts(&generated_at),
        })
    }

    // ============================================
    // Content snapshot operations
    // ============================================

    /// Store the latest snapshot of a source file
    pub fn upsert_content(
        &self,
        repo_id: i64,
        file_path: &str,
        commit_sha: &str,
        blob_sha: Option<&str>,
        content: &str,
        content_hash: &str,
    ) -> Result<()> {
        let conn = self.connection();
        conn.execute(
            r#"
            INSERT INTO repo_contents
                (repo_id, file_path, commit_sha, blob_sha, content, content_hash,
                 size_bytes, fetched_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ON CONFLICT(repo_id, file_path) DO UPDATE SET
                commit_sha = excluded.commit_sha,
                blob_sha = excluded.blob_sha,
                content = excluded.content,
                content_hash = excluded.content_hash,
                size_bytes = excluded.size_bytes,
                fetched_at = excluded.fetched_at
            "#,
            params![
                repo_id,
                file_path,
                commit_sha,
                blob_sha,
                content,
                content_hash,
                content.len() as i64,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Get the latest snapshot of a source file
    pub fn get_content(&self, repo_id: i64, file_path: &str) -> Result<Option<RepoContent>> {
        let conn = self.connection();
        conn.query_row(
            r#"
            SELECT id, repo_id, file_path, commit_sha, blob_sha, content, content_hash,
                   size_bytes, fetched_at
            FROM repo_contents WHERE repo_id = ?1 AND file_path = ?2
            "#,
            params![repo_id, file_path],
            |row| {
                let fetched_at: String = row.get("fetched_at")?;
                Ok(RepoContent {
                    id: row.get("id")?,
                    repo_id: row.get("repo_id")?,
                    file_path: row.get("file_path")?,
                    commit_sha: row.get("commit_sha")?,
                    blob_sha: row.get("blob_sha")?,
                    content: row.get("content")?,
                    content_hash: row.get("content_hash")?,
                    size_bytes: row.get("size_bytes")?,
                    fetched_at: parse_ts(&fetched_at),
                })
            },
        )
        .optional()
        .map_err(Error::from)
    }

    /// Delete the snapshot of a source file. Returns false if none existed.
    pub fn delete_content(&self, repo_id: i64, file_path: &str) -> Result<bool> {
        let conn = self.connection();
        let deleted = conn.execute(
            "DELETE FROM repo_contents WHERE repo_id = ?1 AND file_path = ?2",
            params![repo_id, file_path],
        )?;
        Ok(deleted > 0)
    }

    // ============================================
    // Webhook deliveries
    // ============================================

    /// Record a webhook delivery.
    ///
    /// Returns false when the delivery id was already seen (GitHub redelivery).
    pub fn record_delivery(
        &self,
        delivery_id: &str,
        event: &str,
        repo_full_name: Option<&str>,
    ) -> Result<bool> {
        let conn = self.connection();
        let inserted = conn.execute(
            r#"
            INSERT OR IGNORE INTO webhook_deliveries (delivery_id, event, repo_full_name, received_at)
            VALUES (?1, ?2, ?3, ?4)
            "#,
            params![delivery_id, event, repo_full_name, Utc::now().to_rfc3339()],
        )?;
        Ok(inserted == 1)
    }

    /// Forget one delivery so a redelivery of it is processed again.
    pub fn forget_delivery(&self, delivery_id: &str) -> Result<bool> {
        let conn = self.connection();
        let removed = conn.execute(
            "DELETE FROM webhook_deliveries WHERE delivery_id = ?",
            [delivery_id],
        )?;
        Ok(removed == 1)
    }

    /// Forget deliveries received before `cutoff`. Returns the number removed.
    pub fn prune_deliveries(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let conn = self.connection();
        let removed = conn.execute(
            "DELETE FROM webhook_deliveries WHERE received_at < ?",
            [cutoff.to_rfc3339()],
        )?;
        Ok(removed)
    }
}
