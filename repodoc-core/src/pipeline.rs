//! Documentation pipeline
//!
//! Ties the source host, generator, database and progress hub together.
//! A run walks a [`ChangeSet`] in path order: removed files lose their docs,
//! everything else is fetched, snapshotted and (re)documented unless its
//! content hash is unchanged. Runs on one repository are serialized; runs on
//! different repositories may overlap.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use serde::Serialize;

use crate::db::Database;
use crate::detect::{ChangeKind, ChangeSet, PathFilter};
use crate::docgen::{content_hash, is_binary, needs_regeneration, DocGenerator};
use crate::error::{Error, Result};
use crate::github::SourceHost;
use crate::merkle::merkle_root;
use crate::progress::{ProgressEvent, ProgressHub};
use crate::types::{split_full_name, DocsStatus, NewDocumentation, NewRepository, Repository};
use crate::webhook::PushEvent;

/// Outcome of one pipeline run
#[derive(Debug, Default, Clone, Serialize, PartialEq)]
pub struct RunSummary {
    /// Files sent to the LLM and stored
    pub documented: usize,
    /// Files whose content hash matched the stored doc
    pub unchanged: usize,
    /// Docs deleted because the file was removed
    pub removed: usize,
    /// Files excluded by pattern, size, or content type
    pub skipped: usize,
    /// Per-file errors (path, message)
    pub failures: Vec<(String, String)>,
}

impl RunSummary {
    /// One-line status message for the dashboard
    pub fn message(&self) -> String {
        let mut msg = format!(
            "{} documented, {} unchanged, {} removed, {} skipped",
            self.documented, self.unchanged, self.removed, self.skipped
        );
        if !self.failures.is_empty() {
            msg.push_str(&format!(", {} failed", self.failures.len()));
        }
        msg
    }
}

enum FileOutcome {
    Documented,
    Unchanged,
    Removed,
    Skipped(&'static str),
}

/// Per-repository run locks
#[derive(Default)]
struct RepoLocks {
    locks: Mutex<HashMap<i64, Arc<tokio::sync::Mutex<()>>>>,
}

impl RepoLocks {
    fn get(&self, repo_id: i64) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|p| p.into_inner());
        locks.entry(repo_id).or_default().clone()
    }

    fn remove(&self, repo_id: i64) {
        let mut locks = self.locks.lock().unwrap_or_else(|p| p.into_inner());
        locks.remove(&repo_id);
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.locks.lock().unwrap_or_else(|p| p.into_inner()).len()
    }
}

/// Runs documentation updates for tracked repositories.
pub struct DocPipeline {
    db: Arc<Database>,
    host: Arc<dyn SourceHost>,
    generator: DocGenerator,
    hub: ProgressHub,
    filter: PathFilter,
    locks: RepoLocks,
}

impl DocPipeline {
    pub fn new(
        db: Arc<Database>,
        host: Arc<dyn SourceHost>,
        generator: DocGenerator,
        hub: ProgressHub,
        filter: PathFilter,
    ) -> Self {
        Self {
            db,
            host,
            generator,
            hub,
            filter,
            locks: RepoLocks::default(),
        }
    }

    /// Mark a run as queued. Called before the run task is spawned so the
    /// status is visible while the task waits for the repository lock.
    pub fn mark_pending(&self, repo: &Repository, message: &str) -> Result<()> {
        self.set_status(repo, DocsStatus::Pending, 0, Some(message.to_string()))
    }

    /// Update docs for the files touched by a push.
    ///
    /// Each commit's file list is fetched in order. When a fetch fails the
    /// lists embedded in the payload are used for that commit instead.
    pub async fn process_push(&self, repo: &Repository, push: &PushEvent) -> Result<RunSummary> {
        let lock = self.locks.get(repo.id);
        let _guard = lock.lock().await;
        let repo = self.reload(repo)?;

        self.set_status(
            &repo,
            DocsStatus::InProgress,
            0,
            Some(format!("Detecting changes in {} commits", push.commits.len())),
        )?;

        let mut changes = ChangeSet::default();
        for commit in &push.commits {
            match self.host.commit_files(&repo.full_name, &commit.id).await {
                Ok(files) => {
                    for file in &files {
                        changes.apply_commit_file(file);
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        repo = %repo.full_name,
                        commit = %commit.id,
                        error = %e,
                        "Commit fetch failed, using payload file lists"
                    );
                    changes.apply_payload_commit(commit);
                }
            }
        }

        tracing::info!(
            repo = %repo.full_name,
            after = %push.after,
            files = changes.len(),
            "Processing push"
        );

        self.run_and_finish(&repo, &changes, &push.after, Some(&push.after), false)
            .await
    }

    /// Document every file on the default branch.
    ///
    /// With `force`, content hashes are ignored and every file is regenerated.
    /// Docs for files no longer in the tree are removed.
    pub async fn regenerate_all(&self, repo: &Repository, force: bool) -> Result<RunSummary> {
        let lock = self.locks.get(repo.id);
        let _guard = lock.lock().await;
        let repo = self.reload(repo)?;

        self.set_status(
            &repo,
            DocsStatus::InProgress,
            0,
            Some(format!("Listing files on {}", repo.default_branch)),
        )?;

        let tree = match self.host.tree(&repo.full_name, &repo.default_branch).await {
            Ok(tree) => tree,
            Err(e) => return Err(self.fail(&repo, e)),
        };

        let mut changes = ChangeSet::full(&tree);
        let in_tree: HashSet<&str> = tree.iter().map(|entry| entry.path.as_str()).collect();
        let documented = match self.db.list_documentation(repo.id) {
            Ok(docs) => docs,
            Err(e) => return Err(self.fail(&repo, e)),
        };
        for doc in documented {
            if !in_tree.contains(doc.file_path.as_str()) {
                changes.mark_removed(&doc.file_path);
            }
        }

        tracing::info!(
            repo = %repo.full_name,
            branch = %repo.default_branch,
            files = changes.len(),
            force,
            "Regenerating documentation"
        );

        self.run_and_finish(&repo, &changes, &repo.default_branch, None, force)
            .await
    }

    /// Start tracking `owner/name`.
    ///
    /// When `webhook` (`url`, `secret`) is given a push hook is registered;
    /// a registration failure is logged and the repository stays tracked.
    pub async fn connect(
        &self,
        full_name: &str,
        webhook: Option<(&str, &str)>,
    ) -> Result<Repository> {
        if split_full_name(full_name).is_none() {
            return Err(Error::InvalidRequest(format!(
                "expected owner/name, got {:?}",
                full_name
            )));
        }
        if self.db.get_repository_by_full_name(full_name)?.is_some() {
            return Err(Error::Conflict(format!("{} is already tracked", full_name)));
        }

        let remote = match self.host.repository(full_name).await {
            Ok(remote) => remote,
            Err(Error::GitHub {
                status: Some(404), ..
            }) => return Err(Error::RepoNotFound(full_name.to_string())),
            Err(e) => return Err(e),
        };

        let repo = self.db.insert_repository(&NewRepository {
            github_id: Some(remote.id),
            owner: remote.owner.login,
            name: remote.name,
            default_branch: remote.default_branch,
        })?;
        tracing::info!(repo = %repo.full_name, id = repo.id, "Connected repository");

        if let Some((url, secret)) = webhook {
            match self.host.create_webhook(&repo.full_name, url, secret).await {
                Ok(hook_id) => {
                    self.db.set_webhook_id(repo.id, Some(hook_id))?;
                    tracing::info!(repo = %repo.full_name, hook_id, "Registered webhook");
                }
                Err(e) => {
                    tracing::warn!(repo = %repo.full_name, error = %e, "Webhook registration failed");
                }
            }
        }

        self.reload(&repo)
    }

    /// Stop tracking a repository; its docs and snapshots go with it.
    /// Webhook removal is best effort.
    pub async fn disconnect(&self, repo: &Repository) -> Result<()> {
        if let Some(hook_id) = repo.webhook_id {
            if let Err(e) = self.host.delete_webhook(&repo.full_name, hook_id).await {
                tracing::warn!(repo = %repo.full_name, hook_id, error = %e, "Webhook removal failed");
            }
        }

        if !self.db.delete_repository(repo.id)? {
            return Err(Error::RepoNotFound(repo.full_name.clone()));
        }
        self.locks.remove(repo.id);
        tracing::info!(repo = %repo.full_name, "Disconnected repository");
        Ok(())
    }

    async fn run_and_finish(
        &self,
        repo: &Repository,
        changes: &ChangeSet,
        git_ref: &str,
        commit: Option<&str>,
        force: bool,
    ) -> Result<RunSummary> {
        let summary = match self.run(repo, changes, git_ref, commit, force).await {
            Ok(summary) => summary,
            Err(e) => return Err(self.fail(repo, e)),
        };

        let finished = self
            .db
            .documentation_leaves(repo.id)
            .and_then(|leaves| {
                let root = merkle_root(&leaves);
                self.db.finish_run(repo.id, root.as_deref(), commit)
            })
            .and_then(|_| {
                self.set_status(repo, DocsStatus::Completed, 100, Some(summary.message()))
            });
        if let Err(e) = finished {
            return Err(self.fail(repo, e));
        }

        tracing::info!(
            repo = %repo.full_name,
            documented = summary.documented,
            unchanged = summary.unchanged,
            removed = summary.removed,
            skipped = summary.skipped,
            failed = summary.failures.len(),
            "Run completed"
        );
        Ok(summary)
    }

    async fn run(
        &self,
        repo: &Repository,
        changes: &ChangeSet,
        git_ref: &str,
        commit: Option<&str>,
        force: bool,
    ) -> Result<RunSummary> {
        let mut summary = RunSummary::default();
        let total = changes.len();

        for (index, change) in changes.iter().enumerate() {
            let result = match change.kind {
                ChangeKind::Removed => self.remove_file(repo, &change.path),
                ChangeKind::Added | ChangeKind::Modified => {
                    self.document_file(repo, &change.path, git_ref, commit, force)
                        .await
                }
            };

            match result {
                Ok(FileOutcome::Documented) => summary.documented += 1,
                Ok(FileOutcome::Unchanged) => summary.unchanged += 1,
                Ok(FileOutcome::Removed) => summary.removed += 1,
                Ok(FileOutcome::Skipped(reason)) => {
                    tracing::debug!(path = %change.path, reason, "Skipped file");
                    summary.skipped += 1;
                }
                Err(e) => {
                    tracing::warn!(
                        repo = %repo.full_name,
                        path = %change.path,
                        error = %e,
                        "Failed to document file"
                    );
                    summary.failures.push((change.path.clone(), e.to_string()));
                }
            }

            // 100 is reserved for the completed state
            let progress = ((index + 1) * 100 / total).min(99) as u8;
            self.set_status(
                repo,
                DocsStatus::InProgress,
                progress,
                Some(format!("Processed {} of {} files: {}", index + 1, total, change.path)),
            )?;
        }

        Ok(summary)
    }

    fn remove_file(&self, repo: &Repository, path: &str) -> Result<FileOutcome> {
        let had_doc = self.db.delete_documentation(repo.id, path)?;
        self.db.delete_content(repo.id, path)?;
        Ok(if had_doc {
            FileOutcome::Removed
        } else {
            FileOutcome::Skipped("not documented")
        })
    }

    async fn document_file(
        &self,
        repo: &Repository,
        path: &str,
        git_ref: &str,
        commit: Option<&str>,
        force: bool,
    ) -> Result<FileOutcome> {
        if !self.filter.matches(path) {
            return self.skip_file(repo, path, "excluded by pattern");
        }

        let Some(file) = self
            .host
            .file_content(&repo.full_name, path, git_ref)
            .await?
        else {
            return self.skip_file(repo, path, "missing or not text");
        };

        if !self.filter.within_size(file.size) {
            return self.skip_file(repo, path, "too large");
        }
        if is_binary(&file.content) {
            return self.skip_file(repo, path, "binary");
        }

        let hash = content_hash(&file.content);
        self.db.upsert_content(
            repo.id,
            path,
            commit.unwrap_or(git_ref),
            Some(&file.sha),
            &file.content,
            &hash,
        )?;

        if !force {
            let existing = self.db.get_documentation(repo.id, path)?;
            if !needs_regeneration(existing.as_ref(), &hash) {
                return Ok(FileOutcome::Unchanged);
            }
        }

        let doc = self.generator.generate(path, &file.content).await?;
        self.db.upsert_documentation(&NewDocumentation {
            repo_id: repo.id,
            file_path: path,
            content: &doc.content,
            content_hash: &doc.content_hash,
            chunk_hashes: &doc.chunk_hashes,
            model: Some(&doc.model),
            source_commit: commit,
        })?;

        Ok(FileOutcome::Documented)
    }

    /// Skip `path`. A doc left from before the file stopped qualifying is
    /// deleted and counted as removed.
    fn skip_file(&self, repo: &Repository, path: &str, reason: &'static str) -> Result<FileOutcome> {
        if !self.db.delete_documentation(repo.id, path)? {
            return Ok(FileOutcome::Skipped(reason));
        }
        self.db.delete_content(repo.id, path)?;
        tracing::info!(repo = %repo.full_name, path, reason, "Dropped documentation for skipped file");
        Ok(FileOutcome::Removed)
    }

    /// Re-read the repository after waiting for its lock
    fn reload(&self, repo: &Repository) -> Result<Repository> {
        self.db
            .get_repository(repo.id)?
            .ok_or_else(|| Error::RepoNotFound(repo.full_name.clone()))
    }

    fn set_status(
        &self,
        repo: &Repository,
        status: DocsStatus,
        progress: u8,
        message: Option<String>,
    ) -> Result<()> {
        self.db
            .update_docs_status(repo.id, status, progress, message.as_deref())?;
        self.hub
            .publish(ProgressEvent::new(repo, status, progress, message));
        Ok(())
    }

    /// Record a failed run and hand the error back
    fn fail(&self, repo: &Repository, error: Error) -> Error {
        tracing::error!(repo = %repo.full_name, error = %error, "Run failed");
        if let Err(e) = self.set_status(repo, DocsStatus::Failed, 0, Some(error.to_string())) {
            tracing::error!(repo = %repo.full_name, error = %e, "Failed to record run failure");
        }
        error
    }
}
