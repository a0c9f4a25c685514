//! Shared fakes for integration tests

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use repodoc_core::config::Config;
use repodoc_core::docgen::CompletionClient;
use repodoc_core::github::{
    CommitFile, RemoteFile, RemoteOwner, RemoteRepository, SourceHost, TreeEntry,
};
use repodoc_core::server::AppState;
use repodoc_core::{Database, Error, NewRepository, Repository, Result};

/// In-memory source host
#[derive(Default)]
pub struct FakeHost {
    pub repos: Mutex<HashMap<String, RemoteRepository>>,
    /// Files at the current head, by path
    pub files: Mutex<BTreeMap<String, String>>,
    pub commits: Mutex<HashMap<String, Vec<CommitFile>>>,
    /// Paths whose content fetch fails
    pub broken: Mutex<Vec<String>>,
    pub hooks_created: Mutex<Vec<(String, String)>>,
    pub hooks_deleted: Mutex<Vec<i64>>,
    pub content_fetches: Mutex<usize>,
    pub tree_fails: Mutex<bool>,
}

impl FakeHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_repo(self, full_name: &str, id: i64, default_branch: &str) -> Self {
        let (owner, name) = full_name.split_once('/').expect("owner/name");
        self.repos.lock().unwrap().insert(
            full_name.to_string(),
            RemoteRepository {
                id,
                name: name.to_string(),
                full_name: full_name.to_string(),
                owner: RemoteOwner {
                    login: owner.to_string(),
                },
                default_branch: default_branch.to_string(),
            },
        );
        self
    }

    pub fn set_file(&self, path: &str, content: &str) {
        self.files
            .lock()
            .unwrap()
            .insert(path.to_string(), content.to_string());
    }

    pub fn remove_file(&self, path: &str) {
        self.files.lock().unwrap().remove(path);
    }

    pub fn set_commit(&self, sha: &str, files: Vec<CommitFile>) {
        self.commits.lock().unwrap().insert(sha.to_string(), files);
    }

    pub fn break_file(&self, path: &str) {
        self.broken.lock().unwrap().push(path.to_string());
    }

    pub fn content_fetches(&self) -> usize {
        *self.content_fetches.lock().unwrap()
    }
}

#[async_trait]
impl SourceHost for FakeHost {
    async fn repository(&self, full_name: &str) -> Result<RemoteRepository> {
        self.repos
            .lock()
            .unwrap()
            .get(full_name)
            .cloned()
            .ok_or_else(|| Error::github(Some(404), "Not Found"))
    }

    async fn commit_files(&self, _full_name: &str, sha: &str) -> Result<Vec<CommitFile>> {
        self.commits
            .lock()
            .unwrap()
            .get(sha)
            .cloned()
            .ok_or_else(|| Error::github(Some(422), format!("No commit found for SHA: {sha}")))
    }

    async fn file_content(
        &self,
        _full_name: &str,
        path: &str,
        _git_ref: &str,
    ) -> Result<Option<RemoteFile>> {
        *self.content_fetches.lock().unwrap() += 1;
        if self.broken.lock().unwrap().iter().any(|p| p == path) {
            return Err(Error::github(Some(500), "server error"));
        }
        Ok(self.files.lock().unwrap().get(path).map(|content| RemoteFile {
            path: path.to_string(),
            sha: format!("blob-{}", content.len()),
            size: content.len() as u64,
            content: content.clone(),
        }))
    }

    async fn tree(&self, _full_name: &str, _git_ref: &str) -> Result<Vec<TreeEntry>> {
        if *self.tree_fails.lock().unwrap() {
            return Err(Error::github(Some(409), "Git Repository is empty."));
        }
        Ok(self
            .files
            .lock()
            .unwrap()
            .iter()
            .map(|(path, content)| TreeEntry {
                path: path.clone(),
                sha: format!("blob-{}", content.len()),
                size: content.len() as u64,
            })
            .collect())
    }

    async fn create_webhook(&self, full_name: &str, url: &str, _secret: &str) -> Result<i64> {
        let mut hooks = self.hooks_created.lock().unwrap();
        hooks.push((full_name.to_string(), url.to_string()));
        Ok(1000 + hooks.len() as i64)
    }

    async fn delete_webhook(&self, _full_name: &str, hook_id: i64) -> Result<()> {
        self.hooks_deleted.lock().unwrap().push(hook_id);
        Ok(())
    }
}

/// Completion client that echoes a fixed summary and counts calls
#[derive(Default)]
pub struct FakeLlm {
    pub calls: Mutex<usize>,
    pub fail: Mutex<bool>,
}

impl FakeLlm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }

    pub fn set_failing(&self, fail: bool) {
        *self.fail.lock().unwrap() = fail;
    }
}

#[async_trait]
impl CompletionClient for FakeLlm {
    async fn complete(&self, _system: &str, prompt: &str) -> Result<String> {
        *self.calls.lock().unwrap() += 1;
        if *self.fail.lock().unwrap() {
            return Err(Error::llm(Some(400), "bad request"));
        }
        let file = prompt
            .lines()
            .next()
            .and_then(|line| line.strip_prefix("File: "))
            .unwrap_or("unknown");
        Ok(format!("Documentation for {file}."))
    }

    fn model(&self) -> &str {
        "fake-llm"
    }
}

pub const SECRET: &str = "test-webhook-secret";
pub const API_TOKEN: &str = "test-api-token";

pub fn test_config() -> Config {
    let mut config = Config::default();
    config.github.webhook_secret = Some(SECRET.to_string());
    config
}

pub struct TestApp {
    pub state: AppState,
    pub host: Arc<FakeHost>,
    pub llm: Arc<FakeLlm>,
}

impl TestApp {
    pub fn new(config: Config, host: FakeHost) -> Self {
        repodoc_core::logging::init_test();
        let db = Database::open_in_memory().expect("open db");
        db.migrate().expect("migrate");
        let host = Arc::new(host);
        let llm = Arc::new(FakeLlm::new());
        let state = AppState::new(config, Arc::new(db), host.clone(), llm.clone())
            .expect("build state");
        Self { state, host, llm }
    }

    /// Track a repository directly in the database
    pub fn track(&self, full_name: &str, github_id: i64, default_branch: &str) -> Repository {
        let (owner, name) = full_name.split_once('/').expect("owner/name");
        self.state
            .db
            .insert_repository(&NewRepository {
                github_id: Some(github_id),
                owner: owner.to_string(),
                name: name.to_string(),
                default_branch: default_branch.to_string(),
            })
            .expect("insert repository")
    }

    pub fn repo(&self, id: i64) -> Repository {
        self.state
            .db
            .get_repository(id)
            .expect("query")
            .expect("repository exists")
    }

    /// Poll until the repository leaves pending/in_progress
    pub async fn wait_idle(&self, id: i64) -> Repository {
        for _ in 0..200 {
            let repo = self.repo(id);
            if !repo.docs_status.is_active() {
                return repo;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        panic!("repository {id} still running");
    }
}

/// One commit entry of a push payload
pub fn commit_json(id: &str, added: &[&str], removed: &[&str], modified: &[&str]) -> serde_json::Value {
    serde_json::json!({
        "id": id,
        "message": "change",
        "added": added,
        "removed": removed,
        "modified": modified,
    })
}

/// Minimal push payload for `full_name`; `after` is the last commit id
pub fn push_payload(
    full_name: &str,
    github_id: i64,
    git_ref: &str,
    commits: &[serde_json::Value],
) -> serde_json::Value {
    let (owner, name) = full_name.split_once('/').expect("owner/name");
    let after = commits
        .last()
        .and_then(|c| c["id"].as_str())
        .unwrap_or("0000000000000000000000000000000000000000")
        .to_string();

    serde_json::json!({
        "ref": git_ref,
        "before": "1111111111111111111111111111111111111111",
        "after": after,
        "deleted": false,
        "repository": {
            "id": github_id,
            "name": name,
            "full_name": full_name,
            "owner": { "name": owner, "login": owner },
            "default_branch": "main"
        },
        "commits": commits,
    })
}
