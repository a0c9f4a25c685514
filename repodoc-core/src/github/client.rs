//! HTTP client for the GitHub REST API

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, USER_AGENT};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::config::GitHubConfig;
use crate::error::{Error, Result};
use crate::retry::with_retry;

use super::{CommitFile, RemoteFile, RemoteRepository, SourceHost, TreeEntry};

/// Response from GET /repos/{owner}/{repo}/commits/{sha}
#[derive(Debug, Deserialize)]
struct CommitResponse {
    #[serde(default)]
    files: Vec<CommitFile>,
}

/// Response from GET /repos/{owner}/{repo}/contents/{path}
#[derive(Debug, Deserialize)]
struct ContentResponse {
    #[serde(rename = "type")]
    kind: String,
    path: String,
    sha: String,
    #[serde(default)]
    size: u64,
    #[serde(default)]
    encoding: Option<String>,
    #[serde(default)]
    content: Option<String>,
}

/// Response from GET /repos/{owner}/{repo}/git/trees/{ref}
#[derive(Debug, Deserialize)]
struct TreeResponse {
    tree: Vec<TreeItem>,
    #[serde(default)]
    truncated: bool,
}

#[derive(Debug, Deserialize)]
struct TreeItem {
    path: String,
    #[serde(rename = "type")]
    kind: String,
    sha: String,
    #[serde(default)]
    size: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct HookResponse {
    id: i64,
}

/// Request body for POST /repos/{owner}/{repo}/hooks
#[derive(Serialize)]
struct CreateHookRequest<'a> {
    name: &'a str,
    active: bool,
    events: &'a [&'a str],
    config: HookConfig<'a>,
}

#[derive(Serialize)]
struct HookConfig<'a> {
    url: &'a str,
    content_type: &'a str,
    secret: &'a str,
    insecure_ssl: &'a str,
}

/// HTTP client for the GitHub REST API
pub struct GitHubClient {
    config: GitHubConfig,
    http_client: reqwest::Client,
    base_url: String,
}

impl GitHubClient {
    /// Create a new client from configuration
    ///
    /// A token is optional; unauthenticated requests only work for public
    /// repositories and are heavily rate limited.
    pub fn new(config: GitHubConfig) -> Result<Self> {
        let base_url = config.api_url.trim_end_matches('/').to_string();

        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert(
            "X-GitHub-Api-Version",
            HeaderValue::from_static("2022-11-28"),
        );
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&config.user_agent)
                .map_err(|e| Error::Config(format!("invalid github.user_agent: {}", e)))?,
        );

        if let Some(token) = &config.token {
            let mut auth_value = HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|e| Error::Config(format!("invalid github.token: {}", e)))?;
            auth_value.set_sensitive(true);
            headers.insert(AUTHORIZATION, auth_value);
        }

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .default_headers(headers)
            .build()
            .map_err(|e| Error::Config(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            config,
            http_client,
            base_url,
        })
    }

    fn repo_url(&self, full_name: &str) -> Result<String> {
        let (owner, name) = crate::types::split_full_name(full_name).ok_or_else(|| {
            Error::InvalidRequest(format!("expected owner/name, got {:?}", full_name))
        })?;
        Ok(format!(
            "{}/repos/{}/{}",
            self.base_url,
            urlencoding::encode(owner),
            urlencoding::encode(name)
        ))
    }

    /// Send one request. A 404 yields `Ok(None)`.
    async fn send<T: DeserializeOwned>(
        &self,
        method: Method,
        url: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<Option<T>> {
        let mut request = self.http_client.request(method, url);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::github(None, format!("HTTP request failed: {}", e)))?;

        let status = response.status();

        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown".to_string());
            return Err(Error::github(
                Some(status.as_u16()),
                format!("API error: {}", error_text),
            ));
        }
        if status == StatusCode::NO_CONTENT {
            return serde_json::from_value(serde_json::Value::Null)
                .map(Some)
                .map_err(|e| Error::github(Some(204), format!("unexpected empty body: {}", e)));
        }

        let parsed = response
            .json::<T>()
            .await
            .map_err(|e| Error::github(Some(status.as_u16()), format!("failed to parse response: {}", e)))?;
        Ok(Some(parsed))
    }

    /// Send with retries on transient failures
    async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        url: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<Option<T>> {
        with_retry(url, self.config.max_retries, || {
            self.send(method.clone(), url, body)
        })
        .await
    }

    /// GET that treats 404 as an error
    async fn get_required<T: DeserializeOwned>(&self, url: &str, what: &str) -> Result<T> {
        self.request(Method::GET, url, None)
            .await?
            .ok_or_else(|| Error::github(Some(404), format!("{} not found", what)))
    }
}

/// Percent-encode each segment of a repository path, keeping the slashes
fn encode_path(path: &str) -> String {
    path.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// Decode GitHub's base64 content, which is wrapped at 60 columns
fn decode_content(encoded: &str) -> Option<String> {
    let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(compact)
        .ok()?;
    String::from_utf8(bytes).ok()
}

#[async_trait]
impl SourceHost for GitHubClient {
    async fn repository(&self, full_name: &str) -> Result<RemoteRepository> {
        let url = self.repo_url(full_name)?;
        self.get_required(&url, &format!("repository {}", full_name))
            .await
    }

    async fn commit_files(&self, full_name: &str, sha: &str) -> Result<Vec<CommitFile>> {
        let url = format!(
            "{}/commits/{}",
            self.repo_url(full_name)?,
            urlencoding::encode(sha)
        );
        let commit: CommitResponse = self
            .get_required(&url, &format!("commit {}", sha))
            .await?;
        Ok(commit.files)
    }

    async fn file_content(
        &self,
        full_name: &str,
        path: &str,
        git_ref: &str,
    ) -> Result<Option<RemoteFile>> {
        let url = format!(
            "{}/contents/{}?ref={}",
            self.repo_url(full_name)?,
            encode_path(path),
            urlencoding::encode(git_ref)
        );
        let Some(response) = self
            .request::<ContentResponse>(Method::GET, &url, None)
            .await?
        else {
            return Ok(None);
        };

        if response.kind != "file" || response.encoding.as_deref() != Some("base64") {
            tracing::debug!(path, kind = %response.kind, "Content is not an inline file");
            return Ok(None);
        }

        let Some(content) = response.content.as_deref().and_then(decode_content) else {
            tracing::debug!(path, "Content is not UTF-8 text");
            return Ok(None);
        };

        Ok(Some(RemoteFile {
            path: response.path,
            sha: response.sha,
            size: response.size,
            content,
        }))
    }

    async fn tree(&self, full_name: &str, git_ref: &str) -> Result<Vec<TreeEntry>> {
        let url = format!(
            "{}/git/trees/{}?recursive=1",
            self.repo_url(full_name)?,
            urlencoding::encode(git_ref)
        );
        let tree: TreeResponse = self
            .get_required(&url, &format!("tree {}", git_ref))
            .await?;

        if tree.truncated {
            tracing::warn!(
                repo = full_name,
                entries = tree.tree.len(),
                "Tree listing truncated by GitHub"
            );
        }

        Ok(tree
            .tree
            .into_iter()
            .filter(|item| item.kind == "blob")
            .map(|item| TreeEntry {
                path: item.path,
                sha: item.sha,
                size: item.size.unwrap_or(0),
            })
            .collect())
    }

    async fn create_webhook(&self, full_name: &str, url: &str, secret: &str) -> Result<i64> {
        let hooks_url = format!("{}/hooks", self.repo_url(full_name)?);
        let body = serde_json::to_value(CreateHookRequest {
            name: "web",
            active: true,
            events: &["push"],
            config: HookConfig {
                url,
                content_type: "json",
                secret,
                insecure_ssl: "0",
            },
        })?;

        // Not retried: a timed-out create may still have registered the hook
        let hook: HookResponse = self
            .send(Method::POST, &hooks_url, Some(&body))
            .await?
            .ok_or_else(|| Error::github(Some(404), format!("repository {} not found", full_name)))?;
        Ok(hook.id)
    }

    async fn delete_webhook(&self, full_name: &str, hook_id: i64) -> Result<()> {
        let url = format!("{}/hooks/{}", self.repo_url(full_name)?, hook_id);
        let _: Option<serde_json::Value> = self.request(Method::DELETE, &url, None).await?;
        Ok(())
    }
}
