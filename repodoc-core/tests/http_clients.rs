//! GitHub and LLM clients against `mockito` servers

use mockito::{Matcher, Server};
use repodoc_core::config::{GitHubConfig, LlmConfig, LlmProvider};
use repodoc_core::docgen::{CompletionClient, HttpCompletionClient};
use repodoc_core::github::{FileStatus, GitHubClient, SourceHost};
use repodoc_core::Error;
use serde_json::json;

fn github(server: &Server) -> GitHubClient {
    GitHubClient::new(GitHubConfig {
        token: Some("ghp_test".to_string()),
        api_url: server.url(),
        max_retries: 0,
        ..Default::default()
    })
    .unwrap()
}

fn llm(server: &Server, provider: LlmProvider, model: &str) -> HttpCompletionClient {
    HttpCompletionClient::new(&LlmConfig {
        provider,
        model: model.to_string(),
        endpoint: Some(server.url()),
        api_key: Some("sk-test".to_string()),
        max_retries: 0,
        ..Default::default()
    })
    .unwrap()
}

// ============================================
// GitHub
// ============================================

#[tokio::test]
async fn github_repository_lookup_sends_auth_headers() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/repos/octo/hello")
        .match_header("authorization", "Bearer ghp_test")
        .match_header("accept", "application/vnd.github+json")
        .match_header("x-github-api-version", "2022-11-28")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "id": 42,
                "name": "hello",
                "full_name": "octo/hello",
                "owner": { "login": "octo", "id": 1 },
                "default_branch": "trunk",
                "private": false
            })
            .to_string(),
        )
        .create_async()
        .await;

    let repo = github(&server).repository("octo/hello").await.unwrap();

    assert_eq!(repo.id, 42);
    assert_eq!(repo.owner.login, "octo");
    assert_eq!(repo.default_branch, "trunk");
    mock.assert_async().await;
}

#[tokio::test]
async fn github_missing_repository_is_a_404_error() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/repos/octo/missing")
        .with_status(404)
        .with_body(r#"{"message":"Not Found"}"#)
        .create_async()
        .await;

    let err = github(&server).repository("octo/missing").await.unwrap_err();
    assert!(matches!(err, Error::GitHub { status: Some(404), .. }));
}

#[tokio::test]
async fn github_commit_files_include_renames() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/repos/octo/hello/commits/abc123")
        .with_status(200)
        .with_body(
            json!({
                "sha": "abc123",
                "files": [
                    { "filename": "src/lib.rs", "status": "modified", "additions": 1 },
                    { "filename": "src/new.rs", "status": "renamed", "previous_filename": "src/old.rs" }
                ]
            })
            .to_string(),
        )
        .create_async()
        .await;

    let files = github(&server)
        .commit_files("octo/hello", "abc123")
        .await
        .unwrap();

    assert_eq!(files.len(), 2);
    assert_eq!(files[0].status, FileStatus::Modified);
    assert_eq!(files[1].status, FileStatus::Renamed);
    assert_eq!(files[1].previous_filename.as_deref(), Some("src/old.rs"));
}

#[tokio::test]
async fn github_file_content_is_decoded() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/repos/octo/hello/contents/src/main.rs")
        .match_query(Matcher::UrlEncoded("ref".into(), "main".into()))
        .with_status(200)
        .with_body(
            json!({
                "type": "file",
                "path": "src/main.rs",
                "sha": "blobsha",
                "size": 13,
                "encoding": "base64",
                "content": "Zm4gbWFp\nbigpIHt9\nCg==\n"
            })
            .to_string(),
        )
        .create_async()
        .await;

    let file = github(&server)
        .file_content("octo/hello", "src/main.rs", "main")
        .await
        .unwrap()
        .unwrap();

    assert_eq!(file.content, "fn main() {}\n");
    assert_eq!(file.sha, "blobsha");
    assert_eq!(file.size, 13);
}

#[tokio::test]
async fn github_missing_file_is_none() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/repos/octo/hello/contents/gone.rs")
        .match_query(Matcher::Any)
        .with_status(404)
        .create_async()
        .await;

    let file = github(&server)
        .file_content("octo/hello", "gone.rs", "main")
        .await
        .unwrap();
    assert!(file.is_none());
}

#[tokio::test]
async fn github_tree_lists_blobs_only() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/repos/octo/hello/git/trees/main")
        .match_query(Matcher::UrlEncoded("recursive".into(), "1".into()))
        .with_status(200)
        .with_body(
            json!({
                "sha": "tree",
                "truncated": false,
                "tree": [
                    { "path": "src", "type": "tree", "sha": "t1" },
                    { "path": "src/main.rs", "type": "blob", "sha": "b1", "size": 13 },
                    { "path": "vendor/lib", "type": "commit", "sha": "c1" }
                ]
            })
            .to_string(),
        )
        .create_async()
        .await;

    let tree = github(&server).tree("octo/hello", "main").await.unwrap();

    assert_eq!(tree.len(), 1);
    assert_eq!(tree[0].path, "src/main.rs");
    assert_eq!(tree[0].size, 13);
}

#[tokio::test]
async fn github_webhook_create_and_delete() {
    let mut server = Server::new_async().await;
    let create = server
        .mock("POST", "/repos/octo/hello/hooks")
        .match_body(Matcher::PartialJson(json!({
            "name": "web",
            "events": ["push"],
            "config": {
                "url": "https://docs.example.com/webhook",
                "content_type": "json",
                "secret": "s3cret"
            }
        })))
        .with_status(201)
        .with_body(r#"{"id": 9876, "active": true}"#)
        .create_async()
        .await;
    let delete = server
        .mock("DELETE", "/repos/octo/hello/hooks/9876")
        .with_status(204)
        .create_async()
        .await;

    let client = github(&server);
    let id = client
        .create_webhook("octo/hello", "https://docs.example.com/webhook", "s3cret")
        .await
        .unwrap();
    assert_eq!(id, 9876);
    client.delete_webhook("octo/hello", id).await.unwrap();

    create.assert_async().await;
    delete.assert_async().await;
}

#[tokio::test]
async fn github_client_errors_are_not_retried() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/repos/octo/hello")
        .with_status(401)
        .with_body(r#"{"message":"Bad credentials"}"#)
        .expect(1)
        .create_async()
        .await;

    let client = GitHubClient::new(GitHubConfig {
        api_url: server.url(),
        max_retries: 3,
        ..Default::default()
    })
    .unwrap();
    let err = client.repository("octo/hello").await.unwrap_err();

    assert!(matches!(err, Error::GitHub { status: Some(401), .. }));
    assert!(!err.is_transient());
    mock.assert_async().await;
}

// ============================================
// LLM providers
// ============================================

#[tokio::test]
async fn ollama_generate() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/api/generate")
        .match_body(Matcher::PartialJson(json!({
            "model": "llama3.2",
            "stream": false
        })))
        .with_status(200)
        .with_body(r#"{"model":"llama3.2","response":"Ollama docs","done":true}"#)
        .create_async()
        .await;

    let client = llm(&server, LlmProvider::Ollama, "llama3.2");
    let text = client.complete("system", "prompt").await.unwrap();

    assert_eq!(text, "Ollama docs");
    assert_eq!(client.model(), "llama3.2");
    mock.assert_async().await;
}

#[tokio::test]
async fn claude_messages() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/v1/messages")
        .match_header("x-api-key", "sk-test")
        .match_header("anthropic-version", "2023-06-01")
        .match_body(Matcher::PartialJson(json!({
            "system": "system",
            "messages": [{ "role": "user", "content": "prompt" }]
        })))
        .with_status(200)
        .with_body(r#"{"content":[{"type":"text","text":"Claude docs"}],"stop_reason":"end_turn"}"#)
        .create_async()
        .await;

    let client = llm(&server, LlmProvider::Claude, "claude-3-5-haiku-latest");
    assert_eq!(client.complete("system", "prompt").await.unwrap(), "Claude docs");
    mock.assert_async().await;
}

#[tokio::test]
async fn openai_chat_completions() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/v1/chat/completions")
        .match_header("authorization", "Bearer sk-test")
        .with_status(200)
        .with_body(r#"{"choices":[{"index":0,"message":{"role":"assistant","content":"OpenAI docs"}}]}"#)
        .create_async()
        .await;

    let client = llm(&server, LlmProvider::OpenAI, "gpt-4o-mini");
    assert_eq!(client.complete("system", "prompt").await.unwrap(), "OpenAI docs");
    mock.assert_async().await;
}

#[tokio::test]
async fn gemini_generate_content() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/v1beta/models/gemini-1.5-flash:generateContent")
        .match_header("x-goog-api-key", "sk-test")
        .with_status(200)
        .with_body(
            r#"{
                "candidates": [{
                    "content": { "parts": [{ "text": "Gemini docs" }], "role": "model" },
                    "finishReason": "STOP",
                    "index": 0
                }]
            }"#,
        )
        .create_async()
        .await;

    let client = llm(&server, LlmProvider::Gemini, "gemini-1.5-flash");
    assert_eq!(client.complete("system", "prompt").await.unwrap(), "Gemini docs");
    mock.assert_async().await;
}

#[tokio::test]
async fn llm_error_status_is_reported() {
    let mut server = Server::new_async().await;
    server
        .mock("POST", "/v1/chat/completions")
        .with_status(400)
        .with_body(r#"{"error":{"message":"bad model"}}"#)
        .create_async()
        .await;

    let client = llm(&server, LlmProvider::OpenAI, "nope");
    let err = client.complete("system", "prompt").await.unwrap_err();

    assert!(matches!(err, Error::Llm { status: Some(400), .. }));
    assert!(err.to_string().contains("bad model"));
}

#[tokio::test]
async fn llm_response_without_text_is_an_error() {
    let mut server = Server::new_async().await;
    server
        .mock("POST", "/api/generate")
        .with_status(200)
        .with_body(r#"{"done":true}"#)
        .create_async()
        .await;

    let client = llm(&server, LlmProvider::Ollama, "llama3.2");
    let err = client.complete("system", "prompt").await.unwrap_err();
    assert!(matches!(err, Error::Llm { status: None, .. }));
}
