//! LLM completion clients.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde_json::json;

use crate::config::{LlmConfig, LlmProvider};
use crate::error::{Error, Result};
use crate::retry::with_retry;

/// LLM completion interface for documentation generation.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Complete `prompt` under the given system instructions
    async fn complete(&self, system: &str, prompt: &str) -> Result<String>;

    /// Model identifier recorded alongside generated docs
    fn model(&self) -> &str;
}

/// Create the default HTTP-backed completion client.
pub fn create_completion_client(llm: &LlmConfig) -> Result<Box<dyn CompletionClient>> {
    Ok(Box::new(HttpCompletionClient::new(llm)?))
}

/// Completion client speaking the Ollama, Claude, OpenAI or Gemini HTTP APIs.
pub struct HttpCompletionClient {
    model: String,
    provider: LlmProvider,
    endpoint: String,
    api_key: Option<String>,
    max_tokens: u32,
    max_retries: usize,
    http: reqwest::Client,
}

impl HttpCompletionClient {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let endpoint = config
            .endpoint
            .clone()
            .unwrap_or_else(|| config.provider.default_endpoint().to_string())
            .trim_end_matches('/')
            .to_string();
        let api_key = config.api_key.clone().or_else(|| {
            config
                .provider
                .api_key_env()
                .and_then(|var| std::env::var(var).ok())
        });

        if config.provider.api_key_env().is_some() && api_key.is_none() {
            return Err(Error::Config(
                "llm.api_key (or provider env var) is required".to_string(),
            ));
        }

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .map_err(|e| Error::Llm {
                status: None,
                message: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            model: config.model.clone(),
            provider: config.provider,
            endpoint,
            api_key,
            max_tokens: config.max_tokens,
            max_retries: config.max_retries,
            http,
        })
    }

    fn provider_name(&self) -> &'static str {
        match self.provider {
            LlmProvider::Ollama => "ollama",
            LlmProvider::Claude => "claude",
            LlmProvider::OpenAI => "openai",
            LlmProvider::Gemini => "gemini",
        }
    }

    fn api_key(&self) -> &str {
        self.api_key.as_deref().unwrap_or_default()
    }

    /// POST a JSON body and return the parsed JSON response
    async fn post_json(
        &self,
        url: &str,
        headers: HeaderMap,
        body: &serde_json::Value,
    ) -> Result<serde_json::Value> {
        let name = self.provider_name();
        let resp = self
            .http
            .post(url)
            .headers(headers)
            .json(body)
            .send()
            .await
            .map_err(|e| Error::llm(None, format!("{name} request failed: {e}")))?;
        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| Error::llm(None, format!("{name} read body failed: {e}")))?;
        if !status.is_success() {
            return Err(Error::llm(
                Some(status.as_u16()),
                format!("{name} returned error: {text}"),
            ));
        }
        Ok(serde_json::from_str(&text)?)
    }

    async fn complete_once(&self, system: &str, prompt: &str) -> Result<String> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        match self.provider {
            LlmProvider::Ollama => {
                let url = format!("{}/api/generate", self.endpoint);
                let json = self
                    .post_json(
                        &url,
                        headers,
                        &json!({
                            "model": self.model,
                            "system": system,
                            "prompt": prompt,
                            "stream": false,
                        }),
                    )
                    .await?;
                extract_text(&json, &["response"], "ollama")
            }
            LlmProvider::Claude => {
                let url = format!("{}/v1/messages", self.endpoint);
                headers.insert(
                    "x-api-key",
                    HeaderValue::from_str(self.api_key())
                        .map_err(|e| Error::llm(None, format!("invalid claude api key header: {e}")))?,
                );
                headers.insert("anthropic-version", HeaderValue::from_static("2023-06-01"));
                let json = self
                    .post_json(
                        &url,
                        headers,
                        &json!({
                            "model": self.model,
                            "max_tokens": self.max_tokens,
                            "temperature": 0,
                            "system": system,
                            "messages": [{ "role": "user", "content": prompt }],
                        }),
                    )
                    .await?;
                extract_text(&json, &["content", "0", "text"], "claude")
            }
            LlmProvider::OpenAI => {
                let url = format!("{}/v1/chat/completions", self.endpoint);
                headers.insert(
                    AUTHORIZATION,
                    HeaderValue::from_str(&format!("Bearer {}", self.api_key()))
                        .map_err(|e| Error::llm(None, format!("invalid auth header: {e}")))?,
                );
                let json = self
                    .post_json(
                        &url,
                        headers,
                        &json!({
                            "model": self.model,
                            "temperature": 0,
                            "max_tokens": self.max_tokens,
                            "messages": [
                                { "role": "system", "content": system },
                                { "role": "user", "content": prompt }
                            ]
                        }),
                    )
                    .await?;
                extract_text(&json, &["choices", "0", "message", "content"], "openai")
            }
            LlmProvider::Gemini => {
                let url = format!(
                    "{}/v1beta/models/{}:generateContent",
                    self.endpoint,
                    urlencoding::encode(&self.model)
                );
                headers.insert(
                    "x-goog-api-key",
                    HeaderValue::from_str(self.api_key())
                        .map_err(|e| Error::llm(None, format!("invalid gemini api key header: {e}")))?,
                );
                let json = self
                    .post_json(
                        &url,
                        headers,
                        &json!({
                            "systemInstruction": { "parts": [{ "text": system }] },
                            "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
                            "generationConfig": {
                                "temperature": 0,
                                "maxOutputTokens": self.max_tokens,
                            }
                        }),
                    )
                    .await?;
                extract_text(
                    &json,
                    &["candidates", "0", "content", "parts", "0", "text"],
                    "gemini",
                )
            }
        }
    }
}

/// Follow a path of object keys / array indices to a string
fn extract_text(json: &serde_json::Value, path: &[&str], provider: &str) -> Result<String> {
    let mut current = json;
    for key in path {
        let next = match key.parse::<usize>() {
            Ok(index) => current.get(index),
            Err(_) => current.get(*key),
        };
        current = next.ok_or_else(|| {
            Error::llm(
                None,
                format!("{provider} response missing {}", path.join(".")),
            )
        })?;
    }
    current
        .as_str()
        .map(ToString::to_string)
        .ok_or_else(|| Error::llm(None, format!("{provider} response {} is not a string", path.join("."))))
}

#[async_trait]
impl CompletionClient for HttpCompletionClient {
    async fn complete(&self, system: &str, prompt: &str) -> Result<String> {
        with_retry(self.provider_name(), self.max_retries, || {
            self.complete_once(system, prompt)
        })
        .await
    }

    fn model(&self) -> &str {
        &self.model
    }
}
