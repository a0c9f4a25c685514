//! Documentation generation
//!
//! Turns one source file into a Markdown document by prompting an LLM. Large
//! files are split into chunks on line boundaries and documented part by part.
//! Every document carries the SHA-256 of the source it was generated from, so
//! unchanged files can be skipped on later runs.

mod client;

pub use client::{create_completion_client, CompletionClient, HttpCompletionClient};

use std::sync::Arc;

use sha2::{Digest, Sha256};

use crate::config::GeneratorConfig;
use crate::error::Result;
use crate::types::RepoDocumentation;

const SYSTEM_PROMPT: &str = "You are a technical writer documenting a source code repository. \
Write concise Markdown documentation for the file you are given: its purpose, the main types \
and functions it defines, how they are used, and any notable behavior or edge cases. \
Do not repeat the source code verbatim. Respond with Markdown only.";

/// Output of documenting one file
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedDoc {
    pub content: String,
    pub content_hash: String,
    pub chunk_hashes: Vec<String>,
    pub model: String,
}

/// Generates Markdown documentation for source files
pub struct DocGenerator {
    client: Arc<dyn CompletionClient>,
    chunk_chars: usize,
    max_chunks: usize,
}

impl DocGenerator {
    pub fn new(client: Arc<dyn CompletionClient>, config: &GeneratorConfig) -> Self {
        Self {
            client,
            chunk_chars: config.chunk_chars.max(1),
            max_chunks: config.max_chunks.max(1),
        }
    }

    pub fn model(&self) -> &str {
        self.client.model()
    }

    /// Document `source`, which was read from `path`.
    pub async fn generate(&self, path: &str, source: &str) -> Result<GeneratedDoc> {
        let chunks = chunk_source(source, self.chunk_chars);
        let chunk_hashes: Vec<String> = chunks.iter().map(|c| content_hash(c)).collect();
        let hash = content_hash(source);
        let model = self.client.model().to_string();

        if chunks.is_empty() {
            return Ok(GeneratedDoc {
                content: format!("# {}\n\n_This file is empty._\n", path),
                content_hash: hash,
                chunk_hashes,
                model,
            });
        }

        let total = chunks.len();
        let kept = total.min(self.max_chunks);
        if kept < total {
            tracing::warn!(path, total, kept, "Source exceeds chunk limit, truncating");
        }

        let mut parts = Vec::with_capacity(kept);
        for (index, chunk) in chunks.iter().take(kept).enumerate() {
            let prompt = build_prompt(path, chunk, index + 1, kept);
            let raw = self.client.complete(SYSTEM_PROMPT, &prompt).await?;
            parts.push(strip_code_fences(&raw));
        }

        let mut content = assemble(path, &parts);
        if kept < total {
            content.push_str(&format!(
                "\n\n_Note: documentation covers the first {} of {} parts of this file; the rest was truncated._\n",
                kept, total
            ));
        }

        tracing::debug!(path, parts = kept, model = %model, "Generated documentation");

        Ok(GeneratedDoc {
            content,
            content_hash: hash,
            chunk_hashes,
            model,
        })
    }
}

fn build_prompt(path: &str, chunk: &str, part: usize, total: usize) -> String {
    let mut prompt = format!("File: {}\n", path);
    if total > 1 {
        prompt.push_str(&format!(
            "This is part {} of {} of the file. Document only this part.\n",
            part, total
        ));
    }
    prompt.push_str("\n```\n");
    prompt.push_str(chunk);
    if !chunk.ends_with('\n') {
        prompt.push('\n');
    }
    prompt.push_str("```\n");
    prompt
}

/// Join per-chunk outputs under one `# <path>` heading.
fn assemble(path: &str, parts: &[String]) -> String {
    if let [single] = parts {
        let body = reply_body(path, single, "##");
        if body.is_empty() {
            return format!("# {}", path);
        }
        return format!("# {}

{}", path, body);
    }

    let mut doc = format!("# {}", path);
    for (index, part) in parts.iter().enumerate() {
        doc.push_str(&format!(
            "

## Part {} of {}

{}",
            index + 1,
            parts.len(),
            reply_body(path, part, "###")
        ));
    }
    doc
}

/// Split a leading `# ` heading off a reply.
fn leading_heading(reply: &str) -> (Option<&str>, &str) {
    let reply = reply.trim();
    match reply.strip_prefix("# ") {
        Some(rest) => {
            let (title, body) = rest.split_once('\n').unwrap_or((rest, ""));
            (Some(title.trim()), body.trim())
        }
        None => (None, reply),
    }
}

/// A reply's own H1 is dropped when it names the file and demoted to
/// `level` otherwise, so the document keeps a single `# <path>` title.
fn reply_body(path: &str, reply: &str, level: &str) -> String {
    let file_name = path.rsplit('/').next().unwrap_or(path);
    match leading_heading(reply) {
        (Some(title), body) => {
            let title_path = title.trim_matches('`');
            if title_path == path || title_path == file_name {
                body.to_string()
            } else if body.is_empty() {
                format!("{} {}", level, title)
            } else {
                format!("{} {}\n\n{}", level, title, body)
            }
        }
        (None, body) => body.to_string(),
    }
}

/// Remove a Markdown code fence wrapped around the whole response.
pub fn strip_code_fences(raw: &str) -> String {
    let trimmed = raw.trim();
    if let Some(rest) = trimmed.strip_prefix("```") {
        if let Some(inner) = rest.strip_suffix("```") {
            // Drop the info string (```markdown) on the opening line
            let body = match inner.find('\n') {
                Some(newline) => &inner[newline + 1..],
                None => "",
            };
            return body.trim().to_string();
        }
    }
    trimmed.to_string()
}

/// Split `source` into chunks of at most `max_chars` characters, breaking
/// between lines. A line longer than `max_chars` is split on char boundaries.
pub fn chunk_source(source: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_chars = 0;

    for line in source.split_inclusive('\n') {
        let line_chars = line.chars().count();

        if current_chars + line_chars > max_chars && !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
            current_chars = 0;
        }

        if line_chars > max_chars {
            let chars: Vec<char> = line.chars().collect();
            for piece in chars.chunks(max_chars) {
                chunks.push(piece.iter().collect());
            }
            continue;
        }

        current.push_str(line);
        current_chars += line_chars;
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

/// Hex SHA-256 of a text
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}

/// Whether a file must be (re)documented given what is already stored.
pub fn needs_regeneration(existing: Option<&RepoDocumentation>, content_hash: &str) -> bool {
    existing.map_or(true, |doc| doc.content_hash != content_hash)
}

/// NUL bytes mark content we do not document
pub fn is_binary(content: &str) -> bool {
    content.contains('\0')
}
