//! Error types for repodoc-core

use thiserror::Error;

/// Main error type for the repodoc-core library
#[derive(Error, Debug)]
pub enum Error {
    /// Database error
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// GitHub API error. `status` is `None` when no response was received.
    #[error("GitHub error{}: {message}", fmt_status(.status))]
    GitHub {
        status: Option<u16>,
        message: String,
    },

    /// LLM provider error. `status` is `None` when no response was received.
    #[error("LLM error{}: {message}", fmt_status(.status))]
    Llm {
        status: Option<u16>,
        message: String,
    },

    /// Webhook signature missing or invalid
    #[error("invalid webhook signature: {0}")]
    Signature(String),

    /// API request lacked a valid bearer token
    #[error("unauthorized")]
    Unauthorized,

    /// Repository not tracked
    #[error("repository not found: {0}")]
    RepoNotFound(String),

    /// Documentation not found for a path
    #[error("documentation not found: {0}")]
    DocNotFound(String),

    /// Malformed request from a client
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Request conflicts with existing state
    #[error("conflict: {0}")]
    Conflict(String),
}

fn fmt_status(status: &Option<u16>) -> String {
    status.map(|s| format!(" ({s})")).unwrap_or_default()
}

impl Error {
    pub fn github(status: Option<u16>, message: impl Into<String>) -> Self {
        Error::GitHub {
            status,
            message: message.into(),
        }
    }

    pub fn llm(status: Option<u16>, message: impl Into<String>) -> Self {
        Error::Llm {
            status,
            message: message.into(),
        }
    }

    /// Whether retrying the same request may succeed.
    ///
    /// Network failures (no status), rate limiting and server errors are transient.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::GitHub { status, .. } | Error::Llm { status, .. } => match status {
                None => true,
                Some(code) => *code == 429 || *code >= 500,
            },
            _ => false,
        }
    }
}

/// Result type alias for repodoc-core
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(Error::github(None, "connection reset").is_transient());
        assert!(Error::github(Some(502), "bad gateway").is_transient());
        assert!(Error::llm(Some(429), "slow down").is_transient());
        assert!(!Error::github(Some(404), "not found").is_transient());
        assert!(!Error::llm(Some(401), "bad key").is_transient());
        assert!(!Error::Config("x".to_string()).is_transient());
    }

    #[test]
    fn display_includes_status() {
        let err = Error::github(Some(403), "rate limited");
        assert_eq!(err.to_string(), "GitHub error (403): rate limited");
        let err = Error::llm(None, "timeout");
        assert_eq!(err.to_string(), "LLM error: timeout");
    }
}
