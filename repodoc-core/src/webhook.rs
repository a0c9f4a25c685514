//! GitHub webhook deliveries: signature verification and payload types.
//!
//! GitHub signs every delivery with HMAC-SHA256 over the raw request body
//! using the secret configured on the hook, and sends the digest in the
//! `X-Hub-Signature-256` header as `sha256=<hex>`.

use ring::hmac;
use serde::Deserialize;

use crate::error::{Error, Result};

/// Header carrying the HMAC-SHA256 signature
pub const SIGNATURE_HEADER: &str = "x-hub-signature-256";
/// Header carrying the event name
pub const EVENT_HEADER: &str = "x-github-event";
/// Header carrying the unique delivery id
pub const DELIVERY_HEADER: &str = "x-github-delivery";

const SIGNATURE_PREFIX: &str = "sha256=";

/// Verify a delivery signature.
///
/// The comparison is constant-time.
pub fn verify_signature(secret: &str, body: &[u8], header: Option<&str>) -> Result<()> {
    let header = header.ok_or_else(|| Error::Signature("missing signature header".to_string()))?;
    let hex_digest = header
        .strip_prefix(SIGNATURE_PREFIX)
        .ok_or_else(|| Error::Signature("signature must start with sha256=".to_string()))?;
    let expected = hex::decode(hex_digest)
        .map_err(|_| Error::Signature("signature is not valid hex".to_string()))?;
    if expected.len() != 32 {
        return Err(Error::Signature("signature has wrong length".to_string()));
    }

    let key = hmac::Key::new(hmac::HMAC_SHA256, secret.as_bytes());
    hmac::verify(&key, body, &expected)
        .map_err(|_| Error::Signature("signature mismatch".to_string()))
}

/// Compute the header value GitHub would send for `body`.
pub fn sign(secret: &str, body: &[u8]) -> String {
    let key = hmac::Key::new(hmac::HMAC_SHA256, secret.as_bytes());
    let tag = hmac::sign(&key, body);
    format!("{}{}", SIGNATURE_PREFIX, hex::encode(tag.as_ref()))
}

/// Webhook event kinds we distinguish
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookEvent {
    Push,
    Ping,
    Other(String),
}

impl WebhookEvent {
    pub fn from_header(value: &str) -> Self {
        match value {
            "push" => WebhookEvent::Push,
            "ping" => WebhookEvent::Ping,
            other => WebhookEvent::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            WebhookEvent::Push => "push",
            WebhookEvent::Ping => "ping",
            WebhookEvent::Other(name) => name,
        }
    }
}

/// Subset of the GitHub `push` event payload that drives regeneration
#[derive(Debug, Clone, Deserialize)]
pub struct PushEvent {
    /// Full ref, e.g. `refs/heads/main`
    #[serde(rename = "ref")]
    pub git_ref: String,
    /// Head before the push
    pub before: String,
    /// Head after the push
    pub after: String,
    pub repository: PushRepository,
    #[serde(default)]
    pub commits: Vec<PushCommit>,
    /// True when the push deleted the ref
    #[serde(default)]
    pub deleted: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PushRepository {
    pub id: i64,
    pub name: String,
    pub full_name: String,
    pub owner: PushOwner,
    #[serde(default)]
    pub default_branch: Option<String>,
}

/// Push payloads carry `name` for the owner and usually `login` too
#[derive(Debug, Clone, Deserialize)]
pub struct PushOwner {
    #[serde(default)]
    pub login: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

impl PushOwner {
    pub fn login(&self) -> Option<&str> {
        self.login.as_deref().or(self.name.as_deref())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PushCommit {
    pub id: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub added: Vec<String>,
    #[serde(default)]
    pub removed: Vec<String>,
    #[serde(default)]
    pub modified: Vec<String>,
}

impl PushEvent {
    pub fn from_slice(body: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(body)?)
    }

    /// Branch name if the ref is a branch
    pub fn branch(&self) -> Option<&str> {
        self.git_ref.strip_prefix("refs/heads/")
    }

    /// Whether the push updated `default_branch` (and did not delete it)
    pub fn targets_branch(&self, default_branch: &str) -> bool {
        !self.deleted && self.branch() == Some(default_branch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "It's a Secret to Everybody";
    const BODY: &[u8] = b"Hello, World!";

    #[test]
    fn accepts_githubs_documented_example() {
        // Example from GitHub's webhook validation docs
        let header = "sha256=757107ea0eb2509fc211221cce984b8a37570b6d7586c22c46f4379c8b043e17";
        assert!(verify_signature(SECRET, BODY, Some(header)).is_ok());
        assert_eq!(sign(SECRET, BODY), header);
    }

    #[test]
    fn rejects_bad_signatures() {
        let good = sign(SECRET, BODY);
        assert!(verify_signature("other secret", BODY, Some(&good)).is_err());
        assert!(verify_signature(SECRET, b"tampered", Some(&good)).is_err());
        assert!(verify_signature(SECRET, BODY, None).is_err());
        assert!(verify_signature(SECRET, BODY, Some("sha1=abcd")).is_err());
        assert!(verify_signature(SECRET, BODY, Some("sha256=zz")).is_err());
        assert!(verify_signature(SECRET, BODY, Some("sha256=abcd")).is_err());
    }

    #[test]
    fn parses_push_payload() {
        let body = br#"{
            "ref": "refs/heads/main",
            "before": "0000000000000000000000000000000000000000",
            "after": "c0ffee",
            "repository": {
                "id": 42,
                "name": "hello",
                "full_name": "octo/hello",
                "owner": {"login": "octo"},
                "default_branch": "main"
            },
            "commits": [
                {"id": "c0ffee", "message": "add lib", "added": ["src/lib.rs"], "removed": [], "modified": ["README.md"]}
            ],
            "pusher": {"name": "octo"}
        }"#;
        let push = PushEvent::from_slice(body).unwrap();
        assert_eq!(push.branch(), Some("main"));
        assert!(push.targets_branch("main"));
        assert!(!push.targets_branch("develop"));
        assert_eq!(push.repository.owner.login(), Some("octo"));
        assert_eq!(push.commits[0].added, vec!["src/lib.rs".to_string()]);
    }

    #[test]
    fn tag_pushes_and_deletions_do_not_target_branch() {
        let body = br#"{
            "ref": "refs/tags/v1.0",
            "before": "a", "after": "b",
            "repository": {"id": 1, "name": "r", "full_name": "o/r", "owner": {"name": "o"}}
        }"#;
        let push = PushEvent::from_slice(body).unwrap();
        assert_eq!(push.repository.owner.login(), Some("o"));
        assert_eq!(push.branch(), None);
        assert!(!push.targets_branch("main"));

        let body = br#"{
            "ref": "refs/heads/main", "deleted": true,
            "before": "a", "after": "0000",
            "repository": {"id": 1, "name": "r", "full_name": "o/r", "owner": {"login": "o"}}
        }"#;
        let push = PushEvent::from_slice(body).unwrap();
        assert!(!push.targets_branch("main"));
    }

    #[test]
    fn event_header_mapping() {
        assert_eq!(WebhookEvent::from_header("push"), WebhookEvent::Push);
        assert_eq!(WebhookEvent::from_header("ping"), WebhookEvent::Ping);
        assert_eq!(
            WebhookEvent::from_header("issues").as_str(),
            "issues"
        );
    }
}
