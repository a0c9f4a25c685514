//! Configuration loading and management
//!
//! Configuration is loaded from `~/.config/repodoc/config.toml`
//!
//! This module follows the XDG Base Directory Specification:
//! - Config: `$XDG_CONFIG_HOME/repodoc/` (~/.config/repodoc/)
//! - Data: `$XDG_DATA_HOME/repodoc/` (~/.local/share/repodoc/)
//! - State/Logs: `$XDG_STATE_HOME/repodoc/` (~/.local/state/repodoc/)
//!
//! Secrets can be supplied through the environment instead of the file:
//! `GITHUB_TOKEN`, `GITHUB_WEBHOOK_SECRET`, `REPODOC_API_TOKEN`,
//! `REPODOC_DATABASE` and the provider key variables.

use crate::error::{Error, Result};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// Returns a best-effort home directory path.
fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Returns XDG_CONFIG_HOME or ~/.config
fn xdg_config_home() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
}

/// Returns XDG_DATA_HOME or ~/.local/share
fn xdg_data_home() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/share"))
}

/// Returns XDG_STATE_HOME or ~/.local/state
fn xdg_state_home() -> PathBuf {
    std::env::var("XDG_STATE_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/state"))
}

/// Main configuration struct
#[derive(Debug, Deserialize, Default, Clone)]
pub struct Config {
    /// HTTP server settings
    #[serde(default)]
    pub server: ServerConfig,

    /// GitHub API and webhook settings
    #[serde(default)]
    pub github: GitHubConfig,

    /// LLM used for documentation generation
    #[serde(default)]
    pub llm: LlmConfig,

    /// Which files get documented and how they are chunked
    #[serde(default)]
    pub generator: GeneratorConfig,

    /// Database location override
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// HTTP server configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    /// Listen address
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Externally reachable base URL, used when registering webhooks
    pub public_url: Option<String>,

    /// Bearer token required on `/api/*` routes (optional)
    pub api_token: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            public_url: None,
            api_token: None,
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

impl ServerConfig {
    /// URL GitHub should deliver webhooks to, if a public URL is configured
    pub fn webhook_url(&self) -> Option<String> {
        self.public_url
            .as_deref()
            .map(|base| format!("{}/webhook", base.trim_end_matches('/')))
    }
}

/// GitHub configuration
#[derive(Debug, Deserialize, Clone)]
pub struct GitHubConfig {
    /// Personal access token or app installation token
    pub token: Option<String>,

    /// Shared secret used to sign webhook deliveries
    pub webhook_secret: Option<String>,

    /// REST API base URL
    #[serde(default = "default_github_api_url")]
    pub api_url: String,

    /// User-Agent header (GitHub rejects requests without one)
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// HTTP request timeout in seconds
    #[serde(default = "default_github_timeout")]
    pub timeout_secs: u64,

    /// Max retry attempts for transient failures
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            token: None,
            webhook_secret: None,
            api_url: default_github_api_url(),
            user_agent: default_user_agent(),
            timeout_secs: default_github_timeout(),
            max_retries: default_max_retries(),
        }
    }
}

fn default_github_api_url() -> String {
    "https://api.github.com".to_string()
}

fn default_user_agent() -> String {
    concat!("repodoc/", env!("CARGO_PKG_VERSION")).to_string()
}

fn default_github_timeout() -> u64 {
    30
}

fn default_max_retries() -> usize {
    3
}

/// LLM provider configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    /// Provider type
    #[serde(default = "default_provider")]
    pub provider: LlmProvider,
    /// Model to use
    #[serde(default = "default_model")]
    pub model: String,
    /// API endpoint (optional, uses default for provider)
    pub endpoint: Option<String>,
    /// API key (can also use env var)
    pub api_key: Option<String>,
    /// Request timeout in seconds
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
    /// Upper bound on generated tokens per completion
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Max retry attempts for transient failures
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            endpoint: None,
            api_key: None,
            timeout_secs: default_llm_timeout(),
            max_tokens: default_max_tokens(),
            max_retries: default_max_retries(),
        }
    }
}

fn default_provider() -> LlmProvider {
    LlmProvider::Ollama
}

fn default_model() -> String {
    "llama3.2".to_string()
}

fn default_llm_timeout() -> u64 {
    120
}

fn default_max_tokens() -> u32 {
    2048
}

/// Supported LLM providers
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    Ollama,
    Claude,
    OpenAI,
    Gemini,
}

impl LlmProvider {
    /// Returns the default endpoint for this provider
    pub fn default_endpoint(&self) -> &'static str {
        match self {
            LlmProvider::Ollama => "http://localhost:11434",
            LlmProvider::Claude => "https://api.anthropic.com",
            LlmProvider::OpenAI => "https://api.openai.com",
            LlmProvider::Gemini => "https://generativelanguage.googleapis.com",
        }
    }

    /// Environment variable consulted when no API key is configured
    pub fn api_key_env(&self) -> Option<&'static str> {
        match self {
            LlmProvider::Ollama => None,
            LlmProvider::Claude => Some("ANTHROPIC_API_KEY"),
            LlmProvider::OpenAI => Some("OPENAI_API_KEY"),
            LlmProvider::Gemini => Some("GEMINI_API_KEY"),
        }
    }
}

/// Documentation generator configuration
#[derive(Debug, Deserialize, Clone)]
pub struct GeneratorConfig {
    /// Glob patterns a path must match to be documented
    #[serde(default = "default_include")]
    pub include: Vec<String>,

    /// Glob patterns that exclude a path even if included
    #[serde(default = "default_exclude")]
    pub exclude: Vec<String>,

    /// Files larger than this are skipped
    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: u64,

    /// Maximum characters of source sent in one completion
    #[serde(default = "default_chunk_chars")]
    pub chunk_chars: usize,

    /// Maximum completions per file; longer sources are truncated
    #[serde(default = "default_max_chunks")]
    pub max_chunks: usize,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            include: default_include(),
            exclude: default_exclude(),
            max_file_bytes: default_max_file_bytes(),
            chunk_chars: default_chunk_chars(),
            max_chunks: default_max_chunks(),
        }
    }
}

fn default_include() -> Vec<String> {
    [
        "**/*.rs", "**/*.py", "**/*.js", "**/*.jsx", "**/*.ts", "**/*.tsx", "**/*.go",
        "**/*.java", "**/*.kt", "**/*.rb", "**/*.c", "**/*.h", "**/*.cpp", "**/*.hpp",
        "**/*.cs", "**/*.swift", "**/*.php", "**/*.scala", "**/*.sh", "**/*.sql",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_exclude() -> Vec<String> {
    [
        "**/node_modules/**",
        "**/vendor/**",
        "**/dist/**",
        "**/build/**",
        "**/target/**",
        "**/.git/**",
        "**/*.min.js",
        "**/*.lock",
        "**/package-lock.json",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_max_file_bytes() -> u64 {
    100_000
}

fn default_chunk_chars() -> usize {
    12_000
}

fn default_max_chunks() -> usize {
    8
}

/// Database configuration
#[derive(Debug, Deserialize, Clone, Default)]
pub struct DatabaseConfig {
    /// Override for the SQLite file location
    pub path: Option<PathBuf>,
}

/// Logging configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Maximum number of log files to keep
    #[serde(default = "default_max_log_files")]
    pub max_files: usize,

    /// Also write logs to stderr
    #[serde(default)]
    pub stderr: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            max_files: default_max_log_files(),
            stderr: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_log_files() -> usize {
    5
}

impl Config {
    /// Load configuration from the default path, then apply environment overrides
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        let mut config = if config_path.exists() {
            Self::load_from(&config_path)?
        } else {
            tracing::info!("No config file found at {:?}, using defaults", config_path);
            Config::default()
        };

        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config file {:?}: {}", path, e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;

        Ok(config)
    }

    /// Fill unset secrets from the environment.
    ///
    /// Values in the config file take precedence.
    pub fn apply_env(&mut self) {
        fn env_nonempty(key: &str) -> Option<String> {
            std::env::var(key).ok().filter(|v| !v.is_empty())
        }

        if self.github.token.is_none() {
            self.github.token = env_nonempty("GITHUB_TOKEN");
        }
        if self.github.webhook_secret.is_none() {
            self.github.webhook_secret = env_nonempty("GITHUB_WEBHOOK_SECRET");
        }
        if self.server.api_token.is_none() {
            self.server.api_token = env_nonempty("REPODOC_API_TOKEN");
        }
        if self.database.path.is_none() {
            self.database.path = env_nonempty("REPODOC_DATABASE").map(PathBuf::from);
        }
        if self.llm.api_key.is_none() {
            if let Some(var) = self.llm.provider.api_key_env() {
                self.llm.api_key = env_nonempty(var);
            }
        }
    }

    /// Validate values that serde cannot check
    pub fn validate(&self) -> Result<()> {
        self.server
            .bind
            .parse::<SocketAddr>()
            .map_err(|e| Error::Config(format!("server.bind is not a socket address: {}", e)))?;

        if self.generator.include.is_empty() {
            return Err(Error::Config(
                "generator.include must contain at least one pattern".to_string(),
            ));
        }
        if self.generator.chunk_chars == 0 || self.generator.max_chunks == 0 {
            return Err(Error::Config(
                "generator.chunk_chars and generator.max_chunks must be positive".to_string(),
            ));
        }
        for pattern in self.generator.include.iter().chain(&self.generator.exclude) {
            glob::Pattern::new(pattern).map_err(|e| {
                Error::Config(format!("invalid generator pattern {:?}: {}", pattern, e))
            })?;
        }
        Ok(())
    }

    /// Database path: explicit override or the XDG default
    pub fn resolved_database_path(&self) -> PathBuf {
        self.database
            .path
            .clone()
            .unwrap_or_else(Self::database_path)
    }

    /// Returns the default config file path
    ///
    /// `$XDG_CONFIG_HOME/repodoc/config.toml` (~/.config/repodoc/config.toml)
    pub fn config_path() -> PathBuf {
        xdg_config_home().join("repodoc").join("config.toml")
    }

    /// Returns the data directory path (for SQLite database)
    ///
    /// `$XDG_DATA_HOME/repodoc/` (~/.local/share/repodoc/)
    pub fn data_dir() -> PathBuf {
        xdg_data_home().join("repodoc")
    }

    /// Returns the state directory path (for logs)
    ///
    /// `$XDG_STATE_HOME/repodoc/` (~/.local/state/repodoc/)
    pub fn state_dir() -> PathBuf {
        xdg_state_home().join("repodoc")
    }

    /// Returns the database file path
    ///
    /// `$XDG_DATA_HOME/repodoc/repodoc.db` (~/.local/share/repodoc/repodoc.db)
    pub fn database_path() -> PathBuf {
        Self::data_dir().join("repodoc.db")
    }

    /// Returns the log file path
    ///
    /// `$XDG_STATE_HOME/repodoc/repodoc.log` (~/.local/state/repodoc/repodoc.log)
    pub fn log_path() -> PathBuf {
        Self::state_dir().join("repodoc.log")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.server.bind, "127.0.0.1:8080");
        assert_eq!(config.github.api_url, "https://api.github.com");
        assert_eq!(config.llm.provider, LlmProvider::Ollama);
        assert_eq!(config.generator.chunk_chars, 12_000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_config() {
        let toml = r#"
[server]
bind = "0.0.0.0:9000"
public_url = "https://docs.example.com/"

[github]
token = "ghp_test"
webhook_secret = "s3cret"

[llm]
provider = "gemini"
model = "gemini-1.5-flash"

[generator]
include = ["src/**/*.rs"]
max_file_bytes = 5000

[logging]
level = "debug"
"#;
        let config: Config = toml::from_str(toml).unwrap();

        assert_eq!(config.server.bind, "0.0.0.0:9000");
        assert_eq!(
            config.server.webhook_url().as_deref(),
            Some("https://docs.example.com/webhook")
        );
        assert_eq!(config.github.token.as_deref(), Some("ghp_test"));
        assert_eq!(config.llm.provider, LlmProvider::Gemini);
        assert_eq!(config.generator.include, vec!["src/**/*.rs".to_string()]);
        assert_eq!(config.generator.max_file_bytes, 5000);
        // Unset fields keep their defaults
        assert_eq!(config.generator.max_chunks, 8);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_llm_provider_endpoints() {
        assert_eq!(
            LlmProvider::Ollama.default_endpoint(),
            "http://localhost:11434"
        );
        assert_eq!(
            LlmProvider::Gemini.default_endpoint(),
            "https://generativelanguage.googleapis.com"
        );
        assert_eq!(LlmProvider::Ollama.api_key_env(), None);
        assert_eq!(LlmProvider::Claude.api_key_env(), Some("ANTHROPIC_API_KEY"));
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = Config::default();
        config.server.bind = "not an address".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.generator.include.clear();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.generator.exclude.push("[unclosed".to_string());
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.generator.chunk_chars = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_database_path_override() {
        let mut config = Config::default();
        config.database.path = Some(PathBuf::from("/tmp/custom.db"));
        assert_eq!(
            config.resolved_database_path(),
            PathBuf::from("/tmp/custom.db")
        );
        assert!(Config::database_path().ends_with("repodoc/repodoc.db"));
    }
}
