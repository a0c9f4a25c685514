//! # repodoc-core
//!
//! Core library for repodoc - keeps Markdown documentation of GitHub
//! repositories in step with their default branch.
//!
//! This library provides:
//! - Webhook verification and push payload parsing
//! - A GitHub REST client behind the [`github::SourceHost`] trait
//! - Change detection over commit file lists
//! - LLM-backed documentation generation with content-hash skipping
//! - Database storage layer with SQLite
//! - An axum HTTP server with a JSON API and Server-Sent Events
//! - Configuration management and logging infrastructure
//!
//! ## Flow
//!
//! A push webhook is verified, de-duplicated and handed to the
//! [`pipeline::DocPipeline`], which fetches changed files, regenerates their
//! docs, recomputes the repository's Merkle root and publishes progress to
//! the [`progress::ProgressHub`].
//!
//! ## Example
//!
//! ```rust,no_run
//! use repodoc_core::{Config, Database};
//!
//! // Load configuration
//! let config = Config::load().expect("failed to load config");
//!
//! // Open database
//! let db = Database::open(&config.resolved_database_path()).expect("failed to open database");
//! db.migrate().expect("failed to run migrations");
//! ```

// Re-export commonly used items at the crate root
pub use config::Config;
pub use db::Database;
pub use error::{Error, Result};
pub use pipeline::{DocPipeline, RunSummary};
pub use types::*;

// Public modules
pub mod config;
pub mod db;
pub mod detect;
pub mod docgen;
pub mod error;
pub mod github;
pub mod logging;
pub mod merkle;
pub mod pipeline;
pub mod progress;
pub mod retry;
pub mod server;
pub mod types;
pub mod webhook;
