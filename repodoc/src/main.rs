//! repodoc - keeps Markdown documentation of GitHub repositories up to date
//!
//! `repodoc serve` runs the webhook receiver, JSON API and progress stream.
//! The other subcommands administer the same database directly.
//!
//! Uses XDG Base Directory specification for file locations:
//! - Database: $XDG_DATA_HOME/repodoc/repodoc.db (~/.local/share/repodoc/repodoc.db)
//! - Config: $XDG_CONFIG_HOME/repodoc/config.toml (~/.config/repodoc/config.toml)
//! - Logs: $XDG_STATE_HOME/repodoc/ (~/.local/state/repodoc/)

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::{Duration, Utc};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use repodoc_core::db::schema::get_schema_version;
use repodoc_core::docgen::HttpCompletionClient;
use repodoc_core::github::GitHubClient;
use repodoc_core::merkle::merkle_root;
use repodoc_core::server::{self, AppState};
use repodoc_core::{Config, Database, Repository, RunSummary};
use tokio::sync::broadcast::error::RecvError;

/// Deliveries older than this are forgotten at startup
const DELIVERY_RETENTION_DAYS: i64 = 7;

#[derive(Parser)]
#[command(name = "repodoc")]
#[command(about = "Keep Markdown documentation of GitHub repositories up to date")]
#[command(version)]
struct Args {
    /// Mirror logs to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the webhook receiver and HTTP API
    Serve {
        /// Override server.bind
        #[arg(long)]
        bind: Option<String>,
    },

    /// Apply database migrations
    Migrate,

    /// List tracked repositories
    Repos {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Start tracking a repository and generate its documentation
    Connect {
        /// Repository as owner/name
        full_name: String,

        /// Track without generating documentation now
        #[arg(long)]
        no_generate: bool,
    },

    /// Stop tracking a repository and delete its documentation
    Disconnect {
        /// Repository as owner/name
        full_name: String,
    },

    /// Regenerate documentation for every file on the default branch
    Regenerate {
        /// Repository as owner/name
        full_name: String,

        /// Ignore content hashes and regenerate every file
        #[arg(short, long)]
        force: bool,
    },

    /// List documented files, or print the documentation for one file
    Docs {
        /// Repository as owner/name
        full_name: String,

        /// File path within the repository
        path: Option<String>,
    },

    /// Mark runs interrupted by a crash as failed
    ResetStuck,

    /// Recompute Merkle roots from stored documentation
    Rehash,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = Config::load().context("failed to load configuration")?;
    if args.verbose {
        config.logging.stderr = true;
    }

    let _log_guard =
        repodoc_core::logging::init(&config.logging).context("failed to initialize logging")?;

    match args.command {
        Command::Serve { bind } => cmd_serve(config, bind).await,
        Command::Migrate => cmd_migrate(&config),
        Command::Repos { json } => cmd_repos(&config, json),
        Command::Connect {
            full_name,
            no_generate,
        } => cmd_connect(config, &full_name, no_generate).await,
        Command::Disconnect { full_name } => cmd_disconnect(config, &full_name).await,
        Command::Regenerate { full_name, force } => {
            cmd_regenerate(config, &full_name, force).await
        }
        Command::Docs { full_name, path } => cmd_docs(&config, &full_name, path.as_deref()),
        Command::ResetStuck => cmd_reset_stuck(&config),
        Command::Rehash => cmd_rehash(&config),
    }
}

/// Open (creating parent directories) and migrate the database
fn open_database(config: &Config) -> Result<Database> {
    let path = config.resolved_database_path();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let db = Database::open(&path)
        .with_context(|| format!("failed to open database {}", path.display()))?;
    db.migrate().context("failed to run migrations")?;
    Ok(db)
}

/// Build the pipeline with the real GitHub and LLM clients
fn build_state(config: Config, db: Database) -> Result<AppState> {
    let host = GitHubClient::new(config.github.clone()).context("failed to create GitHub client")?;
    let llm = HttpCompletionClient::new(&config.llm).context("failed to create LLM client")?;
    AppState::new(config, Arc::new(db), Arc::new(host), Arc::new(llm))
        .context("failed to build pipeline")
}

fn find_repo(db: &Database, full_name: &str) -> Result<Repository> {
    match db.get_repository_by_full_name(full_name)? {
        Some(repo) => Ok(repo),
        None => bail!("repository {} is not tracked", full_name),
    }
}

async fn cmd_serve(mut config: Config, bind: Option<String>) -> Result<()> {
    if let Some(bind) = bind {
        config.server.bind = bind;
        config.validate().context("invalid --bind")?;
    }
    if config.github.webhook_secret.is_none() {
        tracing::warn!("github.webhook_secret is not set; all webhook deliveries will be rejected");
    }

    let db = open_database(&config)?;
    let reset = db.reset_stuck_repositories()?;
    if reset > 0 {
        tracing::warn!(reset, "Marked interrupted runs as failed");
    }
    let pruned = db.prune_deliveries(Utc::now() - Duration::days(DELIVERY_RETENTION_DAYS))?;
    tracing::debug!(pruned, "Pruned old webhook deliveries");

    let state = build_state(config, db)?;
    println!("repodoc listening on {}", state.config.server.bind);

    server::serve(state, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for shutdown signal");
        }
        tracing::info!("Shutdown requested");
    })
    .await
    .context("server error")
}

fn cmd_migrate(config: &Config) -> Result<()> {
    let db = open_database(config)?;
    let version = get_schema_version(&db.connection())?;
    println!(
        "Database {} at schema version {}",
        config.resolved_database_path().display(),
        version
    );
    Ok(())
}

fn cmd_repos(config: &Config, json: bool) -> Result<()> {
    let db = open_database(config)?;
    let repos = db.list_repositories()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&repos)?);
        return Ok(());
    }

    if repos.is_empty() {
        println!("No repositories tracked. Add one with: repodoc connect owner/name");
        return Ok(());
    }

    println!(
        "{:<4} {:<40} {:<12} {:>5}  {:<12}  MERKLE ROOT",
        "ID", "REPOSITORY", "STATUS", "PROG", "BRANCH"
    );
    for repo in repos {
        println!(
            "{:<4} {:<40} {:<12} {:>4}%  {:<12}  {}",
            repo.id,
            repo.full_name,
            repo.docs_status.as_str(),
            repo.docs_progress,
            repo.default_branch,
            repo.merkle_root
                .as_deref()
                .map(|root| &root[..root.len().min(16)])
                .unwrap_or("-")
        );
    }
    Ok(())
}

async fn cmd_connect(config: Config, full_name: &str, no_generate: bool) -> Result<()> {
    let db = open_database(&config)?;
    let state = build_state(config, db)?;

    let webhook_url = state.config.server.webhook_url();
    let webhook = webhook_url
        .as_deref()
        .zip(state.config.github.webhook_secret.as_deref());
    if webhook.is_none() {
        println!("No server.public_url or webhook secret configured; skipping webhook registration");
    }

    let repo = state.pipeline.connect(full_name, webhook).await?;
    println!(
        "Tracking {} (id {}, default branch {})",
        repo.full_name, repo.id, repo.default_branch
    );
    if let Some(hook_id) = repo.webhook_id {
        println!("Webhook registered (id {})", hook_id);
    }

    if no_generate {
        return Ok(());
    }
    run_with_progress(&state, &repo, false).await
}

async fn cmd_disconnect(config: Config, full_name: &str) -> Result<()> {
    let db = open_database(&config)?;
    let repo = find_repo(&db, full_name)?;
    let state = build_state(config, db)?;

    state.pipeline.disconnect(&repo).await?;
    println!("Stopped tracking {}", repo.full_name);
    Ok(())
}

async fn cmd_regenerate(config: Config, full_name: &str, force: bool) -> Result<()> {
    let db = open_database(&config)?;
    let repo = find_repo(&db, full_name)?;
    if repo.docs_status.is_active() {
        eprintln!(
            "Warning: {} is {}; if a server is running this may duplicate work",
            repo.full_name, repo.docs_status
        );
    }
    let state = build_state(config, db)?;
    run_with_progress(&state, &repo, force).await
}

/// Run a full regeneration in-process, drawing hub events as a progress bar
async fn run_with_progress(state: &AppState, repo: &Repository, force: bool) -> Result<()> {
    let pb = ProgressBar::new(100);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos:>3}% {msg}")
            .context("invalid progress template")?
            .progress_chars("#>-"),
    );

    let mut events = state.hub.subscribe();
    let repo_id = repo.id;
    let bar = pb.clone();
    let drawer = tokio::spawn(async move {
        loop {
            let event = match events.recv().await {
                Ok(event) if event.repo_id == repo_id => event,
                Ok(_) | Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            };
            bar.set_position(u64::from(event.progress));
            if let Some(message) = event.message {
                bar.set_message(message);
            }
        }
    });

    let result = state.pipeline.regenerate_all(repo, force).await;
    drawer.abort();
    pb.finish_and_clear();

    let summary = result.with_context(|| format!("regeneration of {} failed", repo.full_name))?;
    print_summary(&repo.full_name, &summary);
    Ok(())
}

fn print_summary(full_name: &str, summary: &RunSummary) {
    println!("Regeneration of {} complete:", full_name);
    println!("  Documented: {}", summary.documented);
    println!("  Unchanged:  {}", summary.unchanged);
    println!("  Removed:    {}", summary.removed);
    println!("  Skipped:    {}", summary.skipped);
    if !summary.failures.is_empty() {
        println!("  Failed:     {}", summary.failures.len());
        for (path, error) in &summary.failures {
            println!("    {}: {}", path, error);
        }
    }
}

fn cmd_docs(config: &Config, full_name: &str, path: Option<&str>) -> Result<()> {
    let db = open_database(config)?;
    let repo = find_repo(&db, full_name)?;

    match path {
        Some(path) => {
            let Some(doc) = db.get_documentation(repo.id, path)? else {
                bail!("no documentation for {} in {}", path, repo.full_name);
            };
            println!("{}", doc.content);
        }
        None => {
            let docs = db.list_documentation(repo.id)?;
            if docs.is_empty() {
                println!("No documentation generated for {} yet", repo.full_name);
            }
            for doc in docs {
                println!(
                    "{:<60} v{:<3} {}",
                    doc.file_path,
                    doc.version,
                    doc.generated_at.format("%Y-%m-%d %H:%M")
                );
            }
        }
    }
    Ok(())
}

fn cmd_reset_stuck(config: &Config) -> Result<()> {
    let db = open_database(config)?;
    let reset = db.reset_stuck_repositories()?;
    println!("Reset {} stuck repositories", reset);
    Ok(())
}

fn cmd_rehash(config: &Config) -> Result<()> {
    let db = open_database(config)?;
    for repo in db.list_repositories()? {
        let root = merkle_root(&db.documentation_leaves(repo.id)?);
        db.finish_run(repo.id, root.as_deref(), None)?;
        println!("{:<40} {}", repo.full_name, root.as_deref().unwrap_or("-"));
    }
    Ok(())
}
