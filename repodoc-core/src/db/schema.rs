//! Database schema and migrations
//!
//! Uses SQLite with embedded migrations managed via PRAGMA user_version.

use rusqlite::Connection;

/// Current schema version
pub const SCHEMA_VERSION: i32 = 2;

/// SQL migrations, indexed by version number
const MIGRATIONS: &[&str] = &[
    // Version 1: repositories, generated docs and raw snapshots
    r#"
    CREATE TABLE IF NOT EXISTS repositories (
        id               INTEGER PRIMARY KEY AUTOINCREMENT,
        github_id        INTEGER UNIQUE,
        owner            TEXT NOT NULL,
        name             TEXT NOT NULL,
        full_name        TEXT NOT NULL UNIQUE,
        default_branch   TEXT NOT NULL DEFAULT 'main',
        webhook_id       INTEGER,

        -- Documentation lifecycle
        docs_status      TEXT NOT NULL DEFAULT 'idle',
        docs_progress    INTEGER NOT NULL DEFAULT 0,
        docs_message     TEXT,
        merkle_root      TEXT,
        last_commit_sha  TEXT,

        created_at       DATETIME NOT NULL,
        updated_at       DATETIME NOT NULL
    );

    CREATE TABLE IF NOT EXISTS repo_documentation (
        id               INTEGER PRIMARY KEY AUTOINCREMENT,
        repo_id          INTEGER NOT NULL REFERENCES repositories(id) ON DELETE CASCADE,
        file_path        TEXT NOT NULL,
        content          TEXT NOT NULL,
        content_hash     TEXT NOT NULL,
        chunk_hashes     JSON NOT NULL,
        version          INTEGER NOT NULL DEFAULT 1,
        model            TEXT,
        source_commit    TEXT,
        generated_at     DATETIME NOT NULL,

        UNIQUE(repo_id, file_path)
    );

    CREATE TABLE IF NOT EXISTS repo_contents (
        id               INTEGER PRIMARY KEY AUTOINCREMENT,
        repo_id          INTEGER NOT NULL REFERENCES repositories(id) ON DELETE CASCADE,
        file_path        TEXT NOT NULL,
        commit_sha       TEXT NOT NULL,
        blob_sha         TEXT,
        content          TEXT NOT NULL,
        content_hash     TEXT NOT NULL,
        size_bytes       INTEGER NOT NULL,
        fetched_at       DATETIME NOT NULL,

        UNIQUE(repo_id, file_path)
    );

    CREATE INDEX IF NOT EXISTS idx_repositories_status ON repositories(docs_status);
    CREATE INDEX IF NOT EXISTS idx_docs_repo ON repo_documentation(repo_id);
    CREATE INDEX IF NOT EXISTS idx_contents_repo ON repo_contents(repo_id);
    "#,
    // Version 2: webhook delivery log for redelivery detection
    r#"
    CREATE TABLE IF NOT EXISTS webhook_deliveries (
        delivery_id      TEXT PRIMARY KEY,
        event            TEXT NOT NULL,
        repo_full_name   TEXT,
        received_at      DATETIME NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_deliveries_received ON webhook_deliveries(received_at);
    "#,
];

/// Run all pending migrations
pub fn run_migrations(conn: &Connection) -> crate::error::Result<()> {
    let current_version: i32 = conn
        .query_row("PRAGMA user_version", [], |r| r.get(0))
        .unwrap_or(0);

    tracing::info!(
        current_version,
        target_version = SCHEMA_VERSION,
        "Checking database migrations"
    );

    for (i, migration) in MIGRATIONS.iter().enumerate() {
        let version = (i + 1) as i32;
        if version > current_version {
            tracing::info!(version, "Running migration");
            conn.execute_batch(migration)?;
            conn.execute_batch(&format!("PRAGMA user_version = {}", version))?;
        }
    }

    if current_version < SCHEMA_VERSION {
        tracing::info!(
            from = current_version,
            to = SCHEMA_VERSION,
            "Migrations complete"
        );
    }

    Ok(())
}

/// Get the current schema version from the database
pub fn get_schema_version(conn: &Connection) -> crate::error::Result<i32> {
    let version: i32 = conn.query_row("PRAGMA user_version", [], |r| r.get(0))?;
    Ok(version)
}
