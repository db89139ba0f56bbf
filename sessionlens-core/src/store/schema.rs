//! Database schema and migrations
//!
//! Uses SQLite with embedded migrations managed via PRAGMA user_version.

use rusqlite::Connection;

/// Current schema version
pub const SCHEMA_VERSION: i32 = 1;

/// SQL migrations, indexed by version number
const MIGRATIONS: &[&str] = &[
    // Version 1: Initial schema
    r#"
    CREATE TABLE IF NOT EXISTS sessions (
        id                    TEXT PRIMARY KEY,
        raw_log               TEXT NOT NULL,
        redacted_log          TEXT NOT NULL,
        status                TEXT NOT NULL,
        encryption_requested  INTEGER NOT NULL DEFAULT 0,
        created_at            DATETIME NOT NULL,
        expires_at            DATETIME NOT NULL,
        metadata              JSON
    );

    CREATE TABLE IF NOT EXISTS extraction_results (
        id               TEXT PRIMARY KEY,
        session_id       TEXT NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
        kind             TEXT NOT NULL,
        payload          JSON,
        status           TEXT NOT NULL,
        signal_score     REAL NOT NULL DEFAULT 0,
        error            TEXT,
        created_at       DATETIME NOT NULL,
        completed_at     DATETIME,

        UNIQUE(session_id, kind)
    );

    CREATE TABLE IF NOT EXISTS insights (
        id               TEXT PRIMARY KEY,
        session_id       TEXT NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
        analysis_id      TEXT REFERENCES extraction_results(id) ON DELETE SET NULL,
        insight_text     TEXT NOT NULL,
        insight_type     TEXT NOT NULL,
        signal_score     REAL NOT NULL DEFAULT 0,
        confidence       REAL NOT NULL DEFAULT 0.5,
        visualization    JSON,
        shown            INTEGER NOT NULL DEFAULT 0,
        created_at       DATETIME NOT NULL
    );

    CREATE TABLE IF NOT EXISTS user_comments (
        id               TEXT PRIMARY KEY,
        session_id       TEXT NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
        insight_id       TEXT REFERENCES insights(id) ON DELETE SET NULL,
        comment_text     TEXT NOT NULL,
        created_at       DATETIME NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_sessions_status ON sessions(status);
    CREATE INDEX IF NOT EXISTS idx_sessions_expires ON sessions(expires_at);
    CREATE INDEX IF NOT EXISTS idx_results_session ON extraction_results(session_id, created_at);
    CREATE INDEX IF NOT EXISTS idx_insights_session_score ON insights(session_id, signal_score DESC);
    CREATE INDEX IF NOT EXISTS idx_comments_session ON user_comments(session_id);
    "#,
];

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
            conn.execute(&format!("PRAGMA user_version = {}", version), [])?;
        }
    }

    Ok(())
}
