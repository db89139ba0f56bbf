//! Database repository layer
//!
//! Query and insert operations for sessions, extraction results, insights,
//! and user comments. The four collections are keyed by session id and
//! support the pipeline's two hot queries: "all results for session X,
//! oldest first" and "all insights for session X, highest score first".
//!
//! Session status updates go through [`Database::update_session_status`],
//! a compare-and-set so a slow writer can never resurrect a terminal
//! session back into `analyzing`.

use crate::error::{Error, Result};
use crate::types::*;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::PathBuf;
use std::sync::Mutex;

/// Database handle (single connection guarded by a mutex)
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open or create a database at the given path
    pub fn open(path: &PathBuf) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        conn.execute_batch(
            "
            PRAGMA foreign_keys = ON;
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            ",
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute("PRAGMA foreign_keys = ON", [])?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Run migrations on this database
    pub fn migrate(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        super::schema::run_migrations(&conn)
    }

    // ============================================
    // Session operations
    // ============================================

    /// Insert a new session
    pub fn insert_session(&self, session: &Session) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"
            INSERT INTO sessions (id, raw_log, redacted_log, status, encryption_requested,
                                  created_at, expires_at, metadata)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
            params![
                session.id,
                session.raw_log,
                session.redacted_log,
                session.status.as_str(),
                session.encryption_requested as i32,
                session.created_at.to_rfc3339(),
                session.expires_at.to_rfc3339(),
                session.metadata.to_string(),
            ],
        )?;
        Ok(())
    }

    /// Get a session by id
    pub fn get_session(&self, id: &str) -> Result<Option<Session>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row("SELECT * FROM sessions WHERE id = ?", [id], |row| {
            Self::row_to_session(row)
        })
        .optional()
        .map_err(Error::from)
    }

    /// Compare-and-set a session's status.
    ///
    /// The update applies only when the current status is one of `from`;
    /// returns whether a row changed. This is what keeps status transitions
    /// monotonic under concurrency.
    pub fn update_session_status(
        &self,
        id: &str,
        from: &[SessionStatus],
        to: SessionStatus,
    ) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let placeholders = std::iter::repeat("?")
            .take(from.len())
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "UPDATE sessions SET status = ? WHERE id = ? AND status IN ({})",
            placeholders
        );

        let to_str = to.as_str();
        let mut values: Vec<&dyn rusqlite::ToSql> = vec![&to_str, &id];
        let from_strs: Vec<&str> = from.iter().map(|s| s.as_str()).collect();
        for s in &from_strs {
            values.push(s);
        }

        let changed = conn.execute(&sql, values.as_slice())?;
        Ok(changed > 0)
    }

    /// Shallow-merge a JSON object into a session's metadata.
    ///
    /// Read-modify-write under the connection lock; keys in `patch` replace
    /// existing keys of the same name.
    pub fn merge_session_metadata(&self, id: &str, patch: &serde_json::Value) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let current: Option<String> = conn
            .query_row("SELECT metadata FROM sessions WHERE id = ?", [id], |r| {
                r.get(0)
            })
            .optional()?;
        let current = current.ok_or_else(|| Error::SessionNotFound(id.to_string()))?;

        let mut metadata: serde_json::Value =
            serde_json::from_str(&current).unwrap_or_else(|_| serde_json::json!({}));
        if let (Some(object), Some(patch_object)) = (metadata.as_object_mut(), patch.as_object()) {
            for (key, value) in patch_object {
                object.insert(key.clone(), value.clone());
            }
        }

        conn.execute(
            "UPDATE sessions SET metadata = ? WHERE id = ?",
            params![metadata.to_string(), id],
        )?;
        Ok(())
    }

    /// Delete sessions (and their dependents) past their expiry time.
    ///
    /// Returns the number of sessions removed.
    pub fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let removed = conn.execute(
            "DELETE FROM sessions WHERE expires_at < ?",
            [now.to_rfc3339()],
        )?;
        if removed > 0 {
            tracing::info!(removed, "Purged expired sessions");
        }
        Ok(removed)
    }

    fn row_to_session(row: &Row) -> rusqlite::Result<Session> {
        let status_str: String = row.get("status")?;
        let created_at_str: String = row.get("created_at")?;
        let expires_at_str: String = row.get("expires_at")?;
        let metadata_str: String = row.get("metadata")?;
        let encryption: i32 = row.get("encryption_requested")?;

        Ok(Session {
            id: row.get("id")?,
            raw_log: row.get("raw_log")?,
            redacted_log: row.get("redacted_log")?,
            status: status_str.parse().unwrap_or(SessionStatus::Failed),
            encryption_requested: encryption != 0,
            created_at: parse_ts(&created_at_str),
            expires_at: parse_ts(&expires_at_str),
            metadata: serde_json::from_str(&metadata_str).unwrap_or(serde_json::json!({})),
        })
    }

    // ============================================
    // Extraction result operations
    // ============================================

    /// Insert or replace the result for (session, kind).
    ///
    /// A retried pass replaces its prior payload/status but keeps the
    /// original row id, so insights referencing the result stay valid.
    /// Returns the persisted row id.
    pub fn upsert_extraction_result(&self, result: &ExtractionResult) -> Result<String> {
        let conn = self.conn.lock().unwrap();
        let payload_json = result
            .payload
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        conn.execute(
            r#"
            INSERT INTO extraction_results
                (id, session_id, kind, payload, status, signal_score, error, created_at, completed_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            ON CONFLICT(session_id, kind) DO UPDATE SET
                payload = excluded.payload,
                status = excluded.status,
                signal_score = excluded.signal_score,
                error = excluded.error,
                completed_at = excluded.completed_at
            "#,
            params![
                result.id,
                result.session_id,
                result.kind.as_str(),
                payload_json,
                result.status.as_str(),
                result.signal_score,
                result.error,
                result.created_at.to_rfc3339(),
                result.completed_at.map(|t| t.to_rfc3339()),
            ],
        )?;

        let id: String = conn.query_row(
            "SELECT id FROM extraction_results WHERE session_id = ? AND kind = ?",
            params![result.session_id, result.kind.as_str()],
            |r| r.get(0),
        )?;
        Ok(id)
    }

    /// All extraction results for a session, oldest first.
    pub fn list_extraction_results(&self, session_id: &str) -> Result<Vec<ExtractionResult>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT * FROM extraction_results WHERE session_id = ? ORDER BY created_at ASC, id ASC",
        )?;
        let results = stmt
            .query_map([session_id], Self::row_to_extraction_result)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(results)
    }

    /// One result by (session, kind)
    pub fn get_extraction_result(
        &self,
        session_id: &str,
        kind: PassKind,
    ) -> Result<Option<ExtractionResult>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT * FROM extraction_results WHERE session_id = ? AND kind = ?",
            params![session_id, kind.as_str()],
            Self::row_to_extraction_result,
        )
        .optional()
        .map_err(Error::from)
    }

    fn row_to_extraction_result(row: &Row) -> rusqlite::Result<ExtractionResult> {
        let kind_str: String = row.get("kind")?;
        let status_str: String = row.get("status")?;
        let payload_str: Option<String> = row.get("payload")?;
        let created_at_str: String = row.get("created_at")?;
        let completed_at_str: Option<String> = row.get("completed_at")?;

        Ok(ExtractionResult {
            id: row.get("id")?,
            session_id: row.get("session_id")?,
            kind: kind_str.parse().unwrap_or(PassKind::ToolCalls),
            payload: payload_str.and_then(|s| serde_json::from_str(&s).ok()),
            status: status_str.parse().unwrap_or(PassStatus::Failed),
            signal_score: row.get("signal_score")?,
            error: row.get("error")?,
            created_at: parse_ts(&created_at_str),
            completed_at: completed_at_str.map(|s| parse_ts(&s)),
        })
    }

    // ============================================
    // Insight operations
    // ============================================

    /// Insert an insight (append-only)
    pub fn insert_insight(&self, insight: &Insight) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"
            INSERT INTO insights (id, session_id, analysis_id, insight_text, insight_type,
                                  signal_score, confidence, visualization, shown, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
            params![
                insight.id,
                insight.session_id,
                insight.analysis_id,
                insight.text,
                insight.kind.as_str(),
                insight.signal_score,
                insight.confidence,
                insight
                    .visualization
                    .as_ref()
                    .map(|v| v.to_string()),
                insight.shown as i32,
                insight.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// All insights for a session, highest signal score first.
    pub fn list_insights(&self, session_id: &str) -> Result<Vec<Insight>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT * FROM insights WHERE session_id = ? ORDER BY signal_score DESC, created_at ASC",
        )?;
        let insights = stmt
            .query_map([session_id], Self::row_to_insight)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(insights)
    }

    /// Flag an insight as delivered to a subscriber.
    ///
    /// The only mutation insights support after creation.
    pub fn mark_insight_shown(&self, insight_id: &str) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute("UPDATE insights SET shown = 1 WHERE id = ?", [insight_id])?;
        Ok(changed > 0)
    }

    fn row_to_insight(row: &Row) -> rusqlite::Result<Insight> {
        let kind_str: String = row.get("insight_type")?;
        let viz_str: Option<String> = row.get("visualization")?;
        let shown: i32 = row.get("shown")?;
        let created_at_str: String = row.get("created_at")?;

        Ok(Insight {
            id: row.get("id")?,
            session_id: row.get("session_id")?,
            analysis_id: row.get("analysis_id")?,
            text: row.get("insight_text")?,
            kind: kind_str.parse().unwrap_or(InsightKind::NextStep),
            signal_score: row.get("signal_score")?,
            confidence: row.get("confidence")?,
            visualization: viz_str.and_then(|s| serde_json::from_str(&s).ok()),
            shown: shown != 0,
            created_at: parse_ts(&created_at_str),
        })
    }

    // ============================================
    // User comment operations
    // ============================================

    /// Insert a user comment
    pub fn insert_comment(&self, comment: &UserComment) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"
            INSERT INTO user_comments (id, session_id, insight_id, comment_text, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![
                comment.id,
                comment.session_id,
                comment.insight_id,
                comment.text,
                comment.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// All comments for a session, oldest first.
    pub fn list_comments(&self, session_id: &str) -> Result<Vec<UserComment>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT * FROM user_comments WHERE session_id = ? ORDER BY created_at ASC",
        )?;
        let comments = stmt
            .query_map([session_id], |row| {
                let created_at_str: String = row.get("created_at")?;
                Ok(UserComment {
                    id: row.get("id")?,
                    session_id: row.get("session_id")?,
                    insight_id: row.get("insight_id")?,
                    text: row.get("comment_text")?,
                    created_at: parse_ts(&created_at_str),
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(comments)
    }
}

fn parse_ts(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}
