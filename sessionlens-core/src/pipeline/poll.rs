//! Bounded polling for session completion
//!
//! When a push subscription is unavailable, clients fall back to polling the
//! store. The loop has a hard attempt ceiling; exhausting it yields a
//! distinct [`PollOutcome::TimedOut`]. The session may still complete
//! later, so timing out is an outcome, not an error.

use crate::error::{Error, Result};
use crate::store::Database;
use crate::types::{Insight, Session, SessionStatus};
use std::time::Duration;

/// Polling budget.
#[derive(Debug, Clone)]
pub struct PollOptions {
    /// Hard ceiling on status checks
    pub max_attempts: u32,
    /// Delay between checks
    pub interval: Duration,
}

impl Default for PollOptions {
    fn default() -> Self {
        Self {
            max_attempts: 30,
            interval: Duration::from_secs(1),
        }
    }
}

/// Terminal observation of a poll loop.
#[derive(Debug)]
pub enum PollOutcome {
    /// Session completed; insights are attached, best first
    Completed {
        session: Session,
        insights: Vec<Insight>,
    },
    /// Session failed with the recorded reason
    Failed { reason: String },
    /// Attempt budget exhausted; the session may still complete later
    TimedOut { last_status: SessionStatus },
}

/// Poll until the session reaches a terminal status or the budget runs out.
///
/// Errors only on store failures or an unknown session id; a session that
/// simply has not finished yet is reported as [`PollOutcome::TimedOut`].
pub async fn wait_for_completion(
    db: &Database,
    session_id: &str,
    options: &PollOptions,
) -> Result<PollOutcome> {
    let mut last_status = SessionStatus::Uploading;

    for attempt in 0..options.max_attempts {
        let session = db
            .get_session(session_id)?
            .ok_or_else(|| Error::SessionNotFound(session_id.to_string()))?;
        last_status = session.status;

        match session.status {
            SessionStatus::Completed => {
                let insights = db.list_insights(session_id)?;
                return Ok(PollOutcome::Completed { session, insights });
            }
            SessionStatus::Failed => {
                let reason = session.metadata["failure_reason"]
                    .as_str()
                    .unwrap_or("unknown failure")
                    .to_string();
                return Ok(PollOutcome::Failed { reason });
            }
            SessionStatus::Uploading | SessionStatus::Analyzing => {
                tracing::debug!(
                    session_id,
                    attempt = attempt + 1,
                    max = options.max_attempts,
                    status = %session.status,
                    "Session not terminal yet"
                );
            }
        }

        // don't sleep after the final check
        if attempt + 1 < options.max_attempts {
            tokio::time::sleep(options.interval).await;
        }
    }

    Ok(PollOutcome::TimedOut { last_status })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Session;
    use chrono::{Duration as ChronoDuration, Utc};

    fn make_session(id: &str, status: SessionStatus) -> Session {
        let now = Utc::now();
        Session {
            id: id.to_string(),
            raw_log: String::new(),
            redacted_log: String::new(),
            status,
            encryption_requested: false,
            created_at: now,
            expires_at: now + ChronoDuration::hours(24),
            metadata: serde_json::json!({}),
        }
    }

    fn fast_options(attempts: u32) -> PollOptions {
        PollOptions {
            max_attempts: attempts,
            interval: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn unknown_session_is_an_error() {
        let db = Database::open_in_memory().unwrap();
        db.migrate().unwrap();

        let result = wait_for_completion(&db, "missing", &fast_options(3)).await;
        assert!(matches!(result, Err(Error::SessionNotFound(_))));
    }

    #[tokio::test]
    async fn stuck_session_times_out_without_error() {
        let db = Database::open_in_memory().unwrap();
        db.migrate().unwrap();
        db.insert_session(&make_session("s1", SessionStatus::Analyzing))
            .unwrap();

        let outcome = wait_for_completion(&db, "s1", &fast_options(3))
            .await
            .unwrap();
        match outcome {
            PollOutcome::TimedOut { last_status } => {
                assert_eq!(last_status, SessionStatus::Analyzing);
            }
            other => panic!("expected timeout, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn completed_session_returns_insights() {
        let db = Database::open_in_memory().unwrap();
        db.migrate().unwrap();
        db.insert_session(&make_session("s1", SessionStatus::Completed))
            .unwrap();

        let outcome = wait_for_completion(&db, "s1", &fast_options(3))
            .await
            .unwrap();
        match outcome {
            PollOutcome::Completed { session, insights } => {
                assert_eq!(session.id, "s1");
                assert!(insights.is_empty());
            }
            other => panic!("expected completion, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn failed_session_surfaces_recorded_reason() {
        let db = Database::open_in_memory().unwrap();
        db.migrate().unwrap();
        let mut session = make_session("s1", SessionStatus::Failed);
        session.metadata = serde_json::json!({"failure_reason": "store unavailable"});
        db.insert_session(&session).unwrap();

        let outcome = wait_for_completion(&db, "s1", &fast_options(3))
            .await
            .unwrap();
        match outcome {
            PollOutcome::Failed { reason } => assert_eq!(reason, "store unavailable"),
            other => panic!("expected failure, got {:?}", other),
        }
    }
}
