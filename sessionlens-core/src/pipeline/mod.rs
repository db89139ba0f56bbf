//! Session pipeline orchestration
//!
//! The coordinator owns the per-session state machine
//! (`uploading → analyzing → completed | failed`) and sequences
//! redaction → parsing → extraction passes → insight generation, publishing
//! progress to subscribers as each stage lands.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   create_session    ┌─────────────────────┐
//! │ Submission │ ──────────────────► │ PipelineCoordinator │──► Database
//! └────────────┘                     │  redact + persist   │
//!                                    └──────────┬──────────┘
//!                         analyze              │
//!                 parse ──► JoinSet of passes ──► insights
//!                                    │
//!                                    ▼
//!                       EventHub (broadcast per session)
//! ```
//!
//! ## Concurrency contract
//!
//! At most one pipeline run per session id: a second `analyze` call for a
//! session that is already running is rejected with
//! [`Error::AnalysisInProgress`]. Passes for one session run concurrently
//! over a shared read-only `Arc<ParsedLog>`; sessions share nothing.
//! The coordinator is the sole mutator of a session's status, and every
//! status write is a compare-and-set, so a terminal session can never drift
//! back to `analyzing`.
//!
//! ## Failure model
//!
//! A failing pass is recorded in its own result row and the session still
//! completes. Only infrastructure failures (the store rejecting a write,
//! an untracked session) abort the run into `failed`, with the reason kept
//! in session metadata. Subscribers may come and go freely; channel loss
//! never touches pipeline state.

pub mod events;
pub mod poll;

pub use events::{EventHub, PipelineEvent};
pub use poll::{wait_for_completion, PollOptions, PollOutcome};

use crate::error::{Error, Result};
use crate::insight::{CompletedPass, InsightGenerator};
use crate::parse::{parse_log, ParsedLog};
use crate::passes::{create_default_engine, PassEngine, PassRun};
use crate::redact::redact;
use crate::store::Database;
use crate::types::{ExtractionResult, Insight, PassStatus, Session, SessionStatus};
use chrono::{Duration, Utc};
use serde_json::json;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use tokio::task::JoinSet;

/// Resource caps for one analysis run.
#[derive(Debug, Clone)]
pub struct PipelineLimits {
    /// Maximum files accepted in a multi-file submission; extra files are
    /// dropped with a recorded warning, not an error
    pub max_input_files: usize,
    /// Session lifetime before it becomes purgeable
    pub session_ttl_hours: i64,
    /// Buffered events per subscriber channel
    pub event_channel_capacity: usize,
}

impl Default for PipelineLimits {
    fn default() -> Self {
        Self {
            max_input_files: 10,
            session_ttl_hours: 24,
            event_channel_capacity: 64,
        }
    }
}

/// One file in a submission.
#[derive(Debug, Clone)]
pub struct SubmittedFile {
    pub name: String,
    pub content: String,
}

/// A session-creation request: raw log text (or a small set of files) plus
/// an encryption-intent flag.
#[derive(Debug, Clone)]
pub struct LogSubmission {
    pub files: Vec<SubmittedFile>,
    pub encryption_requested: bool,
}

impl LogSubmission {
    /// Single-blob submission.
    pub fn from_text(content: impl Into<String>) -> Self {
        Self {
            files: vec![SubmittedFile {
                name: "log".to_string(),
                content: content.into(),
            }],
            encryption_requested: false,
        }
    }

    pub fn with_encryption(mut self, requested: bool) -> Self {
        self.encryption_requested = requested;
        self
    }
}

/// What session creation hands back to the client.
#[derive(Debug, Clone)]
pub struct SessionTicket {
    pub id: String,
    pub status: SessionStatus,
    pub created_at: chrono::DateTime<Utc>,
    pub expires_at: chrono::DateTime<Utc>,
    /// Always zero; cost accounting is out of scope
    pub cost_estimate: f64,
}

/// Orchestrates per-session analysis pipelines.
///
/// Holds an explicitly injected [`Database`] handle; there is no ambient
/// storage singleton anywhere in the crate.
pub struct PipelineCoordinator {
    db: Arc<Database>,
    engine: Arc<PassEngine>,
    generator: InsightGenerator,
    hub: EventHub,
    active: Mutex<HashSet<String>>,
    limits: PipelineLimits,
}

impl PipelineCoordinator {
    /// Create a coordinator with the default passes and limits.
    pub fn new(db: Arc<Database>) -> Self {
        Self {
            db,
            engine: Arc::new(create_default_engine()),
            generator: InsightGenerator::new(),
            hub: EventHub::default(),
            active: Mutex::new(HashSet::new()),
            limits: PipelineLimits::default(),
        }
    }

    /// Replace the pass engine (tests, custom deployments).
    pub fn with_engine(mut self, engine: PassEngine) -> Self {
        self.engine = Arc::new(engine);
        self
    }

    /// Replace the resource limits.
    pub fn with_limits(mut self, limits: PipelineLimits) -> Self {
        self.hub = EventHub::new(limits.event_channel_capacity);
        self.limits = limits;
        self
    }

    /// Subscribe to a session's progress stream.
    pub fn subscribe(&self, session_id: &str) -> broadcast::Receiver<PipelineEvent> {
        self.hub.subscribe(session_id)
    }

    /// Shared handle to the underlying store.
    pub fn database(&self) -> Arc<Database> {
        self.db.clone()
    }

    /// Create a session from a submission.
    ///
    /// Redacts the content, fingerprints it, and persists the session in
    /// `uploading` state. Every upload mints a fresh id; re-submitting
    /// identical content creates a new session, and the content hash in the
    /// metadata lets operators correlate duplicates.
    pub fn create_session(&self, submission: LogSubmission) -> Result<SessionTicket> {
        let mut files = submission.files;
        let mut dropped: Vec<String> = Vec::new();
        if files.len() > self.limits.max_input_files {
            dropped = files
                .split_off(self.limits.max_input_files)
                .into_iter()
                .map(|f| f.name)
                .collect();
            tracing::warn!(
                dropped = dropped.len(),
                cap = self.limits.max_input_files,
                "Submission exceeded file cap; extra files dropped"
            );
        }

        let raw_log = files
            .iter()
            .map(|f| f.content.as_str())
            .collect::<Vec<_>>()
            .join("\n");

        let redaction = redact(&raw_log);
        let secrets_found = redaction.secrets_found();
        let content_hash = hex::encode(Sha256::digest(redaction.text.as_bytes()));

        let now = Utc::now();
        let mut metadata = json!({
            "log_size": raw_log.len(),
            "secrets_found": secrets_found,
            "content_hash": content_hash,
            "input_files": files.len(),
        });
        if !dropped.is_empty() {
            metadata["dropped_files"] = json!(dropped);
        }

        let session = Session {
            id: uuid::Uuid::new_v4().to_string(),
            raw_log,
            redacted_log: redaction.text,
            status: SessionStatus::Uploading,
            encryption_requested: submission.encryption_requested,
            created_at: now,
            expires_at: now + Duration::hours(self.limits.session_ttl_hours),
            metadata,
        };
        self.db.insert_session(&session)?;

        tracing::info!(
            session_id = %session.id,
            log_size = session.raw_log.len(),
            secrets_found = secrets_found,
            "Session created"
        );

        Ok(SessionTicket {
            id: session.id,
            status: session.status,
            created_at: session.created_at,
            expires_at: session.expires_at,
            cost_estimate: 0.0,
        })
    }

    /// Run the full analysis pipeline for a session.
    ///
    /// Rejects a second concurrent run for the same id. Returns once the
    /// session has reached a terminal status.
    pub async fn analyze(&self, session_id: &str) -> Result<()> {
        {
            let mut active = self.active.lock().unwrap();
            if !active.insert(session_id.to_string()) {
                return Err(Error::AnalysisInProgress(session_id.to_string()));
            }
        }

        let outcome = self.run_pipeline(session_id).await;

        self.active.lock().unwrap().remove(session_id);

        if let Err(ref e) = outcome {
            self.fail_session(session_id, &e.to_string());
        }
        outcome
    }

    async fn run_pipeline(&self, session_id: &str) -> Result<()> {
        let session = self
            .db
            .get_session(session_id)?
            .ok_or_else(|| Error::SessionNotFound(session_id.to_string()))?;

        if !self.db.update_session_status(
            session_id,
            &[SessionStatus::Uploading],
            SessionStatus::Analyzing,
        )? {
            return Err(Error::InvalidStatus {
                session: session_id.to_string(),
                status: session.status.to_string(),
                operation: "analyze",
            });
        }

        self.hub
            .publish(session_id, PipelineEvent::status(10, "Analysis started"));

        // The parser is fast and infallible, so it runs inline.
        let parsed = Arc::new(parse_log(&session.redacted_log));
        self.record_parse_metadata(session_id, &parsed)?;
        self.hub
            .publish(session_id, PipelineEvent::status(20, "Log parsed"));

        let completed = self.run_passes(session_id, parsed.clone()).await?;

        self.hub
            .publish(session_id, PipelineEvent::status(85, "Generating insights"));

        let drafts = self.generator.generate(&parsed, &completed);
        tracing::info!(session_id, insights = drafts.len(), "Insights generated");

        for draft in drafts {
            let insight = Insight {
                id: uuid::Uuid::new_v4().to_string(),
                session_id: session_id.to_string(),
                analysis_id: draft.analysis_id,
                text: draft.text,
                kind: draft.kind,
                signal_score: draft.signal_score,
                confidence: draft.confidence,
                visualization: draft.visualization,
                shown: false,
                created_at: Utc::now(),
            };
            self.db.insert_insight(&insight)?;

            // each insight is its own progress event, never batched
            let insight_id = insight.id.clone();
            let delivered = self
                .hub
                .publish(session_id, PipelineEvent::Insight { insight });
            if delivered {
                let _ = self.db.mark_insight_shown(&insight_id);
            }
        }

        // Completion does not depend on how many passes failed.
        if !self.db.update_session_status(
            session_id,
            &[SessionStatus::Analyzing],
            SessionStatus::Completed,
        )? {
            tracing::warn!(session_id, "Session left analyzing state mid-pipeline");
        }

        self.hub.publish(
            session_id,
            PipelineEvent::Complete {
                message: "Analysis complete".to_string(),
            },
        );

        tracing::info!(session_id, "Pipeline completed");
        Ok(())
    }

    /// Dispatch all passes concurrently; persist and publish each result as
    /// it lands. Returns the completed payloads for insight generation.
    async fn run_passes(
        &self,
        session_id: &str,
        parsed: Arc<ParsedLog>,
    ) -> Result<Vec<CompletedPass>> {
        let total = self.engine.passes().len().max(1);
        let mut join_set: JoinSet<PassRun> = JoinSet::new();

        for pass in self.engine.passes() {
            let pass = pass.clone();
            let log = parsed.clone();
            join_set.spawn_blocking(move || PassEngine::run_pass(pass.as_ref(), log.as_ref()));
        }

        let mut finished = 0usize;
        let mut completed: Vec<CompletedPass> = Vec::new();
        let mut pass_errors = serde_json::Map::new();

        while let Some(joined) = join_set.join_next().await {
            let run = match joined {
                Ok(run) => run,
                Err(e) => {
                    tracing::error!(session_id, error = %e, "Pass task aborted");
                    finished += 1;
                    continue;
                }
            };
            finished += 1;
            let progress = (20 + finished * 60 / total) as u8;

            if run.status == PassStatus::Failed {
                let error = run.error.clone().unwrap_or_else(|| "unknown".to_string());
                pass_errors.insert(run.kind.as_str().to_string(), json!(error));

                let result = self.persist_run(session_id, &run)?;
                self.hub.publish(
                    session_id,
                    PipelineEvent::status(
                        progress,
                        format!("{} analysis failed", result.kind),
                    ),
                );
                continue;
            }

            match &run.output {
                Some(output) => {
                    let result = self.persist_run(session_id, &run)?;
                    completed.push(CompletedPass {
                        result_id: Some(result.id.clone()),
                        payload: output.payload.clone(),
                    });
                    let kind = result.kind;
                    self.hub.publish(
                        session_id,
                        PipelineEvent::AnalysisComplete { analysis: result },
                    );
                    self.hub.publish(
                        session_id,
                        PipelineEvent::status(progress, format!("{} analysis complete", kind)),
                    );
                }
                None => {
                    // pass ran clean but had nothing worth emitting
                    self.hub.publish(
                        session_id,
                        PipelineEvent::status(
                            progress,
                            format!("{} analysis produced no findings", run.kind),
                        ),
                    );
                }
            }
        }

        if !pass_errors.is_empty() {
            self.db.merge_session_metadata(
                session_id,
                &json!({ "pass_errors": serde_json::Value::Object(pass_errors) }),
            )?;
        }

        Ok(completed)
    }

    /// Persist one pass run as its extraction result row.
    fn persist_run(&self, session_id: &str, run: &PassRun) -> Result<ExtractionResult> {
        let now = Utc::now();
        let mut result = ExtractionResult {
            id: uuid::Uuid::new_v4().to_string(),
            session_id: session_id.to_string(),
            kind: run.kind,
            payload: run.output.as_ref().map(|o| o.payload.clone()),
            status: run.status,
            signal_score: run.output.as_ref().map(|o| o.signal_score).unwrap_or(0.0),
            error: run.error.clone(),
            created_at: now,
            completed_at: Some(now),
        };
        result.id = self.db.upsert_extraction_result(&result)?;
        Ok(result)
    }

    fn record_parse_metadata(&self, session_id: &str, parsed: &ParsedLog) -> Result<()> {
        let mut patch = json!({
            "log_format": parsed.format.as_str(),
            "total_tool_calls": parsed.tool_call_total,
            "total_files": parsed.distinct_files.len(),
        });
        if let Some(ref dir) = parsed.working_dir {
            patch["working_dir"] = json!(dir);
        }
        if !parsed.todo_items.is_empty() {
            patch["todo_items"] = json!(parsed.todo_items);
        }
        if !parsed.recent_errors.is_empty() {
            patch["recent_errors"] = json!(parsed.recent_errors);
        }
        if !parsed.warnings.is_empty() {
            patch["parse_warnings"] = json!(parsed.warnings);
        }
        self.db.merge_session_metadata(session_id, &patch)
    }

    /// Mark a session failed and tell subscribers. Best-effort: if even the
    /// status write fails there is nothing left to do but log.
    fn fail_session(&self, session_id: &str, reason: &str) {
        match self.db.update_session_status(
            session_id,
            &[SessionStatus::Uploading, SessionStatus::Analyzing],
            SessionStatus::Failed,
        ) {
            Ok(true) => {
                if let Err(e) = self
                    .db
                    .merge_session_metadata(session_id, &json!({ "failure_reason": reason }))
                {
                    tracing::warn!(session_id, error = %e, "Could not record failure reason");
                }
            }
            Ok(false) => {
                tracing::debug!(session_id, "Session already terminal; not marking failed");
            }
            Err(e) => {
                tracing::error!(session_id, error = %e, "Could not mark session failed");
            }
        }

        self.hub.publish(
            session_id,
            PipelineEvent::Error {
                message: reason.to_string(),
            },
        );
    }
}
