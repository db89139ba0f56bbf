//! Extraction passes
//!
//! Each pass is a pure function of the parsed event sequence to a structured
//! [`PassPayload`] plus a signal score. Passes share no mutable state, so the
//! pipeline may run them concurrently over one `Arc<ParsedLog>`.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐     ┌──────────────────────────────────────┐
//! │  ParsedLog   │ ──► │              PassEngine              │
//! └──────────────┘     │  ├─ ToolUsagePass    (tool_calls)    │
//!                      │  ├─ FileReferencePass(file_structure)│
//!                      │  ├─ DependencyGraphPass              │
//!                      │  └─ ComplexityPass                   │
//!                      └──────────────────────────────────────┘
//!                                      │
//!                                      ▼
//!                          Vec<PassRun> (per-pass isolation)
//! ```
//!
//! ## Failure isolation
//!
//! A pass returning `Err` is recorded as a [`PassStatus::Failed`] run with
//! the error captured; sibling passes are unaffected and the session still
//! completes. Only infrastructure failures (parsing, persistence) are fatal
//! to a pipeline, and those never originate here.

pub mod complexity;
pub mod dep_graph;
pub mod file_refs;
pub mod tool_usage;

use crate::error::Result;
use crate::parse::ParsedLog;
use crate::types::{PassKind, PassPayload, PassStatus};
use std::sync::Arc;
use std::time::Instant;

/// Successful output of one pass.
#[derive(Debug, Clone)]
pub struct PassOutput {
    /// Structured, exhaustively-typed payload
    pub payload: PassPayload,
    /// Worth-surfacing score in `[0, 1]`
    pub signal_score: f64,
}

impl PassOutput {
    pub fn new(payload: PassPayload, signal_score: f64) -> Self {
        Self {
            payload,
            signal_score,
        }
    }
}

/// Trait implemented by all extraction passes.
///
/// Passes must be:
/// - **Pure**: output depends only on the parsed log
/// - **Deterministic**: same input, same output
/// - **Isolated**: no shared mutable state; safe to run concurrently
///
/// `run` returns `Ok(None)` when the pass has nothing to emit for this log
/// (e.g. a dependency graph with no edges); that is not a failure.
pub trait ExtractionPass: Send + Sync {
    /// Which result kind this pass produces
    fn kind(&self) -> PassKind;

    /// Analyze the parsed log.
    fn run(&self, log: &ParsedLog) -> Result<Option<PassOutput>>;
}

/// Terminal outcome of running one pass, with failure captured in-band.
#[derive(Debug, Clone)]
pub struct PassRun {
    pub kind: PassKind,
    pub status: PassStatus,
    /// Present when the pass completed and emitted a payload
    pub output: Option<PassOutput>,
    /// Present when the pass failed
    pub error: Option<String>,
    pub duration_ms: i64,
}

impl PassRun {
    /// Whether the pass completed and produced a payload worth persisting.
    pub fn emitted(&self) -> bool {
        self.status == PassStatus::Completed && self.output.is_some()
    }
}

/// Registry of extraction passes.
///
/// Passes are held behind `Arc` so the pipeline can hand clones to
/// concurrently running tasks.
pub struct PassEngine {
    passes: Vec<Arc<dyn ExtractionPass>>,
}

impl PassEngine {
    /// Create an empty engine.
    pub fn new() -> Self {
        Self { passes: Vec::new() }
    }

    /// Register a pass with the engine.
    pub fn register(&mut self, pass: Arc<dyn ExtractionPass>) {
        tracing::info!(pass = %pass.kind(), "Registered extraction pass");
        self.passes.push(pass);
    }

    /// The registered passes, in registration order.
    pub fn passes(&self) -> &[Arc<dyn ExtractionPass>] {
        &self.passes
    }

    /// Kinds of all registered passes.
    pub fn kinds(&self) -> Vec<PassKind> {
        self.passes.iter().map(|p| p.kind()).collect()
    }

    /// Run one pass with failure isolation and timing.
    ///
    /// Never returns `Err`: a failing pass is reported through the run's
    /// own status so siblings and the session are unaffected.
    pub fn run_pass(pass: &dyn ExtractionPass, log: &ParsedLog) -> PassRun {
        let kind = pass.kind();
        let start = Instant::now();

        tracing::debug!(pass = %kind, events = log.events.len(), "Running extraction pass");

        match pass.run(log) {
            Ok(output) => {
                let duration_ms = start.elapsed().as_millis() as i64;
                if output.is_none() {
                    tracing::debug!(pass = %kind, "Pass completed with nothing to emit");
                }
                PassRun {
                    kind,
                    status: PassStatus::Completed,
                    output,
                    error: None,
                    duration_ms,
                }
            }
            Err(e) => {
                let duration_ms = start.elapsed().as_millis() as i64;
                tracing::warn!(pass = %kind, error = %e, "Extraction pass failed");
                PassRun {
                    kind,
                    status: PassStatus::Failed,
                    output: None,
                    error: Some(e.to_string()),
                    duration_ms,
                }
            }
        }
    }

    /// Run every registered pass sequentially.
    ///
    /// The pipeline prefers concurrent dispatch; this is the synchronous
    /// path used by tests and one-shot tooling. Failed passes do not stop
    /// the others.
    pub fn run_all(&self, log: &ParsedLog) -> Vec<PassRun> {
        self.passes
            .iter()
            .map(|p| Self::run_pass(p.as_ref(), log))
            .collect()
    }
}

impl Default for PassEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Create an engine with all built-in passes registered.
pub fn create_default_engine() -> PassEngine {
    let mut engine = PassEngine::new();
    engine.register(Arc::new(tool_usage::ToolUsagePass));
    engine.register(Arc::new(file_refs::FileReferencePass));
    engine.register(Arc::new(dep_graph::DependencyGraphPass));
    engine.register(Arc::new(complexity::ComplexityPass));
    engine
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::parse::parse_log;

    struct FailingPass;

    impl ExtractionPass for FailingPass {
        fn kind(&self) -> PassKind {
            PassKind::Complexity
        }

        fn run(&self, _log: &ParsedLog) -> Result<Option<PassOutput>> {
            Err(Error::Pass {
                pass: "complexity".to_string(),
                message: "deliberate failure".to_string(),
            })
        }
    }

    #[test]
    fn default_engine_has_all_passes() {
        let engine = create_default_engine();
        let kinds = engine.kinds();
        assert_eq!(kinds.len(), 4);
        assert!(kinds.contains(&PassKind::ToolCalls));
        assert!(kinds.contains(&PassKind::FileStructure));
        assert!(kinds.contains(&PassKind::DependencyGraph));
        assert!(kinds.contains(&PassKind::Complexity));
    }

    #[test]
    fn failing_pass_is_isolated() {
        let mut engine = PassEngine::new();
        engine.register(Arc::new(tool_usage::ToolUsagePass));
        engine.register(Arc::new(FailingPass));

        let log = parse_log("<invoke name=\"Read\">");
        let runs = engine.run_all(&log);

        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].status, PassStatus::Completed);
        assert!(runs[0].emitted());

        assert_eq!(runs[1].status, PassStatus::Failed);
        assert!(!runs[1].emitted());
        assert!(runs[1].error.as_deref().unwrap().contains("deliberate failure"));
    }
}
