//! Integration tests for the sessionlens pipeline
//!
//! These drive the full coordinator over an in-memory database: session
//! creation with redaction, concurrent pass execution, partial failure,
//! insight ranking, progress streaming, and the monotonic status contract.

use sessionlens_core::error::Error;
use sessionlens_core::insight::CompletedPass;
use sessionlens_core::parse::ParsedLog;
use sessionlens_core::passes::{
    create_default_engine, ExtractionPass, PassEngine, PassOutput,
};
use sessionlens_core::pipeline::{
    wait_for_completion, LogSubmission, PipelineCoordinator, PipelineEvent, PollOptions,
    PollOutcome,
};
use sessionlens_core::{
    Database, InsightKind, PassKind, PassStatus, SessionStatus,
};
use std::sync::Arc;
use std::time::Duration;

fn open_coordinator() -> PipelineCoordinator {
    let db = Database::open_in_memory().expect("open in-memory db");
    db.migrate().expect("migrate schema");
    PipelineCoordinator::new(Arc::new(db))
}

/// A log that exercises every rule: a dominant tool, plenty of files in one
/// co-occurrence window, and a secret to redact.
fn busy_log() -> String {
    let mut raw = String::new();
    raw.push_str("Working Directory: /home/dev/project\n");
    raw.push_str("api_key: sk-abcdefghij1234567890XYZ\n");
    for _ in 0..6 {
        raw.push_str("<invoke name=\"Read\">\n");
    }
    for i in 0..12 {
        raw.push_str(&format!("\"/src/module{}.rs\" ", i));
    }
    raw.push('\n');
    raw
}

async fn drain_until_terminal(
    rx: &mut tokio::sync::broadcast::Receiver<PipelineEvent>,
) -> Vec<PipelineEvent> {
    let mut events = Vec::new();
    loop {
        let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("event stream stalled")
            .expect("event stream closed early");
        let terminal = event.is_terminal();
        events.push(event);
        if terminal {
            return events;
        }
    }
}

#[tokio::test]
async fn full_pipeline_completes_and_streams() {
    let coordinator = open_coordinator();
    let db = coordinator.database();

    let ticket = coordinator
        .create_session(LogSubmission::from_text(busy_log()))
        .unwrap();
    assert_eq!(ticket.status, SessionStatus::Uploading);
    assert_eq!(ticket.cost_estimate, 0.0);

    let mut rx = coordinator.subscribe(&ticket.id);
    coordinator.analyze(&ticket.id).await.unwrap();
    let events = drain_until_terminal(&mut rx).await;

    // terminal success, and only as the last event
    assert!(matches!(events.last(), Some(PipelineEvent::Complete { .. })));
    assert!(events.iter().any(|e| matches!(e, PipelineEvent::Status { .. })));

    let analyses = events
        .iter()
        .filter(|e| matches!(e, PipelineEvent::AnalysisComplete { .. }))
        .count();
    // all four passes emit for this log (12 files co-occur, so the graph exists)
    assert_eq!(analyses, 4);

    let insight_events = events
        .iter()
        .filter(|e| matches!(e, PipelineEvent::Insight { .. }))
        .count();
    assert!(insight_events >= 1);

    let session = db.get_session(&ticket.id).unwrap().unwrap();
    assert_eq!(session.status, SessionStatus::Completed);
    // the secret never reaches the redacted form the passes read
    assert!(session.redacted_log.contains("[REDACTED_OPENAI_API_KEY]"));
    assert!(!session.redacted_log.contains("sk-abcdefghij"));
    assert_eq!(session.metadata["working_dir"], "/home/dev/project");
    assert_eq!(session.metadata["total_tool_calls"], 6);

    // stored results, oldest first, one per pass
    let results = db.list_extraction_results(&ticket.id).unwrap();
    assert_eq!(results.len(), 4);
    assert!(results.iter().all(|r| r.status == PassStatus::Completed));

    // stored insights come back highest score first
    let insights = db.list_insights(&ticket.id).unwrap();
    assert_eq!(insights.len(), insight_events);
    assert!(insights.len() <= 5);
    for pair in insights.windows(2) {
        assert!(pair[0].signal_score >= pair[1].signal_score);
    }
    // delivered over the live subscription, so flagged as shown
    assert!(insights.iter().all(|i| i.shown));

    // the six-Read rule fired and points at its source result
    let optimization = insights
        .iter()
        .find(|i| i.kind == InsightKind::Optimization)
        .expect("repetition insight expected");
    assert!(optimization.text.contains("Read"));
    assert!(optimization.text.contains("6 times"));
    let source_id = optimization.analysis_id.as_deref().unwrap();
    assert!(results.iter().any(|r| r.id == source_id));
}

struct ExplodingPass;

impl ExtractionPass for ExplodingPass {
    fn kind(&self) -> PassKind {
        PassKind::DependencyGraph
    }

    fn run(&self, _log: &ParsedLog) -> sessionlens_core::Result<Option<PassOutput>> {
        Err(Error::Pass {
            pass: "dependency_graph".to_string(),
            message: "deliberately raised".to_string(),
        })
    }
}

#[tokio::test]
async fn failing_pass_does_not_fail_the_session() {
    let mut engine = PassEngine::new();
    engine.register(Arc::new(
        sessionlens_core::passes::tool_usage::ToolUsagePass,
    ));
    engine.register(Arc::new(
        sessionlens_core::passes::file_refs::FileReferencePass,
    ));
    engine.register(Arc::new(ExplodingPass));

    let coordinator = open_coordinator().with_engine(engine);
    let db = coordinator.database();

    let ticket = coordinator
        .create_session(LogSubmission::from_text(
            "<invoke name=\"Read\"> \"/src/a.rs\"",
        ))
        .unwrap();
    coordinator.analyze(&ticket.id).await.unwrap();

    // session completed despite the failed pass
    let session = db.get_session(&ticket.id).unwrap().unwrap();
    assert_eq!(session.status, SessionStatus::Completed);
    assert_eq!(
        session.metadata["pass_errors"]["dependency_graph"],
        "extraction pass dependency_graph failed: deliberately raised"
    );

    let results = db.list_extraction_results(&ticket.id).unwrap();
    assert_eq!(results.len(), 3);

    let failed = results
        .iter()
        .find(|r| r.kind == PassKind::DependencyGraph)
        .unwrap();
    assert_eq!(failed.status, PassStatus::Failed);
    assert!(failed.payload.is_none());
    assert_eq!(failed.signal_score, 0.0);
    assert!(failed.error.as_deref().unwrap().contains("deliberately raised"));

    // siblings are unaffected
    for kind in [PassKind::ToolCalls, PassKind::FileStructure] {
        let sibling = results.iter().find(|r| r.kind == kind).unwrap();
        assert_eq!(sibling.status, PassStatus::Completed);
        assert!(sibling.payload.is_some());
    }
}

/// Holds the pipeline open long enough to observe the concurrency contract.
struct SlowPass;

impl ExtractionPass for SlowPass {
    fn kind(&self) -> PassKind {
        PassKind::Complexity
    }

    fn run(&self, _log: &ParsedLog) -> sessionlens_core::Result<Option<PassOutput>> {
        std::thread::sleep(Duration::from_millis(300));
        Ok(None)
    }
}

#[tokio::test]
async fn concurrent_analysis_of_same_session_is_rejected() {
    let mut engine = PassEngine::new();
    engine.register(Arc::new(SlowPass));

    let coordinator = Arc::new(open_coordinator().with_engine(engine));
    let ticket = coordinator
        .create_session(LogSubmission::from_text("quiet log"))
        .unwrap();

    let background = {
        let coordinator = coordinator.clone();
        let id = ticket.id.clone();
        tokio::spawn(async move { coordinator.analyze(&id).await })
    };

    // let the first run take the slot
    tokio::time::sleep(Duration::from_millis(50)).await;

    let second = coordinator.analyze(&ticket.id).await;
    assert!(matches!(second, Err(Error::AnalysisInProgress(_))));

    background.await.unwrap().unwrap();
    assert_eq!(
        coordinator
            .database()
            .get_session(&ticket.id)
            .unwrap()
            .unwrap()
            .status,
        SessionStatus::Completed
    );
}

#[tokio::test]
async fn terminal_session_never_reenters_analyzing() {
    let coordinator = open_coordinator();
    let db = coordinator.database();

    let ticket = coordinator
        .create_session(LogSubmission::from_text("<invoke name=\"Bash\">"))
        .unwrap();
    coordinator.analyze(&ticket.id).await.unwrap();
    assert_eq!(
        db.get_session(&ticket.id).unwrap().unwrap().status,
        SessionStatus::Completed
    );

    // a second run on the same id is refused and the status stands
    let again = coordinator.analyze(&ticket.id).await;
    assert!(matches!(again, Err(Error::InvalidStatus { .. })));
    assert_eq!(
        db.get_session(&ticket.id).unwrap().unwrap().status,
        SessionStatus::Completed
    );
}

#[tokio::test]
async fn unknown_session_fails_cleanly() {
    let coordinator = open_coordinator();
    let result = coordinator.analyze("no-such-session").await;
    assert!(matches!(result, Err(Error::SessionNotFound(_))));
}

#[tokio::test]
async fn submission_file_cap_drops_extras_with_warning() {
    use sessionlens_core::pipeline::{PipelineLimits, SubmittedFile};

    let limits = PipelineLimits {
        max_input_files: 2,
        ..PipelineLimits::default()
    };
    let coordinator = open_coordinator().with_limits(limits);
    let db = coordinator.database();

    let files: Vec<SubmittedFile> = (0..4)
        .map(|i| SubmittedFile {
            name: format!("part{}.jsonl", i),
            content: format!("<invoke name=\"Tool{}\">", i),
        })
        .collect();
    let ticket = coordinator
        .create_session(LogSubmission {
            files,
            encryption_requested: false,
        })
        .unwrap();

    let session = db.get_session(&ticket.id).unwrap().unwrap();
    assert_eq!(session.metadata["input_files"], 2);
    assert_eq!(session.metadata["dropped_files"][0], "part2.jsonl");
    assert_eq!(session.metadata["dropped_files"][1], "part3.jsonl");
    // dropped content never made it into the stored log
    assert!(!session.raw_log.contains("Tool2"));
}

#[tokio::test]
async fn polling_observes_completion_after_the_fact() {
    let coordinator = open_coordinator();
    let db = coordinator.database();

    let raw = r#"<invoke name="Read">"#.repeat(6);
    let ticket = coordinator
        .create_session(LogSubmission::from_text(raw))
        .unwrap();
    coordinator.analyze(&ticket.id).await.unwrap();

    // no subscription existed; results are still durably queryable
    let outcome = wait_for_completion(
        &db,
        &ticket.id,
        &PollOptions {
            max_attempts: 3,
            interval: Duration::from_millis(1),
        },
    )
    .await
    .unwrap();

    match outcome {
        PollOutcome::Completed { insights, .. } => {
            assert_eq!(insights.len(), 1);
            assert_eq!(insights[0].kind, InsightKind::Optimization);
            // nobody subscribed, so nothing was marked shown
            assert!(!insights[0].shown);
        }
        other => panic!("expected completion, got {:?}", other),
    }
}

#[tokio::test]
async fn file_backed_database_survives_reopen() {
    let tmp = tempfile::TempDir::new().unwrap();
    let db_path = tmp.path().join("nested/dir/data.db");

    let ticket = {
        let db = Arc::new(Database::open(&db_path).unwrap());
        db.migrate().unwrap();
        let coordinator = PipelineCoordinator::new(db);
        let ticket = coordinator
            .create_session(LogSubmission::from_text(
                r#"<invoke name="Read">"#.repeat(6),
            ))
            .unwrap();
        coordinator.analyze(&ticket.id).await.unwrap();
        ticket
    };

    // a fresh handle sees everything the pipeline persisted
    let db = Database::open(&db_path).unwrap();
    db.migrate().unwrap();

    let session = db.get_session(&ticket.id).unwrap().unwrap();
    assert_eq!(session.status, SessionStatus::Completed);
    assert_eq!(db.list_extraction_results(&ticket.id).unwrap().len(), 3);
    assert_eq!(db.list_insights(&ticket.id).unwrap().len(), 1);
}

#[test]
fn default_engine_covers_all_pass_kinds() {
    let engine = create_default_engine();
    let kinds = engine.kinds();
    for kind in [
        PassKind::ToolCalls,
        PassKind::FileStructure,
        PassKind::DependencyGraph,
        PassKind::Complexity,
    ] {
        assert!(kinds.contains(&kind));
    }
}

#[test]
fn generator_is_usable_in_isolation() {
    // traceability requirement: rules are testable without the pipeline
    let parsed = sessionlens_core::parse_log(&r#"<invoke name="Grep">"#.repeat(7));
    let engine = create_default_engine();
    let completed: Vec<CompletedPass> = engine
        .run_all(&parsed)
        .into_iter()
        .filter_map(|run| {
            run.output.map(|o| CompletedPass {
                result_id: None,
                payload: o.payload,
            })
        })
        .collect();

    let drafts = sessionlens_core::insight::InsightGenerator::new().generate(&parsed, &completed);
    assert_eq!(drafts.len(), 1);
    assert_eq!(drafts[0].kind, InsightKind::Optimization);
    assert!(drafts[0].analysis_id.is_none());
}
