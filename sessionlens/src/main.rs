//! sessionlens - analyze AI assistant session logs into ranked insights
//!
//! Uploads a log (or a small set of log files) as a session, runs the
//! analysis pipeline, and streams progress while results and insights land.
//!
//! Uses XDG Base Directory specification for file locations:
//! - Database: $XDG_DATA_HOME/sessionlens/data.db
//! - Logs: $XDG_STATE_HOME/sessionlens/sessionlens.log
//! - Config: $XDG_CONFIG_HOME/sessionlens/config.toml

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use sessionlens_core::pipeline::{
    wait_for_completion, LogSubmission, PipelineCoordinator, PipelineEvent, PipelineLimits,
    PollOptions, PollOutcome, SubmittedFile,
};
use sessionlens_core::{Config, Database, Insight};
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "sessionlens")]
#[command(about = "Analyze AI assistant session logs into ranked insights")]
#[command(version)]
struct Cli {
    /// Database path (defaults to the XDG data directory)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Upload log files as a new session and run the analysis pipeline
    Analyze {
        /// Log files, concatenated into one session (reads stdin if empty)
        files: Vec<PathBuf>,

        /// Request at-rest encryption for the stored session
        #[arg(long)]
        encrypt: bool,

        /// Create the session without running the pipeline
        #[arg(long)]
        no_run: bool,
    },

    /// Show a session's status and metadata
    Show {
        /// Session id returned by analyze
        session_id: String,
    },

    /// List a session's extraction results, oldest first
    Results {
        session_id: String,
    },

    /// List a session's insights, highest signal first
    Insights {
        session_id: String,
    },

    /// Poll a session until it finishes or the attempt budget runs out
    Wait {
        session_id: String,

        /// Attempt ceiling (defaults from config)
        #[arg(long)]
        attempts: Option<u32>,

        /// Delay between attempts in milliseconds (defaults from config)
        #[arg(long)]
        interval_ms: Option<u64>,
    },

    /// Delete sessions past their expiry time
    Purge,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load().context("failed to load configuration")?;

    // Logging goes to a file; stdout stays clean for command output.
    let _log_guard =
        sessionlens_core::logging::init(&config.logging).context("failed to initialize logging")?;

    let db_path = cli.db.clone().unwrap_or_else(Config::database_path);
    tracing::info!(path = %db_path.display(), "Opening database");

    let db = Arc::new(Database::open(&db_path).context("failed to open database")?);
    db.migrate().context("failed to run database migrations")?;

    match cli.command {
        Command::Analyze {
            files,
            encrypt,
            no_run,
        } => analyze(db, &config, files, encrypt, no_run).await,
        Command::Show { session_id } => show(&db, &session_id),
        Command::Results { session_id } => results(&db, &session_id),
        Command::Insights { session_id } => insights(&db, &session_id),
        Command::Wait {
            session_id,
            attempts,
            interval_ms,
        } => wait(&db, &config, &session_id, attempts, interval_ms).await,
        Command::Purge => purge(&db),
    }
}

async fn analyze(
    db: Arc<Database>,
    config: &Config,
    files: Vec<PathBuf>,
    encrypt: bool,
    no_run: bool,
) -> Result<()> {
    let submission = build_submission(files, encrypt)?;

    let limits = PipelineLimits {
        max_input_files: config.pipeline.max_input_files,
        session_ttl_hours: config.pipeline.session_ttl_hours,
        event_channel_capacity: config.pipeline.event_channel_capacity,
    };
    let coordinator = Arc::new(PipelineCoordinator::new(db).with_limits(limits));

    let ticket = coordinator
        .create_session(submission)
        .context("failed to create session")?;

    println!("Session: {}", ticket.id);
    println!("Expires: {}", ticket.expires_at.to_rfc3339());

    if no_run {
        println!("Created without analysis (--no-run)");
        return Ok(());
    }

    // Subscribe before dispatching so no events are missed.
    let mut rx = coordinator.subscribe(&ticket.id);
    let pipeline = {
        let coordinator = coordinator.clone();
        let id = ticket.id.clone();
        tokio::spawn(async move { coordinator.analyze(&id).await })
    };

    let bar = ProgressBar::new(100);
    bar.set_style(
        ProgressStyle::with_template("[{bar:40.cyan/blue}] {pos:>3}% {msg}")
            .context("bad progress template")?
            .progress_chars("=> "),
    );

    let mut insight_count = 0usize;
    loop {
        let event = match rx.recv().await {
            Ok(event) => event,
            Err(e) => {
                // losing the channel never loses results; fall back to the store
                tracing::warn!(error = %e, "Event stream interrupted");
                break;
            }
        };

        match event {
            PipelineEvent::Status { progress, message } => {
                bar.set_position(progress as u64);
                bar.set_message(message);
            }
            PipelineEvent::AnalysisComplete { analysis } => {
                bar.println(format!(
                    "  analysis {:<17} signal {:.2}",
                    analysis.kind, analysis.signal_score
                ));
            }
            PipelineEvent::Insight { insight } => {
                insight_count += 1;
                bar.println(format_insight(insight_count, &insight));
            }
            PipelineEvent::Complete { message } => {
                bar.set_position(100);
                bar.finish_with_message(message);
                break;
            }
            PipelineEvent::Error { message } => {
                bar.abandon_with_message(format!("analysis failed: {}", message));
                break;
            }
        }
    }

    pipeline.await.context("pipeline task panicked")??;

    if insight_count == 0 {
        println!("No insights for this session.");
    } else {
        println!("{} insight(s) generated.", insight_count);
    }
    println!("Fetch later with: sessionlens insights {}", ticket.id);
    Ok(())
}

fn build_submission(files: Vec<PathBuf>, encrypt: bool) -> Result<LogSubmission> {
    if files.is_empty() {
        let mut content = String::new();
        std::io::stdin()
            .read_to_string(&mut content)
            .context("failed to read log from stdin")?;
        if content.trim().is_empty() {
            bail!("no input: pass log files or pipe a log to stdin");
        }
        return Ok(LogSubmission::from_text(content).with_encryption(encrypt));
    }

    let mut submitted = Vec::new();
    for path in files {
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        submitted.push(SubmittedFile {
            name: path.display().to_string(),
            content,
        });
    }

    Ok(LogSubmission {
        files: submitted,
        encryption_requested: encrypt,
    })
}

fn show(db: &Database, session_id: &str) -> Result<()> {
    let session = db
        .get_session(session_id)?
        .with_context(|| format!("session not found: {}", session_id))?;

    println!("Session:  {}", session.id);
    println!("Status:   {}", session.status);
    println!("Created:  {}", session.created_at.to_rfc3339());
    println!("Expires:  {}", session.expires_at.to_rfc3339());
    println!("Log size: {} bytes", session.raw_log.len());
    println!(
        "Metadata: {}",
        serde_json::to_string_pretty(&session.metadata)?
    );
    Ok(())
}

fn results(db: &Database, session_id: &str) -> Result<()> {
    let results = db.list_extraction_results(session_id)?;
    if results.is_empty() {
        println!("No extraction results for session {}", session_id);
        return Ok(());
    }

    for result in results {
        println!(
            "{:<17} {:<9} signal {:.2}  {}",
            result.kind.to_string(),
            result.status.as_str(),
            result.signal_score,
            result
                .completed_at
                .map(|t| t.to_rfc3339())
                .unwrap_or_default()
        );
        if let Some(error) = result.error {
            println!("  error: {}", error);
        }
        if let Some(payload) = result.payload {
            println!("  {}", serde_json::to_string(&payload)?);
        }
    }
    Ok(())
}

fn insights(db: &Database, session_id: &str) -> Result<()> {
    let insights = db.list_insights(session_id)?;
    if insights.is_empty() {
        println!("No insights for session {}", session_id);
        return Ok(());
    }

    for (i, insight) in insights.iter().enumerate() {
        println!("{}", format_insight(i + 1, insight));
    }
    Ok(())
}

fn format_insight(index: usize, insight: &Insight) -> String {
    format!(
        "{}. [{}] (signal {:.2}, confidence {:.2})\n   {}",
        index, insight.kind, insight.signal_score, insight.confidence, insight.text
    )
}

async fn wait(
    db: &Database,
    config: &Config,
    session_id: &str,
    attempts: Option<u32>,
    interval_ms: Option<u64>,
) -> Result<()> {
    let options = PollOptions {
        max_attempts: attempts.unwrap_or(config.poll.max_attempts),
        interval: Duration::from_millis(interval_ms.unwrap_or(config.poll.interval_ms)),
    };

    println!(
        "Polling session {} (up to {} attempts)...",
        session_id, options.max_attempts
    );

    match wait_for_completion(db, session_id, &options).await? {
        PollOutcome::Completed { insights, .. } => {
            println!("Session completed with {} insight(s).", insights.len());
            for (i, insight) in insights.iter().enumerate() {
                println!("{}", format_insight(i + 1, insight));
            }
        }
        PollOutcome::Failed { reason } => {
            bail!("session failed: {}", reason);
        }
        PollOutcome::TimedOut { last_status } => {
            // a timeout is not a failure; the pipeline may still finish
            println!(
                "Timed out while session was {}; it may still complete later.",
                last_status
            );
        }
    }
    Ok(())
}

fn purge(db: &Database) -> Result<()> {
    let removed = db.purge_expired(chrono::Utc::now())?;
    println!("Purged {} expired session(s)", removed);
    Ok(())
}
