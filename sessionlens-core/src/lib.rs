//! # sessionlens-core
//!
//! Core library for sessionlens - an AI session-log analyzer.
//!
//! This library provides:
//! - Secret redaction for raw log text
//! - A schema-tolerant log parser producing normalized events
//! - Independent, concurrently-runnable extraction passes
//! - A rule-based insight generator with signal-score ranking
//! - A per-session pipeline orchestrator with progress streaming
//! - SQLite storage for sessions, results, insights, and comments
//!
//! ## Pipeline
//!
//! Data flows in one direction per session:
//!
//! ```text
//! raw log → redactor → parser → {extraction passes} → insight generator
//!                                       │                    │
//!                                       ▼                    ▼
//!                                   database ◄──── ranked insights
//!                                       │
//!                                       ▼
//!                               subscriber stream
//! ```
//!
//! ## Example
//!
//! ```rust,no_run
//! use sessionlens_core::pipeline::{LogSubmission, PipelineCoordinator};
//! use sessionlens_core::{Config, Database};
//! use std::sync::Arc;
//!
//! # async fn run() -> sessionlens_core::Result<()> {
//! let db = Arc::new(Database::open(&Config::database_path())?);
//! db.migrate()?;
//!
//! let coordinator = PipelineCoordinator::new(db);
//! let ticket = coordinator.create_session(LogSubmission::from_text("<invoke name=\"Read\">"))?;
//! coordinator.analyze(&ticket.id).await?;
//! # Ok(())
//! # }
//! ```

// Re-export commonly used items at the crate root
pub use config::Config;
pub use error::{Error, Result};
pub use parse::{parse_log, LogFormat, ParsedLog};
pub use pipeline::PipelineCoordinator;
pub use redact::redact;
pub use store::Database;
pub use types::*;

// Public modules
pub mod config;
pub mod error;
pub mod insight;
pub mod logging;
pub mod parse;
pub mod passes;
pub mod pipeline;
pub mod redact;
pub mod store;
pub mod types;
