//! Core domain types for sessionlens
//!
//! These types form the canonical data model shared by the parser, the
//! extraction passes, the insight generator, and the storage layer.
//!
//! ## Terminology
//!
//! | Term | Definition |
//! |------|------------|
//! | **Session** | One uploaded log and everything derived from it |
//! | **LogEvent** | A normalized unit parsed from the raw log (tool invocation or file reference) |
//! | **ExtractionResult** | The output of one analysis pass over a session's events |
//! | **Insight** | A ranked, human-readable finding derived from extraction output |
//! | **Signal score** | A `[0, 1]` value used for ranking; not a probability |
//!
//! Payloads that cross the parser/pass boundary are closed tagged enums
//! ([`LogEvent`], [`PassPayload`]) so downstream consumers receive
//! exhaustively-typed data instead of ad hoc JSON maps.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================
// Sessions
// ============================================

/// Lifecycle status of a session.
///
/// Transitions are monotonic: `uploading → analyzing → completed | failed`.
/// A terminal session never re-enters `analyzing`; re-analysis requires a
/// fresh session id. The store enforces this with compare-and-set updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Raw log received, redaction/persistence in progress
    Uploading,
    /// Pipeline is running
    Analyzing,
    /// Pipeline finished (possibly with individual pass failures)
    Completed,
    /// Pipeline aborted on a fatal error
    Failed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Uploading => "uploading",
            SessionStatus::Analyzing => "analyzing",
            SessionStatus::Completed => "completed",
            SessionStatus::Failed => "failed",
        }
    }

    /// Whether this status is terminal.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStatus::Completed | SessionStatus::Failed)
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for SessionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "uploading" => Ok(SessionStatus::Uploading),
            "analyzing" => Ok(SessionStatus::Analyzing),
            "completed" => Ok(SessionStatus::Completed),
            "failed" => Ok(SessionStatus::Failed),
            _ => Err(format!("unknown session status: {}", s)),
        }
    }
}

/// One uploaded log and its analysis lifecycle.
///
/// The pipeline coordinator is the sole mutator of `status` while a session
/// is being analyzed; everything else is written once at creation or appended
/// into `metadata`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Opaque URL-safe identifier (UUID v4)
    pub id: String,
    /// Raw log text as submitted
    pub raw_log: String,
    /// Log text after secret redaction; the only form the pipeline reads
    pub redacted_log: String,
    /// Lifecycle status
    pub status: SessionStatus,
    /// Client asked for at-rest encryption (recorded, not interpreted here)
    pub encryption_requested: bool,
    /// When the session was created
    pub created_at: DateTime<Utc>,
    /// When the session expires (24h after creation by default)
    pub expires_at: DateTime<Utc>,
    /// Free-form metadata: redaction summary, parse counts, warnings,
    /// per-pass errors, failure reason
    pub metadata: serde_json::Value,
}

// ============================================
// Log events
// ============================================

/// A normalized unit extracted from a raw log.
///
/// Events are immutable once parsed and ordered by position in the log.
/// Tool invocations may repeat (N calls yield N events); file references are
/// deduplicated to their first occurrence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LogEvent {
    /// A tool call detected via the invocation marker
    ToolInvocation {
        /// Tool name from the marker's `name` attribute
        name: String,
        /// Running index of this invocation within the log (0-based)
        ordinal: usize,
    },
    /// A quoted path-like string referencing a file
    FileReference {
        /// The path as it appeared in the log
        path: String,
    },
}

impl LogEvent {
    /// Tool name if this is a tool invocation.
    pub fn tool_name(&self) -> Option<&str> {
        match self {
            LogEvent::ToolInvocation { name, .. } => Some(name),
            LogEvent::FileReference { .. } => None,
        }
    }

    pub fn is_tool_invocation(&self) -> bool {
        matches!(self, LogEvent::ToolInvocation { .. })
    }
}

// ============================================
// Extraction passes
// ============================================

/// The analysis passes the pipeline runs over a parsed log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PassKind {
    ToolCalls,
    FileStructure,
    DependencyGraph,
    Complexity,
}

impl PassKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PassKind::ToolCalls => "tool_calls",
            PassKind::FileStructure => "file_structure",
            PassKind::DependencyGraph => "dependency_graph",
            PassKind::Complexity => "complexity",
        }
    }
}

impl std::fmt::Display for PassKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for PassKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tool_calls" => Ok(PassKind::ToolCalls),
            "file_structure" => Ok(PassKind::FileStructure),
            "dependency_graph" => Ok(PassKind::DependencyGraph),
            "complexity" => Ok(PassKind::Complexity),
            _ => Err(format!("unknown pass kind: {}", s)),
        }
    }
}

/// Status of one extraction pass for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PassStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl PassStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PassStatus::Pending => "pending",
            PassStatus::Running => "running",
            PassStatus::Completed => "completed",
            PassStatus::Failed => "failed",
        }
    }
}

impl std::str::FromStr for PassStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(PassStatus::Pending),
            "running" => Ok(PassStatus::Running),
            "completed" => Ok(PassStatus::Completed),
            "failed" => Ok(PassStatus::Failed),
            _ => Err(format!("unknown pass status: {}", s)),
        }
    }
}

/// Tool name with its invocation count, in first-encountered order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCount {
    pub name: String,
    pub count: u64,
}

/// A node in the dependency graph (a referenced file).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphNode {
    /// Full path, unique within the graph
    pub id: String,
    /// File name component, for display
    pub label: String,
}

/// An undirected co-occurrence edge between two files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphEdge {
    pub from: String,
    pub to: String,
}

/// Structured output of one extraction pass.
///
/// A closed set: each pass kind has exactly one payload variant, so the
/// insight generator and the storage layer never see untyped maps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PassPayload {
    ToolCalls {
        /// Total tool invocations in the log
        total_calls: u64,
        /// Per-tool counts, first-encountered order
        usage: Vec<ToolCount>,
        /// Most-used tool; ties break toward the first encountered
        most_used: Option<String>,
        /// Names of the last 20 invocations, in log order
        recent: Vec<String>,
    },
    FileStructure {
        /// Distinct referenced files in the log
        total_distinct: u64,
        /// First 20 distinct files, first-seen order
        files: Vec<String>,
    },
    DependencyGraph {
        nodes: Vec<GraphNode>,
        edges: Vec<GraphEdge>,
    },
    Complexity {
        total_events: u64,
        tool_invocations: u64,
        distinct_tools: u64,
        /// Activity density in `[0, 1]`; feeds the insight generator
        density: f64,
    },
}

impl PassPayload {
    /// The pass kind this payload belongs to.
    pub fn kind(&self) -> PassKind {
        match self {
            PassPayload::ToolCalls { .. } => PassKind::ToolCalls,
            PassPayload::FileStructure { .. } => PassKind::FileStructure,
            PassPayload::DependencyGraph { .. } => PassKind::DependencyGraph,
            PassPayload::Complexity { .. } => PassKind::Complexity,
        }
    }
}

/// The persisted outcome of one pass run for a session.
///
/// One row per (session, pass kind); a retried pass replaces its prior
/// result. A failed pass keeps `payload = None` and records the error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionResult {
    /// Opaque identifier (UUID v4)
    pub id: String,
    /// Session this result belongs to
    pub session_id: String,
    /// Which pass produced it
    pub kind: PassKind,
    /// Structured payload; `None` when the pass failed
    pub payload: Option<PassPayload>,
    /// Outcome status
    pub status: PassStatus,
    /// How much this result is worth surfacing, in `[0, 1]`
    pub signal_score: f64,
    /// Error message when `status == Failed`
    pub error: Option<String>,
    /// When the row was created
    pub created_at: DateTime<Utc>,
    /// When the pass reached a terminal status
    pub completed_at: Option<DateTime<Utc>>,
}

// ============================================
// Insights
// ============================================

/// Category of an insight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsightKind {
    NextStep,
    CodeIssue,
    Architecture,
    Optimization,
}

impl InsightKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            InsightKind::NextStep => "next_step",
            InsightKind::CodeIssue => "code_issue",
            InsightKind::Architecture => "architecture",
            InsightKind::Optimization => "optimization",
        }
    }
}

impl std::fmt::Display for InsightKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for InsightKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "next_step" => Ok(InsightKind::NextStep),
            "code_issue" => Ok(InsightKind::CodeIssue),
            "architecture" => Ok(InsightKind::Architecture),
            "optimization" => Ok(InsightKind::Optimization),
            _ => Err(format!("unknown insight kind: {}", s)),
        }
    }
}

/// A short natural-language finding derived from extraction output.
///
/// Insights are append-only per session; after creation only the `shown`
/// flag may change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Insight {
    /// Opaque identifier (UUID v4)
    pub id: String,
    /// Session this insight belongs to
    pub session_id: String,
    /// Source ExtractionResult, when the insight is traceable to exactly one
    /// pass; `None` for insights derived from raw event counts
    pub analysis_id: Option<String>,
    /// The finding, 2-3 sentences
    pub text: String,
    /// Category
    pub kind: InsightKind,
    /// Ranking score in `[0, 1]`
    pub signal_score: f64,
    /// Confidence in `[0, 1]`
    pub confidence: f64,
    /// Optional chart payload for the client
    pub visualization: Option<serde_json::Value>,
    /// Whether this insight has been delivered to a subscriber
    pub shown: bool,
    /// When the insight was created
    pub created_at: DateTime<Utc>,
}

// ============================================
// User comments
// ============================================

/// A client-submitted note attached to a session or a specific insight.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserComment {
    pub id: String,
    pub session_id: String,
    /// Insight the comment refers to, if any
    pub insight_id: Option<String>,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_status_round_trip() {
        for status in [
            SessionStatus::Uploading,
            SessionStatus::Analyzing,
            SessionStatus::Completed,
            SessionStatus::Failed,
        ] {
            let parsed: SessionStatus = status.as_str().parse().unwrap();
            assert_eq!(parsed, status);
        }
        assert!("bogus".parse::<SessionStatus>().is_err());
    }

    #[test]
    fn terminal_statuses() {
        assert!(!SessionStatus::Uploading.is_terminal());
        assert!(!SessionStatus::Analyzing.is_terminal());
        assert!(SessionStatus::Completed.is_terminal());
        assert!(SessionStatus::Failed.is_terminal());
    }

    #[test]
    fn pass_kind_round_trip() {
        for kind in [
            PassKind::ToolCalls,
            PassKind::FileStructure,
            PassKind::DependencyGraph,
            PassKind::Complexity,
        ] {
            let parsed: PassKind = kind.as_str().parse().unwrap();
            assert_eq!(parsed, kind);
        }
    }

    #[test]
    fn payload_kind_matches_variant() {
        let payload = PassPayload::ToolCalls {
            total_calls: 3,
            usage: vec![],
            most_used: None,
            recent: vec![],
        };
        assert_eq!(payload.kind(), PassKind::ToolCalls);

        let payload = PassPayload::Complexity {
            total_events: 0,
            tool_invocations: 0,
            distinct_tools: 0,
            density: 0.0,
        };
        assert_eq!(payload.kind(), PassKind::Complexity);
    }

    #[test]
    fn payload_serializes_with_type_tag() {
        let payload = PassPayload::FileStructure {
            total_distinct: 2,
            files: vec!["src/main.rs".to_string(), "src/lib.rs".to_string()],
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["type"], "file_structure");
        assert_eq!(json["total_distinct"], 2);

        let back: PassPayload = serde_json::from_value(json).unwrap();
        assert_eq!(back, payload);
    }
}
