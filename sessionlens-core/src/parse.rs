//! Log parser
//!
//! Normalizes raw session-log text into an ordered [`LogEvent`] sequence plus
//! scalar counts. Three input shapes are tolerated:
//!
//! - **JSON-lines**: one JSON object per line. Lines that fail to parse are
//!   skipped (recorded as warnings), the rest are scanned.
//! - **Bundled JSON**: a single JSON document. The whole text is scanned.
//! - **Plain text**: anything else. The whole text is scanned.
//!
//! The parser never rejects input: detection degrades from JSON-lines through
//! bundled JSON to plain-text scanning, and [`parse_log`] is infallible by
//! construction. It returns no `Result` and cannot panic on any string.
//!
//! Two heuristics drive event extraction:
//!
//! 1. Tool invocations: the marker `<invoke name="...">`. Every match yields
//!    one [`LogEvent::ToolInvocation`] with a running ordinal.
//! 2. File references: quoted path-like substrings with a directory component
//!    and a 1-4 character alphabetic extension. Deduplicated to the first
//!    occurrence, preserving first-seen order.
//!
//! Matches from both heuristics are merged in byte order, so the event
//! sequence reflects true log order (the dependency-graph pass relies on
//! this for its co-occurrence windows).

use crate::types::LogEvent;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

/// Invocation marker. The quotes may arrive backslash-escaped when the
/// marker sits inside a JSON string value, so both forms are accepted.
static INVOKE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"<invoke name=\\?"([^"\\]+)\\?">"#).expect("static invoke pattern")
});

/// Quoted path with at least one directory component and a short alphabetic
/// extension. Catches absolute (`/a/b.rs`), relative (`./a/b.rs`, `../a/b.rs`)
/// and bare (`src/main.rs`) forms.
static FILE_PATH_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"["']((?:\.{1,2}/|/|[A-Za-z0-9_\-]+/)[A-Za-z0-9_\-./]*\.[A-Za-z]{1,4})["']"#)
        .expect("static file path pattern")
});

static TODO_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)(?:TODO|FIXME|XXX|HACK):\s*(.+)$").expect("static todo pattern"));

static ERROR_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:error|exception|failed|failure):\s*([^\n]+)").expect("static error pattern")
});

static WORKING_DIR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Working Directory:\s*(/[^\n]+)").expect("static cwd pattern"));

/// Keep only the tail of the TODO/error lists; older entries are noise.
const CONTEXT_LINE_LIMIT: usize = 10;

/// Which shape the input was recognized as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// One JSON object per line (possibly with malformed lines skipped)
    JsonLines,
    /// A single JSON document
    Bundled,
    /// Neither of the above; scanned as-is
    PlainText,
}

impl LogFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogFormat::JsonLines => "json_lines",
            LogFormat::Bundled => "bundled_json",
            LogFormat::PlainText => "plain_text",
        }
    }
}

/// Output of parsing one raw log.
#[derive(Debug, Clone)]
pub struct ParsedLog {
    /// Detected input shape
    pub format: LogFormat,
    /// Ordered event sequence (log order)
    pub events: Vec<LogEvent>,
    /// Total tool invocations (duplicates included)
    pub tool_call_total: usize,
    /// Distinct referenced files, first-seen order
    pub distinct_files: Vec<String>,
    /// Working directory, when the log announces one
    pub working_dir: Option<String>,
    /// Trailing TODO/FIXME items found in the log (last 10)
    pub todo_items: Vec<String>,
    /// Trailing error lines found in the log (last 10)
    pub recent_errors: Vec<String>,
    /// Non-fatal parse warnings (e.g. skipped malformed lines)
    pub warnings: Vec<String>,
}

impl ParsedLog {
    fn empty(format: LogFormat) -> Self {
        Self {
            format,
            events: Vec::new(),
            tool_call_total: 0,
            distinct_files: Vec::new(),
            working_dir: None,
            todo_items: Vec::new(),
            recent_errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// Number of distinct tool names across all invocations.
    pub fn distinct_tool_count(&self) -> usize {
        self.events
            .iter()
            .filter_map(LogEvent::tool_name)
            .collect::<HashSet<_>>()
            .len()
    }
}

/// Parse raw log text into normalized events.
///
/// Infallible: empty input yields an empty event sequence, malformed JSON
/// degrades to best-effort extraction, and no input causes an error.
pub fn parse_log(raw: &str) -> ParsedLog {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return ParsedLog::empty(LogFormat::PlainText);
    }

    let format = detect_format(trimmed);
    let mut parsed = ParsedLog::empty(format);

    let mut scanner = EventScanner::default();
    match format {
        LogFormat::Bundled | LogFormat::PlainText => scanner.scan(raw),
        LogFormat::JsonLines => {
            let mut skipped = 0usize;
            for (line_no, line) in raw.lines().enumerate() {
                if line.trim().is_empty() {
                    continue;
                }
                if serde_json::from_str::<serde_json::Value>(line).is_ok() {
                    scanner.scan(line);
                } else {
                    skipped += 1;
                    tracing::debug!(line = line_no + 1, "Skipping malformed JSON line");
                }
            }
            if skipped > 0 {
                parsed
                    .warnings
                    .push(format!("skipped {} malformed JSON line(s)", skipped));
            }
        }
    }

    parsed.events = scanner.events;
    parsed.tool_call_total = scanner.tool_call_total;
    parsed.distinct_files = scanner.distinct_files;

    // Context extraction runs over the whole text regardless of shape.
    parsed.working_dir = WORKING_DIR_RE
        .captures(raw)
        .map(|c| c[1].trim().to_string());
    parsed.todo_items = tail_captures(&TODO_RE, raw, CONTEXT_LINE_LIMIT);
    parsed.recent_errors = tail_captures(&ERROR_RE, raw, CONTEXT_LINE_LIMIT);

    tracing::debug!(
        format = format.as_str(),
        events = parsed.events.len(),
        tool_calls = parsed.tool_call_total,
        distinct_files = parsed.distinct_files.len(),
        "Parsed log"
    );

    parsed
}

/// Decide how to treat the input.
///
/// A single parseable JSON document is `Bundled` (unless it fits on one line,
/// where the distinction is moot and line-wise treatment is used). Otherwise,
/// if any individual line parses as JSON the input is treated line-wise;
/// mixed payloads therefore degrade per-line rather than being rejected.
fn detect_format(trimmed: &str) -> LogFormat {
    let multi_line = trimmed.lines().count() > 1;
    if serde_json::from_str::<serde_json::Value>(trimmed).is_ok() {
        return if multi_line {
            LogFormat::Bundled
        } else {
            LogFormat::JsonLines
        };
    }

    let any_json_line = trimmed
        .lines()
        .filter(|l| !l.trim().is_empty())
        .any(|l| serde_json::from_str::<serde_json::Value>(l).is_ok());
    if any_json_line {
        LogFormat::JsonLines
    } else {
        LogFormat::PlainText
    }
}

fn tail_captures(re: &Regex, text: &str, limit: usize) -> Vec<String> {
    let all: Vec<String> = re
        .captures_iter(text)
        .map(|c| c[1].trim().to_string())
        .collect();
    let skip = all.len().saturating_sub(limit);
    all.into_iter().skip(skip).collect()
}

/// Accumulates events across scan units, merging both heuristics in byte
/// order within each unit.
#[derive(Default)]
struct EventScanner {
    events: Vec<LogEvent>,
    tool_call_total: usize,
    distinct_files: Vec<String>,
    seen_files: HashSet<String>,
}

impl EventScanner {
    fn scan(&mut self, text: &str) {
        // (byte offset, pending event) for this unit, merged across patterns
        let mut found: Vec<(usize, LogEvent)> = Vec::new();

        for caps in INVOKE_RE.captures_iter(text) {
            let whole = caps.get(0).expect("capture 0 always present");
            found.push((
                whole.start(),
                LogEvent::ToolInvocation {
                    name: caps[1].to_string(),
                    ordinal: 0, // assigned below, once order is settled
                },
            ));
        }

        for caps in FILE_PATH_RE.captures_iter(text) {
            let whole = caps.get(0).expect("capture 0 always present");
            let path = caps[1].to_string();
            if self.seen_files.contains(&path) {
                continue;
            }
            self.seen_files.insert(path.clone());
            self.distinct_files.push(path.clone());
            found.push((whole.start(), LogEvent::FileReference { path }));
        }

        found.sort_by_key(|(offset, _)| *offset);

        for (_, mut event) in found {
            if let LogEvent::ToolInvocation { ordinal, .. } = &mut event {
                *ordinal = self.tool_call_total;
                self.tool_call_total += 1;
            }
            self.events.push(event);
        }
    }
}
