//! Insight generation
//!
//! Turns completed extraction output into ranked natural-language findings.
//! This is deliberately a small, auditable rule set rather than a model:
//! every insight is traceable to one named condition over the extraction
//! payloads, which keeps each rule explainable to the end user and testable
//! in isolation.
//!
//! Rules are evaluated independently in a fixed order (they are not mutually
//! exclusive); the result is stable-sorted by signal score descending and
//! truncated to the top 5, so equal scores keep rule order.

use crate::parse::ParsedLog;
use crate::types::{InsightKind, PassPayload};
use serde_json::json;

/// Tools that mutate or read files directly, as opposed to exploring.
const FILE_TOOL_FAMILY: &[&str] = &["Read", "Write", "Edit", "MultiEdit"];

/// Most-used tool call count above which the usage rule fires.
const TOOL_REPEAT_THRESHOLD: u64 = 5;
/// Distinct file count above which the focus rule fires.
const FILE_SPREAD_THRESHOLD: u64 = 10;
/// Total invocation count above which the exploration rule fires.
const HIGH_ACTIVITY_THRESHOLD: usize = 50;
/// Activity density at which the density rule fires.
const DENSITY_THRESHOLD: f64 = 0.5;
/// Edge-to-node ratio above which the coupling rule fires.
const COUPLING_RATIO: f64 = 1.5;

/// Maximum number of insights surfaced per session.
const MAX_INSIGHTS: usize = 5;

/// One completed pass result handed to the generator.
///
/// `result_id` is the persisted ExtractionResult id when available, so
/// insights derived from this pass can point back at their source.
#[derive(Debug, Clone)]
pub struct CompletedPass {
    pub result_id: Option<String>,
    pub payload: PassPayload,
}

/// An insight before persistence assigns it an id and a session.
#[derive(Debug, Clone)]
pub struct InsightDraft {
    pub text: String,
    pub kind: InsightKind,
    pub signal_score: f64,
    pub confidence: f64,
    pub visualization: Option<serde_json::Value>,
    /// Source ExtractionResult, `None` for insights over raw counts
    pub analysis_id: Option<String>,
}

/// Rule-based insight generator.
#[derive(Debug, Default)]
pub struct InsightGenerator;

impl InsightGenerator {
    pub fn new() -> Self {
        Self
    }

    /// Evaluate every rule over the completed passes and raw counts.
    ///
    /// Returns at most [`MAX_INSIGHTS`] drafts, sorted by signal score
    /// descending (stable for equal scores).
    pub fn generate(&self, parsed: &ParsedLog, completed: &[CompletedPass]) -> Vec<InsightDraft> {
        let mut drafts = Vec::new();

        if let Some(draft) = self.tool_repetition_rule(completed) {
            drafts.push(draft);
        }
        if let Some(draft) = self.file_spread_rule(completed) {
            drafts.push(draft);
        }
        if let Some(draft) = self.high_activity_rule(parsed) {
            drafts.push(draft);
        }
        if let Some(draft) = self.coupling_rule(completed) {
            drafts.push(draft);
        }
        if let Some(draft) = self.density_rule(completed) {
            drafts.push(draft);
        }

        // sort_by is stable: equal scores keep rule-evaluation order
        drafts.sort_by(|a, b| {
            b.signal_score
                .partial_cmp(&a.signal_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        drafts.truncate(MAX_INSIGHTS);
        drafts
    }

    fn find<'a>(
        completed: &'a [CompletedPass],
        pred: impl Fn(&PassPayload) -> bool,
    ) -> Option<&'a CompletedPass> {
        completed.iter().find(|c| pred(&c.payload))
    }

    /// Rule 1: the most-used tool was called more than 5 times.
    fn tool_repetition_rule(&self, completed: &[CompletedPass]) -> Option<InsightDraft> {
        let source = Self::find(completed, |p| matches!(p, PassPayload::ToolCalls { .. }))?;
        let (usage, most_used) = match &source.payload {
            PassPayload::ToolCalls {
                usage, most_used, ..
            } => (usage, most_used.as_deref()?),
            _ => return None,
        };
        let count = usage.iter().find(|t| t.name == most_used)?.count;
        if count <= TOOL_REPEAT_THRESHOLD {
            return None;
        }

        let text = if FILE_TOOL_FAMILY.contains(&most_used) {
            format!(
                "You called {} {} times this session. That much repeated file activity is worth a second look; \
                 review the recent {} operations for consistency before moving on.",
                most_used,
                count,
                most_used.to_lowercase()
            )
        } else {
            format!(
                "You called {} {} times this session. That level of repetition suggests an active exploration \
                 phase; consolidate what you have found before drilling further.",
                most_used, count
            )
        };

        let data: serde_json::Map<String, serde_json::Value> = usage
            .iter()
            .map(|t| (t.name.clone(), json!(t.count)))
            .collect();

        Some(InsightDraft {
            text,
            kind: InsightKind::Optimization,
            signal_score: 0.75,
            confidence: 0.8,
            visualization: Some(json!({ "chart_type": "bar", "data": data })),
            analysis_id: source.result_id.clone(),
        })
    }

    /// Rule 2: more than 10 distinct files referenced.
    fn file_spread_rule(&self, completed: &[CompletedPass]) -> Option<InsightDraft> {
        let source = Self::find(completed, |p| {
            matches!(p, PassPayload::FileStructure { .. })
        })?;
        let total = match &source.payload {
            PassPayload::FileStructure { total_distinct, .. } => *total_distinct,
            _ => return None,
        };
        if total <= FILE_SPREAD_THRESHOLD {
            return None;
        }

        Some(InsightDraft {
            text: format!(
                "This session touched {} distinct files. Narrowing the next session to a smaller set of \
                 files tends to produce more focused, reviewable changes.",
                total
            ),
            kind: InsightKind::NextStep,
            signal_score: 0.65,
            confidence: 0.7,
            visualization: None,
            analysis_id: source.result_id.clone(),
        })
    }

    /// Rule 3: more than 50 tool invocations in total.
    ///
    /// Derived from raw counts, so it carries no source analysis id.
    fn high_activity_rule(&self, parsed: &ParsedLog) -> Option<InsightDraft> {
        if parsed.tool_call_total <= HIGH_ACTIVITY_THRESHOLD {
            return None;
        }

        Some(InsightDraft {
            text: format!(
                "The log records {} tool invocations, which is a lot of exploration for one session. \
                 Consider splitting broad investigation and focused implementation into separate sessions.",
                parsed.tool_call_total
            ),
            kind: InsightKind::Architecture,
            signal_score: 0.8,
            confidence: 0.75,
            visualization: None,
            analysis_id: None,
        })
    }

    /// Rule 4: dependency graph is densely coupled (edges > 1.5x nodes).
    fn coupling_rule(&self, completed: &[CompletedPass]) -> Option<InsightDraft> {
        let source = Self::find(completed, |p| {
            matches!(p, PassPayload::DependencyGraph { .. })
        })?;
        let (nodes, edges) = match &source.payload {
            PassPayload::DependencyGraph { nodes, edges } => (nodes, edges),
            _ => return None,
        };
        if nodes.is_empty() || (edges.len() as f64) <= (nodes.len() as f64) * COUPLING_RATIO {
            return None;
        }

        Some(InsightDraft {
            text: format!(
                "{} files co-occur through {} dependency edges, a high coupling ratio for this session. \
                 Introducing an interface or a shared module between the hot spots would reduce the coupling.",
                nodes.len(),
                edges.len()
            ),
            kind: InsightKind::Architecture,
            signal_score: 0.85,
            confidence: 0.7,
            visualization: Some(json!({
                "chart_type": "network",
                "nodes": nodes.iter().take(20).collect::<Vec<_>>(),
                "edges": edges.iter().take(30).collect::<Vec<_>>(),
            })),
            analysis_id: source.result_id.clone(),
        })
    }

    /// Rule 5: activity density at or above 0.5.
    fn density_rule(&self, completed: &[CompletedPass]) -> Option<InsightDraft> {
        let source = Self::find(completed, |p| matches!(p, PassPayload::Complexity { .. }))?;
        let (density, total_events) = match &source.payload {
            PassPayload::Complexity {
                density,
                total_events,
                ..
            } => (*density, *total_events),
            _ => return None,
        };
        if density < DENSITY_THRESHOLD {
            return None;
        }

        Some(InsightDraft {
            text: format!(
                "Activity density came out at {:.2} across {} events, a dense session. Sessions this busy \
                 tend to hide mistakes; re-read the final diffs before shipping.",
                density, total_events
            ),
            kind: InsightKind::CodeIssue,
            signal_score: 0.7,
            confidence: 0.6,
            visualization: None,
            analysis_id: source.result_id.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::parse_log;
    use crate::passes::create_default_engine;

    /// Run the real passes and feed their payloads to the generator.
    fn generate(raw: &str) -> Vec<InsightDraft> {
        let parsed = parse_log(raw);
        let engine = create_default_engine();
        let completed: Vec<CompletedPass> = engine
            .run_all(&parsed)
            .into_iter()
            .filter_map(|run| {
                run.output.map(|o| CompletedPass {
                    result_id: Some(format!("result-{}", run.kind)),
                    payload: o.payload,
                })
            })
            .collect();
        InsightGenerator::new().generate(&parsed, &completed)
    }

    #[test]
    fn quiet_log_yields_no_insights() {
        let drafts = generate("{\"type\":\"test\"}\n");
        assert!(drafts.is_empty());
    }

    #[test]
    fn six_reads_yield_one_optimization_insight() {
        let raw = r#"<invoke name="Read">"#.repeat(6);
        let drafts = generate(&raw);
        assert_eq!(drafts.len(), 1);
        let draft = &drafts[0];
        assert_eq!(draft.kind, InsightKind::Optimization);
        assert!((draft.signal_score - 0.75).abs() < 1e-9);
        assert!(draft.text.contains("Read"));
        assert!(draft.text.contains("6 times"));
        assert!(draft.analysis_id.is_some());
        let viz = draft.visualization.as_ref().unwrap();
        assert_eq!(viz["chart_type"], "bar");
        assert_eq!(viz["data"]["Read"], 6);
    }

    #[test]
    fn exploration_tool_gets_different_phrasing() {
        let raw = r#"<invoke name="WebSearch">"#.repeat(7);
        let drafts = generate(&raw);
        assert_eq!(drafts.len(), 1);
        assert!(drafts[0].text.contains("exploration"));
    }

    #[test]
    fn exactly_five_calls_is_below_threshold() {
        let raw = r#"<invoke name="Read">"#.repeat(5);
        assert!(generate(&raw).is_empty());
    }

    #[test]
    fn eleven_files_yield_next_step_insight() {
        let mut raw = String::new();
        for i in 0..11 {
            raw.push_str(&format!("\"/src/file{}.rs\"\n", i));
        }
        let drafts = generate(&raw);
        let focus: Vec<_> = drafts
            .iter()
            .filter(|d| d.kind == InsightKind::NextStep)
            .collect();
        assert_eq!(focus.len(), 1);
        assert!((focus[0].signal_score - 0.65).abs() < 1e-9);
        assert!(focus[0].text.contains("11 distinct files"));
        assert!(focus[0].analysis_id.is_some());
    }

    #[test]
    fn fifty_one_calls_yield_architecture_insight() {
        let mut raw = String::new();
        for i in 0..51 {
            raw.push_str(&format!("<invoke name=\"Tool{}\">", i % 7));
        }
        let drafts = generate(&raw);
        let arch: Vec<_> = drafts
            .iter()
            .filter(|d| d.kind == InsightKind::Architecture)
            .collect();
        assert_eq!(arch.len(), 1);
        assert!((arch[0].signal_score - 0.8).abs() < 1e-9);
        assert!(arch[0].analysis_id.is_none());
        assert!(drafts.len() <= 5);
    }

    #[test]
    fn ranking_is_descending_and_capped() {
        // fire as many rules as possible at once
        let mut raw = String::new();
        for i in 0..60 {
            raw.push_str(&format!("<invoke name=\"Tool{}\">", i % 8));
        }
        // one window with many co-referenced files drives the coupling rule
        for i in 0..12 {
            raw.push_str(&format!("\"/src/mod{}.rs\" ", i));
        }
        let drafts = generate(&raw);
        assert!(!drafts.is_empty());
        assert!(drafts.len() <= 5);
        for pair in drafts.windows(2) {
            assert!(pair[0].signal_score >= pair[1].signal_score);
        }
    }

    #[test]
    fn equal_scores_preserve_rule_order() {
        let a = InsightDraft {
            text: "first".into(),
            kind: InsightKind::Optimization,
            signal_score: 0.75,
            confidence: 0.8,
            visualization: None,
            analysis_id: None,
        };
        let b = InsightDraft {
            text: "second".into(),
            kind: InsightKind::NextStep,
            signal_score: 0.75,
            confidence: 0.7,
            visualization: None,
            analysis_id: None,
        };
        let mut drafts = vec![a, b];
        drafts.sort_by(|x, y| {
            y.signal_score
                .partial_cmp(&x.signal_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        assert_eq!(drafts[0].text, "first");
        assert_eq!(drafts[1].text, "second");
    }
}
