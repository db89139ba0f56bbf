//! Tool usage pass
//!
//! Builds a per-tool frequency map over the invocation events and picks the
//! most-used tool. Ties on equal counts break toward the tool encountered
//! first in the log, so output is deterministic for any event order.
//!
//! Signal score: `min(0.5 + total_calls / 100, 0.9)`. It grows with
//! activity, caps at 0.9, and is 0.0 when the log has no tool calls at all.

use crate::error::Result;
use crate::parse::ParsedLog;
use crate::types::{LogEvent, PassKind, PassPayload, ToolCount};
use std::collections::HashMap;

use super::{ExtractionPass, PassOutput};

/// How many trailing invocations to keep in the payload.
const RECENT_LIMIT: usize = 20;

pub struct ToolUsagePass;

impl ToolUsagePass {
    /// Signal score for a given total invocation count.
    pub(crate) fn signal_score(total_calls: u64) -> f64 {
        if total_calls == 0 {
            return 0.0;
        }
        (0.5 + total_calls as f64 / 100.0).min(0.9)
    }
}

impl ExtractionPass for ToolUsagePass {
    fn kind(&self) -> PassKind {
        PassKind::ToolCalls
    }

    fn run(&self, log: &ParsedLog) -> Result<Option<PassOutput>> {
        // Counts in first-encountered order; the index map keeps lookup O(1)
        // without losing insertion order.
        let mut usage: Vec<ToolCount> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();
        let mut invocations: Vec<&str> = Vec::new();

        for event in &log.events {
            if let LogEvent::ToolInvocation { name, .. } = event {
                invocations.push(name.as_str());
                match index.get(name) {
                    Some(&i) => usage[i].count += 1,
                    None => {
                        index.insert(name.clone(), usage.len());
                        usage.push(ToolCount {
                            name: name.clone(),
                            count: 1,
                        });
                    }
                }
            }
        }

        let total_calls = invocations.len() as u64;

        // Strictly-greater comparison keeps the earliest tool on ties.
        let most_used = usage
            .iter()
            .fold(None::<&ToolCount>, |best, tc| match best {
                Some(b) if b.count >= tc.count => Some(b),
                _ => Some(tc),
            })
            .map(|tc| tc.name.clone());

        let recent: Vec<String> = invocations
            .iter()
            .rev()
            .take(RECENT_LIMIT)
            .rev()
            .map(|s| s.to_string())
            .collect();

        let signal_score = Self::signal_score(total_calls);

        Ok(Some(PassOutput::new(
            PassPayload::ToolCalls {
                total_calls,
                usage,
                most_used,
                recent,
            },
            signal_score,
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::parse_log;

    fn run(raw: &str) -> PassOutput {
        ToolUsagePass
            .run(&parse_log(raw))
            .unwrap()
            .expect("tool usage pass always emits")
    }

    #[test]
    fn empty_log_scores_zero() {
        let out = run("");
        match out.payload {
            PassPayload::ToolCalls {
                total_calls,
                usage,
                most_used,
                ..
            } => {
                assert_eq!(total_calls, 0);
                assert!(usage.is_empty());
                assert!(most_used.is_none());
            }
            other => panic!("unexpected payload: {:?}", other),
        }
        assert_eq!(out.signal_score, 0.0);
    }

    #[test]
    fn frequency_sum_equals_invocation_count() {
        let raw = r#"<invoke name="Read"><invoke name="Bash"><invoke name="Read"><invoke name="Edit"><invoke name="Read">"#;
        let log = parse_log(raw);
        let out = ToolUsagePass.run(&log).unwrap().unwrap();
        match out.payload {
            PassPayload::ToolCalls {
                total_calls, usage, ..
            } => {
                let sum: u64 = usage.iter().map(|t| t.count).sum();
                assert_eq!(sum, total_calls);
                assert_eq!(
                    sum,
                    log.events.iter().filter(|e| e.is_tool_invocation()).count() as u64
                );
            }
            other => panic!("unexpected payload: {:?}", other),
        }
    }

    #[test]
    fn most_used_tool_with_tie_break() {
        // Bash and Read both appear twice; Bash was seen first
        let raw = r#"<invoke name="Bash"><invoke name="Read"><invoke name="Bash"><invoke name="Read">"#;
        let out = run(raw);
        match out.payload {
            PassPayload::ToolCalls { most_used, .. } => {
                assert_eq!(most_used.as_deref(), Some("Bash"));
            }
            other => panic!("unexpected payload: {:?}", other),
        }
    }

    #[test]
    fn scenario_six_reads() {
        let raw = r#"<invoke name="Read">"#.repeat(6);
        let out = run(&raw);
        match out.payload {
            PassPayload::ToolCalls {
                total_calls,
                usage,
                most_used,
                ..
            } => {
                assert_eq!(total_calls, 6);
                assert_eq!(usage.len(), 1);
                assert_eq!(usage[0].name, "Read");
                assert_eq!(usage[0].count, 6);
                assert_eq!(most_used.as_deref(), Some("Read"));
            }
            other => panic!("unexpected payload: {:?}", other),
        }
        assert!((out.signal_score - 0.56).abs() < 1e-9);
    }

    #[test]
    fn signal_score_formula() {
        assert_eq!(ToolUsagePass::signal_score(0), 0.0);
        assert!((ToolUsagePass::signal_score(1) - 0.51).abs() < 1e-9);
        assert!((ToolUsagePass::signal_score(10) - 0.6).abs() < 1e-9);
        // capped at 0.9 from 40 calls up
        assert!((ToolUsagePass::signal_score(40) - 0.9).abs() < 1e-9);
        assert_eq!(ToolUsagePass::signal_score(500), 0.9);
    }

    #[test]
    fn recent_keeps_last_twenty_in_order() {
        let mut raw = String::new();
        for i in 0..25 {
            raw.push_str(&format!("<invoke name=\"Tool{}\">", i));
        }
        let out = run(&raw);
        match out.payload {
            PassPayload::ToolCalls { recent, .. } => {
                assert_eq!(recent.len(), 20);
                assert_eq!(recent[0], "Tool5");
                assert_eq!(recent[19], "Tool24");
            }
            other => panic!("unexpected payload: {:?}", other),
        }
    }
}
