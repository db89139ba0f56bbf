//! Complexity pass
//!
//! Scores the session's overall activity density from total event count and
//! tool diversity. The output feeds the insight generator as a signal; it is
//! not surfaced to the user as its own visualization, so its signal score
//! stays at a modest flat value.
//!
//! Density: `min(1.0, (total_events + 10 * distinct_tools) / 200)`. Tool
//! diversity is weighted up because switching between many tools indicates a
//! denser working session than hammering one tool.

use crate::error::Result;
use crate::parse::ParsedLog;
use crate::types::{PassKind, PassPayload};

use super::{ExtractionPass, PassOutput};

const COMPLEXITY_SIGNAL_SCORE: f64 = 0.5;

pub struct ComplexityPass;

impl ComplexityPass {
    pub(crate) fn density(total_events: u64, distinct_tools: u64) -> f64 {
        ((total_events + 10 * distinct_tools) as f64 / 200.0).min(1.0)
    }
}

impl ExtractionPass for ComplexityPass {
    fn kind(&self) -> PassKind {
        PassKind::Complexity
    }

    fn run(&self, log: &ParsedLog) -> Result<Option<PassOutput>> {
        let total_events = log.events.len() as u64;
        let tool_invocations = log.tool_call_total as u64;
        let distinct_tools = log.distinct_tool_count() as u64;
        let density = Self::density(total_events, distinct_tools);

        let signal_score = if total_events > 0 {
            COMPLEXITY_SIGNAL_SCORE
        } else {
            0.0
        };

        Ok(Some(PassOutput::new(
            PassPayload::Complexity {
                total_events,
                tool_invocations,
                distinct_tools,
                density,
            },
            signal_score,
        )))
    }
}
