//! File reference pass
//!
//! Reports the distinct set of files the session touched. The payload lists
//! the first 20 files (first-seen order) to bound its size; the full distinct
//! count is always reported alongside.
//!
//! Signal score is a flat 0.6 whenever at least one file was referenced,
//! else 0.0: file structure is useful context but rarely the headline.

use crate::error::Result;
use crate::parse::ParsedLog;
use crate::types::{PassKind, PassPayload};

use super::{ExtractionPass, PassOutput};

/// Payload size cap for the file listing.
const FILE_LIST_LIMIT: usize = 20;

const FILE_SIGNAL_SCORE: f64 = 0.6;

pub struct FileReferencePass;

impl ExtractionPass for FileReferencePass {
    fn kind(&self) -> PassKind {
        PassKind::FileStructure
    }

    fn run(&self, log: &ParsedLog) -> Result<Option<PassOutput>> {
        let total_distinct = log.distinct_files.len() as u64;
        let files: Vec<String> = log
            .distinct_files
            .iter()
            .take(FILE_LIST_LIMIT)
            .cloned()
            .collect();

        let signal_score = if total_distinct > 0 {
            FILE_SIGNAL_SCORE
        } else {
            0.0
        };

        Ok(Some(PassOutput::new(
            PassPayload::FileStructure {
                total_distinct,
                files,
            },
            signal_score,
        )))
    }
}
