//! Strategy: admission scoring and exit thresholds.

pub mod exits;
pub mod scoring;

use tracing::debug;

use crate::types::{AdmissionRejected, Candidate, ScoredCandidate};
use scoring::ScoringTable;

/// Default global admission threshold.
pub const DEFAULT_ADMISSION_THRESHOLD: u32 = 60;

/// Scores candidates and gates admission on the global threshold plus
/// spare capacity.
///
/// Pure: no I/O, no shared state. The caller supplies the current open
/// count so the decision is reproducible in tests.
#[derive(Debug, Clone)]
pub struct AdmissionScorer {
    table: ScoringTable,
    threshold: u32,
    max_positions: usize,
}

impl AdmissionScorer {
    pub fn new(table: ScoringTable, threshold: u32, max_positions: usize) -> Self {
        Self {
            table,
            threshold,
            max_positions,
        }
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    pub fn max_positions(&self) -> usize {
        self.max_positions
    }

    /// Score one candidate against the current open-position count.
    pub fn assess(&self, candidate: Candidate, open_positions: usize) -> ScoredCandidate {
        let score = self.table.score(&candidate);
        let admit = self.check(score, open_positions).is_ok();
        ScoredCandidate {
            candidate,
            score,
            admit,
        }
    }

    /// Why a score would be rejected at the given occupancy, if at all.
    pub fn check(&self, score: u32, open_positions: usize) -> Result<(), AdmissionRejected> {
        if score < self.threshold {
            return Err(AdmissionRejected::BelowThreshold {
                score,
                threshold: self.threshold,
            });
        }
        if open_positions >= self.max_positions {
            debug!(open = open_positions, max = self.max_positions, "No spare capacity");
            return Err(AdmissionRejected::AtCapacity {
                open: open_positions,
                max: self.max_positions,
            });
        }
        Ok(())
    }
}

impl Default for AdmissionScorer {
    fn default() -> Self {
        Self::new(ScoringTable::default(), DEFAULT_ADMISSION_THRESHOLD, 5)
    }
}
