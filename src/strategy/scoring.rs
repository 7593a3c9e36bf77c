//! Heuristic candidate scoring.
//!
//! Every source has its own rubric: a base score plus independent
//! weighted checks against metric bands. Rubrics are looked up by
//! source tag, so supporting a new source means adding a table row.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

use crate::engine::scanner::DEFAULT_DEX_BOOST_SPLIT;
use crate::types::{Candidate, Metric, Metrics, SourceKind};

// ---------------------------------------------------------------------------
// Rubric building blocks
// ---------------------------------------------------------------------------

/// One weighted sub-check. Passes when the metric is present and inside
/// the band `[min, max]`, or `(min, max)` when `exclusive` is set; a
/// missing bound is unbounded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Check {
    pub metric: Metric,
    #[serde(default)]
    pub min: Option<f64>,
    #[serde(default)]
    pub max: Option<f64>,
    #[serde(default)]
    pub exclusive: bool,
    pub weight: u32,
}

impl Check {
    /// Metric must be present, any value.
    pub const fn present(metric: Metric, weight: u32) -> Self {
        Self { metric, min: None, max: None, exclusive: false, weight }
    }

    pub const fn at_least(metric: Metric, min: f64, weight: u32) -> Self {
        Self { metric, min: Some(min), max: None, exclusive: false, weight }
    }

    pub const fn at_most(metric: Metric, max: f64, weight: u32) -> Self {
        Self { metric, min: None, max: Some(max), exclusive: false, weight }
    }

    pub const fn between(metric: Metric, min: f64, max: f64, weight: u32) -> Self {
        Self { metric, min: Some(min), max: Some(max), exclusive: false, weight }
    }

    /// Strictly greater than `min`.
    pub const fn above(metric: Metric, min: f64, weight: u32) -> Self {
        Self { metric, min: Some(min), max: None, exclusive: true, weight }
    }

    /// Strictly inside `(min, max)`.
    pub const fn strictly_between(metric: Metric, min: f64, max: f64, weight: u32) -> Self {
        Self { metric, min: Some(min), max: Some(max), exclusive: true, weight }
    }

    pub fn passes(&self, metrics: &Metrics) -> bool {
        let Some(value) = metrics.get(self.metric) else {
            return false;
        };
        let inclusive = !self.exclusive;
        let above_min = self.min.map_or(true, |min| value > min || (inclusive && value == min));
        let below_max = self.max.map_or(true, |max| value < max || (inclusive && value == max));
        above_min && below_max
    }
}

/// Scoring rules for a single source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rubric {
    pub base: u32,
    #[serde(default)]
    pub checks: Vec<Check>,
}

impl Rubric {
    pub fn score(&self, metrics: &Metrics) -> u32 {
        self.checks
            .iter()
            .filter(|c| c.passes(metrics))
            .fold(self.base, |acc, c| acc.saturating_add(c.weight))
    }
}

// ---------------------------------------------------------------------------
// Lookup table
// ---------------------------------------------------------------------------

/// Source tag → rubric.
#[derive(Debug, Clone)]
pub struct ScoringTable {
    rubrics: HashMap<SourceKind, Rubric>,
}

impl Default for ScoringTable {
    fn default() -> Self {
        let rubrics = HashMap::from([
            (
                SourceKind::PumpEarly,
                Rubric {
                    base: 50,
                    checks: vec![
                        Check::at_least(Metric::MetadataFields, 2.0, 30),
                        Check::present(Metric::Supply, 10),
                        Check::at_most(Metric::AgeMinutes, 30.0, 10),
                    ],
                },
            ),
            (
                SourceKind::KingOfHill,
                Rubric {
                    base: 60,
                    checks: vec![Check::between(Metric::MarketCap, 30_000.0, 35_000.0, 30)],
                },
            ),
        ]);
        Self { rubrics }.with_boost_split(DEFAULT_DEX_BOOST_SPLIT)
    }
}

impl ScoringTable {
    pub fn new(rubrics: HashMap<SourceKind, Rubric>) -> Self {
        Self { rubrics }
    }

    /// Rebuild the boost rubrics around the amount that separates fresh
    /// boosts from established ones. Must match the scanner's split.
    pub fn with_boost_split(self, split: f64) -> Self {
        let fresh = Rubric {
            base: 40,
            checks: vec![Check::strictly_between(Metric::BoostAmount, 0.0, split, 20)],
        };
        let established = Rubric {
            base: 30,
            checks: vec![Check::above(Metric::BoostAmount, split, 20)],
        };
        self.with_rubric(SourceKind::DexFresh, fresh)
            .with_rubric(SourceKind::Dex, established)
    }

    /// Replace (or add) the rubric for one source.
    pub fn with_rubric(mut self, source: SourceKind, rubric: Rubric) -> Self {
        self.rubrics.insert(source, rubric);
        self
    }

    pub fn rubric(&self, source: SourceKind) -> Option<&Rubric> {
        self.rubrics.get(&source)
    }

    /// Score a candidate. Sources without a rubric score zero.
    pub fn score(&self, candidate: &Candidate) -> u32 {
        let score = self
            .rubrics
            .get(&candidate.source)
            .map(|r| r.score(&candidate.metrics))
            .unwrap_or(0);

        debug!(
            id = %candidate.id,
            source = %candidate.source,
            score,
            "Candidate scored"
        );

        score
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
