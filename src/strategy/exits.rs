//! Per-source exit thresholds.
//!
//! Fresh launches are given room to run (large target, wide stop);
//! established listings take profit earlier and cut losses sooner.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::types::SourceKind;

/// Target / stop pair, both expressed as exit ÷ entry price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExitPolicy {
    pub target_multiplier: Decimal,
    pub stop_multiplier: Decimal,
}

impl ExitPolicy {
    pub fn new(target_multiplier: Decimal, stop_multiplier: Decimal) -> Self {
        Self {
            target_multiplier,
            stop_multiplier,
        }
    }

    /// A usable pair takes profit above entry and stops out below it.
    pub fn is_valid(&self) -> bool {
        self.target_multiplier > Decimal::ONE
            && self.stop_multiplier < Decimal::ONE
            && self.stop_multiplier >= Decimal::ZERO
    }
}

/// Source tag → exit policy, with a baseline for unmapped sources.
#[derive(Debug, Clone)]
pub struct ExitTable {
    baseline: ExitPolicy,
    per_source: HashMap<SourceKind, ExitPolicy>,
}

impl Default for ExitTable {
    fn default() -> Self {
        let pump_stop = dec!(0.30);
        let dex_stop = dec!(0.40);
        let per_source = HashMap::from([
            (SourceKind::PumpEarly, ExitPolicy::new(dec!(20.0), pump_stop)),
            (SourceKind::KingOfHill, ExitPolicy::new(dec!(8.0), pump_stop)),
            (SourceKind::DexFresh, ExitPolicy::new(dec!(4.0), dex_stop)),
            (SourceKind::Dex, ExitPolicy::new(dec!(2.0), dex_stop)),
        ]);
        Self {
            baseline: ExitPolicy::new(dec!(2.0), dex_stop),
            per_source,
        }
    }
}

impl ExitTable {
    pub fn new(baseline: ExitPolicy, per_source: HashMap<SourceKind, ExitPolicy>) -> Self {
        Self {
            baseline,
            per_source,
        }
    }

    /// Empty table: every source gets the baseline.
    pub fn baseline_only(baseline: ExitPolicy) -> Self {
        Self::new(baseline, HashMap::new())
    }

    pub fn with_policy(mut self, source: SourceKind, policy: ExitPolicy) -> Self {
        self.per_source.insert(source, policy);
        self
    }

    pub fn policy_for(&self, source: SourceKind) -> ExitPolicy {
        self.per_source.get(&source).copied().unwrap_or(self.baseline)
    }

    pub fn baseline(&self) -> ExitPolicy {
        self.baseline
    }

    /// All policies that fail [`ExitPolicy::is_valid`], for config validation.
    pub fn invalid_entries(&self) -> Vec<String> {
        let mut bad: Vec<String> = self
            .per_source
            .iter()
            .filter(|(_, p)| !p.is_valid())
            .map(|(s, _)| s.to_string())
            .collect();
        if !self.baseline.is_valid() {
            bad.push("baseline".to_string());
        }
        bad.sort();
        bad
    }
}
