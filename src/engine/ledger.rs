//! Trade ledger: realized outcomes and performance statistics.
//!
//! Append-only record of closed trades in close order. Statistics are
//! derived on demand from the full record, never maintained incrementally.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::info;

use crate::types::{CloseReason, ClosedTrade, SourceKind};

// ---------------------------------------------------------------------------
// Statistics
// ---------------------------------------------------------------------------

/// Aggregate performance over every closed trade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerStats {
    pub trades: usize,
    pub wins: usize,
    pub total_profit: Decimal,
    /// Fraction of trades with positive profit (0.0–1.0).
    pub win_rate: f64,
    /// Largest realized multiplier; zero when nothing has a fill.
    pub best_multiplier: Decimal,
    pub per_source: BTreeMap<SourceKind, usize>,
    pub per_reason: BTreeMap<CloseReason, usize>,
}

impl LedgerStats {
    /// Log a one-block performance summary.
    pub fn log_summary(&self, open_positions: usize, max_positions: usize) {
        let sign = if self.total_profit > Decimal::ZERO { "+" } else { "" };
        info!(
            pnl = format!("{sign}{:.4}", self.total_profit),
            trades = self.trades,
            win_rate = format!("{:.1}%", self.win_rate * 100.0),
            best = format!("{:.2}x", self.best_multiplier),
            active = format!("{open_positions}/{max_positions}"),
            per_source = ?self.per_source,
            "Performance"
        );
    }
}

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TradeLedger {
    trades: Vec<ClosedTrade>,
}

impl TradeLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, trade: ClosedTrade) {
        self.trades.push(trade);
    }

    pub fn len(&self) -> usize {
        self.trades.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trades.is_empty()
    }

    /// All trades in close order.
    pub fn trades(&self) -> &[ClosedTrade] {
        &self.trades
    }

    /// The last `n` trades, newest first.
    pub fn recent(&self, n: usize) -> Vec<ClosedTrade> {
        self.trades.iter().rev().take(n).cloned().collect()
    }

    pub fn stats(&self) -> LedgerStats {
        let trades = self.trades.len();
        let wins = self.trades.iter().filter(|t| t.is_win()).count();
        let total_profit: Decimal = self.trades.iter().map(|t| t.profit).sum();
        let win_rate = if trades == 0 {
            0.0
        } else {
            wins as f64 / trades as f64
        };
        let best_multiplier = self
            .trades
            .iter()
            .filter_map(|t| t.multiplier)
            .max()
            .unwrap_or(Decimal::ZERO);

        let mut per_source = BTreeMap::new();
        let mut per_reason = BTreeMap::new();
        for t in &self.trades {
            *per_source.entry(t.source).or_insert(0) += 1;
            *per_reason.entry(t.reason).or_insert(0) += 1;
        }

        LedgerStats {
            trades,
            wins,
            total_profit,
            win_rate,
            best_multiplier,
            per_source,
            per_reason,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
