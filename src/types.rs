//! Shared types for the SNIPER engine.
//!
//! These types form the data model used across all modules.
//! They are designed to be stable so that venue, strategy,
//! and engine modules can depend on them without circular references.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// ---------------------------------------------------------------------------
// Source tags
// ---------------------------------------------------------------------------

/// Discovery source a candidate came from. Drives both the scoring rubric
/// and the exit thresholds of the resulting position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Fresh bonding-curve launch, minutes old.
    PumpEarly,
    /// Launch that reached the king-of-the-hill market-cap band.
    KingOfHill,
    /// DEX listing with a small paid boost.
    DexFresh,
    /// DEX listing with a large paid boost.
    Dex,
}

impl SourceKind {
    /// All known sources (useful for iteration).
    pub const ALL: &'static [SourceKind] = &[
        SourceKind::PumpEarly,
        SourceKind::KingOfHill,
        SourceKind::DexFresh,
        SourceKind::Dex,
    ];

    /// Wire/config name, matching the serde representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::PumpEarly => "pump_early",
            SourceKind::KingOfHill => "king_of_hill",
            SourceKind::DexFresh => "dex_fresh",
            SourceKind::Dex => "dex",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Attempt to parse a string into a SourceKind (case-insensitive).
impl std::str::FromStr for SourceKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "pump_early" | "pump" => Ok(SourceKind::PumpEarly),
            "king_of_hill" | "koth" => Ok(SourceKind::KingOfHill),
            "dex_fresh" => Ok(SourceKind::DexFresh),
            "dex" => Ok(SourceKind::Dex),
            _ => Err(anyhow::anyhow!("Unknown source kind: {s}")),
        }
    }
}

// ---------------------------------------------------------------------------
// Metrics bag
// ---------------------------------------------------------------------------

/// Named, source-specific measurement attached to a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    /// Minutes since the asset was created.
    AgeMinutes,
    Liquidity,
    Volume24h,
    MarketCap,
    /// Price change over the feed's window, in percent.
    PriceChange,
    /// Most recent paid boost.
    BoostAmount,
    /// Cumulative paid boosts.
    BoostTotal,
    Supply,
    /// How many of name / symbol / metadata-uri the feed supplied.
    MetadataFields,
}

/// Sparse metric values keyed by [`Metric`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metrics(BTreeMap<Metric, f64>);

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert. Non-finite values are dropped.
    pub fn with(mut self, metric: Metric, value: f64) -> Self {
        self.set(metric, value);
        self
    }

    /// Builder-style insert of an optional value.
    pub fn with_opt(mut self, metric: Metric, value: Option<f64>) -> Self {
        if let Some(v) = value {
            self.set(metric, v);
        }
        self
    }

    pub fn set(&mut self, metric: Metric, value: f64) {
        if value.is_finite() {
            self.0.insert(metric, value);
        }
    }

    pub fn get(&self, metric: Metric) -> Option<f64> {
        self.0.get(&metric).copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Candidates
// ---------------------------------------------------------------------------

/// A discovered asset, not yet owned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    /// Mint / token address. Primary key across the whole engine.
    pub id: String,
    pub symbol: String,
    pub name: String,
    pub source: SourceKind,
    pub metrics: Metrics,
}

impl fmt::Display for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}) [{}] {}",
            self.symbol,
            self.name,
            self.source,
            short_id(&self.id),
        )
    }
}

impl Candidate {
    /// Helper to build a test/sample candidate with sensible defaults.
    #[cfg(test)]
    pub fn sample(id: &str, source: SourceKind) -> Self {
        Candidate {
            id: id.to_string(),
            symbol: "TEST".to_string(),
            name: "Test Token".to_string(),
            source,
            metrics: Metrics::new(),
        }
    }
}

/// Candidate after a scoring pass. Produced and consumed within one cycle.
#[derive(Debug, Clone)]
pub struct ScoredCandidate {
    pub candidate: Candidate,
    pub score: u32,
    pub admit: bool,
}

// ---------------------------------------------------------------------------
// Raw feed records
// ---------------------------------------------------------------------------

/// Record shapes produced by source connectors, before normalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RawRecord {
    /// Token-creation event from the launchpad program.
    PumpLaunch {
        mint: String,
        #[serde(default)]
        symbol: Option<String>,
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        created_at: Option<DateTime<Utc>>,
        #[serde(default)]
        creator: Option<String>,
        #[serde(default)]
        supply: Option<f64>,
        #[serde(default)]
        uri: Option<String>,
    },
    /// Paid boost on a DEX screener listing.
    Boost {
        chain_id: String,
        token_address: String,
        amount: f64,
        #[serde(default)]
        total_amount: Option<f64>,
        #[serde(default)]
        url: Option<String>,
        #[serde(default)]
        description: Option<String>,
    },
    /// Launch sitting in the king-of-the-hill slot.
    KingOfHill {
        mint: String,
        #[serde(default)]
        symbol: Option<String>,
        #[serde(default)]
        name: Option<String>,
        market_cap: f64,
        #[serde(default)]
        volume_24h: Option<f64>,
        #[serde(default)]
        liquidity: Option<f64>,
        #[serde(default)]
        price_change: Option<f64>,
    },
}

// ---------------------------------------------------------------------------
// Execution results
// ---------------------------------------------------------------------------

/// Which leg of a round trip an execution belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeSide {
    Buy,
    Sell,
}

impl fmt::Display for TradeSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradeSide::Buy => write!(f, "BUY"),
            TradeSide::Sell => write!(f, "SELL"),
        }
    }
}

/// Fill returned by the venue for a buy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuyFill {
    pub order_id: String,
    pub fill_price: Decimal,
    pub quantity: Decimal,
}

/// Fill returned by the venue for a sell of the full held quantity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SellFill {
    pub order_id: String,
    pub fill_price: Decimal,
}

// ---------------------------------------------------------------------------
// Positions
// ---------------------------------------------------------------------------

/// An open, owned stake.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub id: String,
    pub symbol: String,
    pub source: SourceKind,
    pub entry_price: Decimal,
    pub quantity: Decimal,
    /// Settlement-unit amount spent on the buy.
    pub budget: Decimal,
    pub opened_at: DateTime<Utc>,
    /// Take profit once price / entry reaches this (> 1).
    pub target_multiplier: Decimal,
    /// Cut the loss once price / entry falls to this (< 1).
    pub stop_multiplier: Decimal,
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{}] qty={} entry={} target={}x stop={}x",
            self.symbol,
            self.source,
            self.quantity.round_dp(4),
            self.entry_price,
            self.target_multiplier,
            self.stop_multiplier,
        )
    }
}

impl Position {
    /// Price relative to entry. Zero when the entry price is degenerate.
    pub fn multiplier_at(&self, price: Decimal) -> Decimal {
        price.checked_div(self.entry_price).unwrap_or(Decimal::ZERO)
    }

    /// Realized profit if the whole quantity were sold at `price`.
    pub fn profit_at(&self, price: Decimal) -> Decimal {
        self.quantity * (price - self.entry_price)
    }

    /// Time held so far.
    pub fn held_for(&self, now: DateTime<Utc>) -> chrono::Duration {
        now - self.opened_at
    }
}

/// Why a position left the open table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    TargetHit,
    StopHit,
    OperatorStop,
    ExecutionFailure,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseReason::TargetHit => write!(f, "TARGET"),
            CloseReason::StopHit => write!(f, "STOP LOSS"),
            CloseReason::OperatorStop => write!(f, "OPERATOR STOP"),
            CloseReason::ExecutionFailure => write!(f, "EXECUTION FAILURE"),
        }
    }
}

/// Immutable record of a finished round trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClosedTrade {
    pub id: String,
    pub symbol: String,
    pub source: SourceKind,
    pub entry_price: Decimal,
    /// `None` when the position was force-closed without a sell fill.
    pub exit_price: Option<Decimal>,
    /// exit / entry. `None` alongside `exit_price`.
    pub multiplier: Option<Decimal>,
    /// Realized profit in the settlement unit.
    pub profit: Decimal,
    pub reason: CloseReason,
    pub hold_secs: i64,
    pub closed_at: DateTime<Utc>,
}

impl fmt::Display for ClosedTrade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.profit > Decimal::ZERO { "+" } else { "" };
        let mult = self
            .multiplier
            .map(|m| format!("{:.2}x", m))
            .unwrap_or_else(|| "n/a".to_string());
        write!(
            f,
            "{} [{}] {} | {sign}{:.4} | {:.1} min | {}",
            self.symbol,
            self.source,
            mult,
            self.profit,
            self.hold_minutes(),
            self.reason,
        )
    }
}

impl ClosedTrade {
    /// Build the record for a sell that filled at `exit_price`.
    pub fn from_fill(
        position: &Position,
        exit_price: Decimal,
        reason: CloseReason,
        closed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: position.id.clone(),
            symbol: position.symbol.clone(),
            source: position.source,
            entry_price: position.entry_price,
            exit_price: Some(exit_price),
            multiplier: Some(position.multiplier_at(exit_price)),
            profit: position.profit_at(exit_price),
            reason,
            hold_secs: position.held_for(closed_at).num_seconds().max(0),
            closed_at,
        }
    }

    /// Build the record for a position abandoned after repeated sell failures.
    pub fn abandoned(position: &Position, closed_at: DateTime<Utc>) -> Self {
        Self {
            id: position.id.clone(),
            symbol: position.symbol.clone(),
            source: position.source,
            entry_price: position.entry_price,
            exit_price: None,
            multiplier: None,
            profit: Decimal::ZERO,
            reason: CloseReason::ExecutionFailure,
            hold_secs: position.held_for(closed_at).num_seconds().max(0),
            closed_at,
        }
    }

    pub fn hold_minutes(&self) -> f64 {
        self.hold_secs as f64 / 60.0
    }

    pub fn is_win(&self) -> bool {
        self.profit > Decimal::ZERO
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Why an admission attempt was turned down before any execution.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AdmissionRejected {
    #[error("score {score} below threshold {threshold}")]
    BelowThreshold { score: u32, threshold: u32 },

    #[error("at capacity ({open}/{max} positions)")]
    AtCapacity { open: usize, max: usize },

    #[error("position already open")]
    AlreadyOpen,

    #[error("asset already traded this run")]
    AlreadyTraded,
}

/// Domain-specific error types for SNIPER.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Admission rejected for {id}: {reason}")]
    Rejected { id: String, reason: AdmissionRejected },

    #[error("No open position: {0}")]
    NotFound(String),

    #[error("Close already in progress: {0}")]
    CloseInProgress(String),

    #[error("{side} execution failed for {id}: {message}")]
    Execution {
        id: String,
        side: TradeSide,
        message: String,
    },
}

/// Abbreviate a long base58 identifier for log lines.
pub fn short_id(id: &str) -> String {
    if id.chars().count() <= 12 {
        id.to_string()
    } else {
        let head: String = id.chars().take(4).collect();
        let skip = id.chars().count() - 4;
        let tail: String = id.chars().skip(skip).collect();
        format!("{head}…{tail}")
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
