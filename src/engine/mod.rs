//! Core engine: the discover → score → admit loop and position lifecycle.

pub mod ledger;
pub mod monitor;
pub mod positions;
pub mod registry;
pub mod scanner;
pub mod scheduler;

use crate::types::{ClosedTrade, Position, SourceKind};
use scheduler::CycleReport;

/// Lifecycle notifications for reporting surfaces (alerts, dashboards).
///
/// Delivered over a `tokio::sync::broadcast` channel; slow subscribers
/// lag and drop events rather than stall the engine.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    Opened(Position),
    BuyFailed {
        id: String,
        symbol: String,
        source: SourceKind,
        error: String,
    },
    SellFailed {
        id: String,
        symbol: String,
        error: String,
    },
    Closed(ClosedTrade),
    /// Position given up after repeated sell failures.
    ForceClosed(ClosedTrade),
    CycleCompleted(CycleReport),
}
