//! Position manager: sole owner of the open-position table.
//!
//! Every mutation of the table goes through `open`, `close` or
//! `force_close`. The table, in-flight buy reservations and the trade
//! ledger share one lock, so removing a position and recording its
//! closed trade are observed together. No lock is held across a venue
//! call.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::engine::ledger::{LedgerStats, TradeLedger};
use crate::engine::monitor::{ExitMonitor, MonitorOutcome, MonitorSettings};
use crate::engine::registry::DedupRegistry;
use crate::engine::EngineEvent;
use crate::strategy::exits::ExitTable;
use crate::types::{
    short_id, AdmissionRejected, BuyFill, Candidate, CloseReason, ClosedTrade, EngineError,
    Position, TradeSide,
};
use crate::venues::{ExecutionVenue, PriceOracle};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ManagerSettings {
    /// Settlement-unit amount spent per admission.
    pub budget: Decimal,
    pub max_positions: usize,
    pub admission_threshold: u32,
}

impl Default for ManagerSettings {
    fn default() -> Self {
        Self {
            budget: dec!(0.03),
            max_positions: 5,
            admission_threshold: crate::strategy::DEFAULT_ADMISSION_THRESHOLD,
        }
    }
}

// ---------------------------------------------------------------------------
// Reporting snapshot
// ---------------------------------------------------------------------------

/// Read-only view of the book for reporting surfaces.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub taken_at: DateTime<Utc>,
    pub max_positions: usize,
    pub open_positions: Vec<Position>,
    pub trades: Vec<ClosedTrade>,
    pub stats: LedgerStats,
}

// ---------------------------------------------------------------------------
// Book
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct Slot {
    position: Position,
    /// A sell is in flight for this position.
    closing: bool,
}

#[derive(Debug, Default)]
struct Book {
    open: HashMap<String, Slot>,
    /// Identifiers with a buy in flight; they count against capacity.
    pending: HashSet<String>,
    ledger: TradeLedger,
}

// ---------------------------------------------------------------------------
// Manager
// ---------------------------------------------------------------------------

pub struct PositionManager {
    book: RwLock<Book>,
    registry: DedupRegistry,
    venue: Arc<dyn ExecutionVenue>,
    oracle: Arc<dyn PriceOracle>,
    exits: ExitTable,
    settings: ManagerSettings,
    monitor_settings: MonitorSettings,
    monitors: Mutex<HashMap<String, JoinHandle<MonitorOutcome>>>,
    events: broadcast::Sender<EngineEvent>,
}

impl PositionManager {
    pub fn new(
        venue: Arc<dyn ExecutionVenue>,
        oracle: Arc<dyn PriceOracle>,
        exits: ExitTable,
        settings: ManagerSettings,
        monitor_settings: MonitorSettings,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(256);
        Arc::new(Self {
            book: RwLock::new(Book::default()),
            registry: DedupRegistry::new(),
            venue,
            oracle,
            exits,
            settings,
            monitor_settings,
            monitors: Mutex::new(HashMap::new()),
            events,
        })
    }

    pub fn settings(&self) -> &ManagerSettings {
        &self.settings
    }

    pub fn exits(&self) -> &ExitTable {
        &self.exits
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    pub(crate) fn emit(&self, event: EngineEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    // -- Open ------------------------------------------------------------

    /// Buy into an admitted candidate and start watching it.
    ///
    /// On buy failure nothing is recorded, so the asset may be retried in a
    /// later cycle. Opening an identifier that is already open is a bug in
    /// the caller and panics in debug builds.
    pub async fn open(
        self: &Arc<Self>,
        candidate: &Candidate,
        score: u32,
    ) -> Result<Position, EngineError> {
        let id = candidate.id.clone();
        let reject = |reason| EngineError::Rejected {
            id: id.clone(),
            reason,
        };

        if score < self.settings.admission_threshold {
            return Err(reject(AdmissionRejected::BelowThreshold {
                score,
                threshold: self.settings.admission_threshold,
            }));
        }

        {
            let mut book = self.book.write().await;
            debug_assert!(
                !book.open.contains_key(&id),
                "open() called for already-open position {id}"
            );
            if book.open.contains_key(&id) || book.pending.contains(&id) {
                return Err(reject(AdmissionRejected::AlreadyOpen));
            }
            if self.registry.contains(&id) {
                return Err(reject(AdmissionRejected::AlreadyTraded));
            }
            let occupied = book.open.len() + book.pending.len();
            if occupied >= self.settings.max_positions {
                return Err(reject(AdmissionRejected::AtCapacity {
                    open: occupied,
                    max: self.settings.max_positions,
                }));
            }
            book.pending.insert(id.clone());
        }

        info!(
            id = %short_id(&id),
            symbol = %candidate.symbol,
            source = %candidate.source,
            score,
            budget = %self.settings.budget,
            "Sniping"
        );

        let fill = match self.venue.buy(&id, self.settings.budget).await {
            Ok(fill) if fill.fill_price > Decimal::ZERO && fill.quantity > Decimal::ZERO => fill,
            Ok(fill) => {
                let message = format!(
                    "degenerate fill: price={} quantity={}",
                    fill.fill_price, fill.quantity
                );
                return Err(self.buy_failed(candidate, message).await);
            }
            Err(e) => return Err(self.buy_failed(candidate, format!("{e:#}")).await),
        };

        let position = self.build_position(candidate, &fill);
        {
            let mut book = self.book.write().await;
            book.pending.remove(&id);
            self.registry.insert(&id);
            book.open.insert(
                id.clone(),
                Slot {
                    position: position.clone(),
                    closing: false,
                },
            );
        }

        info!(
            id = %short_id(&id),
            symbol = %position.symbol,
            source = %position.source,
            entry = %position.entry_price,
            quantity = %position.quantity.round_dp(4),
            target = %position.target_multiplier,
            stop = %position.stop_multiplier,
            order_id = %fill.order_id,
            "Position opened"
        );
        self.emit(EngineEvent::Opened(position.clone()));

        let monitor = ExitMonitor::new(
            self.clone(),
            self.oracle.clone(),
            position.clone(),
            self.monitor_settings.clone(),
        );
        let handle = tokio::spawn(monitor.run());
        {
            let mut monitors = self.monitors.lock().unwrap_or_else(|e| e.into_inner());
            monitors.retain(|_, h| !h.is_finished());
            monitors.insert(id, handle);
        }

        Ok(position)
    }

    fn build_position(&self, candidate: &Candidate, fill: &BuyFill) -> Position {
        let policy = self.exits.policy_for(candidate.source);
        Position {
            id: candidate.id.clone(),
            symbol: candidate.symbol.clone(),
            source: candidate.source,
            entry_price: fill.fill_price,
            quantity: fill.quantity,
            budget: self.settings.budget,
            opened_at: Utc::now(),
            target_multiplier: policy.target_multiplier,
            stop_multiplier: policy.stop_multiplier,
        }
    }

    async fn buy_failed(&self, candidate: &Candidate, message: String) -> EngineError {
        self.book.write().await.pending.remove(&candidate.id);

        warn!(
            id = %short_id(&candidate.id),
            symbol = %candidate.symbol,
            venue = self.venue.name(),
            error = %message,
            "Buy failed"
        );
        self.emit(EngineEvent::BuyFailed {
            id: candidate.id.clone(),
            symbol: candidate.symbol.clone(),
            source: candidate.source,
            error: message.clone(),
        });

        EngineError::Execution {
            id: candidate.id.clone(),
            side: TradeSide::Buy,
            message,
        }
    }

    // -- Close -----------------------------------------------------------

    /// Sell the full position and record the closed trade.
    ///
    /// On sell failure the position stays open. Closing an identifier that
    /// is not open yields `NotFound` and records nothing.
    pub async fn close(&self, id: &str, reason: CloseReason) -> Result<ClosedTrade, EngineError> {
        let position = {
            let mut book = self.book.write().await;
            let slot = book
                .open
                .get_mut(id)
                .ok_or_else(|| EngineError::NotFound(id.to_string()))?;
            if slot.closing {
                return Err(EngineError::CloseInProgress(id.to_string()));
            }
            slot.closing = true;
            slot.position.clone()
        };

        info!(
            id = %short_id(id),
            symbol = %position.symbol,
            reason = %reason,
            "Selling"
        );

        let fill = match self.venue.sell(id, position.quantity).await {
            Ok(fill) if fill.fill_price > Decimal::ZERO => fill,
            Ok(fill) => {
                let message = format!("degenerate fill: price={}", fill.fill_price);
                return Err(self.sell_failed(&position, message).await);
            }
            Err(e) => return Err(self.sell_failed(&position, format!("{e:#}")).await),
        };

        let trade = ClosedTrade::from_fill(&position, fill.fill_price, reason, Utc::now());
        {
            let mut book = self.book.write().await;
            book.open.remove(id);
            book.ledger.append(trade.clone());
        }

        info!(
            id = %short_id(id),
            symbol = %trade.symbol,
            source = %trade.source,
            multiplier = %trade.multiplier.unwrap_or_default().round_dp(2),
            profit = %trade.profit.round_dp(6),
            hold_min = format!("{:.1}", trade.hold_minutes()),
            reason = %reason,
            order_id = %fill.order_id,
            "Position closed"
        );
        self.emit(EngineEvent::Closed(trade.clone()));

        Ok(trade)
    }

    async fn sell_failed(&self, position: &Position, message: String) -> EngineError {
        let id = &position.id;
        if let Some(slot) = self.book.write().await.open.get_mut(id) {
            slot.closing = false;
        }
        warn!(
            id = %short_id(id),
            symbol = %position.symbol,
            venue = self.venue.name(),
            error = %message,
            "Sell failed, position stays open"
        );
        self.emit(EngineEvent::SellFailed {
            id: id.clone(),
            symbol: position.symbol.clone(),
            error: message.clone(),
        });

        EngineError::Execution {
            id: id.clone(),
            side: TradeSide::Sell,
            message,
        }
    }

    /// Drop a position without selling, recording an execution-failure trade.
    pub async fn force_close(&self, id: &str) -> Result<ClosedTrade, EngineError> {
        let trade = {
            let mut book = self.book.write().await;
            match book.open.get(id) {
                None => return Err(EngineError::NotFound(id.to_string())),
                Some(slot) if slot.closing => {
                    return Err(EngineError::CloseInProgress(id.to_string()))
                }
                Some(_) => {}
            }
            let slot = book
                .open
                .remove(id)
                .ok_or_else(|| EngineError::NotFound(id.to_string()))?;
            let trade = ClosedTrade::abandoned(&slot.position, Utc::now());
            book.ledger.append(trade.clone());
            trade
        };

        error!(
            id = %short_id(id),
            symbol = %trade.symbol,
            hold_min = format!("{:.1}", trade.hold_minutes()),
            "Position abandoned after repeated sell failures"
        );
        self.emit(EngineEvent::ForceClosed(trade.clone()));

        Ok(trade)
    }

    // -- Read access -----------------------------------------------------

    pub async fn is_open(&self, id: &str) -> bool {
        self.book.read().await.open.contains_key(id)
    }

    pub async fn open_count(&self) -> usize {
        self.book.read().await.open.len()
    }

    /// Open positions plus buys in flight.
    pub async fn occupied(&self) -> usize {
        let book = self.book.read().await;
        book.open.len() + book.pending.len()
    }

    pub async fn position(&self, id: &str) -> Option<Position> {
        self.book.read().await.open.get(id).map(|s| s.position.clone())
    }

    /// Open positions, oldest first.
    pub async fn positions(&self) -> Vec<Position> {
        let book = self.book.read().await;
        let mut positions: Vec<Position> = book.open.values().map(|s| s.position.clone()).collect();
        positions.sort_by(|a, b| a.opened_at.cmp(&b.opened_at).then_with(|| a.id.cmp(&b.id)));
        positions
    }

    pub async fn trades(&self) -> Vec<ClosedTrade> {
        self.book.read().await.ledger.trades().to_vec()
    }

    pub async fn recent_trades(&self, n: usize) -> Vec<ClosedTrade> {
        self.book.read().await.ledger.recent(n)
    }

    pub async fn stats(&self) -> LedgerStats {
        self.book.read().await.ledger.stats()
    }

    pub fn was_traded(&self, id: &str) -> bool {
        self.registry.contains(id)
    }

    /// Identifiers the scanner must skip: everything traded, open or in flight.
    pub async fn known_ids(&self) -> HashSet<String> {
        let book = self.book.read().await;
        let mut known = self.registry.snapshot();
        known.extend(book.open.keys().cloned());
        known.extend(book.pending.iter().cloned());
        known
    }

    /// Consistent view of open positions and the ledger, taken under one lock.
    pub async fn snapshot(&self) -> Snapshot {
        let book = self.book.read().await;
        let mut open_positions: Vec<Position> =
            book.open.values().map(|s| s.position.clone()).collect();
        open_positions.sort_by(|a, b| a.opened_at.cmp(&b.opened_at).then_with(|| a.id.cmp(&b.id)));
        Snapshot {
            taken_at: Utc::now(),
            max_positions: self.settings.max_positions,
            open_positions,
            trades: book.ledger.trades().to_vec(),
            stats: book.ledger.stats(),
        }
    }

    /// Detach the watch task for a position, e.g. to await its outcome.
    pub fn take_monitor(&self, id: &str) -> Option<JoinHandle<MonitorOutcome>> {
        self.monitors
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(id)
    }

    /// Number of watch tasks still running.
    pub fn active_monitors(&self) -> usize {
        let mut monitors = self.monitors.lock().unwrap_or_else(|e| e.into_inner());
        monitors.retain(|_, h| !h.is_finished());
        monitors.len()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
