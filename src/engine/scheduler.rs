//! Cycle scheduler: drives discover → score → admit at a fixed cadence.
//!
//! Cycles never overlap: the next one is scheduled only after the previous
//! completes or fails. Stopping ends the loop but leaves open positions to
//! their monitors.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::engine::positions::PositionManager;
use crate::engine::scanner::SourceAggregator;
use crate::engine::EngineEvent;
use crate::strategy::AdmissionScorer;
use crate::types::{short_id, EngineError};

#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    pub cycle_interval: Duration,
    /// Pause after each buy attempt within a cycle.
    pub admission_pacing: Duration,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            cycle_interval: Duration::from_secs(20),
            admission_pacing: Duration::from_secs(3),
        }
    }
}

/// Summary of one completed cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleReport {
    pub cycle_number: u64,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub sources_failed: usize,
    pub raw_records: usize,
    pub candidates: usize,
    /// Candidates scoring under the threshold.
    pub below_threshold: usize,
    /// Identifiers opened this cycle, in admission order.
    pub admitted: Vec<String>,
    pub buy_failures: usize,
    /// Admissions the position manager turned down (capacity or dedup races).
    pub refused: usize,
    pub open_after: usize,
}

pub struct CycleScheduler {
    aggregator: SourceAggregator,
    scorer: AdmissionScorer,
    manager: Arc<PositionManager>,
    settings: SchedulerSettings,
    cycles: AtomicU64,
}

impl CycleScheduler {
    pub fn new(
        aggregator: SourceAggregator,
        scorer: AdmissionScorer,
        manager: Arc<PositionManager>,
        settings: SchedulerSettings,
    ) -> Self {
        Self {
            aggregator,
            scorer,
            manager,
            settings,
            cycles: AtomicU64::new(0),
        }
    }

    pub fn cycles_run(&self) -> u64 {
        self.cycles.load(Ordering::SeqCst)
    }

    /// Loop until `stop` flips to `true` or its sender is dropped.
    pub async fn run(&self, mut stop: watch::Receiver<bool>) {
        info!(
            interval_secs = self.settings.cycle_interval.as_secs(),
            sources = self.aggregator.source_count(),
            max_positions = self.scorer.max_positions(),
            "Scheduler started"
        );

        loop {
            if *stop.borrow() {
                break;
            }

            if let Err(e) = self.run_cycle().await {
                error!(error = %e, "Cycle failed, continuing to next");
            }

            tokio::select! {
                _ = tokio::time::sleep(self.settings.cycle_interval) => {}
                changed = stop.changed() => {
                    if changed.is_err() || *stop.borrow() {
                        break;
                    }
                }
            }
        }

        info!(cycles = self.cycles_run(), "Scheduler stopped");
    }

    /// One discover → score → admit pass.
    pub async fn run_cycle(&self) -> Result<CycleReport> {
        let cycle_number = self.cycles.fetch_add(1, Ordering::SeqCst) + 1;
        let started_at = Utc::now();
        let clock = Instant::now();
        debug!(cycle = cycle_number, "Starting cycle");

        let known = self.manager.known_ids().await;
        let scan = self.aggregator.scan(&known).await;

        let mut report = CycleReport {
            cycle_number,
            started_at,
            duration_ms: 0,
            sources_failed: scan.sources_failed,
            raw_records: scan.raw_records,
            candidates: scan.candidates.len(),
            below_threshold: 0,
            admitted: Vec::new(),
            buy_failures: 0,
            refused: 0,
            open_after: 0,
        };

        for candidate in scan.candidates {
            let occupied = self.manager.occupied().await;
            if occupied >= self.scorer.max_positions() {
                debug!(occupied, "Capacity exhausted, ending admissions");
                break;
            }

            let scored = self.scorer.assess(candidate, occupied);
            if !scored.admit {
                report.below_threshold += 1;
                continue;
            }

            match self.manager.open(&scored.candidate, scored.score).await {
                Ok(position) => report.admitted.push(position.id),
                Err(EngineError::Execution { .. }) => report.buy_failures += 1,
                Err(EngineError::Rejected { id, reason }) => {
                    warn!(id = %short_id(&id), reason = %reason, "Admission refused");
                    report.refused += 1;
                    continue;
                }
                Err(e) => return Err(e.into()),
            }

            tokio::time::sleep(self.settings.admission_pacing).await;
        }

        report.open_after = self.manager.open_count().await;
        report.duration_ms = clock.elapsed().as_millis() as u64;

        info!(
            cycle = report.cycle_number,
            candidates = report.candidates,
            admitted = report.admitted.len(),
            buy_failures = report.buy_failures,
            below_threshold = report.below_threshold,
            sources_failed = report.sources_failed,
            open = report.open_after,
            "Cycle complete"
        );
        self.manager.emit(EngineEvent::CycleCompleted(report.clone()));
        self.manager
            .stats()
            .await
            .log_summary(report.open_after, self.scorer.max_positions());

        Ok(report)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
