//! Exit monitor: one watch task per open position.
//!
//! Polls the price oracle and asks the position manager to close once the
//! multiplier crosses the position's target or stop. Runs as an explicit
//! state machine so every transition is a single match arm.

use anyhow::anyhow;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::engine::positions::PositionManager;
use crate::types::{short_id, CloseReason, EngineError, Position};
use crate::venues::PriceOracle;

#[derive(Debug, Clone)]
pub struct MonitorSettings {
    /// Wait before the first price check.
    pub initial_delay: Duration,
    pub poll_interval: Duration,
    /// Wait after a failed price fetch.
    pub error_backoff: Duration,
    /// A price query still unanswered after this counts as failed.
    pub price_timeout: Duration,
    /// Wait after a failed sell before re-checking.
    pub sell_retry_delay: Duration,
    /// Failed sells tolerated before the position is force closed.
    pub max_sell_attempts: u32,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(10),
            poll_interval: Duration::from_secs(15),
            error_backoff: Duration::from_secs(20),
            price_timeout: Duration::from_secs(8),
            sell_retry_delay: Duration::from_secs(30),
            max_sell_attempts: 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorOutcome {
    /// This monitor closed the position.
    Closed(CloseReason),
    /// The position left the table some other way.
    ClosedElsewhere,
    /// Sells kept failing; the position was force closed.
    Abandoned,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    Watching { delay: Duration },
    Closing { reason: CloseReason },
    Done(MonitorOutcome),
}

/// Exit decision for a price observation, if any.
pub fn evaluate(position: &Position, price: Decimal) -> Option<CloseReason> {
    let multiplier = position.multiplier_at(price);
    if multiplier >= position.target_multiplier {
        Some(CloseReason::TargetHit)
    } else if multiplier <= position.stop_multiplier {
        Some(CloseReason::StopHit)
    } else {
        None
    }
}

pub struct ExitMonitor {
    manager: Arc<PositionManager>,
    oracle: Arc<dyn PriceOracle>,
    position: Position,
    settings: MonitorSettings,
    sell_failures: u32,
}

impl ExitMonitor {
    pub fn new(
        manager: Arc<PositionManager>,
        oracle: Arc<dyn PriceOracle>,
        position: Position,
        settings: MonitorSettings,
    ) -> Self {
        Self {
            manager,
            oracle,
            position,
            settings,
            sell_failures: 0,
        }
    }

    /// Drive the state machine until the position is gone.
    pub async fn run(mut self) -> MonitorOutcome {
        let mut state = MonitorState::Watching {
            delay: self.settings.initial_delay,
        };
        loop {
            state = match state {
                MonitorState::Watching { delay } => {
                    tokio::time::sleep(delay).await;
                    self.watch().await
                }
                MonitorState::Closing { reason } => self.try_close(reason).await,
                MonitorState::Done(outcome) => {
                    debug!(
                        id = %short_id(&self.position.id),
                        outcome = ?outcome,
                        "Monitor finished"
                    );
                    return outcome;
                }
            };
        }
    }

    async fn watch(&self) -> MonitorState {
        let id = &self.position.id;
        if !self.manager.is_open(id).await {
            return MonitorState::Done(MonitorOutcome::ClosedElsewhere);
        }

        let limit = self.settings.price_timeout;
        let quote = tokio::time::timeout(limit, self.oracle.current_price(id))
            .await
            .unwrap_or_else(|_| Err(anyhow!("no quote within {limit:?}")));
        let price = match quote {
            Ok(price) => price,
            Err(e) => {
                warn!(
                    id = %short_id(id),
                    symbol = %self.position.symbol,
                    error = %e,
                    "Price check failed"
                );
                return MonitorState::Watching {
                    delay: self.settings.error_backoff,
                };
            }
        };

        let multiplier = self.position.multiplier_at(price);
        match evaluate(&self.position, price) {
            Some(reason) => {
                // Another path may have closed it while the oracle was queried.
                if !self.manager.is_open(id).await {
                    return MonitorState::Done(MonitorOutcome::ClosedElsewhere);
                }
                info!(
                    id = %short_id(id),
                    symbol = %self.position.symbol,
                    multiplier = %multiplier.round_dp(2),
                    reason = %reason,
                    "Exit triggered"
                );
                MonitorState::Closing { reason }
            }
            None => {
                debug!(
                    id = %short_id(id),
                    symbol = %self.position.symbol,
                    price = %price,
                    multiplier = %multiplier.round_dp(3),
                    "Holding"
                );
                MonitorState::Watching {
                    delay: self.settings.poll_interval,
                }
            }
        }
    }

    async fn try_close(&mut self, reason: CloseReason) -> MonitorState {
        let id = &self.position.id;
        match self.manager.close(id, reason).await {
            Ok(_) => MonitorState::Done(MonitorOutcome::Closed(reason)),
            Err(EngineError::NotFound(_)) => MonitorState::Done(MonitorOutcome::ClosedElsewhere),
            Err(EngineError::CloseInProgress(_)) => MonitorState::Watching {
                delay: self.settings.poll_interval,
            },
            Err(e) => {
                self.sell_failures += 1;
                if self.sell_failures >= self.settings.max_sell_attempts {
                    warn!(
                        id = %short_id(id),
                        attempts = self.sell_failures,
                        error = %e,
                        "Giving up on sell"
                    );
                    return match self.manager.force_close(id).await {
                        Ok(_) => MonitorState::Done(MonitorOutcome::Abandoned),
                        Err(EngineError::CloseInProgress(_)) => MonitorState::Watching {
                            delay: self.settings.poll_interval,
                        },
                        Err(_) => MonitorState::Done(MonitorOutcome::ClosedElsewhere),
                    };
                }
                MonitorState::Watching {
                    delay: self.settings.sell_retry_delay,
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
