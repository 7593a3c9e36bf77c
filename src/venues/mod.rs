//! Collaborator contracts.
//!
//! Defines the traits the engine talks to and provides offline
//! implementations for running without network access:
//! - `file_feed`: JSON-file backed discovery sources and price oracle
//! - `paper`: dry-run execution venue filling at oracle prices

pub mod file_feed;
pub mod paper;

use anyhow::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;

#[cfg(test)]
use mockall::automock;

use crate::types::{BuyFill, RawRecord, SellFill};

/// A discovery feed of newly listed assets.
///
/// Implementors return a bounded, most-recent-first list of raw records.
/// Errors are swallowed by the aggregator and never abort a cycle.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait SourceConnector: Send + Sync {
    /// Fetch the latest batch of raw records.
    async fn fetch(&self) -> Result<Vec<RawRecord>>;

    /// Connector name for logging and identification.
    fn name(&self) -> &str;
}

/// Current reference price for an owned asset.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait PriceOracle: Send + Sync {
    async fn current_price(&self, id: &str) -> Result<Decimal>;
}

/// Where buys and sells are actually executed.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ExecutionVenue: Send + Sync {
    /// Spend `budget` (settlement unit) on `id`.
    async fn buy(&self, id: &str, budget: Decimal) -> Result<BuyFill>;

    /// Sell the full held `quantity` of `id`.
    async fn sell(&self, id: &str, quantity: Decimal) -> Result<SellFill>;

    /// Venue name for logging.
    fn name(&self) -> &str;
}
