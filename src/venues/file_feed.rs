//! JSON-file backed feeds.
//!
//! Lets the engine run against snapshots written by an external process
//! (a feed sidecar, a replay tool, or a test fixture). Every call re-reads
//! the file, so the writer can replace it between cycles.

use anyhow::{Context, Result};
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::debug;

use crate::types::RawRecord;
use crate::venues::{PriceOracle, SourceConnector};

// ---------------------------------------------------------------------------
// Discovery source
// ---------------------------------------------------------------------------

/// Source connector reading a JSON array of [`RawRecord`]s.
pub struct JsonFileSource {
    name: String,
    path: PathBuf,
}

impl JsonFileSource {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
        }
    }
}

#[async_trait]
impl SourceConnector for JsonFileSource {
    async fn fetch(&self) -> Result<Vec<RawRecord>> {
        let json = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("Failed to read feed file: {}", self.path.display()))?;

        let records: Vec<RawRecord> = serde_json::from_str(&json)
            .with_context(|| format!("Failed to parse feed file: {}", self.path.display()))?;

        debug!(source = %self.name, count = records.len(), "Feed file loaded");
        Ok(records)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

// ---------------------------------------------------------------------------
// Price oracle
// ---------------------------------------------------------------------------

/// Price oracle reading a JSON object of `{ "<identifier>": <price> }`.
pub struct JsonFilePriceOracle {
    path: PathBuf,
}

impl JsonFilePriceOracle {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    async fn load(&self) -> Result<HashMap<String, Decimal>> {
        let json = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("Failed to read price file: {}", self.path.display()))?;

        serde_json::from_str(&json)
            .with_context(|| format!("Failed to parse price file: {}", self.path.display()))
    }
}

#[async_trait]
impl PriceOracle for JsonFilePriceOracle {
    async fn current_price(&self, id: &str) -> Result<Decimal> {
        let prices = self.load().await?;
        match prices.get(id) {
            Some(price) if *price > Decimal::ZERO => Ok(*price),
            Some(price) => anyhow::bail!("Non-positive price {price} for {id}"),
            None => anyhow::bail!("No price quoted for {id}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
