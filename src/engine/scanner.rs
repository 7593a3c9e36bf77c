//! Multi-source launch scanner.
//!
//! Fans out to every discovery source concurrently, normalizes the
//! heterogeneous raw records into [`Candidate`]s, drops anything already
//! traded or held, and caps each source's contribution so one noisy
//! feed cannot flood a cycle.

use anyhow::anyhow;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::types::{Candidate, Metric, Metrics, RawRecord, SourceKind};
use crate::venues::SourceConnector;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Maximum candidates taken from a single source per cycle.
pub const DEFAULT_PER_SOURCE_LIMIT: usize = 10;

/// Boost records at or below this amount are tagged `DexFresh`.
pub const DEFAULT_DEX_BOOST_SPLIT: f64 = 1_000.0;

/// A source that has not answered within this window counts as failed.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(8);

#[derive(Debug, Clone)]
pub struct ScanSettings {
    pub per_source_limit: usize,
    /// Only boost records on this chain are considered.
    pub chain: String,
    pub dex_boost_split: f64,
    pub fetch_timeout: Duration,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            per_source_limit: DEFAULT_PER_SOURCE_LIMIT,
            chain: "solana".to_string(),
            dex_boost_split: DEFAULT_DEX_BOOST_SPLIT,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }
}

/// What one scan produced.
#[derive(Debug, Clone, Default)]
pub struct ScanOutcome {
    /// Candidates in source registration order, each source's own order kept.
    pub candidates: Vec<Candidate>,
    pub raw_records: usize,
    pub sources_failed: usize,
}

// ---------------------------------------------------------------------------
// Aggregator
// ---------------------------------------------------------------------------

pub struct SourceAggregator {
    sources: Vec<Arc<dyn SourceConnector>>,
    settings: ScanSettings,
}

impl SourceAggregator {
    pub fn new(sources: Vec<Arc<dyn SourceConnector>>, settings: ScanSettings) -> Self {
        Self { sources, settings }
    }

    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    /// Fetch every source concurrently and return fresh candidates.
    ///
    /// `exclude` holds identifiers that are already traded or open.
    /// A failing or unresponsive source contributes nothing; the scan
    /// itself never fails and never waits past `fetch_timeout`.
    pub async fn scan(&self, exclude: &HashSet<String>) -> ScanOutcome {
        let limit = self.settings.fetch_timeout;
        let fetches = self.sources.iter().map(|s| async move {
            tokio::time::timeout(limit, s.fetch())
                .await
                .unwrap_or_else(|_| Err(anyhow!("no response within {limit:?}")))
        });
        let results = join_all(fetches).await;

        let now = Utc::now();
        let mut outcome = ScanOutcome::default();
        let mut emitted: HashSet<String> = HashSet::new();

        for (source, result) in self.sources.iter().zip(results) {
            let records = match result {
                Ok(records) => records,
                Err(e) => {
                    warn!(
                        source = source.name(),
                        error = %e,
                        "Source fetch failed, continuing without"
                    );
                    outcome.sources_failed += 1;
                    continue;
                }
            };
            outcome.raw_records += records.len();

            let fresh: Vec<Candidate> = records
                .iter()
                .filter_map(|r| self.normalize(r, now))
                .filter(|c| !exclude.contains(&c.id))
                .filter(|c| emitted.insert(c.id.clone()))
                .take(self.settings.per_source_limit)
                .collect();

            debug!(
                source = source.name(),
                raw = records.len(),
                fresh = fresh.len(),
                "Source normalized"
            );
            outcome.candidates.extend(fresh);
        }

        info!(
            sources = self.sources.len(),
            failed = outcome.sources_failed,
            raw = outcome.raw_records,
            candidates = outcome.candidates.len(),
            "Scan complete"
        );

        outcome
    }

    // -- Normalization ---------------------------------------------------

    /// Map one raw record to a candidate, or `None` if it is unusable.
    pub fn normalize(&self, record: &RawRecord, now: DateTime<Utc>) -> Option<Candidate> {
        let candidate = match record {
            RawRecord::PumpLaunch {
                mint,
                symbol,
                name,
                created_at,
                supply,
                uri,
                ..
            } => {
                let metadata = [symbol.as_deref(), name.as_deref(), uri.as_deref()]
                    .iter()
                    .filter(|f| f.is_some_and(|s| !s.trim().is_empty()))
                    .count();
                let age = created_at.map(|t| ((now - t).num_seconds().max(0) as f64) / 60.0);

                Candidate {
                    id: mint.clone(),
                    symbol: non_empty(symbol).unwrap_or("UNKNOWN").to_string(),
                    name: non_empty(name).unwrap_or("Unknown").to_string(),
                    source: SourceKind::PumpEarly,
                    metrics: Metrics::new()
                        .with(Metric::MetadataFields, metadata as f64)
                        .with_opt(Metric::Supply, *supply)
                        .with_opt(Metric::AgeMinutes, age),
                }
            }
            RawRecord::Boost {
                chain_id,
                token_address,
                amount,
                total_amount,
                ..
            } => {
                if !chain_id.eq_ignore_ascii_case(&self.settings.chain) {
                    return None;
                }
                let source = if *amount > self.settings.dex_boost_split {
                    SourceKind::Dex
                } else {
                    SourceKind::DexFresh
                };

                Candidate {
                    id: token_address.clone(),
                    symbol: "BOOST".to_string(),
                    name: "Boosted Token".to_string(),
                    source,
                    metrics: Metrics::new()
                        .with(Metric::BoostAmount, *amount)
                        .with_opt(Metric::BoostTotal, *total_amount),
                }
            }
            RawRecord::KingOfHill {
                mint,
                symbol,
                name,
                market_cap,
                volume_24h,
                liquidity,
                price_change,
            } => Candidate {
                id: mint.clone(),
                symbol: non_empty(symbol).unwrap_or("UNKNOWN").to_string(),
                name: non_empty(name).unwrap_or("Unknown").to_string(),
                source: SourceKind::KingOfHill,
                metrics: Metrics::new()
                    .with(Metric::MarketCap, *market_cap)
                    .with_opt(Metric::Volume24h, *volume_24h)
                    .with_opt(Metric::Liquidity, *liquidity)
                    .with_opt(Metric::PriceChange, *price_change),
            },
        };

        if candidate.id.trim().is_empty() {
            return None;
        }
        Some(candidate)
    }
}

fn non_empty(field: &Option<String>) -> Option<&str> {
    field.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
