//! Configuration loading from TOML.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! Every section is optional; missing keys fall back to the engine's
//! defaults.

use anyhow::{bail, Context, Result};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::time::Duration;

use crate::engine::monitor::MonitorSettings;
use crate::engine::positions::ManagerSettings;
use crate::engine::scanner::{
    ScanSettings, DEFAULT_DEX_BOOST_SPLIT, DEFAULT_FETCH_TIMEOUT, DEFAULT_PER_SOURCE_LIMIT,
};
use crate::engine::scheduler::SchedulerSettings;
use crate::strategy::exits::{ExitPolicy, ExitTable};
use crate::strategy::scoring::ScoringTable;
use crate::strategy::{AdmissionScorer, DEFAULT_ADMISSION_THRESHOLD};
use crate::types::SourceKind;

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub agent: AgentConfig,
    pub engine: EngineConfig,
    pub monitor: MonitorConfig,
    pub exits: ExitsConfig,
    pub feeds: FeedsConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AgentConfig {
    pub name: String,
    /// Where the reporting snapshot is written on shutdown.
    pub snapshot_path: String,
    /// Emit JSON log lines (also enabled by `SNIPER_LOG_JSON`).
    pub log_json: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            name: "SNIPER-001".to_string(),
            snapshot_path: crate::storage::DEFAULT_SNAPSHOT_FILE.to_string(),
            log_json: false,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EngineConfig {
    /// Settlement-unit amount spent per admission.
    pub budget: Decimal,
    pub max_positions: usize,
    pub admission_threshold: u32,
    pub cycle_interval_secs: u64,
    pub admission_pacing_secs: u64,
    pub per_source_limit: usize,
    pub chain: String,
    /// Boost amount separating `dex_fresh` from `dex`; drives both the
    /// scanner tag and the boost rubrics.
    pub dex_boost_split: f64,
    /// Seconds a source may take to answer before it counts as failed.
    pub fetch_timeout_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let manager = ManagerSettings::default();
        let scheduler = SchedulerSettings::default();
        Self {
            budget: manager.budget,
            max_positions: manager.max_positions,
            admission_threshold: DEFAULT_ADMISSION_THRESHOLD,
            cycle_interval_secs: scheduler.cycle_interval.as_secs(),
            admission_pacing_secs: scheduler.admission_pacing.as_secs(),
            per_source_limit: DEFAULT_PER_SOURCE_LIMIT,
            chain: "solana".to_string(),
            dex_boost_split: DEFAULT_DEX_BOOST_SPLIT,
            fetch_timeout_secs: DEFAULT_FETCH_TIMEOUT.as_secs(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct MonitorConfig {
    pub initial_delay_secs: u64,
    pub poll_interval_secs: u64,
    pub error_backoff_secs: u64,
    pub price_timeout_secs: u64,
    pub sell_retry_delay_secs: u64,
    pub max_sell_attempts: u32,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        let m = MonitorSettings::default();
        Self {
            initial_delay_secs: m.initial_delay.as_secs(),
            poll_interval_secs: m.poll_interval.as_secs(),
            error_backoff_secs: m.error_backoff.as_secs(),
            price_timeout_secs: m.price_timeout.as_secs(),
            sell_retry_delay_secs: m.sell_retry_delay.as_secs(),
            max_sell_attempts: m.max_sell_attempts,
        }
    }
}

/// Exit overrides. Unlisted sources keep their built-in pair.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct ExitsConfig {
    pub baseline: Option<ExitPolicy>,
    /// Keyed by source tag, e.g. `[exits.sources.pump_early]`.
    pub sources: HashMap<String, ExitPolicy>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct FeedsConfig {
    /// JSON file of `{identifier: price}` read by the price oracle.
    pub prices_path: String,
    pub sources: Vec<FeedSourceConfig>,
}

impl Default for FeedsConfig {
    fn default() -> Self {
        Self {
            prices_path: "feeds/prices.json".to_string(),
            sources: Vec::new(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct FeedSourceConfig {
    pub name: String,
    /// JSON array of raw records, rewritten by the feed sidecar.
    pub path: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        Self::parse(&contents).with_context(|| format!("Failed to parse config file: {path}"))
    }

    /// Parse and validate configuration text.
    pub fn parse(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.engine.max_positions == 0 {
            bail!("engine.max_positions must be at least 1");
        }
        if self.engine.budget <= Decimal::ZERO {
            bail!("engine.budget must be positive");
        }
        let split = self.engine.dex_boost_split;
        if split.is_nan() || split <= 0.0 {
            bail!("engine.dex_boost_split must be positive");
        }
        if self.engine.fetch_timeout_secs == 0 || self.monitor.price_timeout_secs == 0 {
            bail!("engine.fetch_timeout_secs and monitor.price_timeout_secs must be at least 1");
        }
        if self.monitor.max_sell_attempts == 0 {
            bail!("monitor.max_sell_attempts must be at least 1");
        }
        let invalid = self.exit_table()?.invalid_entries();
        if !invalid.is_empty() {
            bail!(
                "exit pairs need target > 1 and 0 <= stop < 1: {}",
                invalid.join(", ")
            );
        }
        Ok(())
    }

    pub fn manager_settings(&self) -> ManagerSettings {
        ManagerSettings {
            budget: self.engine.budget,
            max_positions: self.engine.max_positions,
            admission_threshold: self.engine.admission_threshold,
        }
    }

    pub fn scan_settings(&self) -> ScanSettings {
        ScanSettings {
            per_source_limit: self.engine.per_source_limit,
            chain: self.engine.chain.clone(),
            dex_boost_split: self.engine.dex_boost_split,
            fetch_timeout: Duration::from_secs(self.engine.fetch_timeout_secs),
        }
    }

    pub fn scheduler_settings(&self) -> SchedulerSettings {
        SchedulerSettings {
            cycle_interval: Duration::from_secs(self.engine.cycle_interval_secs),
            admission_pacing: Duration::from_secs(self.engine.admission_pacing_secs),
        }
    }

    pub fn monitor_settings(&self) -> MonitorSettings {
        MonitorSettings {
            initial_delay: Duration::from_secs(self.monitor.initial_delay_secs),
            poll_interval: Duration::from_secs(self.monitor.poll_interval_secs),
            error_backoff: Duration::from_secs(self.monitor.error_backoff_secs),
            price_timeout: Duration::from_secs(self.monitor.price_timeout_secs),
            sell_retry_delay: Duration::from_secs(self.monitor.sell_retry_delay_secs),
            max_sell_attempts: self.monitor.max_sell_attempts,
        }
    }

    pub fn scorer(&self) -> AdmissionScorer {
        AdmissionScorer::new(
            ScoringTable::default().with_boost_split(self.engine.dex_boost_split),
            self.engine.admission_threshold,
            self.engine.max_positions,
        )
    }

    /// Built-in exit pairs with the configured overrides applied.
    pub fn exit_table(&self) -> Result<ExitTable> {
        let defaults = ExitTable::default();
        let baseline = self.exits.baseline.unwrap_or(defaults.baseline());
        let mut table = ExitTable::baseline_only(baseline);
        for &source in SourceKind::ALL {
            table = table.with_policy(source, defaults.policy_for(source));
        }
        for (key, policy) in &self.exits.sources {
            let source: SourceKind = key
                .parse()
                .with_context(|| format!("Unknown source in [exits.sources]: {key}"))?;
            table = table.with_policy(source, *policy);
        }
        Ok(table)
    }
}
