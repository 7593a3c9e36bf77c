//! SNIPER: launch sniper engine
//!
//! Entry point. Loads configuration, initialises structured logging,
//! wires the file-backed feeds to a paper venue and runs the
//! discover→score→admit loop until Ctrl+C.

use anyhow::Result;
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tracing::{error, info, warn};

use sniper::config;
use sniper::engine::positions::PositionManager;
use sniper::engine::scanner::SourceAggregator;
use sniper::engine::scheduler::CycleScheduler;
use sniper::engine::EngineEvent;
use sniper::storage;
use sniper::venues::file_feed::{JsonFilePriceOracle, JsonFileSource};
use sniper::venues::paper::PaperVenue;
use sniper::venues::{PriceOracle, SourceConnector};

const BANNER: &str = r#"
  ____  _   _ ___ ____  _____ ____
 / ___|| \ | |_ _|  _ \| ____|  _ \
 \___ \|  \| || || |_) |  _| | |_) |
  ___) | |\  || ||  __/| |___|  _ <
 |____/|_| \_|___|_|   |_____|_| \_\

  Launch discovery and position-lifecycle engine
  v0.1.0 (paper venue)
"#;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let cfg = config::AppConfig::load("config.toml")?;

    init_logging(&cfg);

    println!("{BANNER}");
    info!(
        agent_name = %cfg.agent.name,
        budget = %cfg.engine.budget,
        max_positions = cfg.engine.max_positions,
        threshold = cfg.engine.admission_threshold,
        cycle_interval_secs = cfg.engine.cycle_interval_secs,
        "SNIPER starting up"
    );

    // The previous run's export is reported, never restored; this run
    // starts with an empty book and overwrites it on the first close.
    match storage::load_snapshot(Some(&cfg.agent.snapshot_path)) {
        Ok(Some(previous)) => {
            info!(taken_at = %previous.taken_at, "Previous run export found");
            previous
                .stats
                .log_summary(previous.open_positions.len(), previous.max_positions);
        }
        Ok(None) => {}
        Err(e) => warn!(error = %e, "Previous snapshot unreadable, ignoring"),
    }

    // -- Initialise components -------------------------------------------

    let oracle: Arc<dyn PriceOracle> = Arc::new(JsonFilePriceOracle::new(&cfg.feeds.prices_path));
    let venue = Arc::new(PaperVenue::new(oracle.clone()));

    let sources: Vec<Arc<dyn SourceConnector>> = cfg
        .feeds
        .sources
        .iter()
        .filter(|f| f.enabled)
        .map(|f| Arc::new(JsonFileSource::new(&f.name, &f.path)) as Arc<dyn SourceConnector>)
        .collect();
    if sources.is_empty() {
        warn!("No feed sources enabled, cycles will find nothing");
    }

    let manager = PositionManager::new(
        venue,
        oracle,
        cfg.exit_table()?,
        cfg.manager_settings(),
        cfg.monitor_settings(),
    );

    let scheduler = Arc::new(CycleScheduler::new(
        SourceAggregator::new(sources, cfg.scan_settings()),
        cfg.scorer(),
        manager.clone(),
        cfg.scheduler_settings(),
    ));

    // Refresh the exported snapshot whenever a trade closes.
    let exporter = tokio::spawn(export_on_close(
        manager.clone(),
        manager.subscribe(),
        cfg.agent.snapshot_path.clone(),
    ));

    // -- Main loop -------------------------------------------------------

    let (stop_tx, stop_rx) = watch::channel(false);
    let runner = scheduler.clone();
    let scheduler_task = tokio::spawn(async move { runner.run(stop_rx).await });

    info!("Entering main loop. Press Ctrl+C to stop.");
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received.");

    let _ = stop_tx.send(true);
    if let Err(e) = scheduler_task.await {
        error!(error = %e, "Scheduler task ended abnormally");
    }
    exporter.abort();

    // Open positions are left as-is; their monitors die with the process.
    let snapshot = manager.snapshot().await;
    storage::save_snapshot(&snapshot, Some(&cfg.agent.snapshot_path))?;
    snapshot
        .stats
        .log_summary(snapshot.open_positions.len(), snapshot.max_positions);
    info!(
        cycles = scheduler.cycles_run(),
        open = snapshot.open_positions.len(),
        trades = snapshot.trades.len(),
        path = %cfg.agent.snapshot_path,
        "SNIPER shut down cleanly."
    );

    Ok(())
}

/// Write a fresh snapshot after every closed or abandoned trade.
async fn export_on_close(
    manager: Arc<PositionManager>,
    mut events: broadcast::Receiver<EngineEvent>,
    path: String,
) {
    loop {
        match events.recv().await {
            Ok(EngineEvent::Closed(trade)) | Ok(EngineEvent::ForceClosed(trade)) => {
                info!(trade = %trade, "Trade recorded");
                let snapshot = manager.snapshot().await;
                if let Err(e) = storage::save_snapshot(&snapshot, Some(&path)) {
                    error!(error = %e, "Failed to save snapshot");
                }
            }
            Ok(_) => {}
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "Snapshot exporter lagged behind events");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

/// Initialise the `tracing` subscriber.
fn init_logging(cfg: &config::AppConfig) {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("sniper=info"));

    let json_logging = cfg.agent.log_json || std::env::var("SNIPER_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
