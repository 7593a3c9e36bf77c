//! Persistence layer.
//!
//! Writes the reporting snapshot (open positions, closed trades, stats) to
//! a JSON file. This is an export for dashboards and post-run review; the
//! engine never restores its book from it.

use anyhow::{Context, Result};
use std::path::Path;
use tracing::{debug, info};

use crate::engine::positions::Snapshot;

/// Default snapshot file path.
pub const DEFAULT_SNAPSHOT_FILE: &str = "sniper_snapshot.json";

/// Save a snapshot to a JSON file.
pub fn save_snapshot(snapshot: &Snapshot, path: Option<&str>) -> Result<()> {
    let path = path.unwrap_or(DEFAULT_SNAPSHOT_FILE);
    let json = serde_json::to_string_pretty(snapshot)
        .context("Failed to serialise snapshot")?;

    std::fs::write(path, &json)
        .context(format!("Failed to write snapshot to {path}"))?;

    debug!(
        path,
        open = snapshot.open_positions.len(),
        trades = snapshot.trades.len(),
        "Snapshot saved"
    );
    Ok(())
}

/// Load a previously exported snapshot for reporting.
/// Returns None if the file doesn't exist.
pub fn load_snapshot(path: Option<&str>) -> Result<Option<Snapshot>> {
    let path = path.unwrap_or(DEFAULT_SNAPSHOT_FILE);

    if !Path::new(path).exists() {
        info!(path, "No snapshot found");
        return Ok(None);
    }

    let json = std::fs::read_to_string(path)
        .context(format!("Failed to read snapshot from {path}"))?;

    let snapshot: Snapshot = serde_json::from_str(&json)
        .context(format!("Failed to parse snapshot from {path}"))?;

    info!(
        path,
        taken_at = %snapshot.taken_at,
        trades = snapshot.trades.len(),
        "Snapshot loaded from disk"
    );

    Ok(Some(snapshot))
}

/// Delete the snapshot file. For reporting consumers that rotate or
/// discard exports once read.
pub fn delete_snapshot(path: Option<&str>) -> Result<()> {
    let path = path.unwrap_or(DEFAULT_SNAPSHOT_FILE);
    if Path::new(path).exists() {
        std::fs::remove_file(path)
            .context(format!("Failed to delete snapshot file {path}"))?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
