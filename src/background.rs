use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::engine::{now_ms, Engine, EngineError};

const COMPACT_CHECK_INTERVAL: Duration = Duration::from_secs(30);

/// Compact the WAL if at least `threshold` events were appended since the last compaction.
pub async fn compact_if_due(engine: &Engine, threshold: u64) -> Result<bool, EngineError> {
    let appends = engine.wal_appends_since_compact().await;
    if appends < threshold {
        return Ok(false);
    }
    debug!("{appends} appends since last compaction, compacting");
    engine.compact_wal().await?;
    Ok(true)
}

/// Background task: periodic WAL compaction for one hostel.
pub async fn run_compactor(hostel: String, engine: Arc<Engine>, threshold: u64) {
    let mut interval = tokio::time::interval(COMPACT_CHECK_INTERVAL);
    loop {
        interval.tick().await;
        match compact_if_due(&engine, threshold).await {
            Ok(true) => info!("compacted WAL for hostel {hostel}"),
            Ok(false) => {}
            Err(e) => warn!("compaction failed for hostel {hostel}: {e}"),
        }
    }
}

/// Publish current occupancy gauges for one hostel.
pub async fn report_occupancy(hostel: &str, engine: &Engine) {
    let occupancy = engine.occupancy(now_ms()).await;
    metrics::gauge!(crate::observability::ROOMS_OCCUPIED, "hostel" => hostel.to_string())
        .set(occupancy.rooms_occupied as f64);
    metrics::gauge!(crate::observability::RESERVATIONS_ACTIVE, "hostel" => hostel.to_string())
        .set(occupancy.active_reservations as f64);
    debug!(
        "hostel {hostel}: {} rooms occupied, {} active reservations",
        occupancy.rooms_occupied, occupancy.active_reservations
    );
}

/// Background task: occupancy gauges for one hostel, refreshed every `period`.
pub async fn run_occupancy_reporter(hostel: String, engine: Arc<Engine>, period: Duration) {
    let mut interval = tokio::time::interval(period);
    loop {
        interval.tick().await;
        report_occupancy(&hostel, &engine).await;
    }
}
