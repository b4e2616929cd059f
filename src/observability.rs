use std::net::SocketAddr;
use std::time::Instant;

use crate::engine::EngineError;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: lifecycle operations. Labels: op, status.
pub const OPERATIONS_TOTAL: &str = "hostelres_operations_total";

/// Histogram: lifecycle operation latency in seconds. Labels: op.
pub const OPERATION_DURATION_SECONDS: &str = "hostelres_operation_duration_seconds";

/// Counter: creates and reschedules rejected for overlapping an active reservation.
pub const CONFLICTS_TOTAL: &str = "hostelres_conflicts_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: number of open hostel engines.
pub const HOSTELS_ACTIVE: &str = "hostelres_hostels_active";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "hostelres_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "hostelres_wal_flush_batch_size";

// ── Occupancy (read by dashboards) ──────────────────────────────

/// Gauge: rooms with an active reservation covering now. Labels: hostel.
pub const ROOMS_OCCUPIED: &str = "hostelres_rooms_occupied";

/// Gauge: active reservations covering now. Labels: hostel.
pub const RESERVATIONS_ACTIVE: &str = "hostelres_reservations_active";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}

/// Record outcome and latency of one lifecycle operation.
pub fn observe<T>(op: &'static str, started: Instant, result: &Result<T, EngineError>) {
    let status = match result {
        Ok(_) => "ok",
        Err(e) => e.label(),
    };
    metrics::counter!(OPERATIONS_TOTAL, "op" => op, "status" => status).increment(1);
    metrics::histogram!(OPERATION_DURATION_SECONDS, "op" => op)
        .record(started.elapsed().as_secs_f64());
    if matches!(result, Err(EngineError::Conflict { .. })) {
        metrics::counter!(CONFLICTS_TOTAL).increment(1);
    }
}
