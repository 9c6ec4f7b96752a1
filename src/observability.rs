use std::net::SocketAddr;

use metrics_exporter_prometheus::BuildError;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: service operations. Labels: operation, status (ok / rejected / error).
pub const OPERATIONS_TOTAL: &str = "dockslot_operations_total";

/// Histogram: operation latency in seconds. Labels: operation.
pub const OPERATION_DURATION_SECONDS: &str = "dockslot_operation_duration_seconds";

/// Counter: business-rule rejections. Labels: code.
pub const REJECTIONS_TOTAL: &str = "dockslot_rejections_total";

/// Counter: booking notifications that failed or timed out.
pub const NOTIFICATIONS_FAILED_TOTAL: &str = "dockslot_notifications_failed_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "dockslot_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "dockslot_wal_flush_batch_size";

/// Gauge: date partitions held in memory.
pub const DAYS_LOADED: &str = "dockslot_days_loaded";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init_metrics(port: Option<u16>) -> Result<(), BuildError> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}

/// Install the fmt subscriber, honouring `RUST_LOG`. Does nothing if the host
/// already installed one.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}
