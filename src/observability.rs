use std::net::SocketAddr;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: total HTTP requests. Labels: endpoint, method, status.
pub const REQUESTS_TOTAL: &str = "roomd_requests_total";

/// Histogram: request latency in seconds. Labels: endpoint, method.
pub const REQUEST_DURATION_SECONDS: &str = "roomd_request_duration_seconds";

/// Counter: failed logins and rejected tokens.
pub const AUTH_FAILURES_TOTAL: &str = "roomd_auth_failures_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: rooms currently stored.
pub const ROOMS_ACTIVE: &str = "roomd_rooms_active";

/// Gauge: bookings currently stored.
pub const BOOKINGS_ACTIVE: &str = "roomd_bookings_active";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "roomd_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "roomd_wal_flush_batch_size";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) {
    let Some(port) = port else { return };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .expect("failed to install Prometheus metrics exporter");
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
}
