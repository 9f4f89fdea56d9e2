use std::net::SocketAddr;

use tracing_subscriber::EnvFilter;

use crate::wire::Request;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: total requests handled. Labels: op, status.
pub const REQUESTS_TOTAL: &str = "slotkeeper_requests_total";

/// Histogram: request latency in seconds. Labels: op.
pub const REQUEST_DURATION_SECONDS: &str = "slotkeeper_request_duration_seconds";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: active TCP connections.
pub const CONNECTIONS_ACTIVE: &str = "slotkeeper_connections_active";

/// Counter: total connections accepted.
pub const CONNECTIONS_TOTAL: &str = "slotkeeper_connections_total";

/// Counter: connections rejected due to limit.
pub const CONNECTIONS_REJECTED_TOTAL: &str = "slotkeeper_connections_rejected_total";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "slotkeeper_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "slotkeeper_wal_flush_batch_size";

/// Histogram: occupancy query latency in seconds, timeouts included.
pub const OCCUPANCY_QUERY_DURATION_SECONDS: &str = "slotkeeper_occupancy_query_duration_seconds";

/// Counter: occupancy queries that failed or timed out.
pub const OCCUPANCY_QUERY_FAILURES_TOTAL: &str = "slotkeeper_occupancy_query_failures_total";

// ── Domain metrics ──────────────────────────────────────────────

/// Counter: availability verdicts. Labels: result.
pub const AVAILABILITY_CHECKS_TOTAL: &str = "slotkeeper_availability_checks_total";

/// Counter: alternative searches started.
pub const ALTERNATIVE_SEARCHES_TOTAL: &str = "slotkeeper_alternative_searches_total";

/// Histogram: alternatives returned per search.
pub const ALTERNATIVES_FOUND: &str = "slotkeeper_alternatives_found";

/// Counter: commit attempts. Labels: outcome.
pub const COMMITS_TOTAL: &str = "slotkeeper_commits_total";

/// Counter: WAL compactions run by the background compactor.
pub const COMPACTIONS_TOTAL: &str = "slotkeeper_compactions_total";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), metrics_exporter_prometheus::BuildError> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}

/// Log to stderr, filtered by `RUST_LOG` (default `info`).
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Map a Request variant to a short label for metrics.
pub fn op_label(req: &Request) -> &'static str {
    match req {
        Request::CheckAvailability { .. } => "check_availability",
        Request::FindAlternatives { .. } => "find_alternatives",
        Request::Quote { .. } => "quote",
        Request::CommitBooking { .. } => "commit_booking",
        Request::AttemptBooking { .. } => "attempt_booking",
        Request::CancelBooking { .. } => "cancel_booking",
        Request::GetBooking { .. } => "get_booking",
        Request::ListBookings { .. } => "list_bookings",
        Request::AddBlock { .. } => "add_block",
        Request::RemoveBlock { .. } => "remove_block",
        Request::FreeWindows { .. } => "free_windows",
    }
}
