use std::net::SocketAddr;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

// ── Decision metrics ────────────────────────────────────────────

/// Counter: assignment admission decisions. Labels: operation, outcome, reason.
pub const ASSIGNMENT_DECISIONS_TOTAL: &str = "agenda_assignment_decisions_total";

/// Counter: assignments whose state a cascade changed. Labels: entity.
pub const CASCADE_UPDATES_TOTAL: &str = "agenda_cascade_updates_total";

/// Counter: booking slot queries served.
pub const SLOT_QUERIES_TOTAL: &str = "agenda_slot_queries_total";

/// Histogram: write operation latency in seconds. Labels: operation.
pub const OPERATION_DURATION_SECONDS: &str = "agenda_operation_duration_seconds";

// ── Resource metrics ────────────────────────────────────────────

/// Gauge: number of loaded tenant engines.
pub const TENANTS_ACTIVE: &str = "agenda_tenants_active";

/// Install the Prometheus exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), BuildError> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}

/// Install the default fmt subscriber, honouring `RUST_LOG`. Returns false
/// if a global subscriber was already set.
pub fn init_logging() -> bool {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .try_init()
        .is_ok()
}
