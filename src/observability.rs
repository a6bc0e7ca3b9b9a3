use std::net::SocketAddr;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

use crate::gesture::Intent;

// ── Interaction metrics ─────────────────────────────────────────

/// Counter: gestures that left `Idle`. Labels: mode.
pub const GESTURES_TOTAL: &str = "classgrid_gestures_total";

/// Counter: intents emitted by the gesture machine. Labels: intent.
pub const INTENTS_TOTAL: &str = "classgrid_intents_total";

/// Gauge: blocks in the most recent render.
pub const BLOCKS_RENDERED: &str = "classgrid_blocks_rendered";

// ── Store round-trips ───────────────────────────────────────────

/// Counter: conflict lookups issued. Labels: status.
pub const CONFLICT_LOOKUPS_TOTAL: &str = "classgrid_conflict_lookups_total";

/// Histogram: conflict lookup latency in seconds.
pub const CONFLICT_LOOKUP_DURATION_SECONDS: &str = "classgrid_conflict_lookup_duration_seconds";

/// Counter: conflicting blocks reported across all lookups.
pub const CONFLICTS_DETECTED_TOTAL: &str = "classgrid_conflicts_detected_total";

/// Counter: create/update/delete commits. Labels: op, status.
pub const COMMITS_TOTAL: &str = "classgrid_commits_total";

/// Histogram: commit latency in seconds. Labels: op.
pub const COMMIT_DURATION_SECONDS: &str = "classgrid_commit_duration_seconds";

/// Counter: optimistic updates reverted after a failed commit.
pub const ROLLBACKS_TOTAL: &str = "classgrid_rollbacks_total";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), BuildError> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}

/// Map an Intent variant to a short label for metrics.
pub fn intent_label(intent: &Intent) -> &'static str {
    match intent {
        Intent::Click { .. } => "click",
        Intent::ContextMenu { .. } => "context_menu",
        Intent::Create { .. } => "create",
        Intent::Update { .. } => "update",
        Intent::ToggleOverflow { .. } => "toggle_overflow",
    }
}
