//! Metric names and the Prometheus recorder behind `/metrics`.

use metrics::{Unit, describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::info;

// ── RPC ─────────────────────────────────────────────────────────────

/// Counter, labels: method.
pub const RPC_REQUESTS_TOTAL: &str = "rpc_requests_total";
/// Counter, labels: method, error_type.
pub const RPC_ERRORS_TOTAL: &str = "rpc_errors_total";
/// Histogram, labels: method.
pub const RPC_REQUEST_DURATION_SECONDS: &str = "rpc_request_duration_seconds";

// ── Connections ─────────────────────────────────────────────────────

/// Counter.
pub const WS_CONNECTIONS_TOTAL: &str = "ws_connections_total";
/// Counter.
pub const WS_DISCONNECTIONS_TOTAL: &str = "ws_disconnections_total";
/// Gauge.
pub const WS_CONNECTIONS_ACTIVE: &str = "ws_connections_active";
/// Counter. Upgrades refused at the connection cap.
pub const WS_CONNECTIONS_REJECTED_TOTAL: &str = "ws_connections_rejected_total";
/// Histogram.
pub const WS_CONNECTION_DURATION_SECONDS: &str = "ws_connection_duration_seconds";

// ── Chat ────────────────────────────────────────────────────────────

/// Counter. Messages appended to the log.
pub const CHAT_MESSAGES_TOTAL: &str = "chat_messages_total";
/// Counter. Successful per-client pushes.
pub const BROADCAST_PUSHES_TOTAL: &str = "broadcast_pushes_total";
/// Counter, labels: reason. Sessions dropped after a failed push.
pub const BROADCAST_PRUNED_TOTAL: &str = "broadcast_pruned_total";
/// Gauge.
pub const SESSIONS_REGISTERED: &str = "sessions_registered";
/// Counter, labels: resync.
pub const CATCHUP_POLLS_TOTAL: &str = "catchup_polls_total";

/// Install the global recorder and describe every metric.
///
/// Fails if a global recorder is already set, so call it once at startup.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    describe_all();
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

/// Handle to a recorder that is never installed. Renders an empty page.
pub fn detached_handle() -> PrometheusHandle {
    PrometheusBuilder::new().build_recorder().handle()
}

fn describe_all() {
    describe_counter!(RPC_REQUESTS_TOTAL, "RPC requests dispatched");
    describe_counter!(RPC_ERRORS_TOTAL, "RPC requests answered with an error");
    describe_histogram!(RPC_REQUEST_DURATION_SECONDS, Unit::Seconds, "RPC handler run time");

    describe_counter!(WS_CONNECTIONS_TOTAL, "WebSocket connections accepted");
    describe_counter!(WS_DISCONNECTIONS_TOTAL, "WebSocket connections closed");
    describe_gauge!(WS_CONNECTIONS_ACTIVE, "Open WebSocket connections");
    describe_counter!(WS_CONNECTIONS_REJECTED_TOTAL, "Upgrades refused at the connection cap");
    describe_histogram!(WS_CONNECTION_DURATION_SECONDS, Unit::Seconds, "WebSocket connection lifetime");

    describe_counter!(CHAT_MESSAGES_TOTAL, "Messages appended to the log");
    describe_counter!(BROADCAST_PUSHES_TOTAL, "Messages pushed to a client");
    describe_counter!(BROADCAST_PRUNED_TOTAL, "Clients dropped after a failed push");
    describe_gauge!(SESSIONS_REGISTERED, "Clients receiving pushes");
    describe_counter!(CATCHUP_POLLS_TOTAL, "chat.getMessages polls served");
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [&str; 13] = [
        RPC_REQUESTS_TOTAL,
        RPC_ERRORS_TOTAL,
        RPC_REQUEST_DURATION_SECONDS,
        WS_CONNECTIONS_TOTAL,
        WS_DISCONNECTIONS_TOTAL,
        WS_CONNECTIONS_ACTIVE,
        WS_CONNECTIONS_REJECTED_TOTAL,
        WS_CONNECTION_DURATION_SECONDS,
        CHAT_MESSAGES_TOTAL,
        BROADCAST_PUSHES_TOTAL,
        BROADCAST_PRUNED_TOTAL,
        SESSIONS_REGISTERED,
        CATCHUP_POLLS_TOTAL,
    ];

    #[test]
    fn detached_handle_sees_no_global_metrics() {
        metrics::counter!(CHAT_MESSAGES_TOTAL).increment(1);
        assert!(!detached_handle().render().contains(CHAT_MESSAGES_TOTAL));
    }

    #[test]
    fn names_are_unique_prometheus_identifiers() {
        let mut seen = std::collections::HashSet::new();
        for name in ALL {
            assert!(name.chars().all(|c| c.is_ascii_lowercase() || c == '_'), "{name}");
            assert!(seen.insert(name), "duplicate metric {name}");
        }
    }

    #[test]
    fn describing_without_a_recorder_is_harmless() {
        describe_all();
    }
}
