//! Prometheus exporter bootstrap and descriptions for the staffing metrics.

use std::env;
use std::sync::OnceLock;

use metrics::{describe_counter, describe_histogram, Unit};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing::{info, warn};

pub const MATCHES_UPSERTED_TOTAL: &str = "sm_matches_upserted_total";
pub const TRANSITIONS_TOTAL: &str = "sm_transitions_total";
pub const EMBEDDING_FALLBACK_TOTAL: &str = "sm_embedding_fallback_total";
pub const MATCHING_PASS_SECONDS: &str = "sm_matching_pass_seconds";

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn resolve_port(raw: Option<String>, default_port: u16) -> u16 {
    raw.and_then(|raw| raw.trim().parse::<u16>().ok())
        .unwrap_or(default_port)
}

/// Register help text for every metric the matching core emits.
pub fn describe_metrics() {
    describe_counter!(
        MATCHES_UPSERTED_TOTAL,
        Unit::Count,
        "Match rows inserted or rescored by matching passes"
    );
    describe_counter!(
        TRANSITIONS_TOTAL,
        Unit::Count,
        "Lifecycle actions by action and outcome"
    );
    describe_counter!(
        EMBEDDING_FALLBACK_TOTAL,
        Unit::Count,
        "Skill vectors that could not be built and fell back to coverage scoring"
    );
    describe_histogram!(
        MATCHING_PASS_SECONDS,
        Unit::Seconds,
        "Wall time of one filter, score and upsert pass"
    );
}

/// Start a Prometheus exporter on `0.0.0.0:<port>`, the port taken from
/// `port_env` or `default_port`. Must run inside a Tokio runtime.
///
/// Idempotent: later calls return the first handle. Returns `None` when the
/// exporter could not be started; the service keeps running without metrics.
pub fn init_metrics(port_env: &str, default_port: u16) -> Option<&'static PrometheusHandle> {
    if let Some(existing) = PROMETHEUS_HANDLE.get() {
        return Some(existing);
    }

    let port = resolve_port(env::var(port_env).ok(), default_port);
    let (recorder, exporter) = match PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], port))
        .build()
    {
        Ok(parts) => parts,
        Err(err) => {
            warn!(error = %err, metrics_port = port, "failed to build prometheus exporter");
            return None;
        }
    };

    let handle = recorder.handle();
    if let Err(err) = metrics::set_global_recorder(recorder) {
        warn!(error = %err, "metrics recorder already installed");
        return None;
    }
    tokio::spawn(async move {
        if let Err(err) = exporter.await {
            warn!(error = ?err, "prometheus exporter stopped");
        }
    });

    describe_metrics();
    let _ = PROMETHEUS_HANDLE.set(handle);
    info!(metrics_port = port, "started prometheus exporter");
    PROMETHEUS_HANDLE.get()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn port_falls_back_on_missing_or_bad_values() {
        assert_eq!(resolve_port(None, 9100), 9100);
        assert_eq!(resolve_port(Some("not-a-port".into()), 9100), 9100);
        assert_eq!(resolve_port(Some("70000".into()), 9100), 9100);
        assert_eq!(resolve_port(Some(" 9464 ".into()), 9100), 9464);
    }
}
