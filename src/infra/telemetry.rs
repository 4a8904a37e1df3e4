use std::sync::Once;

use metrics::{Unit, describe_counter, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install a global tracing subscriber using the provided logging settings.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .with_writer(std::io::stderr)
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .compact()
            .with_target(true)
            .with_writer(std::io::stderr)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(ErrorLayer::default())
        .with(fmt_layer)
        .try_init()
        .map_err(|err| {
            InfraError::telemetry(format!("failed to install tracing subscriber: {err}"))
        })
}

/// Register descriptions for every metric the caches emit. Idempotent.
pub fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "treecache_snapshot_build_total",
            Unit::Count,
            "Total number of tree cache snapshots built, by kind."
        );
        describe_histogram!(
            "treecache_snapshot_build_ms",
            Unit::Milliseconds,
            "Tree cache snapshot build latency in milliseconds."
        );
        describe_counter!(
            "treecache_invalidate_total",
            Unit::Count,
            "Total number of tree cache invalidations, by kind."
        );
        describe_counter!(
            "treecache_broadcast_sent_total",
            Unit::Count,
            "Total number of invalidation messages sent to the cluster."
        );
        describe_counter!(
            "treecache_broadcast_received_total",
            Unit::Count,
            "Total number of invalidation messages applied, by origin."
        );
        describe_counter!(
            "treecache_artifact_compute_total",
            Unit::Count,
            "Total number of self-persisting cache computations."
        );
        describe_counter!(
            "treecache_guard_short_circuit_total",
            Unit::Count,
            "Total number of path reads answered empty by the recursion guard."
        );
    });
}
