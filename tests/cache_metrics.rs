//! Metric emission across the cache lifecycle.

mod common;

use std::collections::HashSet;
use std::sync::Arc;

use metrics_util::debugging::DebuggingRecorder;
use serde_json::json;
use serial_test::serial;
use treecache::application::artifacts::DescendantPaths;
use treecache::application::runtime::CacheRuntime;
use treecache::cache::{CacheConfig, ClusterBroadcaster};
use treecache::infra::cluster::LocalCluster;
use treecache::infra::telemetry;

use common::{settings, store_with};

#[tokio::test]
#[serial]
async fn cache_paths_emit_expected_metric_keys() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder
        .install()
        .expect("debug metrics recorder should install in this test process");
    telemetry::describe_metrics();

    let store = store_with(&[
        settings("/Root/Site/Settings/logging.settings", r#"{"level":"warn"}"#),
        ("/Root/Site/a.item", "Item", None),
    ])
    .await;
    let cluster = LocalCluster::new(16);
    let transport_a = Arc::new(cluster.join());
    let transport_b = Arc::new(cluster.join());
    let broadcaster_a: Arc<dyn ClusterBroadcaster> = transport_a.clone();
    let broadcaster_b: Arc<dyn ClusterBroadcaster> = transport_b.clone();
    let a = CacheRuntime::new(store.clone(), CacheConfig::default(), Some(broadcaster_a))
        .expect("runtime a");
    let _b = CacheRuntime::new(store.clone(), CacheConfig::default(), Some(broadcaster_b))
        .expect("runtime b");

    // Snapshot build, invalidation, broadcast send and receive.
    a.settings()
        .resolve("logging", "/Root/Site/Page")
        .await
        .expect("resolve");
    a.settings()
        .save("/Root/Site", "logging", &json!({"level": "debug"}))
        .await
        .expect("save");
    transport_b.delivered(1).await;
    transport_a.delivered(1).await;

    // Artifact computation.
    let paths = a.path_cache(DescendantPaths::new("Item"));
    paths.get_paths("*.item").await.expect("paths");

    let names: HashSet<String> = snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .map(|(composite_key, _, _, _)| composite_key.key().name().to_string())
        .collect();

    let expected = [
        "treecache_snapshot_build_total",
        "treecache_snapshot_build_ms",
        "treecache_invalidate_total",
        "treecache_broadcast_sent_total",
        "treecache_broadcast_received_total",
        "treecache_artifact_compute_total",
    ];

    for metric in expected {
        assert!(names.contains(metric), "missing metric: {metric}");
    }
}
