//! Two cluster members sharing one store stay consistent through
//! invalidation messages.

mod common;

use std::sync::Arc;

use serde_json::json;
use treecache::application::runtime::CacheRuntime;
use treecache::cache::{CacheConfig, ClusterBroadcaster, ClusterMessage};
use treecache::infra::cluster::{LocalCluster, LocalMember};
use treecache::infra::memory::MemoryNodeStore;

use common::{settings, store_with};

struct Member {
    transport: Arc<LocalMember>,
    runtime: CacheRuntime,
}

fn member(cluster: &LocalCluster, store: &Arc<MemoryNodeStore>, config: CacheConfig) -> Member {
    let transport = Arc::new(cluster.join());
    let broadcaster: Arc<dyn ClusterBroadcaster> = transport.clone();
    let runtime = CacheRuntime::new(store.clone(), config, Some(broadcaster)).expect("runtime");
    Member { transport, runtime }
}

async fn level(member: &Member, context_path: &str) -> Option<String> {
    member
        .runtime
        .settings()
        .resolve("logging", context_path)
        .await
        .expect("resolve")
        .and_then(|found| found.get::<String>("level"))
}

async fn seeded() -> Arc<MemoryNodeStore> {
    store_with(&[settings(
        "/Root/Site/Settings/logging.settings",
        r#"{"level":"warn"}"#,
    )])
    .await
}

#[tokio::test]
async fn remote_save_reaches_other_member_without_restart() {
    let store = seeded().await;
    let cluster = LocalCluster::new(64);
    let a = member(&cluster, &store, CacheConfig::default());
    let b = member(&cluster, &store, CacheConfig::default());

    assert_eq!(level(&b, "/Root/Site/Page").await.as_deref(), Some("warn"));

    a.runtime
        .settings()
        .save("/Root/Site", "logging", &json!({"level": "debug"}))
        .await
        .expect("save on a");
    assert_eq!(level(&a, "/Root/Site/Page").await.as_deref(), Some("debug"));

    b.transport.delivered(1).await;
    assert_eq!(level(&b, "/Root/Site/Page").await.as_deref(), Some("debug"));
}

#[tokio::test]
async fn new_scope_created_remotely_is_picked_up() {
    let store = seeded().await;
    let cluster = LocalCluster::new(64);
    let a = member(&cluster, &store, CacheConfig::default());
    let b = member(&cluster, &store, CacheConfig::default());

    assert_eq!(level(&b, "/Root/Site/Sub/Page").await.as_deref(), Some("warn"));

    a.runtime
        .settings()
        .save("/Root/Site/Sub", "logging", &json!({"level": "trace"}))
        .await
        .expect("save");
    b.transport.delivered(1).await;

    assert_eq!(level(&b, "/Root/Site/Sub/Page").await.as_deref(), Some("trace"));
    assert_eq!(level(&b, "/Root/Site/Other").await.as_deref(), Some("warn"));
}

#[tokio::test]
async fn duplicate_and_echoed_messages_are_harmless() {
    let store = seeded().await;
    let cluster = LocalCluster::new(64);
    let a = member(&cluster, &store, CacheConfig::default());
    let b = member(&cluster, &store, CacheConfig::default());
    level(&b, "/Root/Site/Page").await;

    let message = ClusterMessage::invalidate(a.transport.member_id(), "settings");
    a.transport.send(message.clone()).await.expect("send");
    a.transport.send(message).await.expect("resend");
    b.transport.delivered(2).await;
    a.transport.delivered(2).await;

    assert!(!b.runtime.context().is_built("settings"));
    assert_eq!(level(&b, "/Root/Site/Page").await.as_deref(), Some("warn"));
    assert_eq!(level(&a, "/Root/Site/Page").await.as_deref(), Some("warn"));
}

#[tokio::test]
async fn invalidate_all_clears_every_member() {
    let store = seeded().await;
    let cluster = LocalCluster::new(64);
    let a = member(&cluster, &store, CacheConfig::default());
    let b = member(&cluster, &store, CacheConfig::default());
    level(&a, "/Root/Site/Page").await;
    level(&b, "/Root/Site/Page").await;

    assert_eq!(a.runtime.trigger().invalidate_all(), 1);
    b.transport.delivered(1).await;

    assert!(!a.runtime.context().is_built("settings"));
    assert!(!b.runtime.context().is_built("settings"));
}

#[tokio::test]
async fn disabled_broadcast_keeps_members_isolated() {
    let store = seeded().await;
    let cluster = LocalCluster::new(64);
    let isolated = CacheConfig {
        enable_broadcast: false,
        ..Default::default()
    };
    let a = member(&cluster, &store, isolated.clone());
    let b = member(&cluster, &store, isolated);
    assert!(!a.runtime.is_clustered());

    assert_eq!(level(&b, "/Root/Site/Page").await.as_deref(), Some("warn"));
    a.runtime
        .settings()
        .save("/Root/Site", "logging", &json!({"level": "debug"}))
        .await
        .expect("save");
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }

    assert_eq!(b.transport.delivered_count(), 0);
    assert_eq!(level(&b, "/Root/Site/Page").await.as_deref(), Some("warn"));
    assert_eq!(level(&a, "/Root/Site/Page").await.as_deref(), Some("debug"));
}
