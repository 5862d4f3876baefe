use std::sync::Arc;
use std::sync::Once;

use kv_reactor::Bin;
use kv_reactor::Client;
use kv_reactor::Key;
use kv_reactor::MemoryCluster;
use kv_reactor::MemoryClusterConfig;

pub const NAMESPACE: &str = "test";
pub const SET: &str = "demo";

// small random reply delay so node answers arrive out of order
pub const MAX_REPLY_DELAY_MS: u64 = 3;

static LOGGER_INIT: Once = Once::new();

pub fn enable_logger() {
    LOGGER_INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

pub fn key(id: &str) -> Key {
    Key::new(NAMESPACE, SET, id)
}

pub fn keys(ids: &[&str]) -> Vec<Key> {
    ids.iter().map(|id| key(id)).collect()
}

/// Cluster of `nodes` nodes with jittered replies
pub fn cluster(nodes: usize) -> MemoryCluster {
    enable_logger();
    MemoryCluster::new(MemoryClusterConfig {
        nodes,
        max_reply_delay_ms: MAX_REPLY_DELAY_MS,
        ..MemoryClusterConfig::default()
    })
    .expect("valid cluster config")
}

pub fn client(cluster: &MemoryCluster) -> Client {
    Client::builder(Arc::new(cluster.clone()))
        .build()
        .expect("default config is valid")
}

/// Seeds `ids` with a `name` bin holding the id
pub fn seed(
    cluster: &MemoryCluster,
    ids: &[&str],
) {
    for id in ids {
        cluster.seed(key(id), vec![Bin::new("name", *id)]);
    }
}

/// Id of a key that `cluster` places on a node other than the one owning `other`
pub fn id_off_node(
    cluster: &MemoryCluster,
    other: &Key,
    prefix: &str,
) -> String {
    let owner = cluster.node_of(other).clone();
    (0..)
        .map(|i| format!("{prefix}{i}"))
        .find(|id| *cluster.node_of(&key(id)) != owner)
        .expect("cluster has more than one node")
}
