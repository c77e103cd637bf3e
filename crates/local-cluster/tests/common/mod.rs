//! Common test setup for integration tests

#![allow(dead_code)]

use std::sync::Once;
use std::time::Duration;

use swarm_local_cluster::{LocalCluster, ReconcilerConfig};
use swarm_reconciler::Timeouts;

static INIT: Once = Once::new();

pub const SERVICE: &str = "redis";

/// Initialize the global tracing subscriber for all tests
pub fn init_test_logging() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_test_writer()
            .with_max_level(tracing::Level::DEBUG)
            .try_init();
    });
}

pub fn config() -> ReconcilerConfig {
    let mut config = ReconcilerConfig::new(SERVICE);
    config.timeouts = Timeouts {
        operation: Duration::from_secs(1),
        prepare: Duration::from_secs(5),
        ready: Duration::from_secs(3),
        verify: Duration::from_secs(3),
        poll_interval: Duration::from_millis(500),
        stop_grace: Duration::from_secs(1),
    };
    config
}

pub async fn cluster(nodes: &[&str]) -> LocalCluster {
    init_test_logging();
    LocalCluster::builder()
        .config(config())
        .nodes(nodes.iter().copied())
        .build()
        .await
        .unwrap()
}
