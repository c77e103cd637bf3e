//! Integration tests for local-cluster

mod common;

use std::collections::BTreeSet;

use swarm_local_cluster::{Command, JoinPolicy, LocalCluster, Operation, Status};
use swarm_property_store::PropertyStore;
use swarm_service::ServiceErrorKind;
use swarm_state::{NodeId, PropertyKey, PropertyValue};

fn id(name: &str) -> NodeId {
    NodeId::from(name)
}

fn ids(names: &[&str]) -> BTreeSet<NodeId> {
    names.iter().copied().map(NodeId::from).collect()
}

async fn cluster_initialized(cluster: &LocalCluster) -> bool {
    cluster
        .store()
        .get(&PropertyKey::cluster("redis_cluster_initialized"))
        .await
        .unwrap()
        == Some(PropertyValue::Flag(true))
}

#[tokio::test(start_paused = true)]
async fn test_leader_first_converges_in_two_sweeps() {
    let mut cluster = common::cluster(&["a", "b", "c"]).await;

    assert_eq!(cluster.converge(5).await.unwrap(), 2);
    assert!(cluster_initialized(&cluster).await);
    assert_eq!(cluster.count(Operation::FormCluster), 1);
    assert_eq!(cluster.service().service_members(), ids(&["a", "b", "c"]));
}

#[tokio::test(start_paused = true)]
async fn test_followers_first_converges() {
    let mut cluster = common::cluster(&["a", "b", "c"]).await;

    let sweeps = cluster
        .converge_with(5, |members| members.iter().rev().cloned().collect())
        .await
        .unwrap();

    assert_eq!(sweeps, 2);
    assert_eq!(cluster.count(Operation::FormCluster), 1);
}

#[tokio::test(start_paused = true)]
async fn test_rotating_order_converges() {
    let mut cluster = common::cluster(&["a", "b", "c", "d"]).await;
    let mut sweep = 0;

    let sweeps = cluster
        .converge_with(6, |members| {
            sweep += 1;
            let mut order = members.to_vec();
            order.rotate_left(sweep % members.len());
            order
        })
        .await
        .unwrap();

    assert!(sweeps <= 3);
    assert_eq!(cluster.count(Operation::FormCluster), 1);
    assert_eq!(cluster.service().service_members(), ids(&["a", "b", "c", "d"]));
}

#[tokio::test(start_paused = true)]
async fn test_converged_swarm_stays_quiet() {
    let mut cluster = common::cluster(&["a", "b"]).await;
    cluster.converge(5).await.unwrap();
    for member in cluster.members().to_vec() {
        cluster.controller(&member).unwrap().clear_calls();
    }

    assert_eq!(cluster.converge(1).await.unwrap(), 1);

    for member in cluster.members().to_vec() {
        let controller = cluster.controller(&member).unwrap();
        assert_eq!(controller.count(Operation::Configure), 0);
        assert_eq!(controller.count(Operation::Start), 0);
        assert_eq!(controller.count(Operation::Stop), 0);
    }
}

#[tokio::test(start_paused = true)]
async fn test_no_leader_blocks_bootstrap() {
    let mut cluster = common::cluster(&["a", "b"]).await;
    cluster.set_leader(None).unwrap();

    let err = cluster.converge(2).await.unwrap_err();
    assert!(err.to_string().contains("no leader elected yet"));
    assert!(!cluster_initialized(&cluster).await);

    cluster.set_leader(Some(id("b"))).unwrap();
    cluster.converge(3).await.unwrap();
    assert!(cluster_initialized(&cluster).await);
}

#[tokio::test(start_paused = true)]
async fn test_missing_dependency_gates_every_node() {
    let mut cluster = common::cluster(&["a", "b", "c"]).await;
    cluster
        .retract(PropertyKey::node(id("c"), "tunnel_ip"))
        .await
        .unwrap();

    let results = cluster.sweep().await.unwrap();
    for result in &results {
        assert_eq!(result.status(), Status::Postponed);
        assert_eq!(
            result.message(),
            Some("waiting for node c to publish tunnel_ip")
        );
    }
    for member in cluster.members() {
        assert!(!cluster.controller(member).unwrap().running());
    }

    cluster.publish(&id("c"), "tunnel_ip", "10.0.0.9").await.unwrap();
    cluster.converge(3).await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_late_joiner_is_admitted() {
    let mut cluster = common::cluster(&["a", "b"]).await;
    cluster.converge(5).await.unwrap();

    let c = cluster.add_node("c").await.unwrap();
    assert_eq!(cluster.converge(3).await.unwrap(), 1);

    assert_eq!(cluster.count(Operation::FormCluster), 1);
    assert!(cluster.service().service_members().contains(&c));
    assert!(cluster.removals().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_departed_member_is_retired_once() {
    let mut cluster = common::cluster(&["a", "b", "c"]).await;
    cluster.converge(5).await.unwrap();

    cluster.remove_member(&id("c")).unwrap();
    cluster.converge(3).await.unwrap();
    cluster.converge(3).await.unwrap();

    assert_eq!(cluster.removals(), vec![id("c")]);
    assert_eq!(cluster.service().service_members(), ids(&["a", "b"]));

    let destroyed = cluster.run(&id("c"), Command::Destroy).await.unwrap();
    assert_eq!(destroyed.status(), Status::Completed);
    assert_eq!(destroyed.carry_forward(), &serde_json::json!({}));

    let leftovers: Vec<_> = cluster
        .store()
        .snapshot()
        .await
        .unwrap()
        .into_iter()
        .filter(|(key, _)| key.owner() == Some(&id("c")))
        .map(|(key, _)| key.name().to_string())
        .collect();
    assert_eq!(leftovers, vec!["tunnel_ip"]);

    let c = cluster.controller(&id("c")).unwrap();
    assert!(!c.running());
    assert!(c.config().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_failed_removal_is_retried() {
    let mut cluster = common::cluster(&["a", "b", "c"]).await;
    cluster.converge(5).await.unwrap();
    let leader = cluster.controller(&id("a")).unwrap().clone();
    leader.fail_always(Operation::RemoveMember, ServiceErrorKind::Transient);

    cluster.remove_member(&id("c")).unwrap();
    let err = cluster.converge(2).await.unwrap_err();
    assert!(err.to_string().contains("failed to retire c"));

    leader.clear_failures(Operation::RemoveMember);
    cluster.converge(2).await.unwrap();

    let removals = cluster.removals();
    assert!(removals.len() > 1);
    assert!(removals.iter().all(|removed| *removed == id("c")));
    assert_eq!(cluster.service().service_members(), ids(&["a", "b"]));

    let settled = removals.len();
    cluster.converge(1).await.unwrap();
    assert_eq!(cluster.removals().len(), settled);
}

#[tokio::test(start_paused = true)]
async fn test_new_leader_retires_old_leader() {
    let mut cluster = common::cluster(&["a", "b", "c"]).await;
    cluster.converge(5).await.unwrap();

    cluster.remove_member(&id("a")).unwrap();
    cluster.set_leader(Some(id("b"))).unwrap();
    cluster.converge(3).await.unwrap();

    assert_eq!(cluster.removals(), vec![id("a")]);
    assert_eq!(cluster.service().service_members(), ids(&["b", "c"]));
    assert_eq!(cluster.count(Operation::FormCluster), 1);
}

#[tokio::test(start_paused = true)]
async fn test_after_bootstrap_leader_first() {
    common::init_test_logging();
    let mut config = common::config();
    config.join_policy = JoinPolicy::AfterBootstrap;
    let mut cluster = LocalCluster::builder()
        .config(config)
        .nodes(["a", "b", "c"])
        .build()
        .await
        .unwrap();

    assert_eq!(cluster.converge(3).await.unwrap(), 1);
    assert_eq!(cluster.service().service_members(), ids(&["a", "b", "c"]));
}

#[tokio::test(start_paused = true)]
async fn test_after_bootstrap_followers_wait() {
    common::init_test_logging();
    let mut config = common::config();
    config.join_policy = JoinPolicy::AfterBootstrap;
    let mut cluster = LocalCluster::builder()
        .config(config)
        .nodes(["a", "b"])
        .build()
        .await
        .unwrap();

    let follower = cluster.apply(&id("b")).await.unwrap();
    assert_eq!(follower.status(), Status::Postponed);
    assert_eq!(
        follower.message(),
        Some("waiting for leader a to bootstrap the cluster")
    );
    assert!(!cluster.controller(&id("b")).unwrap().running());

    assert_eq!(cluster.converge(3).await.unwrap(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_carry_forward_loss_does_not_reform() {
    let mut cluster = common::cluster(&["a", "b"]).await;
    cluster.converge(5).await.unwrap();

    cluster
        .node_mut(&id("a"))
        .unwrap()
        .set_carry_forward(serde_json::Value::Null);
    cluster.converge(3).await.unwrap();

    assert_eq!(cluster.count(Operation::FormCluster), 1);
}

#[tokio::test(start_paused = true)]
async fn test_readmitted_member_rejoins() {
    let mut cluster = common::cluster(&["a", "b", "c"]).await;
    cluster.converge(5).await.unwrap();

    cluster.remove_member(&id("c")).unwrap();
    cluster.converge(3).await.unwrap();
    assert_eq!(cluster.service().service_members(), ids(&["a", "b"]));

    cluster.run(&id("c"), Command::Destroy).await.unwrap();
    cluster.readmit(&id("c")).unwrap();
    cluster.converge(3).await.unwrap();

    assert_eq!(cluster.service().service_members(), ids(&["a", "b", "c"]));
    assert_eq!(cluster.count(Operation::FormCluster), 1);
}
