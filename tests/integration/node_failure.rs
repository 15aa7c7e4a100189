//! Integration test: unreachable nodes and content lost out of band.

use std::sync::Arc;

use vidshard_integration_tests::{TestCluster, TestNode};
use vidshard_net::{ClientConfig, TcpConnector};
use vidshard_router::{MembershipManager, RouterError, RouterState};
use vidshard_store::ContentStore;
use vidshard_types::NodeAddr;

async fn dead_addr() -> NodeAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = NodeAddr::new(listener.local_addr().unwrap().to_string());
    drop(listener);
    addr
}

#[tokio::test]
#[ntest::timeout(30000)]
async fn test_bootstrap_fails_on_unreachable_node() {
    let live = TestNode::start().await;
    let dead = dead_addr().await;

    let state = RouterState::new();
    let membership = MembershipManager::new(
        state.clone(),
        Arc::new(TcpConnector::new(ClientConfig::default())),
    );
    let err = membership
        .bootstrap(&[live.addr().clone(), dead])
        .await
        .unwrap_err();
    assert!(matches!(err, RouterError::Net(_)), "got {err:?}");
}

#[tokio::test]
#[ntest::timeout(30000)]
async fn test_unreachable_join_changes_nothing() {
    let c = TestCluster::new(2).await;
    let keys = c.write_keys(40).await;
    let version = c.state.topology().version();

    let err = c.membership.add_node(&dead_addr().await).await.unwrap_err();
    assert!(matches!(err, RouterError::Net(_)));
    assert_eq!(c.state.topology().version(), version);
    assert_eq!(c.router.nodes().len(), 2);
    c.assert_converged(&keys).await;
}

#[tokio::test]
#[ntest::timeout(30000)]
async fn test_file_lost_on_disk_fails_its_migration_only() {
    let mut c = TestCluster::new(2).await;
    let keys = c.write_keys(100).await;

    let idx = c.spawn_node().await;
    let new = c.node(idx).addr().clone();
    let future = c.state.topology().ring().with_node(&new);
    let moving: Vec<_> = keys
        .iter()
        .filter(|k| future.owner_of(k) == Some(&new))
        .cloned()
        .collect();
    let victim = moving.first().expect("new node owns some keys").clone();
    let old_owner = c.router.owner_of(victim.video_id(), victim.filename()).unwrap();
    c.node_at(&old_owner).store().delete(&victim).await.unwrap();

    let report = c.membership.add_node(&new).await.unwrap();
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].0, victim);
    assert_eq!(report.migrated, moving.len() - 1);
    // Still indexed: the loss is reported, not hidden.
    assert!(c.state.contains_key(&victim));
}

#[tokio::test]
#[ntest::timeout(30000)]
async fn test_delete_of_file_lost_on_disk_forgets_key() {
    let c = TestCluster::new(2).await;
    let keys = c.write_keys(10).await;
    let k = &keys[3];
    let owner = c.router.owner_of(k.video_id(), k.filename()).unwrap();
    c.node_at(&owner).store().delete(k).await.unwrap();

    let err = c.router.delete(k.video_id(), k.filename()).await.unwrap_err();
    assert!(err.is_not_found());
    assert!(!c.state.contains_key(k));
}

#[tokio::test]
#[ntest::timeout(30000)]
async fn test_stopped_node_refuses_new_clients() {
    let mut node = TestNode::start().await;
    let addr = node.addr().clone();
    node.stop();
    // The accept loop exits asynchronously.
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    let state = RouterState::new();
    let membership = MembershipManager::new(
        state.clone(),
        Arc::new(TcpConnector::new(ClientConfig::default())),
    );
    assert!(membership.bootstrap(&[addr]).await.is_err());
    assert!(state.topology().nodes().is_empty());
}
