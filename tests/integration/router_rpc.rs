//! Integration test: clients talking to the router over the wire.
//!
//! The router accepts the same content requests as a storage node and
//! serves the admin requests on the same port.

use bytes::Bytes;
use vidshard_integration_tests::TestCluster;
use vidshard_net::{ErrorKind, MigrationSummary, NetError, StorageClient};
use vidshard_types::{ContentKey, NodeAddr};

#[tokio::test]
#[ntest::timeout(30000)]
async fn test_content_requests_are_forwarded() {
    let c = TestCluster::new(3).await;
    let (client, _stop) = c.serve_router().await;
    let key = ContentKey::new("v9", "seg-7.m4s").unwrap();

    client
        .write_file(&key, Bytes::from_static(b"via router"))
        .await
        .unwrap();
    let owner = c.router.owner_of("v9", "seg-7.m4s").unwrap();
    assert_eq!(c.holders(&key).await, vec![owner]);
    assert_eq!(
        client.read_file(&key).await.unwrap(),
        Bytes::from_static(b"via router")
    );
    // Writes through the wire are indexed like direct ones.
    assert_eq!(c.router.keys(), vec![key.clone()]);

    client.delete_file(&key).await.unwrap();
    assert!(client.read_file(&key).await.unwrap_err().is_not_found());
    assert!(client.delete_file(&key).await.unwrap_err().is_not_found());
}

#[tokio::test]
#[ntest::timeout(30000)]
async fn test_admin_list_add_remove() {
    let mut c = TestCluster::new(2).await;
    let keys = c.write_keys(80).await;
    let (client, _stop) = c.serve_router().await;

    client.ping().await.unwrap();
    assert_eq!(
        client.list_nodes().await.unwrap(),
        vec![c.node(0).addr().clone(), c.node(1).addr().clone()]
    );

    let idx = c.spawn_node().await;
    let new = c.node(idx).addr().clone();
    let added = client.add_node(&new).await.unwrap();
    assert_eq!(added.migrated_file_count as usize, c.node(idx).keys().await.len());
    assert_eq!(added.failed_file_count, 0);
    assert_eq!(client.list_nodes().await.unwrap().len(), 3);
    c.assert_converged(&keys).await;

    let removed = client.remove_node(&new).await.unwrap();
    assert_eq!(removed.migrated_file_count, added.migrated_file_count);
    assert_eq!(client.list_nodes().await.unwrap().len(), 2);
    c.assert_converged(&keys).await;
}

#[tokio::test]
#[ntest::timeout(30000)]
async fn test_admin_rejections() {
    let c = TestCluster::new(1).await;
    c.write_keys(5).await;
    let (client, _stop) = c.serve_router().await;
    let only = c.node(0).addr().clone();

    let err = client.add_node(&only).await.unwrap_err();
    assert!(
        matches!(err, NetError::Remote { kind: ErrorKind::AlreadyExists, .. }),
        "got {err:?}"
    );

    let err = client.remove_node(&only).await.unwrap_err();
    assert!(
        matches!(err, NetError::Remote { kind: ErrorKind::FailedPrecondition, .. }),
        "got {err:?}"
    );

    let err = client.add_node(&NodeAddr::new("")).await.unwrap_err();
    assert!(
        matches!(err, NetError::Remote { kind: ErrorKind::InvalidArgument, .. }),
        "got {err:?}"
    );

    // Removing an unknown node is a no-op reported as zero moved.
    let summary = client
        .remove_node(&NodeAddr::new("127.0.0.1:1"))
        .await
        .unwrap();
    assert_eq!(summary, MigrationSummary::default());
    assert_eq!(client.list_nodes().await.unwrap(), vec![only]);
}

#[tokio::test]
#[ntest::timeout(30000)]
async fn test_unreachable_join_over_wire() {
    let c = TestCluster::new(1).await;
    let (client, _stop) = c.serve_router().await;

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let dead = NodeAddr::new(listener.local_addr().unwrap().to_string());
    drop(listener);

    let err = client.add_node(&dead).await.unwrap_err();
    assert!(
        matches!(err, NetError::Remote { kind: ErrorKind::Unavailable, .. }),
        "got {err:?}"
    );
    assert_eq!(client.list_nodes().await.unwrap().len(), 1);
}
