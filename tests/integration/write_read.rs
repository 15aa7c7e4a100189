//! Integration test: content round trips through the router to real nodes.

use bytes::Bytes;
use vidshard_integration_tests::{TestCluster, test_data_seeded};
use vidshard_router::RouterError;
use vidshard_types::ContentKey;

#[tokio::test]
#[ntest::timeout(30000)]
async fn test_round_trip_lands_on_owner() {
    let c = TestCluster::new(3).await;
    let data = test_data_seeded(10_000, 7);
    c.router
        .write("movie-42", "seg-00001.m4s", data.clone())
        .await
        .unwrap();

    let key = ContentKey::new("movie-42", "seg-00001.m4s").unwrap();
    let owner = c.router.owner_of("movie-42", "seg-00001.m4s").unwrap();
    assert_eq!(c.holders(&key).await, vec![owner.clone()]);

    // On disk at base_dir/video_id/filename.
    let path = c
        .node_at(&owner)
        .store()
        .base_dir()
        .join("movie-42")
        .join("seg-00001.m4s");
    assert_eq!(std::fs::read(path).unwrap(), data.to_vec());

    assert_eq!(
        c.router.read("movie-42", "seg-00001.m4s").await.unwrap(),
        data
    );
}

#[tokio::test]
#[ntest::timeout(30000)]
async fn test_many_keys_spread_over_nodes() {
    let c = TestCluster::new(4).await;
    let keys = c.write_keys(200).await;
    c.assert_converged(&keys).await;

    let mut total = 0;
    for i in 0..4 {
        total += c.node(i).keys().await.len();
    }
    assert_eq!(total, keys.len(), "each key is stored exactly once");
}

#[tokio::test]
#[ntest::timeout(30000)]
async fn test_delete_is_a_tombstone() {
    let c = TestCluster::new(3).await;
    c.router
        .write("v1", "init.mp4", Bytes::from_static(b"moov"))
        .await
        .unwrap();
    c.router.delete("v1", "init.mp4").await.unwrap();

    let err = c.router.read("v1", "init.mp4").await.unwrap_err();
    assert!(matches!(err, RouterError::NotFound(_)), "got {err:?}");
    let key = ContentKey::new("v1", "init.mp4").unwrap();
    assert!(c.holders(&key).await.is_empty());
    assert!(c.router.keys().is_empty());

    // A second delete reports not found.
    assert!(c.router.delete("v1", "init.mp4").await.unwrap_err().is_not_found());
}

#[tokio::test]
#[ntest::timeout(30000)]
async fn test_overwrite_keeps_single_copy() {
    let c = TestCluster::new(3).await;
    c.router
        .write("v1", "a", Bytes::from_static(b"one"))
        .await
        .unwrap();
    c.router
        .write("v1", "a", Bytes::from_static(b"two"))
        .await
        .unwrap();
    assert_eq!(
        c.router.read("v1", "a").await.unwrap(),
        Bytes::from_static(b"two")
    );
    let key = ContentKey::new("v1", "a").unwrap();
    assert_eq!(c.holders(&key).await.len(), 1);
}

#[tokio::test]
#[ntest::timeout(30000)]
async fn test_large_segment() {
    let c = TestCluster::new(2).await;
    let data = test_data_seeded(8 * 1024 * 1024, 99);
    c.router.write("v1", "big.ts", data.clone()).await.unwrap();
    assert_eq!(c.router.read("v1", "big.ts").await.unwrap(), data);
}

#[tokio::test]
#[ntest::timeout(30000)]
async fn test_empty_segment() {
    let c = TestCluster::new(2).await;
    c.router.write("v1", "empty", Bytes::new()).await.unwrap();
    assert!(c.router.read("v1", "empty").await.unwrap().is_empty());
}

#[tokio::test]
#[ntest::timeout(30000)]
async fn test_path_escape_never_reaches_disk() {
    let c = TestCluster::new(1).await;
    let err = c
        .router
        .write("..", "passwd", Bytes::from_static(b"x"))
        .await
        .unwrap_err();
    assert!(matches!(err, RouterError::InvalidKey(_)));
    assert!(c.node(0).keys().await.is_empty());
}
