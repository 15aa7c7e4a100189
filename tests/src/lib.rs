//! Shared test harness for vidshard integration tests.
//!
//! Provides [`TestCluster`]: real storage nodes (a [`FileStore`] on a
//! temporary directory behind an [`RpcServer`]) listening on ephemeral
//! localhost ports, with a router that dials them over TCP.

use std::sync::Arc;

use bytes::Bytes;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use vidshard_net::{ClientConfig, RpcClient, RpcServer, TcpConnector};
use vidshard_router::{ContentRouter, MembershipManager, RouterService, RouterState};
use vidshard_store::{ContentStore, FileStore, StorageServer, StoreError};
use vidshard_types::{ContentKey, NodeAddr};

// =========================================================================
// Storage nodes
// =========================================================================

/// One storage node served over TCP.
pub struct TestNode {
    addr: NodeAddr,
    store: Arc<FileStore>,
    shutdown: Option<oneshot::Sender<()>>,
    // Dropped last so the directory outlives the server.
    _dir: TempDir,
}

impl TestNode {
    /// Start a node on `127.0.0.1:0`.
    pub async fn start() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(FileStore::new(dir.path()).unwrap());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = NodeAddr::new(listener.local_addr().unwrap().to_string());

        let (tx, rx) = oneshot::channel::<()>();
        let handler = Arc::new(StorageServer::new(store.clone()));
        tokio::spawn(async move {
            let _ = RpcServer::from_listener(listener)
                .serve_with_shutdown(handler, async {
                    let _ = rx.await;
                })
                .await;
        });

        Self {
            addr,
            store,
            shutdown: Some(tx),
            _dir: dir,
        }
    }

    /// The node's `host:port`.
    pub fn addr(&self) -> &NodeAddr {
        &self.addr
    }

    /// The node's backing store, for out-of-band inspection.
    pub fn store(&self) -> &Arc<FileStore> {
        &self.store
    }

    /// Whether the node holds `key` on disk.
    pub async fn has(&self, key: &ContentKey) -> bool {
        match self.store.get(key).await {
            Ok(_) => true,
            Err(StoreError::NotFound(_)) => false,
            Err(e) => panic!("store read failed: {e}"),
        }
    }

    /// Keys held on disk, sorted.
    pub async fn keys(&self) -> Vec<ContentKey> {
        let mut keys = self.store.list().await.unwrap();
        keys.sort();
        keys
    }

    /// Stop accepting new connections.
    pub fn stop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for TestNode {
    fn drop(&mut self) {
        self.stop();
    }
}

// =========================================================================
// Cluster
// =========================================================================

/// Storage nodes plus a router over them.
pub struct TestCluster {
    /// Every node ever started, registered or not.
    pub nodes: Vec<TestNode>,
    pub state: Arc<RouterState>,
    pub router: ContentRouter,
    pub membership: Arc<MembershipManager>,
}

impl TestCluster {
    /// Start `n` nodes and register all of them with a fresh router.
    pub async fn new(n: usize) -> Self {
        let state = RouterState::new();
        let connector = Arc::new(TcpConnector::new(ClientConfig::default()));
        let membership = Arc::new(MembershipManager::new(state.clone(), connector));
        let router = ContentRouter::new(state.clone());

        let mut nodes = Vec::with_capacity(n);
        for _ in 0..n {
            nodes.push(TestNode::start().await);
        }
        let addrs: Vec<NodeAddr> = nodes.iter().map(|n| n.addr().clone()).collect();
        membership.bootstrap(&addrs).await.unwrap();

        Self {
            nodes,
            state,
            router,
            membership,
        }
    }

    /// Start a node without registering it. Returns its index.
    pub async fn spawn_node(&mut self) -> usize {
        self.nodes.push(TestNode::start().await);
        self.nodes.len() - 1
    }

    pub fn node(&self, idx: usize) -> &TestNode {
        &self.nodes[idx]
    }

    /// The node listening on `addr`.
    pub fn node_at(&self, addr: &NodeAddr) -> &TestNode {
        self.nodes
            .iter()
            .find(|n| n.addr() == addr)
            .unwrap_or_else(|| panic!("no test node at {addr}"))
    }

    /// Nodes holding `key` on disk.
    pub async fn holders(&self, key: &ContentKey) -> Vec<NodeAddr> {
        let mut out = Vec::new();
        for node in &self.nodes {
            if node.has(key).await {
                out.push(node.addr().clone());
            }
        }
        out
    }

    /// Write `count` keys spread over a few videos. Returns them in order.
    pub async fn write_keys(&self, count: usize) -> Vec<ContentKey> {
        let mut keys = Vec::with_capacity(count);
        for i in 0..count {
            let video = format!("video-{}", i % 7);
            let file = format!("seg-{i:04}.m4s");
            self.router
                .write(&video, &file, test_data_seeded(256 + i, i as u32))
                .await
                .unwrap();
            keys.push(ContentKey::new(video, file).unwrap());
        }
        keys
    }

    /// Every key lives exactly on its ring owner and reads back intact.
    pub async fn assert_converged(&self, keys: &[ContentKey]) {
        let topology = self.state.topology();
        for (i, key) in keys.iter().enumerate() {
            let owner = topology.ring().owner_of(key).unwrap().clone();
            assert_eq!(
                self.holders(key).await,
                vec![owner.clone()],
                "{key} should live only on {owner}"
            );
            let data = self
                .router
                .read(key.video_id(), key.filename())
                .await
                .unwrap();
            assert_eq!(data, test_data_seeded(256 + i, i as u32), "{key} content");
        }
    }

    /// Serve a [`RouterService`] over TCP and return a client for it.
    pub async fn serve_router(&self) -> (RpcClient, oneshot::Sender<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = NodeAddr::new(listener.local_addr().unwrap().to_string());
        let service = Arc::new(RouterService::new(
            self.router.clone(),
            self.membership.clone(),
        ));
        let (tx, rx) = oneshot::channel::<()>();
        tokio::spawn(async move {
            let _ = RpcServer::from_listener(listener)
                .serve_with_shutdown(service, async {
                    let _ = rx.await;
                })
                .await;
        });
        (RpcClient::new(addr, ClientConfig::default()), tx)
    }
}

/// Deterministic pseudo-random payload.
pub fn test_data_seeded(len: usize, seed: u32) -> Bytes {
    let mut state = seed.wrapping_mul(2_654_435_761).wrapping_add(1);
    let data: Vec<u8> = (0..len)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            state as u8
        })
        .collect();
    Bytes::from(data)
}
