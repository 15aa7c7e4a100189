//! Shared test utilities for vidshard-router tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use vidshard_net::{NetError, NodeConnector, StorageClient};
use vidshard_types::{ContentKey, NodeAddr};

use crate::{ContentRouter, MembershipManager, RouterState};

/// In-memory storage node with failure injection.
pub struct MockNode {
    addr: NodeAddr,
    files: Mutex<HashMap<ContentKey, Bytes>>,
    pub down: AtomicBool,
    pub fail_writes: AtomicBool,
    pub fail_deletes: AtomicBool,
    pub fail_reads: AtomicBool,
    /// Artificial latency applied to every call.
    pub delay_ms: AtomicUsize,
    pub writes: AtomicUsize,
}

impl MockNode {
    pub fn new(addr: &NodeAddr) -> Self {
        Self {
            addr: addr.clone(),
            files: Mutex::new(HashMap::new()),
            down: AtomicBool::new(false),
            fail_writes: AtomicBool::new(false),
            fail_deletes: AtomicBool::new(false),
            fail_reads: AtomicBool::new(false),
            delay_ms: AtomicUsize::new(0),
            writes: AtomicUsize::new(0),
        }
    }

    /// Keys held by this node, sorted.
    pub fn keys(&self) -> Vec<ContentKey> {
        let mut keys: Vec<_> = self.files.lock().unwrap().keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn has(&self, key: &ContentKey) -> bool {
        self.files.lock().unwrap().contains_key(key)
    }

    pub fn get(&self, key: &ContentKey) -> Option<Bytes> {
        self.files.lock().unwrap().get(key).cloned()
    }

    /// Write directly, bypassing the router.
    pub fn put(&self, key: &ContentKey, data: &[u8]) {
        self.files
            .lock()
            .unwrap()
            .insert(key.clone(), Bytes::copy_from_slice(data));
    }

    /// Delete directly, bypassing the router.
    pub fn remove(&self, key: &ContentKey) {
        self.files.lock().unwrap().remove(key);
    }

    pub fn file_count(&self) -> usize {
        self.files.lock().unwrap().len()
    }

    fn unavailable(&self) -> NetError {
        NetError::Connect {
            addr: self.addr.clone(),
            reason: "node is down".into(),
        }
    }

    fn injected(&self, what: &str) -> NetError {
        NetError::Remote {
            kind: vidshard_net::ErrorKind::Internal,
            message: format!("injected {what} failure on {}", self.addr),
        }
    }

    async fn enter(&self) -> Result<(), NetError> {
        let delay = self.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay as u64)).await;
        }
        if self.down.load(Ordering::SeqCst) {
            return Err(self.unavailable());
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl StorageClient for MockNode {
    fn addr(&self) -> &NodeAddr {
        &self.addr
    }

    async fn write_file(&self, key: &ContentKey, data: Bytes) -> Result<(), NetError> {
        self.enter().await?;
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(self.injected("write"));
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.files.lock().unwrap().insert(key.clone(), data);
        Ok(())
    }

    async fn read_file(&self, key: &ContentKey) -> Result<Bytes, NetError> {
        self.enter().await?;
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(self.injected("read"));
        }
        self.get(key)
            .ok_or_else(|| NetError::NotFound(format!("{key} on {}", self.addr)))
    }

    async fn delete_file(&self, key: &ContentKey) -> Result<(), NetError> {
        self.enter().await?;
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(self.injected("delete"));
        }
        match self.files.lock().unwrap().remove(key) {
            Some(_) => Ok(()),
            None => Err(NetError::NotFound(format!("{key} on {}", self.addr))),
        }
    }
}

/// A set of mock nodes; doubles as the router's [`NodeConnector`].
#[derive(Default)]
pub struct MockCluster {
    nodes: Mutex<HashMap<NodeAddr, Arc<MockNode>>>,
}

impl MockCluster {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// The node at `addr`, created on first use.
    pub fn node(&self, addr: &str) -> Arc<MockNode> {
        let addr = NodeAddr::from(addr);
        self.nodes
            .lock()
            .unwrap()
            .entry(addr.clone())
            .or_insert_with(|| Arc::new(MockNode::new(&addr)))
            .clone()
    }

    /// Every node that holds `key`.
    pub fn holders(&self, key: &ContentKey) -> Vec<NodeAddr> {
        let mut holders: Vec<_> = self
            .nodes
            .lock()
            .unwrap()
            .values()
            .filter(|n| n.has(key))
            .map(|n| n.addr.clone())
            .collect();
        holders.sort();
        holders
    }
}

#[async_trait::async_trait]
impl NodeConnector for MockCluster {
    async fn connect(&self, addr: &NodeAddr) -> Result<Arc<dyn StorageClient>, NetError> {
        let node = self.node(addr.as_str());
        if node.down.load(Ordering::SeqCst) {
            return Err(node.unavailable());
        }
        Ok(node)
    }
}

/// A router and membership manager over mock nodes.
pub struct Harness {
    pub cluster: Arc<MockCluster>,
    pub router: ContentRouter,
    pub membership: Arc<MembershipManager>,
}

impl Harness {
    /// Bootstrap a router over `nodes`.
    pub async fn new(nodes: &[&str]) -> Self {
        let cluster = MockCluster::new();
        let state = RouterState::new();
        let membership = Arc::new(MembershipManager::new(state.clone(), cluster.clone()));
        let addrs: Vec<NodeAddr> = nodes.iter().map(|n| NodeAddr::from(*n)).collect();
        membership.bootstrap(&addrs).await.unwrap();
        Self {
            cluster,
            router: ContentRouter::new(state),
            membership,
        }
    }

    pub fn state(&self) -> &Arc<RouterState> {
        self.router.state()
    }

    /// Write `count` keys through the router; returns them.
    pub async fn write_keys(&self, count: usize) -> Vec<ContentKey> {
        let mut keys = Vec::with_capacity(count);
        for i in 0..count {
            let video = format!("video-{}", i % 7);
            let file = format!("seg-{i:04}.m4s");
            self.router
                .write(&video, &file, payload(i))
                .await
                .unwrap();
            keys.push(ContentKey::new(video, file).unwrap());
        }
        keys
    }

    /// Assert every key written by [`Harness::write_keys`] lives only on its
    /// current owner and reads back through the router.
    pub async fn assert_converged(&self, keys: &[ContentKey]) {
        let topology = self.state().topology();
        for (i, key) in keys.iter().enumerate() {
            let owner = topology.ring().owner_of(key).unwrap().clone();
            assert_eq!(
                self.cluster.holders(key),
                vec![owner.clone()],
                "{key} should live only on {owner}"
            );
            let data = self
                .router
                .read(key.video_id(), key.filename())
                .await
                .unwrap();
            assert_eq!(data, payload(i));
        }
    }
}

/// Deterministic payload for the `i`-th written key.
pub fn payload(i: usize) -> Bytes {
    Bytes::from(format!("payload-{i}").into_bytes())
}

pub fn addr(s: &str) -> NodeAddr {
    NodeAddr::from(s)
}

pub fn key(video: &str, file: &str) -> ContentKey {
    ContentKey::new(video, file).unwrap()
}
