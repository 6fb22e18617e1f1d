use async_trait::async_trait;
use netpath_core::error::{ErrorCode, NetpathError};
use netpath_core::model::{Network, NetworkEdge, NetworkId, NetworkNode};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use storage::{BlobError, BlobStore, CacheError, NetworkCache, RemoteFetchError, RemoteNetworkSource};
use tempfile::{tempdir, TempDir};

const HOST: &str = "http://example.org";

fn reference_network() -> Network {
    let mut network = Network::new(Some("reference".to_string()));
    for (id, name) in [(0, "EGFR"), (1, "GRB2"), (2, "SOS1"), (3, "MAP2K1")] {
        network.nodes.push(NetworkNode::new(id, name));
    }
    network
        .edges
        .push(NetworkEdge::new(10, 0, 1, "controls-state-change-of"));
    network
        .edges
        .push(NetworkEdge::new(11, 1, 2, "controls-state-change-of"));
    network
        .edges
        .push(NetworkEdge::new(12, 2, 3, "controls-phosphorylation-of"));
    network
}

/// Remote source double that counts downloads and can fail the first N.
struct CountingSource {
    calls: AtomicUsize,
    delay: Duration,
    failures: usize,
}

impl CountingSource {
    fn new(delay: Duration) -> Arc<Self> {
        Self::failing(delay, 0)
    }

    fn failing(delay: Duration, failures: usize) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            delay,
            failures,
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RemoteNetworkSource for CountingSource {
    async fn fetch(&self, _host: &str, _id: &NetworkId) -> Result<Network, RemoteFetchError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        if call < self.failures {
            return Err(RemoteFetchError::Status(503));
        }
        Ok(reference_network())
    }
}

fn cache_with(source: Arc<CountingSource>) -> (TempDir, NetworkCache) {
    let dir = tempdir().unwrap();
    let cache = NetworkCache::new(BlobStore::new(dir.path()), source);
    (dir, cache)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_first_resolutions_fetch_once() {
    let source = CountingSource::new(Duration::from_millis(100));
    let (dir, cache) = cache_with(source.clone());
    let id = NetworkId::new("ABC123");

    let mut handles = Vec::new();
    for _ in 0..8 {
        let cache = cache.clone();
        let id = id.clone();
        handles.push(tokio::spawn(async move { cache.resolve(&id, HOST).await }));
    }
    for handle in handles {
        let resolved = handle.await.unwrap().expect("resolve");
        assert_eq!(resolved.network.edge_count(), 3);
    }

    assert_eq!(source.calls(), 1);
    let stats = cache.stats();
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.remote_fetches, 1);
    assert_eq!(stats.blob_writes, 1);
    assert_eq!(stats.hits, 7);
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
}

#[tokio::test]
async fn resolved_copies_are_independent() {
    let source = CountingSource::new(Duration::ZERO);
    let (_dir, cache) = cache_with(source.clone());
    let id = NetworkId::new("ABC123");

    let mut first = cache.resolve(&id, HOST).await.expect("first resolve");
    assert!(first.network.remove_edge(11).is_some());
    first.network.nodes.clear();

    let mut second = cache.resolve(&id, HOST).await.expect("second resolve");
    assert_eq!(second.network, reference_network());
    assert_eq!(second.original_edge_map, reference_network().edge_map());
    second.network.retain_edges(|edge| edge.interaction != "controls-state-change-of");

    let third = cache.resolve(&id, HOST).await.expect("third resolve");
    assert_eq!(third.network.edge_count(), 3);
    assert_eq!(source.calls(), 1);
}

#[tokio::test]
async fn persisted_blob_is_preferred_over_remote() {
    let source = CountingSource::new(Duration::ZERO);
    let dir = tempdir().unwrap();
    let id = NetworkId::new("ABC123");
    BlobStore::new(dir.path())
        .save(&id, &reference_network())
        .await
        .unwrap();

    let cache = NetworkCache::new(BlobStore::new(dir.path()), source.clone());
    let resolved = cache.resolve(&id, HOST).await.expect("resolve");

    assert_eq!(resolved.network, reference_network());
    assert_eq!(source.calls(), 0);
    assert_eq!(cache.stats().blob_loads, 1);
    assert_eq!(cache.stats().blob_writes, 0);
}

#[tokio::test]
async fn unrelated_identifiers_are_cached_separately() {
    let source = CountingSource::new(Duration::ZERO);
    let (_dir, cache) = cache_with(source.clone());

    cache.resolve(&NetworkId::new("one"), HOST).await.unwrap();
    cache.resolve(&NetworkId::new("two"), HOST).await.unwrap();
    cache.resolve(&NetworkId::new("one"), HOST).await.unwrap();

    assert_eq!(source.calls(), 2);
    assert_eq!(cache.len(), 2);
    assert!(cache.contains(&NetworkId::new("two")));
    assert!(!cache.contains(&NetworkId::new("three")));
}

#[tokio::test]
async fn failed_fetch_leaves_no_entry_and_can_be_retried() {
    let source = CountingSource::failing(Duration::ZERO, 1);
    let (dir, cache) = cache_with(source.clone());
    let id = NetworkId::new("ABC123");

    let err = cache.resolve(&id, HOST).await.unwrap_err();
    assert!(matches!(err, CacheError::RemoteFetchFailed { .. }));
    assert_eq!(err.error_code(), ErrorCode::Unavailable);
    assert!(!cache.contains(&id));
    assert!(cache.is_empty());
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);

    let resolved = cache.resolve(&id, HOST).await.expect("retry");
    assert_eq!(resolved.network.edge_count(), 3);
    assert!(cache.contains(&id));
    assert_eq!(source.calls(), 2);
}

#[tokio::test]
async fn slow_remote_times_out() {
    let source = CountingSource::new(Duration::from_secs(5));
    let dir = tempdir().unwrap();
    let cache = NetworkCache::with_fetch_timeout(
        BlobStore::new(dir.path()),
        source,
        Duration::from_millis(50),
    );

    let err = cache.resolve(&NetworkId::new("slow"), HOST).await.unwrap_err();
    match err {
        CacheError::RemoteFetchFailed { source, .. } => {
            assert!(matches!(source, RemoteFetchError::Timeout(_)))
        }
        other => panic!("expected timeout, got {other}"),
    }
}

#[tokio::test]
async fn persistence_failure_still_serves_network() {
    let source = CountingSource::new(Duration::ZERO);
    let dir = tempdir().unwrap();
    let blocker = dir.path().join("blobs");
    std::fs::write(&blocker, b"a file, not a directory").unwrap();
    let cache = NetworkCache::new(BlobStore::new(&blocker), source.clone());
    let id = NetworkId::new("ABC123");

    let resolved = cache.resolve(&id, HOST).await.expect("resolve");
    assert_eq!(resolved.network.edge_count(), 3);
    assert_eq!(cache.stats().persist_failures, 1);

    cache.resolve(&id, HOST).await.expect("cached resolve");
    assert_eq!(source.calls(), 1);
    assert_eq!(cache.stats().blob_writes, 1);
}

#[tokio::test]
async fn corrupt_blob_is_surfaced() {
    let source = CountingSource::new(Duration::ZERO);
    let (dir, cache) = cache_with(source.clone());
    let id = NetworkId::new("ABC123");
    std::fs::write(dir.path().join("ABC123.rkyv"), b"garbage").unwrap();

    let err = cache.resolve(&id, HOST).await.unwrap_err();
    assert!(matches!(err, CacheError::Blob(BlobError::CorruptBlob { .. })));
    assert_eq!(err.error_code(), ErrorCode::Internal);
    assert_eq!(source.calls(), 0);
    assert!(!cache.contains(&id));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn abandoned_resolution_still_completes_the_load() {
    let source = CountingSource::new(Duration::from_millis(150));
    let (_dir, cache) = cache_with(source.clone());
    let id = NetworkId::new("ABC123");

    let abandoned = {
        let cache = cache.clone();
        let id = id.clone();
        tokio::spawn(async move { cache.resolve(&id, HOST).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    abandoned.abort();

    let resolved = cache.resolve(&id, HOST).await.expect("resolve after abort");
    assert_eq!(resolved.network.edge_count(), 3);
    assert_eq!(source.calls(), 1);
}
