use crate::blob::{BlobError, BlobStore};
use crate::remote::{RemoteFetchError, RemoteNetworkSource};
use dashmap::DashMap;
use netpath_core::error::{ErrorCode, NetpathError};
use netpath_core::model::{EdgeMap, Network, NetworkId};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("failed to fetch network {id} from {host}: {source}")]
    RemoteFetchFailed {
        id: NetworkId,
        host: String,
        source: RemoteFetchError,
    },
    #[error(transparent)]
    Blob(#[from] BlobError),
    #[error("loading network {id} was interrupted")]
    LoadInterrupted { id: NetworkId },
}

impl NetpathError for CacheError {
    fn error_code(&self) -> ErrorCode {
        match self {
            CacheError::RemoteFetchFailed { source, .. } => source.error_code(),
            CacheError::Blob(err) => err.error_code(),
            CacheError::LoadInterrupted { .. } => ErrorCode::Internal,
        }
    }
}

/// Canonical copy of a reference network. Never mutated once built.
#[derive(Debug)]
pub struct CachedNetworkEntry {
    id: NetworkId,
    network: Network,
    original_edge_map: EdgeMap,
}

impl CachedNetworkEntry {
    pub fn new(id: NetworkId, network: Network) -> Self {
        let original_edge_map = network.edge_map();
        Self {
            id,
            network,
            original_edge_map,
        }
    }

    pub fn id(&self) -> &NetworkId {
        &self.id
    }

    pub fn network(&self) -> &Network {
        &self.network
    }

    pub fn original_edge_map(&self) -> &EdgeMap {
        &self.original_edge_map
    }

    /// Deep copy for one request. O(graph size).
    fn checkout(&self) -> ResolvedNetwork {
        let started = Instant::now();
        let resolved = ResolvedNetwork {
            network: self.network.clone(),
            original_edge_map: self.original_edge_map.clone(),
        };
        debug!(
            network_id = %self.id,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "copied reference network"
        );
        resolved
    }
}

/// A request-private network plus the edge map captured when it was loaded.
#[derive(Debug, Clone)]
pub struct ResolvedNetwork {
    pub network: Network,
    pub original_edge_map: EdgeMap,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub remote_fetches: u64,
    pub blob_loads: u64,
    pub blob_writes: u64,
    pub persist_failures: u64,
}

#[derive(Default)]
struct CacheCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    remote_fetches: AtomicU64,
    blob_loads: AtomicU64,
    blob_writes: AtomicU64,
    persist_failures: AtomicU64,
}

impl CacheCounters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            remote_fetches: self.remote_fetches.load(Ordering::Relaxed),
            blob_loads: self.blob_loads.load(Ordering::Relaxed),
            blob_writes: self.blob_writes.load(Ordering::Relaxed),
            persist_failures: self.persist_failures.load(Ordering::Relaxed),
        }
    }
}

type Slot = Arc<OnceCell<Arc<CachedNetworkEntry>>>;

/// Process-wide map from identifier to reference network.
///
/// Each identifier owns a slot that is filled at most once. Concurrent first
/// resolutions of one identifier queue on that slot while the first caller
/// loads; unrelated identifiers never wait on each other. A failed load
/// leaves the slot empty and the next waiter tries again.
///
/// Entries are never evicted: memory grows with the number of distinct
/// identifiers resolved over the life of the process.
#[derive(Clone)]
pub struct NetworkCache {
    inner: Arc<CacheInner>,
}

struct CacheInner {
    slots: DashMap<NetworkId, Slot>,
    blobs: BlobStore,
    remote: Arc<dyn RemoteNetworkSource>,
    fetch_timeout: Duration,
    counters: CacheCounters,
}

impl NetworkCache {
    pub fn new(blobs: BlobStore, remote: Arc<dyn RemoteNetworkSource>) -> Self {
        Self::with_fetch_timeout(blobs, remote, DEFAULT_FETCH_TIMEOUT)
    }

    pub fn with_fetch_timeout(
        blobs: BlobStore,
        remote: Arc<dyn RemoteNetworkSource>,
        fetch_timeout: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(CacheInner {
                slots: DashMap::new(),
                blobs,
                remote,
                fetch_timeout,
                counters: CacheCounters::default(),
            }),
        }
    }

    /// Resolve `id`, loading it from disk or `host` on first use.
    ///
    /// The caller always receives its own deep copy; mutating it never
    /// affects the cached entry or any other request.
    pub async fn resolve(&self, id: &NetworkId, host: &str) -> Result<ResolvedNetwork, CacheError> {
        let slot = self.slot(id);
        if let Some(entry) = slot.get() {
            CacheCounters::bump(&self.inner.counters.hits);
            debug!(network_id = %id, "using cached network");
            return Ok(entry.checkout());
        }

        // The load runs detached so that a caller going away mid-load does not
        // abandon it; waiters queued on the slot still get the result.
        let inner = Arc::clone(&self.inner);
        let owned_id = id.clone();
        let host = host.to_string();
        let load = tokio::spawn(async move {
            let mut populated = false;
            let entry = slot
                .get_or_try_init(|| {
                    populated = true;
                    inner.populate(&owned_id, &host)
                })
                .await
                .map(Arc::clone);
            if entry.is_ok() && !populated {
                CacheCounters::bump(&inner.counters.hits);
            }
            entry
        });

        let entry = load
            .await
            .map_err(|_| CacheError::LoadInterrupted { id: id.clone() })??;
        Ok(entry.checkout())
    }

    pub fn contains(&self, id: &NetworkId) -> bool {
        self.inner
            .slots
            .get(id)
            .is_some_and(|slot| slot.initialized())
    }

    /// Number of identifiers with a loaded network.
    pub fn len(&self) -> usize {
        self.inner
            .slots
            .iter()
            .filter(|slot| slot.value().initialized())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        self.inner.counters.snapshot()
    }

    fn slot(&self, id: &NetworkId) -> Slot {
        let slot = self.inner.slots.entry(id.clone()).or_default();
        Arc::clone(slot.value())
    }
}

impl CacheInner {
    async fn populate(
        &self,
        id: &NetworkId,
        host: &str,
    ) -> Result<Arc<CachedNetworkEntry>, CacheError> {
        CacheCounters::bump(&self.counters.misses);
        let started = Instant::now();

        let network = if self.blobs.exists(id).await {
            info!(network_id = %id, "loading reference network from blob store");
            CacheCounters::bump(&self.counters.blob_loads);
            self.blobs.load(id).await?
        } else {
            info!(network_id = %id, host, "downloading reference network");
            CacheCounters::bump(&self.counters.remote_fetches);
            let network = self.fetch_remote(id, host).await?;
            self.persist(id, &network).await;
            network
        };

        info!(
            network_id = %id,
            nodes = network.node_count(),
            edges = network.edge_count(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "reference network loaded"
        );
        Ok(Arc::new(CachedNetworkEntry::new(id.clone(), network)))
    }

    async fn fetch_remote(&self, id: &NetworkId, host: &str) -> Result<Network, CacheError> {
        let fetched = tokio::time::timeout(self.fetch_timeout, self.remote.fetch(host, id))
            .await
            .unwrap_or(Err(RemoteFetchError::Timeout(self.fetch_timeout)));
        fetched.map_err(|source| {
            warn!(network_id = %id, host, error = %source, "remote fetch failed");
            CacheError::RemoteFetchFailed {
                id: id.clone(),
                host: host.to_string(),
                source,
            }
        })
    }

    /// A failed write only costs the disk copy; the in-memory entry is
    /// still served and this identifier is not written again.
    async fn persist(&self, id: &NetworkId, network: &Network) {
        CacheCounters::bump(&self.counters.blob_writes);
        if let Err(err) = self.blobs.save(id, network).await {
            CacheCounters::bump(&self.counters.persist_failures);
            warn!(network_id = %id, error = %err, "could not persist reference network");
        }
    }
}
