pub mod blob;
pub mod cache;
pub mod remote;

pub use blob::{BlobError, BlobStore};
pub use cache::{CacheError, CacheStats, CachedNetworkEntry, NetworkCache, ResolvedNetwork};
pub use remote::{NdexClient, RemoteFetchError, RemoteNetworkSource};
