use crc32fast::Hasher;
use netpath_core::error::{ErrorCode, NetpathError};
use netpath_core::model::{Network, NetworkId};
use rkyv::Deserialize;
use sha2::{Digest, Sha256};
use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio::fs;

const BLOB_MAGIC: &[u8; 4] = b"NPB1";
/// Format: [magic: 4 bytes][CRC: 4 bytes][Len: 8 bytes][Payload: Len bytes]
const HEADER_LEN: usize = 16;
const BLOB_EXTENSION: &str = "rkyv";
const DEFAULT_IO_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Error, Debug)]
pub enum BlobError {
    #[error("stored network {id} is corrupt")]
    CorruptBlob { id: NetworkId },
    #[error("failed to read stored network {id}: {source}")]
    StorageRead { id: NetworkId, source: io::Error },
    #[error("failed to persist network {id}: {source}")]
    StorageWrite { id: NetworkId, source: io::Error },
    #[error("failed to serialize network {id}")]
    Serialization { id: NetworkId },
}

impl NetpathError for BlobError {
    fn error_code(&self) -> ErrorCode {
        ErrorCode::Internal
    }
}

/// One serialized network per identifier in a local directory.
///
/// Writes land in a uniquely named temp file that is renamed over the
/// target, so concurrent saves of one identifier resolve to the last
/// writer and a reader never sees a partial file.
pub struct BlobStore {
    dir: PathBuf,
    io_timeout: Duration,
    tmp_seq: AtomicU64,
}

impl BlobStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            io_timeout: DEFAULT_IO_TIMEOUT,
            tmp_seq: AtomicU64::new(0),
        }
    }

    pub fn with_io_timeout(mut self, io_timeout: Duration) -> Self {
        self.io_timeout = io_timeout;
        self
    }

    pub fn path_for(&self, id: &NetworkId) -> PathBuf {
        self.dir.join(format!("{}.{}", file_stem(id), BLOB_EXTENSION))
    }

    pub async fn exists(&self, id: &NetworkId) -> bool {
        fs::try_exists(self.path_for(id)).await.unwrap_or(false)
    }

    pub async fn load(&self, id: &NetworkId) -> Result<Network, BlobError> {
        let path = self.path_for(id);
        let bytes = bounded(self.io_timeout, fs::read(&path))
            .await
            .map_err(|source| BlobError::StorageRead {
                id: id.clone(),
                source,
            })?;
        decode(&bytes).ok_or_else(|| BlobError::CorruptBlob { id: id.clone() })
    }

    pub async fn save(&self, id: &NetworkId, network: &Network) -> Result<(), BlobError> {
        let payload = rkyv::to_bytes::<_, 4096>(network)
            .map_err(|_| BlobError::Serialization { id: id.clone() })?;
        let frame = encode(&payload);

        let path = self.path_for(id);
        let seq = self.tmp_seq.fetch_add(1, Ordering::Relaxed);
        let tmp_path = path.with_extension(format!("{}.{}.tmp", std::process::id(), seq));
        let dir = self.dir.clone();

        let write = async {
            fs::create_dir_all(&dir).await?;
            fs::write(&tmp_path, &frame).await?;
            fs::rename(&tmp_path, &path).await
        };
        let result = bounded(self.io_timeout, write).await;
        if result.is_err() {
            let _ = fs::remove_file(&tmp_path).await;
        }
        result.map_err(|source| BlobError::StorageWrite {
            id: id.clone(),
            source,
        })
    }
}

async fn bounded<T>(
    limit: Duration,
    op: impl Future<Output = io::Result<T>>,
) -> io::Result<T> {
    match tokio::time::timeout(limit, op).await {
        Ok(result) => result,
        Err(_) => Err(io::Error::new(
            io::ErrorKind::TimedOut,
            format!("storage operation exceeded {:?}", limit),
        )),
    }
}

fn encode(payload: &[u8]) -> Vec<u8> {
    let mut hasher = Hasher::new();
    hasher.update(payload);

    let mut frame = Vec::with_capacity(HEADER_LEN + payload.len());
    frame.extend_from_slice(BLOB_MAGIC);
    frame.extend_from_slice(&hasher.finalize().to_be_bytes());
    frame.extend_from_slice(&(payload.len() as u64).to_be_bytes());
    frame.extend_from_slice(payload);
    frame
}

fn decode(frame: &[u8]) -> Option<Network> {
    if frame.len() < HEADER_LEN || &frame[..4] != BLOB_MAGIC {
        return None;
    }
    let crc = u32::from_be_bytes(frame[4..8].try_into().ok()?);
    let len = u64::from_be_bytes(frame[8..16].try_into().ok()?) as usize;
    let payload = &frame[HEADER_LEN..];
    if payload.len() != len {
        return None;
    }

    let mut hasher = Hasher::new();
    hasher.update(payload);
    if hasher.finalize() != crc {
        return None;
    }

    // Archived data must be aligned before validation.
    let mut aligned = rkyv::AlignedVec::with_capacity(len);
    aligned.extend_from_slice(payload);
    let archived = rkyv::check_archived_root::<Network>(&aligned).ok()?;
    match archived.deserialize(&mut rkyv::Infallible) {
        Ok(network) => Some(network),
        Err(never) => match never {},
    }
}

fn file_stem(id: &NetworkId) -> String {
    let raw = id.as_str();
    let safe = !raw.is_empty()
        && !raw.starts_with('.')
        && raw
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if safe {
        raw.to_string()
    } else {
        format!("{:x}", Sha256::digest(raw.as_bytes()))
    }
}
