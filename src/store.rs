// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Output chunk stores
//!
//! Merge tasks write their output chunks through [`ChunkStore`]. Each task
//! owns the keys of its bucket pair, so writers never collide.
//!
//! Available stores:
//!
//! - [`InMemoryChunkStore`] - process memory
//! - [`FileSystemChunkStore`] - one file per chunk under a job directory

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::RwLock;

use crate::bucket::BucketId;
use crate::error::{Code, MergeError, MergeResult};

/// Address of one output chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChunkKey {
    pub left: u8,
    pub right: BucketId,
    pub column: usize,
    pub batch: usize,
}

impl ChunkKey {
    pub fn new(left: u8, right: BucketId, column: usize, batch: usize) -> Self {
        Self {
            left,
            right,
            column,
            batch,
        }
    }

    /// Node the chunk should live on
    ///
    /// Chunks follow the right bucket, or the left one for the sentinel.
    pub fn home_node(&self, cluster_size: usize) -> usize {
        let msb = self.right.msb().unwrap_or(self.left) as usize;
        msb % cluster_size.max(1)
    }
}

impl fmt::Display for ChunkKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "__binary_merge__chunk_col{}_batch{}_left{}_right{}",
            self.column, self.batch, self.left, self.right
        )
    }
}

/// Where merge tasks put their output
#[async_trait]
pub trait ChunkStore: Send + Sync {
    async fn put(&self, key: ChunkKey, data: Vec<u8>) -> MergeResult<()>;

    async fn get(&self, key: &ChunkKey) -> MergeResult<Vec<u8>>;

    async fn exists(&self, key: &ChunkKey) -> MergeResult<bool>;

    async fn remove(&self, key: &ChunkKey) -> MergeResult<()>;
}

/// Keys a job may have written, recorded before each write
///
/// A failed job removes every recorded key, so chunks of tasks that finished,
/// failed or were aborted midway do not outlive it.
#[derive(Debug, Default)]
pub struct WrittenChunks {
    keys: Mutex<Vec<ChunkKey>>,
}

impl WrittenChunks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, key: ChunkKey) -> MergeResult<()> {
        self.keys
            .lock()
            .map_err(|_| MergeError::Invariant("written chunk ledger poisoned".to_string()))?
            .push(key);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.keys.lock().map(|k| k.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove every recorded key from `store`; returns how many were removed
    pub async fn rollback(&self, store: &dyn ChunkStore) -> MergeResult<usize> {
        let keys = match self.keys.lock() {
            Ok(mut keys) => std::mem::take(&mut *keys),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        };
        for key in &keys {
            store.remove(key).await?;
        }
        Ok(keys.len())
    }
}

fn not_found(key: &ChunkKey) -> MergeError {
    MergeError::new(Code::NotFound, format!("chunk {} not found", key))
}

/// Chunk store held in process memory
#[derive(Default)]
pub struct InMemoryChunkStore {
    chunks: RwLock<HashMap<ChunkKey, Vec<u8>>>,
}

impl InMemoryChunkStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.chunks.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.chunks.read().await.is_empty()
    }

    /// Every stored key, sorted
    pub async fn keys(&self) -> Vec<ChunkKey> {
        let mut keys: Vec<ChunkKey> = self.chunks.read().await.keys().copied().collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl ChunkStore for InMemoryChunkStore {
    async fn put(&self, key: ChunkKey, data: Vec<u8>) -> MergeResult<()> {
        self.chunks.write().await.insert(key, data);
        Ok(())
    }

    async fn get(&self, key: &ChunkKey) -> MergeResult<Vec<u8>> {
        self.chunks
            .read()
            .await
            .get(key)
            .cloned()
            .ok_or_else(|| not_found(key))
    }

    async fn exists(&self, key: &ChunkKey) -> MergeResult<bool> {
        Ok(self.chunks.read().await.contains_key(key))
    }

    async fn remove(&self, key: &ChunkKey) -> MergeResult<()> {
        self.chunks.write().await.remove(key);
        Ok(())
    }
}

/// Filesystem chunk store
///
/// Directory structure:
/// ```text
/// {base_path}/{job_id}/
/// ├── node_0/
/// │   └── __binary_merge__chunk_col0_batch0_left0_right0.chunk
/// └── node_1/
///     └── ...
/// ```
/// Files are written under a temporary name and renamed into place.
pub struct FileSystemChunkStore {
    base_path: PathBuf,
    job_id: String,
    cluster_size: usize,
}

impl FileSystemChunkStore {
    pub fn new(base_path: impl Into<PathBuf>, job_id: impl Into<String>, cluster_size: usize) -> Self {
        Self {
            base_path: base_path.into(),
            job_id: job_id.into(),
            cluster_size: cluster_size.max(1),
        }
    }

    fn job_path(&self) -> PathBuf {
        self.base_path.join(&self.job_id)
    }

    fn node_path(&self, key: &ChunkKey) -> PathBuf {
        self.job_path()
            .join(format!("node_{}", key.home_node(self.cluster_size)))
    }

    fn chunk_path(&self, key: &ChunkKey) -> PathBuf {
        self.node_path(key).join(format!("{}.chunk", key))
    }

    /// Remove every chunk of the job
    pub async fn clear(&self) -> MergeResult<()> {
        match fs::remove_dir_all(self.job_path()).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl ChunkStore for FileSystemChunkStore {
    async fn put(&self, key: ChunkKey, data: Vec<u8>) -> MergeResult<()> {
        fs::create_dir_all(self.node_path(&key)).await?;
        let path = self.chunk_path(&key);
        let staging = path.with_extension("chunk.tmp");
        let mut file = fs::File::create(&staging).await?;
        file.write_all(&data).await?;
        file.sync_all().await?;
        fs::rename(&staging, &path).await?;
        Ok(())
    }

    async fn get(&self, key: &ChunkKey) -> MergeResult<Vec<u8>> {
        let path = self.chunk_path(key);
        let mut file = match fs::File::open(&path).await {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Err(not_found(key)),
            Err(e) => return Err(e.into()),
        };
        let mut data = Vec::new();
        file.read_to_end(&mut data).await?;
        Ok(data)
    }

    async fn exists(&self, key: &ChunkKey) -> MergeResult<bool> {
        Ok(fs::try_exists(self.chunk_path(key)).await?)
    }

    async fn remove(&self, key: &ChunkKey) -> MergeResult<()> {
        match fs::remove_file(self.chunk_path(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
