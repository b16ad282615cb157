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

//! Merge context
//!
//! Bundles the collaborators a merge runs against: the cluster, the sort
//! stage output, the chunk store and the configuration. Everything is passed
//! in; there is no process-wide store.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::cluster::Cluster;
use crate::config::MergeConfig;
use crate::error::MergeResult;
use crate::sorted::SortedBucketSource;
use crate::store::ChunkStore;

/// The entry point to merge operations
pub struct MergeContext {
    cluster: Arc<dyn Cluster>,
    sorted: Arc<dyn SortedBucketSource>,
    store: Arc<dyn ChunkStore>,
    config: MergeConfig,
    sequence_no: AtomicU64,
}

impl MergeContext {
    /// Create a context; the configuration is validated again here
    pub fn new(
        cluster: Arc<dyn Cluster>,
        sorted: Arc<dyn SortedBucketSource>,
        store: Arc<dyn ChunkStore>,
        config: MergeConfig,
    ) -> MergeResult<Arc<Self>> {
        config.validate()?;
        Ok(Arc::new(Self {
            cluster,
            sorted,
            store,
            config,
            sequence_no: AtomicU64::new(0),
        }))
    }

    pub fn cluster(&self) -> &Arc<dyn Cluster> {
        &self.cluster
    }

    pub fn cluster_size(&self) -> usize {
        self.cluster.size()
    }

    pub fn sorted(&self) -> &Arc<dyn SortedBucketSource> {
        &self.sorted
    }

    pub fn store(&self) -> &Arc<dyn ChunkStore> {
        &self.store
    }

    pub fn config(&self) -> &MergeConfig {
        &self.config
    }

    /// Next sequence number, used to tag tasks in logs
    pub fn next_sequence(&self) -> u64 {
        self.sequence_no.fetch_add(1, Ordering::Relaxed)
    }
}
