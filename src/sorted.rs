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

//! Sorted key views and the sort-stage interface
//!
//! The sort stage publishes, per side and MSB, a header and a sequence of
//! batches. Each batch holds composite keys in sorted order and the matching
//! slice of the order permutation (sorted rank to global row number).

use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::{MergeError, MergeResult};
use crate::paged::{PagedArray, PagedKeys};

/// Which input of the join
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Side {
    Left,
    Right,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Left => write!(f, "left"),
            Side::Right => write!(f, "right"),
        }
    }
}

/// Shape of one sorted bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortedHeader {
    pub num_rows: u64,
    pub batch_size: usize,
    pub num_batches: usize,
}

impl SortedHeader {
    /// Header of a bucket with no rows
    pub fn empty() -> Self {
        Self {
            num_rows: 0,
            batch_size: 0,
            num_batches: 0,
        }
    }
}

/// One batch of sorted keys and their global row numbers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortedBatch {
    pub keys: Vec<u8>,
    pub order: Vec<u64>,
}

/// Output of the sort stage, read by merge tasks
#[async_trait]
pub trait SortedBucketSource: Send + Sync {
    /// Header of a bucket, `None` when the bucket has no rows
    async fn header(&self, side: Side, msb: u8) -> MergeResult<Option<SortedHeader>>;

    /// One batch of a bucket whose header exists
    async fn batch(&self, side: Side, msb: u8, batch: usize) -> MergeResult<SortedBatch>;
}

type BucketEntry = (SortedHeader, Vec<SortedBatch>);

/// Sort-stage output held in process memory
#[derive(Default)]
pub struct InMemorySortedBuckets {
    buckets: RwLock<HashMap<(Side, u8), BucketEntry>>,
}

impl InMemorySortedBuckets {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish one bucket, replacing any earlier one
    pub async fn put(
        &self,
        side: Side,
        msb: u8,
        header: SortedHeader,
        batches: Vec<SortedBatch>,
    ) -> MergeResult<()> {
        if header.num_batches != batches.len() {
            return Err(MergeError::Invalid(format!(
                "{} bucket {} header lists {} batches, {} given",
                side,
                msb,
                header.num_batches,
                batches.len()
            )));
        }
        self.buckets
            .write()
            .await
            .insert((side, msb), (header, batches));
        Ok(())
    }

    /// MSBs with a published header on one side, ascending
    pub async fn msbs(&self, side: Side) -> Vec<u8> {
        let guard = self.buckets.read().await;
        let mut msbs: Vec<u8> = guard
            .keys()
            .filter(|(s, _)| *s == side)
            .map(|(_, m)| *m)
            .collect();
        msbs.sort_unstable();
        msbs
    }
}

#[async_trait]
impl SortedBucketSource for InMemorySortedBuckets {
    async fn header(&self, side: Side, msb: u8) -> MergeResult<Option<SortedHeader>> {
        Ok(self.buckets.read().await.get(&(side, msb)).map(|(h, _)| *h))
    }

    async fn batch(&self, side: Side, msb: u8, batch: usize) -> MergeResult<SortedBatch> {
        let guard = self.buckets.read().await;
        guard
            .get(&(side, msb))
            .and_then(|(_, batches)| batches.get(batch))
            .cloned()
            .ok_or(MergeError::MissingPartition {
                side,
                msb: msb as i32,
            })
    }
}

/// Sorted keys and order of one bucket, loaded for the duration of a task
///
/// Only the per-node fetch counters change after loading.
#[derive(Debug, Clone)]
pub struct SortedKeyView {
    keys: PagedKeys,
    order: PagedArray<u64>,
    per_node_rows_to_fetch: Vec<u64>,
}

impl SortedKeyView {
    /// Load every batch of a bucket; `Ok(None)` when the bucket has no header
    pub async fn load(
        source: &dyn SortedBucketSource,
        side: Side,
        msb: u8,
        key_size: usize,
        cluster_size: usize,
    ) -> MergeResult<Option<Self>> {
        let header = match source.header(side, msb).await? {
            Some(header) => header,
            None => return Ok(None),
        };
        let mut batches = Vec::with_capacity(header.num_batches);
        for b in 0..header.num_batches {
            batches.push(source.batch(side, msb, b).await?);
        }
        Self::from_batches(header, batches, key_size, cluster_size).map(Some)
    }

    /// View over a bucket with no rows
    pub fn empty(key_size: usize, cluster_size: usize) -> MergeResult<Self> {
        Self::from_batches(SortedHeader::empty(), Vec::new(), key_size, cluster_size)
    }

    pub fn from_batches(
        header: SortedHeader,
        batches: Vec<SortedBatch>,
        key_size: usize,
        cluster_size: usize,
    ) -> MergeResult<Self> {
        let mut key_pages = Vec::with_capacity(batches.len());
        let mut order_pages = Vec::with_capacity(batches.len());
        for (b, batch) in batches.into_iter().enumerate() {
            if batch.keys.len() != batch.order.len() * key_size {
                return Err(MergeError::Invalid(format!(
                    "sorted batch {} has {} key bytes for {} rows of {} bytes",
                    b,
                    batch.keys.len(),
                    batch.order.len(),
                    key_size
                )));
            }
            key_pages.push(batch.keys);
            order_pages.push(batch.order);
        }
        let keys = PagedKeys::from_pages(key_pages, header.batch_size, key_size)?;
        let order = PagedArray::from_pages(order_pages, header.batch_size)?;
        if order.len() != header.num_rows {
            return Err(MergeError::Invalid(format!(
                "sorted header lists {} rows, batches hold {}",
                header.num_rows,
                order.len()
            )));
        }
        Ok(Self {
            keys,
            order,
            per_node_rows_to_fetch: vec![0; cluster_size],
        })
    }

    pub fn num_rows(&self) -> u64 {
        self.order.len()
    }

    /// Key bytes at a sorted rank
    #[inline]
    pub fn key(&self, rank: u64) -> &[u8] {
        self.keys.key(rank)
    }

    /// Global row number at a sorted rank
    #[inline]
    pub fn order_at(&self, rank: u64) -> u64 {
        *self.order.get(rank)
    }

    /// Count one more row to fetch from `node`
    #[inline]
    pub fn count_fetch(&mut self, node: usize) -> MergeResult<()> {
        match self.per_node_rows_to_fetch.get_mut(node) {
            Some(count) => {
                *count += 1;
                Ok(())
            }
            None => Err(MergeError::IndexError(format!(
                "node {} outside cluster of {}",
                node,
                self.per_node_rows_to_fetch.len()
            ))),
        }
    }

    pub fn per_node_rows_to_fetch(&self) -> &[u64] {
        &self.per_node_rows_to_fetch
    }

    pub fn num_rows_to_fetch(&self) -> u64 {
        self.per_node_rows_to_fetch.iter().sum()
    }
}
