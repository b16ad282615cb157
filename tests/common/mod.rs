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

//! Shared fixtures for merge tests

#![allow(dead_code)]

use std::sync::Arc;

use arrow::array::{Array, ArrayRef, Float64Array, Int64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;

use msbjoin::job::{JobOutcome, JoinSide, MergeJob};
use msbjoin::presort::{fit_layout, key_columns_from_batches, presort};
use msbjoin::store::ChunkStore;
use msbjoin::{
    FrameKey, InMemoryChunkStore, InMemorySortedBuckets, KeyLayout, LocalCluster, MergeConfig,
    MergeContext, Side,
};

/// Build a batch of nullable Int64 columns
pub fn int_batch(columns: &[(&str, Vec<Option<i64>>)]) -> RecordBatch {
    let fields: Vec<Field> = columns
        .iter()
        .map(|(name, _)| Field::new(*name, DataType::Int64, true))
        .collect();
    let arrays: Vec<ArrayRef> = columns
        .iter()
        .map(|(_, values)| Arc::new(Int64Array::from(values.clone())) as ArrayRef)
        .collect();
    RecordBatch::try_new(Arc::new(Schema::new(fields)), arrays).unwrap()
}

/// Shorthand for non-null integer values
pub fn some(values: &[i64]) -> Vec<Option<i64>> {
    values.iter().map(|v| Some(*v)).collect()
}

pub struct Fixture {
    pub cluster: Arc<LocalCluster>,
    pub sorted: Arc<InMemorySortedBuckets>,
    pub store: Arc<InMemoryChunkStore>,
    pub ctx: Arc<MergeContext>,
    pub left: JoinSide,
    pub right: JoinSide,
}

impl Fixture {
    pub fn job(&self) -> MergeJob {
        MergeJob::new(self.ctx.clone(), self.left.clone(), self.right.clone()).unwrap()
    }

    /// Run a job and stitch its output
    pub async fn run(&self) -> (JobOutcome, RecordBatch) {
        let job = self.job();
        let outcome = job.run().await.unwrap();
        let result = job.collect_result(&outcome).await.unwrap();
        (outcome, result)
    }

    /// Every stored chunk, sorted by key
    pub async fn stored_chunks(&self) -> Vec<(String, Vec<u8>)> {
        let mut chunks = Vec::new();
        for key in self.store.keys().await {
            chunks.push((key.to_string(), self.store.get(&key).await.unwrap()));
        }
        chunks
    }
}

/// Host both inputs, sort them with one shared layout and build a context
pub async fn setup(
    left: &RecordBatch,
    right: &RecordBatch,
    num_keys: usize,
    nodes: usize,
    chunk_rows: usize,
    config: MergeConfig,
) -> Fixture {
    let left_keys = key_columns_from_batches(&[left.clone()], num_keys).unwrap();
    let right_keys = key_columns_from_batches(&[right.clone()], num_keys).unwrap();
    let layout = fit_layout(&[left_keys.as_slice(), right_keys.as_slice()]).unwrap();
    setup_with_layouts(left, right, num_keys, nodes, chunk_rows, config, layout.clone(), layout).await
}

/// Like [`setup`], with each side sorted under its own layout
#[allow(clippy::too_many_arguments)]
pub async fn setup_with_layouts(
    left: &RecordBatch,
    right: &RecordBatch,
    num_keys: usize,
    nodes: usize,
    chunk_rows: usize,
    config: MergeConfig,
    left_layout: KeyLayout,
    right_layout: KeyLayout,
) -> Fixture {
    let cluster = Arc::new(LocalCluster::new(nodes).unwrap());
    let left_frame = cluster
        .register_round_robin(FrameKey::new("left"), left, chunk_rows)
        .await
        .unwrap();
    let right_frame = cluster
        .register_round_robin(FrameKey::new("right"), right, chunk_rows)
        .await
        .unwrap();

    let sorted = Arc::new(InMemorySortedBuckets::new());
    let left_keys = key_columns_from_batches(&[left.clone()], num_keys).unwrap();
    let right_keys = key_columns_from_batches(&[right.clone()], num_keys).unwrap();
    presort(&left_keys, &left_layout, config.batch_size())
        .unwrap()
        .publish(Side::Left, &sorted)
        .await
        .unwrap();
    presort(&right_keys, &right_layout, config.batch_size())
        .unwrap()
        .publish(Side::Right, &sorted)
        .await
        .unwrap();

    let store = Arc::new(InMemoryChunkStore::new());
    let ctx = MergeContext::new(cluster.clone(), sorted.clone(), store.clone(), config).unwrap();
    Fixture {
        cluster,
        sorted,
        store,
        ctx,
        left: JoinSide::new(left_frame, left_layout),
        right: JoinSide::new(right_frame, right_layout),
    }
}

pub fn int_column(batch: &RecordBatch, col: usize) -> Vec<Option<i64>> {
    let array = batch
        .column(col)
        .as_any()
        .downcast_ref::<Int64Array>()
        .unwrap();
    (0..array.len())
        .map(|i| if array.is_null(i) { None } else { Some(array.value(i)) })
        .collect()
}

pub fn float_column(batch: &RecordBatch, col: usize) -> Vec<Option<f64>> {
    let array = batch
        .column(col)
        .as_any()
        .downcast_ref::<Float64Array>()
        .unwrap();
    (0..array.len())
        .map(|i| if array.is_null(i) { None } else { Some(array.value(i)) })
        .collect()
}

pub fn string_column(batch: &RecordBatch, col: usize) -> Vec<Option<String>> {
    let array = batch
        .column(col)
        .as_any()
        .downcast_ref::<StringArray>()
        .unwrap();
    (0..array.len())
        .map(|i| {
            if array.is_null(i) {
                None
            } else {
                Some(array.value(i).to_string())
            }
        })
        .collect()
}

/// Rows of an all-integer batch
pub fn int_rows(batch: &RecordBatch) -> Vec<Vec<Option<i64>>> {
    let columns: Vec<Vec<Option<i64>>> = (0..batch.num_columns())
        .map(|c| int_column(batch, c))
        .collect();
    (0..batch.num_rows())
        .map(|r| columns.iter().map(|c| c[r]).collect())
        .collect()
}

/// Deterministic pseudo-random integers
pub struct Lcg(u64);

impl Lcg {
    pub fn new(seed: u64) -> Self {
        Lcg(seed)
    }

    pub fn next_below(&mut self, bound: u64) -> u64 {
        self.0 = self
            .0
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        (self.0 >> 33) % bound
    }
}
