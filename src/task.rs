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

//! One bucket-pair merge task
//!
//! Load sorted views, resolve the left window, match, plan and gather the
//! fetches, assemble and store. A task either writes all of its chunks or
//! fails.

use std::time::{Duration, Instant};

use arrow::array::Array;

use crate::assemble::{PagedColumn, ResultAssembler};
use crate::bucket::{BucketDescriptor, BucketId};
use crate::chunk::encode_chunk;
use crate::compression::create_compressor;
use crate::config::MergeConfig;
use crate::ctx::MergeContext;
use crate::error::{MergeError, MergeResult};
use crate::fetch::{gather, RowFetchCoordinator};
use crate::matcher::MergeMatchEngine;
use crate::range;
use crate::sorted::{Side, SortedKeyView};
use crate::store::{ChunkKey, WrittenChunks};
use crate::{merge_debug, merge_trace};

/// Wall time spent in each phase of a task
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MergeTimings {
    pub load: Duration,
    pub resolve_and_match: Duration,
    pub plan: Duration,
    pub fetch: Duration,
    /// Summed time the serving nodes reported
    pub remote_fetch: Duration,
    pub assemble: Duration,
    pub store: Duration,
}

impl MergeTimings {
    pub fn total(&self) -> Duration {
        self.load + self.resolve_and_match + self.plan + self.fetch + self.assemble + self.store
    }

    /// Add another task's timings into this one
    pub fn accumulate(&mut self, other: &MergeTimings) {
        self.load += other.load;
        self.resolve_and_match += other.resolve_and_match;
        self.plan += other.plan;
        self.fetch += other.fetch;
        self.remote_fetch += other.remote_fetch;
        self.assemble += other.assemble;
        self.store += other.store;
    }
}

/// What a task produced
#[derive(Debug, Clone, PartialEq)]
pub struct MergeOutcome {
    pub left: u8,
    pub right: BucketId,
    pub num_rows: u64,
    /// Rows per stored output batch
    pub chunk_sizes: Vec<usize>,
    pub num_columns: usize,
    pub one_to_many: bool,
    pub timings: MergeTimings,
}

impl MergeOutcome {
    fn empty(left: u8, right: BucketId, timings: MergeTimings) -> Self {
        Self {
            left,
            right,
            num_rows: 0,
            chunk_sizes: Vec::new(),
            num_columns: 0,
            one_to_many: false,
            timings,
        }
    }

    pub fn num_batches(&self) -> usize {
        self.chunk_sizes.len()
    }
}

/// Merge of one left bucket with one right bucket
#[derive(Debug, Clone)]
pub struct MergeTask {
    left: BucketDescriptor,
    right: BucketDescriptor,
    left_msb: u8,
    num_join_cols: usize,
    config: MergeConfig,
}

impl MergeTask {
    pub fn new(left: BucketDescriptor, right: BucketDescriptor, config: &MergeConfig) -> MergeResult<Self> {
        config.validate()?;
        let left_msb = left
            .id()
            .msb()
            .ok_or_else(|| MergeError::Invalid("left bucket cannot be the sentinel".to_string()))?;
        if right.id().is_none() && !config.all_left() {
            return Err(MergeError::Invalid(
                "the right sentinel bucket only exists for left outer joins".to_string(),
            ));
        }
        let left_fields = left.layout().num_fields();
        let right_fields = right.layout().num_fields();
        if left_fields != right_fields {
            return Err(MergeError::Invalid(format!(
                "left key has {} fields, right key has {}",
                left_fields, right_fields
            )));
        }
        left.check_against_frame()?;
        right.check_against_frame()?;
        Ok(Self {
            left,
            right,
            left_msb,
            num_join_cols: left_fields,
            config: config.clone(),
        })
    }

    pub fn left(&self) -> &BucketDescriptor {
        &self.left
    }

    pub fn right(&self) -> &BucketDescriptor {
        &self.right
    }

    pub fn num_join_cols(&self) -> usize {
        self.num_join_cols
    }

    /// Run the task, recording every chunk key before it is written
    pub async fn run(&self, ctx: &MergeContext, written: &WrittenChunks) -> MergeResult<MergeOutcome> {
        let seq = ctx.next_sequence();
        let cluster_size = ctx.cluster_size();
        let all_left = self.config.all_left();
        let right_id = self.right.id();
        let mut timings = MergeTimings::default();

        let t0 = Instant::now();
        let mut left_view = match SortedKeyView::load(
            ctx.sorted().as_ref(),
            Side::Left,
            self.left_msb,
            self.left.key_size(),
            cluster_size,
        )
        .await?
        {
            Some(view) => view,
            None => {
                merge_debug!("task {}: left bucket {} has no rows", seq, self.left_msb);
                timings.load = t0.elapsed();
                return Ok(MergeOutcome::empty(self.left_msb, right_id, timings));
            }
        };
        let right_loaded = match right_id {
            BucketId::None => None,
            BucketId::Msb(msb) => {
                SortedKeyView::load(
                    ctx.sorted().as_ref(),
                    Side::Right,
                    msb,
                    self.right.key_size(),
                    cluster_size,
                )
                .await?
            }
        };
        let mut right_view = match right_loaded {
            Some(view) => view,
            None if all_left => SortedKeyView::empty(self.right.key_size(), cluster_size)?,
            None => {
                merge_debug!("task {}: right bucket {} has no rows", seq, right_id);
                timings.load = t0.elapsed();
                return Ok(MergeOutcome::empty(self.left_msb, right_id, timings));
            }
        };
        timings.load = t0.elapsed();

        let t0 = Instant::now();
        let window = range::resolve(&self.left, &left_view, &self.right, all_left)?;
        if window.is_empty() {
            merge_debug!(
                "task {}: no left rows of bucket {} fall in right bucket {}",
                seq,
                self.left_msb,
                right_id
            );
            timings.resolve_and_match = t0.elapsed();
            return Ok(MergeOutcome::empty(self.left_msb, right_id, timings));
        }
        let matched = MergeMatchEngine::new(
            &self.left,
            &self.right,
            &mut left_view,
            &mut right_view,
            window,
            self.num_join_cols,
            all_left,
            self.config.batch_size(),
        )
        .run()?;
        timings.resolve_and_match = t0.elapsed();
        merge_trace!(
            "task {}: window ({}, {}) gives {} rows",
            seq,
            window.from,
            window.to,
            matched.num_rows
        );
        if matched.num_rows == 0 {
            return Ok(MergeOutcome::empty(self.left_msb, right_id, timings));
        }

        let t0 = Instant::now();
        let coordinator = RowFetchCoordinator::new(
            &self.left,
            &self.right,
            &left_view,
            &right_view,
            window,
            all_left,
        );
        let (left_plan, right_plan) =
            coordinator.plan(&matched.records, cluster_size, self.config.fetch_batch_size())?;
        timings.plan = t0.elapsed();

        let t0 = Instant::now();
        let mut gathered = gather(ctx.cluster().clone(), &left_plan, &right_plan).await?;
        timings.fetch = t0.elapsed();
        timings.remote_fetch = gathered.remote_time;

        let t0 = Instant::now();
        let columns = ResultAssembler::new(
            &self.left,
            &self.right,
            &left_view,
            &right_view,
            window,
            self.num_join_cols,
            all_left,
        )
        .assemble(
            &matched.records,
            matched.num_rows,
            self.config.batch_size(),
            &mut gathered.left,
            &mut gathered.right,
        )?;
        drop(gathered);
        timings.assemble = t0.elapsed();

        let t0 = Instant::now();
        let num_columns = columns.len();
        let chunk_sizes = self.store_columns(ctx, columns, written).await?;
        timings.store = t0.elapsed();

        merge_debug!(
            "task {}: buckets {}/{} wrote {} rows in {} batches (load {:?}, match {:?}, plan {:?}, fetch {:?}, assemble {:?}, store {:?})",
            seq,
            self.left_msb,
            right_id,
            matched.num_rows,
            chunk_sizes.len(),
            timings.load,
            timings.resolve_and_match,
            timings.plan,
            timings.fetch,
            timings.assemble,
            timings.store
        );

        Ok(MergeOutcome {
            left: self.left_msb,
            right: right_id,
            num_rows: matched.num_rows,
            chunk_sizes,
            num_columns,
            one_to_many: matched.one_to_many,
            timings,
        })
    }

    /// Compress and write every (column, batch) chunk, freeing each as it goes
    async fn store_columns(
        &self,
        ctx: &MergeContext,
        columns: Vec<PagedColumn>,
        written: &WrittenChunks,
    ) -> MergeResult<Vec<usize>> {
        let compressor = create_compressor(self.config.compression());
        let names = self.output_names();
        let mut chunk_sizes = Vec::new();
        for (col, column) in columns.into_iter().enumerate() {
            let arrays = column.into_arrays();
            if col == 0 {
                chunk_sizes = arrays.iter().map(|a| a.len()).collect();
            }
            for (batch, array) in arrays.into_iter().enumerate() {
                let data = encode_chunk(&names[col], array, compressor.as_ref())?;
                let key = ChunkKey::new(self.left_msb, self.right.id(), col, batch);
                written.record(key)?;
                ctx.store().put(key, data).await?;
            }
        }
        Ok(chunk_sizes)
    }

    fn output_names(&self) -> Vec<String> {
        let left_schema = self.left.frame().schema();
        let right_schema = self.right.frame().schema();
        left_schema
            .fields()
            .iter()
            .chain(right_schema.fields().iter().skip(self.num_join_cols))
            .map(|f| f.name().clone())
            .collect()
    }
}
