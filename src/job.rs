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

//! Merge job controller
//!
//! Enumerates the bucket pairs worth merging, runs one task per pair
//! concurrently and reads the stored chunks back as one table. A job succeeds
//! only if every task does.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use arrow::compute::concat_batches;
use arrow::datatypes::{Field, Schema, SchemaRef};
use arrow::record_batch::RecordBatch;
use tokio::task::JoinSet;

use crate::bucket::{BucketDescriptor, BucketId};
use crate::chunk::decode_chunk;
use crate::ctx::MergeContext;
use crate::error::{Code, MergeError, MergeResult};
use crate::frame::Frame;
use crate::key::KeyLayout;
use crate::sorted::Side;
use crate::store::{ChunkKey, WrittenChunks};
use crate::task::{MergeOutcome, MergeTask, MergeTimings};
use crate::util::generate_job_id;
use crate::{merge_debug, merge_error, merge_info, merge_warn};

/// One input of the join: its frame and the layout its keys were sorted with
#[derive(Debug, Clone)]
pub struct JoinSide {
    pub frame: Arc<Frame>,
    pub layout: KeyLayout,
}

impl JoinSide {
    pub fn new(frame: Arc<Frame>, layout: KeyLayout) -> Self {
        Self { frame, layout }
    }

    fn bucket(&self, id: BucketId) -> BucketDescriptor {
        BucketDescriptor::new(self.frame.clone(), id, self.layout.clone())
    }
}

/// What a whole job produced
#[derive(Debug, Clone)]
pub struct JobOutcome {
    pub job_id: String,
    /// One entry per task, in (left, right) bucket order
    pub tasks: Vec<MergeOutcome>,
    pub num_rows: u64,
    pub one_to_many: bool,
    /// Phase timings summed over tasks
    pub timings: MergeTimings,
    pub wall_time: Duration,
}

impl JobOutcome {
    /// Keys of every stored chunk, in stitching order
    pub fn chunk_keys(&self) -> Vec<ChunkKey> {
        let mut keys = Vec::new();
        for task in self.tasks.iter().filter(|t| t.num_rows > 0) {
            for batch in 0..task.num_batches() {
                for column in 0..task.num_columns {
                    keys.push(ChunkKey::new(task.left, task.right, column, batch));
                }
            }
        }
        keys
    }
}

/// A sort-merge join over two bucketed inputs
pub struct MergeJob {
    ctx: Arc<MergeContext>,
    left: JoinSide,
    right: JoinSide,
    job_id: String,
}

impl MergeJob {
    pub fn new(ctx: Arc<MergeContext>, left: JoinSide, right: JoinSide) -> MergeResult<Self> {
        if left.layout.num_fields() != right.layout.num_fields() {
            return Err(MergeError::Invalid(format!(
                "left key has {} fields, right key has {}",
                left.layout.num_fields(),
                right.layout.num_fields()
            )));
        }
        Ok(Self {
            ctx,
            left,
            right,
            job_id: generate_job_id(),
        })
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// Bucket pairs to merge, in (left, right) order
    ///
    /// Every left bucket with rows is paired with each right bucket whose
    /// extent overlaps it. Inner joins skip right buckets without rows; left
    /// outer joins keep them so the left rows still come out, and pair a left
    /// bucket that overlaps nothing with the right sentinel. Left bucket 0 is
    /// always paired with right bucket 0, where NA keys meet.
    pub async fn pairs(&self) -> MergeResult<Vec<(u8, BucketId)>> {
        let sorted = self.ctx.sorted();
        let all_left = self.ctx.config().all_left();
        let mut right_has_rows = [false; 256];
        for msb in 0..=255u8 {
            right_has_rows[msb as usize] = sorted
                .header(Side::Right, msb)
                .await?
                .map_or(false, |h| h.num_rows > 0);
        }

        let mut pairs = Vec::new();
        for left_msb in 0..=255u8 {
            let has_rows = sorted
                .header(Side::Left, left_msb)
                .await?
                .map_or(false, |h| h.num_rows > 0);
            if !has_rows {
                continue;
            }
            let left = self.left.bucket(BucketId::Msb(left_msb));
            let mut overlapped = false;
            for right_msb in 0..=255u8 {
                let right = self.right.bucket(BucketId::Msb(right_msb));
                // NA keys of both sides live in bucket 0 whatever the bases
                if !left.overlaps(&right) && (left_msb, right_msb) != (0, 0) {
                    continue;
                }
                overlapped = true;
                if right_has_rows[right_msb as usize] || all_left {
                    pairs.push((left_msb, BucketId::Msb(right_msb)));
                }
            }
            if all_left && !overlapped {
                pairs.push((left_msb, BucketId::None));
            }
        }
        Ok(pairs)
    }

    /// Run every task; the first failure aborts the rest and fails the job
    ///
    /// A failed job removes every chunk any of its tasks wrote.
    pub async fn run(&self) -> MergeResult<JobOutcome> {
        let start = Instant::now();
        let pairs = self.pairs().await?;
        merge_info!(
            "job {}: {:?} join over {} bucket pairs",
            self.job_id,
            self.ctx.config().join_type(),
            pairs.len()
        );

        let merge_tasks = pairs
            .into_iter()
            .map(|(left_msb, right_id)| {
                MergeTask::new(
                    self.left.bucket(BucketId::Msb(left_msb)),
                    self.right.bucket(right_id),
                    self.ctx.config(),
                )
            })
            .collect::<MergeResult<Vec<_>>>()?;

        let written = Arc::new(WrittenChunks::new());
        let mut set = JoinSet::new();
        for task in merge_tasks {
            let ctx = self.ctx.clone();
            let written = written.clone();
            set.spawn(async move { task.run(&ctx, &written).await });
        }

        let mut tasks = Vec::with_capacity(set.len());
        let mut failure = None;
        while let Some(joined) = set.join_next().await {
            let result = joined.map_err(|e| {
                MergeError::new(Code::ExecutionError, format!("merge task failed: {}", e))
            });
            match result.and_then(|r| r) {
                Ok(outcome) => tasks.push(outcome),
                Err(e) => {
                    merge_error!("job {}: task failed, aborting: {}", self.job_id, e);
                    set.abort_all();
                    failure = Some(e);
                    break;
                }
            }
        }
        if let Some(e) = failure {
            // aborted tasks must stop writing before their chunks are removed
            while set.join_next().await.is_some() {}
            let removed = written.rollback(self.ctx.store().as_ref()).await?;
            merge_warn!(
                "job {}: failed, removed {} chunks already written",
                self.job_id,
                removed
            );
            return Err(e);
        }
        tasks.sort_by_key(|t| (t.left, t.right));

        let mut timings = MergeTimings::default();
        for task in &tasks {
            timings.accumulate(&task.timings);
        }
        let outcome = JobOutcome {
            job_id: self.job_id.clone(),
            num_rows: tasks.iter().map(|t| t.num_rows).sum(),
            one_to_many: tasks.iter().any(|t| t.one_to_many),
            tasks,
            timings,
            wall_time: start.elapsed(),
        };
        merge_info!(
            "job {}: {} rows in {:?}",
            self.job_id,
            outcome.num_rows,
            outcome.wall_time
        );
        Ok(outcome)
    }

    /// Schema of the joined table
    ///
    /// Left columns, then right non-key columns. A right name that clashes
    /// with a left one gets the right suffix and the left column the left
    /// suffix.
    pub fn result_schema(&self) -> SchemaRef {
        let num_join_cols = self.left.layout.num_fields();
        let config = self.ctx.config();
        let mut fields: Vec<Field> = Vec::new();
        let mut column_name_index: HashMap<String, usize> = HashMap::new();

        let left_schema = self.left.frame.schema();
        for (field, kind) in left_schema.fields().iter().zip(self.left.frame.kinds()) {
            column_name_index.insert(field.name().clone(), fields.len());
            fields.push(Field::new(field.name(), kind.arrow_type(), true));
        }

        let right_schema = self.right.frame.schema();
        let right_fields = right_schema
            .fields()
            .iter()
            .zip(self.right.frame.kinds())
            .skip(num_join_cols);
        for (field, kind) in right_fields {
            let name = match column_name_index.get(field.name()) {
                Some(&idx) => {
                    let renamed = format!("{}{}", config.left_suffix(), fields[idx].name());
                    fields[idx] = Field::new(&renamed, fields[idx].data_type().clone(), true);
                    format!("{}{}", config.right_suffix(), field.name())
                }
                None => field.name().clone(),
            };
            column_name_index.insert(name.clone(), fields.len());
            fields.push(Field::new(&name, kind.arrow_type(), true));
        }
        Arc::new(Schema::new(fields))
    }

    /// Read every stored chunk back and concatenate into one batch
    ///
    /// Rows come out in (left bucket, right bucket, batch) order.
    pub async fn collect_result(&self, outcome: &JobOutcome) -> MergeResult<RecordBatch> {
        let schema = self.result_schema();
        let store = self.ctx.store();
        let mut batches = Vec::new();
        for task in outcome.tasks.iter().filter(|t| t.num_rows > 0) {
            if task.num_columns != schema.fields().len() {
                return Err(MergeError::Invariant(format!(
                    "task {}/{} wrote {} columns, result has {}",
                    task.left,
                    task.right,
                    task.num_columns,
                    schema.fields().len()
                )));
            }
            for batch in 0..task.num_batches() {
                let mut columns = Vec::with_capacity(task.num_columns);
                for column in 0..task.num_columns {
                    let key = ChunkKey::new(task.left, task.right, column, batch);
                    let chunk = decode_chunk(&store.get(&key).await?)?;
                    columns.push(chunk.column(0).clone());
                }
                batches.push(RecordBatch::try_new(schema.clone(), columns)?);
            }
        }
        merge_debug!(
            "job {}: stitching {} batches",
            self.job_id,
            batches.len()
        );
        Ok(concat_batches(&schema, &batches)?)
    }

    /// Remove every chunk the job stored
    pub async fn discard(&self, outcome: &JobOutcome) -> MergeResult<()> {
        for key in outcome.chunk_keys() {
            self.ctx.store().remove(&key).await?;
        }
        Ok(())
    }
}
