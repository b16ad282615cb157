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

//! Row-fetch coordinator
//!
//! Turns match records into per-node lists of global rows, fetches them in
//! parallel, and hands the responses to the assembler in the order it will
//! consume them.
//!
//! Planning and assembly walk the match records in the same left-sorted
//! order and skip the same repeated signatures, so the `n`-th row planned for
//! a node is the `n`-th row the assembler asks that node for.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;

use crate::bucket::BucketDescriptor;
use crate::cluster::{Cluster, NodeId, RawRows};
use crate::error::{Code, MergeError, MergeResult};
use crate::frame::FrameKey;
use crate::matcher::{MatchRecords, RepeatTracker};
use crate::range::LeftWindow;
use crate::sorted::{Side, SortedKeyView};
use crate::{merge_debug, merge_error};

/// One request: rows of a frame, all hosted by `node`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub side: Side,
    pub node: NodeId,
    pub batch: usize,
    pub frame: FrameKey,
    pub rows: Vec<u64>,
}

/// Global rows to fetch from each node for one side, in consumption order
#[derive(Debug, Clone)]
pub struct FetchPlan {
    side: Side,
    frame: FrameKey,
    per_node: Vec<Vec<u64>>,
    batch_size: usize,
}

impl FetchPlan {
    pub fn new(side: Side, frame: FrameKey, cluster_size: usize, batch_size: usize) -> Self {
        Self {
            side,
            frame,
            per_node: vec![Vec::new(); cluster_size],
            batch_size: batch_size.max(1),
        }
    }

    /// Ask `node` for a global row, after the rows already planned for it
    pub fn push(&mut self, node: NodeId, row: u64) -> MergeResult<()> {
        let cluster_size = self.per_node.len();
        self.per_node
            .get_mut(node)
            .ok_or_else(|| {
                MergeError::IndexError(format!(
                    "node {} outside cluster of {}",
                    node, cluster_size
                ))
            })?
            .push(row);
        Ok(())
    }

    pub fn side(&self) -> Side {
        self.side
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Rows planned per node
    pub fn per_node_counts(&self) -> Vec<u64> {
        self.per_node.iter().map(|r| r.len() as u64).collect()
    }

    pub fn total_rows(&self) -> u64 {
        self.per_node.iter().map(|r| r.len() as u64).sum()
    }

    /// The plan must ask each node for exactly what the engine counted
    pub fn verify(&self, expected: &[u64]) -> MergeResult<()> {
        let planned = self.per_node_counts();
        if planned != expected {
            return Err(MergeError::Invariant(format!(
                "{} fetch plan has per-node rows {:?}, engine counted {:?}",
                self.side, planned, expected
            )));
        }
        Ok(())
    }

    /// Cut each node's rows into requests of at most `batch_size` rows
    pub fn requests(&self) -> Vec<FetchRequest> {
        let mut requests = Vec::new();
        for (node, rows) in self.per_node.iter().enumerate() {
            for (batch, slice) in rows.chunks(self.batch_size).enumerate() {
                requests.push(FetchRequest {
                    side: self.side,
                    node,
                    batch,
                    frame: self.frame.clone(),
                    rows: slice.to_vec(),
                });
            }
        }
        requests
    }

    fn num_batches(&self, node: NodeId) -> usize {
        self.per_node[node].len().div_ceil(self.batch_size)
    }
}

/// Responses of one side, consumed row by row per node
///
/// A batch is dropped as soon as the cursor of its node moves past it.
#[derive(Debug)]
pub struct FetchedRows {
    batches: Vec<Vec<Option<RawRows>>>,
    cursors: Vec<u64>,
    batch_size: usize,
}

impl FetchedRows {
    fn new(plan: &FetchPlan) -> Self {
        let batches = (0..plan.per_node.len())
            .map(|node| vec![None; plan.num_batches(node)])
            .collect();
        Self {
            batches,
            cursors: vec![0; plan.per_node.len()],
            batch_size: plan.batch_size,
        }
    }

    fn insert(&mut self, node: NodeId, batch: usize, rows: RawRows) {
        self.batches[node][batch] = Some(rows);
    }

    /// Next unread row from `node`: its response and offset within it
    pub fn next(&mut self, node: NodeId) -> MergeResult<(&RawRows, usize)> {
        let cursor = self.cursors.get_mut(node).ok_or_else(|| {
            MergeError::IndexError(format!("no fetched rows for node {}", node))
        })?;
        let pnl = *cursor;
        *cursor += 1;
        let batch = (pnl / self.batch_size as u64) as usize;
        let offset = (pnl % self.batch_size as u64) as usize;
        let node_batches = &mut self.batches[node];
        if offset == 0 && batch > 0 {
            if let Some(done) = node_batches.get_mut(batch - 1) {
                *done = None;
            }
        }
        match node_batches.get(batch) {
            Some(Some(rows)) => Ok((rows, offset)),
            _ => Err(MergeError::Invariant(format!(
                "row {} from node {} was not fetched",
                pnl, node
            ))),
        }
    }

    /// Batches still held
    pub fn num_held(&self) -> usize {
        self.batches
            .iter()
            .map(|b| b.iter().filter(|r| r.is_some()).count())
            .sum()
    }
}

/// Fetched rows of both sides plus the summed remote time
#[derive(Debug)]
pub struct Gathered {
    pub left: FetchedRows,
    pub right: FetchedRows,
    pub remote_time: Duration,
}

/// Plans and runs the fetches of one merge task
pub struct RowFetchCoordinator<'a> {
    left: &'a BucketDescriptor,
    right: &'a BucketDescriptor,
    left_view: &'a SortedKeyView,
    right_view: &'a SortedKeyView,
    window: LeftWindow,
    all_left: bool,
}

impl<'a> RowFetchCoordinator<'a> {
    pub fn new(
        left: &'a BucketDescriptor,
        right: &'a BucketDescriptor,
        left_view: &'a SortedKeyView,
        right_view: &'a SortedKeyView,
        window: LeftWindow,
        all_left: bool,
    ) -> Self {
        Self {
            left,
            right,
            left_view,
            right_view,
            window,
            all_left,
        }
    }

    /// Build and verify the left and right plans
    pub fn plan(
        &self,
        records: &MatchRecords,
        cluster_size: usize,
        fetch_batch_size: usize,
    ) -> MergeResult<(FetchPlan, FetchPlan)> {
        let mut left_plan = FetchPlan::new(
            Side::Left,
            self.left.frame().key().clone(),
            cluster_size,
            fetch_batch_size,
        );
        let mut right_plan = FetchPlan::new(
            Side::Right,
            self.right.frame().key().clone(),
            cluster_size,
            fetch_batch_size,
        );

        let mut tracker = RepeatTracker::new();
        let first_rank = self.window.first() as u64;
        for (loc, (first, len)) in records.iter().enumerate() {
            let repeat = tracker.is_repeat(first, len);
            if first == 0 && !self.all_left {
                continue;
            }
            let row = self.left_view.order_at(first_rank + loc as u64);
            left_plan.push(self.left.owner_of_row(row)?, row)?;
            if first == 0 || repeat {
                continue;
            }
            for r in 0..len {
                let row = self.right_view.order_at(first + r - 1);
                right_plan.push(self.right.owner_of_row(row)?, row)?;
            }
        }

        left_plan.verify(self.left_view.per_node_rows_to_fetch())?;
        // right rows of repeated signatures are counted by the engine once per
        // run, and the plan skips exactly those repeats
        right_plan.verify(self.right_view.per_node_rows_to_fetch())?;
        Ok((left_plan, right_plan))
    }
}

/// Issue every request of both plans at once and wait for all of them
///
/// The first failure aborts the requests still in flight and fails the task.
pub async fn gather(
    cluster: Arc<dyn Cluster>,
    left_plan: &FetchPlan,
    right_plan: &FetchPlan,
) -> MergeResult<Gathered> {
    let mut left = FetchedRows::new(left_plan);
    let mut right = FetchedRows::new(right_plan);

    let mut set = JoinSet::new();
    for request in left_plan.requests().into_iter().chain(right_plan.requests()) {
        let cluster = cluster.clone();
        set.spawn(async move {
            let expected = request.rows.len();
            let result = cluster
                .fetch_rows(request.node, &request.frame, request.rows)
                .await;
            (request.side, request.node, request.batch, expected, result)
        });
    }
    merge_debug!("issued {} fetch requests", set.len());

    let mut remote_time = Duration::ZERO;
    while let Some(joined) = set.join_next().await {
        let (side, node, batch, expected, result) = joined.map_err(|e| {
            MergeError::new(Code::ExecutionError, format!("fetch task failed: {}", e))
        })?;
        let rows = match result {
            Ok(rows) => rows,
            Err(e) => {
                merge_error!("{} fetch of batch {} from node {} failed: {}", side, batch, node, e);
                set.abort_all();
                return Err(match e {
                    MergeError::RemoteFetch { .. } => e,
                    other => MergeError::RemoteFetch {
                        node,
                        message: other.to_string(),
                    },
                });
            }
        };
        if rows.num_rows() != expected || rows.columns.iter().any(|c| c.len() != expected) {
            set.abort_all();
            return Err(MergeError::Invariant(format!(
                "node {} answered {} rows for a {}-row {} request",
                node,
                rows.num_rows(),
                expected,
                side
            )));
        }
        remote_time += rows.time_taken;
        match side {
            Side::Left => left.insert(node, batch, rows),
            Side::Right => right.insert(node, batch, rows),
        }
    }

    Ok(Gathered {
        left,
        right,
        remote_time,
    })
}
