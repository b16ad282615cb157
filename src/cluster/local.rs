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

//! In-process cluster
//!
//! Hosts frame chunks on simulated nodes inside one process. Fetches are
//! served by value, exactly as a remote node would, and only for rows whose
//! chunk the addressed node hosts. Nodes can be marked down to make their
//! fetches fail.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use arrow::array::{Array, ArrayRef, Float64Array, Int64Array, StringArray};
use arrow::compute::cast;
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{Cluster, NodeId, RawColumn, RawRows};
use crate::data_types::{ColumnKind, INT_NA};
use crate::error::{MergeError, MergeResult};
use crate::frame::{Frame, FrameKey};
use crate::merge_debug;

struct HostedFrame {
    frame: Arc<Frame>,
    /// Per chunk, per column, cast to the column's kind
    chunks: Vec<Vec<ArrayRef>>,
}

/// A cluster of `size` nodes living in this process
pub struct LocalCluster {
    size: usize,
    frames: RwLock<HashMap<FrameKey, HostedFrame>>,
    down: RwLock<HashSet<NodeId>>,
}

impl LocalCluster {
    pub fn new(size: usize) -> MergeResult<Self> {
        if size == 0 {
            return Err(MergeError::Invalid(
                "a cluster needs at least one node".to_string(),
            ));
        }
        Ok(Self {
            size,
            frames: RwLock::new(HashMap::new()),
            down: RwLock::new(HashSet::new()),
        })
    }

    /// Host a frame whose chunk `i` lives on `placement[i]`
    pub async fn register_frame(
        &self,
        key: FrameKey,
        chunks: Vec<RecordBatch>,
        placement: Vec<NodeId>,
    ) -> MergeResult<Arc<Frame>> {
        let schema = chunks
            .first()
            .map(|c| c.schema())
            .ok_or_else(|| MergeError::Invalid(format!("frame {} has no chunks", key)))?;
        if let Some(node) = placement.iter().find(|n| **n >= self.size) {
            return Err(MergeError::Invalid(format!(
                "chunk placed on node {} of a {}-node cluster",
                node, self.size
            )));
        }
        if chunks.iter().any(|c| c.schema() != schema) {
            return Err(MergeError::Invalid(format!(
                "chunks of frame {} differ in schema",
                key
            )));
        }
        let lens: Vec<u64> = chunks.iter().map(|c| c.num_rows() as u64).collect();
        let frame = Arc::new(Frame::new(key.clone(), schema, &lens, placement)?);

        let mut hosted = Vec::with_capacity(chunks.len());
        for chunk in &chunks {
            let columns = chunk
                .columns()
                .iter()
                .zip(frame.kinds())
                .map(|(col, kind)| Ok(cast(col, &kind.arrow_type())?))
                .collect::<MergeResult<Vec<_>>>()?;
            hosted.push(columns);
        }

        merge_debug!(
            "hosting frame {}: {} rows in {} chunks",
            key,
            frame.num_rows(),
            frame.num_chunks()
        );
        self.frames.write().await.insert(
            key,
            HostedFrame {
                frame: frame.clone(),
                chunks: hosted,
            },
        );
        Ok(frame)
    }

    /// Split a batch into chunks of `chunk_rows` placed round robin
    pub async fn register_round_robin(
        &self,
        key: FrameKey,
        batch: &RecordBatch,
        chunk_rows: usize,
    ) -> MergeResult<Arc<Frame>> {
        let chunk_rows = chunk_rows.max(1);
        let mut chunks = Vec::new();
        let mut offset = 0;
        while offset < batch.num_rows() {
            let len = chunk_rows.min(batch.num_rows() - offset);
            chunks.push(batch.slice(offset, len));
            offset += len;
        }
        if chunks.is_empty() {
            chunks.push(batch.slice(0, 0));
        }
        let placement = (0..chunks.len()).map(|i| i % self.size).collect();
        self.register_frame(key, chunks, placement).await
    }

    pub async fn frame(&self, key: &FrameKey) -> Option<Arc<Frame>> {
        self.frames.read().await.get(key).map(|h| h.frame.clone())
    }

    /// Make fetches from `node` fail, or succeed again
    pub async fn set_node_down(&self, node: NodeId, down: bool) {
        let mut set = self.down.write().await;
        if down {
            set.insert(node);
        } else {
            set.remove(&node);
        }
    }
}

#[async_trait]
impl Cluster for LocalCluster {
    fn size(&self) -> usize {
        self.size
    }

    async fn fetch_rows(
        &self,
        node: NodeId,
        frame: &FrameKey,
        rows: Vec<u64>,
    ) -> MergeResult<RawRows> {
        if self.down.read().await.contains(&node) {
            return Err(MergeError::RemoteFetch {
                node,
                message: "node is down".to_string(),
            });
        }
        let frames = self.frames.read().await;
        let hosted = frames
            .get(frame)
            .ok_or_else(|| MergeError::KeyError(format!("frame {} is not hosted", frame)))?;
        let start = Instant::now();

        let mut locations = Vec::with_capacity(rows.len());
        for row in &rows {
            let chunk = hosted.frame.elem2chunk_idx(*row)?;
            if hosted.frame.chunk_node()[chunk] != node {
                return Err(MergeError::RemoteFetch {
                    node,
                    message: format!(
                        "row {} of frame {} lives on node {}",
                        row,
                        frame,
                        hosted.frame.chunk_node()[chunk]
                    ),
                });
            }
            locations.push((chunk, hosted.frame.chunk_offset(chunk, *row)));
        }

        let mut columns = Vec::with_capacity(hosted.frame.num_columns());
        for (c, kind) in hosted.frame.kinds().iter().enumerate() {
            let mut out = RawColumn::with_capacity(*kind, rows.len());
            for (chunk, offset) in &locations {
                push_value(&mut out, &hosted.chunks[*chunk][c], *offset)?;
            }
            columns.push(out);
        }

        Ok(RawRows {
            columns,
            time_taken: start.elapsed(),
        })
    }
}

fn push_value(out: &mut RawColumn, array: &ArrayRef, offset: usize) -> MergeResult<()> {
    match out {
        RawColumn::Integer(values) => {
            let ints = downcast::<Int64Array>(array, ColumnKind::Integer)?;
            values.push(if ints.is_null(offset) {
                INT_NA
            } else {
                ints.value(offset)
            });
        }
        RawColumn::Numeric(values) => {
            let floats = downcast::<Float64Array>(array, ColumnKind::Numeric)?;
            values.push(if floats.is_null(offset) {
                f64::NAN
            } else {
                floats.value(offset)
            });
        }
        RawColumn::String(values) => {
            let strings = downcast::<StringArray>(array, ColumnKind::String)?;
            values.push(if strings.is_null(offset) {
                None
            } else {
                Some(strings.value(offset).to_string())
            });
        }
    }
    Ok(())
}

fn downcast<T: 'static>(array: &ArrayRef, kind: ColumnKind) -> MergeResult<&T> {
    array.as_any().downcast_ref::<T>().ok_or_else(|| {
        MergeError::TypeError(format!(
            "hosted column of type {:?} is not {:?}",
            array.data_type(),
            kind
        ))
    })
}
