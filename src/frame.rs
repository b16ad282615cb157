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

//! Distributed table handle
//!
//! A frame is a table whose rows are split into contiguous chunks, each chunk
//! living on one cluster node. The handle carries only layout: which global
//! rows each chunk holds and where it lives. Values stay on the nodes and are
//! reached through [`crate::cluster::Cluster::fetch_rows`].

use std::fmt;

use arrow::datatypes::SchemaRef;

use crate::data_types::ColumnKind;
use crate::error::{MergeError, MergeResult};

/// Name of a frame known to the cluster
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FrameKey(String);

impl FrameKey {
    pub fn new(name: impl Into<String>) -> Self {
        FrameKey(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FrameKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Layout of a chunked table
#[derive(Debug, Clone)]
pub struct Frame {
    key: FrameKey,
    schema: SchemaRef,
    kinds: Vec<ColumnKind>,
    /// Element start per chunk, with the total row count appended
    espc: Vec<u64>,
    chunk_node: Vec<usize>,
}

impl Frame {
    /// Build a frame from per-chunk row counts and the node each chunk lives on
    pub fn new(
        key: FrameKey,
        schema: SchemaRef,
        chunk_lens: &[u64],
        chunk_node: Vec<usize>,
    ) -> MergeResult<Self> {
        if chunk_lens.len() != chunk_node.len() {
            return Err(MergeError::Invalid(format!(
                "frame {}: {} chunk lengths but {} chunk homes",
                key,
                chunk_lens.len(),
                chunk_node.len()
            )));
        }
        let kinds = schema
            .fields()
            .iter()
            .map(|f| ColumnKind::from_arrow(f.data_type()))
            .collect::<MergeResult<Vec<_>>>()?;
        let mut espc = Vec::with_capacity(chunk_lens.len() + 1);
        let mut start = 0u64;
        espc.push(start);
        for len in chunk_lens {
            start += len;
            espc.push(start);
        }
        Ok(Self {
            key,
            schema,
            kinds,
            espc,
            chunk_node,
        })
    }

    pub fn key(&self) -> &FrameKey {
        &self.key
    }

    pub fn schema(&self) -> SchemaRef {
        self.schema.clone()
    }

    pub fn num_columns(&self) -> usize {
        self.schema.fields().len()
    }

    pub fn kinds(&self) -> &[ColumnKind] {
        &self.kinds
    }

    pub fn num_rows(&self) -> u64 {
        self.espc.last().copied().unwrap_or(0)
    }

    pub fn num_chunks(&self) -> usize {
        self.chunk_node.len()
    }

    pub fn espc(&self) -> &[u64] {
        &self.espc
    }

    pub fn chunk_node(&self) -> &[usize] {
        &self.chunk_node
    }

    /// Index of the chunk holding a global row
    pub fn elem2chunk_idx(&self, row: u64) -> MergeResult<usize> {
        if row >= self.num_rows() {
            return Err(MergeError::IndexError(format!(
                "row {} outside frame {} of {} rows",
                row,
                self.key,
                self.num_rows()
            )));
        }
        // last chunk start <= row; empty chunks share a start with their successor
        Ok(self.espc.partition_point(|start| *start <= row) - 1)
    }

    /// Offset of a global row inside its chunk
    pub fn chunk_offset(&self, chunk: usize, row: u64) -> usize {
        (row - self.espc[chunk]) as usize
    }

    /// Node owning the chunk that holds a global row
    pub fn owner_of_row(&self, row: u64) -> MergeResult<usize> {
        Ok(self.chunk_node[self.elem2chunk_idx(row)?])
    }
}
