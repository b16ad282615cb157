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

//! Cluster membership and row-fetch RPC
//!
//! The merge needs two things from the cluster: its size, and a way to ask a
//! node for the values of some rows of a frame it hosts. Rows come back by
//! value, one array per column, in the order they were asked for.

pub mod local;

use std::time::Duration;

use async_trait::async_trait;

use crate::data_types::ColumnKind;
use crate::error::MergeResult;
use crate::frame::FrameKey;

pub use local::LocalCluster;

/// Index of a node in the cluster, `0..size`
pub type NodeId = usize;

/// Values of one column for the requested rows
///
/// Integer NA is [`crate::data_types::INT_NA`], numeric NA is `NaN`.
#[derive(Debug, Clone, PartialEq)]
pub enum RawColumn {
    Numeric(Vec<f64>),
    Integer(Vec<i64>),
    String(Vec<Option<String>>),
}

impl RawColumn {
    pub fn with_capacity(kind: ColumnKind, capacity: usize) -> Self {
        match kind {
            ColumnKind::Numeric => RawColumn::Numeric(Vec::with_capacity(capacity)),
            ColumnKind::Integer => RawColumn::Integer(Vec::with_capacity(capacity)),
            ColumnKind::String => RawColumn::String(Vec::with_capacity(capacity)),
        }
    }

    pub fn kind(&self) -> ColumnKind {
        match self {
            RawColumn::Numeric(_) => ColumnKind::Numeric,
            RawColumn::Integer(_) => ColumnKind::Integer,
            RawColumn::String(_) => ColumnKind::String,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            RawColumn::Numeric(v) => v.len(),
            RawColumn::Integer(v) => v.len(),
            RawColumn::String(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Response to one fetch request
#[derive(Debug, Clone, PartialEq)]
pub struct RawRows {
    pub columns: Vec<RawColumn>,
    /// Time the serving node spent gathering the values
    pub time_taken: Duration,
}

impl RawRows {
    pub fn num_rows(&self) -> usize {
        self.columns.first().map(|c| c.len()).unwrap_or(0)
    }
}

/// RPC substrate the merge runs on
#[async_trait]
pub trait Cluster: Send + Sync {
    /// Number of nodes
    fn size(&self) -> usize;

    /// Fetch global rows of a frame from the node hosting them
    async fn fetch_rows(&self, node: NodeId, frame: &FrameKey, rows: Vec<u64>)
        -> MergeResult<RawRows>;
}
