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

//! msbjoin: distributed sort-merge equi-join over MSB-bucketed keys
//!
//! Both inputs are sorted ahead of time into up to 256 buckets by the most
//! significant byte of a big-endian composite key. A join runs one merge task
//! per overlapping (left, right) bucket pair. Each task finds the left window
//! that can match, merges the two sorted key runs, fetches the payload rows
//! from the nodes that hold them and writes compressed output chunks.

pub mod assemble;
pub mod bucket;
pub mod chunk;
pub mod cluster;
pub mod compression;
pub mod config;
pub mod ctx;
pub mod data_types;
pub mod error;
pub mod fetch;
pub mod frame;
pub mod job;
pub mod key;
pub mod matcher;
pub mod paged;
pub mod presort;
pub mod range;
pub mod sorted;
pub mod store;
pub mod task;
pub mod util;

// Re-export commonly used types
pub use crate::bucket::{BucketDescriptor, BucketId};
pub use crate::cluster::{Cluster, LocalCluster};
pub use crate::config::{CompressionAlgorithm, CompressionConfig, JoinType, MergeConfig};
pub use crate::ctx::MergeContext;
pub use crate::error::{MergeError, MergeResult};
pub use crate::frame::{Frame, FrameKey};
pub use crate::job::{JobOutcome, JoinSide, MergeJob};
pub use crate::key::KeyLayout;
pub use crate::sorted::{InMemorySortedBuckets, Side, SortedBucketSource};
pub use crate::store::{ChunkKey, ChunkStore, FileSystemChunkStore, InMemoryChunkStore};
pub use crate::task::{MergeOutcome, MergeTask};

/// The main entry point and version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
