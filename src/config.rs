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

//! Merge configuration

use serde::{Deserialize, Serialize};

use crate::error::{MergeError, MergeResult};

/// Rows per batch shared by the sort stage, match records and output chunks
pub const DEFAULT_BATCH_SIZE: usize = 1_048_576;

/// Type of join operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JoinType {
    Inner,
    Left,
    Right,
    FullOuter,
}

impl JoinType {
    /// Every left row appears at least once in the output
    pub fn all_left(&self) -> bool {
        matches!(self, JoinType::Left | JoinType::FullOuter)
    }

    /// Every right row appears at least once in the output
    pub fn all_right(&self) -> bool {
        matches!(self, JoinType::Right | JoinType::FullOuter)
    }
}

/// Supported compression algorithms for output chunks
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompressionAlgorithm {
    /// No compression
    None,
    /// LZ4 (fast)
    Lz4,
    /// Zstandard (good compression ratio)
    Zstd,
    /// Snappy (fast, moderate compression)
    Snappy,
}

/// Compression configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompressionConfig {
    /// Compression algorithm
    pub algorithm: CompressionAlgorithm,
    /// Compression level (algorithm-specific)
    #[serde(default)]
    pub level: Option<i32>,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            algorithm: CompressionAlgorithm::Lz4,
            level: None,
        }
    }
}

impl CompressionConfig {
    pub fn new(algorithm: CompressionAlgorithm) -> Self {
        Self {
            algorithm,
            level: None,
        }
    }

    pub fn with_level(mut self, level: i32) -> Self {
        self.level = Some(level);
        self
    }
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

fn default_left_suffix() -> String {
    "l_".to_string()
}

fn default_right_suffix() -> String {
    "r_".to_string()
}

/// Configuration for one merge job and all of its bucket-pair tasks
///
/// Construction always validates: right and full outer joins are rejected
/// here, before any task is scheduled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeConfig {
    join_type: JoinType,
    #[serde(default = "default_batch_size")]
    batch_size: usize,
    #[serde(default = "default_batch_size")]
    fetch_batch_size: usize,
    #[serde(default)]
    compression: CompressionConfig,
    #[serde(default = "default_left_suffix")]
    left_suffix: String,
    #[serde(default = "default_right_suffix")]
    right_suffix: String,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            join_type: JoinType::Inner,
            batch_size: DEFAULT_BATCH_SIZE,
            fetch_batch_size: DEFAULT_BATCH_SIZE,
            compression: CompressionConfig::default(),
            left_suffix: default_left_suffix(),
            right_suffix: default_right_suffix(),
        }
    }
}

impl MergeConfig {
    /// Create a validated configuration for the given join type
    pub fn new(join_type: JoinType) -> MergeResult<Self> {
        let config = Self {
            join_type,
            ..Default::default()
        };
        config.validate()?;
        Ok(config)
    }

    /// Inner join with default batch sizes
    pub fn inner() -> Self {
        Self::default()
    }

    /// Left outer join with default batch sizes
    pub fn left_outer() -> Self {
        Self {
            join_type: JoinType::Left,
            ..Default::default()
        }
    }

    /// Parse and validate a JSON configuration
    pub fn from_json(json: &str) -> MergeResult<Self> {
        let config: MergeConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to JSON
    pub fn to_json(&self) -> MergeResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Reject configurations the merge cannot honour
    pub fn validate(&self) -> MergeResult<()> {
        if self.join_type.all_right() {
            return Err(MergeError::NotImplemented(format!(
                "{:?} join keeps unmatched right rows, which the bucket merge does not produce",
                self.join_type
            )));
        }
        if self.batch_size == 0 {
            return Err(MergeError::Invalid("batch size must be positive".to_string()));
        }
        if self.fetch_batch_size == 0 {
            return Err(MergeError::Invalid(
                "fetch batch size must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Set the join type
    pub fn with_join_type(mut self, join_type: JoinType) -> MergeResult<Self> {
        self.join_type = join_type;
        self.validate()?;
        Ok(self)
    }

    /// Set the number of rows per output chunk and per match-record batch
    pub fn with_batch_size(mut self, batch_size: usize) -> MergeResult<Self> {
        self.batch_size = batch_size;
        self.validate()?;
        Ok(self)
    }

    /// Set the maximum number of rows per remote fetch request
    pub fn with_fetch_batch_size(mut self, fetch_batch_size: usize) -> MergeResult<Self> {
        self.fetch_batch_size = fetch_batch_size;
        self.validate()?;
        Ok(self)
    }

    /// Set the output chunk compression
    pub fn with_compression(mut self, compression: CompressionConfig) -> Self {
        self.compression = compression;
        self
    }

    /// Set prefixes applied to clashing column names in the stitched result
    pub fn with_suffixes(mut self, left_suffix: String, right_suffix: String) -> Self {
        self.left_suffix = left_suffix;
        self.right_suffix = right_suffix;
        self
    }

    pub fn join_type(&self) -> JoinType {
        self.join_type
    }

    pub fn all_left(&self) -> bool {
        self.join_type.all_left()
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn fetch_batch_size(&self) -> usize {
        self.fetch_batch_size
    }

    pub fn compression(&self) -> &CompressionConfig {
        &self.compression
    }

    pub fn left_suffix(&self) -> &str {
        &self.left_suffix
    }

    pub fn right_suffix(&self) -> &str {
        &self.right_suffix
    }
}
