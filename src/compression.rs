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

//! Compression of output chunk payloads
//!
//! Every compressed payload starts with a one-byte tag naming the algorithm,
//! so a chunk can be read back without knowing how the job was configured.

use std::io::{Read, Write};

use crate::config::{CompressionAlgorithm, CompressionConfig};
use crate::error::{MergeError, MergeResult};

impl CompressionAlgorithm {
    /// Tag byte written in front of a payload
    pub fn tag(&self) -> u8 {
        match self {
            CompressionAlgorithm::None => 0,
            CompressionAlgorithm::Lz4 => 1,
            CompressionAlgorithm::Zstd => 2,
            CompressionAlgorithm::Snappy => 3,
        }
    }

    pub fn from_tag(tag: u8) -> MergeResult<Self> {
        match tag {
            0 => Ok(CompressionAlgorithm::None),
            1 => Ok(CompressionAlgorithm::Lz4),
            2 => Ok(CompressionAlgorithm::Zstd),
            3 => Ok(CompressionAlgorithm::Snappy),
            t => Err(MergeError::Compression(format!(
                "unknown compression tag {}",
                t
            ))),
        }
    }
}

/// A block compressor
pub trait Compressor: Send + Sync {
    fn compress(&self, data: &[u8]) -> MergeResult<Vec<u8>>;

    fn decompress(&self, data: &[u8]) -> MergeResult<Vec<u8>>;

    fn algorithm(&self) -> CompressionAlgorithm;
}

/// Passes data through unchanged
pub struct NoCompressor;

impl Compressor for NoCompressor {
    fn compress(&self, data: &[u8]) -> MergeResult<Vec<u8>> {
        Ok(data.to_vec())
    }

    fn decompress(&self, data: &[u8]) -> MergeResult<Vec<u8>> {
        Ok(data.to_vec())
    }

    fn algorithm(&self) -> CompressionAlgorithm {
        CompressionAlgorithm::None
    }
}

/// LZ4 block compression with the uncompressed size prepended
pub struct Lz4Compressor;

impl Compressor for Lz4Compressor {
    fn compress(&self, data: &[u8]) -> MergeResult<Vec<u8>> {
        Ok(lz4_flex::compress_prepend_size(data))
    }

    fn decompress(&self, data: &[u8]) -> MergeResult<Vec<u8>> {
        lz4_flex::decompress_size_prepended(data)
            .map_err(|e| MergeError::Compression(format!("LZ4 decompression failed: {}", e)))
    }

    fn algorithm(&self) -> CompressionAlgorithm {
        CompressionAlgorithm::Lz4
    }
}

/// Zstandard, level 1-22
pub struct ZstdCompressor {
    level: i32,
}

impl ZstdCompressor {
    pub fn new() -> Self {
        Self { level: 3 }
    }

    pub fn with_level(level: i32) -> Self {
        Self {
            level: level.clamp(1, 22),
        }
    }
}

impl Default for ZstdCompressor {
    fn default() -> Self {
        Self::new()
    }
}

impl Compressor for ZstdCompressor {
    fn compress(&self, data: &[u8]) -> MergeResult<Vec<u8>> {
        zstd::encode_all(data, self.level)
            .map_err(|e| MergeError::Compression(format!("Zstd compression failed: {}", e)))
    }

    fn decompress(&self, data: &[u8]) -> MergeResult<Vec<u8>> {
        zstd::decode_all(data)
            .map_err(|e| MergeError::Compression(format!("Zstd decompression failed: {}", e)))
    }

    fn algorithm(&self) -> CompressionAlgorithm {
        CompressionAlgorithm::Zstd
    }
}

/// Snappy frame format
pub struct SnappyCompressor;

impl Compressor for SnappyCompressor {
    fn compress(&self, data: &[u8]) -> MergeResult<Vec<u8>> {
        let mut encoder = snap::write::FrameEncoder::new(Vec::new());
        encoder
            .write_all(data)
            .map_err(|e| MergeError::Compression(format!("Snappy compression failed: {}", e)))?;
        encoder.into_inner().map_err(|e| {
            MergeError::Compression(format!("Snappy compression finalize failed: {}", e))
        })
    }

    fn decompress(&self, data: &[u8]) -> MergeResult<Vec<u8>> {
        let mut decoder = snap::read::FrameDecoder::new(data);
        let mut output = Vec::new();
        decoder
            .read_to_end(&mut output)
            .map_err(|e| MergeError::Compression(format!("Snappy decompression failed: {}", e)))?;
        Ok(output)
    }

    fn algorithm(&self) -> CompressionAlgorithm {
        CompressionAlgorithm::Snappy
    }
}

/// Create a compressor from configuration
pub fn create_compressor(config: &CompressionConfig) -> Box<dyn Compressor> {
    match config.algorithm {
        CompressionAlgorithm::None => Box::new(NoCompressor),
        CompressionAlgorithm::Lz4 => Box::new(Lz4Compressor),
        CompressionAlgorithm::Zstd => match config.level {
            Some(level) => Box::new(ZstdCompressor::with_level(level)),
            None => Box::new(ZstdCompressor::new()),
        },
        CompressionAlgorithm::Snappy => Box::new(SnappyCompressor),
    }
}

/// Compress and prefix the algorithm tag
pub fn compress_tagged(compressor: &dyn Compressor, data: &[u8]) -> MergeResult<Vec<u8>> {
    let body = compressor.compress(data)?;
    let mut out = Vec::with_capacity(body.len() + 1);
    out.push(compressor.algorithm().tag());
    out.extend_from_slice(&body);
    Ok(out)
}

/// Read the tag and decompress with the matching algorithm
pub fn decompress_tagged(data: &[u8]) -> MergeResult<Vec<u8>> {
    let (tag, body) = data
        .split_first()
        .ok_or_else(|| MergeError::Compression("empty compressed payload".to_string()))?;
    let algorithm = CompressionAlgorithm::from_tag(*tag)?;
    create_compressor(&CompressionConfig::new(algorithm)).decompress(body)
}
