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

//! Output chunk encoding
//!
//! A chunk is one column of one output batch: a single-column Arrow record
//! batch in IPC stream format, compressed and tagged.

use std::io::Cursor;
use std::sync::Arc;

use arrow::array::ArrayRef;
use arrow::datatypes::{Field, Schema};
use arrow::ipc::reader::StreamReader;
use arrow::ipc::writer::StreamWriter;
use arrow::record_batch::RecordBatch;

use crate::compression::{compress_tagged, decompress_tagged, Compressor};
use crate::error::{MergeError, MergeResult};

/// Serialize and compress one output column batch
pub fn encode_chunk(name: &str, array: ArrayRef, compressor: &dyn Compressor) -> MergeResult<Vec<u8>> {
    let schema = Arc::new(Schema::new(vec![Field::new(
        name,
        array.data_type().clone(),
        true,
    )]));
    let batch = RecordBatch::try_new(schema.clone(), vec![array])?;

    let mut buffer = Vec::new();
    {
        let mut writer = StreamWriter::try_new(&mut buffer, &schema)?;
        writer.write(&batch)?;
        writer.finish()?;
    }
    compress_tagged(compressor, &buffer)
}

/// Decompress and read back one output column batch
pub fn decode_chunk(data: &[u8]) -> MergeResult<RecordBatch> {
    let bytes = decompress_tagged(data)?;
    let mut reader = StreamReader::try_new(Cursor::new(bytes), None)?;
    match reader.next() {
        Some(batch) => Ok(batch?),
        None => Err(MergeError::Invalid(
            "chunk payload holds no record batch".to_string(),
        )),
    }
}
