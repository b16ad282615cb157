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

//! Column kinds carried through the merge
//!
//! The merge moves values in one of three physical shapes. Arrow types are
//! folded onto these when rows are fetched and unfolded when chunks are
//! written.

use arrow::datatypes::DataType as ArrowDataType;

use crate::error::{MergeError, MergeResult};

/// NA marker for integer columns
pub const INT_NA: i64 = i64::MIN;

/// Physical shape of a column in fetched rows and output chunks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnKind {
    /// 64-bit float, NA is `NaN`
    Numeric,
    /// 64-bit signed integer, NA is [`INT_NA`]
    Integer,
    /// UTF8 string, NA is `None`
    String,
}

impl ColumnKind {
    /// Map an Arrow type onto the kind used to move it
    pub fn from_arrow(data_type: &ArrowDataType) -> MergeResult<Self> {
        match data_type {
            ArrowDataType::Int8
            | ArrowDataType::Int16
            | ArrowDataType::Int32
            | ArrowDataType::Int64
            | ArrowDataType::UInt8
            | ArrowDataType::UInt16
            | ArrowDataType::UInt32
            | ArrowDataType::Date32
            | ArrowDataType::Date64
            | ArrowDataType::Timestamp(_, _)
            | ArrowDataType::Boolean => Ok(ColumnKind::Integer),
            ArrowDataType::Float16 | ArrowDataType::Float32 | ArrowDataType::Float64 => {
                Ok(ColumnKind::Numeric)
            }
            ArrowDataType::Utf8 | ArrowDataType::LargeUtf8 => Ok(ColumnKind::String),
            dt => Err(MergeError::TypeError(format!(
                "column type {:?} cannot be carried through a merge",
                dt
            ))),
        }
    }

    /// Arrow type of output chunks of this kind
    pub fn arrow_type(&self) -> ArrowDataType {
        match self {
            ColumnKind::Numeric => ArrowDataType::Float64,
            ColumnKind::Integer => ArrowDataType::Int64,
            ColumnKind::String => ArrowDataType::Utf8,
        }
    }
}
