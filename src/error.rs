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

//! Error handling for merge operations

use std::fmt;

use crate::sorted::Side;

/// Status codes reported back to the job controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Code {
    Ok = 0,
    KeyError = 2,
    TypeError = 3,
    Invalid = 4,
    IoError = 5,
    IndexError = 7,
    NotImplemented = 10,
    SerializationError = 11,
    CompressionError = 12,
    NotFound = 13,
    MissingPartition = 20,
    KeyOverflow = 21,
    RemoteFetchFailure = 22,
    InvariantViolation = 23,
    ExecutionError = 42,
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Code::Ok => write!(f, "OK"),
            Code::KeyError => write!(f, "Key error"),
            Code::TypeError => write!(f, "Type error"),
            Code::Invalid => write!(f, "Invalid"),
            Code::IoError => write!(f, "IO error"),
            Code::IndexError => write!(f, "Index error"),
            Code::NotImplemented => write!(f, "Not implemented"),
            Code::SerializationError => write!(f, "Serialization error"),
            Code::CompressionError => write!(f, "Compression error"),
            Code::NotFound => write!(f, "Not found"),
            Code::MissingPartition => write!(f, "Missing partition"),
            Code::KeyOverflow => write!(f, "Key normalization overflow"),
            Code::RemoteFetchFailure => write!(f, "Remote fetch failure"),
            Code::InvariantViolation => write!(f, "Invariant violation"),
            Code::ExecutionError => write!(f, "Execution error"),
        }
    }
}

/// Main error type for merge operations
#[derive(thiserror::Error, Debug)]
pub enum MergeError {
    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid operation: {0}")]
    Invalid(String),

    #[error("Not implemented: {0}")]
    NotImplemented(String),

    #[error("Index out of bounds: {0}")]
    IndexError(String),

    #[error("Type error: {0}")]
    TypeError(String),

    #[error("Key not found: {0}")]
    KeyError(String),

    #[error("Compression error: {0}")]
    Compression(String),

    #[error("No sorted partition for {side} MSB {msb}")]
    MissingPartition { side: Side, msb: i32 },

    #[error("Key field {field} overflows on normalization: raw {raw} with base {base}")]
    KeyOverflow { field: usize, raw: u64, base: i64 },

    #[error("Fetch from node {node} failed: {message}")]
    RemoteFetch { node: usize, message: String },

    #[error("Invariant violated: {0}")]
    Invariant(String),

    #[error("Generic error with code {code}: {message}")]
    Generic { code: Code, message: String },
}

impl MergeError {
    /// Create a new error with a specific code and message
    pub fn new(code: Code, message: impl Into<String>) -> Self {
        MergeError::Generic {
            code,
            message: message.into(),
        }
    }

    /// Get the error code
    pub fn code(&self) -> Code {
        match self {
            MergeError::Arrow(_) => Code::Invalid,
            MergeError::Io(_) => Code::IoError,
            MergeError::Serialization(_) => Code::SerializationError,
            MergeError::Invalid(_) => Code::Invalid,
            MergeError::NotImplemented(_) => Code::NotImplemented,
            MergeError::IndexError(_) => Code::IndexError,
            MergeError::TypeError(_) => Code::TypeError,
            MergeError::KeyError(_) => Code::KeyError,
            MergeError::Compression(_) => Code::CompressionError,
            MergeError::MissingPartition { .. } => Code::MissingPartition,
            MergeError::KeyOverflow { .. } => Code::KeyOverflow,
            MergeError::RemoteFetch { .. } => Code::RemoteFetchFailure,
            MergeError::Invariant(_) => Code::InvariantViolation,
            MergeError::Generic { code, .. } => *code,
        }
    }
}

/// Type alias for Results using MergeError
pub type MergeResult<T> = Result<T, MergeError>;

/// Outcome summary handed to the job controller
#[derive(Debug, Clone)]
pub struct Status {
    code: Code,
    message: String,
}

impl Status {
    pub fn new(code: Code, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn ok() -> Self {
        Self {
            code: Code::Ok,
            message: String::new(),
        }
    }

    pub fn get_code(&self) -> Code {
        self.code
    }

    pub fn get_msg(&self) -> &str {
        &self.message
    }

    pub fn is_ok(&self) -> bool {
        self.code == Code::Ok
    }
}

impl From<MergeError> for Status {
    fn from(error: MergeError) -> Self {
        Self {
            code: error.code(),
            message: error.to_string(),
        }
    }
}

impl<T> From<&MergeResult<T>> for Status {
    fn from(result: &MergeResult<T>) -> Self {
        match result {
            Ok(_) => Status::ok(),
            Err(e) => Status::new(e.code(), e.to_string()),
        }
    }
}
