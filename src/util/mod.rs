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

//! Utility functions and helpers

pub mod logging;
pub mod uuid;

pub use self::uuid::*;

/// Number of batches needed to hold `len` items at `batch_size` per batch
pub fn num_batches(len: u64, batch_size: u64) -> u64 {
    if len == 0 {
        0
    } else {
        (len - 1) / batch_size + 1
    }
}

/// Length of batch `b` out of `nbatch` when the total is `len`
pub fn batch_len(b: u64, nbatch: u64, len: u64, batch_size: u64) -> u64 {
    if b + 1 == nbatch {
        len - (nbatch - 1) * batch_size
    } else {
        batch_size
    }
}
