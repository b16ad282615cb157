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

//! Range resolver
//!
//! Narrows a left bucket to the sorted ranks whose first key field falls
//! inside the right bucket's extent. Only the keys actually present matter;
//! the extents are used as search targets.

use crate::bucket::{BucketDescriptor, BucketId};
use crate::error::{MergeError, MergeResult};
use crate::key::{normalize, read_field};
use crate::sorted::SortedKeyView;

/// Exclusive window of left ranks, one outside each extreme
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeftWindow {
    pub from: i64,
    pub to: i64,
}

impl LeftWindow {
    /// Number of left ranks strictly inside the window
    pub fn size(&self) -> u64 {
        (self.to - self.from - 1).max(0) as u64
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// First rank inside the window
    pub fn first(&self) -> i64 {
        self.from + 1
    }
}

/// Resolve the left window for one bucket pair
///
/// Right bucket 0 takes every left key below its extent. NA keys sort below
/// everything and only meet right NA keys there, so inner and left outer
/// joins see them alike. With `all_left`, right bucket 255 also takes the
/// keys above its extent, since no other right bucket would produce NA rows
/// for them. The right sentinel takes the whole left bucket.
///
/// Left bucket 0 may hold NA keys, which must only fall in the window of
/// right bucket 0, so its lower bound is always searched for.
pub fn resolve(
    left: &BucketDescriptor,
    left_view: &SortedKeyView,
    right: &BucketDescriptor,
    all_left: bool,
) -> MergeResult<LeftWindow> {
    let n = left_view.num_rows() as i64;
    let right_msb = match right.id() {
        BucketId::None => return Ok(LeftWindow { from: -1, to: n }),
        BucketId::Msb(m) => m,
    };
    let (left_min, left_max) = match (left.min(), left.max()) {
        (Some(lo), Some(hi)) => (lo, hi),
        _ => {
            return Err(MergeError::Invariant(
                "left bucket must have an MSB".to_string(),
            ))
        }
    };
    let (right_min, right_max) = match (right.min(), right.max()) {
        (Some(lo), Some(hi)) => (lo, hi),
        _ => {
            return Err(MergeError::Invariant(format!(
                "right bucket {} has no extent",
                right_msb
            )))
        }
    };

    let left_msb = left.id().msb().unwrap_or(0);
    let from = if right_msb == 0 || (left_min >= right_min && left_msb != 0) {
        -1
    } else {
        bsearch_left(left, left_view, right_min, true, n)?
    };
    let to = if left_max <= right_max || (all_left && right_msb == 255) {
        n
    } else {
        bsearch_left(left, left_view, right_max, false, n)?
    };
    Ok(LeftWindow { from, to })
}

/// Binary search over the first key field of the left sorted keys
///
/// With `return_low`, returns the last rank whose value is below `x`;
/// otherwise the first rank whose value is above `x`. Ranks run over
/// `[0, upp)` and the result can be `-1` or `upp`.
pub fn bsearch_left(
    left: &BucketDescriptor,
    left_view: &SortedKeyView,
    x: i64,
    return_low: bool,
    upp: i64,
) -> MergeResult<i64> {
    let width = left.layout().field_width(0);
    let base = left.layout().base(0);
    let mut low = -1i64;
    let mut upp = upp;
    while low < upp - 1 {
        let mid = low + (upp - low) / 2;
        let val = normalize(read_field(left_view.key(mid as u64), width), base, 0)?;
        if x < val || (x == val && return_low) {
            upp = mid;
        } else {
            low = mid;
        }
    }
    Ok(if return_low { low } else { upp })
}
