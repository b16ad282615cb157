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

//! Bucket descriptors
//!
//! The sort stage splits each side by the most significant byte of the first
//! key field. A bucket is one such split: MSB `0..=255`, or on the right the
//! "no bucket" sentinel used by left outer joins to emit left rows that no
//! right bucket overlaps.

use std::fmt;
use std::sync::Arc;

use crate::error::{MergeError, MergeResult};
use crate::frame::Frame;
use crate::key::KeyLayout;

/// Identity of a bucket within one side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BucketId {
    /// Right side only: no right rows can join
    None,
    Msb(u8),
}

impl BucketId {
    /// Wire form, `-1` for the sentinel
    pub fn as_i32(&self) -> i32 {
        match self {
            BucketId::None => -1,
            BucketId::Msb(m) => *m as i32,
        }
    }

    pub fn msb(&self) -> Option<u8> {
        match self {
            BucketId::None => None,
            BucketId::Msb(m) => Some(*m),
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, BucketId::None)
    }
}

impl fmt::Display for BucketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_i32())
    }
}

/// Shift that isolates the MSB of a first field `width` bytes wide
pub fn msb_shift(width: usize) -> u32 {
    (8 * width - 8) as u32
}

/// Everything a merge task needs to know about one side's bucket
#[derive(Debug, Clone)]
pub struct BucketDescriptor {
    frame: Arc<Frame>,
    id: BucketId,
    shift: u32,
    layout: KeyLayout,
}

impl BucketDescriptor {
    pub fn new(frame: Arc<Frame>, id: BucketId, layout: KeyLayout) -> Self {
        let shift = msb_shift(layout.field_width(0));
        Self {
            frame,
            id,
            shift,
            layout,
        }
    }

    pub fn frame(&self) -> &Arc<Frame> {
        &self.frame
    }

    pub fn id(&self) -> BucketId {
        self.id
    }

    pub fn shift(&self) -> u32 {
        self.shift
    }

    pub fn layout(&self) -> &KeyLayout {
        &self.layout
    }

    pub fn key_size(&self) -> usize {
        self.layout.key_size()
    }

    /// Smallest first-field value this bucket can hold
    ///
    /// `None` for the sentinel, which has no extent.
    pub fn min(&self) -> Option<i64> {
        let msb = self.id.msb()? as i128;
        Some(saturate((msb << self.shift) + self.layout.base(0) as i128 - 1))
    }

    /// Largest first-field value this bucket can hold
    pub fn max(&self) -> Option<i64> {
        let msb = self.id.msb()? as i128;
        Some(saturate(((msb + 1) << self.shift) + self.layout.base(0) as i128 - 2))
    }

    /// Whether the extents of two buckets intersect
    pub fn overlaps(&self, other: &BucketDescriptor) -> bool {
        match (self.min(), self.max(), other.min(), other.max()) {
            (Some(amin), Some(amax), Some(bmin), Some(bmax)) => amin <= bmax && bmin <= amax,
            _ => false,
        }
    }

    /// Node owning a global row of this bucket's frame
    pub fn owner_of_row(&self, row: u64) -> MergeResult<usize> {
        self.frame.owner_of_row(row)
    }

    /// Reject a descriptor whose layout does not describe its frame
    pub fn check_against_frame(&self) -> MergeResult<()> {
        if self.layout.num_fields() > self.frame.num_columns() {
            return Err(MergeError::Invalid(format!(
                "{}-field key over frame {} with {} columns",
                self.layout.num_fields(),
                self.frame.key(),
                self.frame.num_columns()
            )));
        }
        Ok(())
    }
}

#[inline]
fn saturate(v: i128) -> i64 {
    v.clamp(i64::MIN as i128, i64::MAX as i128) as i64
}
