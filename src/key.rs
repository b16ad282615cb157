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

//! Composite key codec
//!
//! A composite key is a run of fixed-width, big-endian unsigned fields, one per
//! join column. Each field stores `value - base + 1`, where `base` is the
//! column minimum recorded by the sort stage, so that raw bytes order the same
//! way as the values they encode. A field of all zero bytes is NA.
//!
//! Field widths are chosen per column and can be anything from 1 to 8 bytes,
//! which is finer than the 1/2/4/8 steps of native integer types.

use std::cmp::Ordering;

use crate::error::{MergeError, MergeResult};

/// Ordinal of an NA field; sorts before every real value
pub const NA_ORDINAL: i64 = i64::MIN;

/// Widths and bases of the fields of one side's composite key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyLayout {
    field_widths: Vec<usize>,
    bases: Vec<i64>,
    key_size: usize,
}

impl KeyLayout {
    pub fn new(field_widths: Vec<usize>, bases: Vec<i64>) -> MergeResult<Self> {
        if field_widths.is_empty() {
            return Err(MergeError::Invalid(
                "a composite key needs at least one field".to_string(),
            ));
        }
        if field_widths.len() != bases.len() {
            return Err(MergeError::Invalid(format!(
                "{} field widths but {} bases",
                field_widths.len(),
                bases.len()
            )));
        }
        if let Some(w) = field_widths.iter().find(|w| **w == 0 || **w > 8) {
            return Err(MergeError::Invalid(format!(
                "field width {} outside 1..=8 bytes",
                w
            )));
        }
        let key_size = field_widths.iter().sum();
        Ok(Self {
            field_widths,
            bases,
            key_size,
        })
    }

    pub fn num_fields(&self) -> usize {
        self.field_widths.len()
    }

    pub fn field_widths(&self) -> &[usize] {
        &self.field_widths
    }

    pub fn bases(&self) -> &[i64] {
        &self.bases
    }

    pub fn field_width(&self, field: usize) -> usize {
        self.field_widths[field]
    }

    pub fn base(&self, field: usize) -> i64 {
        self.bases[field]
    }

    /// Total width in bytes of one key
    pub fn key_size(&self) -> usize {
        self.key_size
    }

    /// Normalized value of one field of `key`
    pub fn field_ordinal(&self, key: &[u8], field: usize) -> MergeResult<i64> {
        let offset: usize = self.field_widths[..field].iter().sum();
        let raw = read_field(&key[offset..], self.field_widths[field]);
        normalize(raw, self.bases[field], field)
    }

    /// Encode one row of key values, appending `key_size` bytes to `out`
    ///
    /// `None` encodes NA.
    pub fn encode(&self, values: &[Option<i64>], out: &mut Vec<u8>) -> MergeResult<()> {
        if values.len() != self.num_fields() {
            return Err(MergeError::Invalid(format!(
                "{} key values for a {}-field key",
                values.len(),
                self.num_fields()
            )));
        }
        for (field, value) in values.iter().enumerate() {
            let width = self.field_widths[field];
            let raw = match value {
                None => 0u64,
                Some(v) => {
                    let raw = *v as i128 - self.bases[field] as i128 + 1;
                    let limit = if width == 8 { u64::MAX as i128 } else { (1i128 << (8 * width)) - 1 };
                    if raw < 1 || raw > limit {
                        return Err(MergeError::Invalid(format!(
                            "value {} does not fit field {} (base {}, {} bytes)",
                            v, field, self.bases[field], width
                        )));
                    }
                    raw as u64
                }
            };
            out.extend_from_slice(&raw.to_be_bytes()[8 - width..]);
        }
        Ok(())
    }
}

/// Read `width` bytes big-endian into an unsigned accumulator
#[inline]
pub fn read_field(bytes: &[u8], width: usize) -> u64 {
    bytes[..width]
        .iter()
        .fold(0u64, |acc, b| (acc << 8) | *b as u64)
}

/// Map a raw field value onto its ordinal
///
/// Zero is NA. Anything else is `base + (raw - 1)`, which must fit an `i64`.
#[inline]
pub fn normalize(raw: u64, base: i64, field: usize) -> MergeResult<i64> {
    if raw == 0 {
        return Ok(NA_ORDINAL);
    }
    let value = base as i128 + (raw as i128 - 1);
    i64::try_from(value).map_err(|_| MergeError::KeyOverflow { field, raw, base })
}

/// Three-way comparison of two composite keys over their first `num_fields`
///
/// Stops at the first differing field. The result is that field's ordinal
/// difference clamped to `[i32::MIN + 1, i32::MAX]`, so its sign is always
/// right and its magnitude is usable as a distance for small gaps.
pub fn compare(
    x: &[u8],
    x_layout: &KeyLayout,
    y: &[u8],
    y_layout: &KeyLayout,
    num_fields: usize,
) -> MergeResult<i32> {
    let mut xoff = 0usize;
    let mut yoff = 0usize;
    let mut xval = 0i64;
    let mut yval = 0i64;
    let mut field = 0usize;
    while field < num_fields && xval == yval {
        let xlen = x_layout.field_widths[field];
        let ylen = y_layout.field_widths[field];
        xval = normalize(read_field(&x[xoff..], xlen), x_layout.bases[field], field)?;
        yval = normalize(read_field(&y[yoff..], ylen), y_layout.bases[field], field)?;
        xoff += xlen;
        yoff += ylen;
        field += 1;
    }
    Ok(saturate(xval as i128 - yval as i128))
}

/// Ordering view of [`compare`]
pub fn compare_ordering(
    x: &[u8],
    x_layout: &KeyLayout,
    y: &[u8],
    y_layout: &KeyLayout,
    num_fields: usize,
) -> MergeResult<Ordering> {
    Ok(compare(x, x_layout, y, y_layout, num_fields)?.cmp(&0))
}

#[inline]
fn saturate(diff: i128) -> i32 {
    diff.clamp(i32::MIN as i128 + 1, i32::MAX as i128) as i32
}

/// Byte-exact equality of two keys of the same layout
#[inline]
pub fn keys_equal(x: &[u8], y: &[u8]) -> bool {
    x == y
}
