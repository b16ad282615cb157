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

//! Single-process stand-in for the sort stage
//!
//! Encodes integer key columns into composite keys, sorts them, splits the
//! result by the MSB of the first field and cuts each bucket into batches. The
//! output has the shape the distributed radix sort publishes, so merge tasks
//! can run against it unchanged. This is a comparison sort over one process's
//! memory and is meant for tests and small inputs.

use std::collections::BTreeMap;

use arrow::array::{Array, Int64Array};
use arrow::compute::cast;
use arrow::datatypes::DataType;
use arrow::record_batch::RecordBatch;

use crate::error::{MergeError, MergeResult};
use crate::key::KeyLayout;
use crate::sorted::{InMemorySortedBuckets, Side, SortedBatch, SortedHeader};
use crate::util::{batch_len, num_batches};

/// Sorted, bucketed keys of one side
#[derive(Debug, Clone)]
pub struct SortedSide {
    pub layout: KeyLayout,
    pub buckets: BTreeMap<u8, (SortedHeader, Vec<SortedBatch>)>,
}

impl SortedSide {
    pub fn num_rows(&self) -> u64 {
        self.buckets.values().map(|(h, _)| h.num_rows).sum()
    }

    /// Publish every bucket under `side`
    pub async fn publish(self, side: Side, target: &InMemorySortedBuckets) -> MergeResult<()> {
        for (msb, (header, batches)) in self.buckets {
            target.put(side, msb, header, batches).await?;
        }
        Ok(())
    }
}

/// Smallest layout able to encode every value of every given side
///
/// Each argument is one side's key columns; field `i` of the layout covers
/// column `i` of all of them, so a shared layout keeps bucket MSBs aligned
/// across sides.
pub fn fit_layout(sides: &[&[Vec<Option<i64>>]]) -> MergeResult<KeyLayout> {
    let num_fields = sides.first().map(|s| s.len()).unwrap_or(0);
    if num_fields == 0 {
        return Err(MergeError::Invalid("no key columns to lay out".to_string()));
    }
    if sides.iter().any(|s| s.len() != num_fields) {
        return Err(MergeError::Invalid(
            "every side needs the same number of key columns".to_string(),
        ));
    }
    let mut widths = Vec::with_capacity(num_fields);
    let mut bases = Vec::with_capacity(num_fields);
    for field in 0..num_fields {
        let values = sides.iter().flat_map(|s| s[field].iter().flatten());
        let (min, max) = values.fold((None, None), |(lo, hi): (Option<i64>, Option<i64>), v| {
            (
                Some(lo.map_or(*v, |l| l.min(*v))),
                Some(hi.map_or(*v, |h| h.max(*v))),
            )
        });
        let base = min.unwrap_or(0);
        let top = max.map_or(1i128, |m| m as i128 - base as i128 + 1);
        let mut width = 1usize;
        while width < 8 && top > (1i128 << (8 * width)) - 1 {
            width += 1;
        }
        widths.push(width);
        bases.push(base);
    }
    KeyLayout::new(widths, bases)
}

/// Encode, sort and bucket one side's key columns
pub fn presort(
    columns: &[Vec<Option<i64>>],
    layout: &KeyLayout,
    batch_size: usize,
) -> MergeResult<SortedSide> {
    if batch_size == 0 {
        return Err(MergeError::Invalid("batch size must be positive".to_string()));
    }
    if columns.len() != layout.num_fields() {
        return Err(MergeError::Invalid(format!(
            "{} key columns for a {}-field layout",
            columns.len(),
            layout.num_fields()
        )));
    }
    let num_rows = columns.first().map(|c| c.len()).unwrap_or(0);
    if columns.iter().any(|c| c.len() != num_rows) {
        return Err(MergeError::Invalid(
            "key columns differ in length".to_string(),
        ));
    }

    let key_size = layout.key_size();
    let mut keys = Vec::with_capacity(num_rows * key_size);
    let mut row_values = Vec::with_capacity(columns.len());
    for row in 0..num_rows {
        row_values.clear();
        row_values.extend(columns.iter().map(|c| c[row]));
        layout.encode(&row_values, &mut keys)?;
    }

    let mut order: Vec<u64> = (0..num_rows as u64).collect();
    // stable, so equal keys stay in row order
    order.sort_by(|a, b| key_at(&keys, *a, key_size).cmp(key_at(&keys, *b, key_size)));

    // the first key byte is the MSB of the first field
    let mut by_msb: BTreeMap<u8, Vec<u64>> = BTreeMap::new();
    for row in order {
        by_msb.entry(key_at(&keys, row, key_size)[0]).or_default().push(row);
    }

    let mut buckets = BTreeMap::new();
    for (msb, rows) in by_msb {
        let len = rows.len() as u64;
        let nbatch = num_batches(len, batch_size as u64);
        let mut batches = Vec::with_capacity(nbatch as usize);
        let mut start = 0usize;
        for b in 0..nbatch {
            let blen = batch_len(b, nbatch, len, batch_size as u64) as usize;
            let slice = &rows[start..start + blen];
            let mut batch_keys = Vec::with_capacity(blen * key_size);
            for row in slice {
                batch_keys.extend_from_slice(key_at(&keys, *row, key_size));
            }
            batches.push(SortedBatch {
                keys: batch_keys,
                order: slice.to_vec(),
            });
            start += blen;
        }
        let header = SortedHeader {
            num_rows: len,
            batch_size,
            num_batches: batches.len(),
        };
        buckets.insert(msb, (header, batches));
    }

    Ok(SortedSide {
        layout: layout.clone(),
        buckets,
    })
}

#[inline]
fn key_at(keys: &[u8], row: u64, key_size: usize) -> &[u8] {
    let off = row as usize * key_size;
    &keys[off..off + key_size]
}

/// Pull the first `num_key_cols` columns out of record batches as integers
///
/// Batches are concatenated in order, so the position of a value is its
/// global row number.
pub fn key_columns_from_batches(
    batches: &[RecordBatch],
    num_key_cols: usize,
) -> MergeResult<Vec<Vec<Option<i64>>>> {
    let mut columns = vec![Vec::new(); num_key_cols];
    for batch in batches {
        if batch.num_columns() < num_key_cols {
            return Err(MergeError::Invalid(format!(
                "batch has {} columns, {} key columns requested",
                batch.num_columns(),
                num_key_cols
            )));
        }
        for (c, out) in columns.iter_mut().enumerate() {
            let as_int = cast(batch.column(c), &DataType::Int64)?;
            let ints = as_int
                .as_any()
                .downcast_ref::<Int64Array>()
                .ok_or_else(|| MergeError::TypeError(format!("key column {} is not integer", c)))?;
            out.extend(ints.iter());
        }
    }
    Ok(columns)
}
