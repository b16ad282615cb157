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

//! Result assembler
//!
//! Writes the output rows of one bucket pair: every left column followed by
//! the non-key right columns. Rows come out in left-sorted order and, within a
//! left row's matches, in right-sorted order.

use std::sync::Arc;

use arrow::array::{ArrayRef, Float64Array, Int64Array, StringArray};

use crate::bucket::BucketDescriptor;
use crate::cluster::{RawColumn, RawRows};
use crate::data_types::{ColumnKind, INT_NA};
use crate::error::{MergeError, MergeResult};
use crate::fetch::FetchedRows;
use crate::matcher::{MatchRecords, RepeatTracker};
use crate::paged::PagedArray;
use crate::range::LeftWindow;
use crate::sorted::SortedKeyView;

/// One output column, paged by output batch and NA-filled on allocation
#[derive(Debug, Clone, PartialEq)]
pub enum PagedColumn {
    Numeric(PagedArray<f64>),
    Integer(PagedArray<i64>),
    String(PagedArray<Option<String>>),
}

impl PagedColumn {
    pub fn new_na(kind: ColumnKind, len: u64, batch_size: usize) -> Self {
        match kind {
            ColumnKind::Numeric => PagedColumn::Numeric(PagedArray::filled(len, batch_size, f64::NAN)),
            ColumnKind::Integer => PagedColumn::Integer(PagedArray::filled(len, batch_size, INT_NA)),
            ColumnKind::String => PagedColumn::String(PagedArray::filled(len, batch_size, None)),
        }
    }

    pub fn kind(&self) -> ColumnKind {
        match self {
            PagedColumn::Numeric(_) => ColumnKind::Numeric,
            PagedColumn::Integer(_) => ColumnKind::Integer,
            PagedColumn::String(_) => ColumnKind::String,
        }
    }

    pub fn len(&self) -> u64 {
        match self {
            PagedColumn::Numeric(a) => a.len(),
            PagedColumn::Integer(a) => a.len(),
            PagedColumn::String(a) => a.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Write value `offset` of a fetched column at `at`
    fn set_from(&mut self, at: u64, source: &RawColumn, offset: usize) -> MergeResult<()> {
        match (self, source) {
            (PagedColumn::Numeric(out), RawColumn::Numeric(v)) => out.set(at, v[offset]),
            (PagedColumn::Integer(out), RawColumn::Integer(v)) => out.set(at, v[offset]),
            (PagedColumn::String(out), RawColumn::String(v)) => out.set(at, v[offset].clone()),
            (out, source) => {
                return Err(MergeError::TypeError(format!(
                    "fetched {:?} values for a {:?} output column",
                    source.kind(),
                    out.kind()
                )))
            }
        }
        Ok(())
    }

    fn copy_within(&mut self, from: u64, to: u64) {
        match self {
            PagedColumn::Numeric(a) => a.copy_within(from, to),
            PagedColumn::Integer(a) => a.copy_within(from, to),
            PagedColumn::String(a) => a.copy_within(from, to),
        }
    }

    /// Turn each page into an Arrow array, NA becoming null
    pub fn into_arrays(self) -> Vec<ArrayRef> {
        match self {
            PagedColumn::Numeric(a) => a
                .into_pages()
                .into_iter()
                .map(|p| {
                    Arc::new(Float64Array::from_iter(
                        p.into_iter().map(|v| if v.is_nan() { None } else { Some(v) }),
                    )) as ArrayRef
                })
                .collect(),
            PagedColumn::Integer(a) => a
                .into_pages()
                .into_iter()
                .map(|p| {
                    Arc::new(Int64Array::from_iter(
                        p.into_iter().map(|v| if v == INT_NA { None } else { Some(v) }),
                    )) as ArrayRef
                })
                .collect(),
            PagedColumn::String(a) => a
                .into_pages()
                .into_iter()
                .map(|p| Arc::new(StringArray::from_iter(p)) as ArrayRef)
                .collect(),
        }
    }
}

/// Kinds of the output columns of a bucket pair
pub fn output_kinds(left: &BucketDescriptor, right: &BucketDescriptor, num_join_cols: usize) -> Vec<ColumnKind> {
    left.frame()
        .kinds()
        .iter()
        .chain(right.frame().kinds().iter().skip(num_join_cols))
        .copied()
        .collect()
}

/// Fills the output columns of one task from the fetched rows
pub struct ResultAssembler<'a> {
    left: &'a BucketDescriptor,
    right: &'a BucketDescriptor,
    left_view: &'a SortedKeyView,
    right_view: &'a SortedKeyView,
    window: LeftWindow,
    num_join_cols: usize,
    all_left: bool,
}

impl<'a> ResultAssembler<'a> {
    pub fn new(
        left: &'a BucketDescriptor,
        right: &'a BucketDescriptor,
        left_view: &'a SortedKeyView,
        right_view: &'a SortedKeyView,
        window: LeftWindow,
        num_join_cols: usize,
        all_left: bool,
    ) -> Self {
        Self {
            left,
            right,
            left_view,
            right_view,
            window,
            num_join_cols,
            all_left,
        }
    }

    pub fn assemble(
        &self,
        records: &MatchRecords,
        num_rows: u64,
        batch_size: usize,
        left_rows: &mut FetchedRows,
        right_rows: &mut FetchedRows,
    ) -> MergeResult<Vec<PagedColumn>> {
        let num_left_cols = self.left.frame().num_columns();
        let mut columns: Vec<PagedColumn> = output_kinds(self.left, self.right, self.num_join_cols)
            .into_iter()
            .map(|kind| PagedColumn::new_na(kind, num_rows, batch_size))
            .collect();
        let num_right_out = columns.len() - num_left_cols;

        let mut tracker = RepeatTracker::new();
        let first_rank = self.window.first() as u64;
        let mut result_loc = 0u64;
        for (loc, (first, len)) in records.iter().enumerate() {
            let repeat = tracker.is_repeat(first, len);
            if first == 0 && !self.all_left {
                continue;
            }

            let row = self.left_view.order_at(first_rank + loc as u64);
            let (fetched, offset) = left_rows.next(self.left.owner_of_row(row)?)?;
            let copies = len.max(1);
            if result_loc + copies > num_rows {
                return Err(overrun(result_loc + copies, num_rows));
            }
            for rep in 0..copies {
                for (col, out) in columns.iter_mut().take(num_left_cols).enumerate() {
                    out.set_from(result_loc + rep, column_of(fetched, col)?, offset)?;
                }
            }

            if first == 0 {
                // right columns stay NA
                result_loc += 1;
                continue;
            }
            if repeat {
                for _ in 0..len {
                    for out in columns.iter_mut().skip(num_left_cols) {
                        out.copy_within(result_loc - len, result_loc);
                    }
                    result_loc += 1;
                }
                continue;
            }
            for r in 0..len {
                let row = self.right_view.order_at(first + r - 1);
                let (fetched, offset) = right_rows.next(self.right.owner_of_row(row)?)?;
                for j in 0..num_right_out {
                    columns[num_left_cols + j].set_from(
                        result_loc,
                        column_of(fetched, self.num_join_cols + j)?,
                        offset,
                    )?;
                }
                result_loc += 1;
            }
        }

        if result_loc != num_rows {
            return Err(MergeError::Invariant(format!(
                "assembled {} rows, engine counted {}",
                result_loc, num_rows
            )));
        }
        Ok(columns)
    }
}

fn column_of(rows: &RawRows, col: usize) -> MergeResult<&RawColumn> {
    rows.columns.get(col).ok_or_else(|| {
        MergeError::IndexError(format!(
            "fetched rows carry {} columns, column {} needed",
            rows.columns.len(),
            col
        ))
    })
}

fn overrun(at: u64, num_rows: u64) -> MergeError {
    MergeError::Invariant(format!(
        "assembly reached row {} of a {}-row result",
        at, num_rows
    ))
}
