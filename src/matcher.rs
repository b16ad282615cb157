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

//! Merge-match engine
//!
//! Walks one side of a bucket pair (the iterate side) and binary-searches the
//! other (the search side) for each distinct key. Left outer joins always
//! iterate the left side so that every left row gets a record; inner joins
//! iterate whichever side is smaller.
//!
//! Matches are recorded per left rank as `(first, len)`: `first` is the
//! 1-based right rank of the first matching right row, `len` the number of
//! matching right rows, and `first == 0` means no match.
//!
//! Both sorted inputs are ascending, so after a match the search window can
//! start past the matched run; the window only ever shrinks from below.

use crate::bucket::BucketDescriptor;
use crate::error::{MergeError, MergeResult};
use crate::key::{compare, keys_equal};
use crate::paged::PagedArray;
use crate::range::LeftWindow;
use crate::sorted::SortedKeyView;

/// Half-open range `[low, high)` of search-side ranks still worth searching
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchWindow {
    pub low: i64,
    pub high: i64,
}

impl SearchWindow {
    pub fn new(low: i64, high: i64) -> Self {
        Self { low, high }
    }

    pub fn is_degenerate(&self) -> bool {
        self.low >= self.high
    }

    /// Window after a match run ending before `match_high`
    pub fn after_match(self, match_high: i64, upp: i64) -> Self {
        Self {
            low: match_high,
            high: upp,
        }
    }

    /// Window after a miss; nothing below `low` can match later keys either
    pub fn after_miss(self, upp: i64) -> Self {
        Self {
            low: self.low,
            high: upp,
        }
    }
}

/// Per left rank match records of one task
#[derive(Debug, Clone)]
pub struct MatchRecords {
    first: PagedArray<u64>,
    len: PagedArray<u64>,
}

impl MatchRecords {
    pub fn new(size: u64, batch_size: usize) -> Self {
        Self {
            first: PagedArray::filled(size, batch_size, 0),
            len: PagedArray::filled(size, batch_size, 0),
        }
    }

    /// `(first, len)` at a window-relative location
    pub fn get(&self, loc: u64) -> (u64, u64) {
        (*self.first.get(loc), *self.len.get(loc))
    }

    fn set(&mut self, loc: u64, first: u64, len: u64) {
        self.first.set(loc, first);
        self.len.set(loc, len);
    }

    pub fn len(&self) -> u64 {
        self.first.len()
    }

    pub fn is_empty(&self) -> bool {
        self.first.is_empty()
    }

    /// Records in left-sorted order
    pub fn iter(&self) -> impl Iterator<Item = (u64, u64)> + '_ {
        self.first.iter().copied().zip(self.len.iter().copied())
    }

    /// Number of left ranks with at least one match
    pub fn num_matched(&self) -> u64 {
        self.first.iter().filter(|f| **f > 0).count() as u64
    }
}

/// Tracks consecutive identical `(first, len)` signatures
///
/// Consecutive left rows with the same signature share their right rows,
/// which are fetched once and copied. Fetch planning and result assembly must
/// agree on which rows are repeats, so both walk the records through this.
#[derive(Debug, Default, Clone)]
pub struct RepeatTracker {
    prev: Option<(u64, u64)>,
}

impl RepeatTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether this signature repeats the previous matched one
    ///
    /// An unmatched record breaks the run.
    pub fn is_repeat(&mut self, first: u64, len: u64) -> bool {
        if first == 0 {
            self.prev = None;
            return false;
        }
        if self.prev == Some((first, len)) {
            return true;
        }
        self.prev = Some((first, len));
        false
    }
}

/// Result of matching one bucket pair
#[derive(Debug, Clone)]
pub struct MatchOutcome {
    pub records: MatchRecords,
    /// Rows the task will write
    pub num_rows: u64,
    /// Some left key matched as a run of more than one left row
    pub one_to_many: bool,
}

/// Matches the left window of one bucket pair against the whole right bucket
pub struct MergeMatchEngine<'a> {
    left: &'a BucketDescriptor,
    right: &'a BucketDescriptor,
    left_view: &'a mut SortedKeyView,
    right_view: &'a mut SortedKeyView,
    window: LeftWindow,
    num_join_cols: usize,
    all_left: bool,
    records: MatchRecords,
    num_rows: u64,
    one_to_many: bool,
}

impl<'a> MergeMatchEngine<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        left: &'a BucketDescriptor,
        right: &'a BucketDescriptor,
        left_view: &'a mut SortedKeyView,
        right_view: &'a mut SortedKeyView,
        window: LeftWindow,
        num_join_cols: usize,
        all_left: bool,
        batch_size: usize,
    ) -> Self {
        Self {
            left,
            right,
            left_view,
            right_view,
            window,
            num_join_cols,
            all_left,
            records: MatchRecords::new(window.size(), batch_size),
            num_rows: 0,
            one_to_many: false,
        }
    }

    pub fn run(mut self) -> MergeResult<MatchOutcome> {
        self.merge()?;
        self.verify_left_counts()?;
        Ok(MatchOutcome {
            records: self.records,
            num_rows: self.num_rows,
            one_to_many: self.one_to_many,
        })
    }

    fn merge(&mut self) -> MergeResult<()> {
        let right_n = self.right_view.num_rows() as i64;
        if !self.all_left && right_n == 0 {
            return Ok(());
        }
        let left_low = self.window.first();
        let left_upp = self.window.to;
        let left_iterate = self.all_left || (left_upp - left_low) <= right_n;

        let (iter_low, iter_upp, search_low, search_upp) = if left_iterate {
            (left_low, left_upp, 0, right_n)
        } else {
            (0, right_n, left_low, left_upp)
        };

        let mut window = SearchWindow::new(search_low, search_upp);
        let mut iter = iter_low;
        while iter < iter_upp {
            let found = self.search(window, iter, left_iterate)?;
            let iter_high = self.run_end(iter, iter_upp, left_iterate, true);

            let (match_low, search_len) = match found {
                Some(mid) => {
                    let (low, high) = self.expand_match(mid, search_low, search_upp, left_iterate);
                    window = window.after_match(high, search_upp);
                    (low, (high - low) as u64)
                }
                None => {
                    window = window.after_miss(search_upp);
                    (-1, 0)
                }
            };
            self.populate(
                (iter_high - iter) as u64,
                search_len,
                iter,
                match_low,
                left_iterate,
            )?;
            iter = iter_high;
        }
        Ok(())
    }

    fn iterate_view(&self, left_iterate: bool) -> &SortedKeyView {
        if left_iterate {
            &*self.left_view
        } else {
            &*self.right_view
        }
    }

    fn search_view(&self, left_iterate: bool) -> &SortedKeyView {
        self.iterate_view(!left_iterate)
    }

    /// Binary search for the iterate key at `iter` inside `window`
    fn search(
        &self,
        window: SearchWindow,
        iter: i64,
        left_iterate: bool,
    ) -> MergeResult<Option<i64>> {
        if window.is_degenerate() {
            return Ok(None);
        }
        let (iter_layout, search_layout) = if left_iterate {
            (self.left.layout(), self.right.layout())
        } else {
            (self.right.layout(), self.left.layout())
        };
        let iter_key = self.iterate_view(left_iterate).key(iter as u64);
        let search_view = self.search_view(left_iterate);
        let (mut low, mut high) = (window.low, window.high);
        while low < high {
            let mid = low + (high - low) / 2;
            let cmp = compare(
                iter_key,
                iter_layout,
                search_view.key(mid as u64),
                search_layout,
                self.num_join_cols,
            )?;
            if cmp < 0 {
                high = mid;
            } else if cmp > 0 {
                low = mid + 1;
            } else {
                return Ok(Some(mid));
            }
        }
        Ok(None)
    }

    /// End of the run of keys equal to the one at `start`
    fn run_end(&self, start: i64, upp: i64, left_iterate: bool, on_iterate_side: bool) -> i64 {
        let view = if on_iterate_side {
            self.iterate_view(left_iterate)
        } else {
            self.search_view(left_iterate)
        };
        let key = view.key(start as u64);
        let mut high = start + 1;
        while high < upp && keys_equal(key, view.key(high as u64)) {
            high += 1;
        }
        high
    }

    /// Grow a search-side match both ways over equal keys, `[low, high)`
    fn expand_match(&self, mid: i64, floor: i64, upp: i64, left_iterate: bool) -> (i64, i64) {
        let view = self.search_view(left_iterate);
        let key = view.key(mid as u64);
        let mut low = mid;
        while low > floor && keys_equal(key, view.key((low - 1) as u64)) {
            low -= 1;
        }
        let high = self.run_end(mid, upp, left_iterate, false);
        (low, high)
    }

    /// Record one iterate run and its search run
    fn populate(
        &mut self,
        iter_len: u64,
        search_len: u64,
        iter: i64,
        match_low: i64,
        left_iterate: bool,
    ) -> MergeResult<()> {
        if !self.all_left && (iter_len == 0 || search_len == 0) {
            return Ok(());
        }
        self.num_rows += iter_len.max(1) * search_len.max(1);

        let (left_low, left_high, right_low) = if left_iterate {
            (iter, iter + iter_len as i64, match_low)
        } else {
            (match_low, match_low + search_len as i64, iter)
        };
        if left_high - left_low > 1 {
            self.one_to_many = true;
        }
        let unmatched = self.all_left && search_len == 0;
        let left_first = self.window.first();

        for left_rank in left_low..left_high {
            let row = self.left_view.order_at(left_rank as u64);
            let node = self.left.owner_of_row(row)?;
            self.left_view.count_fetch(node)?;
            if unmatched {
                continue;
            }
            let loc = left_rank - left_first;
            if loc < 0 || loc as u64 >= self.records.len() {
                return Err(MergeError::Invariant(format!(
                    "left rank {} outside window ({}, {})",
                    left_rank, self.window.from, self.window.to
                )));
            }
            let len = if left_iterate { search_len } else { iter_len };
            self.records.set(loc as u64, (right_low + 1) as u64, len);
        }

        if !unmatched {
            let right_len = if left_iterate { search_len } else { iter_len };
            for offset in 0..right_len as i64 {
                let row = self.right_view.order_at((right_low + offset) as u64);
                let node = self.right.owner_of_row(row)?;
                self.right_view.count_fetch(node)?;
            }
        }
        Ok(())
    }

    /// Left rows counted for fetching must be exactly the rows the records emit
    fn verify_left_counts(&self) -> MergeResult<()> {
        let counted = self.left_view.num_rows_to_fetch();
        let expected = if self.all_left {
            self.window.size()
        } else {
            self.records.num_matched()
        };
        if counted != expected {
            return Err(MergeError::Invariant(format!(
                "{} left rows counted for fetching, {} expected",
                counted, expected
            )));
        }
        Ok(())
    }
}
