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

//! Batch-addressed arrays
//!
//! Logical arrays too large to hold in one allocation are split into pages of
//! a fixed size. All div/mod addressing lives here.

use crate::error::{MergeError, MergeResult};
use crate::util::{batch_len, num_batches};

/// A logical array of `len` values stored in pages of `page_size`
#[derive(Debug, Clone, PartialEq)]
pub struct PagedArray<T> {
    pages: Vec<Vec<T>>,
    page_size: usize,
    len: u64,
}

impl<T: Clone> PagedArray<T> {
    /// Allocate `len` values, all set to `fill`
    pub fn filled(len: u64, page_size: usize, fill: T) -> Self {
        let page_size = page_size.max(1);
        let nbatch = num_batches(len, page_size as u64);
        let pages = (0..nbatch)
            .map(|b| vec![fill.clone(); batch_len(b, nbatch, len, page_size as u64) as usize])
            .collect();
        Self {
            pages,
            page_size,
            len,
        }
    }

    /// Wrap pre-built pages; every page but the last must be full
    pub fn from_pages(pages: Vec<Vec<T>>, page_size: usize) -> MergeResult<Self> {
        let count = pages.len();
        let mut len = 0u64;
        for (b, page) in pages.iter().enumerate() {
            if page.len() > page_size || (b + 1 < count && page.len() != page_size) {
                return Err(MergeError::Invalid(format!(
                    "page {} holds {} values, page size is {}",
                    b,
                    page.len(),
                    page_size
                )));
            }
            len += page.len() as u64;
        }
        Ok(Self {
            pages,
            page_size: page_size.max(1),
            len,
        })
    }

    #[inline]
    fn locate(&self, index: u64) -> (usize, usize) {
        let page_size = self.page_size as u64;
        ((index / page_size) as usize, (index % page_size) as usize)
    }

    /// Value at a logical index
    ///
    /// # Panics
    /// If `index >= len`.
    #[inline]
    pub fn get(&self, index: u64) -> &T {
        let (b, o) = self.locate(index);
        &self.pages[b][o]
    }

    /// Value at a logical index, or `None` past the end
    pub fn try_get(&self, index: u64) -> Option<&T> {
        if index >= self.len {
            return None;
        }
        Some(self.get(index))
    }

    /// Overwrite the value at a logical index
    #[inline]
    pub fn set(&mut self, index: u64, value: T) {
        let (b, o) = self.locate(index);
        self.pages[b][o] = value;
    }

    /// Copy the value at `from` over the value at `to`
    pub fn copy_within(&mut self, from: u64, to: u64) {
        let value = self.get(from).clone();
        self.set(to, value);
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn num_pages(&self) -> usize {
        self.pages.len()
    }

    /// Lengths of every page in order
    pub fn page_lens(&self) -> Vec<usize> {
        self.pages.iter().map(|p| p.len()).collect()
    }

    /// Iterate values in logical order
    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        self.pages.iter().flat_map(|p| p.iter())
    }

    /// Give up the pages, e.g. to hand each one to a writer and free it
    pub fn into_pages(self) -> Vec<Vec<T>> {
        self.pages
    }
}

/// Fixed-width byte records (sorted composite keys) stored in pages
#[derive(Debug, Clone)]
pub struct PagedKeys {
    pages: Vec<Vec<u8>>,
    rows_per_page: usize,
    key_size: usize,
    len: u64,
}

impl PagedKeys {
    /// Wrap pre-built key pages of `rows_per_page` records of `key_size` bytes
    pub fn from_pages(pages: Vec<Vec<u8>>, rows_per_page: usize, key_size: usize) -> MergeResult<Self> {
        if key_size == 0 {
            return Err(MergeError::Invalid("key size must be positive".to_string()));
        }
        let count = pages.len();
        let mut len = 0u64;
        for (b, page) in pages.iter().enumerate() {
            if page.len() % key_size != 0 {
                return Err(MergeError::Invalid(format!(
                    "key page {} is {} bytes, not a multiple of key size {}",
                    b,
                    page.len(),
                    key_size
                )));
            }
            let rows = page.len() / key_size;
            if rows > rows_per_page || (b + 1 < count && rows != rows_per_page) {
                return Err(MergeError::Invalid(format!(
                    "key page {} holds {} rows, page size is {}",
                    b, rows, rows_per_page
                )));
            }
            len += rows as u64;
        }
        Ok(Self {
            pages,
            rows_per_page: rows_per_page.max(1),
            key_size,
            len,
        })
    }

    /// Key bytes of the record at `index`
    #[inline]
    pub fn key(&self, index: u64) -> &[u8] {
        let rows = self.rows_per_page as u64;
        let page = &self.pages[(index / rows) as usize];
        let off = (index % rows) as usize * self.key_size;
        &page[off..off + self.key_size]
    }

    pub fn key_size(&self) -> usize {
        self.key_size
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}
