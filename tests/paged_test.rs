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

//! Tests for batch-addressed arrays

use msbjoin::paged::{PagedArray, PagedKeys};
use msbjoin::util::{batch_len, num_batches};

#[test]
fn test_num_batches_and_batch_len() {
    assert_eq!(num_batches(0, 4), 0);
    assert_eq!(num_batches(4, 4), 1);
    assert_eq!(num_batches(5, 4), 2);
    assert_eq!(batch_len(0, 2, 5, 4), 4);
    assert_eq!(batch_len(1, 2, 5, 4), 1);
    assert_eq!(batch_len(0, 1, 4, 4), 4);
}

#[test]
fn test_filled_array_pages() {
    let array = PagedArray::filled(10, 4, -1i64);
    assert_eq!(array.len(), 10);
    assert_eq!(array.num_pages(), 3);
    assert_eq!(array.page_lens(), vec![4, 4, 2]);
    assert!(array.iter().all(|v| *v == -1));
}

#[test]
fn test_set_get_across_pages() {
    let mut array = PagedArray::filled(10, 4, 0u64);
    for i in 0..10 {
        array.set(i, i * 10);
    }
    assert_eq!(*array.get(3), 30);
    assert_eq!(*array.get(4), 40);
    assert_eq!(*array.get(9), 90);
    assert_eq!(array.try_get(10), None);

    array.copy_within(2, 7);
    assert_eq!(*array.get(7), 20);
    assert_eq!(array.into_pages(), vec![vec![0, 10, 20, 30], vec![40, 50, 60, 20], vec![80, 90]]);
}

#[test]
fn test_empty_array() {
    let array = PagedArray::filled(0, 8, 0u8);
    assert!(array.is_empty());
    assert_eq!(array.num_pages(), 0);
    assert_eq!(array.iter().count(), 0);
}

#[test]
fn test_from_pages_requires_full_pages_before_last() {
    assert!(PagedArray::from_pages(vec![vec![1, 2], vec![3]], 2).is_ok());
    assert!(PagedArray::from_pages(vec![vec![1], vec![2, 3]], 2).is_err());
    assert!(PagedArray::from_pages(vec![vec![1, 2, 3]], 2).is_err());
    assert!(PagedArray::<u64>::from_pages(vec![], 0).unwrap().is_empty());
}

#[test]
fn test_paged_keys_address_records() {
    let pages = vec![vec![1, 1, 2, 2], vec![3, 3]];
    let keys = PagedKeys::from_pages(pages, 2, 2).unwrap();
    assert_eq!(keys.len(), 3);
    assert_eq!(keys.key_size(), 2);
    assert_eq!(keys.key(0), &[1, 1]);
    assert_eq!(keys.key(1), &[2, 2]);
    assert_eq!(keys.key(2), &[3, 3]);
}

#[test]
fn test_paged_keys_reject_ragged_pages() {
    assert!(PagedKeys::from_pages(vec![vec![1, 2, 3]], 2, 2).is_err());
    assert!(PagedKeys::from_pages(vec![vec![1, 1], vec![2, 2, 3, 3]], 2, 2).is_err());
    assert!(PagedKeys::from_pages(vec![], 4, 0).is_err());
}
