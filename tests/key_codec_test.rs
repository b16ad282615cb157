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

//! Tests for composite key encoding and comparison

use std::cmp::Ordering;

use msbjoin::error::{Code, MergeError};
use msbjoin::key::{compare, compare_ordering, keys_equal, normalize, read_field, NA_ORDINAL};
use msbjoin::KeyLayout;

fn encode(layout: &KeyLayout, values: &[Option<i64>]) -> Vec<u8> {
    let mut out = Vec::new();
    layout.encode(values, &mut out).unwrap();
    out
}

// ============================================================================
// Layout
// ============================================================================

#[test]
fn test_layout_rejects_bad_widths() {
    assert!(KeyLayout::new(vec![], vec![]).is_err());
    assert!(KeyLayout::new(vec![0], vec![0]).is_err());
    assert!(KeyLayout::new(vec![9], vec![0]).is_err());
    assert!(KeyLayout::new(vec![1, 2], vec![0]).is_err());
}

#[test]
fn test_layout_key_size_sums_widths() {
    let layout = KeyLayout::new(vec![3, 1, 8], vec![0, 0, 0]).unwrap();
    assert_eq!(layout.key_size(), 12);
    assert_eq!(layout.num_fields(), 3);
    assert_eq!(layout.field_width(1), 1);
}

#[test]
fn test_encode_is_big_endian_offset_from_base() {
    let layout = KeyLayout::new(vec![3], vec![100]).unwrap();
    // 100 + 0x010203 - 1
    let key = encode(&layout, &[Some(100 + 0x010203 - 1)]);
    assert_eq!(key, vec![0x01, 0x02, 0x03]);
    assert_eq!(encode(&layout, &[None]), vec![0, 0, 0]);
}

#[test]
fn test_encode_rejects_values_outside_field() {
    let layout = KeyLayout::new(vec![1], vec![0]).unwrap();
    let mut out = Vec::new();
    // raw 256 needs two bytes
    assert!(matches!(
        layout.encode(&[Some(255)], &mut out),
        Err(MergeError::Invalid(_))
    ));
    // below the base
    assert!(layout.encode(&[Some(-1)], &mut out).is_err());
    assert!(layout.encode(&[Some(1), Some(2)], &mut out).is_err());
}

#[test]
fn test_field_ordinal_reads_each_field() {
    let layout = KeyLayout::new(vec![2, 1], vec![-10, 5]).unwrap();
    let key = encode(&layout, &[Some(300), None]);
    assert_eq!(layout.field_ordinal(&key, 0).unwrap(), 300);
    assert_eq!(layout.field_ordinal(&key, 1).unwrap(), NA_ORDINAL);
}

// ============================================================================
// Normalization
// ============================================================================

#[test]
fn test_read_field_widths() {
    assert_eq!(read_field(&[0xAB], 1), 0xAB);
    assert_eq!(read_field(&[0x01, 0x00, 0xFF], 3), 0x0100FF);
    assert_eq!(read_field(&[0xFF; 8], 8), u64::MAX);
    // only the first `width` bytes count
    assert_eq!(read_field(&[0x01, 0x02, 0x03], 2), 0x0102);
}

#[test]
fn test_normalize_zero_is_na() {
    assert_eq!(normalize(0, 42, 0).unwrap(), NA_ORDINAL);
    assert_eq!(normalize(1, 42, 0).unwrap(), 42);
    assert_eq!(normalize(10, -5, 0).unwrap(), 4);
}

#[test]
fn test_normalize_overflow_is_an_error() {
    let err = normalize(u64::MAX, i64::MAX, 3).unwrap_err();
    assert!(matches!(
        err,
        MergeError::KeyOverflow {
            field: 3,
            raw: u64::MAX,
            base: i64::MAX
        }
    ));
    assert_eq!(err.code(), Code::KeyOverflow);

    // the widest legal span still fits
    assert_eq!(normalize(u64::MAX, i64::MIN, 0).unwrap(), i64::MAX - 1);
}

// ============================================================================
// Comparison
// ============================================================================

#[test]
fn test_compare_returns_first_differing_field() {
    let layout = KeyLayout::new(vec![1, 2], vec![0, 0]).unwrap();
    let x = encode(&layout, &[Some(3), Some(10)]);
    let y = encode(&layout, &[Some(3), Some(4)]);
    assert_eq!(compare(&x, &layout, &y, &layout, 2).unwrap(), 6);
    assert_eq!(compare(&y, &layout, &x, &layout, 2).unwrap(), -6);
    // only the first field
    assert_eq!(compare(&x, &layout, &y, &layout, 1).unwrap(), 0);
}

#[test]
fn test_compare_across_layouts() {
    let narrow = KeyLayout::new(vec![1], vec![10]).unwrap();
    let wide = KeyLayout::new(vec![2], vec![0]).unwrap();
    let x = encode(&narrow, &[Some(15)]);
    let y = encode(&wide, &[Some(15)]);
    assert_ne!(x.len(), y.len());
    assert_eq!(compare(&x, &narrow, &y, &wide, 1).unwrap(), 0);

    let z = encode(&wide, &[Some(20)]);
    assert_eq!(
        compare_ordering(&x, &narrow, &z, &wide, 1).unwrap(),
        Ordering::Less
    );
}

#[test]
fn test_compare_saturates_large_differences() {
    let layout = KeyLayout::new(vec![8], vec![0]).unwrap();
    let big = encode(&layout, &[Some(i64::MAX - 1)]);
    let small = encode(&layout, &[Some(0)]);
    assert_eq!(compare(&big, &layout, &small, &layout, 1).unwrap(), i32::MAX);
    assert_eq!(compare(&small, &layout, &big, &layout, 1).unwrap(), i32::MIN + 1);
}

#[test]
fn test_na_sorts_first_and_equals_na() {
    let layout = KeyLayout::new(vec![4], vec![-1000]).unwrap();
    let na = encode(&layout, &[None]);
    let low = encode(&layout, &[Some(-1000)]);
    assert!(compare(&na, &layout, &low, &layout, 1).unwrap() < 0);
    assert_eq!(compare(&na, &layout, &na, &layout, 1).unwrap(), 0);
}

#[test]
fn test_compare_surfaces_overflow() {
    let layout = KeyLayout::new(vec![8], vec![i64::MAX]).unwrap();
    let key = vec![0, 0, 0, 0, 0, 0, 0, 2];
    assert!(matches!(
        compare(&key, &layout, &key, &layout, 1),
        Err(MergeError::KeyOverflow { field: 0, .. })
    ));
}

#[test]
fn test_keys_equal_is_byte_exact() {
    assert!(keys_equal(&[1, 2, 3], &[1, 2, 3]));
    assert!(!keys_equal(&[1, 2, 3], &[1, 2, 4]));
    assert!(!keys_equal(&[1, 2], &[1, 2, 0]));
}
