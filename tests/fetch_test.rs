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

//! Tests for row fetching across cluster nodes

mod common;

use std::sync::Arc;

use arrow::array::{ArrayRef, Float64Array, Int64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;

use common::*;
use msbjoin::cluster::RawColumn;
use msbjoin::data_types::INT_NA;
use msbjoin::error::{Code, MergeError, Status};
use msbjoin::fetch::{gather, FetchPlan};
use msbjoin::{
    BucketDescriptor, BucketId, Cluster, FrameKey, LocalCluster, MergeConfig, MergeTask, Side,
};

fn mixed_batch() -> RecordBatch {
    let schema = Arc::new(Schema::new(vec![
        Field::new("i", DataType::Int64, true),
        Field::new("f", DataType::Float64, true),
        Field::new("s", DataType::Utf8, true),
    ]));
    RecordBatch::try_new(
        schema,
        vec![
            Arc::new(Int64Array::from(vec![Some(0), None, Some(2), Some(3)])) as ArrayRef,
            Arc::new(Float64Array::from(vec![Some(0.5), Some(1.5), None, Some(3.5)])),
            Arc::new(StringArray::from(vec![Some("a"), Some("b"), Some("c"), None])),
        ],
    )
    .unwrap()
}

// ============================================================================
// Local cluster
// ============================================================================

#[tokio::test]
async fn test_frame_layout_round_robin() {
    let cluster = LocalCluster::new(3).unwrap();
    let frame = cluster
        .register_round_robin(FrameKey::new("t"), &mixed_batch(), 1)
        .await
        .unwrap();
    assert_eq!(frame.num_rows(), 4);
    assert_eq!(frame.num_chunks(), 4);
    assert_eq!(frame.chunk_node(), &[0, 1, 2, 0]);
    assert_eq!(frame.owner_of_row(3).unwrap(), 0);
    assert_eq!(frame.elem2chunk_idx(2).unwrap(), 2);
    assert!(frame.elem2chunk_idx(4).is_err());
    assert!(cluster.frame(&FrameKey::new("t")).await.is_some());
}

#[tokio::test]
async fn test_fetch_rows_in_request_order_with_na() {
    let cluster = LocalCluster::new(2).unwrap();
    cluster
        .register_round_robin(FrameKey::new("t"), &mixed_batch(), 2)
        .await
        .unwrap();

    // rows 0 and 1 live on node 0, rows 2 and 3 on node 1
    let rows = cluster
        .fetch_rows(0, &FrameKey::new("t"), vec![1, 0, 1])
        .await
        .unwrap();
    assert_eq!(rows.num_rows(), 3);
    assert_eq!(rows.columns[0], RawColumn::Integer(vec![INT_NA, 0, INT_NA]));
    assert_eq!(rows.columns[2], RawColumn::String(vec![Some("b".to_string()), Some("a".to_string()), Some("b".to_string())]));

    let rows = cluster
        .fetch_rows(1, &FrameKey::new("t"), vec![2, 3])
        .await
        .unwrap();
    match &rows.columns[1] {
        RawColumn::Numeric(values) => {
            assert!(values[0].is_nan());
            assert_eq!(values[1], 3.5);
        }
        other => panic!("Expected numeric column, got {:?}", other),
    }
    assert_eq!(rows.columns[2], RawColumn::String(vec![Some("c".to_string()), None]));
}

#[tokio::test]
async fn test_fetch_unordered_rows_from_one_node() {
    let cluster = LocalCluster::new(2).unwrap();
    let values: Vec<i64> = (0..10).map(|i| i * 10).collect();
    cluster
        .register_round_robin(FrameKey::new("t"), &int_batch(&[("v", some(&values))]), 1)
        .await
        .unwrap();

    // odd rows all live on node 1
    let rows = cluster
        .fetch_rows(1, &FrameKey::new("t"), vec![7, 3, 9])
        .await
        .unwrap();
    assert_eq!(rows.columns[0], RawColumn::Integer(vec![70, 30, 90]));
}

#[tokio::test]
async fn test_fetched_batches_are_released_as_rows_are_read() {
    let local = Arc::new(LocalCluster::new(2).unwrap());
    local
        .register_round_robin(FrameKey::new("t"), &mixed_batch(), 2)
        .await
        .unwrap();
    let cluster: Arc<dyn Cluster> = local;

    let mut plan = FetchPlan::new(Side::Left, FrameKey::new("t"), 2, 1);
    for row in [1, 0, 1] {
        plan.push(0, row).unwrap();
    }
    plan.push(1, 3).unwrap();
    assert_eq!(plan.per_node_counts(), vec![3, 1]);
    assert_eq!(plan.push(2, 0).unwrap_err().code(), Code::IndexError);
    let none = FetchPlan::new(Side::Right, FrameKey::new("t"), 2, 1);

    let mut gathered = gather(cluster, &plan, &none).await.unwrap();
    assert_eq!(gathered.right.num_held(), 0);
    let fetched = &mut gathered.left;
    assert_eq!(fetched.num_held(), 4);

    let mut values = Vec::new();
    let mut held = Vec::new();
    for node in [0, 0, 0, 1] {
        let (rows, offset) = fetched.next(node).unwrap();
        match &rows.columns[0] {
            RawColumn::Integer(v) => values.push(v[offset]),
            other => panic!("Expected integer column, got {:?}", other),
        }
        held.push(fetched.num_held());
    }
    assert_eq!(values, vec![INT_NA, 0, INT_NA, 3]);
    // moving to the next batch of a node drops the previous one
    assert_eq!(held, vec![4, 3, 2, 2]);
    assert!(fetched.next(0).is_err());
}

#[tokio::test]
async fn test_fetch_from_wrong_node_fails() {
    let cluster = LocalCluster::new(2).unwrap();
    cluster
        .register_round_robin(FrameKey::new("t"), &mixed_batch(), 2)
        .await
        .unwrap();
    let err = cluster
        .fetch_rows(1, &FrameKey::new("t"), vec![0])
        .await
        .unwrap_err();
    assert!(matches!(err, MergeError::RemoteFetch { node: 1, .. }));

    let err = cluster
        .fetch_rows(0, &FrameKey::new("missing"), vec![0])
        .await
        .unwrap_err();
    assert_eq!(err.code(), Code::KeyError);
}

#[tokio::test]
async fn test_register_rejects_bad_placement() {
    let cluster = LocalCluster::new(2).unwrap();
    let err = cluster
        .register_frame(FrameKey::new("t"), vec![mixed_batch()], vec![2])
        .await;
    assert!(err.is_err());
    assert!(LocalCluster::new(0).is_err());
}

// ============================================================================
// Failures during a merge
// ============================================================================

#[tokio::test]
async fn test_node_down_fails_the_job() {
    let left = int_batch(&[("id", some(&[7, 3, 9])), ("lv", some(&[70, 30, 90]))]);
    let right = int_batch(&[("id", some(&[3, 7, 9])), ("rv", some(&[1, 2, 3]))]);
    let config = MergeConfig::inner().with_fetch_batch_size(1).unwrap();
    let fixture = setup(&left, &right, 1, 2, 1, config).await;

    fixture.cluster.set_node_down(1, true).await;
    let result = fixture.job().run().await;
    let status = Status::from(&result);
    assert!(!status.is_ok());
    assert_eq!(status.get_code(), Code::RemoteFetchFailure);
    assert!(matches!(result, Err(MergeError::RemoteFetch { node: 1, .. })));
    // key 9 lives on node 0 only, yet its chunks are gone with the job
    assert!(fixture.store.is_empty().await);

    // the node coming back makes the same job succeed
    fixture.cluster.set_node_down(1, false).await;
    let (outcome, _) = fixture.run().await;
    assert_eq!(outcome.num_rows, 3);
}

#[tokio::test]
async fn test_task_rejects_inconsistent_buckets() {
    let left = int_batch(&[("id", some(&[1])), ("lv", some(&[1]))]);
    let fixture = setup(&left, &left, 1, 1, 1, MergeConfig::inner()).await;
    let config = MergeConfig::inner();

    let sentinel_left = BucketDescriptor::new(
        fixture.left.frame.clone(),
        BucketId::None,
        fixture.left.layout.clone(),
    );
    let right = BucketDescriptor::new(
        fixture.right.frame.clone(),
        BucketId::Msb(1),
        fixture.right.layout.clone(),
    );
    assert!(MergeTask::new(sentinel_left, right.clone(), &config).is_err());

    let left_bucket = BucketDescriptor::new(
        fixture.left.frame.clone(),
        BucketId::Msb(1),
        fixture.left.layout.clone(),
    );
    let sentinel_right = BucketDescriptor::new(
        fixture.right.frame.clone(),
        BucketId::None,
        fixture.right.layout.clone(),
    );
    assert!(MergeTask::new(left_bucket.clone(), sentinel_right.clone(), &config).is_err());
    assert!(MergeTask::new(left_bucket.clone(), sentinel_right, &MergeConfig::left_outer()).is_ok());

    let two_fields = msbjoin::KeyLayout::new(vec![1, 1], vec![0, 0]).unwrap();
    let wide_right = BucketDescriptor::new(fixture.right.frame.clone(), BucketId::Msb(1), two_fields);
    assert!(MergeTask::new(left_bucket, wide_right, &config).is_err());
}

#[tokio::test]
async fn test_missing_sorted_batch_is_reported() {
    use msbjoin::sorted::{SortedHeader, SortedKeyView};
    use msbjoin::{InMemorySortedBuckets, Side};

    let sorted = InMemorySortedBuckets::new();
    let header = SortedHeader {
        num_rows: 1,
        batch_size: 1,
        num_batches: 1,
    };
    // header and batches must agree
    assert!(sorted.put(Side::Left, 4, header, vec![]).await.is_err());

    let loaded = SortedKeyView::load(&sorted, Side::Left, 4, 1, 1).await.unwrap();
    assert!(loaded.is_none());
    let err = msbjoin::SortedBucketSource::batch(&sorted, Side::Right, 9, 0)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        MergeError::MissingPartition {
            side: Side::Right,
            msb: 9
        }
    ));
}
