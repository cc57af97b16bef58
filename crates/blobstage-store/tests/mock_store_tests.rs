//! Behavioural tests for the in-memory block store
//!
//! The mock store is the reference implementation of the staged-block
//! protocol, so these tests pin down the semantics every backend shares.

use blobstage_store::mock::{Fault, MockStore};
use blobstage_store::{BlobKind, BlockId, BlockStore, Checksum};
use std::time::Duration;

fn ids(session: &str, n: u64) -> Vec<BlockId> {
    (0..n).map(|i| BlockId::new(session, i)).collect()
}

#[tokio::test]
async fn test_commit_assembles_blocks_in_list_order() {
    let store = MockStore::new();
    let ids = ids("sess", 3);

    // Stage out of order
    store.put_block("obj", &ids[2], b"ccc", None).await.unwrap();
    store.put_block("obj", &ids[0], b"aaa", None).await.unwrap();
    store.put_block("obj", &ids[1], b"bbb", None).await.unwrap();

    let meta = store.commit_block_list("obj", &ids).await.unwrap();
    assert_eq!(meta.size, 9);
    assert_eq!(meta.block_count, 3);
    assert_eq!(meta.kind, BlobKind::Block);
    assert_eq!(store.get_object("obj").await.unwrap(), b"aaabbbccc");
    assert_eq!(store.staged_block_count("obj").await, 0);
}

#[tokio::test]
async fn test_commit_with_unknown_block_fails() {
    let store = MockStore::new();
    let ids = ids("sess", 2);
    store.put_block("obj", &ids[0], b"a", None).await.unwrap();

    let err = store.commit_block_list("obj", &ids).await.unwrap_err();
    assert_eq!(err.status(), Some(400));
    assert!(!err.is_transient());
    assert!(store.get_object("obj").await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn test_commit_empty_list_creates_empty_object() {
    let store = MockStore::new();
    let meta = store.commit_block_list("empty", &[]).await.unwrap();
    assert_eq!(meta.size, 0);
    assert_eq!(store.get_object("empty").await.unwrap(), Vec::<u8>::new());
}

#[tokio::test]
async fn test_transient_faults_are_classified() {
    let store = MockStore::new();
    let id = BlockId::new("s", 0);
    for fault in [
        Fault::Unavailable,
        Fault::Throttled,
        Fault::Timeout,
        Fault::ConnectionReset,
    ] {
        store.inject_block_fault(0, fault, 1).await;
        let err = store.put_block("k", &id, b"x", None).await.unwrap_err();
        assert!(err.is_transient(), "{:?} should be transient", fault);
    }
}

#[tokio::test]
async fn test_permanent_faults_are_classified() {
    let store = MockStore::new();
    let id = BlockId::new("s", 0);
    for fault in [Fault::Forbidden, Fault::BadRequest] {
        store.inject_block_fault(0, fault, 1).await;
        let err = store.put_block("k", &id, b"x", None).await.unwrap_err();
        assert!(!err.is_transient(), "{:?} should be permanent", fault);
        assert!(!err.is_integrity());
    }
}

#[tokio::test]
async fn test_corruption_without_checksum_goes_undetected() {
    let store = MockStore::new();
    store.inject_block_fault(0, Fault::CorruptPayload, 1).await;
    let id = BlockId::new("s", 0);

    store.put_block("k", &id, b"abc", None).await.unwrap();
    store.commit_block_list("k", &[id]).await.unwrap();
    assert_ne!(store.get_object("k").await.unwrap(), b"abc");
}

#[tokio::test]
async fn test_crc64_checksum_is_verified() {
    let store = MockStore::new();
    let id = BlockId::new("s", 0);
    let wrong = Checksum::crc64(b"other");
    let err = store
        .put_block("k", &id, b"abc", Some(&wrong))
        .await
        .unwrap_err();
    assert!(err.is_integrity());

    let right = Checksum::crc64(b"abc");
    store.put_block("k", &id, b"abc", Some(&right)).await.unwrap();
}

#[tokio::test]
async fn test_stall_delays_but_succeeds() {
    let store = MockStore::new();
    store
        .inject_block_fault(0, Fault::Stall(Duration::from_millis(20)), 1)
        .await;
    let start = std::time::Instant::now();
    store
        .put_block("k", &BlockId::new("s", 0), b"x", None)
        .await
        .unwrap();
    assert!(start.elapsed() >= Duration::from_millis(20));
}

#[tokio::test]
async fn test_commit_fault_leaves_staged_blocks() {
    let store = MockStore::new();
    store.inject_commit_fault(Fault::Unavailable, 1).await;
    let ids = ids("s", 1);
    store.put_block("k", &ids[0], b"x", None).await.unwrap();

    assert!(store.commit_block_list("k", &ids).await.is_err());
    assert_eq!(store.staged_block_count("k").await, 1);

    store.commit_block_list("k", &ids).await.unwrap();
    assert_eq!(store.commit_calls().await, 2);
    assert_eq!(store.committed_block_lists().await, vec![ids]);
}

#[tokio::test]
async fn test_put_object_records_content_md5() {
    let store = MockStore::new();
    let meta = store.put_object("small", b"abc", None).await.unwrap();
    assert_eq!(meta.content_md5.as_deref(), Some("kAFQmDzST7DWlj99KOF/cg=="));
    assert_eq!(store.put_object_calls().await, 1);
}

#[tokio::test]
async fn test_append_position_must_match() {
    let store = MockStore::new();
    store.create_append_object("log").await.unwrap();

    assert_eq!(store.append_block("log", b"abc", None, 0).await.unwrap(), 3);
    // Replaying the same append is rejected rather than duplicated
    let err = store.append_block("log", b"abc", None, 0).await.unwrap_err();
    assert_eq!(err.status(), Some(412));

    assert_eq!(store.append_block("log", b"de", None, 3).await.unwrap(), 5);
    assert_eq!(store.get_object("log").await.unwrap(), b"abcde");
    assert_eq!(store.object_metadata("log").await.unwrap().block_count, 2);
}

#[tokio::test]
async fn test_append_to_block_object_is_conflict() {
    let store = MockStore::new();
    store.put_object("blk", b"abc", None).await.unwrap();
    let err = store.append_block("blk", b"x", None, 3).await.unwrap_err();
    assert_eq!(err.status(), Some(409));
}

#[tokio::test]
async fn test_page_writes() {
    let store = MockStore::new();
    assert_eq!(
        store.create_page_object("disk", 1000).await.unwrap_err().status(),
        Some(400)
    );

    store.create_page_object("disk", 1024).await.unwrap();
    store
        .put_pages("disk", 512, &[7u8; 512], None)
        .await
        .unwrap();
    let err = store
        .put_pages("disk", 100, &[7u8; 512], None)
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(400));
    let err = store
        .put_pages("disk", 1024, &[7u8; 512], None)
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(416));

    let data = store.get_object("disk").await.unwrap();
    assert_eq!(data.len(), 1024);
    assert!(data[..512].iter().all(|b| *b == 0));
    assert!(data[512..].iter().all(|b| *b == 7));
}

#[tokio::test]
async fn test_delete_is_idempotent() {
    let store = MockStore::new();
    store.put_object("k", b"x", None).await.unwrap();
    store.delete_object("k").await.unwrap();
    store.delete_object("k").await.unwrap();
    assert!(store.is_empty().await);
}

#[tokio::test]
async fn test_etag_changes_on_overwrite() {
    let store = MockStore::new();
    let first = store.put_object("k", b"one", None).await.unwrap();
    let second = store.put_object("k", b"two", None).await.unwrap();
    assert_ne!(first.etag, second.etag);
    assert_eq!(store.keys().await, vec!["k".to_string()]);
}

#[tokio::test]
async fn test_concurrent_staging_from_many_tasks() {
    let store = MockStore::new();
    let mut set = tokio::task::JoinSet::new();
    for i in 0..16u64 {
        let store = store.clone();
        set.spawn(async move {
            let id = BlockId::new("s", i);
            store.put_block("k", &id, &[i as u8], None).await.unwrap();
        });
    }
    while let Some(res) = set.join_next().await {
        res.unwrap();
    }

    store.commit_block_list("k", &ids("s", 16)).await.unwrap();
    let data = store.get_object("k").await.unwrap();
    assert_eq!(data, (0..16u8).collect::<Vec<_>>());
}
