//! Property-based tests for chunking and bounded buffering
//!
//! - Chunks concatenated in index order reproduce the source
//! - Offsets are contiguous and no chunk exceeds the block size
//! - Buffers checked out never exceed pool capacity
//! - Committed objects match the source for any block size and concurrency

use blobstage_config::{RetryConfig, TransferConfig};
use blobstage_store::{BlockStore, MockStore};
use blobstage_transfer::{BufferPool, ChunkSource, ParallelUploadCoordinator, UploadOptions, UploadSource};
use proptest::prelude::*;
use proptest::test_runner::{Config as ProptestConfig, TestRunner};
use std::io::Cursor;
use std::sync::Arc;

fn arb_source() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..20_000)
}

/// Property: chunks cover the source exactly once, in offset order
#[test]
fn proptest_chunk_round_trip() {
    let mut runner = TestRunner::new(ProptestConfig::with_cases(64));

    runner
        .run(
            &(arb_source(), 1usize..5000, any::<bool>()),
            |(data, block_size, replayable)| {
                tokio::runtime::Runtime::new().unwrap().block_on(async {
                    let source = if replayable {
                        UploadSource::from_bytes(data.clone())
                    } else {
                        UploadSource::from_reader(Cursor::new(data.clone()), Some(data.len() as u64))
                    };
                    let pool = BufferPool::new(1, block_size);
                    let mut chunks = ChunkSource::new(source, block_size);

                    let mut joined = Vec::with_capacity(data.len());
                    let mut expected_index = 0u64;
                    while let Some(chunk) = chunks.next_chunk(pool.acquire().await.unwrap()).await.unwrap() {
                        prop_assert_eq!(chunk.index, expected_index);
                        prop_assert_eq!(chunk.offset, joined.len() as u64);
                        prop_assert!(!chunk.is_empty());
                        prop_assert!(chunk.len() <= block_size);
                        joined.extend_from_slice(chunk.data());
                        expected_index += 1;
                    }

                    prop_assert_eq!(&joined, &data);
                    prop_assert_eq!(pool.allocated(), 1);
                    Ok(())
                })
            },
        )
        .unwrap();
}

/// Property: unknown-length sources chunk identically after the size probe
#[test]
fn proptest_probe_preserves_bytes() {
    let mut runner = TestRunner::new(ProptestConfig::with_cases(64));

    runner
        .run(&(arb_source(), 1usize..3000, 0u64..6000), |(data, block_size, threshold)| {
            tokio::runtime::Runtime::new().unwrap().block_on(async {
                let source = UploadSource::from_reader(Cursor::new(data.clone()), None);
                let mut chunks = ChunkSource::new(source, block_size);
                let pool = BufferPool::new(1, block_size);

                let joined = match chunks.probe(threshold).await.unwrap() {
                    blobstage_transfer::SizeProbe::SingleShot(bytes) => {
                        prop_assert!(bytes.len() as u64 <= threshold);
                        bytes.to_vec()
                    }
                    blobstage_transfer::SizeProbe::Chunked { total } => {
                        prop_assert_eq!(total, None);
                        let mut joined = Vec::new();
                        while let Some(chunk) =
                            chunks.next_chunk(pool.acquire().await.unwrap()).await.unwrap()
                        {
                            joined.extend_from_slice(chunk.data());
                        }
                        joined
                    }
                };

                prop_assert_eq!(&joined, &data);
                Ok(())
            })
        })
        .unwrap();
}

/// Property: concurrent holders never exceed pool capacity
#[test]
fn proptest_pool_bound() {
    let mut runner = TestRunner::new(ProptestConfig::with_cases(32));

    runner
        .run(&(1usize..8, 1usize..40), |(capacity, tasks)| {
            tokio::runtime::Runtime::new().unwrap().block_on(async {
                let pool = BufferPool::new(capacity, 64);
                let mut handles = Vec::new();
                for _ in 0..tasks {
                    let pool = pool.clone();
                    handles.push(tokio::spawn(async move {
                        let buffer = pool.acquire().await.unwrap();
                        tokio::task::yield_now().await;
                        drop(buffer);
                    }));
                }
                for handle in handles {
                    handle.await.unwrap();
                }

                prop_assert!(pool.peak_checked_out() <= capacity);
                prop_assert!(pool.allocated() <= capacity);
                prop_assert_eq!(pool.checked_out(), 0);
                prop_assert_eq!(pool.available(), capacity);
                Ok(())
            })
        })
        .unwrap();
}

/// Property: any upload commits the source bytes unchanged with bounded concurrency
#[test]
fn proptest_upload_round_trip() {
    let mut runner = TestRunner::new(ProptestConfig::with_cases(32));

    runner
        .run(
            &(arb_source(), 64u64..4096, 0u64..4096, 1usize..6),
            |(data, block_size, threshold, concurrency)| {
                tokio::runtime::Runtime::new().unwrap().block_on(async {
                    let store = MockStore::new();
                    let transfer = TransferConfig {
                        block_size,
                        single_shot_threshold: threshold,
                        max_concurrency: concurrency,
                        ..Default::default()
                    };
                    let coordinator = ParallelUploadCoordinator::new(
                        Arc::new(store.clone()),
                        transfer,
                        &RetryConfig::default(),
                    )
                    .unwrap();

                    let outcome = coordinator
                        .upload_bytes("obj", data.clone(), UploadOptions::new())
                        .await
                        .unwrap();

                    let indices: Vec<u64> = outcome.block_ids.iter().map(|id| id.index()).collect();
                    let expected: Vec<u64> = (0..indices.len() as u64).collect();
                    prop_assert_eq!(indices, expected);
                    prop_assert!(store.peak_in_flight() <= concurrency);
                    prop_assert_eq!(store.get_object("obj").await.unwrap(), data);
                    Ok(())
                })
            },
        )
        .unwrap();
}
