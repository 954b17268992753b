//! Property-based tests for part partitioning

mod common;

use common::{key, setup};
use proptest::prelude::*;
use s3sink_client::*;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn props_parts_reassemble_the_written_stream(
        chunks in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..40), 0..30),
        threshold in 1u64..64
    ) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let (store, _temp, bucket) = setup(1);
            let mut writer = MultipartObjectWriter::open(store.clone(), bucket.clone(), key("stream"), threshold)
                .await
                .unwrap();

            let mut expected = Vec::new();
            for chunk in &chunks {
                assert_eq!(writer.write(chunk).await.unwrap(), chunk.len());
                expected.extend_from_slice(chunk);
            }
            let outcome = writer.close().await.unwrap();

            let uploaded = store.uploaded();

            // Part numbers are exactly 1..=k
            let numbers: Vec<u32> = uploaded.iter().map(|(n, _)| *n).collect();
            let contiguous: Vec<u32> = (1..=uploaded.len() as u32).collect();
            assert_eq!(numbers, contiguous);

            // Concatenation reproduces the input
            let joined: Vec<u8> = uploaded.iter().flat_map(|(_, p)| p.iter().copied()).collect();
            assert_eq!(joined, expected);

            // Every part but the last reached the threshold
            if let Some((_, init)) = uploaded.split_last() {
                for (_, payload) in init {
                    assert!(payload.len() as u64 >= threshold);
                }
            }

            if expected.is_empty() {
                assert_eq!(outcome, CloseOutcome::Aborted);
                assert_eq!(store.finalize_calls(), 0);
                assert_eq!(store.abort_calls(), 1);
            } else {
                assert_eq!(outcome, CloseOutcome::Finalized {
                    parts: uploaded.len(),
                    bytes: expected.len() as u64,
                });
                assert_eq!(store.finalize_calls(), 1);
                assert_eq!(store.abort_calls(), 0);
                let object = store.local().get_object(&bucket, &key("stream")).unwrap().unwrap();
                assert_eq!(object, expected);
            }
            assert!(store.local().list_sessions().unwrap().is_empty());
        });
    }

    #[test]
    fn props_buffer_overshoot_is_bounded_by_one_write(
        chunks in prop::collection::vec(prop::collection::vec(any::<u8>(), 1..40), 1..30),
        threshold in 1u64..64
    ) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let (store, _temp, bucket) = setup(1);
            let mut writer = MultipartObjectWriter::open(store.clone(), bucket, key("bounded"), threshold)
                .await
                .unwrap();

            for chunk in &chunks {
                let uploads_before = store.uploaded().len();
                writer.write(chunk).await.unwrap();
                // At most one upload per write call
                assert!(store.uploaded().len() - uploads_before <= 1);
                assert!((writer.buffered_len() as u64) < threshold + chunk.len() as u64);
            }
            writer.close().await.unwrap();
        });
    }
}
